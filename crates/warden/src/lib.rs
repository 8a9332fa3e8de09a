//! # warden
//!
//! Local process supervisor.
//!
//! Launch commands as detached process-group leaders, watch them, restart
//! them on unexpected exit with bounded exponential backoff, and persist
//! every record in a locked, atomically-rewritten store file so supervision
//! survives supervisor restarts.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use warden::Supervisor;
//! use warden::types::Target;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), warden::Error> {
//! let sup = Supervisor::open();
//!
//! let pid = sup.start("web", "/srv/app".as_ref(), "python3 app.py").await?;
//! println!("web running as {}", pid);
//!
//! for row in sup.list() {
//!     println!("{} {} restarts {}", row.name, row.status, row.restart_count);
//! }
//!
//! sup.stop(&Target::Name("web".into())).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod cron;
pub mod daemon;
pub mod error;
pub mod launcher;
pub mod logs;
pub mod monitor;
pub mod paths;
pub mod sample;
pub mod startup;
pub mod stop;
pub mod store;
pub mod supervisor;
pub mod types;
pub mod venv;

pub use error::{Error, LaunchError};
pub use paths::WardenPaths;
pub use store::ConfigStore;
pub use supervisor::{ListRows, StatusRow, Supervisor};
pub use types::{ProcessRecord, Records, Status, Target};
