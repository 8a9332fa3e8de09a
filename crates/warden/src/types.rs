use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::Error;

/// The store is a mapping from process name to its record.
pub type Records = BTreeMap<String, ProcessRecord>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
	Running,
	Stopped,
	/// Automatic restarts were exhausted; only a manual restart revives it.
	Failed,
}

impl Status {
	pub fn is_running(&self) -> bool {
		matches!(self, Status::Running)
	}
}

impl std::fmt::Display for Status {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Status::Running => write!(f, "running"),
			Status::Stopped => write!(f, "stopped"),
			Status::Failed => write!(f, "failed"),
		}
	}
}

/// One managed logical process, keyed in the store by its unique name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRecord {
	pub command: String,
	pub directory: PathBuf,
	#[serde(default)]
	pub pid: Option<u32>,
	/// Cumulative automatic restarts since creation. Manual restarts do not
	/// touch this counter.
	#[serde(default)]
	pub restart_count: u32,
	#[serde(default = "default_max_restarts")]
	pub max_restarts: u32,
	#[serde(default = "default_restart_delay")]
	pub restart_delay_secs: u64,
	#[serde(default)]
	pub autostart: bool,
	#[serde(default = "default_status")]
	pub status: Status,
	/// Unix epoch seconds at record creation.
	#[serde(default)]
	pub created_at: u64,
	/// Fields this version does not know about, preserved across rewrites.
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_max_restarts() -> u32 {
	5
}
fn default_restart_delay() -> u64 {
	3
}
fn default_status() -> Status {
	Status::Stopped
}

impl ProcessRecord {
	pub fn new(command: String, directory: PathBuf, pid: u32) -> Self {
		Self {
			command,
			directory,
			pid: Some(pid),
			restart_count: 0,
			max_restarts: default_max_restarts(),
			restart_delay_secs: default_restart_delay(),
			autostart: false,
			status: Status::Running,
			created_at: now_epoch(),
			extra: serde_json::Map::new(),
		}
	}
}

/// Names must be non-empty and limited to `[A-Za-z0-9_-]`.
pub fn validate_name(name: &str) -> Result<(), Error> {
	if name.is_empty() {
		return Err(Error::Validation("process name is empty".to_string()));
	}
	if name == "all" {
		return Err(Error::Validation(
			"'all' is reserved for targeting every record".to_string(),
		));
	}
	if let Some(bad) = name
		.chars()
		.find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
	{
		return Err(Error::Validation(format!(
			"invalid character {:?} in process name {:?}",
			bad, name
		)));
	}
	Ok(())
}

/// Operation target: one named record or every record in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
	All,
	Name(String),
}

impl Target {
	pub fn parse(raw: &str) -> Self {
		if raw == "all" {
			Target::All
		} else {
			Target::Name(raw.to_string())
		}
	}
}

pub fn now_epoch() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}
