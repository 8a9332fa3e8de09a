use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;

use nix::fcntl::{Flock, FlockArg};
use tokio::sync::Mutex;

use crate::error::Error;
use crate::paths::WardenPaths;
use crate::types::Records;

/// Durable name -> ProcessRecord mapping backed by a single JSON file.
///
/// Readers take a shared flock on the store file; writers serialize under an
/// exclusive flock on a fixed-name temporary sibling, fsync, then rename over
/// the store. A reader can therefore never observe a partial file and a crash
/// mid-write leaves the previous version intact.
///
/// The flock protects individual loads and saves across processes. It does
/// not make a load-modify-save sequence atomic, so same-process callers go
/// through [`ConfigStore::update`], which holds an in-process mutex across
/// the whole sequence. Two separate processes updating concurrently remain
/// last-writer-wins; that race is accepted and documented.
pub struct ConfigStore {
	path: PathBuf,
	tmp_path: PathBuf,
	write_guard: Mutex<()>,
}

impl ConfigStore {
	pub fn new(paths: &WardenPaths) -> Self {
		Self {
			path: paths.store_path(),
			tmp_path: paths.store_tmp_path(),
			write_guard: Mutex::new(()),
		}
	}

	/// A store at an explicit path. Used by tests.
	pub fn at(path: PathBuf) -> Self {
		let mut tmp = path.as_os_str().to_owned();
		tmp.push(".tmp");
		Self {
			path,
			tmp_path: PathBuf::from(tmp),
			write_guard: Mutex::new(()),
		}
	}

	pub fn path(&self) -> &std::path::Path {
		&self.path
	}

	/// Load the full mapping. A missing file is an empty store; malformed
	/// content is logged and treated as empty rather than propagated.
	pub fn load(&self) -> Records {
		let file = match File::open(&self.path) {
			Ok(f) => f,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Records::new(),
			Err(e) => {
				tracing::warn!("cannot open {}: {}", self.path.display(), e);
				return Records::new();
			}
		};

		let lock = match Flock::lock(file, FlockArg::LockShared) {
			Ok(l) => l,
			Err((_, errno)) => {
				tracing::warn!("cannot lock {}: {}", self.path.display(), errno);
				return Records::new();
			}
		};

		let mut content = String::new();
		if let Err(e) = (&*lock).read_to_string(&mut content) {
			tracing::warn!("cannot read {}: {}", self.path.display(), e);
			return Records::new();
		}

		if content.trim().is_empty() {
			return Records::new();
		}

		match serde_json::from_str(&content) {
			Ok(records) => records,
			Err(e) => {
				tracing::warn!("malformed store {}: {}", self.path.display(), e);
				Records::new()
			}
		}
	}

	/// Atomically replace the store with `records`.
	pub fn save(&self, records: &Records) -> Result<(), Error> {
		let persist = |e: std::io::Error| Error::Persistence(e.to_string());

		if let Some(dir) = self.path.parent() {
			std::fs::create_dir_all(dir).map_err(persist)?;
		}

		// Opened without O_TRUNC: truncation happens under the lock, so a
		// writer queued behind us cannot clobber bytes we are serializing.
		let tmp = OpenOptions::new()
			.create(true)
			.write(true)
			.open(&self.tmp_path)
			.map_err(persist)?;

		// Concurrent writers queue on the exclusive lock of the shared
		// temporary file; the lock is held through serialization and rename.
		let mut lock = Flock::lock(tmp, FlockArg::LockExclusive)
			.map_err(|(_, errno)| Error::Persistence(format!("lock failed: {}", errno)))?;

		let data = serde_json::to_vec_pretty(records)
			.map_err(|e| Error::Persistence(e.to_string()))?;
		lock.set_len(0).map_err(persist)?;
		lock.write_all(&data).map_err(persist)?;
		lock.sync_all().map_err(persist)?;

		std::fs::rename(&self.tmp_path, &self.path).map_err(persist)?;
		Ok(())
	}

	/// Read-modify-write under the in-process mutex. The closure sees the
	/// authoritative mapping, not a cached snapshot.
	pub async fn update<R>(&self, f: impl FnOnce(&mut Records) -> R) -> Result<R, Error> {
		let _guard = self.write_guard.lock().await;
		let mut records = self.load();
		let result = f(&mut records);
		self.save(&records)?;
		Ok(result)
	}
}
