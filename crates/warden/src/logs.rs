use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

pub fn log_path(log_dir: &Path, name: &str) -> PathBuf {
	log_dir.join(format!("{}.log", name))
}

/// Open the append-mode log sink for a process, rotating the previous file
/// aside once it exceeds `max_size_bytes`.
pub fn open_sink(log_dir: &Path, name: &str, max_size_bytes: u64) -> std::io::Result<File> {
	std::fs::create_dir_all(log_dir)?;
	let path = log_path(log_dir, name);

	if let Ok(meta) = std::fs::metadata(&path) {
		if meta.len() >= max_size_bytes {
			let rotated = log_dir.join(format!("{}.old.log", name));
			let _ = std::fs::rename(&path, &rotated);
		}
	}

	OpenOptions::new().create(true).append(true).open(&path)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use std::sync::atomic::{AtomicU32, Ordering};

	static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

	fn temp_dir(name: &str) -> PathBuf {
		let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
		let dir = std::env::temp_dir().join(format!("warden-logs-{}-{}", n, name));
		let _ = std::fs::create_dir_all(&dir);
		dir
	}

	#[test]
	fn sink_appends() {
		let dir = temp_dir("append");
		{
			let mut f = open_sink(&dir, "web", 1024).unwrap();
			f.write_all(b"one\n").unwrap();
		}
		{
			let mut f = open_sink(&dir, "web", 1024).unwrap();
			f.write_all(b"two\n").unwrap();
		}
		let content = std::fs::read_to_string(log_path(&dir, "web")).unwrap();
		assert_eq!(content, "one\ntwo\n");
		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn sink_rotates_oversized_log() {
		let dir = temp_dir("rotate");
		{
			let mut f = open_sink(&dir, "web", 4).unwrap();
			f.write_all(b"0123456789").unwrap();
		}
		let _ = open_sink(&dir, "web", 4).unwrap();
		assert!(dir.join("web.old.log").exists());
		assert_eq!(std::fs::metadata(log_path(&dir, "web")).unwrap().len(), 0);
		let _ = std::fs::remove_dir_all(&dir);
	}
}
