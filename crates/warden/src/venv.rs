use std::path::{Path, PathBuf};

const VENV_CANDIDATES: &[&str] = &["venv", ".venv", "env", ".env", "."];

/// Probe for a Python virtual environment under `directory` or its parent.
///
/// Pure filesystem lookup: checks the usual candidate subdirectories for a
/// `bin/activate`, and recognizes being pointed inside a venv already (an
/// `activate` directly under the candidate).
pub fn find_venv(directory: &Path) -> Option<PathBuf> {
	if let Some(found) = probe_dir(directory) {
		return Some(found);
	}
	directory.parent().and_then(probe_dir)
}

fn probe_dir(base: &Path) -> Option<PathBuf> {
	for candidate in VENV_CANDIDATES {
		let venv_path = base.join(candidate);
		if venv_path.join("bin").join("activate").exists() {
			return Some(venv_path);
		}
		// Already inside a venv's bin-adjacent layout.
		if venv_path.join("activate").exists() {
			return venv_path.parent().map(Path::to_path_buf);
		}
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

	fn temp_dir(name: &str) -> PathBuf {
		let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
		let dir = std::env::temp_dir().join(format!("warden-venv-{}-{}", n, name));
		let _ = std::fs::create_dir_all(&dir);
		dir
	}

	#[test]
	fn finds_venv_subdirectory() {
		let dir = temp_dir("subdir");
		let bin = dir.join(".venv").join("bin");
		std::fs::create_dir_all(&bin).unwrap();
		std::fs::write(bin.join("activate"), "").unwrap();

		assert_eq!(find_venv(&dir), Some(dir.join(".venv")));
		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn finds_venv_in_parent() {
		let parent = temp_dir("parent");
		let project = parent.join("app");
		let bin = parent.join("venv").join("bin");
		std::fs::create_dir_all(&project).unwrap();
		std::fs::create_dir_all(&bin).unwrap();
		std::fs::write(bin.join("activate"), "").unwrap();

		assert_eq!(find_venv(&project), Some(parent.join("venv")));
		let _ = std::fs::remove_dir_all(&parent);
	}

	#[test]
	fn none_without_activate() {
		let dir = temp_dir("none");
		std::fs::create_dir_all(dir.join("venv")).unwrap();
		assert_eq!(find_venv(&dir), None);
		let _ = std::fs::remove_dir_all(&dir);
	}
}
