use std::path::PathBuf;

/// Fixed per-user locations for everything warden persists.
#[derive(Debug, Clone)]
pub struct WardenPaths {
	pub app_name: String,
	root: Option<PathBuf>,
}

impl WardenPaths {
	pub fn new(app_name: impl Into<String>) -> Self {
		Self {
			app_name: app_name.into(),
			root: None,
		}
	}

	/// Everything under one explicit directory instead of the per-user
	/// locations. Used by tests.
	pub fn at_root(root: PathBuf) -> Self {
		Self {
			app_name: "warden".to_string(),
			root: Some(root),
		}
	}

	pub fn state_dir(&self) -> PathBuf {
		if let Some(root) = &self.root {
			root.clone()
		} else if let Ok(dir) = std::env::var("XDG_STATE_HOME") {
			PathBuf::from(dir).join(&self.app_name)
		} else if let Some(home) = home_dir() {
			home.join(".local").join("state").join(&self.app_name)
		} else {
			PathBuf::from("/tmp").join(&self.app_name)
		}
	}

	pub fn config_dir(&self) -> PathBuf {
		if let Some(root) = &self.root {
			root.join("config")
		} else if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
			PathBuf::from(dir).join(&self.app_name)
		} else if let Some(home) = home_dir() {
			home.join(".config").join(&self.app_name)
		} else {
			PathBuf::from("/tmp").join(&self.app_name).join("config")
		}
	}

	/// The store file holding every ProcessRecord.
	pub fn store_path(&self) -> PathBuf {
		self.state_dir().join("processes.json")
	}

	/// Sibling of the store file used for atomic rewrites.
	pub fn store_tmp_path(&self) -> PathBuf {
		self.state_dir().join("processes.json.tmp")
	}

	pub fn config_path(&self) -> PathBuf {
		self.config_dir().join("config.toml")
	}

	pub fn log_dir(&self) -> PathBuf {
		self.state_dir().join("logs")
	}

	/// Generated boot script enumerating autostart records.
	pub fn startup_script_path(&self) -> PathBuf {
		self.state_dir().join("startup.sh")
	}

	/// The supervisor's own PID file.
	pub fn pid_path(&self) -> PathBuf {
		self.state_dir().join("warden.pid")
	}
}

impl Default for WardenPaths {
	fn default() -> Self {
		Self::new("warden")
	}
}

fn home_dir() -> Option<PathBuf> {
	std::env::var("HOME").ok().map(PathBuf::from)
}
