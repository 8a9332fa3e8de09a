use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::error::LaunchError;
use crate::logs;
use crate::venv;

/// Interpreters whose first argument names a script that must exist.
const INTERPRETERS: &[&str] = &["python", "python3", "node", "ruby", "perl", "sh", "bash"];

pub struct Launcher {
	pub log_dir: PathBuf,
	pub max_log_size: u64,
	pub extra_env: HashMap<String, String>,
}

impl Launcher {
	/// Spawn `command` in `directory` as a detached process-group leader with
	/// stdout/stderr appended to the per-process log sink.
	///
	/// Virtual-environment activation is injected as explicit environment
	/// (VIRTUAL_ENV plus a PATH prefix) instead of being spliced into the
	/// command line.
	pub fn launch(
		&self,
		name: &str,
		directory: &Path,
		command: &str,
	) -> Result<(u32, Child), LaunchError> {
		validate_command(directory, command)?;

		let sink = logs::open_sink(&self.log_dir, name, self.max_log_size)
			.map_err(LaunchError::SpawnFailed)?;
		let err_sink = sink.try_clone().map_err(LaunchError::SpawnFailed)?;

		let mut cmd = Command::new("sh");
		cmd.args(["-c", command])
			.current_dir(directory)
			.stdin(Stdio::null())
			.stdout(Stdio::from(sink))
			.stderr(Stdio::from(err_sink))
			.process_group(0);

		for (key, val) in &self.extra_env {
			cmd.env(key, val);
		}

		if let Some(venv_path) = venv::find_venv(directory) {
			let bin = venv_path.join("bin");
			let path = std::env::var("PATH").unwrap_or_default();
			cmd.env("VIRTUAL_ENV", &venv_path);
			cmd.env("PATH", format!("{}:{}", bin.display(), path));
		}

		let child = cmd.spawn().map_err(LaunchError::SpawnFailed)?;
		let pid = child.id().unwrap_or(0);
		tracing::info!("launched {} (pid {}) in {}", name, pid, directory.display());
		Ok((pid, child))
	}
}

/// Preconditions checked without touching the OS process table: the working
/// directory exists, the program resolves and is executable, and for
/// interpreter commands the script argument exists.
pub fn validate_command(directory: &Path, command: &str) -> Result<(), LaunchError> {
	if !directory.is_dir() {
		return Err(LaunchError::InvalidCommand(format!(
			"directory does not exist: {}",
			directory.display()
		)));
	}

	let tokens: Vec<&str> = command.split_whitespace().collect();
	let Some(&program) = tokens.first() else {
		return Err(LaunchError::InvalidCommand("empty command".to_string()));
	};

	if program.contains('/') {
		let path = resolve_from(directory, program);
		if !path.is_file() {
			return Err(LaunchError::InvalidCommand(format!(
				"program not found: {}",
				program
			)));
		}
		if !is_executable(&path) {
			return Err(LaunchError::InvalidCommand(format!(
				"program is not executable: {}",
				program
			)));
		}
	} else if !found_on_path(program) && !is_executable(&directory.join(program)) {
		return Err(LaunchError::InvalidCommand(format!(
			"program not found on PATH: {}",
			program
		)));
	}

	// "python3 app.py" style: the script itself must exist.
	let base = program.rsplit('/').next().unwrap_or(program);
	if INTERPRETERS.contains(&base) {
		if let Some(&script) = tokens.get(1).filter(|t| !t.starts_with('-')) {
			if !resolve_from(directory, script).exists() {
				return Err(LaunchError::InvalidCommand(format!(
					"script not found: {}",
					script
				)));
			}
		}
	}

	Ok(())
}

fn resolve_from(directory: &Path, raw: &str) -> PathBuf {
	let path = Path::new(raw);
	if path.is_absolute() {
		path.to_path_buf()
	} else {
		directory.join(path)
	}
}

fn is_executable(path: &Path) -> bool {
	path.metadata()
		.map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
		.unwrap_or(false)
}

fn found_on_path(program: &str) -> bool {
	let Ok(path_var) = std::env::var("PATH") else {
		return false;
	};
	path_var
		.split(':')
		.filter(|dir| !dir.is_empty())
		.any(|dir| is_executable(&Path::new(dir).join(program)))
}
