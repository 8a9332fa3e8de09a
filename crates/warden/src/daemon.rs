use std::path::PathBuf;
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};

use crate::paths::WardenPaths;
use crate::stop::pid_alive;
use crate::supervisor::Supervisor;

/// Run the resident supervisor: write our PID file, re-attach monitors to
/// everything persisted as RUNNING, then wait for a termination signal. The
/// shutdown coordinator runs here, independent of any monitor loop, so
/// signals are handled promptly even while monitors sleep.
pub async fn run(sup: Arc<Supervisor>) {
	let state_dir = sup.paths.state_dir();
	let _ = std::fs::create_dir_all(&state_dir);

	let pid_path = sup.paths.pid_path();
	if let Err(e) = std::fs::write(&pid_path, std::process::id().to_string()) {
		tracing::error!("cannot write pid file {}: {}", pid_path.display(), e);
		return;
	}

	tracing::info!("warden daemon started (pid {})", std::process::id());

	sup.resume().await;

	let (mut sigterm, mut sigint) = match (
		signal(SignalKind::terminate()),
		signal(SignalKind::interrupt()),
	) {
		(Ok(t), Ok(i)) => (t, i),
		(Err(e), _) | (_, Err(e)) => {
			tracing::error!("cannot install signal handlers: {}", e);
			let _ = std::fs::remove_file(&pid_path);
			return;
		}
	};

	tokio::select! {
		_ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
		_ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
	}

	sup.shutdown_all().await;
	let _ = std::fs::remove_file(&pid_path);
}

/// Spawn `warden daemon run` detached in the background.
pub fn start_background(paths: &WardenPaths) -> Result<(), String> {
	if running_pid(paths).is_some() {
		return Err("daemon already running".to_string());
	}

	let binary = find_current_binary();
	let mut cmd = std::process::Command::new(&binary);
	cmd.args(["daemon", "run"])
		.stdout(std::process::Stdio::null())
		.stderr(std::process::Stdio::null());

	cmd.spawn()
		.map_err(|e| format!("failed to start daemon: {}", e))?;
	Ok(())
}

/// Stop the resident supervisor via its PID file; the daemon persists final
/// state and cleans up on its way out.
pub fn stop(paths: &WardenPaths) -> Result<u32, String> {
	let Some(pid) = read_pid(paths) else {
		return Err("daemon not running".to_string());
	};
	if !pid_alive(pid) {
		let _ = std::fs::remove_file(paths.pid_path());
		return Err("daemon not running (stale pid file removed)".to_string());
	}

	use nix::sys::signal::{kill, Signal};
	use nix::unistd::Pid;
	kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
		.map_err(|errno| format!("failed to signal daemon (pid {}): {}", pid, errno))?;
	Ok(pid)
}

/// The daemon's pid when its PID file points at a live process.
pub fn running_pid(paths: &WardenPaths) -> Option<u32> {
	read_pid(paths).filter(|&pid| pid_alive(pid))
}

pub fn read_pid(paths: &WardenPaths) -> Option<u32> {
	std::fs::read_to_string(paths.pid_path())
		.ok()
		.and_then(|s| s.trim().parse().ok())
}

fn find_current_binary() -> PathBuf {
	std::env::current_exe().unwrap_or_else(|_| PathBuf::from("warden"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

	fn test_paths(name: &str) -> WardenPaths {
		let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
		let dir = std::env::temp_dir().join(format!("warden-daemon-{}-{}", n, name));
		let _ = std::fs::create_dir_all(&dir);
		WardenPaths::at_root(dir)
	}

	#[test]
	fn pid_file_round_trip() {
		let paths = test_paths("roundtrip");
		std::fs::write(paths.pid_path(), "12345\n").unwrap();
		assert_eq!(read_pid(&paths), Some(12345));
		let _ = std::fs::remove_dir_all(paths.state_dir());
	}

	#[test]
	fn missing_pid_file_reads_none() {
		let paths = test_paths("missing");
		assert_eq!(read_pid(&paths), None);
		assert_eq!(running_pid(&paths), None);
		let _ = std::fs::remove_dir_all(paths.state_dir());
	}

	#[test]
	fn dead_pid_is_not_running() {
		let paths = test_paths("dead");
		std::fs::write(paths.pid_path(), "4000000").unwrap();
		assert_eq!(running_pid(&paths), None);
		let _ = std::fs::remove_dir_all(paths.state_dir());
	}

	#[test]
	fn stop_without_daemon_errors() {
		let paths = test_paths("stopless");
		assert!(stop(&paths).is_err());
		let _ = std::fs::remove_dir_all(paths.state_dir());
	}
}
