use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::{getpgid, Pid};

use crate::error::Error;

const GRACE_SECS: u64 = 5;

/// Signal-0 probe. EPERM means the process exists but belongs to someone
/// else, so it counts as alive.
pub fn pid_alive(pid: u32) -> bool {
	match kill(Pid::from_raw(pid as i32), None) {
		Ok(()) => true,
		Err(Errno::EPERM) => true,
		Err(_) => false,
	}
}

/// Stop the process group rooted at `pid`: SIGTERM, poll for disappearance
/// for up to 5 seconds at 1-second resolution, then SIGKILL.
///
/// Returns Ok(true) once the group is confirmed gone or the forceful signal
/// was delivered. A pid that no longer exists is a no-op success. Unexpected
/// signaling errors are logged and returned, and the caller must not assume
/// the process stopped.
pub async fn stop_pid(pid: u32) -> Result<bool, Error> {
	if !pid_alive(pid) {
		return Ok(true);
	}

	let pgid = match getpgid(Some(Pid::from_raw(pid as i32))) {
		Ok(pgid) => pgid,
		Err(Errno::ESRCH) => return Ok(true),
		Err(errno) => {
			tracing::error!("getpgid({}) failed: {}", pid, errno);
			return Err(Error::Stop(format!("getpgid({}): {}", pid, errno)));
		}
	};

	match killpg(pgid, Signal::SIGTERM) {
		Ok(()) | Err(Errno::ESRCH) => {}
		Err(errno) => {
			tracing::error!("SIGTERM to group {} failed: {}", pgid, errno);
			return Err(Error::Stop(format!("SIGTERM to group {}: {}", pgid, errno)));
		}
	}

	for _ in 0..GRACE_SECS {
		tokio::time::sleep(Duration::from_secs(1)).await;
		if !pid_alive(pid) {
			return Ok(true);
		}
	}

	tracing::warn!("pid {} survived SIGTERM, sending SIGKILL to group {}", pid, pgid);
	match killpg(pgid, Signal::SIGKILL) {
		Ok(()) | Err(Errno::ESRCH) => Ok(true),
		Err(errno) => {
			tracing::error!("SIGKILL to group {} failed: {}", pgid, errno);
			Err(Error::Stop(format!("SIGKILL to group {}: {}", pgid, errno)))
		}
	}
}
