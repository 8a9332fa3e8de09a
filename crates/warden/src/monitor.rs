use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::watch;

use crate::stop::{pid_alive, stop_pid};
use crate::supervisor::Supervisor;
use crate::types::Status;

const MAX_BACKOFF_SECS: u64 = 60;
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How a monitor observes its process going away.
pub enum ExitWatch {
	/// The supervisor is the direct parent and can block on wait().
	Child(Child),
	/// Adopted from a persisted pid; only the process table can be polled.
	Pid(u32),
}

impl ExitWatch {
	/// Resolves once the watched process is gone. Probe failures other than
	/// "no such process" fail open toward exited, so a restart gets
	/// attempted rather than the monitor wedging.
	async fn wait(&mut self) {
		match self {
			ExitWatch::Child(child) => match child.wait().await {
				Ok(status) => tracing::debug!("child exited with {}", status),
				Err(e) => tracing::warn!("wait failed, assuming exit: {}", e),
			},
			ExitWatch::Pid(pid) => loop {
				if !pid_alive(*pid) {
					return;
				}
				tokio::time::sleep(POLL_INTERVAL).await;
			},
		}
	}
}

/// One supervision chain: WATCHING -> BACKOFF -> relaunch -> WATCHING, until
/// the cancellation token fires, the store diverges from the watched pid, a
/// relaunch fails, or the restart ceiling is reached.
///
/// The task re-arms itself on every successful restart instead of spawning a
/// replacement. The backoff delay is per-chain state: it starts at the
/// record's configured delay and doubles per automatic restart, capped at 60
/// seconds.
pub(crate) async fn run_monitor(
	sup: Arc<Supervisor>,
	name: String,
	generation: u64,
	mut watched_pid: u32,
	mut exit_watch: ExitWatch,
	initial_delay_secs: u64,
	mut cancel: watch::Receiver<bool>,
) {
	let mut delay = initial_delay_secs.max(1);

	loop {
		tokio::select! {
			_ = exit_watch.wait() => {}
			_ = cancel.changed() => break,
		}
		if *cancel.borrow() {
			break;
		}

		tracing::info!("{} (pid {}) exited, retrying in {}s", name, watched_pid, delay);

		tokio::select! {
			_ = tokio::time::sleep(Duration::from_secs(delay)) => {}
			_ = cancel.changed() => break,
		}

		// The store is authoritative; the record may have been deleted,
		// stopped, or reconfigured while we slept.
		let Some(record) = sup.store.load().get(&name).cloned() else {
			tracing::info!("{}: record deleted, monitor stopping", name);
			break;
		};
		if record.pid != Some(watched_pid) {
			tracing::info!("{}: stopped externally, monitor stopping", name);
			break;
		}
		if record.restart_count >= record.max_restarts {
			tracing::warn!(
				"{}: restart limit reached ({}), giving up",
				name,
				record.max_restarts
			);
			mark_failed(&sup, &name).await;
			break;
		}
		// A stop may have raced in during the backoff sleep.
		if *cancel.borrow() {
			break;
		}

		match sup.launcher.launch(&name, &record.directory, &record.command) {
			Ok((new_pid, child)) => {
				let persisted = sup
					.store
					.update(|records| match records.get_mut(&name) {
						Some(rec) if rec.pid == Some(watched_pid) => {
							rec.restart_count += 1;
							rec.pid = Some(new_pid);
							rec.status = Status::Running;
							true
						}
						_ => false,
					})
					.await
					.unwrap_or(false);

				if !persisted {
					// The record vanished or diverged between reload and
					// persist; the relaunched child must not outlive it.
					let _ = stop_pid(new_pid).await;
					break;
				}

				tracing::info!("{}: relaunched as pid {}", name, new_pid);
				watched_pid = new_pid;
				exit_watch = ExitWatch::Child(child);
				delay = (delay * 2).min(MAX_BACKOFF_SECS);
			}
			Err(e) => {
				tracing::error!("{}: relaunch failed, giving up: {}", name, e);
				mark_failed(&sup, &name).await;
				break;
			}
		}
	}

	sup.deregister_monitor(&name, generation).await;
}

async fn mark_failed(sup: &Supervisor, name: &str) {
	let result = sup
		.store
		.update(|records| {
			if let Some(rec) = records.get_mut(name) {
				rec.status = Status::Failed;
				rec.pid = None;
			}
		})
		.await;
	if let Err(e) = result {
		tracing::error!("{}: could not persist failed status: {}", name, e);
	}
}
