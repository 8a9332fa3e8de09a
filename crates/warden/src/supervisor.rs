use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tokio::sync::{watch, RwLock};

use crate::config::{self, GlobalConfig};
use crate::error::Error;
use crate::launcher::Launcher;
use crate::monitor::{self, ExitWatch};
use crate::paths::WardenPaths;
use crate::sample::CpuSampler;
use crate::stop::{pid_alive, stop_pid};
use crate::store::ConfigStore;
use crate::types::{validate_name, ProcessRecord, Status, Target};

/// The supervision facade. All mutations flow through the store; monitors
/// and facade operations coordinate through the per-name cancellation
/// registry and through store reloads.
pub struct Supervisor {
	pub paths: WardenPaths,
	pub store: ConfigStore,
	pub config: GlobalConfig,
	pub(crate) launcher: Launcher,
	monitors: RwLock<HashMap<String, MonitorHandle>>,
	monitor_seq: AtomicU64,
	sampler: StdMutex<CpuSampler>,
	shutting_down: AtomicBool,
}

/// Registry entry for one supervision chain. The generation distinguishes a
/// monitor from a successor that took the same name over.
struct MonitorHandle {
	generation: u64,
	cancel: watch::Sender<bool>,
}

impl Supervisor {
	pub fn open() -> Arc<Self> {
		Self::with_paths(WardenPaths::default())
	}

	pub fn with_paths(paths: WardenPaths) -> Arc<Self> {
		let config = config::load_global_config(&paths);
		let launcher = Launcher {
			log_dir: paths.log_dir(),
			max_log_size: config.logs.max_size_bytes,
			extra_env: config.defaults.env.clone(),
		};
		Arc::new(Self {
			store: ConfigStore::new(&paths),
			launcher,
			config,
			paths,
			monitors: RwLock::new(HashMap::new()),
			monitor_seq: AtomicU64::new(0),
			sampler: StdMutex::new(CpuSampler::new()),
			shutting_down: AtomicBool::new(false),
		})
	}

	/// Launch a new managed process and persist its record. The launch runs
	/// before any state is written, so a rejected or failed launch leaves
	/// the store untouched.
	pub async fn start(
		self: &Arc<Self>,
		name: &str,
		directory: &Path,
		command: &str,
	) -> Result<u32, Error> {
		validate_name(name)?;
		if self.store.load().contains_key(name) {
			return Err(Error::Validation(format!(
				"process {:?} already exists (use restart)",
				name
			)));
		}

		let (pid, child) = self.launcher.launch(name, directory, command)?;

		let mut record = ProcessRecord::new(command.to_string(), directory.to_path_buf(), pid);
		record.max_restarts = self.config.defaults.max_restarts;
		record.restart_delay_secs = self.config.defaults.restart_delay;
		let delay = record.restart_delay_secs;

		let inserted = self
			.store
			.update(|records| {
				if records.contains_key(name) {
					false
				} else {
					records.insert(name.to_string(), record);
					true
				}
			})
			.await?;

		if !inserted {
			// Lost a race with a concurrent start of the same name; the
			// child we spawned has no record and must go.
			let _ = stop_pid(pid).await;
			return Err(Error::Validation(format!(
				"process {:?} already exists (use restart)",
				name
			)));
		}

		self.spawn_monitor(name.to_string(), pid, ExitWatch::Child(child), delay)
			.await;
		Ok(pid)
	}

	/// Stop the targeted records. Each record's monitor is cancelled before
	/// the process group is signaled, so no racing auto-restart revives it.
	/// A record whose stop fails keeps its prior state; the rest of an "all"
	/// sweep still proceeds.
	pub async fn stop(&self, target: &Target) -> Result<Vec<String>, Error> {
		let names = self.resolve(target)?;
		let mut stopped = Vec::new();
		let mut first_err = None;

		for name in names {
			self.cancel_monitor(&name).await;

			let Some(record) = self.store.load().get(&name).cloned() else {
				continue;
			};
			if let Some(pid) = record.pid {
				if let Err(e) = stop_pid(pid).await {
					tracing::error!("{}: {}", name, e);
					first_err.get_or_insert(e);
					continue;
				}
			}
			self.store
				.update(|records| {
					if let Some(rec) = records.get_mut(&name) {
						rec.pid = None;
						if rec.status.is_running() {
							rec.status = Status::Stopped;
						}
					}
				})
				.await?;
			stopped.push(name);
		}

		match first_err {
			Some(e) => Err(e),
			None => Ok(stopped),
		}
	}

	/// Stop (when running) and relaunch the targeted records with their
	/// stored directory and command. Manual restarts do not touch
	/// restart_count; that counter tracks automatic restarts only.
	pub async fn restart(self: &Arc<Self>, target: &Target) -> Result<Vec<(String, u32)>, Error> {
		let names = self.resolve(target)?;
		let mut restarted = Vec::new();

		for name in names {
			self.cancel_monitor(&name).await;

			let Some(record) = self.store.load().get(&name).cloned() else {
				continue;
			};
			if let Some(pid) = record.pid {
				stop_pid(pid).await?;
			}

			let (pid, child) = match self.launcher.launch(&name, &record.directory, &record.command)
			{
				Ok(launched) => launched,
				Err(e) => {
					// The old process is already gone; record that before
					// reporting the launch failure.
					self.store
						.update(|records| {
							if let Some(rec) = records.get_mut(&name) {
								rec.pid = None;
								if rec.status.is_running() {
									rec.status = Status::Stopped;
								}
							}
						})
						.await?;
					return Err(e.into());
				}
			};

			let delay = record.restart_delay_secs;
			self.store
				.update(|records| {
					if let Some(rec) = records.get_mut(&name) {
						rec.pid = Some(pid);
						rec.status = Status::Running;
					}
				})
				.await?;
			self.spawn_monitor(name.clone(), pid, ExitWatch::Child(child), delay)
				.await;
			restarted.push((name, pid));
		}
		Ok(restarted)
	}

	/// Stop the targeted records where running and remove them entirely.
	pub async fn delete(&self, target: &Target) -> Result<Vec<String>, Error> {
		let names = self.resolve(target)?;
		let mut deleted = Vec::new();

		for name in names {
			self.cancel_monitor(&name).await;

			if let Some(record) = self.store.load().get(&name) {
				if let Some(pid) = record.pid {
					stop_pid(pid).await?;
				}
			}
			self.store
				.update(|records| {
					records.remove(&name);
				})
				.await?;
			deleted.push(name);
		}
		Ok(deleted)
	}

	/// Update one scalar field on an existing record.
	pub async fn configure(&self, name: &str, key: &str, value: &str) -> Result<(), Error> {
		let key = key.to_string();
		let value = value.to_string();
		let name = name.to_string();
		self.store
			.update(move |records| {
				let Some(rec) = records.get_mut(&name) else {
					return Err(Error::NotFound(name.clone()));
				};
				match key.as_str() {
					"max_restarts" => {
						rec.max_restarts = parse_positive_u32(&key, &value)?;
					}
					"restart_delay" | "restart_delay_secs" => {
						rec.restart_delay_secs = u64::from(parse_positive_u32(&key, &value)?);
					}
					"autostart" => {
						rec.autostart = value.parse().map_err(|_| {
							Error::Validation(format!(
								"{} must be true or false, got {:?}",
								key, value
							))
						})?;
					}
					"command" => rec.command = value.clone(),
					"directory" => rec.directory = value.clone().into(),
					_ => {
						return Err(Error::Validation(format!("unknown config key: {}", key)));
					}
				}
				Ok(())
			})
			.await?
	}

	/// Display rows for every record. The returned iterator is consumed
	/// lazily: liveness and CPU/memory are sampled per row as callers pull
	/// them, and a record claiming RUNNING whose pid is gone shows STOPPED.
	pub fn list(&self) -> ListRows<'_> {
		ListRows {
			inner: self.store.load().into_iter(),
			sampler: &self.sampler,
		}
	}

	/// Re-attach monitors after a supervisor restart: records persisted as
	/// RUNNING are adopted by pid. A dead pid trips the adopted monitor's
	/// first liveness poll, which funnels into the normal backoff/restart
	/// path.
	pub async fn resume(self: &Arc<Self>) {
		for (name, record) in self.store.load() {
			if !record.status.is_running() {
				continue;
			}
			match record.pid {
				Some(pid) => {
					tracing::info!("resuming watch on {} (pid {})", name, pid);
					self.spawn_monitor(name, pid, ExitWatch::Pid(pid), record.restart_delay_secs)
						.await;
				}
				None => {
					// Running without a pid violates the store invariant;
					// repair rather than guess.
					let _ = self
						.store
						.update(|records| {
							if let Some(rec) = records.get_mut(&name) {
								rec.status = Status::Stopped;
							}
						})
						.await;
				}
			}
		}
	}

	/// The shutdown coordinator body: cancel every monitor, stop every live
	/// pid, persist the cleared mapping in one atomic write. Safe to invoke
	/// repeatedly; only the first call acts.
	pub async fn shutdown_all(&self) {
		if self.shutting_down.swap(true, Ordering::SeqCst) {
			return;
		}
		tracing::info!("stopping all managed processes");

		let handles: Vec<MonitorHandle> = {
			let mut monitors = self.monitors.write().await;
			monitors.drain().map(|(_, handle)| handle).collect()
		};
		for handle in handles {
			let _ = handle.cancel.send(true);
		}

		for (name, record) in self.store.load() {
			if let Some(pid) = record.pid {
				if let Err(e) = stop_pid(pid).await {
					tracing::error!("{}: {}", name, e);
				}
			}
		}

		// Clear pids and downgrade statuses in one atomic write. A monitor
		// that slipped a relaunch in between the sweep above and its
		// cancellation shows up here as a still-live pid; collect and stop
		// those too.
		let leftover = self
			.store
			.update(|records| {
				let mut live = Vec::new();
				for rec in records.values_mut() {
					if let Some(pid) = rec.pid.take() {
						if pid_alive(pid) {
							live.push(pid);
						}
					}
					if rec.status.is_running() {
						rec.status = Status::Stopped;
					}
				}
				live
			})
			.await;
		match leftover {
			Ok(pids) => {
				for pid in pids {
					if let Err(e) = stop_pid(pid).await {
						tracing::error!("pid {}: {}", pid, e);
					}
				}
			}
			Err(e) => tracing::error!("could not persist shutdown state: {}", e),
		}
	}

	fn resolve(&self, target: &Target) -> Result<Vec<String>, Error> {
		let records = self.store.load();
		match target {
			Target::All => Ok(records.keys().cloned().collect()),
			Target::Name(name) => {
				if records.contains_key(name) {
					Ok(vec![name.clone()])
				} else {
					Err(Error::NotFound(name.clone()))
				}
			}
		}
	}

	async fn spawn_monitor(
		self: &Arc<Self>,
		name: String,
		pid: u32,
		exit_watch: ExitWatch,
		delay_secs: u64,
	) {
		let generation = self.monitor_seq.fetch_add(1, Ordering::SeqCst);
		let (tx, rx) = watch::channel(false);
		{
			let mut monitors = self.monitors.write().await;
			let handle = MonitorHandle {
				generation,
				cancel: tx,
			};
			if let Some(old) = monitors.insert(name.clone(), handle) {
				let _ = old.cancel.send(true);
			}
		}
		let sup = Arc::clone(self);
		tokio::spawn(async move {
			monitor::run_monitor(sup, name, generation, pid, exit_watch, delay_secs, rx).await;
		});
	}

	pub(crate) async fn cancel_monitor(&self, name: &str) {
		if let Some(handle) = self.monitors.write().await.remove(name) {
			let _ = handle.cancel.send(true);
		}
	}

	/// Called by a monitor on exit; removes its own registry entry unless a
	/// newer chain already took the name over.
	pub(crate) async fn deregister_monitor(&self, name: &str, generation: u64) {
		let mut monitors = self.monitors.write().await;
		if monitors
			.get(name)
			.is_some_and(|handle| handle.generation == generation)
		{
			monitors.remove(name);
		}
	}
}

/// One `list` row.
#[derive(Debug, Clone)]
pub struct StatusRow {
	pub name: String,
	pub status: Status,
	pub pid: Option<u32>,
	pub cpu_percent: Option<f32>,
	pub memory_mb: Option<f64>,
	pub restart_count: u32,
	pub max_restarts: u32,
}

/// Lazy, finite, consuming sequence of display rows.
pub struct ListRows<'a> {
	inner: std::collections::btree_map::IntoIter<String, ProcessRecord>,
	sampler: &'a StdMutex<CpuSampler>,
}

impl Iterator for ListRows<'_> {
	type Item = StatusRow;

	fn next(&mut self) -> Option<StatusRow> {
		let (name, record) = self.inner.next()?;
		let live_pid = record.pid.filter(|&pid| pid_alive(pid));
		let status = match (record.status, live_pid) {
			(Status::Running, None) => Status::Stopped,
			(status, _) => status,
		};
		let (cpu_percent, memory_mb) = match live_pid {
			Some(pid) => self
				.sampler
				.lock()
				.unwrap_or_else(std::sync::PoisonError::into_inner)
				.sample(pid),
			None => (None, None),
		};
		Some(StatusRow {
			name,
			status,
			pid: live_pid,
			cpu_percent,
			memory_mb,
			restart_count: record.restart_count,
			max_restarts: record.max_restarts,
		})
	}
}

fn parse_positive_u32(key: &str, value: &str) -> Result<u32, Error> {
	let parsed: u32 = value.parse().map_err(|_| {
		Error::Validation(format!("{} must be a positive integer, got {:?}", key, value))
	})?;
	if parsed == 0 {
		return Err(Error::Validation(format!("{} must be greater than zero", key)));
	}
	Ok(parsed)
}
