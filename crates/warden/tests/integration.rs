use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use warden::types::{Records, Status, Target};
use warden::{ConfigStore, Error, ProcessRecord, Supervisor, WardenPaths};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

fn temp_dir(name: &str) -> PathBuf {
	let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
	let dir = std::env::temp_dir().join(format!("warden-test-{}-{}", n, name));
	let _ = std::fs::create_dir_all(&dir);
	dir
}

/// A supervisor rooted in a throwaway directory, with fast restart defaults
/// so backoff cycles fit in test time.
fn test_supervisor(name: &str, max_restarts: u32) -> (Arc<Supervisor>, PathBuf) {
	let root = temp_dir(name);
	let config_dir = root.join("config");
	let _ = std::fs::create_dir_all(&config_dir);
	std::fs::write(
		config_dir.join("config.toml"),
		format!("[defaults]\nmax_restarts = {}\nrestart_delay = 1\n", max_restarts),
	)
	.unwrap();
	(Supervisor::with_paths(WardenPaths::at_root(root.clone())), root)
}

async fn wait_for(store: &ConfigStore, timeout_secs: u64, cond: impl Fn(&Records) -> bool) -> bool {
	let deadline = Instant::now() + Duration::from_secs(timeout_secs);
	loop {
		if cond(&store.load()) {
			return true;
		}
		if Instant::now() >= deadline {
			return false;
		}
		tokio::time::sleep(Duration::from_millis(200)).await;
	}
}

fn pid_exists(pid: u32) -> bool {
	warden::stop::pid_alive(pid)
}

// --- start / list ---

#[tokio::test]
async fn start_then_list_shows_running() {
	let (sup, root) = test_supervisor("start-list", 5);
	let workdir = temp_dir("start-list-workdir");

	let pid = sup.start("sleeper", &workdir, "sleep 60").await.unwrap();
	assert!(pid > 0);
	assert!(pid_exists(pid));

	let rows: Vec<_> = sup.list().collect();
	assert_eq!(rows.len(), 1);
	assert_eq!(rows[0].name, "sleeper");
	assert_eq!(rows[0].status, Status::Running);
	assert_eq!(rows[0].pid, Some(pid));
	assert_eq!(rows[0].restart_count, 0);

	sup.stop(&Target::All).await.unwrap();
	assert!(!pid_exists(pid));

	let _ = std::fs::remove_dir_all(&root);
	let _ = std::fs::remove_dir_all(&workdir);
}

#[tokio::test]
async fn duplicate_start_is_rejected() {
	let (sup, root) = test_supervisor("duplicate", 5);
	let workdir = temp_dir("duplicate-workdir");

	let pid = sup.start("web", &workdir, "sleep 60").await.unwrap();
	let err = sup.start("web", &workdir, "sleep 60").await.unwrap_err();
	assert!(matches!(err, Error::Validation(_)), "got {:?}", err);

	// The first record is untouched.
	let records = sup.store.load();
	assert_eq!(records["web"].pid, Some(pid));
	assert!(pid_exists(pid));

	sup.stop(&Target::All).await.unwrap();
	let _ = std::fs::remove_dir_all(&root);
	let _ = std::fs::remove_dir_all(&workdir);
}

#[tokio::test]
async fn bad_name_is_rejected() {
	let (sup, root) = test_supervisor("bad-name", 5);
	let workdir = temp_dir("bad-name-workdir");

	for name in ["has space", "slash/y", "all", ""] {
		let err = sup.start(name, &workdir, "sleep 60").await.unwrap_err();
		assert!(matches!(err, Error::Validation(_)), "{:?} accepted", name);
	}
	assert!(sup.store.load().is_empty());

	let _ = std::fs::remove_dir_all(&root);
	let _ = std::fs::remove_dir_all(&workdir);
}

#[tokio::test]
async fn missing_script_spawns_nothing() {
	let (sup, root) = test_supervisor("no-script", 5);
	let workdir = temp_dir("no-script-workdir");

	let err = sup.start("app", &workdir, "sh app.sh").await.unwrap_err();
	assert!(err.to_string().contains("script not found"), "{}", err);
	assert!(sup.store.load().is_empty());

	let _ = std::fs::remove_dir_all(&root);
	let _ = std::fs::remove_dir_all(&workdir);
}

// --- restart monitor ---

#[tokio::test]
async fn crashed_process_restarts_until_failed() {
	let (sup, root) = test_supervisor("crash-cycle", 1);
	let workdir = temp_dir("crash-cycle-workdir");

	sup.start("flaky", &workdir, "sleep 0.2").await.unwrap();

	// One automatic relaunch is allowed, then the ceiling trips and the
	// record goes FAILED with its pid cleared.
	let failed = wait_for(&sup.store, 20, |records| {
		records["flaky"].status == Status::Failed
	})
	.await;
	assert!(failed, "record never reached FAILED: {:?}", sup.store.load());

	let record = sup.store.load()["flaky"].clone();
	assert_eq!(record.restart_count, 1);
	assert_eq!(record.pid, None);

	// Exhaustion is terminal: nothing relaunches afterwards.
	tokio::time::sleep(Duration::from_secs(3)).await;
	assert_eq!(sup.store.load()["flaky"].restart_count, 1);

	let _ = std::fs::remove_dir_all(&root);
	let _ = std::fs::remove_dir_all(&workdir);
}

#[tokio::test]
async fn restart_increments_by_one_per_cycle() {
	let (sup, root) = test_supervisor("one-cycle", 5);
	let workdir = temp_dir("one-cycle-workdir");

	let first_pid = sup.start("flaky", &workdir, "sleep 0.2").await.unwrap();

	let relaunched = wait_for(&sup.store, 10, |records| {
		records["flaky"].restart_count == 1
	})
	.await;
	assert!(relaunched, "no relaunch observed: {:?}", sup.store.load());

	let record = sup.store.load()["flaky"].clone();
	assert_eq!(record.status, Status::Running);
	assert_ne!(record.pid, Some(first_pid));
	assert!(record.pid.is_some());

	sup.delete(&Target::All).await.unwrap();
	let _ = std::fs::remove_dir_all(&root);
	let _ = std::fs::remove_dir_all(&workdir);
}

#[tokio::test]
async fn stopped_process_is_not_revived() {
	let (sup, root) = test_supervisor("stop-race", 5);
	let workdir = temp_dir("stop-race-workdir");

	let pid = sup.start("svc", &workdir, "sleep 60").await.unwrap();
	sup.stop(&Target::Name("svc".to_string())).await.unwrap();
	assert!(!pid_exists(pid));

	// The monitor was cancelled before the kill; give a would-be restart
	// window longer than the backoff delay and verify nothing came back.
	tokio::time::sleep(Duration::from_secs(3)).await;
	let record = sup.store.load()["svc"].clone();
	assert_eq!(record.status, Status::Stopped);
	assert_eq!(record.pid, None);
	assert_eq!(record.restart_count, 0);

	let _ = std::fs::remove_dir_all(&root);
	let _ = std::fs::remove_dir_all(&workdir);
}

// --- stop primitive ---

#[tokio::test]
async fn stop_all_handles_sigterm_ignorers() {
	let (sup, root) = test_supervisor("kill-path", 5);
	let workdir = temp_dir("kill-path-workdir");
	std::fs::write(
		workdir.join("stubborn.sh"),
		"trap '' TERM\nwhile true; do sleep 60; done\n",
	)
	.unwrap();

	let polite = sup.start("polite", &workdir, "sleep 60").await.unwrap();
	let stubborn = sup.start("stubborn", &workdir, "sh stubborn.sh").await.unwrap();

	let started = Instant::now();
	let stopped = sup.stop(&Target::All).await.unwrap();
	assert_eq!(stopped.len(), 2);
	// The stubborn one rides out the 5s grace period before SIGKILL.
	assert!(started.elapsed() < Duration::from_secs(15));

	tokio::time::sleep(Duration::from_millis(200)).await;
	assert!(!pid_exists(polite));
	assert!(!pid_exists(stubborn));
	for record in sup.store.load().values() {
		assert_eq!(record.status, Status::Stopped);
		assert_eq!(record.pid, None);
	}

	let _ = std::fs::remove_dir_all(&root);
	let _ = std::fs::remove_dir_all(&workdir);
}

#[tokio::test]
async fn stop_unknown_name_is_not_found() {
	let (sup, root) = test_supervisor("stop-unknown", 5);
	let err = sup.stop(&Target::Name("ghost".to_string())).await.unwrap_err();
	assert!(matches!(err, Error::NotFound(_)));
	let _ = std::fs::remove_dir_all(&root);
}

// --- facade: restart / delete / configure ---

#[tokio::test]
async fn manual_restart_gets_a_new_pid() {
	let (sup, root) = test_supervisor("manual-restart", 5);
	let workdir = temp_dir("manual-restart-workdir");

	let first = sup.start("svc", &workdir, "sleep 60").await.unwrap();
	let restarted = sup.restart(&Target::Name("svc".to_string())).await.unwrap();
	assert_eq!(restarted.len(), 1);
	let (_, second) = restarted[0].clone();

	assert_ne!(first, second);
	assert!(!pid_exists(first));
	assert!(pid_exists(second));

	// Manual restarts do not count toward the automatic ceiling.
	let record = sup.store.load()["svc"].clone();
	assert_eq!(record.restart_count, 0);
	assert_eq!(record.pid, Some(second));

	sup.stop(&Target::All).await.unwrap();
	let _ = std::fs::remove_dir_all(&root);
	let _ = std::fs::remove_dir_all(&workdir);
}

#[tokio::test]
async fn delete_all_stops_and_empties() {
	let (sup, root) = test_supervisor("delete-all", 5);
	let workdir = temp_dir("delete-all-workdir");

	let a = sup.start("alpha", &workdir, "sleep 60").await.unwrap();
	let b = sup.start("beta", &workdir, "sleep 60").await.unwrap();

	let deleted = sup.delete(&Target::All).await.unwrap();
	assert_eq!(deleted.len(), 2);
	assert!(sup.store.load().is_empty());
	assert!(!pid_exists(a));
	assert!(!pid_exists(b));

	let _ = std::fs::remove_dir_all(&root);
	let _ = std::fs::remove_dir_all(&workdir);
}

#[tokio::test]
async fn configure_validates_values() {
	let (sup, root) = test_supervisor("configure", 5);
	let workdir = temp_dir("configure-workdir");

	sup.start("svc", &workdir, "sleep 60").await.unwrap();

	let err = sup.configure("svc", "max_restarts", "lots").await.unwrap_err();
	assert!(matches!(err, Error::Validation(_)));
	let err = sup.configure("svc", "max_restarts", "0").await.unwrap_err();
	assert!(matches!(err, Error::Validation(_)));
	let err = sup.configure("ghost", "max_restarts", "3").await.unwrap_err();
	assert!(matches!(err, Error::NotFound(_)));
	let err = sup.configure("svc", "no_such_key", "3").await.unwrap_err();
	assert!(matches!(err, Error::Validation(_)));

	sup.configure("svc", "max_restarts", "9").await.unwrap();
	sup.configure("svc", "autostart", "true").await.unwrap();
	let record = sup.store.load()["svc"].clone();
	assert_eq!(record.max_restarts, 9);
	assert!(record.autostart);

	sup.stop(&Target::All).await.unwrap();
	let _ = std::fs::remove_dir_all(&root);
	let _ = std::fs::remove_dir_all(&workdir);
}

// --- shutdown coordinator ---

#[tokio::test]
async fn shutdown_all_stops_everything_and_persists_once() {
	let (sup, root) = test_supervisor("shutdown", 5);
	let workdir = temp_dir("shutdown-workdir");

	let a = sup.start("alpha", &workdir, "sleep 60").await.unwrap();
	let b = sup.start("beta", &workdir, "sleep 60").await.unwrap();

	sup.shutdown_all().await;
	// Idempotent under repeated delivery.
	sup.shutdown_all().await;

	assert!(!pid_exists(a));
	assert!(!pid_exists(b));
	for record in sup.store.load().values() {
		assert_eq!(record.status, Status::Stopped);
		assert_eq!(record.pid, None);
	}

	let _ = std::fs::remove_dir_all(&root);
	let _ = std::fs::remove_dir_all(&workdir);
}

// --- adoption across supervisor restarts ---

#[tokio::test]
async fn resume_adopts_persisted_pid_and_restarts_it() {
	let (sup, root) = test_supervisor("resume", 5);
	let workdir = temp_dir("resume-workdir");

	// A process launched by a previous supervisor incarnation: spawn it
	// out-of-band and persist its record as RUNNING.
	let mut child = tokio::process::Command::new("sh")
		.args(["-c", "sleep 60"])
		.current_dir(&workdir)
		.process_group(0)
		.spawn()
		.unwrap();
	let pid = child.id().unwrap();

	sup.store
		.update(|records| {
			let mut record =
				ProcessRecord::new("sleep 60".to_string(), workdir.clone(), pid);
			record.restart_delay_secs = 1;
			records.insert("adopted".to_string(), record);
		})
		.await
		.unwrap();

	sup.resume().await;

	// Kill it externally; the adopted monitor notices via polling and
	// relaunches through the normal backoff path.
	use nix::sys::signal::{kill, Signal};
	use nix::unistd::Pid;
	kill(Pid::from_raw(pid as i32), Signal::SIGKILL).unwrap();
	// Reap it ourselves; a zombie would still show up in the process table
	// and the adopted monitor would never see it exit.
	let _ = child.wait().await;

	let relaunched = wait_for(&sup.store, 10, |records| {
		let rec = &records["adopted"];
		rec.restart_count == 1 && rec.pid != Some(pid) && rec.pid.is_some()
	})
	.await;
	assert!(relaunched, "adopted process was not relaunched: {:?}", sup.store.load());

	sup.delete(&Target::All).await.unwrap();
	let _ = std::fs::remove_dir_all(&root);
	let _ = std::fs::remove_dir_all(&workdir);
}
