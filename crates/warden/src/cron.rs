use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// Marker appended to the crontab line so enable/disable can find it again.
const CRON_MARKER: &str = "# warden autostart";

#[derive(Debug, PartialEq, Eq)]
pub enum CronOutcome {
	Changed,
	/// Re-enabling when enabled (or removing when absent) is a no-op with a
	/// distinct message, not an error.
	Unchanged,
}

/// Register the startup script in the user's crontab. Idempotent.
pub fn enable(startup_script: &Path) -> std::io::Result<CronOutcome> {
	let current = read_crontab()?;
	match with_entry(&current, startup_script) {
		Some(updated) => {
			write_crontab(&updated)?;
			Ok(CronOutcome::Changed)
		}
		None => Ok(CronOutcome::Unchanged),
	}
}

/// Remove the marked line from the user's crontab. Idempotent.
pub fn disable() -> std::io::Result<CronOutcome> {
	let current = read_crontab()?;
	match without_entry(&current) {
		Some(updated) => {
			write_crontab(&updated)?;
			Ok(CronOutcome::Changed)
		}
		None => Ok(CronOutcome::Unchanged),
	}
}

pub fn entry_line(startup_script: &Path) -> String {
	format!("@reboot {} {}", startup_script.display(), CRON_MARKER)
}

/// The crontab with our entry appended, or None when already present.
fn with_entry(crontab: &str, startup_script: &Path) -> Option<String> {
	if crontab.lines().any(|line| line.contains(CRON_MARKER)) {
		return None;
	}
	let mut updated = crontab.trim_end().to_string();
	if !updated.is_empty() {
		updated.push('\n');
	}
	updated.push_str(&entry_line(startup_script));
	updated.push('\n');
	Some(updated)
}

/// The crontab with our entry stripped, or None when it was never there.
fn without_entry(crontab: &str) -> Option<String> {
	if !crontab.lines().any(|line| line.contains(CRON_MARKER)) {
		return None;
	}
	let kept: Vec<&str> = crontab
		.lines()
		.filter(|line| !line.contains(CRON_MARKER))
		.collect();
	let mut updated = kept.join("\n");
	if !updated.is_empty() {
		updated.push('\n');
	}
	Some(updated)
}

fn read_crontab() -> std::io::Result<String> {
	// `crontab -l` exits non-zero when the user has no crontab yet; that is
	// an empty table, not a failure.
	let output = Command::new("crontab").arg("-l").output()?;
	if output.status.success() {
		Ok(String::from_utf8_lossy(&output.stdout).to_string())
	} else {
		Ok(String::new())
	}
}

fn write_crontab(content: &str) -> std::io::Result<()> {
	let mut child = Command::new("crontab")
		.arg("-")
		.stdin(Stdio::piped())
		.spawn()?;
	if let Some(stdin) = child.stdin.as_mut() {
		stdin.write_all(content.as_bytes())?;
	}
	let status = child.wait()?;
	if !status.success() {
		return Err(std::io::Error::new(
			std::io::ErrorKind::Other,
			format!("crontab exited with {}", status),
		));
	}
	Ok(())
}
