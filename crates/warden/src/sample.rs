use std::collections::HashMap;
use std::time::Instant;

/// Instantaneous CPU/memory readings for `list` rows.
///
/// CPU is a delta between two time-separated observations of the process's
/// accumulated ticks; the first observation of a pid yields None rather than
/// a bogus number. Memory is a point read. Any probe failure degrades to
/// None, never an error.
pub struct CpuSampler {
	#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
	prev: HashMap<u32, (u64, Instant)>,
}

impl CpuSampler {
	pub fn new() -> Self {
		Self {
			prev: HashMap::new(),
		}
	}

	/// (cpu percent, memory in MB) for a live pid.
	pub fn sample(&mut self, pid: u32) -> (Option<f32>, Option<f64>) {
		(self.cpu_percent(pid), memory_mb(pid))
	}

	#[cfg(target_os = "linux")]
	fn cpu_percent(&mut self, pid: u32) -> Option<f32> {
		let now = Instant::now();
		let ticks = std::fs::read_to_string(format!("/proc/{}/stat", pid))
			.ok()
			.and_then(|stat| parse_stat_ticks(&stat))?;

		let previous = self.prev.insert(pid, (ticks, now));
		let (prev_ticks, prev_at) = previous?;

		let elapsed = now.duration_since(prev_at).as_secs_f64();
		if elapsed <= 0.0 || ticks < prev_ticks {
			return None;
		}
		// /proc stat times are reported in USER_HZ ticks, 100 on Linux.
		let seconds_used = (ticks - prev_ticks) as f64 / 100.0;
		Some((seconds_used / elapsed * 100.0) as f32)
	}

	#[cfg(not(target_os = "linux"))]
	fn cpu_percent(&mut self, pid: u32) -> Option<f32> {
		ps_columns(pid).map(|(cpu, _)| cpu)
	}
}

impl Default for CpuSampler {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(target_os = "linux")]
fn memory_mb(pid: u32) -> Option<f64> {
	let statm = std::fs::read_to_string(format!("/proc/{}/statm", pid)).ok()?;
	let resident_pages = parse_statm_resident(&statm)?;
	Some(resident_pages as f64 * 4096.0 / 1024.0 / 1024.0)
}

#[cfg(not(target_os = "linux"))]
fn memory_mb(pid: u32) -> Option<f64> {
	ps_columns(pid).map(|(_, rss_kb)| rss_kb / 1024.0)
}

/// Accumulated utime+stime from `/proc/<pid>/stat`. The comm field can
/// contain spaces, so fields are counted from the closing paren.
#[cfg(any(target_os = "linux", test))]
fn parse_stat_ticks(stat: &str) -> Option<u64> {
	let rest = &stat[stat.rfind(')')? + 1..];
	let fields: Vec<&str> = rest.split_whitespace().collect();
	// state is the field right after comm; utime and stime are 11 and 12
	// positions further along.
	let utime: u64 = fields.get(11)?.parse().ok()?;
	let stime: u64 = fields.get(12)?.parse().ok()?;
	Some(utime + stime)
}

#[cfg(any(target_os = "linux", test))]
fn parse_statm_resident(statm: &str) -> Option<u64> {
	statm.split_whitespace().nth(1)?.parse().ok()
}

/// `ps` fallback for platforms without procfs.
#[cfg(not(target_os = "linux"))]
fn ps_columns(pid: u32) -> Option<(f32, f64)> {
	let output = std::process::Command::new("ps")
		.args(["-o", "%cpu=,rss=", "-p", &pid.to_string()])
		.output()
		.ok()?;
	parse_ps_line(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(any(not(target_os = "linux"), test))]
fn parse_ps_line(line: &str) -> Option<(f32, f64)> {
	let mut parts = line.split_whitespace();
	let cpu: f32 = parts.next()?.parse().ok()?;
	let rss_kb: f64 = parts.next()?.parse().ok()?;
	Some((cpu, rss_kb))
}
