use std::path::PathBuf;
use std::sync::Arc;

use owo_colors::OwoColorize;
use warden::supervisor::StatusRow;
use warden::types::Target;
use warden::{cron, daemon, startup, Status, Supervisor};

#[tokio::main]
async fn main() {
	let args: Vec<String> = std::env::args().skip(1).collect();
	let daemon_run = args.first().map(|s| s.as_str()) == Some("daemon")
		&& args.get(1).map(|s| s.as_str()) == Some("run");
	init_tracing(daemon_run);

	if args.is_empty() {
		cmd_list();
		return;
	}

	match args[0].as_str() {
		"help" | "--help" | "-h" => print_usage(),
		"version" | "--version" | "-V" => println!("warden {}", env!("CARGO_PKG_VERSION")),
		"list" | "ls" | "status" | "st" => cmd_list(),
		"start" => cmd_start(&args[1..]).await,
		"stop" => cmd_stop(&args[1..]).await,
		"restart" => cmd_restart(&args[1..]).await,
		"delete" | "rm" => cmd_delete(&args[1..]).await,
		"config" => cmd_config(&args[1..]).await,
		"save" => cmd_save().await,
		"startup" => cmd_startup(&args[1..]).await,
		"daemon" => cmd_daemon(&args[1..]).await,
		unknown => {
			eprintln!("unknown command: {}", unknown);
			eprintln!("run 'warden help' for usage");
			std::process::exit(1);
		}
	}
}

fn init_tracing(verbose: bool) {
	let level = if verbose {
		tracing::Level::INFO
	} else {
		tracing::Level::WARN
	};
	tracing_subscriber::fmt().with_max_level(level).init();
}

fn print_usage() {
	eprintln!("{} {} — local process supervisor", "warden".bold(), env!("CARGO_PKG_VERSION"));
	eprintln!();
	eprintln!("usage: {} [command] [options]", "warden".bold());
	eprintln!();

	eprintln!("{}", "processes".cyan().bold());
	eprintln!("  {}                               Show every record (default)", "list".bold());
	eprintln!("  {} <name> [--dir <d>] <cmd...>  Launch and begin supervising", "start".bold());
	eprintln!("  {} <name|all>                    Stop and keep the record", "stop".bold());
	eprintln!("  {} <name|all>                 Stop then launch again", "restart".bold());
	eprintln!("  {} <name|all>                  Stop and remove the record", "delete".bold());
	eprintln!("  {} <name> <key> <value>        Update a record field", "config".bold());
	eprintln!("                                  keys: max_restarts restart_delay autostart");
	eprintln!("                                        command directory");
	eprintln!();

	eprintln!("{}", "boot".cyan().bold());
	eprintln!("  {}                               Mark all records autostart and write the boot script", "save".bold());
	eprintln!("  {} [--remove]                 Register (or remove) the boot script in crontab", "startup".bold());
	eprintln!();

	eprintln!("{}", "supervisor".cyan().bold());
	eprintln!("  {} [run|start|stop|status|restart]", "daemon".bold());
	eprintln!("                                  Manage the resident supervisor");
}

/// Terse message to the user, full context to the log, non-zero exit.
fn fail(context: &str, err: impl std::fmt::Display) -> ! {
	tracing::error!("{}: {}", context, err);
	eprintln!("error: {}", err);
	std::process::exit(1);
}

// --- Process commands ---

fn cmd_list() {
	let sup = Supervisor::open();
	let rows: Vec<StatusRow> = sup.list().collect();
	if rows.is_empty() {
		eprintln!("no managed processes");
		return;
	}

	let name_width = rows.iter().map(|r| r.name.len()).max().unwrap_or(4);
	for row in rows {
		let symbol = match row.status {
			Status::Running => "●".green().to_string(),
			Status::Stopped => "◻".dimmed().to_string(),
			Status::Failed => "⚠".yellow().to_string(),
		};
		let status = match row.status {
			Status::Running => "running".green().to_string(),
			Status::Stopped => "stopped".dimmed().to_string(),
			Status::Failed => "failed".yellow().to_string(),
		};
		let pid = row
			.pid
			.map(|p| p.to_string())
			.unwrap_or_else(|| "-".to_string());
		let cpu = row
			.cpu_percent
			.map(|c| format!("{:.1}%", c))
			.unwrap_or_else(|| "-".to_string());
		let mem = row
			.memory_mb
			.map(|m| format!("{:.1}M", m))
			.unwrap_or_else(|| "-".to_string());

		println!(
			" {} {:<width$}  {:<8} {:>7} {:>7} {:>8}  {} {}/{}",
			symbol,
			row.name,
			status,
			pid,
			cpu,
			mem,
			"restarts".dimmed(),
			row.restart_count,
			row.max_restarts,
			width = name_width,
		);
	}
}

async fn cmd_start(args: &[String]) {
	if args.is_empty() {
		eprintln!("usage: warden start <name> [--dir <path>] <command...>");
		std::process::exit(1);
	}
	let name = &args[0];

	let mut directory = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
	let mut command_parts: Vec<&str> = Vec::new();
	let mut i = 1;
	while i < args.len() {
		if args[i] == "--dir" {
			i += 1;
			if i < args.len() {
				directory = PathBuf::from(&args[i]);
			}
		} else {
			command_parts.push(&args[i]);
		}
		i += 1;
	}
	if command_parts.is_empty() {
		eprintln!("usage: warden start <name> [--dir <path>] <command...>");
		std::process::exit(1);
	}
	let command = command_parts.join(" ");

	let sup = Supervisor::open();
	match sup.start(name, &directory, &command).await {
		Ok(pid) => println!("started {} (pid {})", name, pid),
		Err(e) => fail("start", e),
	}
}

async fn cmd_stop(args: &[String]) {
	let Some(raw) = args.first() else {
		eprintln!("usage: warden stop <name|all>");
		std::process::exit(1);
	};
	let sup = Supervisor::open();
	match sup.stop(&Target::parse(raw)).await {
		Ok(names) if names.is_empty() => println!("nothing to stop"),
		Ok(names) => {
			for name in names {
				println!("stopped {}", name);
			}
		}
		Err(e) => fail("stop", e),
	}
}

async fn cmd_restart(args: &[String]) {
	let Some(raw) = args.first() else {
		eprintln!("usage: warden restart <name|all>");
		std::process::exit(1);
	};
	let sup = Supervisor::open();
	match sup.restart(&Target::parse(raw)).await {
		Ok(restarted) if restarted.is_empty() => println!("nothing to restart"),
		Ok(restarted) => {
			for (name, pid) in restarted {
				println!("restarted {} (pid {})", name, pid);
			}
		}
		Err(e) => fail("restart", e),
	}
}

async fn cmd_delete(args: &[String]) {
	let Some(raw) = args.first() else {
		eprintln!("usage: warden delete <name|all>");
		std::process::exit(1);
	};
	let sup = Supervisor::open();
	match sup.delete(&Target::parse(raw)).await {
		Ok(names) if names.is_empty() => println!("nothing to delete"),
		Ok(names) => {
			for name in names {
				println!("deleted {}", name);
			}
		}
		Err(e) => fail("delete", e),
	}
}

async fn cmd_config(args: &[String]) {
	if args.len() < 3 {
		eprintln!("usage: warden config <name> <key> <value>");
		std::process::exit(1);
	}
	let sup = Supervisor::open();
	match sup.configure(&args[0], &args[1], &args[2]).await {
		Ok(()) => println!("{}: {} = {}", args[0], args[1], args[2]),
		Err(e) => fail("config", e),
	}
}

// --- Boot commands ---

async fn cmd_save() {
	let sup = Supervisor::open();
	let result = sup
		.store
		.update(|records| {
			for rec in records.values_mut() {
				rec.autostart = true;
			}
		})
		.await;
	if let Err(e) = result {
		fail("save", e);
	}

	let records = sup.store.load();
	match startup::write(&sup.paths, &records) {
		Ok(path) => println!("saved startup script to {}", path.display()),
		Err(e) => fail("save", e),
	}
}

async fn cmd_startup(args: &[String]) {
	if args.iter().any(|a| a == "--remove") {
		match cron::disable() {
			Ok(cron::CronOutcome::Changed) => println!("autostart disabled"),
			Ok(cron::CronOutcome::Unchanged) => println!("autostart was not enabled"),
			Err(e) => fail("startup", e),
		}
		return;
	}

	// Make sure the script the crontab points at exists and is current.
	let sup = Supervisor::open();
	let records = sup.store.load();
	let script = match startup::write(&sup.paths, &records) {
		Ok(path) => path,
		Err(e) => fail("startup", e),
	};
	match cron::enable(&script) {
		Ok(cron::CronOutcome::Changed) => println!("autostart enabled on system boot"),
		Ok(cron::CronOutcome::Unchanged) => println!("autostart already enabled"),
		Err(e) => fail("startup", e),
	}
}

// --- Daemon commands ---

async fn cmd_daemon(args: &[String]) {
	let sup = Supervisor::open();
	match args.first().map(|s| s.as_str()).unwrap_or("status") {
		"run" => daemon::run(Arc::clone(&sup)).await,
		"start" => match daemon::start_background(&sup.paths) {
			Ok(()) => println!("daemon started"),
			Err(e) => fail("daemon start", e),
		},
		"stop" => match daemon::stop(&sup.paths) {
			Ok(pid) => println!("daemon stopping (pid {})", pid),
			Err(e) => fail("daemon stop", e),
		},
		"status" => match daemon::running_pid(&sup.paths) {
			Some(pid) => println!("daemon running (pid {})", pid),
			None => {
				println!("daemon not running");
				std::process::exit(1);
			}
		},
		"restart" => {
			if let Ok(pid) = daemon::stop(&sup.paths) {
				// Give the old daemon a moment to persist and exit.
				for _ in 0..50 {
					if !warden::stop::pid_alive(pid) {
						break;
					}
					tokio::time::sleep(std::time::Duration::from_millis(100)).await;
				}
			}
			match daemon::start_background(&sup.paths) {
				Ok(()) => println!("daemon restarted"),
				Err(e) => fail("daemon restart", e),
			}
		}
		other => {
			eprintln!("unknown daemon command: {}", other);
			eprintln!("usage: warden daemon [run|start|stop|status|restart]");
			std::process::exit(1);
		}
	}
}
