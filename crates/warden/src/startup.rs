use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use crate::paths::WardenPaths;
use crate::types::Records;
use crate::venv;

/// Render the boot script: one background launch per autostart record, with
/// the directory change and optional venv activation spelled out. The script
/// is a derived artifact; its content is fully determined by the store
/// snapshot it was rendered from.
pub fn render(records: &Records) -> String {
	let mut script = String::from("#!/bin/bash\n# generated by warden; do not edit\n");
	for (name, record) in records {
		if !record.autostart {
			continue;
		}
		script.push_str(&format!("# {}\n", name));
		let mut line = format!("cd {}", quote(&record.directory.to_string_lossy()));
		if let Some(venv_path) = venv::find_venv(&record.directory) {
			line.push_str(&format!(
				" && . {}/bin/activate",
				quote(&venv_path.to_string_lossy())
			));
		}
		line.push_str(&format!(" && {} &\n", record.command));
		script.push_str(&line);
	}
	script
}

/// Write the rendered script to its fixed location, executable.
pub fn write(paths: &WardenPaths, records: &Records) -> std::io::Result<PathBuf> {
	let path = paths.startup_script_path();
	if let Some(dir) = path.parent() {
		std::fs::create_dir_all(dir)?;
	}
	std::fs::write(&path, render(records))?;
	std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
	Ok(path)
}

/// Single-quote for sh, escaping embedded quotes.
fn quote(raw: &str) -> String {
	format!("'{}'", raw.replace('\'', r"'\''"))
}
