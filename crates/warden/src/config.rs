use serde::Deserialize;
use std::collections::HashMap;

use crate::paths::WardenPaths;

/// Optional global settings from `config.toml`. Every field has a default so
/// a missing or partial file is fine.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GlobalConfig {
	#[serde(default)]
	pub defaults: DefaultsConfig,
	#[serde(default)]
	pub logs: LogsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
	#[serde(default = "default_max_restarts")]
	pub max_restarts: u32,
	#[serde(default = "default_restart_delay")]
	pub restart_delay: u64,
	/// Extra environment injected into every launched child.
	#[serde(default)]
	pub env: HashMap<String, String>,
}

impl Default for DefaultsConfig {
	fn default() -> Self {
		Self {
			max_restarts: default_max_restarts(),
			restart_delay: default_restart_delay(),
			env: HashMap::new(),
		}
	}
}

fn default_max_restarts() -> u32 {
	5
}
fn default_restart_delay() -> u64 {
	3
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogsConfig {
	#[serde(default = "default_max_size")]
	pub max_size_bytes: u64,
}

impl Default for LogsConfig {
	fn default() -> Self {
		Self {
			max_size_bytes: default_max_size(),
		}
	}
}

fn default_max_size() -> u64 {
	10 * 1024 * 1024
}

pub fn load_global_config(paths: &WardenPaths) -> GlobalConfig {
	let path = paths.config_path();
	if path.exists() {
		match std::fs::read_to_string(&path) {
			Ok(content) => match toml::from_str(&content) {
				Ok(config) => return config,
				Err(e) => {
					tracing::warn!("failed to parse {}: {}", path.display(), e)
				}
			},
			Err(e) => tracing::warn!("failed to read {}: {}", path.display(), e),
		}
	}
	GlobalConfig::default()
}
