#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, anyhow};
use relay_protocol::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_PORT};
use serde::Deserialize;
use tracing::info;

/// Default config path: `~/.relay/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".relay").join("config.toml"))
}

/// Load the relay config from TOML and env overrides.
#[allow(dead_code)]
pub fn load_relay_config() -> anyhow::Result<RelayConfig> {
	let path = default_config_path()?;
	load_relay_config_from_path(&path)
}

/// Same as `load_relay_config` but with an explicit config path.
pub fn load_relay_config_from_path(path: &Path) -> anyhow::Result<RelayConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = RelayConfig::from_file(file_cfg);

	apply_env_overrides(&mut cfg);

	Ok(cfg)
}

/// Relay config (v1).
#[derive(Debug, Clone)]
pub struct RelayConfig {
	/// Bind endpoint, `tcp://host:port`.
	pub listen: String,
	/// Upper bound on a single frame's payload, in bytes.
	pub max_frame_bytes: usize,
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
}

impl Default for RelayConfig {
	fn default() -> Self {
		Self {
			listen: format!("tcp://127.0.0.1:{DEFAULT_PORT}"),
			max_frame_bytes: DEFAULT_MAX_FRAME_SIZE,
			metrics_bind: None,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	server: FileServerSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	listen: Option<String>,
	max_frame_bytes: Option<usize>,
	metrics_bind: Option<String>,
}

impl RelayConfig {
	fn from_file(file: FileConfig) -> Self {
		let defaults = Self::default();
		Self {
			listen: file
				.server
				.listen
				.filter(|s| !s.trim().is_empty())
				.unwrap_or(defaults.listen),
			max_frame_bytes: file
				.server
				.max_frame_bytes
				.filter(|v| *v > 0)
				.unwrap_or(defaults.max_frame_bytes),
			metrics_bind: file.server.metrics_bind.filter(|s| !s.trim().is_empty()),
		}
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_env_overrides(cfg: &mut RelayConfig) {
	if let Ok(v) = std::env::var("RELAY_LISTEN") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.listen = v;
			info!("relay config: listen overridden by env");
		}
	}

	if let Ok(v) = std::env::var("RELAY_MAX_FRAME_BYTES")
		&& let Ok(max) = v.trim().parse::<usize>()
		&& max > 0
	{
		cfg.max_frame_bytes = max;
		info!(max, "relay config: max_frame_bytes overridden by env");
	}

	if let Ok(v) = std::env::var("RELAY_METRICS_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.metrics_bind = Some(v);
			info!("relay config: metrics_bind overridden by env");
		}
	}
}
