//! Unified configuration for duosync
//!
//! Priority chain, highest wins:
//! 1. Built-in defaults (`Config::default()`)
//! 2. Config file (`~/.config/duosync/<profile>.toml`, or `--config`)
//! 3. Environment variables (`DUOSYNC_*`)
//! 4. CLI flags

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::SyncError;

/// Default idle timeout in seconds for any one frame read (§5).
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;

/// Default whole-body/streaming cutoff (§4.5): 10 MiB.
pub const DEFAULT_STREAMING_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

/// Default wire chunk size (§4.5): 64 KiB.
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Directory being synchronized
	pub managed_root: PathBuf,

	/// State file path; defaults to `<managed_root>/.duosync_state.json`
	pub state_path: Option<PathBuf>,

	/// `host:port` the client connects to / the server binds
	pub server_addr: String,

	/// Selects a named config/state pair
	pub profile: String,

	/// Path to the base64-encoded symmetric key; `None` disables encryption
	pub key_file: Option<PathBuf>,

	/// Enables the zlib path in the Transfer Engine
	pub compression: bool,

	/// Per-socket idle timeout
	pub idle_timeout_secs: u64,

	/// The whole-body/streaming cutoff
	pub streaming_threshold_bytes: u64,

	/// The wire chunk size used for both whole-body and streaming transfers
	pub chunk_size_bytes: usize,

	/// Additional glob patterns skipped by the Scanner, beyond the built-in
	/// OS-cruft exclusions
	pub exclude_patterns: Vec<String>,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			managed_root: PathBuf::from("."),
			state_path: None,
			server_addr: "127.0.0.1:9031".to_string(),
			profile: "default".to_string(),
			key_file: None,
			compression: true,
			idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
			streaming_threshold_bytes: DEFAULT_STREAMING_THRESHOLD_BYTES,
			chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
			exclude_patterns: Vec::new(),
		}
	}
}

impl Config {
	/// Resolved state file path, applying the `<managed_root>/.duosync_state.json` default
	pub fn resolved_state_path(&self) -> PathBuf {
		self.state_path.clone().unwrap_or_else(|| self.managed_root.join(".duosync_state.json"))
	}

	/// Default config file location for a profile: `~/.config/duosync/<profile>.toml`
	pub fn default_path(profile: &str) -> Option<PathBuf> {
		let base = dirs_config_home()?;
		Some(base.join("duosync").join(format!("{}.toml", profile)))
	}

	/// Load defaults, then merge a config file (if it exists), then environment overrides.
	/// CLI flags are applied afterwards by callers (`cli.rs`) via the `apply_overrides` helpers.
	pub async fn load(config_path: Option<&std::path::Path>, profile: &str) -> Result<Self, SyncError> {
		let mut config = Config { profile: profile.to_string(), ..Config::default() };

		let path = match config_path {
			Some(p) => Some(p.to_path_buf()),
			None => Config::default_path(profile),
		};

		if let Some(path) = path {
			if path.exists() {
				let contents = tokio::fs::read_to_string(&path)
					.await
					.map_err(|e| SyncError::InvalidConfig { message: format!("reading {}: {}", path.display(), e) })?;
				let from_file: Config = toml::from_str(&contents)
					.map_err(|e| SyncError::InvalidConfig { message: format!("parsing {}: {}", path.display(), e) })?;
				config = from_file;
			}
		}

		config.apply_env_overrides();
		Ok(config)
	}

	fn apply_env_overrides(&mut self) {
		if let Ok(v) = std::env::var("DUOSYNC_MANAGED_ROOT") {
			self.managed_root = PathBuf::from(v);
		}
		if let Ok(v) = std::env::var("DUOSYNC_SERVER_ADDR") {
			self.server_addr = v;
		}
		if let Ok(v) = std::env::var("DUOSYNC_KEY_FILE") {
			self.key_file = Some(PathBuf::from(v));
		}
		if let Ok(v) = std::env::var("DUOSYNC_COMPRESSION") {
			if let Ok(b) = v.parse() {
				self.compression = b;
			}
		}
		if let Ok(v) = std::env::var("DUOSYNC_IDLE_TIMEOUT_SECS") {
			if let Ok(n) = v.parse() {
				self.idle_timeout_secs = n;
			}
		}
	}
}

fn dirs_config_home() -> Option<PathBuf> {
	if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
		if !xdg.is_empty() {
			return Some(PathBuf::from(xdg));
		}
	}
	std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config"))
}


// vim: ts=4
