//! Command-line interface: `serve`, `push`, `pull`, `status`, `keygen`

use crate::config::Config;
use crate::crypto::SymmetricKey;
use crate::error::SyncError;
use crate::logging::{error, info, warn};
use crate::scanner::{Change, Scanner};
use crate::session::{handle_connection, Server};
use crate::state::{ops, StateStore};
use crate::types::Direction;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "duosync", version, about = "Two-party directory synchronizer")]
pub struct Cli {
	/// Config profile; selects `~/.config/duosync/<profile>.toml`
	#[arg(short, long, global = true, default_value = "default")]
	pub profile: String,

	/// Explicit config file, overriding the profile lookup
	#[arg(short, long, global = true)]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run as a server, accepting connections on `server_addr`
	Serve {
		/// Directory to serve
		dir: PathBuf,
	},
	/// Push local changes to the server
	Push {
		dir: PathBuf,
		#[arg(long)]
		server: Option<String>,
	},
	/// Pull remote changes from the server
	Pull {
		dir: PathBuf,
		#[arg(long)]
		server: Option<String>,
	},
	/// Report local changes against the last known state, without syncing
	Status {
		dir: PathBuf,
		/// Drop tombstones older than this many days
		#[arg(long)]
		prune: Option<i64>,
	},
	/// Generate a fresh symmetric key for encrypted sessions
	Keygen {
		/// Where to write the base64-encoded key, mode 0600
		out: PathBuf,
	},
}

pub async fn run(cli: Cli) -> Result<(), SyncError> {
	match cli.command {
		Commands::Serve { dir } => {
			let mut config = Config::load(cli.config.as_deref(), &cli.profile).await?;
			config.managed_root = dir;
			serve(config).await
		}
		Commands::Push { dir, server } => {
			let mut config = Config::load(cli.config.as_deref(), &cli.profile).await?;
			config.managed_root = dir;
			if let Some(addr) = server {
				config.server_addr = addr;
			}
			let outcome = crate::client::run_session(&config, Direction::Push).await?;
			info!(
				uploaded = outcome.uploaded,
				deleted = outcome.deleted,
				new_version = outcome.new_server_version,
				"push complete"
			);
			println!(
				"pushed: {} uploaded, {} deleted, server now at version {}",
				outcome.uploaded, outcome.deleted, outcome.new_server_version
			);
			Ok(())
		}
		Commands::Pull { dir, server } => {
			let mut config = Config::load(cli.config.as_deref(), &cli.profile).await?;
			config.managed_root = dir;
			if let Some(addr) = server {
				config.server_addr = addr;
			}
			let outcome = crate::client::run_session(&config, Direction::Pull).await?;
			info!(downloaded = outcome.downloaded, deleted = outcome.deleted, "pull complete");
			println!("pulled: {} downloaded, {} deleted locally", outcome.downloaded, outcome.deleted);
			Ok(())
		}
		Commands::Status { dir, prune } => {
			let mut config = Config::load(cli.config.as_deref(), &cli.profile).await?;
			config.managed_root = dir;
			status(&config, prune).await
		}
		Commands::Keygen { out } => {
			let key = SymmetricKey::generate();
			key.write_to_file(&out).await.map_err(SyncError::from)?;
			println!("key written to {}", out.display());
			Ok(())
		}
	}
}

async fn serve(config: Config) -> Result<(), SyncError> {
	let server = std::sync::Arc::new(Server::new(&config).await?);
	let listener = TcpListener::bind(&config.server_addr).await.map_err(|e| SyncError::Io { path: None, source: e })?;
	info!(addr = %config.server_addr, root = %config.managed_root.display(), "serving");

	loop {
		let (mut socket, peer) = match listener.accept().await {
			Ok(pair) => pair,
			Err(e) => {
				warn!(error = %e, "accept failed");
				continue;
			}
		};
		let server = server.clone();
		tokio::spawn(async move {
			info!(peer = %peer, "connection opened");
			if let Err(e) = handle_connection(&mut socket, &server).await {
				error!(peer = %peer, error = %e, "session ended with error");
			} else {
				info!(peer = %peer, "session complete");
			}
		});
	}
}

async fn status(config: &Config, prune_days: Option<i64>) -> Result<(), SyncError> {
	let state_store = StateStore::new(config.resolved_state_path());
	let mut state = state_store.load().await?;

	let scanner = Scanner::for_config(config)?;
	let snapshot = scanner.scan(&state.files).await?;
	let changes = Scanner::classify(&snapshot, &state.files);

	if changes.is_empty() {
		println!("no local changes");
	}
	for (path, change) in &changes {
		let label = match change {
			Change::Added => "added",
			Change::Modified => "modified",
			Change::Deleted => "deleted",
			Change::Unchanged => continue,
		};
		println!("{:>9}  {}", label, path);
	}

	if let Some(days) = prune_days {
		let cutoff = chrono::Local::now() - chrono::Duration::days(days);
		let dropped = ops::prune_tombstones(&mut state, cutoff);
		if dropped > 0 {
			state_store.save(&state).await?;
			println!("pruned {} tombstone(s) older than {} day(s)", dropped, days);
		}
	}

	Ok(())
}

// vim: ts=4
