//! Session Coordinator (server side): one task per connection (§4.6)
//!
//! Two mutexes guard shared state: `version` (the global `sync_version`
//! counter) and `state` (the file table). Any code path needing both must
//! acquire `version` first -- see §9 "Version counter serialization".
//! `locks` is a path-keyed mutex map preventing two sessions from writing
//! the same path concurrently.

use crate::config::Config;
use crate::crypto::SymmetricKey;
use crate::error::{ConflictError, ProtocolError, SyncError};
use crate::planner::{self, Plan};
use crate::protocol::messages::{
	Conflict, ErrorMessage, GetStateAck, Hello, HelloAck, SyncComplete, SyncCompleteAck, SyncPlanAck, SyncRequest,
};
use crate::protocol::{cmd, frame, Frame};
use crate::scanner::Scanner;
use crate::state::{ops, StateStore};
use crate::transfer;
use crate::types::{Action, Direction, EntryStatus, FileEntry, SyncState};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

pub struct Server {
	pub managed_root: PathBuf,
	pub state_store: StateStore,
	pub scanner: Scanner,
	pub state: Mutex<SyncState>,
	pub version: Mutex<u64>,
	pub locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
	pub key: Option<SymmetricKey>,
	pub compression: bool,
	pub streaming_threshold_bytes: u64,
	pub chunk_size_bytes: usize,
	pub idle_timeout: std::time::Duration,
}

impl Server {
	pub async fn new(config: &Config) -> Result<Self, SyncError> {
		let state_store = StateStore::new(config.resolved_state_path());
		let state = state_store.load().await?;
		let version = state.sync_version;
		let key = match &config.key_file {
			Some(path) => Some(SymmetricKey::load_from_file(path).await?),
			None => None,
		};

		let scanner = Scanner::for_config(config)?;

		Ok(Server {
			managed_root: config.managed_root.clone(),
			state_store,
			scanner,
			state: Mutex::new(state),
			version: Mutex::new(version),
			locks: Mutex::new(HashMap::new()),
			key,
			compression: config.compression,
			streaming_threshold_bytes: config.streaming_threshold_bytes,
			chunk_size_bytes: config.chunk_size_bytes,
			idle_timeout: std::time::Duration::from_secs(config.idle_timeout_secs),
		})
	}

	async fn path_lock(&self, path: &str) -> Arc<Mutex<()>> {
		let mut locks = self.locks.lock().await;
		locks.entry(path.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
	}
}

/// Paths where `client_state` and `server_files` diverge in a way that
/// constitutes a conflict: active-active with different digests,
/// active-vs-deleted, or deleted-vs-active (§4.4 "Server conflict detection").
pub fn detect_conflicts(
	client_state: &BTreeMap<String, FileEntry>,
	server_files: &BTreeMap<String, FileEntry>,
) -> Vec<String> {
	let mut paths: Vec<&String> = client_state.keys().chain(server_files.keys()).collect();
	paths.sort();
	paths.dedup();

	paths
		.into_iter()
		.filter(|path| {
			match (client_state.get(*path), server_files.get(*path)) {
				(Some(c), Some(s)) => match (c.status, s.status) {
					(EntryStatus::Active, EntryStatus::Active) => c.digest != s.digest,
					(EntryStatus::Active, EntryStatus::Deleted) => true,
					(EntryStatus::Deleted, EntryStatus::Active) => true,
					(EntryStatus::Deleted, EntryStatus::Deleted) => false,
				},
				_ => false,
			}
		})
		.cloned()
		.collect()
}

/// Drive one client connection end-to-end: HELLO, optional GET_STATE,
/// SYNC_REQUEST, payload phase, SYNC_COMPLETE.
pub async fn handle_connection<S: AsyncRead + AsyncWrite + Unpin>(
	stream: &mut S,
	server: &Server,
) -> Result<(), SyncError> {
	let hello_frame = frame::read_frame(stream, server.idle_timeout).await?;
	if hello_frame.cmd != cmd::HELLO {
		return fail(stream, format!("expected HELLO, got {}", hello_frame.cmd)).await;
	}
	let hello: Hello = hello_frame.parse()?;

	if hello.encryption != server.key.is_some() {
		return fail(stream, "peers disagree on whether encryption is enabled".to_string()).await;
	}

	let server_version_now = *server.version.lock().await;
	let ack = HelloAck {
		name: "duosync".to_string(),
		version: env!("CARGO_PKG_VERSION").to_string(),
		sync_dir: server.managed_root.display().to_string(),
		server_version: server_version_now,
	};
	frame::write_frame(stream, &Frame::json(cmd::OK, &ack)?).await?;

	loop {
		let next = frame::read_frame(stream, server.idle_timeout).await?;
		match next.cmd.as_str() {
			cmd::GET_STATE => {
				let state = server.state.lock().await;
				let reply = GetStateAck { files: state.files.clone(), version: *server.version.lock().await };
				frame::write_frame(stream, &Frame::json(cmd::OK, &reply)?).await?;
			}
			cmd::SYNC_REQUEST => {
				let request: SyncRequest = next.parse()?;
				return handle_sync_request(stream, server, request).await;
			}
			other => {
				return fail(stream, format!("unexpected command {} outside a sync request", other)).await;
			}
		}
	}
}

async fn handle_sync_request<S: AsyncRead + AsyncWrite + Unpin>(
	stream: &mut S,
	server: &Server,
	request: SyncRequest,
) -> Result<(), SyncError> {
	// Pick up any out-of-band changes to the managed tree -- including
	// deletions, which surface as fresh tombstones -- before planning.
	let previous = server.state.lock().await.files.clone();
	let rescanned = server.scanner.scan(&previous).await?;
	{
		let mut state = server.state.lock().await;
		state.files = rescanned;
		server.state_store.save(&state).await?;
	}

	let server_version = *server.version.lock().await;
	let server_files = server.state.lock().await.files.clone();

	if request.mode == Direction::Push && request.base_version > 0 && request.base_version < server_version {
		let conflicts = detect_conflicts(&request.client_state, &server_files);
		if !conflicts.is_empty() {
			let msg = Conflict {
				server_version,
				conflicts: conflicts.clone(),
				message: "server has advanced since your last sync; pull before pushing again".to_string(),
			};
			frame::write_frame(stream, &Frame::json(cmd::CONFLICT, &msg)?).await?;
			return Err(ConflictError { server_version, conflicts, message: msg.message }.into());
		}
	}

	let plan: Plan =
		planner::plan(&request.client_state, &server_files, request.base_version, server_version, request.mode);

	if plan.has_conflict {
		let conflicts: Vec<String> =
			plan.items.iter().filter(|i| i.action == Action::Conflict).map(|i| i.path.clone()).collect();
		let msg = Conflict {
			server_version,
			conflicts: conflicts.clone(),
			message: "conflicting changes detected during planning".to_string(),
		};
		frame::write_frame(stream, &Frame::json(cmd::CONFLICT, &msg)?).await?;
		return Err(ConflictError { server_version, conflicts, message: msg.message }.into());
	}

	let ack = match request.mode {
		Direction::Push => SyncPlanAck {
			server_version,
			files_to_upload: plan.items.iter().filter(|i| i.action == Action::Upload).map(|i| i.path.clone()).collect(),
			files_to_download: Vec::new(),
			files_to_delete: plan
				.items
				.iter()
				.filter(|i| i.action == Action::DeleteRemote)
				.map(|i| i.path.clone())
				.collect(),
		},
		Direction::Pull => SyncPlanAck {
			server_version,
			files_to_upload: Vec::new(),
			files_to_download: plan
				.items
				.iter()
				.filter(|i| i.action == Action::Download)
				.map(|i| i.path.clone())
				.collect(),
			files_to_delete: plan
				.items
				.iter()
				.filter(|i| i.action == Action::DeleteLocal)
				.map(|i| i.path.clone())
				.collect(),
		},
	};
	frame::write_frame(stream, &Frame::json(cmd::OK, &ack)?).await?;

	match request.mode {
		Direction::Push => run_push_payload_phase(stream, server, &ack, server_version, &request.client_state).await,
		Direction::Pull => run_pull_payload_phase(stream, server, &ack).await,
	}
}

async fn run_push_payload_phase<S: AsyncRead + AsyncWrite + Unpin>(
	stream: &mut S,
	server: &Server,
	ack: &SyncPlanAck,
	observed_version: u64,
	client_state: &BTreeMap<String, FileEntry>,
) -> Result<(), SyncError> {
	let mut uploaded = 0u32;
	let mut deleted = 0u32;

	for _ in 0..ack.files_to_upload.len() {
		let meta_frame = frame::read_frame(stream, server.idle_timeout).await?;
		if meta_frame.cmd != cmd::FILE_DATA {
			return fail(stream, format!("expected FILE_DATA, got {}", meta_frame.cmd)).await;
		}
		let meta: crate::protocol::messages::FileDataMeta = meta_frame.parse()?;
		frame::write_frame(stream, &Frame::empty(cmd::OK)).await?;

		let guard = server.path_lock(&meta.path).await;
		let _held = guard.lock().await;

		let local_path = server.managed_root.join(&meta.path);
		transfer::receive_file(stream, &meta, &local_path, server.key.as_ref(), server.chunk_size_bytes).await?;

		let entry = FileEntry {
			digest: meta.hash.clone(),
			size: meta.size,
			modified: meta.modified,
			version: meta.version,
			status: EntryStatus::Active,
			deleted_at: None,
		};
		let mut state = server.state.lock().await;
		ops::mark_synced(&mut state, &meta.path, entry);
		uploaded += 1;
	}

	for _ in 0..ack.files_to_delete.len() {
		let del_frame = frame::read_frame(stream, server.idle_timeout).await?;
		if del_frame.cmd != cmd::DELETE_FILE {
			return fail(stream, format!("expected DELETE_FILE, got {}", del_frame.cmd)).await;
		}
		let del: crate::protocol::messages::DeleteFile = del_frame.parse()?;

		let guard = server.path_lock(&del.path).await;
		let _held = guard.lock().await;

		let local_path = server.managed_root.join(&del.path);
		let _ = tokio::fs::remove_file(&local_path).await;
		{
			let mut state = server.state.lock().await;
			ops::mark_deleted(&mut state, &del.path);
		}
		deleted += 1;
		frame::write_frame(stream, &Frame::empty(cmd::OK)).await?;
	}

	finish_session(stream, server, uploaded, deleted, observed_version, client_state).await
}

async fn run_pull_payload_phase<S: AsyncRead + AsyncWrite + Unpin>(
	stream: &mut S,
	server: &Server,
	ack: &SyncPlanAck,
) -> Result<(), SyncError> {
	let state = server.state.lock().await.clone();
	for path in &ack.files_to_download {
		let entry = match state.files.get(path) {
			Some(e) => e,
			None => continue,
		};
		let local_path = server.managed_root.join(path);
		transfer::send_file(
			stream,
			&local_path,
			path,
			entry.version,
			server.key.as_ref(),
			server.compression,
			server.streaming_threshold_bytes,
			server.chunk_size_bytes,
			server.idle_timeout,
		)
		.await?;
	}

	// Pull never mutates the server; SYNC_COMPLETE carries zero counts from
	// this side and the client reports its own local delete count.
	let complete_frame = frame::read_frame(stream, server.idle_timeout).await?;
	if complete_frame.cmd != cmd::SYNC_COMPLETE {
		return fail(stream, format!("expected SYNC_COMPLETE, got {}", complete_frame.cmd)).await;
	}
	let reply = SyncCompleteAck { new_version: *server.version.lock().await };
	frame::write_frame(stream, &Frame::json(cmd::OK, &reply)?).await?;
	Ok(())
}

/// §9 "Retry-at-commit hardening": re-validate conflicts against the
/// then-current `sync_version` (which may have advanced mid-session from
/// another client's commit) before bumping it further, with the
/// counter-then-state lock order held throughout.
async fn finish_session<S: AsyncRead + AsyncWrite + Unpin>(
	stream: &mut S,
	server: &Server,
	uploaded: u32,
	deleted: u32,
	observed_version: u64,
	client_state: &BTreeMap<String, FileEntry>,
) -> Result<(), SyncError> {
	let complete_frame = frame::read_frame(stream, server.idle_timeout).await?;
	if complete_frame.cmd != cmd::SYNC_COMPLETE {
		return fail(stream, format!("expected SYNC_COMPLETE, got {}", complete_frame.cmd)).await;
	}
	let complete: SyncComplete = complete_frame.parse()?;

	let mut version = server.version.lock().await;
	let mut state = server.state.lock().await;

	if *version > observed_version {
		let conflicts = detect_conflicts(client_state, &state.files);
		if !conflicts.is_empty() {
			let server_version = *version;
			drop(state);
			drop(version);
			let msg = Conflict {
				server_version,
				conflicts: conflicts.clone(),
				message: "server advanced mid-session; pull before retrying".to_string(),
			};
			frame::write_frame(stream, &Frame::json(cmd::CONFLICT, &msg)?).await?;
			return Err(ConflictError { server_version, conflicts, message: msg.message }.into());
		}
	}

	let new_version = if complete.uploaded + complete.deleted > 0 || uploaded + deleted > 0 {
		*version += 1;
		state.sync_version = *version;
		state.base_version = *version;
		server.state_store.save(&state).await?;
		*version
	} else {
		*version
	};

	drop(state);
	drop(version);

	frame::write_frame(stream, &Frame::json(cmd::OK, &SyncCompleteAck { new_version })?).await?;
	Ok(())
}

async fn fail<S: AsyncWrite + Unpin>(stream: &mut S, message: String) -> Result<(), SyncError> {
	let _ = frame::write_frame(stream, &Frame::json(cmd::ERROR, &ErrorMessage { message: message.clone() })?).await;
	Err(ProtocolError::RemoteError { message }.into())
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Local;

	fn active(digest: &str) -> FileEntry {
		FileEntry { digest: digest.to_string(), size: 1, modified: Local::now(), version: 1, status: EntryStatus::Active, deleted_at: None }
	}

	#[test]
	fn no_conflicts_when_tables_match() {
		let mut a = BTreeMap::new();
		a.insert("x.txt".to_string(), active("h1"));
		let conflicts = detect_conflicts(&a, &a);
		assert!(conflicts.is_empty());
	}

	#[test]
	fn conflict_on_differing_digests() {
		let mut client = BTreeMap::new();
		client.insert("x.txt".to_string(), active("client-hash"));
		let mut server = BTreeMap::new();
		server.insert("x.txt".to_string(), active("server-hash"));

		let conflicts = detect_conflicts(&client, &server);
		assert_eq!(conflicts, vec!["x.txt".to_string()]);
	}

	#[test]
	fn conflict_on_active_vs_deleted_either_direction() {
		let mut client = BTreeMap::new();
		client.insert("x.txt".to_string(), active("h"));
		let mut server = BTreeMap::new();
		server.insert("x.txt".to_string(), FileEntry::tombstone(1));
		assert_eq!(detect_conflicts(&client, &server), vec!["x.txt".to_string()]);
		assert_eq!(detect_conflicts(&server, &client), vec!["x.txt".to_string()]);
	}

	#[test]
	fn no_conflict_when_both_deleted() {
		let mut client = BTreeMap::new();
		client.insert("x.txt".to_string(), FileEntry::tombstone(1));
		let mut server = BTreeMap::new();
		server.insert("x.txt".to_string(), FileEntry::tombstone(1));
		assert!(detect_conflicts(&client, &server).is_empty());
	}
}

// vim: ts=4
