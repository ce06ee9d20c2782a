//! Client driver: composes Scanner, Planner, and the Transfer Engine
//! against a remote session for one push or pull (§4.4).

use crate::config::Config;
use crate::crypto::SymmetricKey;
use crate::error::{ConflictError, ProtocolError, SyncError};
use crate::protocol::messages::{
	Conflict, DeleteFile, ErrorMessage, Hello, HelloAck, SyncComplete, SyncCompleteAck, SyncPlanAck, SyncRequest,
};
use crate::protocol::{cmd, frame, Frame};
use crate::scanner::Scanner;
use crate::state::{ops, StateStore};
use crate::types::{Direction, EntryStatus, FileEntry};
use crate::{logging::info, transfer};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

pub struct SyncOutcome {
	pub new_server_version: u64,
	pub uploaded: u32,
	pub downloaded: u32,
	pub deleted: u32,
}

/// Connect to `config.server_addr` and run one full session in `direction`.
pub async fn run_session(config: &Config, direction: Direction) -> Result<SyncOutcome, SyncError> {
	let mut stream = TcpStream::connect(&config.server_addr).await.map_err(crate::error::TransportError::from)?;

	let state_store = StateStore::new(config.resolved_state_path());
	let _lock = state_store.lock().await?;
	let mut local_state = state_store.load().await?;

	let key = match &config.key_file {
		Some(path) => Some(SymmetricKey::load_from_file(path).await?),
		None => None,
	};

	let scanner = Scanner::for_config(config)?;
	let snapshot = scanner.scan(&local_state.files).await?;
	local_state.files = snapshot;

	let idle_timeout = std::time::Duration::from_secs(config.idle_timeout_secs);
	let outcome = drive_session(
		&mut stream,
		&config.managed_root,
		&scanner,
		&mut local_state,
		direction,
		key.as_ref(),
		config.compression,
		config.streaming_threshold_bytes,
		config.chunk_size_bytes,
		idle_timeout,
	)
	.await?;

	state_store.save(&local_state).await?;
	Ok(outcome)
}

async fn drive_session<S: AsyncRead + AsyncWrite + Unpin>(
	stream: &mut S,
	managed_root: &Path,
	scanner: &Scanner,
	local_state: &mut crate::types::SyncState,
	direction: Direction,
	key: Option<&SymmetricKey>,
	compression: bool,
	threshold_bytes: u64,
	chunk_bytes: usize,
	idle_timeout: std::time::Duration,
) -> Result<SyncOutcome, SyncError> {
	let hello = Hello {
		name: "duosync".to_string(),
		version: env!("CARGO_PKG_VERSION").to_string(),
		local_dir: managed_root.display().to_string(),
		client_id: local_state.client_id.clone(),
		encryption: key.is_some(),
	};
	frame::write_frame(stream, &Frame::json(cmd::HELLO, &hello)?).await?;
	let ack_frame = frame::read_frame(stream, idle_timeout).await?;
	expect_ok(&ack_frame)?;
	let _ack: HelloAck = ack_frame.parse()?;

	let request = SyncRequest {
		mode: direction,
		client_state: local_state.files.clone(),
		base_version: local_state.base_version,
		client_id: local_state.client_id.clone(),
	};
	frame::write_frame(stream, &Frame::json(cmd::SYNC_REQUEST, &request)?).await?;

	let plan_frame = frame::read_frame(stream, idle_timeout).await?;
	if plan_frame.cmd == cmd::CONFLICT {
		let conflict: Conflict = plan_frame.parse()?;
		return Err(ConflictError {
			server_version: conflict.server_version,
			conflicts: conflict.conflicts,
			message: conflict.message,
		}
		.into());
	}
	expect_ok(&plan_frame)?;
	let plan: SyncPlanAck = plan_frame.parse()?;

	match direction {
		Direction::Push => {
			run_push(stream, managed_root, scanner, local_state, &plan, key, compression, threshold_bytes, chunk_bytes, idle_timeout)
				.await
		}
		Direction::Pull => run_pull(stream, managed_root, local_state, &plan, key, chunk_bytes, idle_timeout).await,
	}
}

#[allow(clippy::too_many_arguments)]
async fn run_push<S: AsyncRead + AsyncWrite + Unpin>(
	stream: &mut S,
	managed_root: &Path,
	scanner: &Scanner,
	local_state: &mut crate::types::SyncState,
	plan: &SyncPlanAck,
	key: Option<&SymmetricKey>,
	compression: bool,
	threshold_bytes: u64,
	chunk_bytes: usize,
	idle_timeout: std::time::Duration,
) -> Result<SyncOutcome, SyncError> {
	let mut uploaded = 0u32;
	let mut deleted = 0u32;

	for path in &plan.files_to_upload {
		let version = local_state.files.get(path).map(|e| e.version).unwrap_or(1);
		let local_path = managed_root.join(path);
		transfer::send_file(stream, &local_path, path, version, key, compression, threshold_bytes, chunk_bytes, idle_timeout)
			.await?;
		info!(path = %path, "uploaded");
		uploaded += 1;
	}

	for path in &plan.files_to_delete {
		frame::write_frame(stream, &Frame::json(cmd::DELETE_FILE, &DeleteFile { path: path.clone() })?).await?;
		let reply = frame::read_frame(stream, idle_timeout).await?;
		expect_ok(&reply)?;
		ops::mark_deleted(local_state, path);
		deleted += 1;
	}

	let complete = SyncComplete { uploaded, deleted };
	frame::write_frame(stream, &Frame::json(cmd::SYNC_COMPLETE, &complete)?).await?;
	let complete_ack_frame = frame::read_frame(stream, idle_timeout).await?;
	expect_ok(&complete_ack_frame)?;
	let complete_ack: SyncCompleteAck = complete_ack_frame.parse()?;

	if uploaded + deleted > 0 {
		ops::commit_after_sync(local_state, scanner, complete_ack.new_version)
			.await
			.map_err(|e| SyncError::Io { path: Some(managed_root.display().to_string()), source: e })?;
	} else {
		local_state.base_version = complete_ack.new_version;
	}

	Ok(SyncOutcome { new_server_version: complete_ack.new_version, uploaded, downloaded: 0, deleted })
}

async fn run_pull<S: AsyncRead + AsyncWrite + Unpin>(
	stream: &mut S,
	managed_root: &Path,
	local_state: &mut crate::types::SyncState,
	plan: &SyncPlanAck,
	key: Option<&SymmetricKey>,
	chunk_bytes: usize,
	idle_timeout: std::time::Duration,
) -> Result<SyncOutcome, SyncError> {
	let mut downloaded = 0u32;

	for path in &plan.files_to_download {
		let meta_frame = frame::read_frame(stream, idle_timeout).await?;
		if meta_frame.cmd != cmd::FILE_DATA {
			return Err(ProtocolError::UnexpectedCommand { expected: "FILE_DATA", got: meta_frame.cmd }.into());
		}
		let meta: crate::protocol::messages::FileDataMeta = meta_frame.parse()?;
		frame::write_frame(stream, &Frame::empty(cmd::OK)).await?;

		let local_path = managed_root.join(path);
		transfer::receive_file(stream, &meta, &local_path, key, chunk_bytes).await?;

		let entry = FileEntry {
			digest: meta.hash.clone(),
			size: meta.size,
			modified: meta.modified,
			version: meta.version,
			status: EntryStatus::Active,
			deleted_at: None,
		};
		ops::mark_synced(local_state, path, entry);
		info!(path = %path, "downloaded");
		downloaded += 1;
	}

	let mut deleted = 0u32;
	for path in &plan.files_to_delete {
		let local_path = managed_root.join(path);
		let _ = tokio::fs::remove_file(&local_path).await;
		ops::mark_deleted(local_state, path);
		deleted += 1;
	}

	frame::write_frame(stream, &Frame::json(cmd::SYNC_COMPLETE, &SyncComplete { uploaded: 0, deleted: 0 })?).await?;
	let complete_ack_frame = frame::read_frame(stream, idle_timeout).await?;
	expect_ok(&complete_ack_frame)?;
	let complete_ack: SyncCompleteAck = complete_ack_frame.parse()?;
	local_state.base_version = complete_ack.new_version;
	local_state.sync_version = complete_ack.new_version;

	Ok(SyncOutcome { new_server_version: complete_ack.new_version, uploaded: 0, downloaded, deleted })
}

fn expect_ok(frame: &crate::protocol::Frame) -> Result<(), SyncError> {
	if frame.cmd == cmd::OK {
		return Ok(());
	}
	if frame.cmd == cmd::ERROR {
		let err: ErrorMessage = frame.parse()?;
		return Err(ProtocolError::RemoteError { message: err.message }.into());
	}
	Err(ProtocolError::UnexpectedCommand { expected: "OK", got: frame.cmd.clone() }.into())
}


// vim: ts=4
