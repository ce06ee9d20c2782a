//! State Store: persistence for per-party [`SyncState`]

use crate::error::StateError;
use crate::scanner::Scanner;
use crate::types::{EntryStatus, FileEntry, SyncState};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// Owns the on-disk state file for one managed directory
pub struct StateStore {
	state_path: PathBuf,
}

impl StateStore {
	pub fn new(state_path: PathBuf) -> Self {
		StateStore { state_path }
	}

	pub fn state_path(&self) -> &Path {
		&self.state_path
	}

	/// Read the state file if present; on missing or malformed content,
	/// return a fresh empty state. Malformed files are never overwritten
	/// here -- the caller decides whether to `save` over them.
	pub async fn load(&self) -> Result<SyncState, StateError> {
		if !self.state_path.exists() {
			return Ok(SyncState::new_empty());
		}

		let contents = tokio::fs::read_to_string(&self.state_path)
			.await
			.map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;

		match serde_json::from_str(&contents) {
			Ok(state) => Ok(state),
			Err(e) => {
				tracing::warn!(
					path = %self.state_path.display(),
					error = %e,
					"state file malformed, starting from an empty state"
				);
				Ok(SyncState::new_empty())
			}
		}
	}

	/// Atomic write: write to a sibling temp path, then rename over the target
	pub async fn save(&self, state: &SyncState) -> Result<(), StateError> {
		if let Some(parent) = self.state_path.parent() {
			if !parent.as_os_str().is_empty() {
				tokio::fs::create_dir_all(parent)
					.await
					.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
			}
		}

		let json = serde_json::to_string_pretty(state)
			.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;

		let tmp_path = self.tmp_path();
		tokio::fs::write(&tmp_path, json)
			.await
			.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;

		tokio::fs::rename(&tmp_path, &self.state_path)
			.await
			.map_err(|e| StateError::SaveFailed { source: Box::new(e) })
	}

	fn tmp_path(&self) -> PathBuf {
		let file_name =
			self.state_path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
		self.state_path.with_file_name(format!(".{}.tmp", file_name))
	}

	/// Acquire an advisory lock guarding this profile against a second
	/// concurrent client process. Server-side concurrency uses a mutex
	/// instead (see [`crate::session`]).
	pub async fn lock(&self) -> Result<StateLock, StateError> {
		let lock_path = self.lock_path();

		if lock_path.exists() {
			return Err(StateError::LockFailed {
				message: format!(
					"sync already in progress (lock file exists). If stale, delete: {}",
					lock_path.display()
				),
			});
		}

		if let Some(parent) = lock_path.parent() {
			if !parent.as_os_str().is_empty() {
				let _ = tokio::fs::create_dir_all(parent).await;
			}
		}

		let pid = std::process::id();
		tokio::fs::write(&lock_path, pid.to_string())
			.await
			.map_err(|e| StateError::LockFailed { message: format!("failed to create lock file: {}", e) })?;

		Ok(StateLock { path: lock_path })
	}

	fn lock_path(&self) -> PathBuf {
		let file_name =
			self.state_path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
		self.state_path.with_file_name(format!(".{}.lock", file_name))
	}
}

/// RAII lock guard, removed on `Drop` whether the session succeeded or failed
pub struct StateLock {
	path: PathBuf,
}

impl Drop for StateLock {
	fn drop(&mut self) {
		let _ = std::fs::remove_file(&self.path);
	}
}

/// Operations on an in-memory [`SyncState`], mirroring §4.1.
///
/// These are plain functions over `&mut SyncState` rather than methods on
/// [`StateStore`] -- the store only owns persistence, not mutation policy.
pub mod ops {
	use super::*;

	/// If an active entry exists at `path`, replace it with a tombstone at
	/// `version + 1`; otherwise no-op.
	pub fn mark_deleted(state: &mut SyncState, path: &str) {
		let version = match state.files.get(path) {
			Some(entry) if entry.is_active() => entry.version,
			_ => return,
		};
		state.files.insert(path.to_string(), FileEntry::tombstone(version));
	}

	/// Install an entry verbatim, used by receivers after a verified download.
	pub fn mark_synced(state: &mut SyncState, path: &str, entry: FileEntry) {
		state.files.insert(path.to_string(), entry);
	}

	/// Replace the table with a fresh scan via `scanner`, merged with
	/// retained tombstones, and set both version fields to `server_version`.
	pub async fn commit_after_sync(
		state: &mut SyncState,
		scanner: &Scanner,
		server_version: u64,
	) -> std::io::Result<()> {
		let snapshot = scanner.scan(&state.files).await?;
		state.files = snapshot;
		state.base_version = server_version;
		state.sync_version = server_version;
		state.last_sync_time = Local::now();
		Ok(())
	}

	/// Drop tombstones whose `deleted_at` predates `cutoff`.
	///
	/// Policy knob from §3: tombstones persist indefinitely unless an
	/// operator explicitly opts into pruning (CLI `status --prune`); nothing
	/// calls this automatically.
	pub fn prune_tombstones(state: &mut SyncState, cutoff: DateTime<Local>) -> usize {
		let before = state.files.len();
		state.files.retain(|_, entry| match entry.status {
			EntryStatus::Active => true,
			EntryStatus::Deleted => entry.deleted_at.map(|d| d >= cutoff).unwrap_or(true),
		});
		before - state.files.len()
	}
}


// vim: ts=4
