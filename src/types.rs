//! Core data types for duosync

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status of a [`FileEntry`]: either present on disk or a deletion marker
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
	Active,
	Deleted,
}

/// An entry in a party's file table, keyed by path elsewhere
///
/// A tombstone is an entry with `status == Deleted`: `digest` is empty,
/// `size` is zero, and `deleted_at` is set.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct FileEntry {
	/// Hex MD5 of file contents; empty for tombstones
	#[serde(rename = "hash")]
	pub digest: String,

	pub size: u64,

	/// ISO-8601 local mtime at last observation
	pub modified: DateTime<Local>,

	/// Monotonically increasing per-path revision
	pub version: u64,

	pub status: EntryStatus,

	/// Present iff `status == Deleted`
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub deleted_at: Option<DateTime<Local>>,
}

impl FileEntry {
	pub fn is_active(&self) -> bool {
		self.status == EntryStatus::Active
	}

	pub fn is_tombstone(&self) -> bool {
		self.status == EntryStatus::Deleted
	}

	/// Build a fresh tombstone superseding `previous_version`
	pub fn tombstone(previous_version: u64) -> Self {
		let now = Local::now();
		FileEntry {
			digest: String::new(),
			size: 0,
			modified: now,
			version: previous_version + 1,
			status: EntryStatus::Deleted,
			deleted_at: Some(now),
		}
	}
}

/// The persisted per-party record: §3 SyncState
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncState {
	pub files: BTreeMap<String, FileEntry>,

	/// Global server version counter; on clients this mirrors `base_version`
	pub sync_version: u64,

	pub last_sync_time: DateTime<Local>,

	/// Stable short identifier for this client, assigned on first use
	pub client_id: String,

	/// The server `sync_version` observed at this party's last successful commit
	pub base_version: u64,
}

impl SyncState {
	/// A fresh, empty state with a newly generated client id
	pub fn new_empty() -> Self {
		SyncState {
			files: BTreeMap::new(),
			sync_version: 0,
			last_sync_time: Local::now(),
			client_id: generate_client_id(),
			base_version: 0,
		}
	}
}

/// 8-character random identifier, hex-encoded from 4 random bytes
pub fn generate_client_id() -> String {
	use rand::RngCore;
	let mut buf = [0u8; 4];
	rand::thread_rng().fill_bytes(&mut buf);
	hex::encode(buf)
}

/// Synchronization direction
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
	/// Local is the writer, remote is the target
	Push,
	/// Remote is authoritative
	Pull,
}

/// A single action the Planner wants executed for one path
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
	Upload,
	Download,
	DeleteLocal,
	DeleteRemote,
	Conflict,
}

/// One item in a [`crate::planner`] plan: what to do about a path, and why
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncItem {
	pub path: String,
	pub action: Action,
	pub reason: String,
}


// vim: ts=4
