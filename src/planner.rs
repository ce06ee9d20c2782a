//! Planner: a pure function diffing two snapshots under push or pull semantics
//!
//! Kept free of I/O, time, and randomness (§9 "plan purity") so it can be
//! exhaustively table-tested over the status/version matrix in §4.3.

use crate::types::{Action, Direction, EntryStatus, FileEntry, SyncItem};
use std::collections::BTreeMap;

/// Output of [`plan`]: the ordered actions plus whether any conflict was found
pub struct Plan {
	pub items: Vec<SyncItem>,
	pub has_conflict: bool,
}

/// Diff `local` against `remote` under `direction` (§4.3).
///
/// `base_version` is the local party's last-observed remote version;
/// `remote_version` is the remote party's current version. In pull mode
/// these are ignored -- the remote is always authoritative.
pub fn plan(
	local: &BTreeMap<String, FileEntry>,
	remote: &BTreeMap<String, FileEntry>,
	base_version: u64,
	remote_version: u64,
	direction: Direction,
) -> Plan {
	let mut items = Vec::new();
	let version_diverged = base_version < remote_version;

	let mut paths: Vec<&String> = local.keys().chain(remote.keys()).collect();
	paths.sort();
	paths.dedup();

	for path in paths {
		let l = local.get(path);
		let r = remote.get(path);
		let item = match direction {
			Direction::Push => push_rule(path, l, r, version_diverged),
			Direction::Pull => pull_rule(path, l, r),
		};
		if let Some(item) = item {
			items.push(item);
		}
	}

	let has_conflict = items.iter().any(|i| i.action == Action::Conflict);
	Plan { items, has_conflict }
}

fn push_rule(
	path: &str,
	l: Option<&FileEntry>,
	r: Option<&FileEntry>,
	version_diverged: bool,
) -> Option<SyncItem> {
	let item = |action: Action, reason: &str| {
		Some(SyncItem { path: path.to_string(), action, reason: reason.to_string() })
	};

	match (status(l), status(r)) {
		(Some(Status::Active), None) => item(Action::Upload, "new local file"),

		(None, Some(Status::Active)) => {
			if version_diverged {
				item(Action::Conflict, "remote has new file unseen locally")
			} else {
				None
			}
		}

		(Some(Status::Active), Some(Status::Active)) => {
			let (l, r) = (l.unwrap(), r.unwrap());
			if l.digest == r.digest {
				None
			} else if version_diverged && r.version > l.version {
				item(Action::Conflict, "both sides modified")
			} else {
				item(Action::Upload, "local content differs from remote")
			}
		}

		(Some(Status::Active), Some(Status::Deleted)) => {
			let (l, r) = (l.unwrap(), r.unwrap());
			if l.version > r.version {
				item(Action::Upload, "resurrecting remote-deleted file")
			} else {
				item(Action::Conflict, "local modified remote-deleted")
			}
		}

		(Some(Status::Deleted), Some(Status::Active)) => {
			let (l, r) = (l.unwrap(), r.unwrap());
			if l.version > r.version {
				item(Action::DeleteRemote, "local deletion is newer")
			} else if version_diverged {
				item(Action::Conflict, "local deleted remote-modified")
			} else {
				item(Action::DeleteRemote, "local deletion, remote unchanged since base")
			}
		}

		(Some(Status::Deleted), Some(Status::Deleted)) | (Some(Status::Deleted), None) => None,

		(None, Some(Status::Deleted)) | (None, None) => None,
	}
}

fn pull_rule(path: &str, l: Option<&FileEntry>, r: Option<&FileEntry>) -> Option<SyncItem> {
	let item = |action: Action, reason: &str| {
		Some(SyncItem { path: path.to_string(), action, reason: reason.to_string() })
	};

	match (status(l), status(r)) {
		(None, Some(Status::Active)) => item(Action::Download, "new remote file"),

		(Some(Status::Active), Some(Status::Active)) => {
			let (l, r) = (l.unwrap(), r.unwrap());
			if l.digest == r.digest {
				None
			} else {
				item(Action::Download, "remote content differs, remote wins")
			}
		}

		(Some(Status::Deleted), Some(Status::Active)) => {
			item(Action::Download, "resurrecting locally-deleted file")
		}

		(Some(Status::Active), Some(Status::Deleted)) => {
			item(Action::DeleteLocal, "remote deleted this file")
		}

		(Some(Status::Deleted), Some(Status::Deleted)) => None,

		// A tombstone the local side has never seen: nothing to delete locally.
		(None, Some(Status::Deleted)) => None,

		// Pull never mutates remote; an entry missing on the remote side is left alone.
		(_, None) => None,
	}
}

#[derive(Clone, Copy)]
enum Status {
	Active,
	Deleted,
}

fn status(entry: Option<&FileEntry>) -> Option<Status> {
	entry.map(|e| if e.status == EntryStatus::Active { Status::Active } else { Status::Deleted })
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Local;

	fn active(version: u64, digest: &str) -> FileEntry {
		FileEntry {
			digest: digest.to_string(),
			size: 1,
			modified: Local::now(),
			version,
			status: EntryStatus::Active,
			deleted_at: None,
		}
	}

	fn deleted(version: u64) -> FileEntry {
		FileEntry::tombstone(version - 1)
	}

	fn one(path: &str, entry: FileEntry) -> BTreeMap<String, FileEntry> {
		let mut m = BTreeMap::new();
		m.insert(path.to_string(), entry);
		m
	}

	#[test]
	fn push_uploads_new_local_file() {
		let local = one("a.txt", active(1, "h1"));
		let remote = BTreeMap::new();
		let p = plan(&local, &remote, 0, 0, Direction::Push);
		assert_eq!(p.items.len(), 1);
		assert_eq!(p.items[0].action, Action::Upload);
		assert!(!p.has_conflict);
	}

	#[test]
	fn push_conflicts_on_remote_new_file_unseen_locally() {
		let local = BTreeMap::new();
		let remote = one("a.txt", active(1, "h1"));
		let p = plan(&local, &remote, 0, 1, Direction::Push);
		assert_eq!(p.items[0].action, Action::Conflict);
		assert!(p.has_conflict);
	}

	#[test]
	fn push_no_op_on_remote_new_file_when_not_diverged() {
		let local = BTreeMap::new();
		let remote = one("a.txt", active(1, "h1"));
		let p = plan(&local, &remote, 5, 5, Direction::Push);
		assert!(p.items.is_empty());
	}

	#[test]
	fn push_no_op_when_digests_equal() {
		let local = one("a.txt", active(3, "same"));
		let remote = one("a.txt", active(1, "same"));
		let p = plan(&local, &remote, 1, 1, Direction::Push);
		assert!(p.items.is_empty());
	}

	#[test]
	fn push_conflicts_when_both_sides_modified() {
		let local = one("a.txt", active(2, "local-hash"));
		let remote = one("a.txt", active(3, "remote-hash"));
		// base_version=1 < remote_version=3: diverged, and remote.version(3) > local.version(2)
		let p = plan(&local, &remote, 1, 3, Direction::Push);
		assert_eq!(p.items[0].action, Action::Conflict);
	}

	#[test]
	fn push_uploads_when_digests_differ_and_local_wins_race() {
		let local = one("a.txt", active(5, "local-hash"));
		let remote = one("a.txt", active(2, "remote-hash"));
		let p = plan(&local, &remote, 1, 2, Direction::Push);
		assert_eq!(p.items[0].action, Action::Upload);
	}

	#[test]
	fn push_resurrects_when_local_version_newer_than_tombstone() {
		let local = one("a.txt", active(3, "h"));
		let remote = one("a.txt", deleted(2));
		let p = plan(&local, &remote, 0, 0, Direction::Push);
		assert_eq!(p.items[0].action, Action::Upload);
	}

	#[test]
	fn push_conflicts_when_local_modified_remote_deleted() {
		let local = one("a.txt", active(2, "h"));
		let remote = one("a.txt", deleted(3));
		let p = plan(&local, &remote, 0, 0, Direction::Push);
		assert_eq!(p.items[0].action, Action::Conflict);
	}

	#[test]
	fn push_deletes_remote_when_local_deletion_newer() {
		let local = one("a.txt", deleted(3));
		let remote = one("a.txt", active(2, "h"));
		let p = plan(&local, &remote, 0, 0, Direction::Push);
		assert_eq!(p.items[0].action, Action::DeleteRemote);
	}

	#[test]
	fn push_conflicts_when_local_deleted_remote_modified_and_diverged() {
		let local = one("a.txt", deleted(2));
		let remote = one("a.txt", active(3, "h"));
		let p = plan(&local, &remote, 1, 3, Direction::Push);
		assert_eq!(p.items[0].action, Action::Conflict);
	}

	#[test]
	fn push_deletes_remote_when_not_diverged_even_if_versions_tie() {
		let local = one("a.txt", deleted(2));
		let remote = one("a.txt", active(3, "h"));
		let p = plan(&local, &remote, 3, 3, Direction::Push);
		assert_eq!(p.items[0].action, Action::DeleteRemote);
	}

	#[test]
	fn push_no_op_when_both_deleted() {
		let local = one("a.txt", deleted(2));
		let remote = one("a.txt", deleted(2));
		let p = plan(&local, &remote, 2, 2, Direction::Push);
		assert!(p.items.is_empty());
	}

	#[test]
	fn pull_downloads_new_remote_file() {
		let local = BTreeMap::new();
		let remote = one("a.txt", active(1, "h"));
		let p = plan(&local, &remote, 0, 0, Direction::Pull);
		assert_eq!(p.items[0].action, Action::Download);
	}

	#[test]
	fn pull_downloads_when_remote_content_differs() {
		let local = one("a.txt", active(1, "old"));
		let remote = one("a.txt", active(2, "new"));
		let p = plan(&local, &remote, 0, 0, Direction::Pull);
		assert_eq!(p.items[0].action, Action::Download);
	}

	#[test]
	fn pull_no_op_when_digests_equal() {
		let local = one("a.txt", active(1, "same"));
		let remote = one("a.txt", active(9, "same"));
		let p = plan(&local, &remote, 0, 0, Direction::Pull);
		assert!(p.items.is_empty());
	}

	#[test]
	fn pull_resurrects_when_remote_active_and_local_deleted() {
		let local = one("a.txt", deleted(2));
		let remote = one("a.txt", active(1, "h"));
		let p = plan(&local, &remote, 0, 0, Direction::Pull);
		assert_eq!(p.items[0].action, Action::Download);
	}

	#[test]
	fn pull_deletes_local_when_remote_deleted() {
		let local = one("a.txt", active(1, "h"));
		let remote = one("a.txt", deleted(2));
		let p = plan(&local, &remote, 0, 0, Direction::Pull);
		assert_eq!(p.items[0].action, Action::DeleteLocal);
	}

	#[test]
	fn pull_no_op_when_both_deleted() {
		let local = one("a.txt", deleted(2));
		let remote = one("a.txt", deleted(2));
		let p = plan(&local, &remote, 0, 0, Direction::Pull);
		assert!(p.items.is_empty());
	}

	#[test]
	fn pull_never_mutates_remote_when_remote_absent() {
		let local = one("a.txt", active(1, "h"));
		let remote = BTreeMap::new();
		let p = plan(&local, &remote, 0, 0, Direction::Pull);
		assert!(p.items.is_empty());

		let local2 = one("a.txt", deleted(2));
		let p2 = plan(&local2, &remote, 0, 0, Direction::Pull);
		assert!(p2.items.is_empty());
	}

	#[test]
	fn plan_is_a_pure_function_of_its_inputs() {
		let local = one("a.txt", active(2, "h1"));
		let remote = one("a.txt", active(3, "h2"));
		let p1 = plan(&local, &remote, 1, 3, Direction::Push);
		let p2 = plan(&local, &remote, 1, 3, Direction::Push);
		assert_eq!(p1.items.len(), p2.items.len());
		assert_eq!(p1.items[0].action, p2.items[0].action);
		assert_eq!(p1.has_conflict, p2.has_conflict);
	}
}

// vim: ts=4
