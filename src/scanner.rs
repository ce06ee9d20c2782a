//! Scanner & Hasher: walks the managed root and produces a transport snapshot

use crate::exclusion::PatternMatcher;
use crate::types::{EntryStatus, FileEntry};
use crate::util::normalize_path;
use chrono::{DateTime, Local};
use ignore::WalkBuilder;
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;

const HASH_CHUNK_SIZE: usize = 4096;

/// Classification of a path relative to previously stored state
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Change {
	Added,
	Modified,
	Deleted,
	Unchanged,
}

pub struct Scanner {
	root: PathBuf,
	excludes: Option<Arc<PatternMatcher>>,
}

impl Scanner {
	pub fn new(root: PathBuf) -> Self {
		Scanner { root, excludes: None }
	}

	pub fn with_excludes(root: PathBuf, excludes: Arc<PatternMatcher>) -> Self {
		Scanner { root, excludes: Some(excludes) }
	}

	/// Build a scanner honoring `config.exclude_patterns`.
	pub fn for_config(config: &crate::config::Config) -> Result<Self, crate::exclusion::ExclusionError> {
		if config.exclude_patterns.is_empty() {
			Ok(Scanner::new(config.managed_root.clone()))
		} else {
			let matcher = PatternMatcher::new(&config.exclude_patterns)?;
			Ok(Scanner::with_excludes(config.managed_root.clone(), Arc::new(matcher)))
		}
	}

	/// Walk the managed root and build the transport snapshot (§4.2).
	///
	/// `previous` is the caller's last-known per-path state, used to carry
	/// forward versions for unchanged content and to emit fresh tombstones
	/// for paths that disappeared.
	pub async fn scan(
		&self,
		previous: &BTreeMap<String, FileEntry>,
	) -> io::Result<BTreeMap<String, FileEntry>> {
		let mut snapshot = BTreeMap::new();
		let mut seen = std::collections::BTreeSet::new();

		let state_file_name = ".duosync_state.json".to_string();
		let root = self.root.clone();
		let excludes = self.excludes.clone();
		let entries = tokio::task::spawn_blocking(move || collect_files(&root, &state_file_name, excludes.as_deref()))
			.await
			.expect("scanner walk task panicked")?;

		for (rel_path, abs_path, size) in entries {
			let digest = hash_file(&abs_path).await?;
			let modified = mtime_of(&abs_path)?;

			let version = match previous.get(&rel_path) {
				Some(prior) if prior.is_active() && prior.digest == digest => prior.version,
				Some(prior) => prior.version + 1, // digest changed, or resurrected from tombstone
				None => 1,
			};

			snapshot.insert(
				rel_path.clone(),
				FileEntry { digest, size, modified, version, status: EntryStatus::Active, deleted_at: None },
			);
			seen.insert(rel_path);
		}

		for (path, prior) in previous {
			if seen.contains(path) {
				continue;
			}
			match prior.status {
				EntryStatus::Deleted => {
					// Already a tombstone: carried forward unchanged.
					snapshot.insert(path.clone(), prior.clone());
				}
				EntryStatus::Active => {
					// Vanished from disk since the last scan: fresh tombstone.
					snapshot.insert(path.clone(), FileEntry::tombstone(prior.version));
				}
			}
		}

		Ok(snapshot)
	}

	/// Classify every path in `snapshot` against `previous` (added / modified
	/// / deleted / unchanged), for the `status` CLI operation.
	pub fn classify(
		snapshot: &BTreeMap<String, FileEntry>,
		previous: &BTreeMap<String, FileEntry>,
	) -> BTreeMap<String, Change> {
		let mut out = BTreeMap::new();

		for (path, entry) in snapshot {
			let change = match previous.get(path) {
				None => {
					if entry.is_active() {
						Change::Added
					} else {
						continue;
					}
				}
				Some(prior) => match (prior.status, entry.status) {
					(EntryStatus::Active, EntryStatus::Active) if prior.digest == entry.digest => {
						Change::Unchanged
					}
					(EntryStatus::Active, EntryStatus::Active) => Change::Modified,
					(EntryStatus::Active, EntryStatus::Deleted) => Change::Deleted,
					(EntryStatus::Deleted, EntryStatus::Active) => Change::Added,
					(EntryStatus::Deleted, EntryStatus::Deleted) => continue,
				},
			};
			out.insert(path.clone(), change);
		}

		out
	}
}

fn collect_files(
	root: &Path,
	state_file_name: &str,
	excludes: Option<&PatternMatcher>,
) -> io::Result<Vec<(String, PathBuf, u64)>> {
	if !root.exists() {
		return Ok(Vec::new());
	}

	let mut out = Vec::new();
	let walker = WalkBuilder::new(root)
		.hidden(true) // skip dotfiles and dot-directories
		.git_ignore(false)
		.git_global(false)
		.git_exclude(false)
		.ignore(false)
		.parents(false)
		.build();

	for result in walker {
		let entry = match result {
			Ok(e) => e,
			Err(_) => continue,
		};
		let path = entry.path();
		if path == root {
			continue;
		}
		let file_type = match entry.file_type() {
			Some(ft) => ft,
			None => continue,
		};
		if !file_type.is_file() {
			continue;
		}
		if path.file_name().map(|n| n == state_file_name).unwrap_or(false) {
			continue;
		}

		let rel = path.strip_prefix(root).unwrap_or(path);
		if let Some(matcher) = excludes {
			if matcher.is_excluded(rel) {
				continue;
			}
		}
		let rel_str = normalize_path(&rel.to_string_lossy());
		let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
		out.push((rel_str, path.to_path_buf(), size));
	}

	Ok(out)
}

async fn hash_file(path: &Path) -> io::Result<String> {
	let mut file = tokio::fs::File::open(path).await?;
	let mut hasher = Md5::new();
	let mut buf = vec![0u8; HASH_CHUNK_SIZE];

	loop {
		let n = file.read(&mut buf).await?;
		if n == 0 {
			break;
		}
		hasher.update(&buf[..n]);
	}

	Ok(hex::encode(hasher.finalize()))
}

fn mtime_of(path: &Path) -> io::Result<DateTime<Local>> {
	let meta = std::fs::metadata(path)?;
	let modified = meta.modified()?;
	Ok(DateTime::<Local>::from(modified))
}


// vim: ts=4
