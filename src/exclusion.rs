//! Glob-based path exclusion for the Scanner
//!
//! Supplements the scan with the same built-in noise filters the original
//! tool carried plus user-supplied patterns from [`crate::config::Config`].

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

#[derive(Debug)]
pub struct ExclusionError(pub String);

impl std::fmt::Display for ExclusionError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "invalid exclusion pattern: {}", self.0)
	}
}

impl std::error::Error for ExclusionError {}

const ALWAYS_EXCLUDED: &[&str] = &[
	"**/.DS_Store",
	"**/Thumbs.db",
	"**/desktop.ini",
	"**/*.swp",
	"**/*.swo",
	"**/*~",
	"**/.nfs*",
];

pub struct PatternMatcher {
	user_patterns: GlobSet,
	always_excluded: GlobSet,
}

impl PatternMatcher {
	pub fn new(user_patterns: &[String]) -> Result<Self, ExclusionError> {
		Ok(PatternMatcher {
			user_patterns: build_glob_set(user_patterns)?,
			always_excluded: build_glob_set(&ALWAYS_EXCLUDED.iter().map(|s| s.to_string()).collect::<Vec<_>>())?,
		})
	}

	pub fn is_excluded(&self, path: &Path) -> bool {
		self.always_excluded.is_match(path) || self.user_patterns.is_match(path)
	}
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet, ExclusionError> {
	let mut builder = GlobSetBuilder::new();
	for pattern in patterns {
		let glob = Glob::new(pattern).map_err(|e| ExclusionError(format!("{}: {}", pattern, e)))?;
		builder.add(glob);
	}
	builder.build().map_err(|e| ExclusionError(e.to_string()))
}


// vim: ts=4
