//! Error types for duosync operations

use std::error::Error;
use std::fmt;
use std::io;

/// Helper function to reduce Box::new() boilerplate when wrapping errors
#[inline]
pub fn boxed_error<E: Error + Send + Sync + 'static>(e: E) -> Box<dyn Error + Send + Sync> {
	Box::new(e)
}

/// Main error type for sync operations
///
/// Unifies the domain-specific error kinds (transport, protocol, integrity,
/// conflict, state, I/O) behind one type so callers can match broadly or
/// drill into the nested variant for detail.
#[derive(Debug)]
pub enum SyncError {
	/// Socket closed, short read, frame length mismatch
	Transport(TransportError),

	/// Unknown command, malformed JSON, wrong command in sequence
	Protocol(ProtocolError),

	/// Post-transfer hash mismatch, decrypt failure, decompress failure
	Integrity(IntegrityError),

	/// Version divergence with overlapping mutation set (push only)
	Conflict(ConflictError),

	/// State file unreadable or malformed
	State(StateError),

	/// Disk-full, permission denied, or other filesystem failure
	Io { path: Option<String>, source: io::Error },

	/// Invalid configuration
	InvalidConfig { message: String },

	/// Generic error message
	Other { message: String },
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Transport(e) => write!(f, "transport error: {}", e),
			SyncError::Protocol(e) => write!(f, "protocol error: {}", e),
			SyncError::Integrity(e) => write!(f, "integrity error: {}", e),
			SyncError::Conflict(e) => write!(f, "conflict: {}", e),
			SyncError::State(e) => write!(f, "state error: {}", e),
			SyncError::Io { path: Some(path), source } => {
				write!(f, "I/O error on {}: {}", path, source)
			}
			SyncError::Io { path: None, source } => write!(f, "I/O error: {}", source),
			SyncError::InvalidConfig { message } => write!(f, "invalid configuration: {}", message),
			SyncError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SyncError {}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io { path: None, source: e }
	}
}

impl From<String> for SyncError {
	fn from(e: String) -> Self {
		SyncError::Other { message: e }
	}
}

impl From<TransportError> for SyncError {
	fn from(e: TransportError) -> Self {
		SyncError::Transport(e)
	}
}

impl From<ProtocolError> for SyncError {
	fn from(e: ProtocolError) -> Self {
		SyncError::Protocol(e)
	}
}

impl From<IntegrityError> for SyncError {
	fn from(e: IntegrityError) -> Self {
		SyncError::Integrity(e)
	}
}

impl From<ConflictError> for SyncError {
	fn from(e: ConflictError) -> Self {
		SyncError::Conflict(e)
	}
}

impl From<StateError> for SyncError {
	fn from(e: StateError) -> Self {
		SyncError::State(e)
	}
}

impl From<serde_json::Error> for SyncError {
	fn from(e: serde_json::Error) -> Self {
		SyncError::Protocol(ProtocolError::MalformedJson { message: e.to_string() })
	}
}

impl From<crate::exclusion::ExclusionError> for SyncError {
	fn from(e: crate::exclusion::ExclusionError) -> Self {
		SyncError::InvalidConfig { message: e.to_string() }
	}
}

/// Transport-layer errors: the frame stream itself is broken
#[derive(Debug)]
pub enum TransportError {
	/// Peer closed the connection
	Disconnected,

	/// Read returned fewer bytes than the frame header declared
	ShortRead { expected: usize, got: usize },

	/// A command or data length in a frame header is implausible
	FrameTooLarge { len: u32, max: u32 },

	/// The idle timeout elapsed while waiting for a frame
	Timeout,

	/// Underlying socket I/O failure
	Io(io::Error),
}

impl fmt::Display for TransportError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransportError::Disconnected => write!(f, "connection closed by peer"),
			TransportError::ShortRead { expected, got } => {
				write!(f, "short read: expected {} bytes, got {}", expected, got)
			}
			TransportError::FrameTooLarge { len, max } => {
				write!(f, "frame length {} exceeds maximum {}", len, max)
			}
			TransportError::Timeout => write!(f, "idle timeout waiting for frame"),
			TransportError::Io(e) => write!(f, "socket I/O error: {}", e),
		}
	}
}

impl Error for TransportError {}

impl From<io::Error> for TransportError {
	fn from(e: io::Error) -> Self {
		TransportError::Io(e)
	}
}

/// Protocol-layer errors: the frame stream is intact but its contents are invalid
#[derive(Debug)]
pub enum ProtocolError {
	/// An unrecognized command token was received
	UnknownCommand { command: String },

	/// The `data` payload did not parse as the expected JSON schema
	MalformedJson { message: String },

	/// A command arrived out of the expected session sequence
	UnexpectedCommand { expected: &'static str, got: String },

	/// The peer replied with `ERROR`
	RemoteError { message: String },

	/// The two peers disagree on whether encryption is in use
	EncryptionMismatch,
}

impl fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProtocolError::UnknownCommand { command } => {
				write!(f, "unknown command: {}", command)
			}
			ProtocolError::MalformedJson { message } => {
				write!(f, "malformed message payload: {}", message)
			}
			ProtocolError::UnexpectedCommand { expected, got } => {
				write!(f, "expected {} command, got {}", expected, got)
			}
			ProtocolError::RemoteError { message } => write!(f, "remote error: {}", message),
			ProtocolError::EncryptionMismatch => {
				write!(f, "peers disagree on whether encryption is enabled")
			}
		}
	}
}

impl Error for ProtocolError {}

/// Transfer-integrity errors
#[derive(Debug)]
pub enum IntegrityError {
	/// The received file's MD5 does not match the declared hash
	HashMismatch { path: String, expected: String, actual: String },

	/// AEAD decryption failed (wrong key, tampered ciphertext, or mismatched nonce)
	DecryptFailed { path: String },

	/// zlib decompression failed
	DecompressFailed { path: String, message: String },
}

impl fmt::Display for IntegrityError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			IntegrityError::HashMismatch { path, expected, actual } => {
				write!(f, "hash mismatch for {}: expected {}, got {}", path, expected, actual)
			}
			IntegrityError::DecryptFailed { path } => write!(f, "decryption failed for {}", path),
			IntegrityError::DecompressFailed { path, message } => {
				write!(f, "decompression failed for {}: {}", path, message)
			}
		}
	}
}

impl Error for IntegrityError {}

/// Conflict detection, surfaced rather than resolved
#[derive(Debug)]
pub struct ConflictError {
	pub server_version: u64,
	pub conflicts: Vec<String>,
	pub message: String,
}

impl fmt::Display for ConflictError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{} ({} path(s) at server version {}): {}",
			self.message,
			self.conflicts.len(),
			self.server_version,
			self.conflicts.join(", ")
		)
	}
}

impl Error for ConflictError {}

/// State store errors
#[derive(Debug)]
pub enum StateError {
	/// Failed to load state
	LoadFailed { source: Box<dyn Error + Send + Sync> },

	/// Failed to save state
	SaveFailed { source: Box<dyn Error + Send + Sync> },

	/// State file contents did not parse
	Corrupted { message: String },

	/// Another process is already syncing this profile
	LockFailed { message: String },
}

impl fmt::Display for StateError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StateError::LoadFailed { source } => write!(f, "failed to load state: {}", source),
			StateError::SaveFailed { source } => write!(f, "failed to save state: {}", source),
			StateError::Corrupted { message } => write!(f, "state corrupted: {}", message),
			StateError::LockFailed { message } => write!(f, "lock failed: {}", message),
		}
	}
}

impl Error for StateError {}

// vim: ts=4
