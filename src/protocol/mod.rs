//! Wire protocol: frame codec plus the JSON message schemas it carries

pub mod frame;
pub mod messages;

pub use frame::{read_frame, read_payload, write_frame, Frame, MAX_FRAME_LEN};

/// Command tokens (§4.4). Kept as plain `&str` constants rather than an enum
/// since the frame header carries them as ASCII text, not a discriminant.
pub mod cmd {
	pub const HELLO: &str = "HELLO";
	pub const GET_STATE: &str = "GET_STATE";
	pub const SYNC_REQUEST: &str = "SYNC_REQUEST";
	pub const FILE_DATA: &str = "FILE_DATA";
	pub const DELETE_FILE: &str = "DELETE_FILE";
	pub const CREATE_DIR: &str = "CREATE_DIR";
	pub const SYNC_COMPLETE: &str = "SYNC_COMPLETE";
	pub const CONFLICT: &str = "CONFLICT";
	pub const OK: &str = "OK";
	pub const ERROR: &str = "ERROR";
}

// vim: ts=4
