//! JSON payload schemas for each command in the session sequence (§4.4-4.5)

use crate::types::{Direction, FileEntry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug)]
pub struct Hello {
	pub name: String,
	pub version: String,
	pub local_dir: String,
	pub client_id: String,
	pub encryption: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HelloAck {
	pub name: String,
	pub version: String,
	pub sync_dir: String,
	pub server_version: u64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GetStateAck {
	pub files: BTreeMap<String, FileEntry>,
	pub version: u64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SyncRequest {
	pub mode: Direction,
	pub client_state: BTreeMap<String, FileEntry>,
	pub base_version: u64,
	pub client_id: String,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct SyncPlanAck {
	pub server_version: u64,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub files_to_upload: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub files_to_download: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub files_to_delete: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Conflict {
	pub server_version: u64,
	pub conflicts: Vec<String>,
	pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct FileDataMeta {
	pub path: String,
	pub size: u64,
	pub hash: String,
	pub version: u64,
	pub encrypted: bool,
	pub compressed: bool,
	pub transfer_size: u64,
	pub streaming: bool,
	pub modified: chrono::DateTime<chrono::Local>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DeleteFile {
	pub path: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CreateDir {
	pub path: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SyncComplete {
	pub uploaded: u32,
	pub deleted: u32,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SyncCompleteAck {
	pub new_version: u64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorMessage {
	pub message: String,
}

// vim: ts=4
