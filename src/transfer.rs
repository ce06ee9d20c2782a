//! Transfer Engine: whole-body vs. streaming file transport (§4.5)
//!
//! Mode selection and the compress/encrypt ordering live here, not in the
//! protocol layer -- `FILE_DATA`'s `streaming` flag only tells the receiver
//! which path the sender took.

use crate::crypto::{self, SymmetricKey};
use crate::error::{IntegrityError, TransportError};
use crate::protocol::messages::FileDataMeta;
use crate::protocol::{cmd, frame, Frame};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use md5::{Digest, Md5};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default whole-body/streaming cutoff, used by callers that have no
/// [`crate::config::Config`] of their own (e.g. tests).
pub const STREAMING_THRESHOLD_BYTES: u64 = crate::config::DEFAULT_STREAMING_THRESHOLD_BYTES;

/// Default wire chunk size, likewise.
pub const WIRE_CHUNK_BYTES: usize = crate::config::DEFAULT_CHUNK_SIZE_BYTES;

const COMPRESSION_MIN_RAW_BYTES: usize = 1024;
const COMPRESSION_MAX_RATIO: f64 = 0.9;

/// Send `path`'s contents as a `FILE_DATA` frame plus payload, per the
/// sender side of §4.5. `key` is `None` when encryption is disabled.
/// `threshold_bytes` and `chunk_bytes` come from [`crate::config::Config`].
#[allow(clippy::too_many_arguments)]
pub async fn send_file<W: AsyncWrite + AsyncRead + Unpin>(
	stream: &mut W,
	local_path: &Path,
	wire_path: &str,
	version: u64,
	key: Option<&SymmetricKey>,
	compression_enabled: bool,
	threshold_bytes: u64,
	chunk_bytes: usize,
	idle_timeout: Duration,
) -> Result<(), TransportError> {
	let raw = tokio::fs::read(local_path).await?;
	let size = raw.len() as u64;
	let hash = hex::encode(Md5::digest(&raw));
	let modified = chrono::Local::now();

	let streaming = size > threshold_bytes && key.is_none();

	let (payload, compressed, encrypted) = if streaming {
		(raw, false, false)
	} else {
		let (body, compressed) = maybe_compress(&raw, compression_enabled);
		match key {
			Some(k) => (crypto::encrypt(k, &body), compressed, true),
			None => (body, compressed, false),
		}
	};

	let meta = FileDataMeta {
		path: wire_path.to_string(),
		size,
		hash,
		version,
		encrypted,
		compressed,
		transfer_size: payload.len() as u64,
		streaming,
		modified,
	};

	frame::write_frame(stream, &Frame::json(cmd::FILE_DATA, &meta)?).await?;
	let ack = frame::read_frame(stream, idle_timeout).await?;
	if ack.cmd != cmd::OK {
		return Err(TransportError::Io(std::io::Error::new(
			std::io::ErrorKind::Other,
			format!("peer rejected FILE_DATA for {}: {}", wire_path, ack.cmd),
		)));
	}

	for chunk in payload.chunks(chunk_bytes) {
		stream.write_all(chunk).await?;
	}
	stream.flush().await?;

	Ok(())
}

/// Receive the payload following a `FILE_DATA` frame's metadata, write it to
/// `local_path`, and verify its MD5. On mismatch the partial file is
/// unlinked and an [`IntegrityError::HashMismatch`] is returned.
pub async fn receive_file<S: AsyncRead + AsyncWrite + Unpin>(
	stream: &mut S,
	meta: &FileDataMeta,
	local_path: &Path,
	key: Option<&SymmetricKey>,
	chunk_bytes: usize,
) -> Result<(), IntegrityError> {
	if let Some(parent) = local_path.parent() {
		if !parent.as_os_str().is_empty() {
			let _ = tokio::fs::create_dir_all(parent).await;
		}
	}

	if meta.streaming {
		let mut file = tokio::fs::File::create(local_path)
			.await
			.map_err(|_| IntegrityError::DecryptFailed { path: meta.path.clone() })?;
		let mut remaining = meta.transfer_size;
		let mut hasher = Md5::new();
		let mut buf = vec![0u8; chunk_bytes];

		while remaining > 0 {
			let want = remaining.min(chunk_bytes as u64) as usize;
			stream
				.read_exact(&mut buf[..want])
				.await
				.map_err(|_| IntegrityError::DecryptFailed { path: meta.path.clone() })?;
			hasher.update(&buf[..want]);
			file.write_all(&buf[..want])
				.await
				.map_err(|_| IntegrityError::DecryptFailed { path: meta.path.clone() })?;
			remaining -= want as u64;
		}
		file.flush().await.map_err(|_| IntegrityError::DecryptFailed { path: meta.path.clone() })?;

		let actual = hex::encode(hasher.finalize());
		if actual != meta.hash {
			let _ = tokio::fs::remove_file(local_path).await;
			return Err(IntegrityError::HashMismatch {
				path: meta.path.clone(),
				expected: meta.hash.clone(),
				actual,
			});
		}
		return Ok(());
	}

	let mut wire = vec![0u8; meta.transfer_size as usize];
	stream
		.read_exact(&mut wire)
		.await
		.map_err(|_| IntegrityError::DecryptFailed { path: meta.path.clone() })?;

	let after_decrypt = if meta.encrypted {
		let key = key.ok_or_else(|| IntegrityError::DecryptFailed { path: meta.path.clone() })?;
		crypto::decrypt(key, &wire, &meta.path)?
	} else {
		wire
	};

	let raw = if meta.compressed {
		decompress(&after_decrypt).map_err(|e| IntegrityError::DecompressFailed {
			path: meta.path.clone(),
			message: e.to_string(),
		})?
	} else {
		after_decrypt
	};

	let actual = hex::encode(Md5::digest(&raw));
	if actual != meta.hash {
		return Err(IntegrityError::HashMismatch { path: meta.path.clone(), expected: meta.hash.clone(), actual });
	}

	tokio::fs::write(local_path, &raw).await.map_err(|_| IntegrityError::DecryptFailed { path: meta.path.clone() })?;

	Ok(())
}

fn maybe_compress(raw: &[u8], enabled: bool) -> (Vec<u8>, bool) {
	if !enabled || raw.len() < COMPRESSION_MIN_RAW_BYTES {
		return (raw.to_vec(), false);
	}

	let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(6));
	if encoder.write_all(raw).is_err() {
		return (raw.to_vec(), false);
	}
	let compressed = match encoder.finish() {
		Ok(c) => c,
		Err(_) => return (raw.to_vec(), false),
	};

	if (compressed.len() as f64) < (raw.len() as f64) * COMPRESSION_MAX_RATIO {
		(compressed, true)
	} else {
		(raw.to_vec(), false)
	}
}

fn decompress(compressed: &[u8]) -> std::io::Result<Vec<u8>> {
	let mut decoder = ZlibDecoder::new(compressed);
	let mut out = Vec::new();
	decoder.read_to_end(&mut out)?;
	Ok(out)
}


// vim: ts=4
