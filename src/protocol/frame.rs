//! Length-prefixed frame codec over any `AsyncRead + AsyncWrite` transport
//!
//! `[ 4 bytes BE cmd_len ][ 4 bytes BE data_len ][ cmd ASCII ][ data bytes ]`
//! File payloads for `FILE_DATA` ride out-of-band after the frame, read
//! directly by the caller -- never buffered into `data` here.

use crate::error::TransportError;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Frames above this size are rejected outright -- guards against a
/// malformed or hostile peer driving an unbounded allocation.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Frame {
	pub cmd: String,
	pub data: Vec<u8>,
}

impl Frame {
	pub fn new(cmd: impl Into<String>, data: Vec<u8>) -> Self {
		Frame { cmd: cmd.into(), data }
	}

	pub fn empty(cmd: impl Into<String>) -> Self {
		Frame { cmd: cmd.into(), data: Vec::new() }
	}

	pub fn json(cmd: impl Into<String>, data: &impl serde::Serialize) -> Result<Self, TransportError> {
		let bytes = serde_json::to_vec(data)
			.map_err(|e| TransportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
		Ok(Frame { cmd: cmd.into(), data: bytes })
	}

	pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, crate::error::ProtocolError> {
		serde_json::from_slice(&self.data)
			.map_err(|e| crate::error::ProtocolError::MalformedJson { message: e.to_string() })
	}
}

/// Write one frame to `writer`.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> Result<(), TransportError> {
	let cmd_bytes = frame.cmd.as_bytes();
	writer.write_u32(cmd_bytes.len() as u32).await?;
	writer.write_u32(frame.data.len() as u32).await?;
	writer.write_all(cmd_bytes).await?;
	writer.write_all(&frame.data).await?;
	writer.flush().await?;
	Ok(())
}

/// Read one frame from `reader`, bounded by `idle_timeout` for the initial
/// header read (a peer that never sends anything is distinct from one that
/// disconnects mid-frame).
pub async fn read_frame<R: AsyncRead + Unpin>(
	reader: &mut R,
	idle_timeout: Duration,
) -> Result<Frame, TransportError> {
	let cmd_len = match timeout(idle_timeout, reader.read_u32()).await {
		Ok(Ok(n)) => n,
		Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
			return Err(TransportError::Disconnected)
		}
		Ok(Err(e)) => return Err(TransportError::Io(e)),
		Err(_) => return Err(TransportError::Timeout),
	};
	let data_len = reader.read_u32().await?;

	if cmd_len > MAX_FRAME_LEN || data_len > MAX_FRAME_LEN {
		return Err(TransportError::FrameTooLarge { len: cmd_len.max(data_len), max: MAX_FRAME_LEN });
	}

	let mut cmd_buf = vec![0u8; cmd_len as usize];
	reader.read_exact(&mut cmd_buf).await?;
	let cmd = String::from_utf8_lossy(&cmd_buf).into_owned();

	let mut data = vec![0u8; data_len as usize];
	reader.read_exact(&mut data).await?;

	Ok(Frame { cmd, data })
}

/// Read exactly `len` raw payload bytes following a `FILE_DATA` frame.
pub async fn read_payload<R: AsyncRead + Unpin>(reader: &mut R, len: u64) -> Result<Vec<u8>, TransportError> {
	let mut buf = vec![0u8; len as usize];
	reader.read_exact(&mut buf).await?;
	Ok(buf)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn write_then_read_roundtrips() {
		let mut buf = Vec::new();
		let frame = Frame::new("HELLO", b"{\"a\":1}".to_vec());
		write_frame(&mut buf, &frame).await.unwrap();

		let mut cursor = std::io::Cursor::new(buf);
		let read_back = read_frame(&mut cursor, Duration::from_secs(1)).await.unwrap();
		assert_eq!(read_back.cmd, "HELLO");
		assert_eq!(read_back.data, b"{\"a\":1}");
	}

	#[tokio::test]
	async fn empty_stream_returns_disconnected() {
		let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
		let err = read_frame(&mut cursor, Duration::from_secs(1)).await.unwrap_err();
		assert!(matches!(err, TransportError::Disconnected));
	}

	#[tokio::test]
	async fn oversized_frame_is_rejected() {
		let mut buf = Vec::new();
		buf.extend_from_slice(&(MAX_FRAME_LEN + 1).to_be_bytes());
		buf.extend_from_slice(&0u32.to_be_bytes());
		let mut cursor = std::io::Cursor::new(buf);
		let err = read_frame(&mut cursor, Duration::from_secs(1)).await.unwrap_err();
		assert!(matches!(err, TransportError::FrameTooLarge { .. }));
	}
}

// vim: ts=4
