//! Symmetric authenticated encryption for file payloads (§4.5, §6)
//!
//! Key material is 32 raw bytes, stored base64-encoded on disk with mode
//! 0600. Nonces are 96-bit and freshly random per encryption; the nonce is
//! prepended to the ciphertext+tag on the wire.

use crate::error::IntegrityError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use std::path::Path;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
	pub fn generate() -> Self {
		let mut bytes = [0u8; KEY_LEN];
		rand::thread_rng().fill_bytes(&mut bytes);
		SymmetricKey(bytes)
	}

	pub fn to_base64(&self) -> String {
		use base64::Engine;
		base64::engine::general_purpose::STANDARD.encode(self.0)
	}

	pub fn from_base64(s: &str) -> Result<Self, String> {
		use base64::Engine;
		let bytes = base64::engine::general_purpose::STANDARD
			.decode(s.trim())
			.map_err(|e| format!("invalid key encoding: {}", e))?;
		if bytes.len() != KEY_LEN {
			return Err(format!("key must be {} bytes, got {}", KEY_LEN, bytes.len()));
		}
		let mut arr = [0u8; KEY_LEN];
		arr.copy_from_slice(&bytes);
		Ok(SymmetricKey(arr))
	}

	/// Write base64-encoded key material to `path` with mode 0600, creating
	/// parent directories as needed.
	pub async fn write_to_file(&self, path: &Path) -> std::io::Result<()> {
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				tokio::fs::create_dir_all(parent).await?;
			}
		}
		tokio::fs::write(path, self.to_base64()).await?;

		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			let perms = std::fs::Permissions::from_mode(0o600);
			tokio::fs::set_permissions(path, perms).await?;
		}

		Ok(())
	}

	pub async fn load_from_file(path: &Path) -> std::io::Result<Self> {
		let contents = tokio::fs::read_to_string(path).await?;
		SymmetricKey::from_base64(&contents)
			.map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
	}

	fn cipher(&self) -> Aes256Gcm {
		Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
	}
}

/// Encrypt `plaintext`, returning `nonce || ciphertext || tag`.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Vec<u8> {
	let mut nonce_bytes = [0u8; NONCE_LEN];
	rand::thread_rng().fill_bytes(&mut nonce_bytes);
	let nonce = Nonce::from_slice(&nonce_bytes);

	let ciphertext = key
		.cipher()
		.encrypt(nonce, plaintext)
		.expect("AES-256-GCM encryption with a fixed-size nonce cannot fail");

	let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
	out.extend_from_slice(&nonce_bytes);
	out.extend_from_slice(&ciphertext);
	out
}

/// Decrypt a `nonce || ciphertext || tag` blob produced by [`encrypt`].
pub fn decrypt(key: &SymmetricKey, blob: &[u8], path: &str) -> Result<Vec<u8>, IntegrityError> {
	if blob.len() < NONCE_LEN {
		return Err(IntegrityError::DecryptFailed { path: path.to_string() });
	}
	let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
	let nonce = Nonce::from_slice(nonce_bytes);

	key.cipher()
		.decrypt(nonce, ciphertext)
		.map_err(|_| IntegrityError::DecryptFailed { path: path.to_string() })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn encrypt_then_decrypt_roundtrips() {
		let key = SymmetricKey::generate();
		let plaintext = b"the quick brown fox";
		let blob = encrypt(&key, plaintext);
		let recovered = decrypt(&key, &blob, "a.txt").unwrap();
		assert_eq!(recovered, plaintext);
	}

	#[test]
	fn decrypt_with_wrong_key_fails() {
		let key_a = SymmetricKey::generate();
		let key_b = SymmetricKey::generate();
		let blob = encrypt(&key_a, b"secret");
		let err = decrypt(&key_b, &blob, "a.txt").unwrap_err();
		assert!(matches!(err, IntegrityError::DecryptFailed { .. }));
	}

	#[test]
	fn base64_roundtrips_key_bytes() {
		let key = SymmetricKey::generate();
		let encoded = key.to_base64();
		let decoded = SymmetricKey::from_base64(&encoded).unwrap();
		// Same key encrypts to something key `decoded` can decrypt.
		let blob = encrypt(&key, b"payload");
		assert_eq!(decrypt(&decoded, &blob, "x").unwrap(), b"payload");
	}

	#[test]
	fn from_base64_rejects_wrong_length() {
		use base64::Engine;
		let short = base64::engine::general_purpose::STANDARD.encode([0u8; 16]);
		assert!(SymmetricKey::from_base64(&short).is_err());
	}

	#[tokio::test]
	async fn write_to_file_sets_mode_0600() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join("keys/duosync.key");
		let key = SymmetricKey::generate();
		key.write_to_file(&path).await.unwrap();

		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			let meta = tokio::fs::metadata(&path).await.unwrap();
			assert_eq!(meta.permissions().mode() & 0o777, 0o600);
		}

		let loaded = SymmetricKey::load_from_file(&path).await.unwrap();
		assert_eq!(loaded.to_base64(), key.to_base64());
	}
}

// vim: ts=4
