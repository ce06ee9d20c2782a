//! End-to-end push/pull scenarios against an in-process server.

use duosync::client::run_session;
use duosync::config::Config;
use duosync::session::{handle_connection, Server};
use duosync::types::Direction;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Start a server for `dir`, returning the bound address. The accept loop
/// runs for the remainder of the process; each test gets its own port.
async fn spawn_server(dir: &TempDir) -> String {
	spawn_server_with_key(dir, None).await
}

async fn spawn_server_with_key(dir: &TempDir, key_file: Option<std::path::PathBuf>) -> String {
	let mut config = Config::default();
	config.managed_root = dir.path().to_path_buf();
	config.key_file = key_file;

	let server = Arc::new(Server::new(&config).await.unwrap());
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap().to_string();

	tokio::spawn(async move {
		loop {
			let (mut socket, _) = match listener.accept().await {
				Ok(pair) => pair,
				Err(_) => return,
			};
			let server = server.clone();
			tokio::spawn(async move {
				let _ = handle_connection(&mut socket, &server).await;
			});
		}
	});

	addr
}

fn client_config(dir: &TempDir, server_addr: &str) -> Config {
	let mut config = Config::default();
	config.managed_root = dir.path().to_path_buf();
	config.server_addr = server_addr.to_string();
	config
}

#[tokio::test]
async fn basic_push_uploads_new_file_to_server() {
	let server_dir = TempDir::new().unwrap();
	let client_dir = TempDir::new().unwrap();
	let addr = spawn_server(&server_dir).await;

	tokio::fs::write(client_dir.path().join("a.txt"), b"hello world").await.unwrap();

	let config = client_config(&client_dir, &addr);
	let outcome = run_session(&config, Direction::Push).await.unwrap();

	assert_eq!(outcome.uploaded, 1);
	let uploaded = tokio::fs::read(server_dir.path().join("a.txt")).await.unwrap();
	assert_eq!(uploaded, b"hello world");
}

#[tokio::test]
async fn push_then_delete_propagates_removal_to_server() {
	let server_dir = TempDir::new().unwrap();
	let client_dir = TempDir::new().unwrap();
	let addr = spawn_server(&server_dir).await;

	let file_path = client_dir.path().join("a.txt");
	tokio::fs::write(&file_path, b"hello").await.unwrap();
	let config = client_config(&client_dir, &addr);
	run_session(&config, Direction::Push).await.unwrap();
	assert!(server_dir.path().join("a.txt").exists());

	tokio::fs::remove_file(&file_path).await.unwrap();
	let outcome = run_session(&config, Direction::Push).await.unwrap();

	assert_eq!(outcome.deleted, 1);
	assert!(!server_dir.path().join("a.txt").exists());
}

#[tokio::test]
async fn pull_applies_server_delete_without_resurrecting_the_file() {
	let server_dir = TempDir::new().unwrap();
	let writer_dir = TempDir::new().unwrap();
	let reader_dir = TempDir::new().unwrap();
	let addr = spawn_server(&server_dir).await;

	// Writer pushes a file, reader pulls it down.
	tokio::fs::write(writer_dir.path().join("shared.txt"), b"v1").await.unwrap();
	let writer_config = client_config(&writer_dir, &addr);
	run_session(&writer_config, Direction::Push).await.unwrap();

	let reader_config = client_config(&reader_dir, &addr);
	let pulled = run_session(&reader_config, Direction::Pull).await.unwrap();
	assert_eq!(pulled.downloaded, 1);
	assert!(reader_dir.path().join("shared.txt").exists());

	// Writer deletes and pushes the tombstone.
	tokio::fs::remove_file(writer_dir.path().join("shared.txt")).await.unwrap();
	run_session(&writer_config, Direction::Push).await.unwrap();

	// Reader pulls again: the file must disappear locally...
	let pulled = run_session(&reader_config, Direction::Pull).await.unwrap();
	assert_eq!(pulled.deleted, 1);
	assert!(!reader_dir.path().join("shared.txt").exists());

	// ...and a subsequent push from the reader must not re-upload it.
	let pushed = run_session(&reader_config, Direction::Push).await.unwrap();
	assert_eq!(pushed.uploaded, 0);
	assert!(!server_dir.path().join("shared.txt").exists());
}

#[tokio::test]
async fn modifying_a_synced_file_and_pushing_updates_server_content() {
	let server_dir = TempDir::new().unwrap();
	let client_dir = TempDir::new().unwrap();
	let addr = spawn_server(&server_dir).await;

	let file_path = client_dir.path().join("a.txt");
	tokio::fs::write(&file_path, b"version one").await.unwrap();
	let config = client_config(&client_dir, &addr);
	run_session(&config, Direction::Push).await.unwrap();

	tokio::fs::write(&file_path, b"version two, longer content").await.unwrap();
	let outcome = run_session(&config, Direction::Push).await.unwrap();

	assert_eq!(outcome.uploaded, 1);
	let contents = tokio::fs::read(server_dir.path().join("a.txt")).await.unwrap();
	assert_eq!(contents, b"version two, longer content");
}

#[tokio::test]
async fn diverging_pushes_from_two_clients_surface_as_conflict() {
	let server_dir = TempDir::new().unwrap();
	let client_a_dir = TempDir::new().unwrap();
	let client_b_dir = TempDir::new().unwrap();
	let addr = spawn_server(&server_dir).await;

	// Both clients start from the same synced baseline.
	tokio::fs::write(client_a_dir.path().join("shared.txt"), b"base").await.unwrap();
	let config_a = client_config(&client_a_dir, &addr);
	run_session(&config_a, Direction::Push).await.unwrap();

	let config_b = client_config(&client_b_dir, &addr);
	run_session(&config_b, Direction::Pull).await.unwrap();

	// Both diverge from the baseline without re-syncing with each other.
	tokio::fs::write(client_a_dir.path().join("shared.txt"), b"from a").await.unwrap();
	run_session(&config_a, Direction::Push).await.unwrap();

	tokio::fs::write(client_b_dir.path().join("shared.txt"), b"from b").await.unwrap();
	let result = run_session(&config_b, Direction::Push).await;

	assert!(matches!(result, Err(duosync::SyncError::Conflict(_))));
}

#[tokio::test]
async fn large_file_round_trips_through_streaming_mode() {
	let server_dir = TempDir::new().unwrap();
	let uploader_dir = TempDir::new().unwrap();
	let downloader_dir = TempDir::new().unwrap();
	let addr = spawn_server(&server_dir).await;

	// 12 MiB, above the 10 MiB streaming threshold, with non-uniform content
	// so a truncated or corrupted transfer would change the hash.
	let mut content = vec![0u8; 12 * 1024 * 1024];
	for (i, byte) in content.iter_mut().enumerate() {
		*byte = (i % 251) as u8;
	}
	tokio::fs::write(uploader_dir.path().join("big.bin"), &content).await.unwrap();

	let upload_config = client_config(&uploader_dir, &addr);
	let outcome = run_session(&upload_config, Direction::Push).await.unwrap();
	assert_eq!(outcome.uploaded, 1);

	let download_config = client_config(&downloader_dir, &addr);
	let pulled = run_session(&download_config, Direction::Pull).await.unwrap();
	assert_eq!(pulled.downloaded, 1);

	let roundtripped = tokio::fs::read(downloader_dir.path().join("big.bin")).await.unwrap();
	assert_eq!(roundtripped.len(), content.len());
	assert_eq!(roundtripped, content);
}

#[tokio::test]
async fn encrypted_session_round_trips_file_contents() {
	let server_dir = TempDir::new().unwrap();
	let key_dir = TempDir::new().unwrap();
	let key_path = key_dir.path().join("key.b64");
	duosync::crypto::SymmetricKey::generate().write_to_file(&key_path).await.unwrap();

	let addr = spawn_server_with_key(&server_dir, Some(key_path.clone())).await;

	let uploader_dir = TempDir::new().unwrap();
	let downloader_dir = TempDir::new().unwrap();
	tokio::fs::write(uploader_dir.path().join("secret.txt"), b"classified payload").await.unwrap();

	let mut upload_config = client_config(&uploader_dir, &addr);
	upload_config.key_file = Some(key_path.clone());
	run_session(&upload_config, Direction::Push).await.unwrap();

	let mut download_config = client_config(&downloader_dir, &addr);
	download_config.key_file = Some(key_path);
	run_session(&download_config, Direction::Pull).await.unwrap();

	let contents = tokio::fs::read(downloader_dir.path().join("secret.txt")).await.unwrap();
	assert_eq!(contents, b"classified payload");
}

#[tokio::test]
async fn mismatched_encryption_is_rejected() {
	let server_dir = TempDir::new().unwrap();
	let key_dir = TempDir::new().unwrap();
	let key_path = key_dir.path().join("key.b64");
	duosync::crypto::SymmetricKey::generate().write_to_file(&key_path).await.unwrap();

	// Server holds a key; client does not configure one.
	let addr = spawn_server_with_key(&server_dir, Some(key_path)).await;

	let client_dir = TempDir::new().unwrap();
	tokio::fs::write(client_dir.path().join("a.txt"), b"hello").await.unwrap();
	let config = client_config(&client_dir, &addr);

	let result = run_session(&config, Direction::Push).await;
	assert!(result.is_err());
}
