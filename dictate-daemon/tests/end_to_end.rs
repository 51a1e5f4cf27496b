//! End-to-end scenarios driving a real daemon over a Unix socket.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use dictate_client::Client;
use dictate_core::config::Config;

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn temp_socket_path() -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("dictate-e2e-{}-{n}.sock", std::process::id()))
}

fn test_config(socket_path: PathBuf) -> Config {
    let mut config = Config::default();
    config.paths.socket_path = socket_path;
    config
}

async fn send_raw(socket_path: &PathBuf, request: &[u8]) -> Vec<u8> {
    let mut stream = connect_with_retry(socket_path).await;
    stream.write_all(request).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    buf
}

async fn connect_with_retry(socket_path: &PathBuf) -> UnixStream {
    for _ in 0..20 {
        if let Ok(stream) = UnixStream::connect(socket_path).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("daemon never started listening on {}", socket_path.display());
}

#[tokio::test]
async fn s1_ping() {
    let socket_path = temp_socket_path();
    let daemon = tokio::spawn(dictate_daemon::run(test_config(socket_path.clone())));

    let reply = send_raw(&socket_path, br#"{"jsonrpc":"2.0","method":"ping","id":1}"#).await;
    let value: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(value["result"], "pong");
    assert_eq!(value["id"], 1);

    shutdown_and_join(&socket_path, daemon).await;
}

#[tokio::test]
async fn s2_unknown_method() {
    let socket_path = temp_socket_path();
    let daemon = tokio::spawn(dictate_daemon::run(test_config(socket_path.clone())));

    let reply = send_raw(&socket_path, br#"{"jsonrpc":"2.0","method":"nope","id":2}"#).await;
    let value: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(value["error"]["code"], -32601);
    assert_eq!(value["id"], 2);

    shutdown_and_join(&socket_path, daemon).await;
}

#[tokio::test]
async fn s4_stop_without_start() {
    let socket_path = temp_socket_path();
    let daemon = tokio::spawn(dictate_daemon::run(test_config(socket_path.clone())));

    let client = Client::new(socket_path.clone());
    let err = client.stop_capture().await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("no active recording"), "unexpected error: {message}");

    shutdown_and_join(&socket_path, daemon).await;
}

#[tokio::test]
async fn s5_reconnect_after_daemon_restart() {
    let socket_path = temp_socket_path();
    let client = Client::new(socket_path.clone());

    let first = tokio::spawn(dictate_daemon::run(test_config(socket_path.clone())));
    client.connect().await.unwrap();
    first.abort();
    let _ = first.await;
    let _ = std::fs::remove_file(&socket_path);

    // The client's own retry loop (10 attempts, 500ms apart) should ride out
    // the gap until the restarted daemon is listening again.
    let second = tokio::spawn(dictate_daemon::run(test_config(socket_path.clone())));
    tokio::time::sleep(Duration::from_millis(200)).await;
    client.connect().await.unwrap();

    shutdown_and_join(&socket_path, second).await;
}

async fn shutdown_and_join(socket_path: &PathBuf, daemon: tokio::task::JoinHandle<anyhow::Result<()>>) {
    let client = Client::new(socket_path.clone());
    let _ = client.shutdown().await;
    let _ = tokio::time::timeout(Duration::from_secs(3), daemon).await;
    assert!(!socket_path.exists(), "socket file should be removed after shutdown");
}
