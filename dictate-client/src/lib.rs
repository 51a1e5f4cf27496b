//! Resilient request/reply connector to the dictate daemon's Unix socket.
//!
//! Each call opens a fresh connection, so a daemon restart between calls is
//! invisible to the caller as long as it comes back within the retry window.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use dictate_core::rpc::{self, Params, Request, RequestId};

const MAX_RESPONSE_BYTES: usize = 1 << 20;
const CONNECT_RETRY_ATTEMPTS: u32 = 10;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not reach the daemon at {path}: {source}")]
    Connect { path: PathBuf, #[source] source: std::io::Error },

    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response from daemon")]
    MalformedResponse,

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String, data: Option<Value> },
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// A connector bound to one daemon socket path. Cheap to construct; holds
/// no persistent connection or state beyond the request-id counter.
pub struct Client {
    socket_path: PathBuf,
    next_id: AtomicI64,
}

impl Client {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            next_id: AtomicI64::new(1),
        }
    }

    /// `ping` round trip; succeeds iff the daemon replies `"pong"`.
    pub async fn connect(&self) -> Result<()> {
        let result = self.call("ping", None).await?;
        if result.as_str() == Some("pong") {
            Ok(())
        } else {
            Err(ClientError::MalformedResponse)
        }
    }

    pub async fn ping(&self) -> Result<Value> {
        self.call("ping", None).await
    }

    pub async fn start_capture(&self) -> Result<Value> {
        self.call("start_capture", None).await
    }

    pub async fn stop_capture(&self) -> Result<Value> {
        self.call("stop_capture", None).await
    }

    pub async fn transcribe(&self, use_llm: bool) -> Result<Value> {
        let mut params = serde_json::Map::new();
        params.insert("use_llm".to_string(), Value::Bool(use_llm));
        self.call("transcribe", Some(Params::Map(params))).await
    }

    pub async fn get_status(&self) -> Result<Value> {
        self.call("get_status", None).await
    }

    pub async fn shutdown(&self) -> Result<Value> {
        self.call("shutdown", None).await
    }

    /// Sends one request, retrying the connection attempt (not the request
    /// itself once sent) on connect-refused / file-not-found / reset.
    async fn call(&self, method: &str, params: Option<Params>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: Some(RequestId::Number(id)),
        };
        let bytes = serde_json::to_vec(&request).expect("Request always serializes");

        let mut stream = self.connect_with_retry().await?;
        stream.write_all(&bytes).await?;
        stream.shutdown().await?;

        let mut buf = Vec::new();
        stream
            .take(MAX_RESPONSE_BYTES as u64)
            .read_to_end(&mut buf)
            .await?;

        self.decode_response(&buf)
    }

    fn decode_response(&self, bytes: &[u8]) -> Result<Value> {
        let response: rpc::Response = serde_json::from_slice(bytes).map_err(|_| ClientError::MalformedResponse)?;
        if let Some(error) = response.error {
            return Err(ClientError::Rpc {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }
        response.result.ok_or(ClientError::MalformedResponse)
    }

    async fn connect_with_retry(&self) -> Result<UnixStream> {
        let mut last_err = None;
        for attempt in 0..CONNECT_RETRY_ATTEMPTS {
            match UnixStream::connect(&self.socket_path).await {
                Ok(stream) => return Ok(stream),
                Err(e) if is_retryable(&e) => {
                    last_err = Some(e);
                    if attempt + 1 < CONNECT_RETRY_ATTEMPTS {
                        tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                    }
                }
                Err(e) => return Err(ClientError::Connect { path: self.socket_path.clone(), source: e }),
            }
        }
        Err(ClientError::Connect {
            path: self.socket_path.clone(),
            source: last_err.expect("loop runs at least once"),
        })
    }
}

fn is_retryable(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionReset
    )
}
