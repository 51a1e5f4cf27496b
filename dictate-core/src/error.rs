use thiserror::Error;

/// All errors produced by dictate-core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("parse error: {0}")]
    ParseError(String),

    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("recording error: {0}")]
    RecordingError(String),

    #[error("no default input device found")]
    MicrophoneNotFound,

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("ASR error: {0}")]
    AsrError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// JSON-RPC error code for this error kind, per the wire-format taxonomy.
    ///
    /// `ParseError`/`InvalidEnvelope`/`MethodNotFound`/`InvalidParams` carry their
    /// own reserved codes; everything else is an application error (-32000), with
    /// the kind preserved in the message text.
    pub fn rpc_code(&self) -> i64 {
        match self {
            CoreError::ParseError(_) => -32700,
            CoreError::InvalidEnvelope(_) => -32600,
            CoreError::MethodNotFound(_) => -32601,
            CoreError::InvalidParams(_) => -32602,
            _ => -32000,
        }
    }
}
