//! ASR (automatic speech recognition) adapter boundary.
//!
//! The engine itself — model loading, decoding, beam search — is an external
//! collaborator. This module only defines the narrow interface the capture
//! service and command handlers program against, plus a stub implementation
//! for tests and environments with no ASR engine installed.

pub mod stub;

pub use stub::StubAsr;

use crate::config::AsrConfig;
use crate::error::{CoreError, Result};

/// Minimum speech duration, in samples at 16 kHz, before the engine is
/// invoked at all. Below this the adapter short-circuits to `""`.
fn min_speech_samples(config: &AsrConfig, sample_rate: u32) -> usize {
    (config.min_speech_duration_ms as u64 * sample_rate as u64 / 1000) as usize
}

/// Transcribes mono 16 kHz float32 PCM to text.
///
/// Implementors are loaded once at service construction and own their
/// engine's lifecycle for the life of the daemon.
pub trait SpeechRecognizer: Send + Sync {
    /// Transcribe a PCM buffer.
    ///
    /// # Errors
    /// Returns `CoreError::AsrError` if the engine rejects the input or
    /// returns no alternatives.
    fn transcribe(&self, pcm: &[f32]) -> Result<String>;
}

/// Wraps a `SpeechRecognizer`, applying the shared "too short to bother"
/// short-circuit so individual backends don't each reimplement it.
pub struct AsrAdapter {
    config: AsrConfig,
    sample_rate: u32,
    engine: Box<dyn SpeechRecognizer>,
}

impl AsrAdapter {
    pub fn new(config: AsrConfig, sample_rate: u32, engine: Box<dyn SpeechRecognizer>) -> Self {
        Self {
            config,
            sample_rate,
            engine,
        }
    }

    pub fn transcribe(&self, pcm: &[f32]) -> Result<String> {
        if pcm.len() < min_speech_samples(&self.config, self.sample_rate) {
            return Ok(String::new());
        }
        let text = self.engine.transcribe(pcm)?;
        if text.is_empty() {
            return Err(CoreError::AsrError("engine returned no alternatives".to_string()));
        }
        Ok(text)
    }
}
