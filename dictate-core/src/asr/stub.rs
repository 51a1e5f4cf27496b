//! Placeholder ASR backend — echoes PCM metadata instead of real inference.
//!
//! Used in tests and in builds with no ASR engine installed, so the rest of
//! the daemon (command bus, capture state machine, RPC layer) can be
//! exercised end-to-end without a real speech model.

use super::SpeechRecognizer;
use crate::error::Result;

pub struct StubAsr;

impl SpeechRecognizer for StubAsr {
    fn transcribe(&self, pcm: &[f32]) -> Result<String> {
        Ok(format!("[stub transcript: {} samples]", pcm.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_echoes_sample_count() {
        let stub = StubAsr;
        let text = stub.transcribe(&vec![0.0f32; 1600]).unwrap();
        assert_eq!(text, "[stub transcript: 1600 samples]");
    }
}
