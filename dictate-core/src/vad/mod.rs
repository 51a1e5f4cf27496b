//! Voice Activity Detection (VAD) abstraction.
//!
//! `VoiceActivityDetector` is the extensibility seam: swap in `EnergyVad`
//! (the only backend shipped here) for any future neural VAD without
//! touching the capture service. If a detector fails to initialize, callers
//! fall back to [`DisabledVad`], a pass-through that never blocks capture on
//! a broken classifier.

pub mod disabled;
pub mod energy;

pub use disabled::DisabledVad;
pub use energy::EnergyVad;

use crate::buffering::chunk::AudioChunk;
use crate::config::VadConfig;

/// Events a streaming chunk classification may emit. Either field may be
/// set (a chunk can both end one run of silence and start the next run of
/// speech is not representable per-chunk in this design — speech_start and
/// speech_end never both fire from the same chunk).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkEvents {
    pub speech_start: bool,
    pub speech_end: bool,
}

/// Trait for all VAD implementations.
///
/// Implementors may be stateful (run-length counters, hidden states, etc.).
pub trait VoiceActivityDetector: Send {
    /// Incremental, per-chunk classification. Accumulates run length against
    /// `min_speech_duration_ms`/`min_silence_duration_ms` and emits a
    /// transition only when a run crosses its threshold.
    fn classify_chunk(&mut self, chunk: &AudioChunk) -> ChunkEvents;

    /// Batch classification over a full buffer, returning
    /// `(start_sample, end_sample)` ranges considered speech.
    fn classify_buffer(&mut self, pcm: &[f32], sample_rate: u32) -> Vec<(usize, usize)>;

    /// Reset all run-length / hidden state. Called at the start of each
    /// capture session.
    fn reset(&mut self);

    /// `true` for a detector running in pass-through mode after failing to
    /// initialize (see [`DisabledVad`]).
    fn is_disabled(&self) -> bool {
        false
    }
}

/// Build the production VAD detector from configuration.
///
/// Never fails: construction issues fall back to [`DisabledVad`] with a
/// logged warning, since a broken VAD must not prevent capture from working.
pub fn build(config: &VadConfig) -> Box<dyn VoiceActivityDetector> {
    match EnergyVad::try_new(config.threshold, config.hangover_frames, config.min_speech_duration_ms, config.min_silence_duration_ms) {
        Ok(vad) => Box::new(vad),
        Err(e) => {
            tracing::warn!("VAD failed to initialize ({e}), falling back to pass-through");
            Box::new(DisabledVad::new(60_000))
        }
    }
}
