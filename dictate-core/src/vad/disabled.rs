//! Pass-through VAD used when no real detector is available.
//!
//! Mirrors the original project's fallback contract: with VAD disabled (or
//! unavailable), a batch classification returns the entire buffer as a
//! single speech region rather than an empty result — silence is never
//! invented, so downstream transcription still gets the full recording.

use super::{ChunkEvents, VoiceActivityDetector};
use crate::buffering::chunk::AudioChunk;

/// Always-speech detector. The streaming form has no real notion of a
/// speech/silence boundary, so it emits a single synthetic `speech_end`
/// once `hard_timeout_ms` of audio has accumulated — a safety valve so a
/// smart-capture session with VAD disabled still terminates on its own
/// rather than running forever.
pub struct DisabledVad {
    hard_timeout_ms: u64,
    elapsed_ms: u64,
    timed_out: bool,
}

impl DisabledVad {
    pub fn new(hard_timeout_ms: u64) -> Self {
        Self {
            hard_timeout_ms,
            elapsed_ms: 0,
            timed_out: false,
        }
    }
}

impl VoiceActivityDetector for DisabledVad {
    fn classify_chunk(&mut self, chunk: &AudioChunk) -> ChunkEvents {
        let mut events = ChunkEvents::default();
        if self.timed_out {
            return events;
        }
        if self.elapsed_ms == 0 {
            events.speech_start = true;
        }
        self.elapsed_ms = self.elapsed_ms.saturating_add((chunk.duration_secs() * 1000.0) as u64);
        if self.elapsed_ms >= self.hard_timeout_ms {
            self.timed_out = true;
            events.speech_end = true;
        }
        events
    }

    fn classify_buffer(&mut self, pcm: &[f32], _sample_rate: u32) -> Vec<(usize, usize)> {
        if pcm.is_empty() {
            Vec::new()
        } else {
            vec![(0, pcm.len())]
        }
    }

    fn reset(&mut self) {
        self.elapsed_ms = 0;
        self.timed_out = false;
    }

    fn is_disabled(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_buffer_returns_whole_buffer_as_one_segment() {
        let mut vad = DisabledVad::new(60_000);
        let pcm = vec![0.0f32; 1600];
        assert_eq!(vad.classify_buffer(&pcm, 16_000), vec![(0, 1600)]);
    }

    #[test]
    fn classify_buffer_of_empty_pcm_returns_no_segments() {
        let mut vad = DisabledVad::new(60_000);
        assert!(vad.classify_buffer(&[], 16_000).is_empty());
    }

    #[test]
    fn classify_chunk_emits_speech_start_once_then_speech_end_at_timeout() {
        let mut vad = DisabledVad::new(200);
        let chunk = AudioChunk::new(vec![0.0f32; 1600], 16_000); // 100ms
        let first = vad.classify_chunk(&chunk);
        assert!(first.speech_start);
        assert!(!first.speech_end);

        let second = vad.classify_chunk(&chunk);
        assert!(!second.speech_start);
        assert!(second.speech_end, "200ms elapsed should cross the 200ms hard timeout");
    }

    #[test]
    fn is_disabled_reports_true() {
        assert!(DisabledVad::new(1000).is_disabled());
    }
}
