//! Energy-based VAD: RMS threshold, hangover smoothing, and run-length
//! segmentation against `min_speech_duration_ms`/`min_silence_duration_ms`.
//!
//! The per-chunk algorithm is the teacher's original `classify`: compare RMS
//! against `threshold`, extend speech for `hangover_frames` below-threshold
//! chunks. What's new here is wrapping that per-chunk decision in run-length
//! bookkeeping so a `speech_start`/`speech_end` transition is only reported
//! once a run has actually crossed its configured minimum duration — a raw
//! per-chunk flip is too noisy to drive segment boundaries on its own.

use super::{ChunkEvents, VoiceActivityDetector};
use crate::buffering::chunk::AudioChunk;

/// Analysis frame size for the batch classifier, in milliseconds.
const BATCH_FRAME_MS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Run {
    Silence,
    Speech,
}

/// A simple energy-based voice activity detector with run-length segmentation.
pub struct EnergyVad {
    threshold: f32,
    hangover_frames: u32,
    min_speech_duration_ms: u32,
    min_silence_duration_ms: u32,

    hangover_counter: u32,
    /// Run currently accumulating against its minimum-duration threshold.
    current_run: Run,
    /// Milliseconds accumulated in `current_run` so far.
    run_duration_ms: u32,
    /// Set once `current_run == Speech` has crossed `min_speech_duration_ms`
    /// and a `speech_start` has already been reported for it.
    speech_reported: bool,
}

impl EnergyVad {
    /// # Errors
    /// Rejects a threshold outside `[0.0, 1.0]` — an energy threshold
    /// outside the valid RMS range can never fire or always fires, which
    /// is almost certainly a misconfiguration rather than intent.
    pub fn try_new(
        threshold: f32,
        hangover_frames: u32,
        min_speech_duration_ms: u32,
        min_silence_duration_ms: u32,
    ) -> Result<Self, String> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(format!("VAD threshold {threshold} out of range [0.0, 1.0]"));
        }
        Ok(Self {
            threshold,
            hangover_frames,
            min_speech_duration_ms,
            min_silence_duration_ms,
            hangover_counter: 0,
            current_run: Run::Silence,
            run_duration_ms: 0,
            speech_reported: false,
        })
    }

    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }

    /// Raw per-chunk speech/silence decision, including hangover smoothing.
    fn raw_decision(&mut self, samples: &[f32]) -> bool {
        let rms = Self::rms(samples);
        if rms >= self.threshold {
            self.hangover_counter = self.hangover_frames;
            true
        } else if self.hangover_counter > 0 {
            self.hangover_counter -= 1;
            true
        } else {
            false
        }
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn classify_chunk(&mut self, chunk: &AudioChunk) -> ChunkEvents {
        let is_speech = self.raw_decision(&chunk.samples);
        let chunk_ms = (chunk.duration_secs() * 1000.0) as u32;
        let run_kind = if is_speech { Run::Speech } else { Run::Silence };

        let mut events = ChunkEvents::default();

        if run_kind == self.current_run {
            self.run_duration_ms = self.run_duration_ms.saturating_add(chunk_ms);
        } else {
            self.current_run = run_kind;
            self.run_duration_ms = chunk_ms;
        }

        match self.current_run {
            Run::Speech => {
                if !self.speech_reported && self.run_duration_ms >= self.min_speech_duration_ms {
                    self.speech_reported = true;
                    events.speech_start = true;
                }
            }
            Run::Silence => {
                if self.speech_reported && self.run_duration_ms >= self.min_silence_duration_ms {
                    self.speech_reported = false;
                    events.speech_end = true;
                }
            }
        }

        events
    }

    fn classify_buffer(&mut self, pcm: &[f32], sample_rate: u32) -> Vec<(usize, usize)> {
        if pcm.is_empty() {
            return Vec::new();
        }

        let frame_samples = ((BATCH_FRAME_MS as u64 * sample_rate as u64) / 1000).max(1) as usize;
        let min_speech_samples = (self.min_speech_duration_ms as u64 * sample_rate as u64 / 1000) as usize;
        let min_silence_samples = (self.min_silence_duration_ms as u64 * sample_rate as u64 / 1000) as usize;

        // Per-frame speech/silence flags using the same RMS threshold (no
        // hangover smoothing here — the run-length merge below subsumes it).
        let flags: Vec<bool> = pcm
            .chunks(frame_samples)
            .map(|frame| Self::rms(frame) >= self.threshold)
            .collect();

        // Collapse into raw speech runs (start, end) in sample units.
        let mut raw_runs: Vec<(usize, usize)> = Vec::new();
        let mut run_start: Option<usize> = None;
        for (i, &speech) in flags.iter().enumerate() {
            let sample_pos = i * frame_samples;
            match (speech, run_start) {
                (true, None) => run_start = Some(sample_pos),
                (false, Some(start)) => {
                    raw_runs.push((start, sample_pos));
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            raw_runs.push((start, pcm.len()));
        }

        // Merge runs separated by a silence gap shorter than the minimum
        // silence duration (mirrors hangover: a short pause inside an
        // utterance shouldn't split it into two segments).
        let mut merged: Vec<(usize, usize)> = Vec::new();
        for (start, end) in raw_runs {
            match merged.last_mut() {
                Some((_, prev_end)) if start.saturating_sub(*prev_end) < min_silence_samples => {
                    *prev_end = end;
                }
                _ => merged.push((start, end)),
            }
        }

        // Drop segments that never reach the minimum speech duration.
        merged
            .into_iter()
            .filter(|(start, end)| end.saturating_sub(*start) >= min_speech_samples)
            .collect()
    }

    fn reset(&mut self) {
        self.hangover_counter = 0;
        self.current_run = Run::Silence;
        self.run_duration_ms = 0;
        self.speech_reported = false;
    }
}
