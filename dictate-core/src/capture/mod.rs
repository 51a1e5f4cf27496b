//! Capture service: the state machine wrapping the audio recorder and VAD.
//!
//! States: `Idle -> Recording -> Segmenting -> Transcribing -> Idle`. Two
//! modes share this machine — explicit (`start`/`stop` driven by the client)
//! and smart (driven internally by VAD, with a hard timeout backstop). At
//! most one session exists at a time; the session's async mutex both
//! enforces that and serializes every state transition, matching the
//! "coarse mutex" option for capture-state mutation.

pub mod input;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::{debug, warn};

use crate::asr::AsrAdapter;
use crate::buffering::chunk_queue::ChunkQueue;
use crate::config::{AsrConfig, AudioConfig, VadConfig};
use crate::error::{CoreError, Result};
use crate::vad::{self, VoiceActivityDetector};
use input::{AudioInput, RecorderHandle};

/// Hard upper bound on a smart-capture session with no VAD `speech_end`.
const SMART_CAPTURE_HARD_CAP: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Idle,
    Recording,
    Segmenting,
    Transcribing,
}

impl CapturePhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CapturePhase::Recording,
            2 => CapturePhase::Segmenting,
            3 => CapturePhase::Transcribing,
            _ => CapturePhase::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            CapturePhase::Idle => 0,
            CapturePhase::Recording => 1,
            CapturePhase::Segmenting => 2,
            CapturePhase::Transcribing => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Explicit,
    Smart,
}

struct ActiveSession {
    buffer: Arc<SyncMutex<Vec<f32>>>,
    handle: Box<dyn RecorderHandle>,
    drain_handle: tokio::task::JoinHandle<Box<dyn VoiceActivityDetector>>,
    /// When this session began recording, per §3's capture-session data model.
    started_at: chrono::DateTime<chrono::Utc>,
}

/// Owns the capture lifecycle. Shared (non-owning) handles to the ASR
/// engine flow in at construction; the recorder and VAD are built fresh for
/// every session.
pub struct CaptureService {
    session: AsyncMutex<Option<ActiveSession>>,
    phase: Arc<AtomicU8>,
    input: Arc<dyn AudioInput>,
    audio_config: AudioConfig,
    vad_config: VadConfig,
    asr_config: AsrConfig,
    asr: Arc<AsrAdapter>,
}

impl CaptureService {
    pub fn new(input: Arc<dyn AudioInput>, audio_config: AudioConfig, vad_config: VadConfig, asr_config: AsrConfig, asr: Arc<AsrAdapter>) -> Self {
        Self {
            session: AsyncMutex::new(None),
            phase: Arc::new(AtomicU8::new(CapturePhase::Idle.as_u8())),
            input,
            audio_config,
            vad_config,
            asr_config,
            asr,
        }
    }

    /// Live snapshot of the state machine, readable without the session lock
    /// (used by `get_status`).
    pub fn phase(&self) -> CapturePhase {
        CapturePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// `true` exactly when the capture state is `Recording` or `Segmenting`.
    pub fn is_recording(&self) -> bool {
        matches!(self.phase(), CapturePhase::Recording | CapturePhase::Segmenting)
    }

    fn set_phase(&self, phase: CapturePhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }

    /// Explicit-mode start. Returns once the device has reported readiness.
    ///
    /// # Errors
    /// `CoreError::RecordingError("already recording")` if a session is active.
    pub async fn start(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        if guard.is_some() {
            return Err(CoreError::RecordingError("already recording".to_string()));
        }
        let (session, _speech_end_rx) = self.begin_session(Mode::Explicit).await?;
        *guard = Some(session);
        self.set_phase(CapturePhase::Recording);
        Ok(())
    }

    /// Explicit-mode stop: finalizes the session and returns its transcript.
    ///
    /// # Errors
    /// `CoreError::RecordingError("no active recording")` if no session is active.
    pub async fn stop(&self) -> Result<String> {
        let mut guard = self.session.lock().await;
        let session = guard.take().ok_or_else(|| CoreError::RecordingError("no active recording".to_string()))?;
        self.finalize(session).await
    }

    /// Smart-mode capture: records until VAD reports `speech_end`, or the
    /// 60s hard cap elapses, whichever comes first.
    ///
    /// # Errors
    /// `CoreError::RecordingError("already recording")` if a session is active.
    pub async fn smart_capture(&self) -> Result<String> {
        let mut guard = self.session.lock().await;
        if guard.is_some() {
            return Err(CoreError::RecordingError("already recording".to_string()));
        }
        let (session, mut speech_end_rx) = self.begin_session(Mode::Smart).await?;
        *guard = Some(session);
        self.set_phase(CapturePhase::Recording);

        tokio::select! {
            _ = &mut speech_end_rx => {}
            _ = tokio::time::sleep(SMART_CAPTURE_HARD_CAP) => {
                warn!("smart capture hit the 60s hard cap with no VAD speech_end");
            }
        }

        let session = guard.take().expect("session was set immediately above");
        self.finalize(session).await
    }

    /// Cooperative cancellation: stops the recorder and discards the buffer
    /// without running ASR. Used by daemon shutdown to unwind an in-flight
    /// session within its grace period.
    ///
    /// # Errors
    /// `CoreError::RecordingError("no active recording")` if no session is active.
    pub async fn cancel(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        let session = guard.take().ok_or_else(|| CoreError::RecordingError("no active recording".to_string()))?;

        let mut handle = session.handle;
        tokio::task::spawn_blocking(move || handle.stop())
            .await
            .map_err(|e| CoreError::AudioStream(format!("recorder stop thread panicked: {e}")))?;
        let _ = session.drain_handle.await;

        self.set_phase(CapturePhase::Idle);
        Ok(())
    }

    async fn begin_session(&self, mode: Mode) -> Result<(ActiveSession, oneshot::Receiver<()>)> {
        let capacity = chunk_capacity(&self.audio_config);
        let (sink, source) = ChunkQueue::bounded(capacity);

        let input = Arc::clone(&self.input);
        let handle = tokio::task::spawn_blocking(move || input.start(sink))
            .await
            .map_err(|e| CoreError::AudioStream(format!("recorder thread panicked: {e}")))??;

        let mut vad = vad::build(&self.vad_config);
        vad.reset();

        let buffer = Arc::new(SyncMutex::new(Vec::new()));
        let buffer_drain = Arc::clone(&buffer);
        let (speech_end_tx, speech_end_rx) = oneshot::channel();

        let drain_handle = tokio::spawn(async move {
            let mut speech_end_tx = Some(speech_end_tx);
            let mut vad = vad;
            while let Some(chunk) = source.recv().await {
                let events = vad.classify_chunk(&chunk);
                buffer_drain.lock().extend_from_slice(&chunk.samples);
                if mode == Mode::Smart && events.speech_end {
                    if let Some(tx) = speech_end_tx.take() {
                        let _ = tx.send(());
                    }
                }
            }
            vad
        });

        Ok((
            ActiveSession {
                buffer,
                handle,
                drain_handle,
                started_at: chrono::Utc::now(),
            },
            speech_end_rx,
        ))
    }

    async fn finalize(&self, session: ActiveSession) -> Result<String> {
        self.set_phase(CapturePhase::Segmenting);

        let started_at = session.started_at;
        let mut handle = session.handle;
        tokio::task::spawn_blocking(move || handle.stop())
            .await
            .map_err(|e| CoreError::AudioStream(format!("recorder stop thread panicked: {e}")))?;

        let mut vad = session
            .drain_handle
            .await
            .map_err(|e| CoreError::AudioStream(format!("drain task panicked: {e}")))?;

        let pcm = std::mem::take(&mut *session.buffer.lock());

        self.set_phase(CapturePhase::Transcribing);

        let trimmed = if self.asr_config.vad_filter {
            trim_with_vad(&pcm, vad.as_mut(), self.audio_config.sample_rate)
        } else {
            pcm
        };

        let asr = Arc::clone(&self.asr);
        let result = tokio::task::spawn_blocking(move || asr.transcribe(&trimmed))
            .await
            .map_err(|e| CoreError::AsrError(format!("ASR worker panicked: {e}")))?;

        let elapsed_ms = (chrono::Utc::now() - started_at).num_milliseconds();
        debug!(elapsed_ms, "capture session finalized");

        self.set_phase(CapturePhase::Idle);
        result
    }
}

/// Chunks of audio per second, rounded down to at least one — used as the
/// chunk channel's capacity so the bound is "about 1s of audio" regardless
/// of the configured chunk size.
fn chunk_capacity(config: &AudioConfig) -> usize {
    let chunk_ms = (config.chunk_size as u64 * 1000) / (config.sample_rate.max(1) as u64);
    ((1000 / chunk_ms.max(1)) as usize).max(1)
}

/// Concatenates the speech ranges VAD found in a finished buffer, dropping
/// everything else. With VAD disabled this is a no-op (the whole buffer
/// comes back as a single segment).
fn trim_with_vad(pcm: &[f32], vad: &mut dyn VoiceActivityDetector, sample_rate: u32) -> Vec<f32> {
    let segments = vad.classify_buffer(pcm, sample_rate);
    let mut trimmed = Vec::new();
    for (start, end) in segments {
        trimmed.extend_from_slice(&pcm[start..end]);
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::input::ScriptedAudioInput;
    use super::*;
    use crate::asr::StubAsr;
    use crate::buffering::chunk::AudioChunk;

    fn service_with_chunks(chunks: Vec<AudioChunk>, vad_config: VadConfig, asr_config: AsrConfig) -> CaptureService {
        let input = ScriptedAudioInput::new(chunks);
        let asr = Arc::new(AsrAdapter::new(asr_config.clone(), 16_000, Box::new(StubAsr)));
        CaptureService::new(input, AudioConfig::default(), vad_config, asr_config, asr)
    }

    fn loud_chunk() -> AudioChunk {
        AudioChunk::new(vec![0.8f32; 1_600], 16_000)
    }

    fn silent_chunk() -> AudioChunk {
        AudioChunk::new(vec![0.0f32; 1_600], 16_000)
    }

    #[tokio::test]
    async fn stop_without_start_is_recording_error() {
        let service = service_with_chunks(vec![], VadConfig::default(), AsrConfig::default());
        let err = service.stop().await.unwrap_err();
        assert!(matches!(err, CoreError::RecordingError(ref msg) if msg.contains("no active recording")));
    }

    #[tokio::test]
    async fn explicit_start_twice_is_already_recording_error() {
        let service = service_with_chunks(vec![loud_chunk(); 2], VadConfig::default(), AsrConfig::default());
        service.start().await.unwrap();
        let err = service.start().await.unwrap_err();
        assert!(matches!(err, CoreError::RecordingError(ref msg) if msg.contains("already recording")));
    }

    #[tokio::test]
    async fn explicit_start_then_stop_transcribes_and_returns_to_idle() {
        let service = service_with_chunks(vec![loud_chunk(); 4], VadConfig::default(), AsrConfig::default());
        service.start().await.unwrap();
        assert_eq!(service.phase(), CapturePhase::Recording);
        assert!(service.is_recording());

        let text = service.stop().await.unwrap();
        assert!(text.starts_with("[stub transcript:"));
        assert_eq!(service.phase(), CapturePhase::Idle);
        assert!(!service.is_recording());
    }

    #[tokio::test]
    async fn smart_capture_finalizes_once_vad_reports_speech_end() {
        let vad_config = VadConfig {
            threshold: 0.3,
            min_speech_duration_ms: 100,
            min_silence_duration_ms: 100,
            hangover_frames: 0,
        };
        // 100ms loud (crosses min_speech) then 100ms silent (crosses min_silence) -> speech_end.
        let service = service_with_chunks(vec![loud_chunk(), silent_chunk()], vad_config, AsrConfig::default());

        let text = service.smart_capture().await.unwrap();
        assert!(text.starts_with("[stub transcript:"));
        assert_eq!(service.phase(), CapturePhase::Idle);
    }

    #[tokio::test]
    async fn two_consecutive_stops_the_second_is_always_no_active_recording() {
        let service = service_with_chunks(vec![loud_chunk(); 2], VadConfig::default(), AsrConfig::default());
        service.start().await.unwrap();
        assert!(service.stop().await.is_ok());
        let second = service.stop().await.unwrap_err();
        assert!(matches!(second, CoreError::RecordingError(ref msg) if msg.contains("no active recording")));
    }
}
