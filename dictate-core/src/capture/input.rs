//! Audio input seam for the capture service.
//!
//! [`AudioInput`] is what lets the capture state machine be driven by either
//! a real microphone ([`CpalAudioInput`], backed by [`crate::audio::AudioRecorder`])
//! or a scripted source in tests ([`ScriptedAudioInput`]) that feeds
//! pre-built chunks straight into the sink — the "recorder test hook" a
//! capture session needs without real hardware.

use std::sync::Arc;

use crate::audio::AudioRecorder;
use crate::buffering::chunk::AudioChunk;
use crate::buffering::chunk_queue::ChunkSink;
use crate::config::AudioConfig;
use crate::error::Result;

/// Something that can start pushing audio chunks onto a [`ChunkSink`] and be
/// stopped again. Implementations run on a blocking thread — `start` may
/// block until the underlying device reports readiness.
pub trait AudioInput: Send + Sync {
    fn start(&self, sink: ChunkSink) -> Result<Box<dyn RecorderHandle>>;
}

/// Handle returned by [`AudioInput::start`]; `stop` releases the device.
pub trait RecorderHandle: Send {
    fn stop(&mut self);
}

impl RecorderHandle for AudioRecorder {
    fn stop(&mut self) {
        AudioRecorder::stop(self)
    }
}

/// Production input: opens the configured microphone via cpal.
pub struct CpalAudioInput {
    config: AudioConfig,
}

impl CpalAudioInput {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }
}

impl AudioInput for CpalAudioInput {
    fn start(&self, sink: ChunkSink) -> Result<Box<dyn RecorderHandle>> {
        let recorder = AudioRecorder::start(&self.config, sink)?;
        Ok(Box::new(recorder))
    }
}

/// Test input: replays a fixed chunk sequence, then closes the sink.
pub struct ScriptedAudioInput {
    chunks: Vec<AudioChunk>,
}

impl ScriptedAudioInput {
    pub fn new(chunks: Vec<AudioChunk>) -> Arc<Self> {
        Arc::new(Self { chunks })
    }
}

struct NoopHandle;

impl RecorderHandle for NoopHandle {
    fn stop(&mut self) {}
}

impl AudioInput for ScriptedAudioInput {
    fn start(&self, sink: ChunkSink) -> Result<Box<dyn RecorderHandle>> {
        for chunk in self.chunks.clone() {
            sink.push(chunk);
        }
        sink.close();
        Ok(Box::new(NoopHandle))
    }
}
