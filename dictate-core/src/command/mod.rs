//! Command bus: translates RPC-level intent into orchestrated service calls.
//!
//! Handlers are the only place clipboard writes and notifications
//! originate — the capture service, ASR adapter, and LLM refiner never call
//! into [`crate::platform`] themselves. That keeps every side effect
//! observable from one layer, which is what makes the fakes in this
//! module's tests enough to exercise the whole bus without real hardware,
//! an ASR engine, or a network call.

use std::sync::Arc;

use tracing::warn;

use crate::capture::CaptureService;
use crate::error::{CoreError, Result};
use crate::llm::Refiner;
use crate::platform::{Clipboard, Notifier};

/// Result of a capture or refinement command.
///
/// `original` is set exactly when refinement ran (successfully or not) —
/// never for a plain `StartRecording`/`StopRecording`/`SmartCapture` result.
pub struct Outcome {
    pub text: String,
    pub original: Option<String>,
}

/// Routes the four handler-level commands to their services. Holds shared
/// (non-owning) handles: the capture service owns the one active session,
/// everything else here is stateless.
pub struct CommandBus {
    capture: Arc<CaptureService>,
    llm: Option<Arc<dyn Refiner>>,
    clipboard: Arc<dyn Clipboard>,
    notifier: Arc<dyn Notifier>,
}

impl CommandBus {
    pub fn new(capture: Arc<CaptureService>, llm: Option<Arc<dyn Refiner>>, clipboard: Arc<dyn Clipboard>, notifier: Arc<dyn Notifier>) -> Self {
        Self { capture, llm, clipboard, notifier }
    }

    /// **StartRecording**: explicit-mode capture start.
    pub async fn start_recording(&self) -> Result<()> {
        match self.capture.start().await {
            Ok(()) => {
                self.notifier.notify("dictate", "recording started");
                Ok(())
            }
            Err(e) => {
                self.notifier.notify("dictate", "recording failed");
                Err(e)
            }
        }
    }

    /// **StopRecording**: explicit-mode capture stop.
    pub async fn stop_recording(&self) -> Result<Outcome> {
        let text = self.capture.stop().await?;
        Ok(self.finish_capture(text))
    }

    /// **SmartCapture**: VAD-driven capture.
    pub async fn smart_capture(&self) -> Result<Outcome> {
        let text = self.capture.smart_capture().await?;
        Ok(self.finish_capture(text))
    }

    /// Live capture-state snapshot, used by `get_status`.
    pub fn capture_phase(&self) -> crate::capture::CapturePhase {
        self.capture.phase()
    }

    /// `true` exactly when a capture session is `Recording` or `Segmenting`.
    pub fn is_recording(&self) -> bool {
        self.capture.is_recording()
    }

    /// Cooperative shutdown hook: stops any in-flight session and discards
    /// its buffer without running ASR. No-op (returns `Ok`) if idle.
    pub async fn cancel_capture(&self) -> Result<()> {
        match self.capture.cancel().await {
            Ok(()) => Ok(()),
            Err(CoreError::RecordingError(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn finish_capture(&self, text: String) -> Outcome {
        if text.is_empty() {
            self.notifier.notify("dictate", "no speech detected");
        } else {
            self.clipboard.copy(&text);
            self.notifier.notify("dictate", "done");
        }
        Outcome { text, original: None }
    }

    /// **ProcessText**: LLM refinement with a contained fallback.
    ///
    /// `LlmError` never reaches the caller — on failure (or when no LLM is
    /// configured) the handler copies the original text to the clipboard
    /// and notifies instead. This fallback is a contract, not best-effort.
    pub async fn process_text(&self, text: &str) -> Result<Outcome> {
        let Some(llm) = self.llm.as_ref() else {
            self.clipboard.copy(text);
            self.notifier.notify("dictate", "LLM not configured, using original");
            return Ok(Outcome {
                text: text.to_string(),
                original: Some(text.to_string()),
            });
        };

        match llm.refine(text).await {
            Ok(refined) => {
                self.clipboard.copy(&refined);
                self.notifier.notify("dictate", "refined");
                Ok(Outcome {
                    text: refined,
                    original: Some(text.to_string()),
                })
            }
            Err(CoreError::LlmError(reason)) => {
                warn!("LLM refinement failed, falling back to original text: {reason}");
                self.clipboard.copy(text);
                self.notifier.notify("dictate", "LLM failed, using original");
                Ok(Outcome {
                    text: text.to_string(),
                    original: Some(text.to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::{AsrAdapter, StubAsr};
    use crate::buffering::chunk::AudioChunk;
    use crate::capture::input::ScriptedAudioInput;
    use crate::config::{AsrConfig, AudioConfig, VadConfig};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeClipboard {
        copied: Mutex<Vec<String>>,
    }

    impl Clipboard for FakeClipboard {
        fn copy(&self, text: &str) {
            self.copied.lock().push(text.to_string());
        }
        fn paste(&self) -> String {
            self.copied.lock().last().cloned().unwrap_or_default()
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        notified: Mutex<Vec<(String, String)>>,
    }

    impl Notifier for FakeNotifier {
        fn notify(&self, title: &str, body: &str) {
            self.notified.lock().push((title.to_string(), body.to_string()));
        }
    }

    struct FakeLlm(Result<String>);

    #[async_trait::async_trait]
    impl Refiner for FakeLlm {
        async fn refine(&self, _text: &str) -> Result<String> {
            match &self.0 {
                Ok(t) => Ok(t.clone()),
                Err(e) => Err(CoreError::LlmError(e.to_string())),
            }
        }
    }

    fn loud_chunk() -> AudioChunk {
        AudioChunk::new(vec![0.8f32; 1_600], 16_000)
    }

    fn bus_with(chunks: Vec<AudioChunk>, llm: Option<Arc<dyn Refiner>>) -> (CommandBus, Arc<FakeClipboard>, Arc<FakeNotifier>) {
        let input = ScriptedAudioInput::new(chunks);
        let asr = Arc::new(AsrAdapter::new(AsrConfig::default(), 16_000, Box::new(StubAsr)));
        let capture = Arc::new(CaptureService::new(input, AudioConfig::default(), VadConfig::default(), AsrConfig::default(), asr));
        let clipboard = Arc::new(FakeClipboard::default());
        let notifier = Arc::new(FakeNotifier::default());
        let bus = CommandBus::new(capture, llm, clipboard.clone(), notifier.clone());
        (bus, clipboard, notifier)
    }

    #[tokio::test]
    async fn start_recording_notifies_started() {
        let (bus, _clipboard, notifier) = bus_with(vec![loud_chunk(); 4], None);
        bus.start_recording().await.unwrap();
        assert_eq!(notifier.notified.lock().last().unwrap().1, "recording started");
    }

    #[tokio::test]
    async fn stop_recording_copies_text_and_notifies_done() {
        let (bus, clipboard, notifier) = bus_with(vec![loud_chunk(); 4], None);
        bus.start_recording().await.unwrap();
        let outcome = bus.stop_recording().await.unwrap();
        assert!(!outcome.text.is_empty());
        assert!(outcome.original.is_none());
        assert_eq!(clipboard.copied.lock().last().unwrap(), &outcome.text);
        assert_eq!(notifier.notified.lock().last().unwrap().1, "done");
    }

    #[tokio::test]
    async fn stop_recording_of_empty_speech_does_not_touch_clipboard() {
        // Two 100ms chunks is below the default VAD min_speech_duration
        // (250ms), so the batch trim yields an empty buffer and ASR's own
        // short-circuit returns "" without ever calling the stub engine.
        let (bus, clipboard, notifier) = bus_with(vec![loud_chunk(); 2], None);
        bus.start_recording().await.unwrap();
        let outcome = bus.stop_recording().await.unwrap();
        assert_eq!(outcome.text, "");
        assert!(clipboard.copied.lock().is_empty());
        assert_eq!(notifier.notified.lock().last().unwrap().1, "no speech detected");
    }

    #[tokio::test]
    async fn process_text_with_successful_refinement_copies_refined_text() {
        let llm: Arc<dyn Refiner> = Arc::new(FakeLlm(Ok("refined text".to_string())));
        let (bus, clipboard, notifier) = bus_with(vec![], Some(llm));
        let outcome = bus.process_text("raw text").await.unwrap();
        assert_eq!(outcome.text, "refined text");
        assert_eq!(outcome.original.as_deref(), Some("raw text"));
        assert_eq!(clipboard.copied.lock().last().unwrap(), "refined text");
        assert_eq!(notifier.notified.lock().last().unwrap().1, "refined");
    }

    #[tokio::test]
    async fn process_text_falls_back_to_original_on_llm_failure() {
        let llm: Arc<dyn Refiner> = Arc::new(FakeLlm(Err(CoreError::LlmError("unreachable host".to_string()))));
        let (bus, clipboard, notifier) = bus_with(vec![], Some(llm));
        let outcome = bus.process_text("hello world").await.unwrap();
        assert_eq!(outcome.text, "hello world");
        assert_eq!(outcome.original.as_deref(), Some("hello world"));
        assert_eq!(clipboard.copied.lock().last().unwrap(), "hello world");
        assert_eq!(notifier.notified.lock().last().unwrap().1, "LLM failed, using original");
    }

    #[tokio::test]
    async fn process_text_without_llm_configured_uses_original() {
        let (bus, clipboard, notifier) = bus_with(vec![], None);
        let outcome = bus.process_text("hello world").await.unwrap();
        assert_eq!(outcome.text, "hello world");
        assert_eq!(clipboard.copied.lock().last().unwrap(), "hello world");
        assert_eq!(notifier.notified.lock().last().unwrap().1, "LLM not configured, using original");
    }
}
