//! LLM-based text refinement.
//!
//! Wraps a single chat-completions HTTP endpoint (Perplexity's Sonar API by
//! default) used to clean up a raw transcript: fix punctuation, remove
//! filler words, and otherwise make the dictated text presentable, without
//! changing its meaning. The system prompt carries that instruction; this
//! module only owns request construction, truncation, and retry.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::LlmConfig;
use crate::error::{CoreError, Result};

/// Default system prompt instructing the model to refine, not rewrite.
const DEFAULT_SYSTEM_PROMPT: &str = "You are a transcription cleanup assistant. \
Given a raw speech-to-text transcript, fix punctuation, capitalization, and \
obvious filler words (um, uh, like). Preserve the speaker's meaning, wording, \
and language exactly. Reply with only the cleaned transcript, nothing else.";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    search_domain_filter: Vec<&'a str>,
    return_citations: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Refines raw transcript text. The `ProcessText` handler programs against
/// this trait rather than `LlmRefiner` directly, so tests can substitute a
/// scripted fake without a real network call.
#[async_trait::async_trait]
pub trait Refiner: Send + Sync {
    /// # Errors
    /// Returns `CoreError::LlmError` if refinement ultimately fails.
    async fn refine(&self, text: &str) -> Result<String>;
}

/// Refines raw transcript text via a hosted chat-completions endpoint.
pub struct LlmRefiner {
    client: Client,
    config: LlmConfig,
    system_prompt: String,
}

impl LlmRefiner {
    /// # Errors
    /// Returns `CoreError::LlmError` if no API key is configured or the
    /// HTTP client fails to build.
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.as_deref().unwrap_or_default().is_empty() {
            return Err(CoreError::LlmError("no LLM API key configured".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CoreError::LlmError(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        })
    }

    /// Truncate `text` to at most `max_chars`, breaking on a word boundary
    /// rather than splitting mid-word.
    fn truncate(text: &str, max_chars: usize) -> &str {
        if text.chars().count() <= max_chars {
            return text;
        }
        let mut end = text
            .char_indices()
            .nth(max_chars)
            .map(|(idx, _)| idx)
            .unwrap_or(text.len());
        if let Some(last_space) = text[..end].rfind(char::is_whitespace) {
            end = last_space;
        }
        &text[..end]
    }

    async fn try_once(&self, payload: &ChatRequest<'_>, api_key: &str) -> std::result::Result<String, Retryable> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Retryable::Yes(CoreError::LlmError(format!("request timed out: {e}")))
                } else {
                    Retryable::Yes(CoreError::LlmError(format!("request failed: {e}")))
                }
            })?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(Retryable::No(CoreError::LlmError(format!(
                "LLM endpoint rejected request ({status}): {body}"
            ))));
        }
        if !status.is_success() {
            return Err(Retryable::Yes(CoreError::LlmError(format!(
                "LLM endpoint returned {status}"
            ))));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Retryable::No(CoreError::LlmError(format!("decoding response: {e}"))))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| Retryable::No(CoreError::LlmError("LLM returned no choices".to_string())))
    }
}

#[async_trait::async_trait]
impl Refiner for LlmRefiner {
    /// Refine `text`, retrying transient failures with exponential backoff.
    ///
    /// A 4xx response is treated as non-retryable (bad request, auth
    /// failure, etc.) and surfaces immediately. 5xx responses and timeouts
    /// are retried up to `config.retry_attempts` times, with the wait
    /// doubling each attempt and clamped to `[retry_min_wait, retry_max_wait]`.
    ///
    /// # Errors
    /// Returns `CoreError::LlmError` if every attempt fails.
    async fn refine(&self, text: &str) -> Result<String> {
        let truncated = Self::truncate(text, self.config.max_input_chars);
        info!(chars = truncated.len(), "refining transcript via LLM");

        let payload = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: truncated,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: 2048,
            search_domain_filter: Vec::new(),
            return_citations: false,
        };

        let api_key = self.config.api_key.as_deref().unwrap_or_default();
        let mut wait = Duration::from_secs(self.config.retry_min_wait_secs);
        let max_wait = Duration::from_secs(self.config.retry_max_wait_secs);

        let mut last_err = CoreError::LlmError("no attempts were made".to_string());

        for attempt in 1..=self.config.retry_attempts.max(1) {
            match self.try_once(&payload, api_key).await {
                Ok(result) => {
                    info!(chars = result.len(), "LLM refinement succeeded");
                    return Ok(result);
                }
                Err(Retryable::No(e)) => return Err(e),
                Err(Retryable::Yes(e)) => {
                    warn!(attempt, "LLM request failed, will retry: {e}");
                    last_err = e;
                    if attempt < self.config.retry_attempts.max(1) {
                        tokio::time::sleep(wait).await;
                        wait = (wait * 2).min(max_wait);
                    }
                }
            }
        }

        Err(last_err)
    }
}

enum Retryable {
    Yes(CoreError),
    No(CoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_text_untouched() {
        assert_eq!(LlmRefiner::truncate("hello world", 100), "hello world");
    }

    #[test]
    fn truncate_breaks_on_word_boundary() {
        let text = "the quick brown fox jumps over the lazy dog";
        let truncated = LlmRefiner::truncate(text, 12);
        assert!(!truncated.ends_with("fo"), "should not split mid-word: {truncated:?}");
        assert!(text.starts_with(truncated));
    }

    #[test]
    fn new_without_api_key_is_an_error() {
        let config = LlmConfig {
            api_key: None,
            ..Default::default()
        };
        assert!(matches!(LlmRefiner::new(config), Err(CoreError::LlmError(_))));
    }

    #[test]
    fn new_with_api_key_succeeds() {
        let config = LlmConfig {
            api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        assert!(LlmRefiner::new(config).is_ok());
    }

    struct ScriptedRefiner(Result<String>);

    #[async_trait::async_trait]
    impl Refiner for ScriptedRefiner {
        async fn refine(&self, _text: &str) -> Result<String> {
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(CoreError::LlmError(e.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn refiner_trait_object_dispatches_to_the_scripted_fake() {
        let refiner: Box<dyn Refiner> = Box::new(ScriptedRefiner(Ok("refined text".to_string())));
        assert_eq!(refiner.refine("raw text").await.unwrap(), "refined text");
    }

    #[tokio::test]
    async fn refiner_trait_object_surfaces_a_scripted_failure() {
        let refiner: Box<dyn Refiner> = Box::new(ScriptedRefiner(Err(CoreError::LlmError("unreachable host".to_string()))));
        assert!(matches!(refiner.refine("raw text").await, Err(CoreError::LlmError(_))));
    }
}
