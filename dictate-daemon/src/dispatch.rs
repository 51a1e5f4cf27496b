//! Method table: translates a decoded [`Request`] into a [`Response`] by
//! dispatching to the [`CommandBus`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Notify;

use dictate_core::command::CommandBus;
use dictate_core::error::CoreError;
use dictate_core::rpc::{Params, Request, Response};

/// Delay between writing the `shutdown` response and signaling the accept
/// loop to stop — long enough that the client reliably observes the reply.
const SHUTDOWN_GRACE_DELAY: Duration = Duration::from_millis(50);

pub struct Dispatcher {
    bus: Arc<CommandBus>,
    shutdown: Arc<Notify>,
}

impl Dispatcher {
    pub fn new(bus: Arc<CommandBus>, shutdown: Arc<Notify>) -> Self {
        Self { bus, shutdown }
    }

    /// Dispatch one decoded request, producing its response. The caller is
    /// responsible for skipping this entirely when `request.is_notification()`.
    pub async fn dispatch(&self, request: &Request) -> Response {
        let id = request.id.clone();
        match self.handle(request).await {
            Ok(result) => Response::success(id, result),
            Err(e) => Response::failure(id, e.rpc_code(), e.to_string(), None),
        }
    }

    async fn handle(&self, request: &Request) -> Result<Value, CoreError> {
        match request.method.as_str() {
            "ping" => Ok(json!("pong")),
            "start_capture" => {
                self.bus.start_recording().await?;
                Ok(json!("started"))
            }
            "stop_capture" => {
                let outcome = self.bus.stop_recording().await?;
                Ok(json!({ "text": outcome.text }))
            }
            "transcribe" => {
                let use_llm = parse_use_llm(request.params.as_ref())?;
                let outcome = self.transcribe(use_llm).await?;
                let mut result = json!({ "text": outcome.text });
                if let Some(original) = outcome.original {
                    result["original"] = json!(original);
                }
                Ok(result)
            }
            "get_status" => Ok(json!({
                "running": true,
                "recording": self.bus.is_recording(),
            })),
            "shutdown" => {
                let notify = Arc::clone(&self.shutdown);
                tokio::spawn(async move {
                    tokio::time::sleep(SHUTDOWN_GRACE_DELAY).await;
                    notify.notify_waiters();
                });
                Ok(json!("shutting_down"))
            }
            other => Err(CoreError::MethodNotFound(other.to_string())),
        }
    }

    /// `stop_capture`; if no session was active, fall back to `smart_capture`;
    /// refine via the LLM only when requested and the captured text is non-empty.
    async fn transcribe(&self, use_llm: bool) -> Result<dictate_core::command::Outcome, CoreError> {
        let outcome = match self.bus.stop_recording().await {
            Ok(outcome) => outcome,
            Err(CoreError::RecordingError(ref msg)) if msg.contains("no active recording") => self.bus.smart_capture().await?,
            Err(e) => return Err(e),
        };

        if use_llm && !outcome.text.is_empty() {
            self.bus.process_text(&outcome.text).await
        } else {
            Ok(outcome)
        }
    }
}

fn parse_use_llm(params: Option<&Params>) -> Result<bool, CoreError> {
    match params {
        None => Ok(true),
        Some(Params::Map(map)) => match map.get("use_llm") {
            None => Ok(true),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(CoreError::InvalidParams("use_llm must be a boolean".to_string())),
        },
        Some(Params::List(list)) => match list.first() {
            None => Ok(true),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(CoreError::InvalidParams("use_llm must be a boolean".to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dictate_core::rpc::RequestId;

    fn req(method: &str) -> Request {
        Request {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: None,
            id: Some(RequestId::Number(1)),
        }
    }

    #[test]
    fn parse_use_llm_defaults_to_true_when_absent() {
        assert!(parse_use_llm(None).unwrap());
    }

    #[test]
    fn parse_use_llm_reads_the_named_param() {
        let mut map = serde_json::Map::new();
        map.insert("use_llm".to_string(), json!(false));
        assert!(!parse_use_llm(Some(&Params::Map(map))).unwrap());
    }

    #[test]
    fn parse_use_llm_rejects_a_non_boolean() {
        let mut map = serde_json::Map::new();
        map.insert("use_llm".to_string(), json!("nope"));
        assert!(matches!(parse_use_llm(Some(&Params::Map(map))), Err(CoreError::InvalidParams(_))));
    }

    #[test]
    fn unknown_method_request_builds_fine() {
        let r = req("nope");
        assert_eq!(r.method, "nope");
    }
}
