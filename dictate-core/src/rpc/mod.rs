//! JSON-RPC 2.0 wire format: request/response envelopes, decode/encode.
//!
//! One JSON document per connection — no pipelining, no streaming framing.
//! `decode` never panics on malformed input; it reports a typed parse or
//! envelope error instead.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An `id` is absent (notification), an integer, or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

/// `params` is absent, an ordered list, or a named mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    List(Vec<Value>),
    Map(serde_json::Map<String, Value>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

impl Request {
    /// A request with no `id` is a notification: the daemon must not reply.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

impl Response {
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Option<RequestId>, code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data,
            }),
            id,
        }
    }
}

/// Decoding outcome — kept distinct from `Response` so the dispatcher can
/// branch on it without inspecting `error.code`.
pub enum Decoded {
    Ok(Request),
    ParseError,
    InvalidEnvelope(String),
}

/// Parse a single JSON-RPC request document.
///
/// Empty input is a parse error. A present `jsonrpc` field whose value is not
/// the literal `"2.0"`, or a missing `jsonrpc` field, is an invalid envelope.
/// Unknown top-level fields are ignored (`serde_json`'s default behavior for
/// a struct without `deny_unknown_fields`).
pub fn decode(bytes: &[u8]) -> Decoded {
    if bytes.is_empty() {
        return Decoded::ParseError;
    }

    let value: Value = match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(_) => return Decoded::ParseError,
    };

    let jsonrpc = value.get("jsonrpc").and_then(Value::as_str);
    match jsonrpc {
        Some("2.0") => {}
        Some(other) => return Decoded::InvalidEnvelope(format!("unsupported jsonrpc version: {other}")),
        None => return Decoded::InvalidEnvelope("missing jsonrpc field".to_string()),
    }

    match serde_json::from_value::<Request>(value) {
        Ok(req) => Decoded::Ok(req),
        Err(e) => Decoded::InvalidEnvelope(e.to_string()),
    }
}

/// Serialize a response to its wire bytes.
pub fn encode(response: &Response) -> Vec<u8> {
    // A Response built via `success`/`failure` always serializes cleanly.
    serde_json::to_vec(response).expect("Response is always serializable")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_parse_error() {
        assert!(matches!(decode(b""), Decoded::ParseError));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        assert!(matches!(decode(b"{not json"), Decoded::ParseError));
    }

    #[test]
    fn missing_jsonrpc_is_invalid_envelope() {
        let msg = br#"{"method":"ping","id":1}"#;
        assert!(matches!(decode(msg), Decoded::InvalidEnvelope(_)));
    }

    #[test]
    fn wrong_jsonrpc_version_is_invalid_envelope() {
        let msg = br#"{"jsonrpc":"1.0","method":"ping","id":1}"#;
        assert!(matches!(decode(msg), Decoded::InvalidEnvelope(_)));
    }

    #[test]
    fn unknown_top_level_fields_are_ignored() {
        let msg = br#"{"jsonrpc":"2.0","method":"ping","id":1,"extra":"field"}"#;
        match decode(msg) {
            Decoded::Ok(req) => assert_eq!(req.method, "ping"),
            _ => panic!("expected Ok"),
        }
    }

    #[test]
    fn absent_id_is_notification() {
        let msg = br#"{"jsonrpc":"2.0","method":"ping"}"#;
        match decode(msg) {
            Decoded::Ok(req) => assert!(req.is_notification()),
            _ => panic!("expected Ok"),
        }
    }

    #[test]
    fn string_id_round_trips() {
        let msg = br#"{"jsonrpc":"2.0","method":"ping","id":"abc"}"#;
        match decode(msg) {
            Decoded::Ok(req) => assert_eq!(req.id, Some(RequestId::String("abc".to_string()))),
            _ => panic!("expected Ok"),
        }
    }

    #[test]
    fn list_params_parse() {
        let msg = br#"{"jsonrpc":"2.0","method":"foo","params":[1,2],"id":1}"#;
        match decode(msg) {
            Decoded::Ok(req) => assert!(matches!(req.params, Some(Params::List(_)))),
            _ => panic!("expected Ok"),
        }
    }

    #[test]
    fn map_params_parse() {
        let msg = br#"{"jsonrpc":"2.0","method":"transcribe","params":{"use_llm":true},"id":1}"#;
        match decode(msg) {
            Decoded::Ok(req) => assert!(matches!(req.params, Some(Params::Map(_)))),
            _ => panic!("expected Ok"),
        }
    }

    #[test]
    fn decode_encode_round_trip_for_success_response() {
        let response = Response::success(Some(RequestId::Number(7)), serde_json::json!("pong"));
        let bytes = encode(&response);
        let round_trip: Response = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(round_trip, response);
    }

    #[test]
    fn decode_encode_round_trip_for_error_response() {
        let response = Response::failure(Some(RequestId::Number(2)), -32601, "Method not found", None);
        let bytes = encode(&response);
        let round_trip: Response = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(round_trip, response);
    }

    #[test]
    fn response_with_absent_id_serializes_null() {
        let response = Response::failure(None, -32700, "Parse error", None);
        let json: Value = serde_json::from_slice(&encode(&response)).unwrap();
        assert!(json.get("id").is_none() || json["id"].is_null());
    }
}
