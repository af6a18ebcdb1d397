//! Normalized remote responses.
//!
//! The remote API is inconsistent about where it puts things: `code` may be
//! missing on success, the payload may or may not be wrapped in `data`, and
//! error text shows up under several keys. [`ApiResponse`] keeps both the raw
//! body and the normalized fields so callers can tolerate either shape.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub http_status: u16,
    pub api_code: Option<i64>,
    pub message: Option<String>,
    /// The `data` member of the body, or `Value::Null` when absent.
    pub data: Value,
    pub raw: Value,
}

impl ApiResponse {
    /// Builds a response from a status and a decoded JSON body.
    pub fn from_json(http_status: u16, raw: Value) -> Self {
        let api_code = raw.get("code").and_then(Value::as_i64);
        let message = extract_message(&raw);
        let data = raw.get("data").cloned().unwrap_or(Value::Null);
        Self {
            http_status,
            api_code,
            message,
            data,
            raw,
        }
    }

    /// Builds a response from a body that was not valid JSON.
    pub fn from_text(http_status: u16, text: &str) -> Self {
        let trimmed = text.trim();
        Self {
            http_status,
            api_code: None,
            message: (!trimmed.is_empty()).then(|| trimmed.chars().take(500).collect()),
            data: Value::Null,
            raw: Value::Null,
        }
    }

    /// Success is `HTTP 200` and nothing else; `api_code` never gates it.
    pub fn is_success(&self) -> bool {
        self.http_status == 200
    }

    /// Looks a key up under `data` first, then at the top level of the body.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data
            .get(key)
            .filter(|v| !v.is_null())
            .or_else(|| self.raw.get(key).filter(|v| !v.is_null()))
    }

    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// A failure description suitable for error reporting.
    pub fn failure(&self) -> crate::error::RemoteFailure {
        crate::error::RemoteFailure::new(
            self.http_status,
            self.api_code,
            self.message.clone().unwrap_or_default(),
        )
    }
}

fn extract_message(raw: &Value) -> Option<String> {
    let candidates = [
        raw.get("message"),
        raw.get("msg"),
        raw.get("error").and_then(|e| e.get("message")),
        raw.get("error"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().filter(|s| !s.is_empty()).map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_is_http_200_only() {
        let ok_without_code = ApiResponse::from_json(200, json!({"data": {"token": "t"}}));
        assert!(ok_without_code.is_success());
        assert_eq!(ok_without_code.api_code, None);

        let ok_with_error_code = ApiResponse::from_json(200, json!({"code": 400, "data": {}}));
        assert!(ok_with_error_code.is_success());

        let created = ApiResponse::from_json(201, json!({"code": 100}));
        assert!(!created.is_success());
    }

    #[test]
    fn test_message_fallbacks() {
        let nested = ApiResponse::from_json(
            400,
            json!({"error": {"code": "invalid_parameter", "message": "bad avatar"}}),
        );
        assert_eq!(nested.message.as_deref(), Some("bad avatar"));

        let flat = ApiResponse::from_json(401, json!({"error": "Unauthorized"}));
        assert_eq!(flat.message.as_deref(), Some("Unauthorized"));

        let msg = ApiResponse::from_json(500, json!({"code": 10001, "msg": "internal"}));
        assert_eq!(msg.message.as_deref(), Some("internal"));
        assert_eq!(msg.api_code, Some(10001));
    }

    #[test]
    fn test_field_prefers_data_then_top_level() {
        let nested = ApiResponse::from_json(200, json!({"data": {"video_id": "v1"}}));
        assert_eq!(nested.field_str("video_id"), Some("v1"));

        let flat = ApiResponse::from_json(200, json!({"video_id": "v1", "data": null}));
        assert_eq!(flat.field_str("video_id"), Some("v1"));
    }

    #[test]
    fn test_from_text_keeps_body_as_message() {
        let resp = ApiResponse::from_text(502, "  Bad Gateway \n");
        assert_eq!(resp.message.as_deref(), Some("Bad Gateway"));
        assert_eq!(resp.data, Value::Null);
        assert!(ApiResponse::from_text(204, "").message.is_none());
    }
}
