//! Turns raw responses into diagnostics a human can act on.
//!
//! Nothing here changes program flow. Callers decide what to do with a failure;
//! the interpreter only describes it and logs it once.

use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::{avatar, response::ApiResponse};

/// Number of raw avatar entries echoed back in an avatar-list diagnostic.
pub const PREVIEW_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub title: String,
    /// `None` when the call never produced an HTTP response.
    pub http_status: Option<u16>,
    pub ok: bool,
    pub api_code: Option<i64>,
    pub message: Option<String>,
}

impl Diagnostic {
    pub fn from_response(title: impl Into<String>, response: &ApiResponse) -> Self {
        Self {
            title: title.into(),
            http_status: Some(response.http_status),
            ok: response.is_success(),
            api_code: response.api_code,
            message: response.message.clone(),
        }
    }

    /// A diagnostic for a call that failed before any response arrived.
    pub fn unreachable(title: impl Into<String>, error: impl ToString) -> Self {
        Self {
            title: title.into(),
            http_status: None,
            ok: false,
            api_code: None,
            message: Some(error.to_string()),
        }
    }

    /// Emits the diagnostic as a single tracing event.
    pub fn report(&self) {
        if self.ok {
            info!(
                title = %self.title,
                http_status = ?self.http_status,
                api_code = ?self.api_code,
                "Remote call succeeded"
            );
        } else {
            warn!(
                title = %self.title,
                http_status = ?self.http_status,
                api_code = ?self.api_code,
                message = self.message.as_deref().unwrap_or(""),
                "Remote call failed"
            );
        }
    }
}

/// Summarizes and logs a response.
pub fn interpret(title: &str, response: &ApiResponse) -> Diagnostic {
    let diagnostic = Diagnostic::from_response(title, response);
    diagnostic.report();
    diagnostic
}

/// Extra shape statistics for the avatar-list response. Purely informational.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvatarListDiagnostic {
    pub summary: Diagnostic,
    pub total: usize,
    pub status_histogram: BTreeMap<String, usize>,
    pub public_count: usize,
    pub private_count: usize,
    pub missing_id: usize,
    pub missing_label: usize,
    pub missing_default_voice: usize,
    pub preview: Vec<Value>,
}

pub fn interpret_avatar_list(response: &ApiResponse) -> AvatarListDiagnostic {
    let summary = interpret("List streaming avatars", response);
    let items = avatar::raw_items(response);

    let mut status_histogram = BTreeMap::new();
    let mut public_count = 0;
    let mut missing_id = 0;
    let mut missing_label = 0;
    let mut missing_default_voice = 0;

    for item in items {
        let status = item
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("<missing>")
            .to_string();
        *status_histogram.entry(status).or_insert(0) += 1;

        if item.get("is_public").and_then(Value::as_bool) == Some(true) {
            public_count += 1;
        }
        if avatar::id_of(item).is_none() {
            missing_id += 1;
        }
        if avatar::label_of(item).is_none() {
            missing_label += 1;
        }
        if avatar::default_voice_of(item).is_none() {
            missing_default_voice += 1;
        }
    }

    let preview = items
        .iter()
        .take(PREVIEW_LEN)
        .map(|item| {
            json!({
                "avatar_id": item.get("avatar_id"),
                "pose_name": item.get("pose_name"),
                "status": item.get("status"),
                "is_public": item.get("is_public"),
            })
        })
        .collect();

    AvatarListDiagnostic {
        summary,
        total: items.len(),
        status_histogram,
        public_count,
        private_count: items.len() - public_count,
        missing_id,
        missing_label,
        missing_default_voice,
        preview,
    }
}
