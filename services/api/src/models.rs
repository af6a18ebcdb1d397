//! API Models
//!
//! Request and response shapes of the HTTP surface, with `utoipa` schemas for
//! the OpenAPI document. Core types are converted into these views at the edge
//! so the core crate stays free of web concerns.

use avatar_core::{
    avatar::AvatarDescriptor,
    interpreter::{AvatarListDiagnostic, Diagnostic},
    streaming::{
        ActiveSession, KeepAlive, Quality, Session, SessionOptions, SttSettings, StopOutcome,
        TaskAck, VideoEncoding,
    },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct AvatarView {
    #[schema(example = "Anna_public_3_20240108")]
    pub id: String,
    #[schema(example = "Anna in Brown T-shirt")]
    pub label: String,
    pub default_voice_id: Option<String>,
    pub preview_url: Option<String>,
    pub is_public: bool,
}

impl From<AvatarDescriptor> for AvatarView {
    fn from(avatar: AvatarDescriptor) -> Self {
        Self {
            id: avatar.id,
            label: avatar.label,
            default_voice_id: avatar.default_voice_id,
            preview_url: avatar.preview_url,
            is_public: avatar.is_public,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct AvatarListResponse {
    pub avatars: Vec<AvatarView>,
    /// Set when the directory is valid but has no eligible avatars.
    pub notice: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct DiagnosticView {
    #[schema(example = "Create streaming token")]
    pub title: String,
    pub http_status: Option<u16>,
    pub ok: bool,
    pub api_code: Option<i64>,
    pub message: Option<String>,
}

impl From<Diagnostic> for DiagnosticView {
    fn from(d: Diagnostic) -> Self {
        Self {
            title: d.title,
            http_status: d.http_status,
            ok: d.ok,
            api_code: d.api_code,
            message: d.message,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct AvatarDiagnosticsResponse {
    pub summary: DiagnosticView,
    pub total: usize,
    pub status_histogram: BTreeMap<String, usize>,
    pub public_count: usize,
    pub private_count: usize,
    pub missing_id: usize,
    pub missing_label: usize,
    pub missing_default_voice: usize,
    #[schema(value_type = Vec<Object>)]
    pub preview: Vec<serde_json::Value>,
}

impl From<AvatarListDiagnostic> for AvatarDiagnosticsResponse {
    fn from(d: AvatarListDiagnostic) -> Self {
        Self {
            summary: d.summary.into(),
            total: d.total,
            status_histogram: d.status_histogram,
            public_count: d.public_count,
            private_count: d.private_count,
            missing_id: d.missing_id,
            missing_label: d.missing_label,
            missing_default_voice: d.missing_default_voice,
            preview: d.preview,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct SessionView {
    pub session_id: String,
    pub avatar_id: String,
    pub voice_id: String,
    pub realtime_endpoint: Option<String>,
    pub access_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[schema(example = "STARTED")]
    pub lifecycle_state: String,
}

impl From<Session> for SessionView {
    fn from(s: Session) -> Self {
        Self {
            lifecycle_state: state_name(&s.lifecycle_state),
            session_id: s.session_id,
            avatar_id: s.avatar_id,
            voice_id: s.voice_id,
            realtime_endpoint: s.realtime_endpoint,
            access_url: s.access_url,
            created_at: s.created_at,
        }
    }
}

/// The serialized name of a lifecycle state, e.g. `TOKEN_READY`.
pub fn state_name<T: Serialize>(state: &T) -> String {
    serde_json::to_value(state)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct SessionStateResponse {
    #[schema(example = "IDLE")]
    pub state: String,
    pub token_ready: bool,
    pub session: Option<SessionView>,
    pub diagnostics: Vec<DiagnosticView>,
}

#[derive(Deserialize, Serialize, ToSchema, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum QualityParam {
    Low,
    Medium,
    High,
}

impl From<QualityParam> for Quality {
    fn from(q: QualityParam) -> Self {
        match q {
            QualityParam::Low => Quality::Low,
            QualityParam::Medium => Quality::Medium,
            QualityParam::High => Quality::High,
        }
    }
}

#[derive(Deserialize, Serialize, ToSchema, Debug, Clone, Copy, PartialEq)]
pub enum EncodingParam {
    #[serde(rename = "VP8")]
    Vp8,
    #[serde(rename = "H264")]
    H264,
}

impl From<EncodingParam> for VideoEncoding {
    fn from(e: EncodingParam) -> Self {
        match e {
            EncodingParam::Vp8 => VideoEncoding::Vp8,
            EncodingParam::H264 => VideoEncoding::H264,
        }
    }
}

#[derive(Deserialize, ToSchema, Debug, Default)]
pub struct SelectAvatarPayload {
    #[schema(example = "Anna_public_3_20240108")]
    pub avatar_id: String,
    /// Defaults to the avatar's own voice, then to the configured fallback voice.
    pub voice_id: Option<String>,
    pub quality: Option<QualityParam>,
    pub video_encoding: Option<EncodingParam>,
    pub idle_timeout_secs: Option<u32>,
    /// Set to `false` to disable speech input.
    pub voice_input: Option<bool>,
    #[schema(example = "deepgram")]
    pub stt_provider: Option<String>,
    #[schema(example = 0.55)]
    pub stt_confidence: Option<f64>,
}

impl SelectAvatarPayload {
    pub fn session_options(&self) -> SessionOptions {
        let defaults = SessionOptions::default();
        let stt = match self.voice_input {
            Some(false) => None,
            _ => {
                let base = SttSettings::default();
                Some(SttSettings {
                    provider: self.stt_provider.clone().unwrap_or(base.provider),
                    confidence: self.stt_confidence.unwrap_or(base.confidence),
                })
            }
        };
        SessionOptions {
            quality: self.quality.map(Into::into).unwrap_or(defaults.quality),
            video_encoding: self
                .video_encoding
                .map(Into::into)
                .unwrap_or(defaults.video_encoding),
            idle_timeout_secs: self.idle_timeout_secs.unwrap_or(defaults.idle_timeout_secs),
            stt,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct SelectAvatarResponse {
    pub session: SessionView,
    /// Streaming token for the viewer.
    pub token: String,
    pub diagnostics: Vec<DiagnosticView>,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct TaskPayload {
    #[schema(example = "Welcome to our restaurant.")]
    pub text: String,
    /// Targets another session id instead of the caller's own.
    pub session_id: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct TaskResponse {
    pub task_id: Option<String>,
    pub duration_ms: Option<f64>,
    pub diagnostic: DiagnosticView,
}

impl From<TaskAck> for TaskResponse {
    fn from(ack: TaskAck) -> Self {
        Self {
            task_id: ack.task_id,
            duration_ms: ack.duration_ms,
            diagnostic: ack.diagnostic.into(),
        }
    }
}

/// Outcome of a call that never fails from the caller's point of view.
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct OutcomeResponse {
    #[schema(example = "released")]
    pub outcome: String,
    pub diagnostic: Option<DiagnosticView>,
}

impl OutcomeResponse {
    /// The caller had nothing to stop.
    pub fn idle() -> Self {
        Self {
            outcome: "idle".to_string(),
            diagnostic: None,
        }
    }
}

impl From<KeepAlive> for OutcomeResponse {
    fn from(k: KeepAlive) -> Self {
        let (outcome, diagnostic) = match k {
            KeepAlive::Refreshed(d) => ("refreshed", d),
            KeepAlive::Expired(d) => ("expired", d),
        };
        Self {
            outcome: outcome.to_string(),
            diagnostic: Some(diagnostic.into()),
        }
    }
}

impl From<StopOutcome> for OutcomeResponse {
    fn from(s: StopOutcome) -> Self {
        let (outcome, diagnostic) = match s {
            StopOutcome::Released(d) => ("released", d),
            StopOutcome::Rejected(d) => ("rejected", d),
            StopOutcome::Unreachable(d) => ("unreachable", d),
        };
        Self {
            outcome: outcome.to_string(),
            diagnostic: Some(diagnostic.into()),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct RemoteSessionView {
    pub session_id: String,
    pub status: Option<String>,
    pub created_at: Option<i64>,
}

impl From<ActiveSession> for RemoteSessionView {
    fn from(s: ActiveSession) -> Self {
        Self {
            session_id: s.session_id,
            status: s.status,
            created_at: s.created_at,
        }
    }
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct ListAvatarsQuery {
    /// Drop the cached directory and read it again from the remote.
    pub refresh: Option<bool>,
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct SessionQuery {
    /// Targets this session id instead of the caller's own.
    pub session_id: Option<String>,
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct ViewerQuery {
    /// Caller identity for browsers that cannot send the `x-user-id` header.
    pub user: Option<String>,
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub line3: Option<String>,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct CreateVideoPayload {
    pub avatar_id: String,
    pub voice_id: Option<String>,
    #[schema(example = "It is our pleasure serving you.")]
    pub text: String,
    #[schema(example = 1280)]
    pub width: Option<u32>,
    #[schema(example = 720)]
    pub height: Option<u32>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct CreateVideoResponse {
    pub video_id: String,
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct PollQuery {
    /// Seconds to keep polling before giving up. Defaults to 60, capped at 600.
    pub timeout_secs: Option<u64>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct VideoResultResponse {
    pub video_id: String,
    pub video_url: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_code: Option<i64>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            http_status: None,
            api_code: None,
        }
    }
}
