//! Streaming Session Client.
//!
//! A small state machine over the remote streaming API. The states are the
//! client's belief about the remote session, driven only by explicit calls:
//!
//! ```text
//! Idle --create_token--> TokenReady --new_session--> Created --start_session--> Started
//! Started --send_task / interrupt--> Started
//! Started --stop_session--> Idle
//! any --remote error on the local session--> Idle
//! ```
//!
//! At most one session is live per client. Creating a new session while one
//! exists stops the old one first, and waits for that stop to finish.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{collections::VecDeque, sync::Arc};
use tracing::{info, instrument, warn};

use crate::{
    avatar::AvatarDescriptor,
    error::{Error, RemoteFailure, Result},
    interpreter::{self, Diagnostic},
    response::ApiResponse,
    transport::{ApiRequest, Transport, endpoints},
};

/// A public voice known to work with every streaming avatar.
pub const DEFAULT_VOICE_ID: &str = "f38a635bee7a4d1f9b0a654a31d050d2";

/// How many recent diagnostics a client keeps for display.
pub const DIAGNOSTIC_HISTORY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoEncoding {
    #[default]
    #[serde(rename = "VP8")]
    Vp8,
    #[serde(rename = "H264")]
    H264,
}

impl VideoEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoEncoding::Vp8 => "VP8",
            VideoEncoding::H264 => "H264",
        }
    }
}

/// Speech recognition used for voice-driven input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SttSettings {
    pub provider: String,
    /// Transcripts below this confidence are ignored by the remote side.
    pub confidence: f64,
}

impl Default for SttSettings {
    fn default() -> Self {
        Self {
            provider: "deepgram".to_string(),
            confidence: 0.55,
        }
    }
}

/// Remote configuration for a new session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOptions {
    pub quality: Quality,
    pub video_encoding: VideoEncoding,
    /// The remote closes the session after this much inactivity.
    pub idle_timeout_secs: u32,
    /// `None` disables voice input.
    pub stt: Option<SttSettings>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            quality: Quality::default(),
            video_encoding: VideoEncoding::default(),
            idle_timeout_secs: 120,
            stt: Some(SttSettings::default()),
        }
    }
}

impl SessionOptions {
    fn request_body(&self, avatar_id: &str, voice_id: &str) -> Value {
        let mut body = json!({
            "quality": self.quality.as_str(),
            "avatar_id": avatar_id,
            "voice": { "voice_id": voice_id },
            "video_encoding": self.video_encoding.as_str(),
            "version": "v2",
            "activity_idle_timeout": self.idle_timeout_secs,
        });
        if let Some(stt) = &self.stt {
            body["stt_settings"] = json!({
                "provider": stt.provider,
                "confidence": stt.confidence,
            });
        }
        body
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Idle,
    TokenReady,
    Created,
    Started,
}

/// Local projection of one remote session. The remote copy is authoritative
/// and this one goes stale silently if the remote times it out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub session_id: String,
    pub realtime_endpoint: Option<String>,
    pub access_url: Option<String>,
    pub access_token: Option<String>,
    pub avatar_id: String,
    pub voice_id: String,
    pub created_at: DateTime<Utc>,
    pub lifecycle_state: LifecycleState,
}

impl Session {
    fn from_response(response: &ApiResponse, avatar_id: &str, voice_id: &str) -> Option<Self> {
        let owned = |key: &str| response.field_str(key).map(str::to_string);
        Some(Self {
            session_id: owned("session_id")?,
            realtime_endpoint: owned("realtime_endpoint"),
            access_url: owned("url"),
            access_token: owned("access_token"),
            avatar_id: avatar_id.to_string(),
            voice_id: voice_id.to_string(),
            created_at: Utc::now(),
            lifecycle_state: LifecycleState::Created,
        })
    }
}

/// Acknowledgement of a spoken task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskAck {
    pub task_id: Option<String>,
    pub duration_ms: Option<f64>,
    pub diagnostic: Diagnostic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "diagnostic", rename_all = "snake_case")]
pub enum KeepAlive {
    Refreshed(Diagnostic),
    /// The session is most likely gone already; the client is back to `Idle`.
    Expired(Diagnostic),
}

/// The result of a stop. Every variant leaves the local session cleared.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "diagnostic", rename_all = "snake_case")]
pub enum StopOutcome {
    Released(Diagnostic),
    Rejected(Diagnostic),
    Unreachable(Diagnostic),
}

impl StopOutcome {
    pub fn diagnostic(&self) -> &Diagnostic {
        match self {
            StopOutcome::Released(d) | StopOutcome::Rejected(d) | StopOutcome::Unreachable(d) => d,
        }
    }
}

/// One entry of the remote account's live-session list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveSession {
    pub session_id: String,
    pub status: Option<String>,
    pub created_at: Option<i64>,
}

/// Picks the voice for a session: an explicit choice, else the avatar's own
/// default, else `fallback`.
pub fn resolve_voice(
    explicit: Option<&str>,
    avatar: Option<&AvatarDescriptor>,
    fallback: &str,
) -> String {
    explicit
        .filter(|v| !v.trim().is_empty())
        .or_else(|| avatar.and_then(|a| a.default_voice_id.as_deref()))
        .unwrap_or(fallback)
        .to_string()
}

pub struct StreamingClient {
    transport: Arc<dyn Transport>,
    state: LifecycleState,
    token: Option<String>,
    session: Option<Session>,
    diagnostics: VecDeque<Diagnostic>,
}

impl StreamingClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            state: LifecycleState::Idle,
            token: None,
            session: None,
            diagnostics: VecDeque::with_capacity(DIAGNOSTIC_HISTORY),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// The streaming token handed to the viewer.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Most recent remote outcomes, oldest first.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.iter().cloned().collect()
    }

    /// Requests a short-lived streaming token.
    #[instrument(skip(self))]
    pub async fn create_token(&mut self) -> Result<String> {
        let response = self
            .call("Create streaming token", ApiRequest::post(endpoints::CREATE_TOKEN))
            .await?;
        if !response.is_success() {
            // A live session keeps the token it was opened with.
            if self.session.is_none() {
                self.token = None;
                self.state = LifecycleState::Idle;
            }
            return Err(Error::AuthFailure(response.failure()));
        }

        let token = response
            .field_str("token")
            .map(str::to_string)
            .ok_or_else(|| {
                Error::AuthFailure(RemoteFailure::new(
                    response.http_status,
                    response.api_code,
                    "response did not contain a token",
                ))
            })?;

        info!(
            token_len = token.len(),
            token_prefix = %token.chars().take(8).collect::<String>(),
            "Streaming token issued"
        );
        self.token = Some(token.clone());
        if self.state == LifecycleState::Idle {
            self.state = LifecycleState::TokenReady;
        }
        Ok(token)
    }

    /// Allocates a remote session. Any existing local session is stopped first.
    #[instrument(skip(self, options))]
    pub async fn new_session(
        &mut self,
        avatar_id: &str,
        voice_id: &str,
        options: &SessionOptions,
    ) -> Result<Session> {
        if let Some(previous) = self.session.as_ref().map(|s| s.session_id.clone()) {
            info!(previous_session = %previous, "Stopping previous session before creating a new one");
            self.stop_session(&previous).await;
        }

        let request = ApiRequest::post(endpoints::NEW_SESSION)
            .with_json(options.request_body(avatar_id, voice_id));
        let response = match self.call("Create streaming session", request).await {
            Ok(response) => response,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };

        if !response.is_success() {
            self.reset();
            return Err(Error::SessionCreateFailed(response.failure()));
        }
        let Some(session) = Session::from_response(&response, avatar_id, voice_id) else {
            self.reset();
            return Err(Error::SessionCreateFailed(RemoteFailure::new(
                response.http_status,
                response.api_code,
                "response did not contain a session_id",
            )));
        };

        info!(session_id = %session.session_id, "Streaming session created");
        self.session = Some(session.clone());
        self.set_state(LifecycleState::Created);
        Ok(session)
    }

    /// Moves a created session to streaming. Never retried automatically.
    #[instrument(skip(self))]
    pub async fn start_session(&mut self, session_id: &str) -> Result<Diagnostic> {
        let Some(local) = &self.session else {
            return Err(Error::NoActiveSession);
        };
        if local.session_id != session_id {
            return Err(Error::InvalidState(format!(
                "session {} is not the local session",
                session_id
            )));
        }
        if self.state == LifecycleState::Started {
            return Err(Error::InvalidState(format!(
                "session {} is already started",
                session_id
            )));
        }

        let request = ApiRequest::post(endpoints::START_SESSION)
            .with_json(json!({ "session_id": session_id }));
        let response = self.call("Start streaming session", request).await?;
        if !response.is_success() {
            self.reset();
            return Err(Error::SessionStartFailed(response.failure()));
        }

        self.set_state(LifecycleState::Started);
        Ok(Diagnostic::from_response("Start streaming session", &response))
    }

    /// Makes the avatar speak `text` verbatim.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn send_task(&mut self, session_id: &str, text: &str) -> Result<TaskAck> {
        self.require_started()?;
        let request = ApiRequest::post(endpoints::SEND_TASK)
            .with_json(json!({ "session_id": session_id, "text": text }));
        let response = self.session_call("Send task", request).await?;
        Ok(TaskAck {
            task_id: response.field_str("task_id").map(str::to_string),
            duration_ms: response.field("duration_ms").and_then(Value::as_f64),
            diagnostic: Diagnostic::from_response("Send task", &response),
        })
    }

    /// Cuts off the avatar's current utterance.
    #[instrument(skip(self))]
    pub async fn interrupt(&mut self, session_id: &str) -> Result<Diagnostic> {
        self.require_started()?;
        let request = ApiRequest::post(endpoints::INTERRUPT)
            .with_json(json!({ "session_id": session_id }));
        let response = self.session_call("Interrupt", request).await?;
        Ok(Diagnostic::from_response("Interrupt", &response))
    }

    /// Resets the remote idle timer. The request carries no body.
    #[instrument(skip(self))]
    pub async fn keep_alive(&mut self) -> Result<KeepAlive> {
        if self.session.is_none() {
            return Err(Error::NoActiveSession);
        }
        let title = "Keep alive";
        match self.call(title, ApiRequest::post(endpoints::KEEP_ALIVE)).await {
            Ok(response) if response.is_success() => {
                Ok(KeepAlive::Refreshed(Diagnostic::from_response(title, &response)))
            }
            Ok(response) => {
                warn!("Keep-alive rejected; treating session as expired");
                self.reset();
                Ok(KeepAlive::Expired(Diagnostic::from_response(title, &response)))
            }
            Err(e) => {
                warn!(error = %e, "Keep-alive unreachable; treating session as expired");
                self.reset();
                Ok(KeepAlive::Expired(Diagnostic::unreachable(title, e)))
            }
        }
    }

    /// Releases a remote session. Never fails: whatever the remote answers,
    /// the local session for `session_id` is cleared.
    #[instrument(skip(self))]
    pub async fn stop_session(&mut self, session_id: &str) -> StopOutcome {
        let title = "Stop streaming session";
        let request = ApiRequest::post(endpoints::STOP_SESSION)
            .with_json(json!({ "session_id": session_id }));
        let outcome = match self.call(title, request).await {
            Ok(response) if response.is_success() => {
                StopOutcome::Released(Diagnostic::from_response(title, &response))
            }
            Ok(response) => StopOutcome::Rejected(Diagnostic::from_response(title, &response)),
            Err(e) => StopOutcome::Unreachable(Diagnostic::unreachable(title, e)),
        };

        let is_local = self
            .session
            .as_ref()
            .is_some_and(|s| s.session_id == session_id);
        if is_local || self.session.is_none() {
            self.reset();
        }
        outcome
    }

    /// Read-only snapshot of the sessions the remote account considers live.
    /// Never used to drive local transitions.
    pub async fn list_active_sessions(&mut self) -> Result<Vec<ActiveSession>> {
        let response = self
            .call("List streaming sessions", ApiRequest::get(endpoints::LIST_SESSIONS))
            .await?;
        if !response.is_success() {
            return Err(Error::Remote(response.failure()));
        }
        Ok(parse_active_sessions(&response))
    }

    /// Switches to another avatar: stop the current session (if any), then
    /// token, new session, start. Returns the started session.
    #[instrument(skip(self, options))]
    pub async fn switch_avatar(
        &mut self,
        avatar_id: &str,
        voice_id: &str,
        options: &SessionOptions,
    ) -> Result<Session> {
        if let Some(previous) = self.session.as_ref().map(|s| s.session_id.clone()) {
            self.stop_session(&previous).await;
        }
        self.create_token().await?;
        let session = self.new_session(avatar_id, voice_id, options).await?;
        self.start_session(&session.session_id).await?;
        self.session.clone().ok_or(Error::NoActiveSession)
    }

    fn require_started(&self) -> Result<()> {
        if self.state == LifecycleState::Started && self.session.is_some() {
            Ok(())
        } else {
            Err(Error::NoActiveSession)
        }
    }

    /// A session-scoped call whose remote failure is passed through verbatim.
    /// A failure on the local session means the session is lost.
    async fn session_call(&mut self, title: &str, request: ApiRequest) -> Result<ApiResponse> {
        let targets_local = match (request.session_id(), &self.session) {
            (Some(id), Some(local)) => id == local.session_id,
            _ => false,
        };
        let response = self.call(title, request).await?;
        if !response.is_success() {
            if targets_local {
                self.reset();
            }
            return Err(Error::Remote(response.failure()));
        }
        Ok(response)
    }

    /// Executes a call and records its diagnostic, successful or not.
    async fn call(&mut self, title: &str, request: ApiRequest) -> Result<ApiResponse> {
        match self.transport.execute(request).await {
            Ok(response) => {
                let diagnostic = interpreter::interpret(title, &response);
                self.record(diagnostic);
                Ok(response)
            }
            Err(e) => {
                let diagnostic = Diagnostic::unreachable(title, &e);
                diagnostic.report();
                self.record(diagnostic);
                Err(e)
            }
        }
    }

    fn record(&mut self, diagnostic: Diagnostic) {
        if self.diagnostics.len() == DIAGNOSTIC_HISTORY {
            self.diagnostics.pop_front();
        }
        self.diagnostics.push_back(diagnostic);
    }

    fn set_state(&mut self, state: LifecycleState) {
        self.state = state;
        if let Some(session) = &mut self.session {
            session.lifecycle_state = state;
        }
    }

    fn reset(&mut self) {
        self.state = LifecycleState::Idle;
        self.token = None;
        self.session = None;
    }
}

fn parse_active_sessions(response: &ApiResponse) -> Vec<ActiveSession> {
    let items = response
        .field("sessions")
        .and_then(Value::as_array)
        .or_else(|| response.data.as_array());
    items
        .into_iter()
        .flatten()
        .filter_map(|item| {
            Some(ActiveSession {
                session_id: item.get("session_id")?.as_str()?.to_string(),
                status: item.get("status").and_then(Value::as_str).map(str::to_string),
                created_at: item.get("created_at").and_then(Value::as_i64),
            })
        })
        .collect()
}
