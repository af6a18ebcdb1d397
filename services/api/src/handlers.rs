//! Axum Handlers for the REST API
//!
//! Each handler maps one HTTP route onto an avatar operation. Callers are
//! identified by the `x-user-id` header and each one owns its streaming session.
//! It uses `utoipa` doc comments to generate OpenAPI documentation.

use avatar_core::{
    Error as CoreError,
    streaming::resolve_voice,
    video::Dimension,
    viewer::DEFAULT_LINES,
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

use crate::{
    models::{
        AvatarDiagnosticsResponse, AvatarListResponse, AvatarView, CreateVideoPayload,
        CreateVideoResponse, DiagnosticView, ErrorResponse, ListAvatarsQuery, OutcomeResponse,
        PollQuery,
        RemoteSessionView, SelectAvatarPayload, SelectAvatarResponse, SessionQuery,
        SessionStateResponse, SessionView, TaskPayload, TaskResponse, VideoResultResponse,
        ViewerQuery, state_name,
    },
    state::AppState,
};

pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 60;
pub const MAX_POLL_TIMEOUT_SECS: u64 = 600;

const EMPTY_DIRECTORY_NOTICE: &str =
    "No ACTIVE streaming avatars are available for this account.";

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse::new(message))).into_response()
            }
            ApiError::InternalServerError(err) => match err.downcast::<CoreError>() {
                Ok(core) => core_error_response(core),
                Err(err) => {
                    error!("Internal Server Error: {:?}", err);
                    let message = "An internal server error occurred.".to_string();
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(ErrorResponse::new(message)),
                    )
                        .into_response()
                }
            },
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// The HTTP status a core failure is reported with.
pub fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::NoActiveSession | CoreError::InvalidState(_) | CoreError::Unsupported(_) => {
            StatusCode::CONFLICT
        }
        CoreError::EmptyDirectory => StatusCode::NOT_FOUND,
        CoreError::RemoteUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::PollTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        CoreError::AuthFailure(_)
        | CoreError::SessionCreateFailed(_)
        | CoreError::SessionStartFailed(_)
        | CoreError::JobSubmitFailed(_)
        | CoreError::RenderFailed { .. }
        | CoreError::Remote(_) => StatusCode::BAD_GATEWAY,
    }
}

fn core_error_response(err: CoreError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        warn!(error = %err, "Avatar operation failed");
    }
    let failure = err.remote_failure();
    let body = ErrorResponse {
        message: err.to_string(),
        http_status: failure.and_then(|f| f.http_status),
        api_code: failure.and_then(|f| f.api_code),
    };
    (status, Json(body)).into_response()
}

fn caller_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest("x-user-id header is required".to_string()))
}

/// List the ACTIVE streaming avatars. `refresh=true` bypasses the cache.
#[utoipa::path(
    get,
    path = "/avatars",
    params(ListAvatarsQuery),
    responses(
        (status = 200, description = "Eligible avatars, possibly empty with a notice", body = AvatarListResponse),
        (status = 502, description = "The remote rejected the listing", body = ErrorResponse),
        (status = 503, description = "The remote is unreachable", body = ErrorResponse)
    )
)]
pub async fn list_avatars(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListAvatarsQuery>,
) -> Result<Json<AvatarListResponse>, ApiError> {
    if query.refresh.unwrap_or(false) {
        state.directory.invalidate();
    }
    match state.directory.list_avatars().await {
        Ok(avatars) => Ok(Json(AvatarListResponse {
            avatars: avatars.into_iter().map(AvatarView::from).collect(),
            notice: None,
        })),
        Err(CoreError::EmptyDirectory) => Ok(Json(AvatarListResponse {
            avatars: Vec::new(),
            notice: Some(EMPTY_DIRECTORY_NOTICE.to_string()),
        })),
        Err(e) => Err(e.into()),
    }
}

/// Summarize the shape of the raw avatar listing.
#[utoipa::path(
    get,
    path = "/avatars/diagnostics",
    responses(
        (status = 200, description = "Avatar listing diagnostic", body = AvatarDiagnosticsResponse),
        (status = 503, description = "The remote is unreachable", body = ErrorResponse)
    )
)]
pub async fn avatar_diagnostics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AvatarDiagnosticsResponse>, ApiError> {
    let diagnostic = state.directory.diagnose().await?;
    Ok(Json(diagnostic.into()))
}

/// Get the caller's local session and recent diagnostics.
#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "Local session state", body = SessionStateResponse),
        (status = 400, description = "Missing caller identity", body = ErrorResponse),
        (status = 409, description = "Live streaming is not enabled", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the caller")
    )
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SessionStateResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    let store = state.backend.sessions()?;

    let Some(client) = store.existing(&caller).await else {
        return Ok(Json(SessionStateResponse {
            state: "IDLE".to_string(),
            token_ready: false,
            session: None,
            diagnostics: Vec::new(),
        }));
    };
    let client = client.lock().await;
    Ok(Json(SessionStateResponse {
        state: state_name(&client.state()),
        token_ready: client.token().is_some(),
        session: client.session().cloned().map(SessionView::from),
        diagnostics: client
            .diagnostics()
            .into_iter()
            .map(DiagnosticView::from)
            .collect(),
    }))
}

/// Select an avatar: stop the caller's session, then token, new session, start.
#[utoipa::path(
    post,
    path = "/session",
    request_body = SelectAvatarPayload,
    responses(
        (status = 201, description = "Session started", body = SelectAvatarResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 404, description = "Avatar not in the directory", body = ErrorResponse),
        (status = 502, description = "The remote rejected a step", body = ErrorResponse),
        (status = 503, description = "The remote is unreachable", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the caller")
    )
)]
pub async fn select_avatar(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<SelectAvatarPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = caller_id(&headers)?;
    if payload.avatar_id.trim().is_empty() {
        return Err(ApiError::BadRequest("avatar_id must not be empty".to_string()));
    }
    let store = state.backend.sessions()?;

    let avatar = match state.directory.find(&payload.avatar_id).await {
        Ok(Some(avatar)) => Some(avatar),
        Ok(None) => {
            return Err(ApiError::NotFound(format!(
                "avatar {} is not an ACTIVE streaming avatar",
                payload.avatar_id
            )));
        }
        Err(e) => {
            warn!(error = %e, "Avatar directory unavailable; using fallback voice");
            None
        }
    };
    let voice_id = resolve_voice(
        payload.voice_id.as_deref(),
        avatar.as_ref(),
        &state.config.default_voice_id,
    );

    let client = store.client(&caller).await;
    let mut client = client.lock().await;
    let session = client
        .switch_avatar(&payload.avatar_id, &voice_id, &payload.session_options())
        .await?;
    info!(%caller, session_id = %session.session_id, avatar_id = %session.avatar_id, "Avatar selected");

    let response = SelectAvatarResponse {
        token: client.token().unwrap_or_default().to_string(),
        session: session.into(),
        diagnostics: client
            .diagnostics()
            .into_iter()
            .map(DiagnosticView::from)
            .collect(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Stop the caller's session, or the given session id. Never fails.
#[utoipa::path(
    delete,
    path = "/session",
    responses(
        (status = 200, description = "Stop outcome: released, rejected, unreachable or idle", body = OutcomeResponse),
        (status = 400, description = "Missing caller identity", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the caller"),
        SessionQuery
    )
)]
pub async fn stop_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
) -> Result<Json<OutcomeResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    let store = state.backend.sessions()?;

    let Some(client) = store.existing(&caller).await else {
        // Nothing tracked for this caller, but an explicit id is still released remotely.
        let Some(session_id) = query.session_id else {
            return Ok(Json(OutcomeResponse::idle()));
        };
        let outcome = store.detached_client().stop_session(&session_id).await;
        info!(%caller, %session_id, ok = outcome.diagnostic().ok, "Untracked session stopped");
        return Ok(Json(outcome.into()));
    };

    let local_id = client.lock().await.session().map(|s| s.session_id.clone());
    let outcome = match query.session_id {
        Some(session_id) if local_id.as_deref() != Some(session_id.as_str()) => {
            let (outcome, idle) = {
                let mut client = client.lock().await;
                let outcome = client.stop_session(&session_id).await;
                (outcome, client.session().is_none())
            };
            if idle {
                store.release(&caller).await;
            }
            Some(outcome)
        }
        _ => store.release(&caller).await,
    };

    let remaining_callers = store.callers().await.len();
    info!(
        %caller,
        stopped = outcome.is_some(),
        remaining_callers,
        "Session stop handled"
    );
    Ok(Json(
        outcome
            .map(OutcomeResponse::from)
            .unwrap_or_else(OutcomeResponse::idle),
    ))
}

/// Make the avatar speak a text verbatim.
#[utoipa::path(
    post,
    path = "/session/task",
    request_body = TaskPayload,
    responses(
        (status = 200, description = "Task accepted", body = TaskResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 409, description = "No started session", body = ErrorResponse),
        (status = 502, description = "The remote rejected the task", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the caller")
    )
)]
pub async fn send_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<TaskPayload>,
) -> Result<Json<TaskResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    if payload.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }
    let store = state.backend.sessions()?;

    let client = store.existing(&caller).await.ok_or(CoreError::NoActiveSession)?;
    let mut client = client.lock().await;
    let session_id = payload
        .session_id
        .or_else(|| client.session().map(|s| s.session_id.clone()))
        .ok_or(CoreError::NoActiveSession)?;
    let ack = client.send_task(&session_id, &payload.text).await?;
    Ok(Json(ack.into()))
}

/// Cut off the avatar's current utterance.
#[utoipa::path(
    post,
    path = "/session/interrupt",
    responses(
        (status = 200, description = "Interrupted", body = DiagnosticView),
        (status = 409, description = "No started session", body = ErrorResponse),
        (status = 502, description = "The remote rejected the interrupt", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the caller"),
        SessionQuery
    )
)]
pub async fn interrupt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
) -> Result<Json<DiagnosticView>, ApiError> {
    let caller = caller_id(&headers)?;
    let store = state.backend.sessions()?;

    let client = store.existing(&caller).await.ok_or(CoreError::NoActiveSession)?;
    let mut client = client.lock().await;
    let session_id = query
        .session_id
        .or_else(|| client.session().map(|s| s.session_id.clone()))
        .ok_or(CoreError::NoActiveSession)?;
    let diagnostic = client.interrupt(&session_id).await?;
    Ok(Json(diagnostic.into()))
}

/// Reset the remote idle timer of the caller's session.
#[utoipa::path(
    post,
    path = "/session/keep-alive",
    responses(
        (status = 200, description = "Refreshed or expired", body = OutcomeResponse),
        (status = 409, description = "No session", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the caller")
    )
)]
pub async fn keep_alive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<OutcomeResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    let store = state.backend.sessions()?;

    let client = store.existing(&caller).await.ok_or(CoreError::NoActiveSession)?;
    let outcome = client.lock().await.keep_alive().await?;
    Ok(Json(outcome.into()))
}

/// List the sessions the remote account considers live.
#[utoipa::path(
    get,
    path = "/sessions/remote",
    responses(
        (status = 200, description = "Remote live sessions", body = [RemoteSessionView]),
        (status = 502, description = "The remote rejected the listing", body = ErrorResponse)
    )
)]
pub async fn list_remote_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RemoteSessionView>>, ApiError> {
    let mut client = state.backend.sessions()?.detached_client();
    let sessions = client.list_active_sessions().await?;
    Ok(Json(sessions.into_iter().map(RemoteSessionView::from).collect()))
}

/// Render the viewer page for the caller's started session.
///
/// The page opens its own remote streaming session from the token. That session
/// is separate from the one `POST /session` started: `DELETE /session` does not
/// stop it, the page stops it itself on its Stop button or when it is closed.
#[utoipa::path(
    get,
    path = "/viewer",
    responses(
        (status = 200, description = "Viewer HTML", content_type = "text/html", body = String),
        (status = 400, description = "Missing caller identity", body = ErrorResponse),
        (status = 409, description = "No session", body = ErrorResponse)
    ),
    params(ViewerQuery)
)]
pub async fn viewer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ViewerQuery>,
) -> Result<Html<String>, ApiError> {
    let caller = match query.user.clone().filter(|u| !u.trim().is_empty()) {
        Some(user) => user,
        None => caller_id(&headers)?,
    };
    let store = state.backend.sessions()?;

    let client = store.existing(&caller).await.ok_or(CoreError::NoActiveSession)?;
    let client = client.lock().await;
    let (Some(session), Some(token)) = (client.session(), client.token()) else {
        return Err(CoreError::NoActiveSession.into());
    };

    let lines = [
        query.line1.as_deref().unwrap_or(DEFAULT_LINES[0]),
        query.line2.as_deref().unwrap_or(DEFAULT_LINES[1]),
        query.line3.as_deref().unwrap_or(DEFAULT_LINES[2]),
    ];
    let html = state
        .viewer
        .render(token, &session.avatar_id, &session.voice_id, &lines);
    Ok(Html(html))
}

/// Submit a batch video rendering job.
#[utoipa::path(
    post,
    path = "/videos",
    request_body = CreateVideoPayload,
    responses(
        (status = 202, description = "Job submitted", body = CreateVideoResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 409, description = "Batch rendering is not enabled", body = ErrorResponse),
        (status = 502, description = "The remote rejected the job", body = ErrorResponse)
    )
)]
pub async fn create_video(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateVideoPayload>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.avatar_id.trim().is_empty() || payload.text.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "avatar_id and text must not be empty".to_string(),
        ));
    }
    let videos = state.backend.videos()?;

    let voice_id = resolve_voice(
        payload.voice_id.as_deref(),
        None,
        &state.config.default_voice_id,
    );
    let defaults = Dimension::default();
    let dimension = Dimension {
        width: payload.width.unwrap_or(defaults.width),
        height: payload.height.unwrap_or(defaults.height),
    };
    let video_id = videos
        .create_video(&payload.avatar_id, &voice_id, &payload.text, dimension)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(CreateVideoResponse { video_id })))
}

fn poll_timeout(query: &PollQuery) -> Duration {
    let secs = query
        .timeout_secs
        .unwrap_or(DEFAULT_POLL_TIMEOUT_SECS)
        .min(MAX_POLL_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

/// Wait for a video job and return its URL. The wait is capped at
/// `MAX_POLL_TIMEOUT_SECS` whatever `timeout_secs` asks for.
#[utoipa::path(
    get,
    path = "/videos/{id}",
    responses(
        (status = 200, description = "Rendered video", body = VideoResultResponse),
        (status = 502, description = "Rendering failed", body = ErrorResponse),
        (status = 504, description = "Still rendering when the timeout ran out", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Video job ID"),
        PollQuery
    )
)]
pub async fn poll_video(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
    Query(query): Query<PollQuery>,
) -> Result<Json<VideoResultResponse>, ApiError> {
    let videos = state.backend.videos()?;
    let video_url = videos.poll_video(&video_id, poll_timeout(&query)).await?;
    Ok(Json(VideoResultResponse {
        video_id,
        video_url,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatar_core::{RemoteFailure, backend::Capability};
    use axum::body::to_bytes;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&CoreError::NoActiveSession), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&CoreError::Unsupported(Capability::BatchRender)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&CoreError::RemoteUnavailable("reset".to_string())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&CoreError::PollTimeout {
                video_id: "v".to_string(),
                attempts: 3
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&CoreError::AuthFailure(RemoteFailure::new(401, None, "bad key"))),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_core_error_carries_remote_details() {
        let err: ApiError =
            CoreError::Remote(RemoteFailure::new(400, Some(10005), "session not found")).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["http_status"], 400);
        assert_eq!(json["api_code"], 10005);
        assert!(json["message"].as_str().unwrap().contains("session not found"));
    }

    #[tokio::test]
    async fn test_non_core_error_is_internal() {
        let err: ApiError = anyhow::anyhow!("boom").into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_poll_timeout_is_capped() {
        let query = |timeout_secs| PollQuery { timeout_secs };
        assert_eq!(poll_timeout(&query(None)), Duration::from_secs(60));
        assert_eq!(poll_timeout(&query(Some(5))), Duration::from_secs(5));
        assert_eq!(poll_timeout(&query(Some(86_400))), Duration::from_secs(600));
    }

    #[test]
    fn test_caller_id_required() {
        let mut headers = HeaderMap::new();
        assert!(matches!(caller_id(&headers), Err(ApiError::BadRequest(_))));

        headers.insert("x-user-id", "kiosk-1".parse().unwrap());
        assert_eq!(caller_id(&headers).ok().as_deref(), Some("kiosk-1"));
    }
}
