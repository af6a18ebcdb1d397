//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the avatar and session REST API, the viewer page, and OpenAPI
//! documentation.

use crate::{
    handlers,
    models::{
        AvatarDiagnosticsResponse, AvatarListResponse, AvatarView, CreateVideoPayload,
        CreateVideoResponse, DiagnosticView, EncodingParam, ErrorResponse, OutcomeResponse,
        QualityParam, RemoteSessionView, SelectAvatarPayload, SelectAvatarResponse,
        SessionStateResponse, SessionView, TaskPayload, TaskResponse, VideoResultResponse,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_avatars,
        handlers::avatar_diagnostics,
        handlers::get_session,
        handlers::select_avatar,
        handlers::stop_session,
        handlers::send_task,
        handlers::interrupt,
        handlers::keep_alive,
        handlers::list_remote_sessions,
        handlers::viewer,
        handlers::create_video,
        handlers::poll_video,
    ),
    components(
        schemas(
            AvatarView, AvatarListResponse, AvatarDiagnosticsResponse, DiagnosticView,
            SessionView, SessionStateResponse, SelectAvatarPayload, SelectAvatarResponse,
            QualityParam, EncodingParam, TaskPayload, TaskResponse, OutcomeResponse,
            RemoteSessionView, CreateVideoPayload, CreateVideoResponse, VideoResultResponse,
            ErrorResponse
        )
    ),
    tags(
        (name = "Avatar API", description = "Streaming avatar sessions and batch avatar videos")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/avatars", get(handlers::list_avatars))
        .route("/avatars/diagnostics", get(handlers::avatar_diagnostics))
        .route(
            "/session",
            get(handlers::get_session)
                .post(handlers::select_avatar)
                .delete(handlers::stop_session),
        )
        .route("/session/task", post(handlers::send_task))
        .route("/session/interrupt", post(handlers::interrupt))
        .route("/session/keep-alive", post(handlers::keep_alive))
        .route("/sessions/remote", get(handlers::list_remote_sessions))
        .route("/viewer", get(handlers::viewer))
        .route("/videos", post(handlers::create_video))
        .route("/videos/{id}", get(handlers::poll_video))
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
