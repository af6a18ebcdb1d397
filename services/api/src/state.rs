//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the shared remote
//! clients and the loaded viewer template.

use crate::config::Config;
use avatar_core::{
    avatar::AvatarDirectory,
    backend::{AvatarBackend, Capability},
    store::SessionStore,
    transport::Transport,
    video::VideoClient,
    viewer::ViewerTemplate,
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub directory: Arc<AvatarDirectory>,
    pub backend: Arc<AvatarBackend>,
    pub viewer: Arc<ViewerTemplate>,
}

impl AppState {
    /// Wires every remote client to the same transport.
    pub fn new(config: Config, transport: Arc<dyn Transport>, viewer: ViewerTemplate) -> Self {
        let directory = AvatarDirectory::new(transport.clone(), config.avatar_cache_ttl);
        let backend = match config.capability {
            Capability::LiveStreaming => AvatarBackend::LiveStreaming(SessionStore::new(transport)),
            Capability::BatchRender => AvatarBackend::BatchRender(VideoClient::new(
                transport,
                config.video_auth,
                config.video_poll_interval,
            )),
        };
        Self {
            config: Arc::new(config),
            directory: Arc::new(directory),
            backend: Arc::new(backend),
            viewer: Arc::new(viewer),
        }
    }
}
