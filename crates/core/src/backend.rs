//! Capability-tagged backend.
//!
//! A deployment either streams live avatars or renders videos in batch. The
//! choice is one enum value instead of separate code paths.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    error::{Error, Result},
    store::SessionStore,
    video::VideoClient,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    LiveStreaming,
    BatchRender,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::LiveStreaming => write!(f, "live streaming"),
            Capability::BatchRender => write!(f, "batch render"),
        }
    }
}

pub enum AvatarBackend {
    LiveStreaming(SessionStore),
    BatchRender(VideoClient),
}

impl AvatarBackend {
    pub fn capability(&self) -> Capability {
        match self {
            AvatarBackend::LiveStreaming(_) => Capability::LiveStreaming,
            AvatarBackend::BatchRender(_) => Capability::BatchRender,
        }
    }

    pub fn supports_live_streaming(&self) -> bool {
        self.capability() == Capability::LiveStreaming
    }

    pub fn supports_batch_render(&self) -> bool {
        self.capability() == Capability::BatchRender
    }

    pub fn sessions(&self) -> Result<&SessionStore> {
        match self {
            AvatarBackend::LiveStreaming(store) => Ok(store),
            _ => Err(Error::Unsupported(Capability::LiveStreaming)),
        }
    }

    pub fn videos(&self) -> Result<&VideoClient> {
        match self {
            AvatarBackend::BatchRender(videos) => Ok(videos),
            _ => Err(Error::Unsupported(Capability::BatchRender)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testing::ScriptedTransport, transport::AuthScheme};
    use std::{sync::Arc, time::Duration};

    #[test]
    fn test_capability_gates_components() {
        let transport = Arc::new(ScriptedTransport::new());
        let live = AvatarBackend::LiveStreaming(SessionStore::new(transport.clone()));
        assert!(live.supports_live_streaming());
        assert!(!live.supports_batch_render());
        assert!(live.sessions().is_ok());
        assert!(matches!(
            live.videos(),
            Err(Error::Unsupported(Capability::BatchRender))
        ));

        let batch = AvatarBackend::BatchRender(VideoClient::new(
            transport,
            AuthScheme::ApiKey,
            Duration::from_secs(1),
        ));
        assert_eq!(batch.capability(), Capability::BatchRender);
        assert!(batch.videos().is_ok());
        assert!(batch.sessions().is_err());
    }

    #[test]
    fn test_capability_serialization() {
        assert_eq!(
            serde_json::to_string(&Capability::LiveStreaming).unwrap(),
            "\"live_streaming\""
        );
        assert_eq!(Capability::BatchRender.to_string(), "batch render");
    }
}
