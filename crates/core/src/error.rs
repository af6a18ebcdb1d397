//! Error taxonomy shared by every remote-facing component.

use std::fmt;

use crate::backend::Capability;

/// The remote side of a failed call, copied verbatim from the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFailure {
    /// `None` when the failure was decided locally before any response existed.
    pub http_status: Option<u16>,
    pub api_code: Option<i64>,
    pub message: String,
}

impl RemoteFailure {
    pub fn new(http_status: u16, api_code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            http_status: Some(http_status),
            api_code,
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.http_status {
            Some(status) => write!(f, "HTTP {}", status)?,
            None => write!(f, "no response")?,
        }
        if let Some(code) = self.api_code {
            write!(f, ", code {}", code)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("token request rejected ({0})")]
    AuthFailure(RemoteFailure),
    #[error("remote service unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("session creation failed ({0})")]
    SessionCreateFailed(RemoteFailure),
    #[error("session start failed ({0})")]
    SessionStartFailed(RemoteFailure),
    #[error("no started session")]
    NoActiveSession,
    #[error("video job submission failed ({0})")]
    JobSubmitFailed(RemoteFailure),
    #[error("video rendering failed: {detail}")]
    RenderFailed { video_id: String, detail: String },
    #[error("video {video_id} not ready after {attempts} status queries")]
    PollTimeout { video_id: String, attempts: u32 },
    #[error("no ACTIVE avatars available")]
    EmptyDirectory,
    #[error("remote call failed ({0})")]
    Remote(RemoteFailure),
    #[error("invalid session state: {0}")]
    InvalidState(String),
    #[error("operation requires the {0} capability")]
    Unsupported(Capability),
}

impl Error {
    /// The remote failure attached to this error, if the remote produced one.
    pub fn remote_failure(&self) -> Option<&RemoteFailure> {
        match self {
            Error::AuthFailure(f)
            | Error::SessionCreateFailed(f)
            | Error::SessionStartFailed(f)
            | Error::JobSubmitFailed(f)
            | Error::Remote(f) => Some(f),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_failure_display() {
        let failure = RemoteFailure::new(401, Some(40001), "invalid api key");
        assert_eq!(failure.to_string(), "HTTP 401, code 40001: invalid api key");

        let local = RemoteFailure {
            http_status: None,
            api_code: None,
            message: "session already started".to_string(),
        };
        assert_eq!(local.to_string(), "no response: session already started");
    }

    #[test]
    fn test_error_exposes_remote_failure() {
        let err = Error::SessionCreateFailed(RemoteFailure::new(400, None, "quota exceeded"));
        assert_eq!(err.remote_failure().and_then(|f| f.http_status), Some(400));
        assert!(Error::NoActiveSession.remote_failure().is_none());
        assert!(err.to_string().contains("quota exceeded"));
    }
}
