//! Video Generation Client: one-shot rendering jobs.
//!
//! Submitting a job returns an id; the finished URL is obtained by polling the
//! status endpoint at a fixed interval until the job completes, fails, or the
//! caller's timeout runs out. This is the only wait loop in the crate.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{Error, RemoteFailure, Result},
    interpreter::{self, Diagnostic},
    transport::{ApiRequest, AuthScheme, Transport, endpoints},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub width: u32,
    pub height: u32,
}

impl Default for Dimension {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    Pending,
    Waiting,
    Processing,
    Completed,
    Failed,
    Unknown(String),
}

impl VideoStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            "pending" => VideoStatus::Pending,
            "waiting" => VideoStatus::Waiting,
            "processing" => VideoStatus::Processing,
            "completed" => VideoStatus::Completed,
            "failed" => VideoStatus::Failed,
            other => VideoStatus::Unknown(other.to_string()),
        }
    }
}

/// One status query's answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoJob {
    pub video_id: String,
    pub status: VideoStatus,
    pub video_url: Option<String>,
    pub error: Option<String>,
    pub diagnostic: Diagnostic,
}

pub struct VideoClient {
    transport: Arc<dyn Transport>,
    auth: AuthScheme,
    interval: Duration,
}

impl VideoClient {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(transport: Arc<dyn Transport>, auth: AuthScheme, interval: Duration) -> Self {
        Self {
            transport,
            auth,
            interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.interval
    }

    /// Submits a rendering job and returns its id.
    ///
    /// The remote sometimes nests the id under `data` and sometimes returns it at
    /// the top level; both are accepted.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn create_video(
        &self,
        avatar_id: &str,
        voice_id: &str,
        text: &str,
        dimension: Dimension,
    ) -> Result<String> {
        let body = json!({
            "video_inputs": [{
                "character": {
                    "type": "avatar",
                    "avatar_id": avatar_id,
                    "avatar_style": "normal",
                },
                "voice": {
                    "type": "text",
                    "input_text": text,
                    "voice_id": voice_id,
                },
                "background": {
                    "type": "color",
                    "value": "#FFFFFF",
                },
            }],
            "dimension": {
                "width": dimension.width,
                "height": dimension.height,
            },
        });
        let request = ApiRequest::post(endpoints::GENERATE_VIDEO)
            .with_json(body)
            .with_auth(self.auth);
        let response = self.transport.execute(request).await?;
        interpreter::interpret("Submit video job", &response);

        if !response.is_success() {
            return Err(Error::JobSubmitFailed(response.failure()));
        }
        let video_id = response.field_str("video_id").ok_or_else(|| {
            Error::JobSubmitFailed(RemoteFailure::new(
                response.http_status,
                response.api_code,
                "response did not contain a video_id",
            ))
        })?;

        info!(video_id, "Video job submitted");
        Ok(video_id.to_string())
    }

    /// Queries a job's status once.
    pub async fn video_status(&self, video_id: &str) -> Result<VideoJob> {
        let request = ApiRequest::get(endpoints::VIDEO_STATUS)
            .with_query("video_id", video_id)
            .with_auth(self.auth);
        let response = self.transport.execute(request).await?;
        let diagnostic = interpreter::interpret("Video status", &response);
        if !response.is_success() {
            return Err(Error::Remote(response.failure()));
        }

        Ok(VideoJob {
            video_id: video_id.to_string(),
            status: VideoStatus::parse(response.field_str("status").unwrap_or("")),
            video_url: response.field_str("video_url").map(str::to_string),
            error: response.field("error").and_then(error_detail),
            diagnostic,
        })
    }

    /// Polls until the job finishes or `timeout` is spent.
    ///
    /// Issues at most `ceil(timeout / interval)` queries (and at least one),
    /// sleeping one interval between consecutive queries.
    #[instrument(skip(self))]
    pub async fn poll_video(&self, video_id: &str, timeout: Duration) -> Result<String> {
        let max_attempts = max_attempts(timeout, self.interval);

        for attempt in 1..=max_attempts {
            let job = self.video_status(video_id).await?;
            debug!(attempt, status = ?job.status, "Video status polled");

            match job.status {
                VideoStatus::Completed => {
                    return job.video_url.ok_or_else(|| Error::RenderFailed {
                        video_id: video_id.to_string(),
                        detail: "job completed without a video_url".to_string(),
                    });
                }
                VideoStatus::Failed => {
                    let detail = job.error.unwrap_or_else(|| "unknown error".to_string());
                    warn!(%detail, "Video rendering failed");
                    return Err(Error::RenderFailed {
                        video_id: video_id.to_string(),
                        detail,
                    });
                }
                _ => {}
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        warn!(attempts = max_attempts, "Video polling timed out");
        Err(Error::PollTimeout {
            video_id: video_id.to_string(),
            attempts: max_attempts,
        })
    }
}

fn max_attempts(timeout: Duration, interval: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    let attempts = timeout.as_millis().div_ceil(interval_ms).max(1);
    u32::try_from(attempts).unwrap_or(u32::MAX)
}

/// The remote reports failures as a string or as `{code, message, detail}`.
fn error_detail(error: &Value) -> Option<String> {
    if let Some(text) = error.as_str() {
        return Some(text.to_string()).filter(|s| !s.is_empty());
    }
    ["detail", "message", "code"]
        .into_iter()
        .find_map(|key| match error.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{response::ApiResponse, testing::ScriptedTransport, transport::MockTransport};
    use tokio::time::Instant;

    fn status(status: &str) -> Value {
        json!({"code": 100, "data": {"status": status, "video_url": null}})
    }

    fn completed(url: &str) -> Value {
        json!({"code": 100, "data": {"status": "completed", "video_url": url}})
    }

    fn client(transport: Arc<dyn Transport>) -> VideoClient {
        VideoClient::new(transport, AuthScheme::ApiKey, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_status_query_is_interpreted() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push(200, status("processing"))
            .push(404, json!({"code": 40404, "message": "video not found"}));
        let videos = client(transport.clone());

        let job = videos.video_status("v1").await.unwrap();
        assert_eq!(job.status, VideoStatus::Processing);
        assert_eq!(job.diagnostic.title, "Video status");
        assert!(job.diagnostic.ok);
        assert_eq!(job.diagnostic.http_status, Some(200));
        assert_eq!(job.diagnostic.api_code, Some(100));

        match videos.video_status("v1").await {
            Err(Error::Remote(failure)) => assert_eq!(failure.api_code, Some(40404)),
            other => panic!("Expected Remote, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_returns_url_after_three_queries() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push(200, status("processing"))
            .push(200, status("processing"))
            .push(200, completed("https://files.example/v.mp4"));
        let videos = client(transport.clone());

        let started = Instant::now();
        let url = videos
            .poll_video("v1", Duration::from_secs(60))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(url, "https://files.example/v.mp4");
        assert_eq!(transport.requests().len(), 3);
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_after_exactly_three_queries() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..10 {
            transport.push(200, status("processing"));
        }
        let videos = client(transport.clone());

        let err = videos
            .poll_video("v1", Duration::from_secs(3))
            .await
            .unwrap_err();
        match err {
            Error::PollTimeout { video_id, attempts } => {
                assert_eq!(video_id, "v1");
                assert_eq!(attempts, 3);
            }
            other => panic!("Expected PollTimeout, got {:?}", other),
        }
        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(
            requests[0].query,
            vec![("video_id".to_string(), "v1".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failed_carries_remote_detail() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(200, status("pending")).push(
            200,
            json!({"data": {"status": "failed", "error": {"code": 40119, "message": "Voice not found", "detail": "voice v9 is not available"}}}),
        );
        let videos = client(transport.clone());

        match videos.poll_video("v1", Duration::from_secs(10)).await {
            Err(Error::RenderFailed { detail, .. }) => {
                assert_eq!(detail, "voice v9 is not available")
            }
            other => panic!("Expected RenderFailed, got {:?}", other),
        }
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_surfaces_status_query_failure() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(404, json!({"message": "video not found"}));
        let videos = client(transport.clone());

        assert!(matches!(
            videos.poll_video("missing", Duration::from_secs(5)).await,
            Err(Error::Remote(_))
        ));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_create_video_accepts_nested_and_flat_ids() {
        let mut transport = MockTransport::new();
        let mut seq = mockall::Sequence::new();
        transport
            .expect_execute()
            .withf(|r| r.path == endpoints::GENERATE_VIDEO && r.auth == AuthScheme::Bearer)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(ApiResponse::from_json(
                    200,
                    json!({"error": null, "data": {"video_id": "vid-7"}}),
                ))
            });
        transport
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ApiResponse::from_json(200, json!({"video_id": "vid-7"}))));

        let videos = VideoClient::new(Arc::new(transport), AuthScheme::Bearer, Duration::from_secs(1));
        let nested = videos
            .create_video("anna", "v1", "Hello", Dimension::default())
            .await
            .unwrap();
        let flat = videos
            .create_video("anna", "v1", "Hello", Dimension::default())
            .await
            .unwrap();
        assert_eq!(nested, "vid-7");
        assert_eq!(nested, flat);
    }

    #[tokio::test]
    async fn test_create_video_request_body() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(200, json!({"data": {"video_id": "v"}}));
        let videos = client(transport.clone());
        videos
            .create_video("anna", "v1", "Welcome!", Dimension { width: 720, height: 1280 })
            .await
            .unwrap();

        let body = transport.requests()[0].body.clone().unwrap();
        let input = &body["video_inputs"][0];
        assert_eq!(input["character"]["avatar_id"], "anna");
        assert_eq!(input["voice"]["input_text"], "Welcome!");
        assert_eq!(input["voice"]["voice_id"], "v1");
        assert_eq!(body["dimension"]["width"], 720);
        assert_eq!(body["dimension"]["height"], 1280);
    }

    #[tokio::test]
    async fn test_create_video_failures() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push(400, json!({"error": {"code": "invalid_parameter", "message": "avatar_id is invalid"}}))
            .push(200, json!({"data": {}}));
        let videos = client(transport.clone());

        match videos.create_video("x", "v", "t", Dimension::default()).await {
            Err(Error::JobSubmitFailed(failure)) => {
                assert_eq!(failure.http_status, Some(400));
                assert_eq!(failure.message, "avatar_id is invalid");
            }
            other => panic!("Expected JobSubmitFailed, got {:?}", other),
        }
        assert!(matches!(
            videos.create_video("x", "v", "t", Dimension::default()).await,
            Err(Error::JobSubmitFailed(_))
        ));
    }

    #[test]
    fn test_max_attempts() {
        let second = Duration::from_secs(1);
        assert_eq!(max_attempts(Duration::from_secs(3), second), 3);
        assert_eq!(max_attempts(Duration::from_millis(2500), second), 3);
        assert_eq!(max_attempts(Duration::ZERO, second), 1);
        assert_eq!(max_attempts(Duration::from_secs(1), Duration::ZERO), 1000);
    }
}
