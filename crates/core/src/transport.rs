//! The seam between the clients and the wire.
//!
//! Clients describe calls as [`ApiRequest`]s and receive [`ApiResponse`]s; they
//! never touch `reqwest` directly. This keeps the session state machine and the
//! poll loop testable without a network.

use async_trait::async_trait;
use reqwest::{Client, header::ACCEPT};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::{
    error::{Error, Result},
    response::ApiResponse,
};

/// Remote paths, reproduced exactly as the remote API names them.
pub mod endpoints {
    pub const LIST_AVATARS: &str = "/v1/streaming/avatar.list";
    pub const CREATE_TOKEN: &str = "/v1/streaming.create_token";
    pub const NEW_SESSION: &str = "/v1/streaming.new";
    pub const START_SESSION: &str = "/v1/streaming.start";
    pub const SEND_TASK: &str = "/v1/streaming.task";
    pub const INTERRUPT: &str = "/v1/streaming.interrupt";
    pub const LIST_SESSIONS: &str = "/v1/streaming.list";
    pub const KEEP_ALIVE: &str = "/v1/streaming.keep_alive";
    pub const STOP_SESSION: &str = "/v1/streaming.stop";
    pub const GENERATE_VIDEO: &str = "/v2/video/generate";
    pub const VIDEO_STATUS: &str = "/v1/video_status.get";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// How the API key is presented to the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthScheme {
    /// `x-api-key: <key>`
    #[default]
    ApiKey,
    /// `Authorization: Bearer <key>`
    Bearer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    /// `None` sends no body at all, not an empty JSON object.
    pub body: Option<Value>,
    pub auth: AuthScheme,
}

impl ApiRequest {
    fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: Vec::new(),
            body: None,
            auth: AuthScheme::default(),
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn with_auth(mut self, auth: AuthScheme) -> Self {
        self.auth = auth;
        self
    }

    /// The `session_id` carried in the JSON body, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|b| b.get("session_id"))
            .and_then(Value::as_str)
    }
}

/// Executes one remote call.
///
/// Implementations return `Ok` for every HTTP response regardless of status and
/// reserve `Err(Error::RemoteUnavailable)` for calls that produced no response.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// A `Transport` backed by a shared `reqwest::Client`.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl HttpTransport {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.heygen.com";

    /// Builds a transport for `base_url` with a per-request `timeout`.
    pub fn new(base_url: impl Into<String>, api_key: SecretString, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::RemoteUnavailable(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        }
        .header(ACCEPT, "application/json");

        builder = match request.auth {
            AuthScheme::ApiKey => builder.header("x-api-key", self.api_key.expose_secret()),
            AuthScheme::Bearer => builder.bearer_auth(self.api_key.expose_secret()),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(method = ?request.method, path = %request.path, "Sending remote request");
        let response = builder
            .send()
            .await
            .map_err(|e| Error::RemoteUnavailable(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| Error::RemoteUnavailable(e.to_string()))?;

        Ok(match serde_json::from_str::<Value>(&text) {
            Ok(body) => ApiResponse::from_json(status, body),
            Err(_) => ApiResponse::from_text(status, &text),
        })
    }
}
