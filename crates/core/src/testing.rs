//! A recording transport that replays queued responses in order.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::{collections::VecDeque, sync::Mutex};

use crate::{
    error::{Error, Result},
    response::ApiResponse,
    transport::{ApiRequest, Transport},
};

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<ApiResponse>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, status: u16, body: Value) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(ApiResponse::from_json(status, body)));
        self
    }

    pub(crate) fn push_unreachable(&self) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(Error::RemoteUnavailable("connection reset".to_string())));
        self
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.requests.lock().unwrap().push(request);
        // An exhausted script answers like an idle remote: plain success.
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ApiResponse::from_json(200, json!({"code": 100, "data": null}))))
    }
}
