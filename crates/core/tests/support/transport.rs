//! Scripted transport
//!
//! Responses are queued per path and served in order; once a path's queue
//! is empty its last response repeats. Every request is recorded.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use catalink_core::{ApiRequest, ApiResponse, Transport, TransportError};
use parking_lot::Mutex;

type Reply = Result<ApiResponse, TransportError>;

#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token endpoint that always grants `token` for an hour
    pub fn with_token(self, token: &str) -> Self {
        let body = format!(r#"{{"access_token":"{token}","expires_in":3600}}"#);
        self.reply("/oauth/token", ApiResponse::new(200, body))
    }

    pub fn reply(self, path: &str, response: ApiResponse) -> Self {
        self.push(path, Ok(response));
        self
    }

    pub fn fail(self, path: &str, error: TransportError) -> Self {
        self.push(path, Err(error));
        self
    }

    pub fn push(&self, path: &str, reply: Reply) {
        self.scripts.lock().entry(path.to_string()).or_default().push_back(reply);
    }

    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests.lock().iter().filter(|request| request.path == path).cloned().collect()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let path = request.path.clone();
        self.requests.lock().push(request);

        let mut scripts = self.scripts.lock();
        let Some(queue) = scripts.get_mut(&path) else {
            return Ok(ApiResponse::new(404, format!("no script for {path}")));
        };
        match queue.len() {
            0 => Ok(ApiResponse::new(404, format!("no script for {path}"))),
            1 => queue.front().cloned().unwrap_or_else(|| Ok(ApiResponse::new(500, ""))),
            _ => queue.pop_front().unwrap_or_else(|| Ok(ApiResponse::new(500, ""))),
        }
    }
}
