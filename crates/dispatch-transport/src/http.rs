use std::time::Duration;

use async_trait::async_trait;
use dispatch_common::config::normalize_base_url;
use dispatch_common::{DispatchError, RequestError};
use serde_json::Value;

use crate::{CompletionTransport, Payload};

const MAX_ERROR_BODY: usize = 512;

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> dispatch_common::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { client, base_url: normalize_base_url(base_url), timeout })
    }

    pub fn url_for(&self, payload: &Payload) -> String {
        format!("{}{}", self.base_url, payload.path())
    }
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn send(&self, payload: &Payload) -> Result<Value, RequestError> {
        let url = self.url_for(payload);
        tracing::trace!(target: "dispatch", %url, "posting request");
        let resp = self.client.post(&url).json(payload).send().await.map_err(|e| self.classify(e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.classify(e))?;
        if !status.is_success() {
            return Err(RequestError::Status { status: status.as_u16(), body: truncate(body, MAX_ERROR_BODY) });
        }
        serde_json::from_str(&body).map_err(|e| RequestError::MalformedReply(e.to_string()))
    }
}

impl HttpTransport {
    fn classify(&self, err: reqwest::Error) -> RequestError {
        if err.is_timeout() {
            RequestError::Timeout(self.timeout)
        } else {
            RequestError::Transport(err.to_string())
        }
    }
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut cut = max;
        while !body.is_char_boundary(cut) { cut -= 1; }
        body.truncate(cut);
    }
    body
}
