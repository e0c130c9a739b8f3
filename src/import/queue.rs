//! Publisher side of the durable queue transport.
//!
//! Continuation is a trampoline over the queue: instead of looping over
//! pages in-process, each invocation publishes its successor message and
//! returns. The transport delivers the message back to our own callback
//! endpoint with a signature header (`signature` module), applying its own
//! redelivery policy for transport-level failures.

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::import::config::ImportConfig;
use crate::import::message::ImportMessage;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("queue transport returned status {status}: {body}")]
    Service { status: StatusCode, body: String },
    #[error("failed to encode queue message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct QueueClient {
    http: reqwest::Client,
    queue_url: String,
    queue_token: String,
    callback_url: String,
}

impl QueueClient {
    pub fn new(config: &ImportConfig) -> Result<Self, QueueError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("linkdock-api/0.1")
            .build()
            .map_err(QueueError::Http)?;

        Ok(Self {
            http: client,
            queue_url: config.queue_url.trim_end_matches('/').to_string(),
            queue_token: config.queue_token.clone(),
            callback_url: config.callback_url.clone(),
        })
    }

    /// Publish a message for delivery to our callback endpoint, optionally
    /// delayed on the transport side.
    pub async fn enqueue(
        &self,
        message: &ImportMessage,
        delay: Option<Duration>,
    ) -> Result<(), QueueError> {
        let body = serde_json::to_string(message)?;
        let endpoint = format!("{}/v2/publish/{}", self.queue_url, self.callback_url);

        let mut request = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.queue_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);

        if let Some(delay) = delay {
            request = request.header("X-Queue-Delay", format!("{}s", delay.as_secs()));
        }

        let response = request.send().await.map_err(QueueError::Http)?;

        if response.status().is_success() {
            log::debug!(
                "enqueued continuation for workspace {} (cursor {:?}, count {})",
                message.workspace_id,
                message.cursor,
                message.count
            );
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(QueueError::Service { status, body })
        }
    }
}
