use std::env;
use std::time::Duration;

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_duration_millis(key: &str, default_millis: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(default_millis))
}

fn env_i32_list(key: &str) -> Vec<i32> {
    env::var(key)
        .ok()
        .map(|value| {
            value
                .split(',')
                .filter_map(|item| item.trim().parse::<i32>().ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Runtime configuration for the import pipeline and its queue transport.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Publish endpoint of the durable queue transport.
    pub queue_url: String,
    /// Bearer token for publishing to the queue transport.
    pub queue_token: String,
    /// Shared secret the queue transport signs deliveries with.
    pub queue_signing_key: String,
    /// Public URL of our own callback endpoint, handed to the queue
    /// transport as the delivery target of continuation messages.
    pub callback_url: String,
    /// Signature verification is skipped only when the explicit
    /// non-production flag is set.
    pub verify_signatures: bool,
    /// Workspaces allowed to use the multi-page batch fetch strategy.
    /// Kept out of the queue message so a tampered message cannot raise
    /// its own rate budget.
    pub batch_workspaces: Vec<i32>,
    pub bitly_base_url: String,
    pub rebrandly_base_url: String,
    pub request_timeout: Duration,
}

impl ImportConfig {
    pub fn from_env() -> Self {
        Self {
            queue_url: env_string("QUEUE_URL", "https://queue.linkdock.internal"),
            queue_token: env_string("QUEUE_TOKEN", ""),
            queue_signing_key: env_string("QUEUE_SIGNING_KEY", ""),
            callback_url: env_string(
                "IMPORT_CALLBACK_URL",
                "http://localhost:8000/api/v1/import/callback",
            ),
            verify_signatures: !env_bool("NON_PRODUCTION", false),
            batch_workspaces: env_i32_list("IMPORT_BATCH_WORKSPACES"),
            bitly_base_url: env_string("BITLY_API_URL", "https://api-ssl.bitly.com/v4"),
            rebrandly_base_url: env_string("REBRANDLY_API_URL", "https://api.rebrandly.com/v1"),
            request_timeout: env_duration_millis("IMPORT_HTTP_TIMEOUT_MS", 30_000),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
