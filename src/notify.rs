//! Outbound transactional email.
//!
//! Linkdock does not speak SMTP itself; notifications go through the
//! deployment's transactional mail API as templated sends. The import
//! pipeline uses exactly one template: the "links imported" summary sent
//! when a migration finalizes.

use reqwest::StatusCode;
use serde::Serialize;
use std::env;
use std::time::Duration;
use thiserror::Error;

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

/// Configuration for the transactional mail API client.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub base_url: String,
    pub api_key: String,
    pub from_address: String,
    pub request_timeout: Duration,
}

impl MailerConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env_string("MAILER_URL", "https://api.mailer.internal"),
            api_key: env_string("MAILER_API_KEY", ""),
            from_address: env_string("MAILER_FROM", "Linkdock <system@linkdock.co>"),
            request_timeout: env_duration_millis("MAILER_TIMEOUT_MS", 10_000),
        }
    }
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Errors that can occur while talking to the mail API.
#[derive(Debug, Error)]
pub enum MailerError {
    #[error("mailer HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("mail API returned status {status}: {body}")]
    Service { status: StatusCode, body: String },
}

/// A short link included in the completion summary email.
#[derive(Debug, Clone, Serialize)]
pub struct SampleLink {
    pub domain: String,
    pub key: String,
    pub url: String,
}

#[derive(Clone)]
pub struct Mailer {
    http: reqwest::Client,
    config: MailerConfig,
}

impl Mailer {
    pub fn new(config: MailerConfig) -> Result<Self, MailerError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("linkdock-api/0.1")
            .build()
            .map_err(MailerError::Http)?;

        Ok(Self {
            http: client,
            config,
        })
    }

    /// Send the one-per-import completion summary.
    pub async fn send_links_imported(
        &self,
        to: &str,
        provider_name: &str,
        count: usize,
        sample_links: &[SampleLink],
        domains: &[String],
    ) -> Result<(), MailerError> {
        let payload = TemplatedSend {
            from: self.config.from_address.clone(),
            to: to.to_string(),
            subject: format!("Your {} links have been imported", provider_name),
            template: "links-imported",
            variables: LinksImportedVariables {
                provider: provider_name.to_string(),
                count,
                links: sample_links.to_vec(),
                domains: domains.to_vec(),
            },
        };

        let endpoint = format!("{}/emails", self.config.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(MailerError::Http)?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(MailerError::Service { status, body })
        }
    }
}

#[derive(Debug, Serialize)]
struct TemplatedSend {
    from: String,
    to: String,
    subject: String,
    template: &'static str,
    variables: LinksImportedVariables,
}

#[derive(Debug, Serialize)]
struct LinksImportedVariables {
    provider: String,
    count: usize,
    links: Vec<SampleLink>,
    domains: Vec<String>,
}
