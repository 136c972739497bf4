//! Announces hits to a chat webhook.
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use reqwest::{Client, StatusCode};
use serde_json::json;

use super::Notifier;
use crate::error::{ConfigError, SinkError};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Posts `{"content": "<url>"}` to a Discord-style webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    /// Fails if `url` does not parse.
    pub fn new(url: impl Into<String>) -> Result<Self, ConfigError> {
        let url = url.into();
        reqwest::Url::parse(&url).map_err(|e| ConfigError::InvalidWebhookUrl {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .no_proxy()
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, url: &str) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "content": url }))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => {
                info!("Webhook message sent: {url}");
                Ok(())
            }
            status => Err(SinkError::Status {
                url: self.url.clone(),
                status,
            }),
        }
    }
}
