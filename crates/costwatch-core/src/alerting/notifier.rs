//! Notification delivery
//!
//! [`MessagingApi`] is the seam to the chat service. [`SlackClient`] talks to
//! the Slack Web API; [`NotificationSender`] wraps any implementation and
//! turns failures into logged `false` results.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{error, info};

use crate::config::SlackConfig;
use crate::error::{Error, Result};

use super::message::SlackMessage;

/// Request timeout for Slack calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The chat service
#[async_trait]
pub trait MessagingApi: Send + Sync {
    /// Post a message to the channel it names
    async fn post_message(&self, message: &SlackMessage) -> Result<()>;

    /// Verify the token, returning the bot user name
    async fn auth_test(&self) -> Result<String>;
}

/// Slack Web API client
pub struct SlackClient {
    client: Client,
    base_url: String,
    token: String,
}

/// Envelope shared by every Web API response
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user: Option<String>,
}

impl SlackClient {
    /// Create a client from the resolved Slack settings
    pub fn new(config: &SlackConfig) -> Result<Self> {
        let token = config
            .bot_token
            .clone()
            .ok_or_else(|| Error::config("Slack bot token not found"))?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn call(&self, method: &str, body: Option<&SlackMessage>) -> Result<ApiResponse> {
        let url = format!("{}/{method}", self.base_url);
        let mut request = self.client.post(&url).bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::notification(format!(
                "Slack returned {status}: {body}"
            )));
        }

        let envelope: ApiResponse = response.json().await?;
        if !envelope.ok {
            return Err(Error::notification(
                envelope.error.unwrap_or_else(|| "unknown_error".to_string()),
            ));
        }
        Ok(envelope)
    }
}

#[async_trait]
impl MessagingApi for SlackClient {
    async fn post_message(&self, message: &SlackMessage) -> Result<()> {
        self.call("chat.postMessage", Some(message)).await.map(|_| ())
    }

    async fn auth_test(&self) -> Result<String> {
        let envelope = self.call("auth.test", None).await?;
        Ok(envelope.user.unwrap_or_default())
    }
}

/// Delivers messages, reporting success as a boolean
#[derive(Clone)]
pub struct NotificationSender {
    api: Arc<dyn MessagingApi>,
}

impl NotificationSender {
    /// Wrap a messaging API
    pub fn new(api: Arc<dyn MessagingApi>) -> Self {
        Self { api }
    }

    /// Post a message. Failures are logged and reported as `false`.
    pub async fn send(&self, message: &SlackMessage) -> bool {
        match self.api.post_message(message).await {
            Ok(()) => {
                info!(channel = %message.channel, "Slack message sent");
                true
            }
            Err(e) => {
                error!(channel = %message.channel, error = %e, "Error sending Slack message");
                false
            }
        }
    }

    /// Check the token against the chat service
    pub async fn test_connection(&self) -> bool {
        match self.api.auth_test().await {
            Ok(user) => {
                info!(user = %user, "Slack connection successful");
                true
            }
            Err(e) => {
                error!(error = %e, "Slack connection failed");
                false
            }
        }
    }
}
