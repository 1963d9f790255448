//! Mail transports

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use super::{EmailMessage, NotifyError};

/// Delivers a single email
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError>;
}

/// Posts messages as JSON to an HTTP mail relay
pub struct HttpMailer {
    client: Client,
    relay_url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(relay_url: String, api_key: Option<String>, from: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            relay_url,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.relay_url).json(&json!({
            "from": self.from,
            "to": message.to,
            "subject": message.subject,
            "text": message.body,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Writes messages to the log instead of sending them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "Email (not sent, no relay configured)"
        );
        Ok(())
    }
}
