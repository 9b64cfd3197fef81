//! Relay API client - sends messages and checks connectivity

use crate::error::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const VALIDATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Delivery channel for an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Sms,
    WhatsApp,
}

impl Channel {
    fn endpoint(self) -> &'static str {
        match self {
            Channel::Sms => "/api/sendsms",
            Channel::WhatsApp => "/api/sendwhatsapp",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Sms => write!(f, "SMS"),
            Channel::WhatsApp => write!(f, "WhatsApp"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    pub message: String,
    pub session_id: String,
    /// Name of the agent, WhatsApp only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sys_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SendMessageResponse {
    pub success: bool,
    pub message_id: Option<String>,
    /// Server-generated session to listen on
    pub session_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    error: String,
}

/// Client for the relay's request/response endpoints
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    api_key: String,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn send_sms(&self, message: &str) -> Result<SendMessageResponse> {
        self.send(Channel::Sms, message, None).await
    }

    pub async fn send_whatsapp(&self, message: &str, sys_name: &str) -> Result<SendMessageResponse> {
        self.send(Channel::WhatsApp, message, Some(sys_name)).await
    }

    /// Send a message; the session id is always assigned by the server
    pub async fn send(
        &self,
        channel: Channel,
        message: &str,
        sys_name: Option<&str>,
    ) -> Result<SendMessageResponse> {
        let request = SendMessageRequest {
            message: message.to_string(),
            session_id: String::new(),
            sys_name: sys_name.map(str::to_string),
        };

        let url = format!("{}{}", self.base_url, channel.endpoint());
        debug!("Sending {} message ({} chars) to {}", channel, message.len(), url);

        let response = self
            .http
            .post(&url)
            .header("X-API-Key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if status != StatusCode::OK {
            let detail = serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .map(|b| b.error)
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| format!("API error: {}", status));
            return Err(Error::Api(detail));
        }

        let result: SendMessageResponse = serde_json::from_slice(&body)?;
        if !result.success {
            return Err(Error::Api(
                result
                    .error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| "message send failed".to_string()),
            ));
        }

        info!(
            "Sent {} message {:?} in session {:?}",
            channel, result.message_id, result.session_id
        );
        Ok(result)
    }

    /// Check that the API is reachable
    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self
            .http
            .get(format!("{}/api/health", self.base_url))
            .send()
            .await
            .map_err(|e| Error::Api(format!("API unreachable: {}", e)))?;

        if response.status() != StatusCode::OK {
            return Err(Error::Api(format!("API returned: {}", response.status())));
        }

        Ok(response.json().await?)
    }

    /// Validate the key by opening an authenticated event stream.
    /// Only 401 and 403 are failures; any other status means the key works.
    pub async fn validate_key(&self) -> Result<()> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let url = format!("{}/api/events/afk-validate-{}", self.base_url, nanos);

        let response = self
            .http
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .timeout(VALIDATE_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Api(format!("connection failed: {}", e)))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(Error::Unauthorized),
            StatusCode::FORBIDDEN => Err(Error::Api("subscription not active".to_string())),
            _ => Ok(()),
        }
    }
}
