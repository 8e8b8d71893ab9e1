//! HTTP message API client

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use parley_core::models::{ConversationPatch, Message, MessagePage, Participant};
use parley_core::{ApiError, Config, MessageApi};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// Request timeout in seconds
const REQUEST_TIMEOUT: u64 = 10;

/// [`MessageApi`] over the REST endpoints
pub struct HttpMessageApi {
    client: Client,
    base_url: String,
}

impl HttpMessageApi {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT))
            .user_agent(concat!("parley/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let Some(ref api_url) = config.api_url else {
            bail!(
                "API URL not configured. Set it with:\n  \
                 parley config set api_url https://chat.example.com/api/v1"
            );
        };
        Self::new(api_url)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;
        check_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        self.execute(request)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MessageApi for HttpMessageApi {
    async fn fetch_page(&self, conversation: Uuid, page: u32) -> Result<MessagePage, ApiError> {
        debug!(%conversation, page, "Fetching message page");
        let request = self
            .client
            .get(self.url(&format!("conversations/{}/messages", conversation)))
            .query(&[("page", page)]);
        self.get_json(request).await
    }

    async fn fetch_message(&self, message: Uuid) -> Result<Vec<Message>, ApiError> {
        let request = self.client.get(self.url(&format!("messages/{}", message)));
        let body: Value = self.get_json(request).await?;
        messages_from_value(body)
    }

    async fn fetch_participants(&self, conversation: Uuid) -> Result<Vec<Participant>, ApiError> {
        let request = self
            .client
            .get(self.url(&format!("conversations/{}/participants", conversation)));
        self.get_json(request).await
    }

    async fn mark_last_seen(&self, conversation: Uuid) -> Result<(), ApiError> {
        let request = self
            .client
            .post(self.url(&format!("conversations/{}/seen", conversation)));
        self.execute(request).await.map(|_| ())
    }

    async fn update_conversation(
        &self,
        conversation: Uuid,
        patch: &ConversationPatch,
    ) -> Result<(), ApiError> {
        let request = self
            .client
            .patch(self.url(&format!("conversations/{}", conversation)))
            .json(patch);
        self.execute(request).await.map(|_| ())
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("unknown error").to_string()
    } else {
        body
    };

    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

/// The single-message endpoint answers with one message, a list, or null
fn messages_from_value(body: Value) -> Result<Vec<Message>, ApiError> {
    let decoded = match body {
        Value::Null => Ok(Vec::new()),
        Value::Array(_) => serde_json::from_value(body),
        other => serde_json::from_value(other).map(|m: Message| vec![m]),
    };
    decoded.map_err(|e| ApiError::Decode(e.to_string()))
}
