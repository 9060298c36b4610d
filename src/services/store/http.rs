use super::{RemoteStore, StoreError};
use crate::models::{RemoteConfig, RemoteDraft, SaveAck, SavePayload};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

/// Draft store backed by the HTTP draft API
///
/// - `GET  {base_url}/api/loadDraft?tokenId=<id>` returns a [`RemoteDraft`]
/// - `POST {base_url}/api/saveDraft` accepts a [`SavePayload`] and returns a [`SaveAck`]
pub struct HttpDraftStore {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpDraftStore {
    pub fn new(config: &RemoteConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.request_timeout(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout(self.timeout)
        } else {
            StoreError::Network(e.to_string())
        }
    }

    async fn check_status(
        response: reqwest::Response,
        id: &str,
    ) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(classify_status(status, id, message))
    }
}

fn classify_status(status: StatusCode, id: &str, message: String) -> StoreError {
    if status == StatusCode::NOT_FOUND {
        StoreError::NotFound(id.to_string())
    } else if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        StoreError::Server {
            status: status.as_u16(),
            message,
        }
    } else {
        StoreError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpDraftStore {
    async fn load_draft(&self, id: &str) -> Result<RemoteDraft, StoreError> {
        tracing::debug!("GET {}/api/loadDraft tokenId={}", self.base_url, id);

        let response = self
            .client
            .get(format!("{}/api/loadDraft", self.base_url))
            .query(&[("tokenId", id)])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let response = Self::check_status(response, id).await?;

        response
            .json::<RemoteDraft>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn save_draft(&self, payload: &SavePayload) -> Result<SaveAck, StoreError> {
        tracing::debug!(
            "POST {}/api/saveDraft tokenId={} changes={}",
            self.base_url,
            payload.id,
            payload.changes.len()
        );

        let response = self
            .client
            .post(format!("{}/api/saveDraft", self.base_url))
            .json(payload)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let response = Self::check_status(response, &payload.id).await?;

        response
            .json::<SaveAck>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let store = HttpDraftStore::new(&RemoteConfig {
            base_url: "https://drafts.example.com/".into(),
            request_timeout_ms: 1_000,
        })
        .unwrap();
        assert_eq!(store.base_url(), "https://drafts.example.com");
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, "d1", String::new()),
            StoreError::NotFound("d1".into())
        );
        assert!(classify_status(StatusCode::BAD_GATEWAY, "d1", String::new()).is_transient());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "d1", String::new()).is_transient());
        assert!(!classify_status(StatusCode::UNPROCESSABLE_ENTITY, "d1", String::new()).is_transient());
    }
}
