use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use thiserror::Error;
use tracing::instrument;

pub const DEFAULT_ENTITLEMENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a completed exchange with the entitlement service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// HTTP 200; raw body, not yet parsed.
    Granted(Vec<u8>),
    /// Any other status. A denial, not a failure.
    Refused(u16),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("failed to build entitlement request: {0}")]
    Request(String),

    #[error("entitlement request failed: {0}")]
    Transport(String),

    #[error("failed to read entitlement response body: {0}")]
    Body(String),
}

#[async_trait]
pub trait EntitlementSource: Send + Sync {
    /// Look up the caller's entitlements, forwarding `authorization` verbatim.
    async fn fetch(&self, authorization: &str) -> Result<FetchOutcome, SourceError>;
}

#[async_trait]
impl<S> EntitlementSource for Arc<S>
where
    S: EntitlementSource + ?Sized,
{
    async fn fetch(&self, authorization: &str) -> Result<FetchOutcome, SourceError> {
        (**self).fetch(authorization).await
    }
}

/// Entitlement service reached over HTTP (`GET <url>`).
#[derive(Debug, Clone)]
pub struct HttpEntitlementSource {
    client: reqwest::Client,
    url: String,
}

impl HttpEntitlementSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Request(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EntitlementSource for HttpEntitlementSource {
    #[instrument(skip(self, authorization), fields(url = %self.url), err)]
    async fn fetch(&self, authorization: &str) -> Result<FetchOutcome, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .header(AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    SourceError::Request(e.to_string())
                } else {
                    SourceError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Ok(FetchOutcome::Refused(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Body(e.to_string()))?;

        Ok(FetchOutcome::Granted(body.to_vec()))
    }
}
