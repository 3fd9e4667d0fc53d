use super::types::{
    AccountStats, AddressRequest, ClaimRequest, EnrollResponse, TaskStatusResponse,
};
use crate::config::CampaignConfig;
use crate::metrics::metrics;
use crate::retry::{Cancelled, Retryable};
use alloy::primitives::Address;
use async_trait::async_trait;
use governor::DefaultDirectRateLimiter;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ORIGIN, REFERER};
use reqwest::{Client, Proxy, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Longest response body kept in an error
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CampaignError {
    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Attestation signing failed: {0}")]
    Signing(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl CampaignError {
    /// Transport failures and every non-2xx status are worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status { .. })
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::Decode(_) => "decode",
            Self::Signing(_) => "signing",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Retryable for CampaignError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

impl From<Cancelled> for CampaignError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Campaign HTTP API. Every method is a single attempt.
#[async_trait]
pub trait CampaignApi: Send + Sync + std::fmt::Debug {
    async fn enroll(&self, address: Address) -> Result<EnrollResponse, CampaignError>;

    async fn task_status(&self, address: Address) -> Result<TaskStatusResponse, CampaignError>;

    async fn claim(&self, address: Address, task: &str, signed_message: &str) -> Result<(), CampaignError>;

    async fn stats(&self, address: Address) -> Result<AccountStats, CampaignError>;
}

/// reqwest-backed campaign client, one per account so that its cookies,
/// headers and proxy are never shared
#[derive(Debug, Clone)]
pub struct HttpCampaignClient {
    http: Client,
    base_url: String,
    enroll_path: String,
    task_status_path: String,
    claim_path: String,
    stats_path: String,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl HttpCampaignClient {
    pub fn new(config: &CampaignConfig, proxy: Option<&str>) -> Result<Self, CampaignError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        if let Some(origin) = &config.origin {
            let origin = origin.trim_end_matches('/');
            headers.insert(ORIGIN, header_value(origin)?);
            headers.insert(REFERER, header_value(&format!("{origin}/"))?);
        }

        let mut builder = Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.request_timeout_secs));
        if let Some(proxy) = proxy {
            let proxy = Proxy::all(proxy).map_err(|e| CampaignError::Transport(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| CampaignError::Transport(format!("HTTP client initialization failed: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            enroll_path: config.enroll_path.clone(),
            task_status_path: config.task_status_path.clone(),
            claim_path: config.claim_path.clone(),
            stats_path: config.stats_path.clone(),
            limiter: None,
        })
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<DefaultDirectRateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        metrics().http_requests.inc();
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, address: Address) -> Result<T, CampaignError> {
        self.throttle().await;
        let response = self
            .http
            .get(self.url(path))
            .query(&[("address", address.to_checksum(None))])
            .send()
            .await
            .map_err(transport)?;
        read_json(response).await
    }

    async fn post_json<B: serde::Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response, CampaignError> {
        self.throttle().await;
        self.http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(transport)
    }
}

#[async_trait]
impl CampaignApi for HttpCampaignClient {
    async fn enroll(&self, address: Address) -> Result<EnrollResponse, CampaignError> {
        let body = AddressRequest {
            address: address.to_checksum(None),
        };
        let response = self.post_json(&self.enroll_path, &body).await?;
        read_json(response).await
    }

    async fn task_status(&self, address: Address) -> Result<TaskStatusResponse, CampaignError> {
        self.get_json(&self.task_status_path, address).await
    }

    async fn claim(&self, address: Address, task: &str, signed_message: &str) -> Result<(), CampaignError> {
        let body = ClaimRequest {
            address: address.to_checksum(None),
            task,
            signed_message,
        };
        let response = self.post_json(&self.claim_path, &body).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), body));
        }
        debug!(task, "Claim accepted");
        Ok(())
    }

    async fn stats(&self, address: Address) -> Result<AccountStats, CampaignError> {
        self.get_json(&self.stats_path, address).await
    }
}

fn header_value(value: &str) -> Result<HeaderValue, CampaignError> {
    HeaderValue::from_str(value).map_err(|e| CampaignError::Transport(format!("invalid header {value}: {e}")))
}

fn transport(err: reqwest::Error) -> CampaignError {
    CampaignError::Transport(err.to_string())
}

fn status_error(status: u16, mut body: String) -> CampaignError {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    CampaignError::Status { status, body }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, CampaignError> {
    let status = response.status();
    let body = response.text().await.map_err(transport)?;
    if !status.is_success() {
        return Err(status_error(status.as_u16(), body));
    }
    serde_json::from_str(&body).map_err(|e| CampaignError::Decode(format!("{e}: {body}")))
}
