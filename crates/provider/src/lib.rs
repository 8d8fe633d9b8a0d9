//! HTTP client for the brand-analysis gateway.
//!
//! The gateway fronts the individual AI assistants: one `POST /v1/analyze`
//! per `(brand, model, stage)` returns the assistant's loosely structured
//! JSON verdict, which the pipeline normalizes. Wall-clock latency is
//! measured here so it reflects what the pipeline actually waited.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use brandlens_core::analysis::{AiModel, PipelineStage};
use brandlens_core::collaborators::{AnalysisProvider, Brand};
use brandlens_core::error::ExternalError;
use brandlens_core::normalize::ProviderOutput;
use serde::Serialize;

const SERVICE: &str = "analysis provider";

/// Connection timeout. The overall call is bounded by the task runner.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The gateway returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    ApiError { status: u16, body: String },
}

impl From<ProviderError> for ExternalError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::ApiError { status, .. } => ExternalError::HttpStatus {
                service: SERVICE,
                status,
            },
            other => ExternalError::request(SERVICE, other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// ProviderConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Gateway base URL, e.g. `https://gateway.internal`.
    pub base_url: String,
    pub api_key: Option<String>,
}

impl ProviderConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `ANALYSIS_PROVIDER_URL` is not set.
    ///
    /// | Variable                    | Required |
    /// |-----------------------------|----------|
    /// | `ANALYSIS_PROVIDER_URL`     | yes      |
    /// | `ANALYSIS_PROVIDER_API_KEY` | no       |
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("ANALYSIS_PROVIDER_URL").ok()?;
        Some(Self {
            base_url,
            api_key: std::env::var("ANALYSIS_PROVIDER_API_KEY").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// HttpAnalysisProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    brand_id: i64,
    brand_name: &'a str,
    brand_domain: Option<&'a str>,
    model: AiModel,
    stage: PipelineStage,
}

pub struct HttpAnalysisProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl HttpAnalysisProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }

    /// Create a provider reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    fn analyze_url(&self) -> String {
        format!("{}/v1/analyze", self.config.base_url.trim_end_matches('/'))
    }

    /// Build the analyze request without sending it.
    pub fn build_request(
        &self,
        brand: &Brand,
        model: AiModel,
        stage: PipelineStage,
    ) -> Result<reqwest::Request, ProviderError> {
        let body = AnalyzeRequest {
            brand_id: brand.id,
            brand_name: &brand.name,
            brand_domain: brand.domain.as_deref(),
            model,
            stage,
        };
        let mut builder = self.client.post(self.analyze_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        Ok(builder.build()?)
    }

    pub async fn request_analysis(
        &self,
        brand: &Brand,
        model: AiModel,
        stage: PipelineStage,
    ) -> Result<ProviderOutput, ProviderError> {
        let request = self.build_request(brand, model, stage)?;
        let started = Instant::now();

        let response = self.client.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {e}>"));
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        // A body that is not JSON is kept as a string; normalization
        // degrades it to default metrics.
        let text = response.text().await?;
        let raw = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

        Ok(ProviderOutput {
            raw,
            response_time_ms: i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX),
        })
    }
}

#[async_trait]
impl AnalysisProvider for HttpAnalysisProvider {
    async fn analyze(
        &self,
        brand: &Brand,
        model: AiModel,
        stage: PipelineStage,
    ) -> Result<ProviderOutput, ExternalError> {
        tracing::debug!(brand_id = brand.id, %model, %stage, "Requesting analysis");
        Ok(self.request_analysis(brand, model, stage).await?)
    }
}

/// Provider used when no gateway is configured: every call fails, so each
/// pair is recorded as failed and runs still terminate.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredProvider;

#[async_trait]
impl AnalysisProvider for UnconfiguredProvider {
    async fn analyze(
        &self,
        _brand: &Brand,
        _model: AiModel,
        _stage: PipelineStage,
    ) -> Result<ProviderOutput, ExternalError> {
        Err(ExternalError::NotConfigured { service: SERVICE })
    }
}
