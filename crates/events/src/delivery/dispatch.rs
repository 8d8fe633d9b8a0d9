//! Signed dispatch publishing with exponential-backoff retry.
//!
//! [`HttpDispatcher`] serializes a [`DispatchMessage`], signs the exact bytes
//! with the shared dispatch secret and POSTs them. With a publish URL
//! configured the message goes to the external queue, which forwards it to
//! the dispatch webhook named in the `X-Dispatch-Destination` header and
//! redelivers until it gets a 2xx. Without one, the webhook is called
//! directly (single-instance and local setups).
//!
//! A direct call runs the whole next pair before the webhook answers, so it
//! is made from a spawned task and `dispatch` returns as soon as the task is
//! scheduled. A direct call that times out is not repeated: the webhook may
//! still be working on it, and the stuck-run sweep covers a lost delivery.
//!
//! Publishing is retried up to three times with backoff (1 s, 2 s, 4 s).

use std::time::Duration;

use async_trait::async_trait;
use brandlens_core::collaborators::Dispatcher;
use brandlens_core::dispatch::{DispatchMessage, DISPATCH_PATH, SIGNATURE_HEADER};
use brandlens_core::error::ExternalError;
use brandlens_core::signing::sign_payload;

/// Header telling the queue where to forward the message.
pub const DESTINATION_HEADER: &str = "x-dispatch-destination";

/// Retry delays in seconds (exponential backoff: 1s, 2s, 4s).
const RETRY_DELAYS_SECS: [u64; 3] = [1, 2, 4];

/// Timeout for a single publish to the queue.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a direct webhook call. Must cover the provider timeout.
const DIRECT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(300);

const SERVICE: &str = "dispatcher";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The publish endpoint returned a non-2xx status code.
    #[error("Dispatch endpoint returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Failed to encode dispatch message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DispatchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Request(e) if e.is_timeout())
    }
}

impl From<DispatchError> for ExternalError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::HttpStatus(status) => ExternalError::HttpStatus {
                service: SERVICE,
                status,
            },
            other => ExternalError::request(SERVICE, other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchConfig
// ---------------------------------------------------------------------------

/// Default public base URL for local development.
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Queue publish endpoint. `None` means call the webhook directly.
    pub publish_url: Option<String>,
    /// Bearer token for the publish endpoint.
    pub publish_token: Option<String>,
    /// Base URL under which this service's webhooks are reachable.
    pub public_base_url: String,
    /// Shared HMAC secret; the dispatch webhook verifies with the same value.
    pub signing_secret: String,
}

impl DispatchConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable                  | Required | Default                 |
    /// |---------------------------|----------|-------------------------|
    /// | `DISPATCH_PUBLISH_URL`    | no       | direct webhook call     |
    /// | `DISPATCH_TOKEN`          | no       |                         |
    /// | `PUBLIC_BASE_URL`         | no       | `http://localhost:3000` |
    /// | `DISPATCH_SIGNING_SECRET` | yes      |                         |
    pub fn from_env() -> Self {
        Self {
            publish_url: non_empty_var("DISPATCH_PUBLISH_URL"),
            publish_token: non_empty_var("DISPATCH_TOKEN"),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_PUBLIC_BASE_URL.to_string()),
            signing_secret: std::env::var("DISPATCH_SIGNING_SECRET")
                .expect("DISPATCH_SIGNING_SECRET must be set"),
        }
    }

    /// Absolute URL of the dispatch webhook.
    pub fn destination_url(&self) -> String {
        format!("{}{}", self.public_base_url.trim_end_matches('/'), DISPATCH_PATH)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// HttpDispatcher
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
    config: DispatchConfig,
    retry_delays: Vec<Duration>,
    direct_timeout: Duration,
}

impl HttpDispatcher {
    pub fn new(config: DispatchConfig) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            config,
            retry_delays: RETRY_DELAYS_SECS.iter().map(|s| Duration::from_secs(*s)).collect(),
            direct_timeout: DIRECT_DELIVERY_TIMEOUT,
        })
    }

    /// Override the backoff schedule.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Override how long a direct webhook call may take.
    pub fn with_direct_timeout(mut self, timeout: Duration) -> Self {
        self.direct_timeout = timeout;
        self
    }

    fn is_direct(&self) -> bool {
        self.config.publish_url.is_none()
    }

    /// Build the signed publish request for `message`.
    pub fn build_request(&self, message: &DispatchMessage) -> Result<reqwest::Request, DispatchError> {
        let body = serde_json::to_vec(message)?;
        let signature = sign_payload(&self.config.signing_secret, &body);
        let destination = self.config.destination_url();

        let mut builder = match &self.config.publish_url {
            Some(publish_url) => {
                let mut b = self
                    .client
                    .post(publish_url)
                    .timeout(PUBLISH_TIMEOUT)
                    .header(DESTINATION_HEADER, &destination);
                if let Some(token) = &self.config.publish_token {
                    b = b.bearer_auth(token);
                }
                b
            }
            None => self.client.post(&destination).timeout(self.direct_timeout),
        };
        builder = builder
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body);

        Ok(builder.build()?)
    }

    /// Publish with retry. Returns the last error once every attempt failed.
    pub async fn publish(&self, message: &DispatchMessage) -> Result<(), DispatchError> {
        let request = self.build_request(message)?;

        let mut attempt = 0usize;
        loop {
            let Some(cloned) = request.try_clone() else {
                return self.send(request).await;
            };
            match self.send(cloned).await {
                Ok(()) => return Ok(()),
                Err(e) if self.is_direct() && e.is_timeout() => {
                    tracing::error!(
                        run_id = %message.run_id,
                        error = %e,
                        "Direct dispatch timed out, leaving the run to the stuck-run sweep"
                    );
                    return Err(e);
                }
                Err(e) => match self.retry_delays.get(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt = attempt + 1,
                            run_id = %message.run_id,
                            error = %e,
                            "Dispatch publish attempt failed, retrying"
                        );
                        tokio::time::sleep(*delay).await;
                        attempt += 1;
                    }
                    None => {
                        tracing::error!(
                            run_id = %message.run_id,
                            error = %e,
                            "Dispatch publish failed after all retries"
                        );
                        return Err(e);
                    }
                },
            }
        }
    }

    async fn send(&self, request: reqwest::Request) -> Result<(), DispatchError> {
        let response = self.client.execute(request).await?;
        if !response.status().is_success() {
            return Err(DispatchError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, message: &DispatchMessage) -> Result<(), ExternalError> {
        if self.is_direct() {
            // Encoding errors surface to the caller; the call itself does not.
            self.build_request(message)?;
            let dispatcher = self.clone();
            let detached = message.clone();
            tokio::spawn(async move {
                // Failures are logged by `publish`.
                let _ = dispatcher.publish(&detached).await;
            });
        } else {
            self.publish(message).await?;
        }

        tracing::debug!(
            run_id = %message.run_id,
            pair = %message.current_pair,
            remaining = message.remaining_pairs.len(),
            direct = self.is_direct(),
            "Dispatched analysis pair"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
