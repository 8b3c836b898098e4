//! Retrying oracle: one backend, per-call timeouts, exponential backoff.
//!
//! Transient failures (network, timeout, rate limit, 5xx) are retried up to
//! `max_retries` attempts (the request's, else the oracle's own), waiting `base_delay * 2^attempt`
//! between them. Terminal failures (bad key, bad request) surface at once.

use async_trait::async_trait;
use lysai_core::error::{OracleError, ProviderError};
use lysai_core::message::Message;
use lysai_core::oracle::{Oracle, OracleRequest, OracleResponse};
use lysai_core::provider::{Provider, ProviderRequest};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// An oracle backed by a single provider and model.
pub struct RetryingOracle {
    provider: Arc<dyn Provider>,
    model: String,
    base_delay: Duration,
    call_timeout: Duration,
    max_retries: u32,
}

impl RetryingOracle {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_delay: Duration::from_millis(800),
            call_timeout: Duration::from_secs(60),
            max_retries: 3,
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Attempts used when a request does not set its own limit.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Backoff before retry number `attempt + 1`.
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    fn provider_request(&self, request: &OracleRequest) -> ProviderRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_instruction {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(request.prompt.clone()));

        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: None,
            json_mode: request.json_mode,
        }
    }
}

#[async_trait]
impl Oracle for RetryingOracle {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn generate(
        &self,
        request: OracleRequest,
    ) -> std::result::Result<OracleResponse, OracleError> {
        let attempts = request.max_retries.unwrap_or(self.max_retries).max(1);
        let provider_request = self.provider_request(&request);
        let backend = self.provider.name().to_string();

        let mut attempt = 0;
        loop {
            debug!(backend = %backend, attempt = attempt + 1, attempts, "Oracle: calling backend");

            let outcome = match tokio::time::timeout(
                self.call_timeout,
                self.provider.complete(provider_request.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(format!(
                    "Backend '{}' timed out after {}s",
                    backend,
                    self.call_timeout.as_secs()
                ))),
            };

            let error = match outcome {
                Ok(response) => {
                    return Ok(OracleResponse {
                        text: response.message.content,
                        raw: response.raw,
                        backend,
                    });
                }
                Err(e) => e,
            };

            if !error.is_transient() {
                warn!(backend = %backend, error = %error, "Oracle: terminal backend failure");
                return Err(OracleError::Backend(error));
            }

            if attempt + 1 >= attempts {
                warn!(
                    backend = %backend,
                    attempts,
                    error = %error,
                    "Oracle: retries exhausted"
                );
                return Err(OracleError::RetriesExhausted {
                    backend,
                    attempts,
                    source: error,
                });
            }

            let delay = self.backoff(attempt);
            warn!(
                backend = %backend,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Oracle: transient failure, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
