//! Oracle failover: primary, then secondary, then the canned responder.
//!
//! When the primary oracle fails for any reason, the same request goes to
//! the secondary. If both fail and both failures are rate-limit / quota
//! shaped, the heuristic responder answers instead of failing the run.

use crate::heuristic::HeuristicResponder;
use async_trait::async_trait;
use lysai_core::error::OracleError;
use lysai_core::oracle::{Oracle, OracleRequest, OracleResponse};
use std::sync::Arc;
use tracing::{info, warn};

pub struct FailoverOracle {
    name: String,
    primary: Arc<dyn Oracle>,
    secondary: Option<Arc<dyn Oracle>>,
    heuristic: Option<HeuristicResponder>,
}

impl FailoverOracle {
    pub fn new(primary: Arc<dyn Oracle>) -> Self {
        Self {
            name: format!("failover({})", primary.name()),
            primary,
            secondary: None,
            heuristic: None,
        }
    }

    pub fn with_secondary(mut self, secondary: Arc<dyn Oracle>) -> Self {
        self.name = format!("failover({}, {})", self.primary.name(), secondary.name());
        self.secondary = Some(secondary);
        self
    }

    /// Answer from the canned responder when every backend is exhausted.
    pub fn with_heuristic(mut self, heuristic: HeuristicResponder) -> Self {
        self.heuristic = Some(heuristic);
        self
    }

    fn exhausted_fallback(
        &self,
        request: &OracleRequest,
        error: OracleError,
    ) -> std::result::Result<OracleResponse, OracleError> {
        match &self.heuristic {
            Some(heuristic) if error.is_resource_exhaustion() => {
                warn!(error = %error, "Failover: all backends rate limited, using heuristic responder");
                Ok(heuristic.respond(request))
            }
            _ => Err(error),
        }
    }
}

#[async_trait]
impl Oracle for FailoverOracle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        request: OracleRequest,
    ) -> std::result::Result<OracleResponse, OracleError> {
        let primary_error = match self.primary.generate(request.clone()).await {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        let Some(secondary) = &self.secondary else {
            warn!(
                backend = %self.primary.name(),
                error = %primary_error,
                "Failover: primary failed, no secondary configured"
            );
            return self.exhausted_fallback(&request, primary_error);
        };

        warn!(
            primary = %self.primary.name(),
            secondary = %secondary.name(),
            error = %primary_error,
            "Failover: primary failed, trying secondary"
        );

        match secondary.generate(request.clone()).await {
            Ok(response) => {
                info!(backend = %secondary.name(), "Failover: secondary answered");
                Ok(response)
            }
            Err(secondary_error) => {
                warn!(
                    backend = %secondary.name(),
                    error = %secondary_error,
                    "Failover: secondary failed"
                );
                self.exhausted_fallback(
                    &request,
                    OracleError::AllBackendsFailed {
                        primary: Box::new(primary_error),
                        secondary: Box::new(secondary_error),
                    },
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristic::HEURISTIC_BACKEND;
    use lysai_core::error::ProviderError;
    use std::sync::Mutex;

    /// A mock oracle that always fails.
    struct FailingOracle {
        name: String,
        error: OracleError,
        calls: Mutex<Vec<OracleRequest>>,
    }

    impl FailingOracle {
        fn new(name: &str, error: OracleError) -> Self {
            Self {
                name: name.into(),
                error,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Oracle for FailingOracle {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(
            &self,
            request: OracleRequest,
        ) -> std::result::Result<OracleResponse, OracleError> {
            self.calls.lock().unwrap().push(request);
            Err(self.error.clone())
        }
    }

    /// A mock oracle that always succeeds.
    struct SuccessOracle {
        name: String,
        calls: Mutex<Vec<OracleRequest>>,
    }

    impl SuccessOracle {
        fn new(name: &str) -> Self {
            Self {
                name: name.into(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Oracle for SuccessOracle {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(
            &self,
            request: OracleRequest,
        ) -> std::result::Result<OracleResponse, OracleError> {
            self.calls.lock().unwrap().push(request);
            Ok(OracleResponse {
                text: "PLAN".into(),
                raw: serde_json::Value::Null,
                backend: self.name.clone(),
            })
        }
    }

    fn rate_limited(backend: &str) -> OracleError {
        OracleError::RetriesExhausted {
            backend: backend.into(),
            attempts: 3,
            source: ProviderError::RateLimited {
                retry_after_secs: 30,
            },
        }
    }

    fn decision_request() -> OracleRequest {
        OracleRequest::new("Tools Inspected: No\nAVAILABLE ACTIONS:\n- PLAN").with_temperature(0.1)
    }

    #[tokio::test]
    async fn primary_answers() {
        let primary = Arc::new(SuccessOracle::new("primary"));
        let secondary = Arc::new(SuccessOracle::new("secondary"));
        let oracle = FailoverOracle::new(primary.clone()).with_secondary(secondary.clone());

        let response = oracle.generate(decision_request()).await.unwrap();
        assert_eq!(response.backend, "primary");
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn secondary_gets_identical_request() {
        let primary = Arc::new(FailingOracle::new(
            "primary",
            OracleError::Backend(ProviderError::AuthenticationFailed("bad key".into())),
        ));
        let secondary = Arc::new(SuccessOracle::new("secondary"));
        let oracle = FailoverOracle::new(primary.clone()).with_secondary(secondary.clone());

        let response = oracle.generate(decision_request()).await.unwrap();
        assert_eq!(response.backend, "secondary");
        assert_eq!(primary.calls(), 1);

        let sent = secondary.calls.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], decision_request());
    }

    #[tokio::test]
    async fn both_rate_limited_uses_heuristic() {
        let primary = Arc::new(FailingOracle::new("primary", rate_limited("primary")));
        let secondary = Arc::new(FailingOracle::new("secondary", rate_limited("secondary")));
        let oracle = FailoverOracle::new(primary)
            .with_secondary(secondary)
            .with_heuristic(HeuristicResponder::new());

        let response = oracle.generate(decision_request()).await.unwrap();
        assert_eq!(response.backend, HEURISTIC_BACKEND);
        assert!(response.text.starts_with("INSPECT_TOOLS"));
    }

    #[tokio::test]
    async fn mixed_failures_propagate() {
        let primary = Arc::new(FailingOracle::new("primary", rate_limited("primary")));
        let secondary = Arc::new(FailingOracle::new(
            "secondary",
            OracleError::Backend(ProviderError::Network("down".into())),
        ));
        let oracle = FailoverOracle::new(primary)
            .with_secondary(secondary.clone())
            .with_heuristic(HeuristicResponder::new());

        let err = oracle.generate(decision_request()).await.unwrap_err();
        assert!(matches!(err, OracleError::AllBackendsFailed { .. }));
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn without_heuristic_exhaustion_propagates() {
        let primary = Arc::new(FailingOracle::new("primary", rate_limited("primary")));
        let secondary = Arc::new(FailingOracle::new("secondary", rate_limited("secondary")));
        let oracle = FailoverOracle::new(primary).with_secondary(secondary);

        let err = oracle.generate(decision_request()).await.unwrap_err();
        assert!(err.is_resource_exhaustion());
    }

    #[tokio::test]
    async fn single_backend_exhaustion_uses_heuristic() {
        let primary = Arc::new(FailingOracle::new("primary", rate_limited("primary")));
        let oracle = FailoverOracle::new(primary).with_heuristic(HeuristicResponder::new());

        let response = oracle.generate(decision_request()).await.unwrap();
        assert_eq!(response.backend, HEURISTIC_BACKEND);
    }

    #[test]
    fn name_lists_backends() {
        let oracle = FailoverOracle::new(Arc::new(SuccessOracle::new("gemini")))
            .with_secondary(Arc::new(SuccessOracle::new("openrouter")));
        assert_eq!(oracle.name(), "failover(gemini, openrouter)");
    }
}
