use async_trait::async_trait;
use meridian_core::{InferenceProvider, InvokeParams, MeridianError, MeridianResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Type alias for the injectable sleep function used in tests.
#[cfg(test)]
type SleepFn = Box<
    dyn Fn(u64) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync,
>;

/// Configures retry behaviour for failover across inference providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries per provider before moving to the next one.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

/// Whether an error is transient and worth retrying.
///
/// Responses with a rate limit (429), authentication hiccup (401) or server
/// error status are retried; any other status, 400 included, is not. Errors
/// without a status are retried only when they report a timeout.
pub fn is_retryable(err: &MeridianError) -> bool {
    match err {
        MeridianError::Http {
            status: Some(status),
            ..
        } => matches!(status, 401 | 429 | 500 | 502 | 503 | 504),
        MeridianError::Http {
            status: None,
            message,
        }
        | MeridianError::InferenceProvider(message) => {
            let lower = message.to_lowercase();
            lower.contains("timeout") || lower.contains("timed out")
        }
        _ => false,
    }
}

/// Exponential backoff for `attempt`, capped at `backoff_max_ms`.
pub fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let delay = policy
        .backoff_base_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.backoff_max_ms)
}

/// One provider in the failover order.
pub struct Route {
    provider: Arc<dyn InferenceProvider>,
    /// Model to request instead of the caller's, for fallback models.
    model: Option<String>,
}

impl Route {
    /// Route that forwards the caller's model id unchanged.
    pub fn primary(provider: Arc<dyn InferenceProvider>) -> Self {
        Self {
            provider,
            model: None,
        }
    }

    /// Route that always requests `model`.
    pub fn fallback(provider: Arc<dyn InferenceProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: Some(model.into()),
        }
    }
}

/// An [`InferenceProvider`] that tries several providers in order with
/// exponential-backoff retries.
///
/// Within one route, retryable errors are retried up to `max_retries` times.
/// A non-retryable error, or exhausted retries, moves on to the next route.
/// When every route fails the last error is returned.
pub struct FailoverProvider {
    routes: Vec<Route>,
    policy: RetryPolicy,
    #[cfg(test)]
    sleep_fn: Option<SleepFn>,
}

impl FailoverProvider {
    pub fn new(routes: Vec<Route>, policy: RetryPolicy) -> Self {
        Self {
            routes,
            policy,
            #[cfg(test)]
            sleep_fn: None,
        }
    }

    async fn do_sleep(&self, ms: u64) {
        #[cfg(test)]
        if let Some(ref f) = self.sleep_fn {
            f(ms).await;
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }
}

#[async_trait]
impl InferenceProvider for FailoverProvider {
    async fn invoke(
        &self,
        model: &str,
        prompt: &str,
        params: &InvokeParams,
    ) -> MeridianResult<String> {
        let mut last_err: Option<MeridianError> = None;

        for (route_idx, route) in self.routes.iter().enumerate() {
            let route_model = route.model.as_deref().unwrap_or(model);
            for attempt in 0..=self.policy.max_retries {
                match route.provider.invoke(route_model, prompt, params).await {
                    Ok(reply) => return Ok(reply),
                    Err(e) => {
                        if !is_retryable(&e) {
                            warn!(
                                route = route_idx,
                                model = %route_model,
                                attempt,
                                error = %e,
                                "Non-retryable error, moving to next provider"
                            );
                            last_err = Some(e);
                            break;
                        }

                        if attempt < self.policy.max_retries {
                            let delay = compute_backoff(&self.policy, attempt);
                            info!(
                                route = route_idx,
                                model = %route_model,
                                attempt,
                                delay_ms = delay,
                                error = %e,
                                "Retryable error, backing off"
                            );
                            self.do_sleep(delay).await;
                        }
                        last_err = Some(e);
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            MeridianError::InferenceProvider("all failover providers exhausted".into())
        }))
    }
}
