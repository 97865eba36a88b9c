//! Capability provider adapters.
//!
//! Providers expose a single abstract operation: execute a named capability
//! against a request payload. Transport details stay behind the trait; the
//! coordinator owns deadlines, cancellation, and circuit breaking.

use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for external capability providers.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// The provider identifier used in circuit breaking and audit records.
    fn id(&self) -> &str;

    /// Executes a capability against the given payload.
    ///
    /// The `cancel` token fires when the coordinator abandons the call
    /// (deadline exceeded or shutdown); implementations that spawn work
    /// should observe it.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot produce a result.
    async fn execute(
        &self,
        capability: &str,
        payload: &Value,
        cancel: CancellationToken,
    ) -> Result<Value>;
}

/// HTTP settings for capability providers.
#[derive(Debug, Clone, Copy)]
pub struct ProviderHttpConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for ProviderHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 3_000,
        }
    }
}

impl ProviderHttpConfig {
    /// Loads HTTP configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("STRATACOG_PROVIDER_TIMEOUT_MS") {
            if let Ok(timeout_ms) = v.parse::<u64>() {
                self.timeout_ms = timeout_ms;
            }
        }
        if let Ok(v) = std::env::var("STRATACOG_PROVIDER_CONNECT_TIMEOUT_MS") {
            if let Ok(connect_timeout_ms) = v.parse::<u64>() {
                self.connect_timeout_ms = connect_timeout_ms;
            }
        }
        self
    }

    /// Sets the request timeout in milliseconds.
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets the connect timeout in milliseconds.
    #[must_use]
    pub const fn with_connect_timeout_ms(mut self, connect_timeout_ms: u64) -> Self {
        self.connect_timeout_ms = connect_timeout_ms;
        self
    }
}

/// Builds an HTTP client for provider requests with configured timeouts.
#[must_use]
pub fn build_http_client(config: ProviderHttpConfig) -> reqwest::Client {
    let mut builder =
        reqwest::Client::builder().user_agent(format!("Stratacog/{}", env!("CARGO_PKG_VERSION")));
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }

    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build provider HTTP client: {err}");
        reqwest::Client::new()
    })
}

/// Request body sent to HTTP capability endpoints.
#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    capability: &'a str,
    payload: &'a Value,
}

/// Response body expected from HTTP capability endpoints.
#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    result: Value,
}

/// Capability provider that POSTs requests to an HTTP endpoint.
pub struct HttpCapabilityProvider {
    /// Provider identifier.
    id: String,
    /// Endpoint URL receiving execute requests.
    endpoint: String,
    /// HTTP client with connection pooling.
    client: reqwest::Client,
}

impl HttpCapabilityProvider {
    /// Creates a new HTTP capability provider.
    #[must_use]
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            client: build_http_client(ProviderHttpConfig::from_env()),
        }
    }

    /// Sets HTTP client timeouts for provider requests.
    #[must_use]
    pub fn with_http_config(mut self, config: ProviderHttpConfig) -> Self {
        self.client = build_http_client(config);
        self
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, capability: &str, payload: &Value) -> Result<Value> {
        let request = ExecuteRequest {
            capability,
            payload,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let error_kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connect"
                } else if e.is_request() {
                    "request"
                } else {
                    "unknown"
                };
                tracing::error!(
                    provider = %self.id,
                    endpoint = %self.endpoint,
                    error = %e,
                    error_kind = error_kind,
                    "Capability request failed"
                );
                Error::OperationFailed {
                    operation: "capability_execute".to_string(),
                    cause: format!("{error_kind} error: {e}"),
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                provider = %self.id,
                status = %status,
                body = %body,
                "Capability endpoint returned error status"
            );
            return Err(Error::OperationFailed {
                operation: "capability_execute".to_string(),
                cause: format!("endpoint returned status: {status} - {body}"),
            });
        }

        let response: ExecuteResponse = response.json().await.map_err(|e| {
            tracing::error!(
                provider = %self.id,
                error = %e,
                "Failed to parse capability response"
            );
            Error::OperationFailed {
                operation: "capability_response".to_string(),
                cause: e.to_string(),
            }
        })?;

        Ok(response.result)
    }
}

#[async_trait]
impl CapabilityProvider for HttpCapabilityProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(
        &self,
        capability: &str,
        payload: &Value,
        cancel: CancellationToken,
    ) -> Result<Value> {
        tokio::select! {
            () = cancel.cancelled() => Err(Error::OperationFailed {
                operation: "capability_execute".to_string(),
                cause: "call cancelled".to_string(),
            }),
            result = self.request(capability, payload) => result,
        }
    }
}

/// Capability provider that returns a canned payload.
///
/// Used for offline runs and wiring checks via `kind = "static"` in the
/// provider configuration table.
pub struct StaticCapabilityProvider {
    /// Provider identifier.
    id: String,
    /// Payload returned for every call.
    payload: Value,
}

impl StaticCapabilityProvider {
    /// Creates a new static capability provider.
    #[must_use]
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

#[async_trait]
impl CapabilityProvider for StaticCapabilityProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(
        &self,
        _capability: &str,
        _payload: &Value,
        _cancel: CancellationToken,
    ) -> Result<Value> {
        Ok(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_config_defaults() {
        let config = ProviderHttpConfig::default();
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.connect_timeout_ms, 3_000);
    }

    #[test]
    fn test_http_config_builders() {
        let config = ProviderHttpConfig::default()
            .with_timeout_ms(5_000)
            .with_connect_timeout_ms(500);
        assert_eq!(config.timeout_ms, 5_000);
        assert_eq!(config.connect_timeout_ms, 500);
    }

    #[test]
    fn test_execute_request_serialization() {
        let payload = json!({"request": "map the dependencies"});
        let request = ExecuteRequest {
            capability: "deep-analysis",
            payload: &payload,
        };

        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value["capability"], "deep-analysis");
        assert_eq!(value["payload"]["request"], "map the dependencies");
    }

    #[test]
    fn test_http_provider_accessors() {
        let provider = HttpCapabilityProvider::new("planner", "http://localhost:9090/execute")
            .with_http_config(ProviderHttpConfig::default().with_timeout_ms(1_000));
        assert_eq!(provider.id(), "planner");
        assert_eq!(provider.endpoint(), "http://localhost:9090/execute");
    }

    #[tokio::test]
    async fn test_static_provider_returns_payload() {
        let provider = StaticCapabilityProvider::new("canned", json!({"advice": "simplify"}));
        let result = provider
            .execute("deep-analysis", &json!({}), CancellationToken::new())
            .await
            .expect("static provider");
        assert_eq!(result["advice"], "simplify");
    }

    #[tokio::test]
    async fn test_http_provider_cancel_short_circuits() {
        let provider = HttpCapabilityProvider::new("planner", "http://localhost:1/execute");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = provider.execute("deep-analysis", &json!({}), cancel).await;
        assert!(result.is_err());
    }
}
