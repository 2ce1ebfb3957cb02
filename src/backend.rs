use async_trait::async_trait;
use rand::Rng;
use serde_json::{Value, json};
use std::time::Duration;

use crate::models::{BackendResponse, GatewayRequest, error_body};

/// Something a route can dispatch to. Simulated or real, the contract is the same:
/// one call, one status, one body.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, request: &GatewayRequest) -> BackendResponse;
}

// How long a simulated call takes
pub trait LatencyModel: Send + Sync {
    fn sample(&self) -> Duration;
}

// Whether a simulated call fails
pub trait FailureModel: Send + Sync {
    fn should_fail(&self) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct FixedLatency(pub Duration);

impl LatencyModel for FixedLatency {
    fn sample(&self) -> Duration {
        self.0
    }
}

/// Latency drawn uniformly from `[min, max]` milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct UniformLatency {
    min_ms: u64,
    max_ms: u64,
}

impl UniformLatency {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }
}

impl LatencyModel for UniformLatency {
    fn sample(&self) -> Duration {
        let ms = rand::thread_rng().gen_range(self.min_ms..=self.max_ms);
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NeverFail;

impl FailureModel for NeverFail {
    fn should_fail(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AlwaysFail;

impl FailureModel for AlwaysFail {
    fn should_fail(&self) -> bool {
        true
    }
}

/// Fails with probability `rate` (clamped to `[0, 1]`).
#[derive(Debug, Clone, Copy)]
pub struct FailureRate(f64);

impl FailureRate {
    pub fn new(rate: f64) -> Self {
        let rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        Self(rate)
    }
}

impl FailureModel for FailureRate {
    fn should_fail(&self) -> bool {
        rand::thread_rng().gen_bool(self.0)
    }
}

// Simulated service: waits, then answers 200 with its payload or 500
pub struct SimulatedBackend {
    name: String,
    latency: Box<dyn LatencyModel>,
    failure: Box<dyn FailureModel>,
    payload: Value,
    failure_message: String,
}

impl SimulatedBackend {
    pub fn new(
        name: impl Into<String>,
        latency: impl LatencyModel + 'static,
        failure: impl FailureModel + 'static,
    ) -> Self {
        let name = name.into();
        let payload = default_payload(&name);
        let failure_message = default_failure_message(&name);
        Self {
            name,
            latency: Box::new(latency),
            failure: Box::new(failure),
            payload,
            failure_message,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = message.into();
        self
    }
}

#[async_trait]
impl Backend for SimulatedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _request: &GatewayRequest) -> BackendResponse {
        // sample both up front; the rng is thread-local and must not cross the await
        let delay = self.latency.sample();
        let failed = self.failure.should_fail();

        tokio::time::sleep(delay).await;

        if failed {
            BackendResponse {
                status: 500,
                body: error_body(&self.failure_message),
            }
        } else {
            BackendResponse {
                status: 200,
                body: self.payload.clone(),
            }
        }
    }
}

// What an injected failure says, per stock service
fn default_failure_message(name: &str) -> String {
    match name {
        "users" => "Simulated internal server error from user service".to_string(),
        "products" => "Product Service Internal error".to_string(),
        other => format!("Simulated internal server error from {other} service"),
    }
}

// Canned bodies for the stock services
fn default_payload(name: &str) -> Value {
    match name {
        "users" => json!({
            "data": [{"id": 1, "name": "Alice"}, {"id": 2, "name": "Bob"}],
            "status": "success",
            "message": "Users fetched successfully",
        }),
        "products" => json!({
            "data": [{"id": 101, "name": "Laptop"}, {"id": 102, "name": "Mouse"}],
            "status": "success",
            "message": "Products fetched successfully",
        }),
        other => json!({"status": "success", "service": other}),
    }
}

/// Sent on every upstream call.
pub const USER_AGENT: &str = "api-gateway/1.0";

/// Real upstream reached over HTTP. The request path is appended to `base_url`.
pub struct HttpBackend {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(name: impl Into<String>, base_url: &str, client: reqwest::Client) -> Self {
        // add http:// if not present
        let base_url = if base_url.starts_with("http") {
            base_url.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", base_url.trim_end_matches('/'))
        };
        Self {
            name: name.into(),
            base_url,
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: &GatewayRequest) -> BackendResponse {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .unwrap_or(reqwest::Method::GET);
        let url = format!("{}{}", self.base_url, request.path);

        let result = self
            .client
            .request(method, &url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await;

        match result {
            Ok(res) => {
                let status = res.status().as_u16();
                let body = match res.text().await {
                    Ok(text) => serde_json::from_str::<Value>(&text).unwrap_or_else(|_| json!({"raw": text})),
                    Err(e) => {
                        tracing::warn!(backend = %self.name, error = %e, "failed reading upstream body");
                        Value::Null
                    }
                };
                BackendResponse { status, body }
            }
            Err(e) => {
                tracing::warn!(backend = %self.name, %url, error = %e, "upstream request failed");
                BackendResponse {
                    status: 502,
                    body: error_body(&format!("{} service unavailable", self.name)),
                }
            }
        }
    }
}
