use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Inbound request as handed over by the transport layer
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayRequest {
    pub method: String,
    pub path: String,
    pub client: String, // caller identity, usually the peer IP
}

impl GatewayRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            client: client.into(),
        }
    }
}

// What the gateway hands back to the caller
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: Value,
}

// What a backend returns from one invocation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendResponse {
    pub status: u16,
    pub body: Value,
}

// Gateway-generated error body: {"message": ..., "status": "error"}
pub fn error_body(message: &str) -> Value {
    serde_json::json!({
        "message": message,
        "status": "error",
    })
}

/// Final disposition of one inbound request. One row in `api_logs`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OutcomeRecord {
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub response_time_ms: u64,
    pub is_error: bool,
}

impl OutcomeRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        request: &GatewayRequest,
        status_code: u16,
        response_time_ms: u64,
    ) -> Self {
        Self {
            timestamp,
            endpoint: request.path.clone(),
            method: request.method.clone(),
            status_code,
            response_time_ms,
            is_error: status_code >= 400,
        }
    }
}
