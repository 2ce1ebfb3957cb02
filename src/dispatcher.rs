use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::backend::Backend;
use crate::error::{GatewayError, Result};
use crate::models::{GatewayRequest, OutcomeRecord, error_body};

// path -> backend name, fixed at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: String,
    pub backend: String,
}

impl Route {
    pub fn new(path: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            backend: backend.into(),
        }
    }
}

/// Result of dispatching one request: the log record plus the body for the caller.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub record: OutcomeRecord,
    pub body: Value,
    pub backend: Option<String>, // None when no route matched
}

/// Exact-path routing table over a set of named backends.
pub struct Dispatcher {
    routes: HashMap<String, Arc<dyn Backend>>,
}

impl Dispatcher {
    pub fn new(backends: Vec<Arc<dyn Backend>>, routes: Vec<Route>) -> Result<Self> {
        let mut by_name: HashMap<String, Arc<dyn Backend>> = HashMap::new();
        for backend in backends {
            let name = backend.name().to_string();
            if by_name.insert(name.clone(), backend).is_some() {
                return Err(GatewayError::DuplicateBackend(name));
            }
        }

        let mut table = HashMap::new();
        for route in routes {
            let backend = by_name
                .get(&route.backend)
                .cloned()
                .ok_or_else(|| GatewayError::UnknownBackend {
                    path: route.path.clone(),
                    backend: route.backend.clone(),
                })?;
            tracing::info!(path = %route.path, backend = %route.backend, "route registered");
            table.insert(route.path, backend);
        }

        Ok(Self { routes: table })
    }

    pub fn route(&self, path: &str) -> Option<Arc<dyn Backend>> {
        self.routes.get(path).cloned()
    }

    // One request, at most one backend call, no retries
    pub async fn handle(&self, request: &GatewayRequest, timestamp: DateTime<Utc>) -> Dispatched {
        // Latency is always real monotonic time; backends sleep for real.
        let start = Instant::now();

        let Some(backend) = self.route(&request.path) else {
            let elapsed = start.elapsed().as_millis() as u64;
            return Dispatched {
                record: OutcomeRecord::new(timestamp, request, 404, elapsed),
                body: error_body("Service not found."),
                backend: None,
            };
        };

        let response = backend.invoke(request).await;
        let elapsed = start.elapsed().as_millis() as u64;

        Dispatched {
            record: OutcomeRecord::new(timestamp, request, response.status, elapsed),
            body: response.body,
            backend: Some(backend.name().to_string()),
        }
    }
}
