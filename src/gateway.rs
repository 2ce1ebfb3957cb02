use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

use crate::clock::Clock;
use crate::dispatcher::Dispatcher;
use crate::metrics::{BACKEND_ERRORS, NOT_FOUND_TOTAL, REQUEST_LATENCY, REQUEST_TOTAL, THROTTLED_TOTAL};
use crate::models::{GatewayRequest, GatewayResponse, OutcomeRecord, error_body};
use crate::pipeline::LogSink;
use crate::rate_limit::RateLimiter;
use crate::transform::transform_response;

/// Per-request coordination: admit, dispatch or reject, log.
/// Holds nothing but its collaborators.
#[derive(Clone)]
pub struct Gateway {
    limiter: Arc<RateLimiter>,
    dispatcher: Arc<Dispatcher>,
    sink: LogSink,
    clock: Arc<dyn Clock>,
}

impl Gateway {
    pub fn new(
        limiter: Arc<RateLimiter>,
        dispatcher: Arc<Dispatcher>,
        sink: LogSink,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            limiter,
            dispatcher,
            sink,
            clock,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub async fn handle(&self, request: GatewayRequest) -> GatewayResponse {
        REQUEST_TOTAL.inc();
        // elapsed time is real monotonic time, never the injected clock
        let started = Instant::now();
        let timestamp = self.clock.timestamp();

        if !self.limiter.admit(&request.client, self.clock.now()) {
            THROTTLED_TOTAL.inc();
            let elapsed = started.elapsed().as_millis() as u64;
            let record = OutcomeRecord::new(timestamp, &request, 429, elapsed);
            self.emit(record);
            return GatewayResponse {
                status: 429,
                body: error_body("Rate limit exceeded. Try again later."),
            };
        }

        // Admitted requests run detached: if the caller goes away the dispatch
        // still finishes and its record is still emitted.
        let gateway = self.clone();
        let fallback = request.clone();
        let task = tokio::spawn(async move { gateway.dispatch(request, timestamp, started).await });

        match task.await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "dispatch task failed");
                let elapsed = started.elapsed().as_millis() as u64;
                self.emit(OutcomeRecord::new(timestamp, &fallback, 500, elapsed));
                GatewayResponse {
                    status: 500,
                    body: error_body("An unhandled gateway error occurred."),
                }
            }
        }
    }

    async fn dispatch(
        &self,
        request: GatewayRequest,
        timestamp: DateTime<Utc>,
        started: Instant,
    ) -> GatewayResponse {
        let dispatched = self.dispatcher.handle(&request, timestamp).await;
        match dispatched.record.status_code {
            404 => NOT_FOUND_TOTAL.inc(),
            s if s >= 500 => BACKEND_ERRORS.inc(),
            _ => {}
        }

        let status = dispatched.record.status_code;
        let service = dispatched.backend.as_deref().unwrap_or("gateway");
        let body = transform_response(service, status, dispatched.body, timestamp);

        self.emit(dispatched.record);
        REQUEST_LATENCY.observe(started.elapsed().as_secs_f64());

        GatewayResponse { status, body }
    }

    // Echo to the operational log, then hand off for persistence
    fn emit(&self, record: OutcomeRecord) {
        if record.is_error {
            tracing::warn!(
                method = %record.method,
                endpoint = %record.endpoint,
                status = record.status_code,
                time_ms = record.response_time_ms,
                "request failed"
            );
        } else {
            tracing::info!(
                method = %record.method,
                endpoint = %record.endpoint,
                status = record.status_code,
                time_ms = record.response_time_ms,
                "request served"
            );
        }
        self.sink.submit(record);
    }
}
