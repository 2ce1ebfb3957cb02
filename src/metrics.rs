use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("gateway_requests_total", "Total number of requests").unwrap();
    pub static ref THROTTLED_TOTAL: Counter =
        register_counter!("gateway_throttled_total", "Requests rejected by the rate limiter").unwrap();
    pub static ref NOT_FOUND_TOTAL: Counter =
        register_counter!("gateway_not_found_total", "Requests to unregistered paths").unwrap();
    pub static ref BACKEND_ERRORS: Counter =
        register_counter!("gateway_backend_errors_total", "Backend responses with status >= 500").unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "gateway_request_latency_seconds",
        "Request latency in seconds"
    )
    .unwrap();
    pub static ref TRACKED_CLIENTS: Gauge =
        register_gauge!("gateway_tracked_clients", "Clients with a live rate window").unwrap();
    pub static ref LOG_DROPPED: Counter =
        register_counter!("gateway_log_dropped_total", "Outcome records dropped on a full log queue").unwrap();
    pub static ref LOG_PERSISTED: Counter =
        register_counter!("gateway_log_persisted_total", "Outcome records written to the log store").unwrap();
    pub static ref LOG_DEAD_LETTER: Counter =
        register_counter!("gateway_log_dead_letter_total", "Outcome records abandoned after retries").unwrap();
    pub static ref LOG_RETRIES: Counter =
        register_counter!("gateway_log_retries_total", "Log store write retries").unwrap();
}
