pub mod backend;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod rate_limit;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod transform;

pub use error::{GatewayError, Result};
