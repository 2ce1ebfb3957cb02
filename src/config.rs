use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Backend, FailureRate, HttpBackend, SimulatedBackend, UniformLatency};
use crate::dispatcher::{Dispatcher, Route};
use crate::error::{GatewayError, Result};
use crate::pipeline::PipelineConfig;
use crate::telemetry::LogFormat;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "api-gateway")]
#[command(about = "Rate limited API gateway with durable request logging")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Rate limit max requests per window
    #[arg(long, env = "REQUEST_LIMIT_PER_MINUTE", default_value_t = 10,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub rate_window: u64,

    // How often idle client windows are swept, in seconds
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub sweep_interval: u64,

    // Idle clients older than this are forgotten, in seconds
    #[arg(long, default_value_t = 300)]
    pub client_retention: u64,

    // SQLite file holding api_logs
    #[arg(short, long, default_value = "api_gateway.db")]
    pub database: PathBuf,

    // Log queue bound; records beyond it are dropped and counted
    #[arg(long, default_value_t = 1024)]
    pub log_queue_capacity: usize,

    #[arg(long, default_value_t = 32)]
    pub log_batch_size: usize,

    #[arg(long, default_value_t = 3)]
    pub log_max_retries: u32,

    #[arg(long, default_value_t = 100)]
    pub log_retry_backoff_ms: u64,

    // Simulated backend, repeatable
    // Example: --backend users,50,150,0.1
    #[arg(long = "backend", value_name = "NAME,MIN_MS,MAX_MS,FAILURE_RATE")]
    pub backends: Vec<BackendSpec>,

    // Real upstream, repeatable
    // Example: --upstream orders,localhost:9000
    #[arg(long = "upstream", value_name = "NAME,URL")]
    pub upstreams: Vec<UpstreamSpec>,

    // Route, repeatable. Defaults to /api/<name> for every backend
    // Example: --route /api/users=users
    #[arg(long = "route", value_name = "PATH=NAME")]
    pub routes: Vec<RouteSpec>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendSpec {
    pub name: String,
    pub min_ms: u64,
    pub max_ms: u64,
    pub failure_rate: f64,
}

impl FromStr for BackendSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(|p| p.trim()).collect();
        let [name, min, max, rate] = parts.as_slice() else {
            return Err(format!("expected NAME,MIN_MS,MAX_MS,FAILURE_RATE, got '{s}'"));
        };
        if name.is_empty() {
            return Err("backend name must not be empty".to_string());
        }

        let min_ms: u64 = min.parse().map_err(|_| format!("bad MIN_MS '{min}'"))?;
        let max_ms: u64 = max.parse().map_err(|_| format!("bad MAX_MS '{max}'"))?;
        if min_ms > max_ms {
            return Err(format!("MIN_MS {min_ms} exceeds MAX_MS {max_ms}"));
        }
        let failure_rate: f64 = rate.parse().map_err(|_| format!("bad FAILURE_RATE '{rate}'"))?;
        if !(0.0..=1.0).contains(&failure_rate) {
            return Err(format!("FAILURE_RATE must be within 0..=1, got {failure_rate}"));
        }

        Ok(Self {
            name: name.to_string(),
            min_ms,
            max_ms,
            failure_rate,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamSpec {
    pub name: String,
    pub url: String,
}

impl FromStr for UpstreamSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once(',') {
            Some((name, url)) if !name.trim().is_empty() && !url.trim().is_empty() => Ok(Self {
                name: name.trim().to_string(),
                url: url.trim().to_string(),
            }),
            _ => Err(format!("expected NAME,URL, got '{s}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteSpec {
    pub path: String,
    pub backend: String,
}

impl FromStr for RouteSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let Some((path, backend)) = s.split_once('=') else {
            return Err(format!("expected PATH=NAME, got '{s}'"));
        };
        let (path, backend) = (path.trim(), backend.trim());
        if !path.starts_with('/') {
            return Err(format!("route path must start with '/', got '{path}'"));
        }
        if backend.is_empty() {
            return Err("route backend must not be empty".to_string());
        }
        Ok(Self {
            path: path.to_string(),
            backend: backend.to_string(),
        })
    }
}

impl Args {
    pub fn validate(&self) -> Result<()> {
        if self.client_retention < self.rate_window {
            return Err(GatewayError::Config(format!(
                "client retention ({}s) must be at least the rate window ({}s)",
                self.client_retention, self.rate_window
            )));
        }
        if self.log_queue_capacity == 0 || self.log_batch_size == 0 {
            return Err(GatewayError::Config(
                "log queue capacity and batch size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }

    pub fn client_retention(&self) -> Duration {
        Duration::from_secs(self.client_retention)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            capacity: self.log_queue_capacity,
            batch_size: self.log_batch_size,
            max_retries: self.log_max_retries,
            retry_backoff: Duration::from_millis(self.log_retry_backoff_ms),
        }
    }

    // The two stock services when nothing is configured
    pub fn simulated_backends(&self) -> Vec<BackendSpec> {
        if self.backends.is_empty() && self.upstreams.is_empty() {
            return vec![
                BackendSpec {
                    name: "users".to_string(),
                    min_ms: 50,
                    max_ms: 150,
                    failure_rate: 0.1,
                },
                BackendSpec {
                    name: "products".to_string(),
                    min_ms: 80,
                    max_ms: 230,
                    failure_rate: 0.1,
                },
            ];
        }
        self.backends.clone()
    }

    pub fn route_table(&self) -> Vec<Route> {
        if !self.routes.is_empty() {
            return self
                .routes
                .iter()
                .map(|r| Route::new(&r.path, &r.backend))
                .collect();
        }

        let simulated = self.simulated_backends();
        simulated
            .iter()
            .map(|b| b.name.as_str())
            .chain(self.upstreams.iter().map(|u| u.name.as_str()))
            .map(|name| Route::new(format!("/api/{name}"), name))
            .collect()
    }

    pub fn build_dispatcher(&self, client: reqwest::Client) -> Result<Dispatcher> {
        let mut backends: Vec<Arc<dyn Backend>> = Vec::new();

        for spec in self.simulated_backends() {
            backends.push(Arc::new(SimulatedBackend::new(
                spec.name,
                UniformLatency::new(spec.min_ms, spec.max_ms),
                FailureRate::new(spec.failure_rate),
            )));
        }
        for spec in &self.upstreams {
            backends.push(Arc::new(HttpBackend::new(&spec.name, &spec.url, client.clone())));
        }

        Dispatcher::new(backends, self.route_table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["api-gateway"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_route_the_stock_services() {
        let args = parse(&[]);
        assert_eq!(args.rate_window(), Duration::from_secs(60));
        assert!(args.validate().is_ok());

        let routes = args.route_table();
        assert_eq!(
            routes,
            vec![Route::new("/api/users", "users"), Route::new("/api/products", "products")]
        );

        let dispatcher = args.build_dispatcher(reqwest::Client::new()).unwrap();
        assert!(dispatcher.route("/api/users").is_some());
        assert!(dispatcher.route("/api/products").is_some());
        assert!(dispatcher.route("/api/unknown").is_none());
    }

    #[test]
    fn explicit_backends_and_routes() {
        let args = parse(&[
            "--backend", "orders,10,20,0.5",
            "--upstream", "billing,localhost:9000",
            "--route", "/orders=orders",
            "--route", "/v1/billing=billing",
        ]);
        assert_eq!(args.backends[0].failure_rate, 0.5);
        assert_eq!(args.upstreams[0].url, "localhost:9000");

        let dispatcher = args.build_dispatcher(reqwest::Client::new()).unwrap();
        assert_eq!(dispatcher.route("/orders").unwrap().name(), "orders");
        assert_eq!(dispatcher.route("/v1/billing").unwrap().name(), "billing");
        // stock services are not added once something is configured
        assert!(dispatcher.route("/api/users").is_none());
    }

    #[test]
    fn route_to_missing_backend_fails_startup() {
        let args = parse(&["--backend", "orders,10,20,0", "--route", "/x=nope"]);
        assert!(matches!(
            args.build_dispatcher(reqwest::Client::new()),
            Err(GatewayError::UnknownBackend { .. })
        ));
    }

    #[test]
    fn malformed_specs_are_rejected() {
        assert!("users,50".parse::<BackendSpec>().is_err());
        assert!("users,150,50,0.1".parse::<BackendSpec>().is_err());
        assert!("users,50,150,1.5".parse::<BackendSpec>().is_err());
        assert!(",50,150,0.1".parse::<BackendSpec>().is_err());
        assert!("api/users=users".parse::<RouteSpec>().is_err());
        assert!("nourl".parse::<UpstreamSpec>().is_err());
        assert!(Args::try_parse_from(["api-gateway", "--rate-limit", "0"]).is_err());
        assert!(Args::try_parse_from(["api-gateway", "--sweep-interval", "0"]).is_err());
    }

    #[test]
    fn retention_shorter_than_window_is_invalid() {
        let args = parse(&["--rate-window", "120", "--client-retention", "60"]);
        assert!(matches!(args.validate(), Err(GatewayError::Config(_))));
    }
}
