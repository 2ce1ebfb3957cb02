use clap::Parser; // for cli
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use api_gateway::clock::{Clock, SystemClock};
use api_gateway::config::Args;
use api_gateway::gateway::Gateway;
use api_gateway::handlers;
use api_gateway::pipeline::spawn_log_pipeline;
use api_gateway::rate_limit::{RateLimiter, window_sweeper};
use api_gateway::state::AppState;
use api_gateway::store::SqliteLogStore;
use api_gateway::telemetry::init_tracing;

// this is main async function with tokio
#[tokio::main]
async fn main() -> ExitCode {
    // parse cli arguments
    let args = Args::parse();
    init_tracing(args.log_format);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "gateway stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> api_gateway::Result<()> {
    args.validate()?;

    let store = Arc::new(SqliteLogStore::open(&args.database)?);
    let (sink, writer) = spawn_log_pipeline(store, args.pipeline_config());

    let dispatcher = Arc::new(args.build_dispatcher(reqwest::Client::new())?);
    let limiter = Arc::new(RateLimiter::new(args.rate_limit, args.rate_window()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // spawn the background sweeper
    let sweeper = tokio::spawn(window_sweeper(
        limiter.clone(),
        clock.clone(),
        args.sweep_interval(),
        args.client_retention(),
    ));

    // creating shared state
    let state = Arc::new(AppState {
        gateway: Gateway::new(limiter, dispatcher, sink, clock),
    });
    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(%addr, "gateway listening");
    tracing::info!(
        limit = args.rate_limit,
        window_secs = args.rate_window,
        "rate limit configured"
    );
    tracing::info!(database = %args.database.display(), "logging outcomes to sqlite");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();

    // the router and its log sinks are gone now; let the writer drain
    match tokio::time::timeout(Duration::from_secs(10), writer.shutdown()).await {
        Ok(stats) => tracing::info!(
            persisted = stats.persisted,
            dropped = stats.dropped,
            dead_lettered = stats.dead_lettered,
            "log pipeline drained"
        ),
        Err(_) => tracing::warn!("log pipeline did not drain in time"),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
