use api_gateway::backend::{AlwaysFail, Backend, FixedLatency, NeverFail, SimulatedBackend};
use api_gateway::clock::{Clock, ManualClock, SystemClock};
use api_gateway::dispatcher::{Dispatcher, Route};
use api_gateway::gateway::Gateway;
use api_gateway::models::GatewayRequest;
use api_gateway::pipeline::{LogWriterHandle, PipelineConfig, spawn_log_pipeline};
use api_gateway::rate_limit::RateLimiter;
use api_gateway::store::SqliteLogStore;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    gateway: Gateway,
    writer: LogWriterHandle,
    store: Arc<SqliteLogStore>,
}

fn harness(limit: u32, clock: Arc<dyn Clock>) -> Harness {
    let users: Arc<dyn Backend> =
        Arc::new(SimulatedBackend::new("users", FixedLatency(Duration::from_millis(10)), NeverFail));
    let broken: Arc<dyn Backend> =
        Arc::new(SimulatedBackend::new("broken", FixedLatency(Duration::from_millis(10)), AlwaysFail));
    let dispatcher = Dispatcher::new(
        vec![users, broken],
        vec![Route::new("/api/users", "users"), Route::new("/api/broken", "broken")],
    )
    .unwrap();

    let store = Arc::new(SqliteLogStore::in_memory().unwrap());
    let (sink, writer) = spawn_log_pipeline(store.clone(), PipelineConfig::default());
    let gateway = Gateway::new(
        Arc::new(RateLimiter::new(limit, Duration::from_secs(60))),
        Arc::new(dispatcher),
        sink,
        clock,
    );

    Harness { gateway, writer, store }
}

impl Harness {
    // Drop the gateway so the writer can finish, then return the store
    async fn finish(self) -> Arc<SqliteLogStore> {
        drop(self.gateway);
        self.writer.shutdown().await;
        self.store
    }
}

#[tokio::test]
async fn fifteen_requests_from_one_client() {
    let h = harness(10, Arc::new(SystemClock));

    let mut statuses = Vec::new();
    for _ in 0..15 {
        let res = h
            .gateway
            .handle(GatewayRequest::new("GET", "/api/users", "192.168.1.20"))
            .await;
        statuses.push(res.status);
    }

    assert!(statuses[..10].iter().all(|s| *s == 200));
    assert!(statuses[10..].iter().all(|s| *s == 429));

    let store = h.finish().await;
    let rows = store.records(None).unwrap();
    assert_eq!(rows.len(), 15);

    let throttled: Vec<_> = rows.iter().filter(|r| r.record.status_code == 429).collect();
    assert_eq!(throttled.len(), 5);
    assert!(throttled.iter().all(|r| r.record.is_error));
    assert!(rows[..10].iter().all(|r| !r.record.is_error && r.record.response_time_ms >= 10));
}

#[tokio::test]
async fn unknown_endpoint_is_404_and_logged_once() {
    let h = harness(10, Arc::new(SystemClock));

    let res = h
        .gateway
        .handle(GatewayRequest::new("GET", "/api/unknown", "10.1.1.1"))
        .await;
    assert_eq!(res.status, 404);
    assert_eq!(res.body["message"], "Service not found.");

    let store = h.finish().await;
    let rows = store.records(None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].record.endpoint, "/api/unknown");
    assert_eq!(rows[0].record.status_code, 404);
    assert!(rows[0].record.is_error);
    assert!(rows[0].record.response_time_ms <= 1);
}

#[tokio::test]
async fn backend_failure_is_passed_through_and_logged() {
    let h = harness(10, Arc::new(SystemClock));

    let res = h
        .gateway
        .handle(GatewayRequest::new("DELETE", "/api/broken", "10.1.1.2"))
        .await;
    assert_eq!(res.status, 500);

    let store = h.finish().await;
    let summary = store.summary(None).unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.errors, 1);
    let stats = store.endpoint_stats(None).unwrap();
    assert_eq!(stats[0].http_method, "DELETE");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_burst_admits_at_most_limit() {
    let limit = 10;
    let h = harness(limit, Arc::new(SystemClock));
    let gateway = Arc::new(h.gateway.clone());

    let tasks: Vec<_> = (0..2 * limit)
        .map(|_| {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                gateway
                    .handle(GatewayRequest::new("GET", "/api/users", "203.0.113.7"))
                    .await
                    .status
            })
        })
        .collect();

    let mut admitted = 0;
    let mut throttled = 0;
    for task in tasks {
        match task.await.unwrap() {
            200 => admitted += 1,
            429 => throttled += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(admitted, limit);
    assert_eq!(throttled, limit);

    drop(gateway);
    let store = h.finish().await;
    let summary = store.summary(None).unwrap();
    assert_eq!(summary.total, 2 * limit as u64);
    assert_eq!(summary.errors, limit as u64);
}

#[tokio::test]
async fn window_reset_admits_again() {
    let clock = Arc::new(ManualClock::new());
    let h = harness(3, clock.clone());
    let req = || GatewayRequest::new("GET", "/api/users", "client-a");

    for _ in 0..3 {
        assert_eq!(h.gateway.handle(req()).await.status, 200);
    }
    assert_eq!(h.gateway.handle(req()).await.status, 429);

    clock.advance(Duration::from_secs(60) + Duration::from_millis(1));
    assert_eq!(h.gateway.handle(req()).await.status, 200);

    // another client was never affected
    assert_eq!(
        h.gateway
            .handle(GatewayRequest::new("GET", "/api/users", "client-b"))
            .await
            .status,
        200
    );

    let store = h.finish().await;
    assert_eq!(store.count().unwrap(), 6);
}

#[tokio::test]
async fn outcome_is_logged_when_caller_stops_waiting() {
    let slow: Arc<dyn Backend> =
        Arc::new(SimulatedBackend::new("slow", FixedLatency(Duration::from_millis(200)), NeverFail));
    let dispatcher =
        Dispatcher::new(vec![slow], vec![Route::new("/api/slow", "slow")]).unwrap();
    let store = Arc::new(SqliteLogStore::in_memory().unwrap());
    let (sink, writer) = spawn_log_pipeline(store.clone(), PipelineConfig::default());
    let gateway = Gateway::new(
        Arc::new(RateLimiter::new(10, Duration::from_secs(60))),
        Arc::new(dispatcher),
        sink,
        Arc::new(SystemClock),
    );

    let result = tokio::time::timeout(
        Duration::from_millis(20),
        gateway.handle(GatewayRequest::new("GET", "/api/slow", "10.9.9.9")),
    )
    .await;
    assert!(result.is_err());
    assert_eq!(gateway.limiter().window_of("10.9.9.9").unwrap().count, 1);

    // the detached dispatch keeps its own sink until it finishes
    drop(gateway);
    let stats = writer.shutdown().await;

    assert_eq!(stats.submitted, 1);
    assert_eq!(stats.dropped, 0);
    let rows = store.records(None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].record.status_code, 200);
    assert!(rows[0].record.response_time_ms >= 200);
}

#[tokio::test]
async fn unknown_paths_consume_quota_before_routing() {
    let h = harness(3, Arc::new(SystemClock));
    let client = "198.51.100.4";

    let mut statuses = Vec::new();
    for path in ["/api/unknown", "/api/other", "/api/users", "/api/users", "/api/unknown"] {
        let res = h.gateway.handle(GatewayRequest::new("GET", path, client)).await;
        statuses.push(res.status);
    }
    assert_eq!(statuses, vec![404, 404, 200, 429, 429]);
    assert_eq!(h.gateway.limiter().window_of(client).unwrap().count, 5);

    let store = h.finish().await;
    let summary = store.summary(None).unwrap();
    assert_eq!(summary.total, 5);
    assert_eq!(summary.errors, 4);

    let stats = store.endpoint_stats(None).unwrap();
    let calls = |endpoint: &str| {
        stats
            .iter()
            .find(|s| s.endpoint == endpoint)
            .map(|s| (s.total_calls, s.error_count))
            .unwrap()
    };
    assert_eq!(calls("/api/unknown"), (2, 2));
    assert_eq!(calls("/api/other"), (1, 1));
    assert_eq!(calls("/api/users"), (2, 1));
}
