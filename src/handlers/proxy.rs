use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::models::GatewayRequest;
use crate::state::AppState;

// Every path not served locally lands here
pub async fn proxy_handler(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let request = GatewayRequest::new(req.method().as_str(), req.uri().path(), client);
    let response = state.gateway.handle(request).await;

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(response.body)).into_response()
}
