use core::net::SocketAddr;

use anyhow::{Error as AnyhowError, Result};
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use log::info;
use prometheus::TextEncoder;

/// Serves `GET /metrics` in the Prometheus text format.
pub async fn run_metrics_server(address: SocketAddr) -> Result<()> {
    info!("metrics server is listening on {address}");

    let router = Router::new().route("/metrics", get(prometheus_metrics));

    let listener = tokio::net::TcpListener::bind(address).await?;

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(AnyhowError::new)
}

async fn prometheus_metrics() -> impl IntoResponse {
    let mut buffer = String::new();

    match TextEncoder::new().encode_utf8(prometheus::gather().as_slice(), &mut buffer) {
        Ok(()) => (StatusCode::OK, buffer),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {error}"),
        ),
    }
}
