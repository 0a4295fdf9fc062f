use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use common_observability::BridgeMetrics;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

async fn index() -> &'static str {
    "See: /health, /metrics"
}

async fn health() -> &'static str {
    "healthy"
}

async fn render_metrics(State(metrics): State<BridgeMetrics>) -> Response {
    match metrics.gather_text() {
        Ok(body) => ([(header::CONTENT_TYPE, metrics.content_type())], body).into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn router(bridge_metrics: BridgeMetrics) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .with_state(bridge_metrics)
}

pub async fn serve(addr: SocketAddr, metrics: BridgeMetrics) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "starting audit-bridge http server");
    axum::serve(listener, router(metrics)).await?;
    Ok(())
}
