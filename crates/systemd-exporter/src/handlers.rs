//! HTTP router and request handlers.

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tower_http::compression::CompressionLayer;
use tracing::{debug, error};

use crate::exposition;
use crate::state::{AppState, release_memory_to_os};

/// Builds the exporter's router: telemetry path, landing page, health.
pub(crate) fn app(state: AppState) -> Router {
    let telemetry_path = state.telemetry_path.clone();
    Router::new()
        .route(&telemetry_path, get(handle_metrics))
        .route("/", get(handle_landing))
        .route("/health", get(handle_health))
        .with_state(state)
        .layer(CompressionLayer::new())
}

/// GET <telemetry path> - run one cycle and render it.
pub(crate) async fn handle_metrics(State(state): State<AppState>) -> Response {
    let source = state.source.clone();

    // Collection blocks on D-Bus and file reads
    let rendered = tokio::task::spawn_blocking(move || {
        let samples = source();
        let text = exposition::render_text(&samples);
        drop(samples);
        release_memory_to_os();
        text
    })
    .await;

    match rendered {
        Ok(Ok(body)) => {
            debug!(bytes = body.len(), "scrape rendered");
            ([(header::CONTENT_TYPE, exposition::CONTENT_TYPE)], body).into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, "encoding metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "encoding error").into_response()
        }
        Err(e) => {
            error!(error = %e, "collection panicked in spawn_blocking");
            (StatusCode::INTERNAL_SERVER_ERROR, "collection failed").into_response()
        }
    }
}

/// GET / - minimal landing page.
pub(crate) async fn handle_landing(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n<head><title>Systemd Exporter</title></head>\n<body>\n<h1>Systemd Exporter</h1>\n<p>Version {}</p>\n<p><a href=\"{}\">Metrics</a></p>\n</body>\n</html>\n",
        systemd_exporter_core::VERSION,
        state.telemetry_path
    ))
}

/// GET /health
pub(crate) async fn handle_health() -> &'static str {
    "ok"
}
