//! HTTP routes: index page and the metrics endpoint.

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tower_http::compression::CompressionLayer;
use tracing::debug;

use gpuprom_core::exposition::{self, CONTENT_TYPE};

use crate::state::SharedState;

const INDEX_HTML: &str = r#"<!doctype html>
<html>
    <head>
        <meta charset="utf-8">
        <title>Nvidia SMI Exporter</title>
    </head>
    <body>
        <h1>Nvidia SMI Exporter</h1>
        <p><a href="/metrics">Metrics</a></p>
    </body>
</html>
"#;

pub(crate) fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/metrics", get(handle_metrics))
        .with_state(state)
        .layer(CompressionLayer::new())
}

pub(crate) async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Renders the current snapshot. 503 until the first refresh succeeded.
pub(crate) async fn handle_metrics(State(state): State<SharedState>) -> Response {
    let Some(snapshot) = state.store.current() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "no snapshot collected yet\n",
        )
            .into_response();
    };
    let body = exposition::render(&snapshot);
    debug!(
        bytes = body.len(),
        timestamp = snapshot.timestamp,
        "metrics scraped"
    );
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
}
