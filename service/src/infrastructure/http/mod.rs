use anyhow::Context;
use axum::Router;
use axum::routing::{get, post};
use axum_prometheus::PrometheusMetricLayer;
use serde_querystring::ParseMode;
use tokio::net;
use tower_http::add_extension::AddExtensionLayer;

use crate::domain::AppState;
use crate::infrastructure::http::handlers::health_check;
use crate::infrastructure::http::handlers::posts::{create_post, find_post, update_post};
use crate::infrastructure::http::handlers::requests::{
    find_duplicates, find_link_request, link_request_metrics, list_link_requests,
    reconcile_link_requests, review_link_request, review_link_requests,
};
use crate::infrastructure::http::querystring::QueryStringConfig;

mod api;
pub(crate) mod context;
mod handlers;
mod querystring;

/// Configuration for the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpServerConfig<'a> {
    pub port: &'a str,
}

/// The application's HTTP server. The underlying HTTP package is opaque to module consumers.
pub struct HttpServer {
    router: axum::Router,
    listener: net::TcpListener,
}

impl HttpServer {
    /// Returns a new HTTP server bound to the port specified in `config`.
    pub async fn new(state: impl AppState, config: HttpServerConfig<'_>) -> anyhow::Result<Self> {
        // see: https://github.com/Ptrskay3/axum-prometheus
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

        let router = api_router(state)
            .route("/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);

        let listener = net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
            .await
            .with_context(|| format!("failed to listen on {}", config.port))?;

        Ok(Self { router, listener })
    }

    /// Runs the HTTP server.
    pub async fn run(self) -> anyhow::Result<()> {
        let address = self
            .listener
            .local_addr()
            .context("listener has no local address")?;
        tracing::info!("listening on {}", address);
        axum::serve(self.listener, self.router)
            .await
            .context("received error from running server")?;
        Ok(())
    }
}

/// Health check plus every `/api` route, without the process-wide metrics recorder.
pub fn api_router<S: AppState>(state: S) -> Router {
    let trace_layer = tower_http::trace::TraceLayer::new_for_http().make_span_with(
        |request: &axum::extract::Request<_>| {
            let uri = request.uri().to_string();
            tracing::info_span!("http_request", method = ?request.method(), uri)
        },
    );

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .layer(AddExtensionLayer::new(QueryStringConfig::new(ParseMode::Duplicate)))
        .layer(trace_layer)
        .with_state(state)
}

fn api_routes<S: AppState>() -> Router<S> {
    Router::new()
        .route("/link-requests", get(list_link_requests::<S>))
        .route("/link-requests/review", post(review_link_requests::<S>))
        .route("/link-requests/reconcile", post(reconcile_link_requests::<S>))
        .route("/link-requests/duplicates", get(find_duplicates::<S>))
        .route("/link-requests/metrics", get(link_request_metrics::<S>))
        .route("/link-requests/{id}", get(find_link_request::<S>))
        .route("/link-requests/{id}/review", post(review_link_request::<S>))
        .route("/posts", post(create_post::<S>))
        .route("/posts/{id}", get(find_post::<S>).put(update_post::<S>))
}
