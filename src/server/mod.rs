//! HTTP server glue.
//!
//! Thin axum layer over the [`Service`](crate::service::Service): open a
//! context, fetch playlists, fetch segments, stream progressive content.
//! All domain errors map to HTTP statuses via
//! [`vf_core::Error::http_status`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::service::Service;

pub mod routes_stream;

/// Shared application context.
#[derive(Clone)]
pub struct AppContext {
    pub service: Arc<Service>,
}

/// Wrapper turning domain errors into HTTP responses.
pub struct AppError(pub vf_core::Error);

impl From<vf_core::Error> for AppError {
    fn from(err: vf_core::Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!("request failed: {}", self.0);
        }
        (status, self.0.to_string()).into_response()
    }
}

/// Create the axum router with all routes.
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .route("/play", post(routes_stream::play))
        .route("/status", get(routes_stream::status))
        .route("/video/:id/index.m3u8", get(routes_stream::playlist))
        .route(
            "/video/:id/:spec/index.m3u8",
            get(routes_stream::variant_playlist),
        )
        .route("/video/:id/:spec/:segment", get(routes_stream::segment))
        .route("/video/:id/content", get(routes_stream::content))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> &'static str {
    "ok"
}

/// Bind and serve until ctrl-c.
pub async fn start_server(service: Arc<Service>) -> anyhow::Result<()> {
    let host = service.config().server.host.clone();
    let port = service.config().server.port;
    let app = create_router(AppContext {
        service: service.clone(),
    });

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!("listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    service.stop().await;
    Ok(())
}
