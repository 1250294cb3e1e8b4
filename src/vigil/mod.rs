//! HTTP surface: routes, request tracing and the `OpenAPI` document.

use crate::auth::{AuthorizationGate, Coordinator};
use anyhow::Result;
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{HeaderName, HeaderValue, Request},
    routing::options,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

const REQUEST_ID: &str = "x-request-id";

/// Build the full application router around a coordinator.
///
/// The gate shares the coordinator's token service, so tokens issued by
/// register/login are exactly the ones `/api/auth/me` accepts.
#[must_use]
pub fn router(coordinator: Arc<Coordinator>) -> Router {
    let gate = Arc::new(AuthorizationGate::new(coordinator.tokens().clone()));

    let (router, openapi) = openapi::api_router().split_for_parts();

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
        .route("/health", options(handlers::health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(coordinator))
                .layer(Extension(gate)),
        )
}

/// Start the server
/// # Errors
/// Return error if the listener cannot be bound or the server fails
pub async fn new(port: u16, coordinator: Arc<Coordinator>) -> Result<()> {
    let app = router(coordinator);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                // Without a signal handler, run until killed.
                error!("Failed to listen for shutdown signal: {err}");
                std::future::pending::<()>().await;
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
