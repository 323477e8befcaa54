use axum::{
    extract::Request,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use log::info;
use std::any::Any;
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;

use crate::{
    error::ApiError,
    handlers::{
        create_person, delete_person, get_person, list_persons, liveness, patch_person, readiness,
    },
    state::AppState,
};

/// Builds the service router; person routes live under `path_prefix`.
pub fn build_router(state: AppState, path_prefix: &str) -> Router {
    let persons = Router::new()
        .route("/persons", get(list_persons).post(create_person))
        .route(
            "/persons/:person_id",
            get(get_person).patch(patch_person).delete(delete_person),
        );

    let health = Router::new()
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness));

    let router = match normalize_prefix(path_prefix) {
        Some(prefix) => health.nest(&prefix, persons),
        None => health.merge(persons),
    };

    router
        .layer(middleware::from_fn(log_request))
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

/// Returns `None` when routes should be mounted at the root.
fn normalize_prefix(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('/') {
        Some(trimmed.to_string())
    } else {
        Some(format!("/{trimmed}"))
    }
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        "event=http_request module=server method={} path={} status={} elapsed_ms={}",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

fn panic_response(_payload: Box<dyn Any + Send + 'static>) -> Response {
    ApiError::internal("internal server error").into_response()
}
