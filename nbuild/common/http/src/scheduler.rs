//! Scheduler HTTP API (spec 6), mounted under `/api/scheduler`: the
//! build-completion webhook that drives `Reconstruct`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

use nbuild_scheduler::Scheduler;

pub fn router(scheduler: Arc<Scheduler>) -> Router {
    Router::new()
        .route("/done", get(done))
        .with_state(scheduler)
}

async fn done(State(scheduler): State<Arc<Scheduler>>) -> StatusCode {
    let ok = tokio::task::spawn_blocking(move || scheduler.reconstruct())
        .await
        .unwrap_or(false);
    if ok {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
