//! Graph HTTP API (spec 6), mounted under `/api/graph`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use nbuild_graph::Manager;
use nbuild_types::SpecTuple;

use crate::error::{graph_error_status, json_error};

pub fn router(manager: Arc<Manager>) -> Router {
    Router::new()
        .route("/atom/:host/:target", get(get_atom))
        .route("/pkgs/:host/:target/:pkg", get(get_pkg))
        .route("/dirty/:host/:target", get(get_dirty))
        .route("/dispatchable", get(get_dispatchable))
        .route("/pkgs/:host/:target/:pkg/fail", post(post_fail))
        .route("/pkgs/:host/:target/:pkg/unfail", post(post_unfail))
        .route("/clean/:target", post(post_clean))
        .route("/syncto/:sha", post(post_syncto))
        .with_state(manager)
}

fn graph_error_response(err: nbuild_graph::Error) -> Response {
    json_error(graph_error_status(&err), err)
}

async fn get_atom(
    State(manager): State<Arc<Manager>>,
    Path((host, target)): Path<(String, String)>,
) -> Response {
    match manager.get_atom(&SpecTuple::new(host, target)) {
        Ok(atom) => Json(atom).into_response(),
        Err(err) => graph_error_response(err),
    }
}

async fn get_pkg(
    State(manager): State<Arc<Manager>>,
    Path((host, target, pkg)): Path<(String, String, String)>,
) -> Response {
    match manager.get_pkg(&SpecTuple::new(host, target), &pkg) {
        Ok(pkg) => Json(pkg).into_response(),
        Err(err) => graph_error_response(err),
    }
}

#[derive(Serialize)]
struct DirtyDump {
    #[serde(rename = "Rev")]
    rev: String,
    #[serde(rename = "Pkgs")]
    pkgs: Vec<nbuild_types::Package>,
}

async fn get_dirty(
    State(manager): State<Arc<Manager>>,
    Path((host, target)): Path<(String, String)>,
) -> Response {
    let spec = SpecTuple::new(host, target);
    match (manager.get_atom(&spec), manager.get_dirty(&spec)) {
        (Ok(atom), Ok(pkgs)) => Json(DirtyDump { rev: atom.rev, pkgs }).into_response(),
        (Err(err), _) | (_, Err(err)) => graph_error_response(err),
    }
}

#[derive(Serialize)]
struct DispatchableDump {
    #[serde(rename = "Pkgs")]
    pkgs: HashMap<String, Vec<String>>,
    #[serde(rename = "Revision")]
    revision: String,
}

async fn get_dispatchable(State(manager): State<Arc<Manager>>) -> Response {
    let pkgs = manager
        .get_dispatchable()
        .into_iter()
        .map(|(spec, pkgs)| (spec.to_string(), pkgs.into_iter().map(|p| p.name).collect()))
        .collect();
    Json(DispatchableDump {
        pkgs,
        revision: manager.current_rev(),
    })
    .into_response()
}

async fn post_fail(
    State(manager): State<Arc<Manager>>,
    Path((host, target, pkg)): Path<(String, String, String)>,
) -> Response {
    match manager.fail_pkg(&SpecTuple::new(host, target), &pkg) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => graph_error_response(err),
    }
}

async fn post_unfail(
    State(manager): State<Arc<Manager>>,
    Path((host, target, pkg)): Path<(String, String, String)>,
) -> Response {
    match manager.unfail_pkg(&SpecTuple::new(host, target), &pkg) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => graph_error_response(err),
    }
}

async fn post_clean(State(manager): State<Arc<Manager>>, Path(target): Path<String>) -> Response {
    match manager.clean_target(&target).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => json_error(StatusCode::INTERNAL_SERVER_ERROR, err),
    }
}

async fn post_syncto(State(manager): State<Arc<Manager>>, Path(sha): Path<String>) -> Response {
    if let Err(err) = manager.update_checkout().await {
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, err);
    }
    if let Err(err) = manager.sync_to(&sha).await {
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, err);
    }
    if let Err(err) = manager.clean().await {
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, err);
    }
    StatusCode::NO_CONTENT.into_response()
}
