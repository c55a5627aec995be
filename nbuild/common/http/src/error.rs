use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// The JSON error body every failing endpoint in spec 6 returns:
/// `{"Error": "..."}`.
#[derive(Serialize)]
pub(crate) struct ErrorBody {
    #[serde(rename = "Error")]
    error: String,
}

pub(crate) fn json_error(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

pub(crate) fn graph_error_status(err: &nbuild_graph::Error) -> StatusCode {
    match err {
        nbuild_graph::Error::UnknownSpec(_) | nbuild_graph::Error::UnknownPackage { .. } => {
            StatusCode::NOT_FOUND
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
