// Shared handler utilities.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::ApiContext;
use crate::query::QueryError;
use crate::rpc::NodeRpc;

/// Map the error taxonomy onto HTTP statuses: missing keys are 404, the
/// remote oracle's complaints are 400, store failures are 500.
pub fn error_response(e: QueryError) -> Response {
    match e {
        QueryError::NotFound(message) => (StatusCode::NOT_FOUND, message).into_response(),
        QueryError::Oracle(message) => (StatusCode::BAD_REQUEST, message).into_response(),
        QueryError::Store(message) => {
            (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
        }
    }
}

/// Passthrough endpoints need the node; answer 400 when it is unconfigured.
pub fn require_node(ctx: &ApiContext) -> Result<&NodeRpc, Response> {
    ctx.node.as_deref().ok_or_else(|| {
        (StatusCode::BAD_REQUEST, "no RPC node configured").into_response()
    })
}
