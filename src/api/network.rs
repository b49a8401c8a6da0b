// Service-level endpoints: mempool view, sync progress, metrics.

use axum::extract::Extension;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::helpers::error_response;
use super::ApiContext;
use crate::{metrics, query};

/// GET /mempool: ids of the mirrored unconfirmed transactions.
pub async fn mempool(Extension(ctx): Extension<ApiContext>) -> Response {
    Json(ctx.mempool.tx_ids()).into_response()
}

/// GET /sync: indexed height vs. the node's chain height.
pub async fn sync(Extension(ctx): Extension<ApiContext>) -> Response {
    match query::sync_status(&ctx.db, ctx.node.as_deref()).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /metrics: Prometheus text exposition.
pub async fn metrics_handler() -> Response {
    metrics::gather().into_response()
}
