// Transaction endpoints: passthrough, proof and outpoint spend lookups.

use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use tracing::debug;

use super::helpers::{error_response, require_node};
use super::types::SpendQuery;
use super::ApiContext;
use crate::query;

/// GET /getTransaction/{id}: verbose passthrough to the node.
pub async fn get_transaction(
    Path(id): Path<String>,
    Extension(ctx): Extension<ApiContext>,
) -> Response {
    debug!(txid = %id, "raw transaction lookup");
    let node = match require_node(&ctx) {
        Ok(node) => node,
        Err(response) => return response,
    };
    match node.get_raw_transaction(&id, true).await {
        Ok(tx) => Json(tx).into_response(),
        Err(e) => (StatusCode::NOT_FOUND, e.message).into_response(),
    }
}

/// GET /getTransactionProof/{id}: containing block plus the headers of
/// the blocks preceding it.
pub async fn get_transaction_proof(
    Path(id): Path<String>,
    Extension(ctx): Extension<ApiContext>,
) -> Response {
    match query::transaction_proof(&ctx.db, ctx.reader.as_ref(), &id) {
        Ok(proof) => Json(proof).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /outpointSpend/{txid}/{vout}?raw,unconfirmed
pub async fn outpoint_spend(
    Path((txid, vout)): Path<(String, u32)>,
    Query(params): Query<SpendQuery>,
    Extension(ctx): Extension<ApiContext>,
) -> Response {
    let result = query::outpoint_spend(
        &ctx.db,
        ctx.mempool.as_ref(),
        ctx.node.as_deref(),
        &txid,
        vout,
        params.raw != 0,
        params.unconfirmed != 0,
    )
    .await;
    match result {
        Ok(spend) => Json(spend).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /outpointSpends: JSON array of {txid, vout}.
pub async fn outpoint_spends(
    Query(params): Query<SpendQuery>,
    Extension(ctx): Extension<ApiContext>,
    Json(items): Json<Value>,
) -> Response {
    let result = query::outpoint_spends(
        &ctx.db,
        ctx.mempool.as_ref(),
        ctx.node.as_deref(),
        &items,
        params.raw != 0,
        params.unconfirmed != 0,
    )
    .await;
    match result {
        Ok(spends) => Json(spends).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /sendRawTransaction: hex body, broadcast through the node.
pub async fn send_raw_transaction(
    Extension(ctx): Extension<ApiContext>,
    body: String,
) -> Response {
    let node = match require_node(&ctx) {
        Ok(node) => node,
        Err(response) => return response,
    };
    match node.send_raw_transaction(body.trim()).await {
        Ok(txid) => txid.into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.message).into_response(),
    }
}
