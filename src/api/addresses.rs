// Address endpoints: balance and received-output listings.

use axum::extract::{Extension, Path, Query};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::debug;

use super::helpers::error_response;
use super::types::{BalanceQuery, TxoQuery};
use super::ApiContext;
use crate::query;

/// GET /addressBalance/{address}?details=0|1
pub async fn address_balance(
    Path(address): Path<String>,
    Query(params): Query<BalanceQuery>,
    Extension(ctx): Extension<ApiContext>,
) -> Response {
    debug!(address = %address, "balance lookup");
    match query::address_balance(&ctx.db, ctx.mempool.as_ref(), &address) {
        Ok(balance) if params.details != 0 => Json(balance).into_response(),
        Ok(balance) => balance.balance.to_string().into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /addressTxos/{address}
pub async fn address_txos(
    Path(address): Path<String>,
    Query(params): Query<TxoQuery>,
    Extension(ctx): Extension<ApiContext>,
) -> Response {
    address_txos_inner(ctx, address, 0, params).await
}

/// GET /addressTxosSince/{sinceBlock}/{address}
///
/// A since value at or past 2000-01-01 as a Unix timestamp selects by
/// block time, anything lower by height.
pub async fn address_txos_since(
    Path((since_block, address)): Path<(i64, String)>,
    Query(params): Query<TxoQuery>,
    Extension(ctx): Extension<ApiContext>,
) -> Response {
    address_txos_inner(ctx, address, since_block, params).await
}

async fn address_txos_inner(
    ctx: ApiContext,
    address: String,
    since_block: i64,
    params: TxoQuery,
) -> Response {
    debug!(address = %address, since_block, "txo listing");
    let result = query::address_txos(
        &ctx.db,
        ctx.mempool.as_ref(),
        ctx.node.as_deref(),
        &address,
        since_block,
        params.flags(),
    )
    .await;
    match result {
        Ok(txos) => Json(txos).into_response(),
        Err(e) => error_response(e),
    }
}
