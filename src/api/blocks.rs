// Block endpoints: listings, single block, per-block transactions.

use axum::extract::{Extension, Path, Query};
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::helpers::error_response;
use super::types::{BlocksQuery, DateRangeQuery};
use super::ApiContext;
use crate::query;

/// GET /blocks?limit=N: latest blocks, descending, capped at 100.
pub async fn blocks(
    Query(params): Query<BlocksQuery>,
    Extension(ctx): Extension<ApiContext>,
) -> Response {
    match query::blocks(&ctx.db, params.limit) {
        Ok(list) => Json(list).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /blocksbydate?start=T&end=T: blocks with time in [start, end].
pub async fn blocks_by_date(
    Query(params): Query<DateRangeQuery>,
    Extension(ctx): Extension<ApiContext>,
) -> Response {
    match query::blocks_by_date(&ctx.db, params.start, params.end) {
        Ok(list) => Json(list).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /block/{hash}
pub async fn block(
    Path(hash): Path<String>,
    Extension(ctx): Extension<ApiContext>,
) -> Response {
    match query::block(&ctx.db, ctx.reader.as_ref(), &hash) {
        Ok(block) => Json(block).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /blocktxs/{hash}/{page}: 10 transactions per page.
pub async fn block_transactions(
    Path((hash, page)): Path<(String, usize)>,
    Extension(ctx): Extension<ApiContext>,
) -> Response {
    match query::block_transactions(&ctx.db, ctx.reader.as_ref(), ctx.solver.as_ref(), &hash, page)
    {
        Ok(txs) => Json(txs).into_response(),
        Err(e) => error_response(e),
    }
}
