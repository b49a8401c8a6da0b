//! Read paths.
//!
//! Every query is a point lookup or a bounded prefix scan over the
//! keyspace, recombined with the mempool mirror and (for raw passthrough)
//! the remote node. Queries never mutate the store.

use rocksdb::{Direction, IteratorMode, DB};
use serde_json::{json, Value};
use std::fmt;

use crate::block_reader::BlockReader;
use crate::keyspace;
use crate::mempool::MempoolMonitor;
use crate::progress;
use crate::rpc::NodeRpc;
use crate::script_solver::ScriptSolver;

/// A since-block parameter at or above this value is a Unix timestamp
/// (2000-01-01), below it a block height.
pub const BLOCK_TIME_CROSSOVER: i64 = 946_702_800;

const TXS_PER_PAGE: usize = 10;
const BLOCKS_LIMIT_CAP: u64 = 100;

#[derive(Debug)]
pub enum QueryError {
    /// Missing key, unknown tx or block.
    NotFound(String),
    /// The remote node rejected or failed the call.
    Oracle(String),
    /// Store I/O or decode failure.
    Store(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueryError::NotFound(m) | QueryError::Oracle(m) | QueryError::Store(m) => {
                write!(f, "{}", m)
            }
        }
    }
}

impl std::error::Error for QueryError {}

impl From<rocksdb::Error> for QueryError {
    fn from(e: rocksdb::Error) -> Self {
        QueryError::Store(e.to_string())
    }
}

fn get_string(db: &DB, key: &str) -> Result<Option<String>, QueryError> {
    Ok(db
        .get(key)?
        .map(|bytes| String::from_utf8_lossy(&bytes).to_string()))
}

fn get_i64(db: &DB, key: &str) -> Result<i64, QueryError> {
    Ok(get_string(db, key)?
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(0))
}

/// Collect the decoded rows of an address's received-output log.
fn address_txo_rows(db: &DB, address: &str) -> Result<Vec<keyspace::TxoRow>, QueryError> {
    let prefix = keyspace::address_txo_prefix(address);
    let (start, limit) = keyspace::ordinal_bounds(&prefix);
    let mut rows = Vec::new();
    let iter = db.iterator(IteratorMode::From(start.as_bytes(), Direction::Forward));
    for item in iter {
        let (key, value) = item?;
        if key.as_ref() >= limit.as_bytes() {
            break;
        }
        let text = String::from_utf8_lossy(&value);
        if let Some(row) = keyspace::decode_txo_row(&text) {
            rows.push(row);
        }
    }
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AddressBalance {
    pub balance: i64,
    #[serde(rename = "txCount")]
    pub tx_count: u64,
    #[serde(rename = "unconfirmedBalance")]
    pub unconfirmed_balance: i64,
    #[serde(rename = "unconfirmedTxCount")]
    pub unconfirmed_tx_count: u64,
}

/// Confirmed and mempool-aware balance of one address.
pub fn address_balance(
    db: &DB,
    mempool: &dyn MempoolMonitor,
    address: &str,
) -> Result<AddressBalance, QueryError> {
    let mut result = AddressBalance {
        balance: 0,
        tx_count: 0,
        unconfirmed_balance: 0,
        unconfirmed_tx_count: 0,
    };

    for row in address_txo_rows(db, address)? {
        result.tx_count += 1;
        let spent = get_string(db, &keyspace::txo_spent(&row.tx_hash, row.vout))?;
        if spent.is_none() {
            result.balance += row.value;
            match mempool.outpoint_spend(&row.tx_hash, row.vout) {
                None => result.unconfirmed_balance += row.value,
                Some(_) => result.unconfirmed_tx_count += 1,
            }
        } else {
            // The receive and the spend both count as transactions.
            result.tx_count += 1;
        }
    }

    for txo in mempool.txos_for_address(address) {
        result.unconfirmed_tx_count += 1;
        match mempool.outpoint_spend(&txo.tx_hash, txo.index) {
            None => result.unconfirmed_balance += txo.value,
            Some(_) => result.unconfirmed_tx_count += 1,
        }
    }

    Ok(result)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TxoQueryFlags {
    pub tx_hash_only: bool,
    pub raw: bool,
    pub unspent: bool,
    pub unconfirmed: bool,
    pub script: bool,
}

/// True when a row at (height, block_time) passes the since gate.
fn txo_passes_since(since_block: i64, height: i64, block_time: i64) -> bool {
    if since_block < BLOCK_TIME_CROSSOVER {
        height >= since_block
    } else {
        block_time >= since_block
    }
}

/// The received-output listing of an address, gated by height or time and
/// optionally joined with the mempool and the remote node.
pub async fn address_txos(
    db: &DB,
    mempool: &dyn MempoolMonitor,
    node: Option<&NodeRpc>,
    address: &str,
    since_block: i64,
    flags: TxoQueryFlags,
) -> Result<Vec<Value>, QueryError> {
    let mut results = Vec::new();

    for row in address_txo_rows(db, address)? {
        let block_time = get_i64(db, &keyspace::block_time(row.height))?;
        if !txo_passes_since(since_block, row.height as i64, block_time) {
            continue;
        }

        let mut txo = json!({
            "height": row.height,
            "time": block_time,
        });

        let spent = get_string(db, &keyspace::txo_spent(&row.tx_hash, row.vout))?;
        match spent {
            None => {
                if flags.unconfirmed {
                    match mempool.outpoint_spend(&row.tx_hash, row.vout) {
                        None => txo["spender"] = Value::Null,
                        Some(spender) => {
                            if flags.unspent {
                                continue;
                            }
                            txo["spender"] = json!(spender);
                        }
                    }
                } else {
                    txo["spender"] = Value::Null;
                }
            }
            Some(pointer) => {
                if flags.unspent {
                    continue;
                }
                match keyspace::decode_spend_pointer(&pointer) {
                    Some(ptr) => txo["spender"] = json!(ptr.tx_hash),
                    None => txo["spender"] = Value::Null,
                }
            }
        }

        if flags.raw {
            let node = node.ok_or_else(|| QueryError::Oracle("no RPC node configured".into()))?;
            let tx = node
                .get_raw_transaction(&row.tx_hash, false)
                .await
                .map_err(|e| QueryError::Oracle(e.message))?;
            txo["tx"] = tx;
        }

        if !flags.raw && flags.script {
            let node = node.ok_or_else(|| QueryError::Oracle("no RPC node configured".into()))?;
            let tx = node
                .get_raw_transaction(&row.tx_hash, true)
                .await
                .map_err(|e| QueryError::Oracle(e.message))?;
            let script_hex = tx
                .pointer(&format!("/vout/{}/scriptPubKey/hex", row.vout))
                .cloned()
                .unwrap_or(Value::Null);
            txo["script"] = script_hex;
        }

        if flags.raw && txo["spender"].is_string() {
            let node = node.ok_or_else(|| QueryError::Oracle("no RPC node configured".into()))?;
            let spender = txo["spender"].as_str().unwrap_or_default().to_string();
            let tx = node
                .get_raw_transaction(&spender, false)
                .await
                .map_err(|e| QueryError::Oracle(e.message))?;
            txo["spender"] = tx;
        }

        if !flags.raw {
            txo["txhash"] = json!(row.tx_hash);
            if !flags.tx_hash_only {
                txo["vout"] = json!(row.vout);
                txo["value"] = json!(row.value);
            }
        }

        results.push(txo);
    }

    if flags.unconfirmed {
        for pending in mempool.txos_for_address(address) {
            let spender = mempool.outpoint_spend(&pending.tx_hash, pending.index);
            results.push(json!({
                "txhash": pending.tx_hash,
                "vout": pending.index,
                "value": pending.value,
                "block": 0,
                "spender": spender,
            }));
        }
    }

    Ok(results)
}

/// Spend status of a single outpoint, without raw substitution.
fn outpoint_spend_status(
    db: &DB,
    mempool: &dyn MempoolMonitor,
    txid: &str,
    vout: u32,
    unconfirmed: bool,
) -> Result<Value, QueryError> {
    let mut result = json!({ "error": false });

    if get_string(db, &keyspace::tx_block(txid))?.is_none() {
        result["error"] = json!(true);
        result["errorDescription"] = json!("Transaction ID not found");
        return Ok(result);
    }

    match get_string(db, &keyspace::txo_spent(txid, vout))? {
        Some(pointer) => {
            result["spent"] = json!(true);
            if let Some(ptr) = keyspace::decode_spend_pointer(&pointer) {
                result["spender"] = json!(ptr.tx_hash);
                let height_key = keyspace::block_height_for_hash(&ptr.block_hash);
                if let Some(height) = get_string(db, &height_key)?.and_then(|h| h.parse::<u64>().ok())
                {
                    result["height"] = json!(height);
                }
            }
        }
        None => {
            result["spent"] = json!(false);
            if unconfirmed {
                if let Some(spender) = mempool.outpoint_spend(txid, vout) {
                    result["spent"] = json!(true);
                    result["spender"] = json!(spender);
                    result["height"] = json!(0);
                }
            }
        }
    }

    Ok(result)
}

/// Replace the spender hash with the raw spending transaction.
async fn attach_raw_spender(node: &NodeRpc, result: &mut Value) -> Result<(), QueryError> {
    if let Some(spender) = result["spender"].as_str().map(String::from) {
        let tx = node
            .get_raw_transaction(&spender, false)
            .await
            .map_err(|e| QueryError::Oracle(e.message))?;
        result["spenderRaw"] = tx;
        result["spender"] = Value::Null;
    }
    Ok(())
}

pub async fn outpoint_spend(
    db: &DB,
    mempool: &dyn MempoolMonitor,
    node: Option<&NodeRpc>,
    txid: &str,
    vout: u32,
    raw: bool,
    unconfirmed: bool,
) -> Result<Value, QueryError> {
    let mut result = outpoint_spend_status(db, mempool, txid, vout, unconfirmed)?;
    if raw {
        if let Some(node) = node {
            attach_raw_spender(node, &mut result).await?;
        }
    }
    Ok(result)
}

/// Batched form: each element is checked independently; malformed elements
/// are skipped, raw-fetch failures leave the element without raw bytes.
pub async fn outpoint_spends(
    db: &DB,
    mempool: &dyn MempoolMonitor,
    node: Option<&NodeRpc>,
    items: &Value,
    raw: bool,
    unconfirmed: bool,
) -> Result<Vec<Value>, QueryError> {
    let mut results = Vec::new();
    let Some(items) = items.as_array() else {
        return Ok(results);
    };

    for item in items {
        let (Some(txid), Some(vout)) = (
            item.get("txid").and_then(|v| v.as_str()),
            item.get("vout").and_then(|v| v.as_u64()),
        ) else {
            continue;
        };

        let mut result = outpoint_spend_status(db, mempool, txid, vout as u32, unconfirmed)?;
        result["txid"] = json!(txid);
        result["vout"] = json!(vout);

        if raw {
            if let Some(node) = node {
                if let Err(e) = attach_raw_spender(node, &mut result).await {
                    tracing::warn!(txid = %txid, error = %e, "raw spender fetch failed");
                }
            }
        }

        results.push(result);
    }

    Ok(results)
}

fn block_summary(db: &DB, hash: &str, height: u64) -> Result<Value, QueryError> {
    Ok(json!({
        "hash": hash,
        "height": height,
        "size": get_i64(db, &keyspace::block_size(height))?,
        "time": get_i64(db, &keyspace::block_time(height))?,
        "txlength": get_i64(db, &keyspace::block_tx_count(height))?,
        "poolInfo": Value::Null,
    }))
}

/// The latest blocks in descending height order, at most `limit` (cap 100).
pub fn blocks(db: &DB, limit: u64) -> Result<Vec<Value>, QueryError> {
    let Some(highest) = progress::highest_block(db)? else {
        return Ok(Vec::new());
    };
    let limit = if limit == 0 || limit > BLOCKS_LIMIT_CAP {
        BLOCKS_LIMIT_CAP
    } else {
        limit
    };

    let start = keyspace::block_at_height(highest);
    // When the window reaches below genesis the floor sorts before every
    // height key, so height 0 is included.
    let floor = if limit > highest {
        "block-".to_string()
    } else {
        keyspace::block_at_height(highest - limit)
    };
    let suffix_len = keyspace::encode_height(0).len();

    let mut results = Vec::new();
    let iter = db.iterator(IteratorMode::From(start.as_bytes(), Direction::Reverse));
    for item in iter {
        let (key, value) = item?;
        if key.as_ref() <= floor.as_bytes() {
            break;
        }
        // Height keys only; `block-<hash>-tx-…` rows share the prefix.
        let key_text = String::from_utf8_lossy(&key);
        let Some(suffix) = key_text.strip_prefix("block-") else {
            break;
        };
        if suffix.len() != suffix_len || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let height: u64 = suffix.parse().map_err(|_| {
            QueryError::Store(format!("malformed height key {}", key_text))
        })?;
        let hash = String::from_utf8_lossy(&value).to_string();
        results.push(block_summary(db, &hash, height)?);
    }

    Ok(results)
}

/// Blocks whose time field lies in `[start, end]`, ascending by time.
pub fn blocks_by_date(db: &DB, start: u64, end: u64) -> Result<Vec<Value>, QueryError> {
    let start_key = keyspace::block_hash_for_time(start);
    let end_key = keyspace::block_hash_for_time(end);

    let mut results = Vec::new();
    let iter = db.iterator(IteratorMode::From(start_key.as_bytes(), Direction::Forward));
    for item in iter {
        let (key, value) = item?;
        if key.as_ref() > end_key.as_bytes() || !key.starts_with(b"block-hash-time-") {
            break;
        }
        let hash = String::from_utf8_lossy(&value).to_string();
        let Some(height) = get_string(db, &keyspace::block_height_for_hash(&hash))?
            .and_then(|h| h.parse::<u64>().ok())
        else {
            continue;
        };
        results.push(block_summary(db, &hash, height)?);
    }

    Ok(results)
}

/// Resolve a block hash to its physical location in the block files.
fn block_location(db: &DB, hash: &str) -> Result<(u64, String, u64), QueryError> {
    let height = get_string(db, &keyspace::block_height_for_hash(hash))?
        .and_then(|h| h.parse::<u64>().ok())
        .ok_or_else(|| QueryError::NotFound("Block not found".into()))?;
    let position = get_string(db, &keyspace::block_file_position(height))?
        .ok_or_else(|| QueryError::NotFound("Block not found".into()))?;
    let (file_name, offset) = keyspace::decode_file_position(&position)
        .ok_or_else(|| QueryError::Store(format!("malformed file position for height {}", height)))?;
    Ok((height, file_name, offset))
}

/// Block metadata plus its ordered transaction hashes.
pub fn block(db: &DB, reader: &dyn BlockReader, hash: &str) -> Result<Value, QueryError> {
    let (height, file_name, offset) = block_location(db, hash)?;
    let block = reader
        .read_block(&file_name, offset, height, false)
        .map_err(|e| QueryError::Store(e.to_string()))?;

    let highest = progress::highest_block(db)?.unwrap_or(height);
    let txs: Vec<&String> = block.transactions.iter().map(|tx| &tx.hash).collect();

    Ok(json!({
        "hash": block.hash,
        "previousBlockHash": block.previous_hash,
        "merkleRoot": block.merkle_root,
        "version": block.version,
        "time": block.time,
        "bits": block.bits,
        "nonce": block.nonce,
        "height": block.height,
        "confirmations": highest.saturating_sub(block.height) + 1,
        "size": block.byte_size,
        "tx": txs,
        "ismainchain": true,
    }))
}

/// Addresses recorded for one output, in allocation order.
pub fn addresses_for_txo(db: &DB, tx_hash: &str, vout: u32) -> Result<Vec<String>, QueryError> {
    let prefix = keyspace::txo_address_prefix(tx_hash, vout);
    let start = format!("{}-00000000", prefix);
    let limit = format!("{}-99999999", prefix);

    let mut addresses = Vec::new();
    let iter = db.iterator(IteratorMode::From(start.as_bytes(), Direction::Forward));
    for item in iter {
        let (key, value) = item?;
        if key.as_ref() >= limit.as_bytes() {
            break;
        }
        addresses.push(String::from_utf8_lossy(&value).to_string());
    }
    Ok(addresses)
}

pub fn value_for_txo(db: &DB, tx_hash: &str, vout: u32) -> Result<i64, QueryError> {
    get_i64(db, &keyspace::txo_value(tx_hash, vout))
}

/// One page (10 txs) of a block's transactions, fully described.
pub fn block_transactions(
    db: &DB,
    reader: &dyn BlockReader,
    solver: &dyn ScriptSolver,
    hash: &str,
    page: usize,
) -> Result<Value, QueryError> {
    let (height, file_name, offset) = block_location(db, hash)?;
    let block = reader
        .read_block(&file_name, offset, height, false)
        .map_err(|e| QueryError::Store(e.to_string()))?;

    let highest = progress::highest_block(db)?.unwrap_or(height);
    let confirmations = highest.saturating_sub(block.height) + 1;
    let tx_count = block.transactions.len();
    let pages_total = (tx_count + TXS_PER_PAGE - 1) / TXS_PER_PAGE;

    let page_start = (page * TXS_PER_PAGE).min(tx_count);
    let page_end = (page_start + TXS_PER_PAGE).min(tx_count);

    let mut txs = Vec::new();
    for tx in &block.transactions[page_start..page_end] {
        let mut is_coinbase = false;
        let mut vins = Vec::new();
        for input in &tx.inputs {
            if input.coinbase {
                is_coinbase = true;
            }
            let addresses = addresses_for_txo(db, &input.prev_tx_hash, input.prev_out_index)?;
            vins.push(json!({
                "sequence": input.sequence,
                "n": input.index,
                "txid": input.prev_tx_hash,
                "vout": input.prev_out_index,
                "scriptSig": { "hex": hex::encode(&input.script) },
                "addr": addresses.join(" "),
                "valueSat": value_for_txo(db, &input.prev_tx_hash, input.prev_out_index)?,
            }));
        }

        let mut vouts = Vec::new();
        for out in &tx.outputs {
            let mut vout = json!({
                "scriptPubKey": {
                    "hex": hex::encode(&out.script),
                    "addresses": addresses_for_txo(db, &tx.hash, out.index)?,
                    "type": solver.script_type_name(&out.script),
                },
                "valueSat": out.value,
            });
            if let Some(pointer) = get_string(db, &keyspace::txo_spent(&tx.hash, out.index))? {
                if let Some(ptr) = keyspace::decode_spend_pointer(&pointer) {
                    vout["spentTxId"] = json!(ptr.tx_hash);
                    vout["spentIndex"] = json!(ptr.input_index);
                    vout["spentBlock"] = json!(ptr.block_hash);
                    let height_key = keyspace::block_height_for_hash(&ptr.block_hash);
                    if let Some(spent_height) =
                        get_string(db, &height_key)?.and_then(|h| h.parse::<u64>().ok())
                    {
                        vout["spentHeight"] = json!(spent_height);
                    }
                }
            }
            vouts.push(vout);
        }

        txs.push(json!({
            "txid": tx.hash,
            "version": tx.version,
            "locktime": tx.lock_time,
            "size": tx.byte_size,
            "confirmations": confirmations,
            "blockhash": block.hash,
            "blockheight": block.height,
            "isCoinBase": is_coinbase,
            "vin": vins,
            "vout": vouts,
        }));
    }

    Ok(json!({ "pagesTotal": pages_total, "txs": txs }))
}

/// The containing block of a transaction plus up to nine preceding block
/// headers, newest first.
pub fn transaction_proof(db: &DB, reader: &dyn BlockReader, txid: &str) -> Result<Value, QueryError> {
    let block_hash = get_string(db, &keyspace::tx_block(txid))?
        .ok_or_else(|| QueryError::NotFound("TX not found".into()))?;
    let height = get_string(db, &keyspace::block_height_for_hash(&block_hash))?
        .and_then(|h| h.parse::<u64>().ok())
        .ok_or_else(|| QueryError::NotFound("Block not found".into()))?;

    let mut chain = Vec::new();
    let floor = height.saturating_sub(9).max(1);
    for h in (floor..=height).rev() {
        let position = get_string(db, &keyspace::block_file_position(h))?
            .ok_or_else(|| QueryError::NotFound("Block not found".into()))?;
        let (file_name, offset) = keyspace::decode_file_position(&position)
            .ok_or_else(|| QueryError::Store(format!("malformed file position for height {}", h)))?;
        let header = reader
            .read_block(&file_name, offset, h, true)
            .map_err(|e| QueryError::Store(e.to_string()))?;
        chain.push(json!({
            "blockHash": header.hash,
            "previousBlockHash": header.previous_hash,
            "merkleRoot": header.merkle_root,
            "version": header.version,
            "time": header.time,
            "bits": header.bits,
            "nonce": header.nonce,
            "height": header.height,
        }));
    }

    Ok(json!({
        "txHash": txid,
        "blockHash": block_hash,
        "blockHeight": height,
        "chain": chain,
    }))
}

/// Indexing progress against the remote node's chain height.
pub async fn sync_status(db: &DB, node: Option<&NodeRpc>) -> Result<Value, QueryError> {
    let height = progress::highest_block(db)?.unwrap_or(0);

    let mut result = json!({
        "error": Value::Null,
        "height": height,
    });

    let chain_height = match node {
        Some(node) => match node.get_block_count().await {
            Ok(count) => Some(count),
            Err(e) => {
                result["error"] = json!(e.message);
                None
            }
        },
        None => {
            result["error"] = json!("no RPC node configured");
            None
        }
    };

    let percentage = match chain_height {
        Some(chain_height) if chain_height > 0 => {
            result["blockChainHeight"] = json!(chain_height);
            height as f64 / chain_height as f64 * 100.0
        }
        _ => 0.0,
    };

    result["syncPercentage"] = json!(percentage);
    result["status"] = if percentage >= 100.0 {
        json!("finished")
    } else {
        json!("indexing")
    };

    Ok(result)
}
