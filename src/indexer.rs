//! Block ingestion.
//!
//! Turns one parsed block into one atomic `WriteBatch` against the
//! keyspace. Single writer: exactly one `BlockIndexer` mutates the store;
//! the ordinal cache lives inside it and is only touched while staging a
//! batch, so a commit failure can at worst leave gaps in a list's
//! ordinals, never collisions.

use rocksdb::{Direction, IteratorMode, WriteBatch, DB};
use std::sync::Arc;
use tracing::{debug, info};

use crate::counter::OrdinalCache;
use crate::keyspace;
use crate::mempool::MempoolMonitor;
use crate::metrics;
use crate::script_solver::ScriptSolver;
use crate::types::Block;

pub struct BlockIndexer {
    db: Arc<DB>,
    mempool: Arc<dyn MempoolMonitor>,
    solver: Arc<dyn ScriptSolver>,
    ordinals: OrdinalCache,
}

impl BlockIndexer {
    pub fn new(db: Arc<DB>, mempool: Arc<dyn MempoolMonitor>, solver: Arc<dyn ScriptSolver>) -> Self {
        Self {
            db,
            mempool,
            solver,
            ordinals: OrdinalCache::new(),
        }
    }

    /// True when `block_hash` is already recorded at `height`.
    pub fn has_indexed_block(&self, block_hash: &str, height: u64) -> Result<bool, rocksdb::Error> {
        match self.db.get(keyspace::block_at_height(height))? {
            Some(existing) => Ok(existing == block_hash.as_bytes()),
            None => Ok(false),
        }
    }

    /// Ingest one block. Idempotent on replay; a different hash already at
    /// this height is purged first (reorg replacement), then overwritten.
    /// All rows of the block become visible in one atomic batch.
    pub fn index_block(&mut self, block: &Block) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match self.db.get(keyspace::block_at_height(block.height))? {
            Some(existing) if existing == block.hash.as_bytes() => {
                debug!(height = block.height, hash = %block.hash, "block already indexed");
                return Ok(());
            }
            Some(existing) => {
                let displaced = String::from_utf8_lossy(&existing).to_string();
                info!(height = block.height, old = %displaced, new = %block.hash,
                    "height collision, purging displaced block");
                self.clear_block_txos(&displaced)?;
            }
            None => {}
        }

        let mut batch = WriteBatch::default();

        let advance_highest = match self.db.get(keyspace::HIGHEST_BLOCK)? {
            Some(bytes) => crate::progress::parse_height(&bytes)
                .map(|current| current < block.height)
                .unwrap_or(true),
            None => true,
        };
        if advance_highest {
            batch.put(keyspace::HIGHEST_BLOCK, keyspace::encode_height(block.height));
        }

        batch.put(keyspace::block_at_height(block.height), &block.hash);
        batch.put(
            keyspace::block_height_for_hash(&block.hash),
            keyspace::encode_height(block.height),
        );
        batch.put(
            keyspace::block_file_position(block.height),
            keyspace::encode_file_position(&block.file_name, block.file_position),
        );
        batch.put(keyspace::block_time(block.height), block.time.to_string());
        batch.put(keyspace::block_hash_for_time(block.time as u64), &block.hash);
        batch.put(keyspace::block_size(block.height), block.byte_size.to_string());
        batch.put(
            keyspace::block_tx_count(block.height),
            block.transactions.len().to_string(),
        );

        let mut txo_count: u64 = 0;
        let mut spend_count: u64 = 0;

        for (tx_index, tx) in block.transactions.iter().enumerate() {
            batch.put(keyspace::block_tx_slot(&block.hash, tx_index as u64), &tx.hash);
            batch.put(
                keyspace::tx_file_position(&tx.hash),
                keyspace::encode_file_position(&block.file_name, tx.file_position),
            );
            batch.put(keyspace::tx_block(&tx.hash), &block.hash);

            for out in &tx.outputs {
                let addresses = self.solver.addresses_from_script(&out.script);
                if addresses.len() > 1 && self.solver.is_multisig(&out.script) {
                    batch.put(
                        keyspace::multisig_marker(&tx.hash, out.index),
                        self.solver.required_signatures(&out.script).to_string(),
                    );
                }

                for address in &addresses {
                    let prefix = keyspace::address_txo_prefix(address);
                    let ordinal = self.ordinals.next_ordinal(&self.db, &prefix)?;
                    let txo_key = keyspace::ordinal_key(&prefix, ordinal);
                    batch.put(
                        &txo_key,
                        keyspace::encode_txo_row(&tx.hash, out.index, block.height, out.value),
                    );

                    // Per-block pointer row so a reorg can find and delete
                    // the primary row above.
                    let block_prefix = keyspace::block_txo_prefix(&block.hash);
                    let ordinal = self.ordinals.next_ordinal(&self.db, &block_prefix)?;
                    batch.put(keyspace::ordinal_key(&block_prefix, ordinal), &txo_key);

                    let addr_prefix = keyspace::txo_address_prefix(&tx.hash, out.index);
                    let ordinal = self.ordinals.next_ordinal(&self.db, &addr_prefix)?;
                    batch.put(keyspace::ordinal_key(&addr_prefix, ordinal), address);

                    txo_count += 1;
                }

                // Zero-address outputs still get their amount recorded.
                batch.put(keyspace::txo_value(&tx.hash, out.index), out.value.to_string());
            }

            for input in &tx.inputs {
                if input.coinbase {
                    continue;
                }
                batch.put(
                    keyspace::txo_spent(&input.prev_tx_hash, input.prev_out_index),
                    keyspace::encode_spend_pointer(&block.hash, &tx.hash, input.index),
                );

                let spent_prefix = keyspace::block_txospent_prefix(&block.hash);
                let ordinal = self.ordinals.next_ordinal(&self.db, &spent_prefix)?;
                batch.put(
                    keyspace::ordinal_key(&spent_prefix, ordinal),
                    keyspace::txo_spent(&input.prev_tx_hash, input.prev_out_index),
                );
                spend_count += 1;
            }
        }

        self.db.write(batch)?;

        metrics::BLOCKS_INDEXED.inc();
        metrics::TXOS_INDEXED.inc_by(txo_count);
        metrics::SPENDS_INDEXED.inc_by(spend_count);
        if advance_highest {
            metrics::HIGHEST_BLOCK.set(block.height as i64);
        }

        // Best-effort, and only once the rows are actually visible.
        for tx in &block.transactions {
            self.mempool.transaction_indexed(&tx.hash);
        }

        debug!(height = block.height, hash = %block.hash,
            txs = block.transactions.len(), "block indexed");
        Ok(())
    }

    /// Delete every primary row reachable from the per-block pointer logs
    /// of `block_hash`, in one atomic batch.
    ///
    /// The pointer rows themselves and the per-output address/value rows
    /// stay behind; the replacement block at the same height overwrites
    /// the ones it shares.
    pub fn clear_block_txos(&self, block_hash: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut batch = WriteBatch::default();

        for prefix in [
            keyspace::block_txo_prefix(block_hash),
            keyspace::block_txospent_prefix(block_hash),
        ] {
            let (start, limit) = keyspace::ordinal_bounds(&prefix);
            let iter = self
                .db
                .iterator(IteratorMode::From(start.as_bytes(), Direction::Forward));
            for item in iter {
                let (key, value) = item?;
                if key.as_ref() >= limit.as_bytes() {
                    break;
                }
                batch.delete(value);
            }
        }

        self.db.write(batch)?;
        Ok(())
    }
}
