//! Sync service.
//!
//! Scans the node's block-file segments, resolves each block's height by
//! parent chaining, and feeds resolved blocks to the indexer in
//! topological (and therefore height) order. The same loop serves initial
//! sync and the live tail: every pass rescans each segment from where the
//! previous pass stopped. This task is the store's single writer.

use rocksdb::DB;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::block_reader::{scan_segment, BlockReader, ScannedBlock};
use crate::indexer::BlockIndexer;
use crate::keyspace;
use crate::progress;

/// Height of a block whose parent is `prev_hash`, if the parent is known.
/// Genesis is the block whose previous hash is the all-zero digest.
fn resolve_height(db: &DB, prev_hash: &str) -> Result<Option<u64>, rocksdb::Error> {
    if prev_hash == keyspace::GENESIS_PREV_HASH {
        return Ok(Some(0));
    }
    match db.get(keyspace::block_height_for_hash(prev_hash))? {
        Some(bytes) => Ok(progress::parse_height(&bytes).map(|h| h + 1)),
        None => Ok(None),
    }
}

fn list_segments(blk_dir: &PathBuf) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut segments = Vec::new();
    for entry in std::fs::read_dir(blk_dir)? {
        let path = entry?.path();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if name.starts_with("blk") && name.ends_with(".dat") {
            segments.push(path);
        }
    }
    segments.sort();
    Ok(segments)
}

/// One scan-and-ingest pass. Returns the number of blocks indexed.
fn ingest_pass(
    db: &DB,
    indexer: &mut BlockIndexer,
    reader: &dyn BlockReader,
    blk_dir: &PathBuf,
    magic: [u8; 4],
    scanned_offsets: &mut HashMap<String, u64>,
) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
    let mut pending: Vec<ScannedBlock> = Vec::new();
    for path in list_segments(blk_dir)? {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let from = scanned_offsets.get(&name).copied().unwrap_or(0);
        let (blocks, end) = scan_segment(&path, magic, from)?;
        scanned_offsets.insert(name, end);
        pending.extend(blocks);
    }

    let mut ingested: u64 = 0;
    loop {
        let mut progressed = false;
        let mut unresolved = Vec::new();

        for scanned in pending.drain(..) {
            let Some(height) = resolve_height(db, &scanned.prev_hash)? else {
                unresolved.push(scanned);
                continue;
            };
            progressed = true;

            if indexer.has_indexed_block(&scanned.hash, height)? {
                continue;
            }
            let block = reader.read_block(&scanned.file_name, scanned.offset, height, false)?;
            indexer.index_block(&block)?;
            ingested += 1;
            if ingested % 1000 == 0 {
                info!(height, ingested, "sync progress");
            }
        }

        pending = unresolved;
        if pending.is_empty() || !progressed {
            break;
        }
    }

    if !pending.is_empty() {
        // Blocks from a chain we never saw the root of; the next pass will
        // not do better, so forget them.
        warn!(count = pending.len(), "dropping blocks with unknown parents");
    }

    Ok(ingested)
}

pub async fn run_sync_service(
    db: Arc<DB>,
    mut indexer: BlockIndexer,
    reader: Arc<dyn BlockReader>,
    blk_dir: PathBuf,
    magic: [u8; 4],
    poll_interval_secs: u64,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut scanned_offsets: HashMap<String, u64> = HashMap::new();

    info!(dir = %blk_dir.display(), "starting initial sync");
    let ingested = ingest_pass(
        &db,
        &mut indexer,
        reader.as_ref(),
        &blk_dir,
        magic,
        &mut scanned_offsets,
    )?;
    let tip = progress::highest_block(&db)?.unwrap_or(0);
    info!(ingested, tip, "initial sync complete, tailing block files");

    loop {
        tokio::time::sleep(Duration::from_secs(poll_interval_secs)).await;
        let ingested = ingest_pass(
            &db,
            &mut indexer,
            reader.as_ref(),
            &blk_dir,
            magic,
            &mut scanned_offsets,
        )?;
        if ingested > 0 {
            let tip = progress::highest_block(&db)?.unwrap_or(0);
            info!(ingested, tip, "indexed new blocks");
        }
    }
}
