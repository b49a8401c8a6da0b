//! Prometheus instrumentation for the indexing pipeline.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    /// Blocks committed to the store
    pub static ref BLOCKS_INDEXED: IntCounter = IntCounter::new(
        "blockdex_blocks_indexed_total",
        "Blocks committed to the store"
    ).unwrap();

    /// Address-attributed outputs written
    pub static ref TXOS_INDEXED: IntCounter = IntCounter::new(
        "blockdex_txos_indexed_total",
        "Address-attributed transaction outputs written"
    ).unwrap();

    /// Spend pointers written
    pub static ref SPENDS_INDEXED: IntCounter = IntCounter::new(
        "blockdex_spends_indexed_total",
        "Outpoint spend pointers written"
    ).unwrap();

    /// Highest indexed height
    pub static ref HIGHEST_BLOCK: IntGauge = IntGauge::new(
        "blockdex_highest_block",
        "Highest indexed block height"
    ).unwrap();
}

pub fn register_all() {
    REGISTRY.register(Box::new(BLOCKS_INDEXED.clone())).ok();
    REGISTRY.register(Box::new(TXOS_INDEXED.clone())).ok();
    REGISTRY.register(Box::new(SPENDS_INDEXED.clone())).ok();
    REGISTRY.register(Box::new(HIGHEST_BLOCK.clone())).ok();
}

/// Render the registry in the Prometheus text exposition format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&REGISTRY.gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
