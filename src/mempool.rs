//! Mempool mirror.
//!
//! Keeps an in-memory view of the node's unconfirmed transactions so the
//! query engine can answer "pending" questions without touching the store.
//! The mirror is externally synchronised (interior RwLock) and callable
//! from any query task; the poll loop is the only writer besides
//! `transaction_indexed` notifications from the block indexer.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::rpc::NodeRpc;

/// An unconfirmed output attributed to an address.
#[derive(Debug, Clone)]
pub struct MempoolTxo {
    pub tx_hash: String,
    pub index: u32,
    pub value: i64,
}

pub trait MempoolMonitor: Send + Sync {
    fn tx_ids(&self) -> Vec<String>;
    fn txos_for_address(&self, address: &str) -> Vec<MempoolTxo>;
    /// Hash of the unconfirmed transaction spending the outpoint, if any.
    fn outpoint_spend(&self, tx_hash: &str, vout: u32) -> Option<String>;
    /// The transaction landed in an indexed block; drop it from the mirror.
    fn transaction_indexed(&self, tx_hash: &str);
}

#[derive(Debug, Clone)]
struct MempoolEntry {
    /// (vout, value, addresses)
    outputs: Vec<(u32, i64, Vec<String>)>,
    /// (prev tx hash, prev vout)
    spends: Vec<(String, u32)>,
}

pub struct MempoolState {
    entries: RwLock<HashMap<String, MempoolEntry>>,
}

impl MempoolState {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(
        &self,
        tx_hash: &str,
        outputs: Vec<(u32, i64, Vec<String>)>,
        spends: Vec<(String, u32)>,
    ) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(tx_hash.to_string(), MempoolEntry { outputs, spends });
    }

    /// Drop every transaction not present in the node's current view.
    pub fn retain(&self, live_txids: &HashSet<String>) {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|txid, _| live_txids.contains(txid));
    }

    pub fn contains(&self, tx_hash: &str) -> bool {
        self.entries.read().unwrap().contains_key(tx_hash)
    }
}

impl Default for MempoolState {
    fn default() -> Self {
        Self::new()
    }
}

impl MempoolMonitor for MempoolState {
    fn tx_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.read().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn txos_for_address(&self, address: &str) -> Vec<MempoolTxo> {
        let entries = self.entries.read().unwrap();
        let mut txos = Vec::new();
        for (tx_hash, entry) in entries.iter() {
            for (vout, value, addresses) in &entry.outputs {
                if addresses.iter().any(|a| a == address) {
                    txos.push(MempoolTxo {
                        tx_hash: tx_hash.clone(),
                        index: *vout,
                        value: *value,
                    });
                }
            }
        }
        txos.sort_by(|a, b| (&a.tx_hash, a.index).cmp(&(&b.tx_hash, b.index)));
        txos
    }

    fn outpoint_spend(&self, tx_hash: &str, vout: u32) -> Option<String> {
        let entries = self.entries.read().unwrap();
        for (spender, entry) in entries.iter() {
            if entry
                .spends
                .iter()
                .any(|(prev, prev_vout)| prev == tx_hash && *prev_vout == vout)
            {
                return Some(spender.clone());
            }
        }
        None
    }

    fn transaction_indexed(&self, tx_hash: &str) {
        let mut entries = self.entries.write().unwrap();
        if entries.remove(tx_hash).is_some() {
            debug!(txid = %tx_hash, "mempool tx confirmed, dropped from mirror");
        }
    }
}

/// Convert a verbose `getrawtransaction` result into a mirror entry.
fn parse_verbose_tx(tx: &serde_json::Value) -> (Vec<(u32, i64, Vec<String>)>, Vec<(String, u32)>) {
    let mut outputs = Vec::new();
    if let Some(vouts) = tx.get("vout").and_then(|v| v.as_array()) {
        for vout in vouts {
            let n = vout.get("n").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            let coins = vout.get("value").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let value = (coins * 100_000_000.0).round() as i64;
            let spk = vout.get("scriptPubKey");
            let mut addresses: Vec<String> = spk
                .and_then(|s| s.get("addresses"))
                .and_then(|a| a.as_array())
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            if addresses.is_empty() {
                if let Some(addr) = spk.and_then(|s| s.get("address")).and_then(|a| a.as_str()) {
                    addresses.push(addr.to_string());
                }
            }
            outputs.push((n, value, addresses));
        }
    }

    let mut spends = Vec::new();
    if let Some(vins) = tx.get("vin").and_then(|v| v.as_array()) {
        for vin in vins {
            if vin.get("coinbase").is_some() {
                continue;
            }
            if let (Some(txid), Some(vout)) = (
                vin.get("txid").and_then(|v| v.as_str()),
                vin.get("vout").and_then(|v| v.as_u64()),
            ) {
                spends.push((txid.to_string(), vout as u32));
            }
        }
    }

    (outputs, spends)
}

/// Poll the node's mempool and keep the mirror current.
pub async fn run_mempool_monitor(
    state: Arc<MempoolState>,
    node: Arc<NodeRpc>,
    poll_interval_secs: u64,
) {
    loop {
        tokio::time::sleep(Duration::from_secs(poll_interval_secs)).await;

        let txids = match node.get_raw_mempool().await {
            Ok(txids) => txids,
            Err(e) => {
                warn!(error = %e, "failed to fetch mempool");
                continue;
            }
        };

        let live: HashSet<String> = txids.iter().cloned().collect();
        state.retain(&live);

        for txid in txids {
            if state.contains(&txid) {
                continue;
            }
            match node.get_raw_transaction(&txid, true).await {
                Ok(tx) => {
                    let (outputs, spends) = parse_verbose_tx(&tx);
                    state.insert(&txid, outputs, spends);
                }
                Err(e) => {
                    // The tx may have been evicted between the two calls.
                    debug!(txid = %txid, error = %e, "could not resolve mempool tx");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TX_A: &str = "aa11223344556677889900aabbccddeeff00112233445566778899aabbccddee";
    const TX_B: &str = "bb11223344556677889900aabbccddeeff00112233445566778899aabbccddee";

    #[test]
    fn test_txos_for_address_and_spends() {
        let state = MempoolState::new();
        state.insert(
            TX_A,
            vec![(0, 1500, vec!["Alice".to_string()]), (1, 300, vec!["Bob".to_string()])],
            vec![(TX_B.to_string(), 0)],
        );

        let txos = state.txos_for_address("Alice");
        assert_eq!(txos.len(), 1);
        assert_eq!(txos[0].tx_hash, TX_A);
        assert_eq!(txos[0].index, 0);
        assert_eq!(txos[0].value, 1500);

        assert_eq!(state.outpoint_spend(TX_B, 0), Some(TX_A.to_string()));
        assert_eq!(state.outpoint_spend(TX_B, 1), None);
        assert_eq!(state.tx_ids(), vec![TX_A.to_string()]);
    }

    #[test]
    fn test_transaction_indexed_drops_every_view() {
        let state = MempoolState::new();
        state.insert(
            TX_A,
            vec![(0, 1500, vec!["Alice".to_string()])],
            vec![(TX_B.to_string(), 0)],
        );

        state.transaction_indexed(TX_A);
        assert!(state.tx_ids().is_empty());
        assert!(state.txos_for_address("Alice").is_empty());
        assert_eq!(state.outpoint_spend(TX_B, 0), None);
    }

    #[test]
    fn test_retain_prunes_evicted_txs() {
        let state = MempoolState::new();
        state.insert(TX_A, vec![], vec![]);
        state.insert(TX_B, vec![], vec![]);

        let live: HashSet<String> = [TX_B.to_string()].into_iter().collect();
        state.retain(&live);
        assert_eq!(state.tx_ids(), vec![TX_B.to_string()]);
    }

    #[test]
    fn test_parse_verbose_tx() {
        let tx = json!({
            "txid": TX_A,
            "vin": [
                { "coinbase": "04ffff001d" },
                { "txid": TX_B, "vout": 2 }
            ],
            "vout": [
                { "n": 0, "value": 1.5, "scriptPubKey": { "addresses": ["Alice"] } },
                { "n": 1, "value": 0.25, "scriptPubKey": { "address": "Bob" } }
            ]
        });

        let (outputs, spends) = parse_verbose_tx(&tx);
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0], (0, 150_000_000, vec!["Alice".to_string()]));
        assert_eq!(outputs[1], (1, 25_000_000, vec!["Bob".to_string()]));
        assert_eq!(spends, vec![(TX_B.to_string(), 2)]);
    }
}
