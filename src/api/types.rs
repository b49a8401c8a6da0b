// Query-string parameter shapes.
//
// Flags are 0/1 integers like the classic insight-style APIs expect.

use serde::Deserialize;

use crate::query::TxoQueryFlags;

#[derive(Debug, Deserialize, Default)]
pub struct BalanceQuery {
    #[serde(default)]
    pub details: u8,
}

#[derive(Debug, Deserialize, Default)]
pub struct TxoQuery {
    #[serde(rename = "txHashOnly", default)]
    pub tx_hash_only: u8,
    #[serde(default)]
    pub raw: u8,
    #[serde(default)]
    pub unspent: u8,
    #[serde(default)]
    pub unconfirmed: u8,
    #[serde(default)]
    pub script: u8,
}

impl TxoQuery {
    pub fn flags(&self) -> TxoQueryFlags {
        TxoQueryFlags {
            tx_hash_only: self.tx_hash_only != 0,
            raw: self.raw != 0,
            unspent: self.unspent != 0,
            unconfirmed: self.unconfirmed != 0,
            script: self.script != 0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct SpendQuery {
    #[serde(default)]
    pub raw: u8,
    #[serde(default)]
    pub unconfirmed: u8,
}

#[derive(Debug, Deserialize, Default)]
pub struct BlocksQuery {
    #[serde(default)]
    pub limit: u64,
}

#[derive(Debug, Deserialize, Default)]
pub struct DateRangeQuery {
    #[serde(default)]
    pub start: u64,
    #[serde(default)]
    pub end: u64,
}
