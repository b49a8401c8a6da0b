use std::fmt;

/// Error type carried through the indexing and query paths.
#[derive(Debug, Clone)]
pub struct IndexError {
    pub message: String,
}

impl IndexError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IndexError {}

/// A block as produced by the block reader.
///
/// Hashes are lowercase hex in display order (the same form the node's RPC
/// uses), because they double as key components in the store.
#[derive(Debug, Clone)]
pub struct Block {
    pub height: u64,
    pub hash: String,
    pub previous_hash: String,
    pub merkle_root: String,
    pub version: u32,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
    pub byte_size: u32,
    pub file_name: String,
    pub file_position: u64,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub hash: String,
    pub file_position: u64,
    pub version: u32,
    pub lock_time: u32,
    pub byte_size: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

#[derive(Debug, Clone)]
pub struct TxInput {
    /// Position of this input within its transaction.
    pub index: u32,
    pub coinbase: bool,
    /// Hash of the transaction whose output is being spent.
    /// Meaningless when `coinbase` is set.
    pub prev_tx_hash: String,
    pub prev_out_index: u32,
    pub script: Vec<u8>,
    pub sequence: u32,
}

#[derive(Debug, Clone)]
pub struct TxOutput {
    /// Position of this output within its transaction.
    pub index: u32,
    /// Amount in the smallest unit.
    pub value: i64,
    pub script: Vec<u8>,
}
