//! Key and value encodings for every index in the store.
//!
//! The store is one ordered map from byte strings to byte strings; logical
//! indices are synthesised with textual prefixes so that lexical prefix
//! scans implement range queries. Ordinals are 1-based 8-digit zero-padded
//! decimal, times are 12-digit zero-padded, so lexical order equals numeric
//! order throughout.

/// High-water mark of the indexed chain, value is an 8-digit height.
pub const HIGHEST_BLOCK: &str = "highestblock";

/// Previous-hash sentinel of the genesis block.
pub const GENESIS_PREV_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

pub fn encode_height(height: u64) -> String {
    format!("{:08}", height)
}

pub fn block_at_height(height: u64) -> String {
    format!("block-{:08}", height)
}

pub fn block_height_for_hash(block_hash: &str) -> String {
    format!("block-hash-{}", block_hash)
}

pub fn block_file_position(height: u64) -> String {
    format!("block-filePosition-{:08}", height)
}

pub fn block_time(height: u64) -> String {
    format!("block-time-{:08}", height)
}

pub fn block_hash_for_time(time: u64) -> String {
    format!("block-hash-time-{:012}", time)
}

pub fn block_size(height: u64) -> String {
    format!("block-size-{:08}", height)
}

pub fn block_tx_count(height: u64) -> String {
    format!("block-txcount-{:08}", height)
}

/// Slot `index` of the ordered transaction list of a block.
pub fn block_tx_slot(block_hash: &str, index: u64) -> String {
    format!("block-{}-tx-{:08}", block_hash, index)
}

pub fn tx_block(tx_hash: &str) -> String {
    format!("tx-{}-block", tx_hash)
}

pub fn tx_file_position(tx_hash: &str) -> String {
    format!("tx-filePosition-{}", tx_hash)
}

/// Counter prefix for the per-address received-output log.
pub fn address_txo_prefix(address: &str) -> String {
    format!("{}-txo", address)
}

/// Counter prefix for the per-block log of address-txo keys.
pub fn block_txo_prefix(block_hash: &str) -> String {
    format!("{}-txo", block_hash)
}

/// Counter prefix for the per-block log of spend keys.
pub fn block_txospent_prefix(block_hash: &str) -> String {
    format!("{}-txospent", block_hash)
}

/// Counter prefix for the per-output address list.
pub fn txo_address_prefix(tx_hash: &str, vout: u32) -> String {
    format!("{}{:08}-address", tx_hash, vout)
}

/// A prefix plus an allocated ordinal forms a list-entry key.
pub fn ordinal_key(prefix: &str, ordinal: u32) -> String {
    format!("{}-{:08}", prefix, ordinal)
}

/// Scan bounds of an ordinal list: `[prefix-00000001, prefix-99999999)`.
pub fn ordinal_bounds(prefix: &str) -> (String, String) {
    (format!("{}-00000001", prefix), format!("{}-99999999", prefix))
}

pub fn txo_value(tx_hash: &str, vout: u32) -> String {
    format!("{}{:08}-value", tx_hash, vout)
}

pub fn txo_spent(tx_hash: &str, vout: u32) -> String {
    format!("txo-{}-{:08}-spent", tx_hash, vout)
}

pub fn multisig_marker(tx_hash: &str, vout: u32) -> String {
    format!("multisigtx-{}-{:08}", tx_hash, vout)
}

/// Physical location value: file name followed by a 12-digit byte offset.
pub fn encode_file_position(file_name: &str, offset: u64) -> String {
    format!("{}{:012}", file_name, offset)
}

/// Inverse of [`encode_file_position`]; the offset is the last 12 digits.
pub fn decode_file_position(value: &str) -> Option<(String, u64)> {
    if value.len() < 12 {
        return None;
    }
    let split = value.len() - 12;
    let offset = value[split..].parse::<u64>().ok()?;
    Some((value[..split].to_string(), offset))
}

/// Row value of the per-address received-output log.
pub fn encode_txo_row(tx_hash: &str, vout: u32, height: u64, value: i64) -> String {
    format!("{}{:08}{:08}{}", tx_hash, vout, height, value)
}

/// Parsed form of a `<address>-txo-NNNNNNNN` row value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxoRow {
    pub tx_hash: String,
    pub vout: u32,
    pub height: u64,
    pub value: i64,
}

pub fn decode_txo_row(value: &str) -> Option<TxoRow> {
    if value.len() < 81 {
        return None;
    }
    Some(TxoRow {
        tx_hash: value[0..64].to_string(),
        vout: value[64..72].parse().ok()?,
        height: value[72..80].parse().ok()?,
        value: value[80..].parse().ok()?,
    })
}

/// Spend-pointer value: spending block hash, spending tx hash, input index.
pub fn encode_spend_pointer(block_hash: &str, tx_hash: &str, input_index: u32) -> String {
    format!("{}{}{:08}", block_hash, tx_hash, input_index)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendPointer {
    pub block_hash: String,
    pub tx_hash: String,
    pub input_index: u32,
}

pub fn decode_spend_pointer(value: &str) -> Option<SpendPointer> {
    if value.len() < 136 {
        return None;
    }
    Some(SpendPointer {
        block_hash: value[0..64].to_string(),
        tx_hash: value[64..128].to_string(),
        input_index: value[128..136].parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH_A: &str = "aa11223344556677889900aabbccddeeff00112233445566778899aabbccddee";
    const HASH_B: &str = "bb11223344556677889900aabbccddeeff00112233445566778899aabbccddee";

    #[test]
    fn test_height_keys_sort_numerically() {
        assert!(block_at_height(9) < block_at_height(10));
        assert!(block_at_height(99_999) < block_at_height(100_000));
        assert_eq!(block_at_height(0), "block-00000000");
    }

    #[test]
    fn test_time_key_width() {
        assert_eq!(
            block_hash_for_time(1_000_000_000),
            "block-hash-time-001000000000"
        );
        assert!(block_hash_for_time(999) < block_hash_for_time(1000));
    }

    #[test]
    fn test_ordinal_bounds_cover_allocations() {
        let (start, limit) = ordinal_bounds("addr-txo");
        let first = ordinal_key("addr-txo", 1);
        assert!(first >= start && first < limit);
        let big = ordinal_key("addr-txo", 99_999_998);
        assert!(big < limit);
    }

    #[test]
    fn test_txo_row_round_trip() {
        let encoded = encode_txo_row(HASH_A, 3, 120, 5_000_000_000);
        let row = decode_txo_row(&encoded).unwrap();
        assert_eq!(row.tx_hash, HASH_A);
        assert_eq!(row.vout, 3);
        assert_eq!(row.height, 120);
        assert_eq!(row.value, 5_000_000_000);
    }

    #[test]
    fn test_spend_pointer_round_trip() {
        let encoded = encode_spend_pointer(HASH_A, HASH_B, 7);
        let ptr = decode_spend_pointer(&encoded).unwrap();
        assert_eq!(ptr.block_hash, HASH_A);
        assert_eq!(ptr.tx_hash, HASH_B);
        assert_eq!(ptr.input_index, 7);
    }

    #[test]
    fn test_file_position_round_trip() {
        let encoded = encode_file_position("blk00001.dat", 81);
        assert_eq!(encoded, "blk00001.dat000000000081");
        let (name, offset) = decode_file_position(&encoded).unwrap();
        assert_eq!(name, "blk00001.dat");
        assert_eq!(offset, 81);
    }

    #[test]
    fn test_malformed_values_rejected() {
        assert!(decode_txo_row("short").is_none());
        assert!(decode_spend_pointer("short").is_none());
        assert!(decode_file_position("x").is_none());
    }
}
