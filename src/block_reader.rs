//! Access to the primary node's append-only block files.
//!
//! The indexer and query engine only depend on the [`BlockReader`] trait;
//! [`FileBlockReader`] implements it over `blk*.dat` segments, delegating
//! wire parsing to the `bitcoin` consensus codec. The segment scanner used
//! by the sync service lives here too: it walks the magic/length framing
//! and decodes headers only.

use bitcoin::consensus::encode::{deserialize, serialize, Decodable, VarInt};
use bitcoin::{Block as WireBlock, BlockHeader};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::types::{Block, Transaction, TxInput, TxOutput};

pub trait BlockReader: Send + Sync {
    /// Produce the block stored at `offset` within `file_name`. The caller
    /// supplies the height (the store knows it, the wire format does not).
    /// `header_only` skips the transaction list.
    fn read_block(
        &self,
        file_name: &str,
        offset: u64,
        height: u64,
        header_only: bool,
    ) -> Result<Block, Box<dyn std::error::Error + Send + Sync>>;
}

pub struct FileBlockReader {
    blocks_dir: PathBuf,
}

impl FileBlockReader {
    pub fn new(blocks_dir: impl Into<PathBuf>) -> Self {
        Self {
            blocks_dir: blocks_dir.into(),
        }
    }

    fn block_from_wire(wire: WireBlock, file_name: &str, offset: u64, height: u64) -> Block {
        let header = wire.header;
        let tx_count = wire.txdata.len() as u64;

        let mut transactions = Vec::with_capacity(wire.txdata.len());
        let mut tx_position = offset + 80 + VarInt(tx_count).len() as u64;
        for tx in &wire.txdata {
            let tx_bytes = serialize(tx);
            let mut inputs = Vec::with_capacity(tx.input.len());
            for (i, txin) in tx.input.iter().enumerate() {
                inputs.push(TxInput {
                    index: i as u32,
                    coinbase: txin.previous_output.is_null(),
                    prev_tx_hash: txin.previous_output.txid.to_string(),
                    prev_out_index: txin.previous_output.vout,
                    script: txin.script_sig.to_bytes(),
                    sequence: txin.sequence,
                });
            }
            let mut outputs = Vec::with_capacity(tx.output.len());
            for (i, txout) in tx.output.iter().enumerate() {
                outputs.push(TxOutput {
                    index: i as u32,
                    value: txout.value as i64,
                    script: txout.script_pubkey.to_bytes(),
                });
            }
            transactions.push(Transaction {
                hash: tx.txid().to_string(),
                file_position: tx_position,
                version: tx.version as u32,
                lock_time: tx.lock_time,
                byte_size: tx_bytes.len() as u32,
                inputs,
                outputs,
            });
            tx_position += tx_bytes.len() as u64;
        }

        let byte_size = (tx_position - offset) as u32;
        Block {
            height,
            hash: header.block_hash().to_string(),
            previous_hash: header.prev_blockhash.to_string(),
            merkle_root: header.merkle_root.to_string(),
            version: header.version as u32,
            time: header.time,
            bits: header.bits,
            nonce: header.nonce,
            byte_size,
            file_name: file_name.to_string(),
            file_position: offset,
            transactions,
        }
    }

    fn header_block(header: BlockHeader, file_name: &str, offset: u64, height: u64) -> Block {
        Block {
            height,
            hash: header.block_hash().to_string(),
            previous_hash: header.prev_blockhash.to_string(),
            merkle_root: header.merkle_root.to_string(),
            version: header.version as u32,
            time: header.time,
            bits: header.bits,
            nonce: header.nonce,
            byte_size: 0,
            file_name: file_name.to_string(),
            file_position: offset,
            transactions: Vec::new(),
        }
    }
}

impl BlockReader for FileBlockReader {
    fn read_block(
        &self,
        file_name: &str,
        offset: u64,
        height: u64,
        header_only: bool,
    ) -> Result<Block, Box<dyn std::error::Error + Send + Sync>> {
        let path = self.blocks_dir.join(file_name);
        let file = File::open(&path)?;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(offset))?;

        if header_only {
            let mut buf = [0u8; 80];
            reader.read_exact(&mut buf)?;
            let header: BlockHeader = deserialize(&buf)?;
            return Ok(Self::header_block(header, file_name, offset, height));
        }

        let wire = WireBlock::consensus_decode(&mut reader)?;
        Ok(Self::block_from_wire(wire, file_name, offset, height))
    }
}

/// One framed block found while scanning a segment.
#[derive(Debug, Clone)]
pub struct ScannedBlock {
    pub file_name: String,
    /// Byte offset of the serialized block (past the 8-byte framing).
    pub offset: u64,
    pub byte_len: u32,
    pub hash: String,
    pub prev_hash: String,
}

/// Walk a segment from `from_offset`, decoding headers only. Returns the
/// blocks found and the offset scanning stopped at (resume point for the
/// live tail). Scanning stops at end of file, zero padding, or foreign
/// magic.
pub fn scan_segment(
    path: &Path,
    magic: [u8; 4],
    from_offset: u64,
) -> Result<(Vec<ScannedBlock>, u64), Box<dyn std::error::Error + Send + Sync>> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(from_offset))?;

    let mut blocks = Vec::new();
    let mut pos = from_offset;
    loop {
        let mut frame = [0u8; 8];
        match reader.read_exact(&mut frame) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let found_magic = [frame[0], frame[1], frame[2], frame[3]];
        if found_magic == [0, 0, 0, 0] {
            // Preallocated tail.
            break;
        }
        if found_magic != magic {
            warn!(file = %file_name, offset = pos, "foreign magic, stopping scan");
            break;
        }
        let byte_len = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
        if byte_len < 80 {
            warn!(file = %file_name, offset = pos, byte_len, "truncated frame, stopping scan");
            break;
        }

        let mut header_buf = [0u8; 80];
        match reader.read_exact(&mut header_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let header: BlockHeader = deserialize(&header_buf)?;

        blocks.push(ScannedBlock {
            file_name: file_name.clone(),
            offset: pos + 8,
            byte_len,
            hash: header.block_hash().to_string(),
            prev_hash: header.prev_blockhash.to_string(),
        });

        reader.seek(SeekFrom::Start(pos + 8 + byte_len as u64))?;
        pos += 8 + byte_len as u64;
    }

    Ok((blocks, pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;
    use bitcoin::{BlockHash, OutPoint, Script, Transaction as WireTx, TxIn, TxMerkleNode, TxOut};
    use std::io::Write;
    use tempfile::TempDir;

    const MAGIC: [u8; 4] = [0xfa, 0xbf, 0xb5, 0xda];

    fn test_header(prev: BlockHash, nonce: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_blockhash: prev,
            merkle_root: TxMerkleNode::from_slice(&[0u8; 32]).unwrap(),
            time: 1_231_006_505,
            bits: 0x1d00ffff,
            nonce,
        }
    }

    fn coinbase_tx(value: u64) -> WireTx {
        WireTx {
            version: 1,
            lock_time: 0,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: Script::new(),
                sequence: 0xffffffff,
                witness: Vec::new(),
            }],
            output: vec![TxOut {
                value,
                script_pubkey: Script::new(),
            }],
        }
    }

    fn write_segment(dir: &Path, name: &str, blocks: &[Vec<u8>], pad: usize) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        for block in blocks {
            file.write_all(&MAGIC).unwrap();
            file.write_all(&(block.len() as u32).to_le_bytes()).unwrap();
            file.write_all(block).unwrap();
        }
        file.write_all(&vec![0u8; pad]).unwrap();
        path
    }

    #[test]
    fn test_scan_segment_framing() {
        let tmp = TempDir::new().unwrap();
        let genesis = WireBlock {
            header: test_header(BlockHash::from_slice(&[0u8; 32]).unwrap(), 1),
            txdata: vec![coinbase_tx(50)],
        };
        let child = WireBlock {
            header: test_header(genesis.header.block_hash(), 2),
            txdata: vec![coinbase_tx(50)],
        };
        let genesis_bytes = serialize(&genesis);
        let child_bytes = serialize(&child);

        let path = write_segment(
            tmp.path(),
            "blk00000.dat",
            &[genesis_bytes.clone(), child_bytes.clone()],
            64,
        );

        let (scanned, end) = scan_segment(&path, MAGIC, 0).unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[0].offset, 8);
        assert_eq!(scanned[0].byte_len as usize, genesis_bytes.len());
        assert_eq!(scanned[1].offset, 8 + genesis_bytes.len() as u64 + 8);
        assert_eq!(scanned[1].prev_hash, scanned[0].hash);
        // Scanning stopped at the zero padding.
        assert_eq!(
            end,
            (genesis_bytes.len() + child_bytes.len() + 16) as u64
        );

        // Resume from the recorded end finds nothing new.
        let (rescanned, _) = scan_segment(&path, MAGIC, end).unwrap();
        assert!(rescanned.is_empty());
    }

    #[test]
    fn test_read_block_full_and_header_only() {
        let tmp = TempDir::new().unwrap();
        let wire = WireBlock {
            header: test_header(BlockHash::from_slice(&[0u8; 32]).unwrap(), 7),
            txdata: vec![coinbase_tx(5_000_000_000)],
        };
        let bytes = serialize(&wire);
        write_segment(tmp.path(), "blk00001.dat", &[bytes.clone()], 0);

        let reader = FileBlockReader::new(tmp.path());
        let block = reader.read_block("blk00001.dat", 8, 0, false).unwrap();
        assert_eq!(block.height, 0);
        assert_eq!(block.hash, wire.header.block_hash().to_string());
        assert_eq!(block.byte_size as usize, bytes.len());
        assert_eq!(block.transactions.len(), 1);

        let tx = &block.transactions[0];
        assert_eq!(tx.hash, wire.txdata[0].txid().to_string());
        // Header (80) plus one varint byte for the tx count.
        assert_eq!(tx.file_position, 8 + 81);
        assert!(tx.inputs[0].coinbase);
        assert_eq!(tx.outputs[0].value, 5_000_000_000);

        let header = reader.read_block("blk00001.dat", 8, 0, true).unwrap();
        assert_eq!(header.hash, block.hash);
        assert!(header.transactions.is_empty());
    }
}
