//! Indexed-chain high-water mark.

use rocksdb::DB;

use crate::keyspace;

/// Highest indexed height, or `None` on a cold store.
pub fn highest_block(db: &DB) -> Result<Option<u64>, rocksdb::Error> {
    match db.get(keyspace::HIGHEST_BLOCK)? {
        Some(bytes) => Ok(parse_height(&bytes)),
        None => Ok(None),
    }
}

pub fn parse_height(bytes: &[u8]) -> Option<u64> {
    std::str::from_utf8(bytes).ok()?.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocksdb::Options;
    use tempfile::TempDir;

    #[test]
    fn test_cold_store_reports_none() {
        let tmp = TempDir::new().unwrap();
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, tmp.path()).unwrap();

        assert_eq!(highest_block(&db).unwrap(), None);

        db.put(keyspace::HIGHEST_BLOCK, keyspace::encode_height(42))
            .unwrap();
        assert_eq!(highest_block(&db).unwrap(), Some(42));
    }
}
