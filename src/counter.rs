//! In-memory "next ordinal" cache, one counter per key prefix.
//!
//! The first request for a prefix seeds the counter with a bounded range
//! scan over the existing list entries; later requests are pure in-memory
//! increments. Counters are process-local on purpose: every list row is
//! written in the same atomic batch, so a crash can never leave a counter
//! ahead of the store, and a fresh process reseeds from what it finds.

use rocksdb::{Direction, IteratorMode, DB};
use std::collections::HashMap;

use crate::keyspace;

pub struct OrdinalCache {
    next: HashMap<String, u32>,
}

impl OrdinalCache {
    pub fn new() -> Self {
        Self {
            next: HashMap::new(),
        }
    }

    /// Allocate the next 1-based ordinal for `prefix`.
    ///
    /// The scan bound caps a single prefix at just under 10^8 entries;
    /// widen the ordinal width before any list can reach that.
    pub fn next_ordinal(&mut self, db: &DB, prefix: &str) -> Result<u32, rocksdb::Error> {
        if let Some(n) = self.next.get_mut(prefix) {
            *n += 1;
            return Ok(*n);
        }

        let (start, limit) = keyspace::ordinal_bounds(prefix);
        let mut count: u32 = 0;
        let iter = db.iterator(IteratorMode::From(start.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if key.as_ref() >= limit.as_bytes() {
                break;
            }
            count += 1;
        }

        let seeded = count + 1;
        self.next.insert(prefix.to_string(), seeded);
        Ok(seeded)
    }
}

impl Default for OrdinalCache {
    fn default() -> Self {
        Self::new()
    }
}
