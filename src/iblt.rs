//! Invertible Bloom Lookup Table: the set sketch behind sync requests.
//!
//! The table is a fixed array of cells split into `HASH_COUNT` equal
//! sub-tables, one hash function per sub-table. Inserting a key updates one
//! cell in each sub-table; the difference of two tables peels back to the
//! symmetric difference of the inserted key sets as long as that difference
//! is within the table's capacity.

use std::collections::BTreeSet;
use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{PubsyncError, Result};
use crate::hash::{murmur3_key, CHECK_SEED};

/// Number of hash functions, and of sub-tables.
const HASH_COUNT: usize = 3;

/// Bytes per cell on the wire: three little-endian 32-bit words.
const CELL_BYTES: usize = 12;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Cell {
    count: i32,
    key_sum: u32,
    key_check: u32,
}

impl Cell {
    fn is_empty(self) -> bool {
        self.count == 0 && self.key_sum == 0 && self.key_check == 0
    }

    fn is_pure(self) -> bool {
        (self.count == 1 || self.count == -1)
            && murmur3_key(CHECK_SEED, self.key_sum) == self.key_check
    }
}

/// Result of peel-decoding an IBLT difference.
///
/// `positive` keys were inserted only into the left operand of the
/// difference, `negative` keys only into the right. When `error` is set the
/// peel stopped early and the sets cover only the decodable subset.
#[derive(Debug, Default)]
pub struct Peeled {
    /// Keys with net count +1 in the difference.
    pub positive: BTreeSet<u32>,
    /// Keys with net count −1 in the difference.
    pub negative: BTreeSet<u32>,
    /// `DecodeIncomplete` when cells remained undecoded.
    pub error: Option<PubsyncError>,
}

impl Peeled {
    /// Check whether every cell decoded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Invertible Bloom Lookup Table over 32-bit keys.
///
/// # Example
///
/// ```rust
/// use pubsync::Iblt;
///
/// let mut ours = Iblt::new(32);
/// ours.insert(7);
/// let theirs = Iblt::new(32);
/// let peeled = ours.difference(&theirs).list();
/// assert!(peeled.positive.contains(&7));
/// assert!(peeled.is_complete());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iblt {
    cells: Vec<Cell>,
}

impl Iblt {
    /// Create an empty table sized for `expected_entries` concurrent keys.
    ///
    /// The cell count is 1.5 times the expected entries, rounded up to a
    /// multiple of the hash-function count; the slack keeps the decode
    /// failure probability very low while the symmetric difference stays
    /// within `expected_entries`.
    ///
    /// # Panics
    ///
    /// Panics if `expected_entries` is zero.
    #[must_use]
    pub fn new(expected_entries: usize) -> Self {
        assert!(expected_entries > 0, "IBLT capacity must be nonzero");
        let mut cells = expected_entries + expected_entries.div_ceil(2);
        let remainder = cells % HASH_COUNT;
        if remainder != 0 {
            cells += HASH_COUNT - remainder;
        }
        Self {
            cells: vec![Cell::default(); cells],
        }
    }

    /// Number of cells in the table.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Check whether every cell is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|cell| cell.is_empty())
    }

    fn indices(&self, key: u32) -> [usize; HASH_COUNT] {
        let per_table = self.cells.len() / HASH_COUNT;
        let mut indices = [0; HASH_COUNT];
        for (table, slot) in indices.iter_mut().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let hash = murmur3_key(table as u32, key) as usize;
            *slot = table * per_table + hash % per_table;
        }
        indices
    }

    fn update(&mut self, delta: i32, key: u32) {
        let check = murmur3_key(CHECK_SEED, key);
        for index in self.indices(key) {
            let cell = &mut self.cells[index];
            cell.count += delta;
            cell.key_sum ^= key;
            cell.key_check ^= check;
        }
    }

    /// Detect a corrupted table or an invalid key before erase or peel:
    /// one of the key's cells is empty, or is pure but holds another key.
    fn inconsistent(&self, key: u32) -> bool {
        self.indices(key).into_iter().any(|index| {
            let cell = self.cells[index];
            cell.is_empty() || (cell.is_pure() && cell.key_sum != key)
        })
    }

    /// Insert a key.
    pub fn insert(&mut self, key: u32) {
        self.update(1, key);
    }

    /// Erase a previously inserted key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidErase` and leaves the table unchanged if the key's
    /// cells are inconsistent — a double erase, or a key never inserted.
    pub fn erase(&mut self, key: u32) -> Result<()> {
        if self.inconsistent(key) {
            return Err(PubsyncError::InvalidErase { key });
        }
        self.update(-1, key);
        Ok(())
    }

    /// Cell-wise difference `self − other`.
    ///
    /// Keys only in `self` carry count +1 in the result, keys only in
    /// `other` count −1.
    ///
    /// # Panics
    ///
    /// Panics if the tables have different cell counts.
    #[must_use]
    pub fn difference(&self, other: &Iblt) -> Iblt {
        assert_eq!(
            self.cells.len(),
            other.cells.len(),
            "IBLT difference requires equal cell counts"
        );
        let cells = self
            .cells
            .iter()
            .zip(&other.cells)
            .map(|(a, b)| Cell {
                count: a.count - b.count,
                key_sum: a.key_sum ^ b.key_sum,
                key_check: a.key_check ^ b.key_check,
            })
            .collect();
        Iblt { cells }
    }

    /// Peel-decode the table, listing every recoverable key.
    ///
    /// Repeatedly removes pure cells until nothing changes. If a pure
    /// cell's sibling cells are inconsistent, or cells remain undecoded,
    /// the result carries a `DecodeIncomplete` error along with the keys
    /// recovered so far; callers serve that known subset best-effort.
    #[must_use]
    pub fn list(&self) -> Peeled {
        let mut work = self.clone();
        let mut peeled = Peeled::default();

        loop {
            let mut progressed = false;
            for index in 0..work.cells.len() {
                let cell = work.cells[index];
                if !cell.is_pure() {
                    continue;
                }
                let key = cell.key_sum;
                if work.inconsistent(key) {
                    peeled.error = Some(PubsyncError::DecodeIncomplete {
                        residual: work.residual(),
                    });
                    return peeled;
                }
                if cell.count == 1 {
                    peeled.positive.insert(key);
                } else {
                    peeled.negative.insert(key);
                }
                work.update(-cell.count, key);
                progressed = true;
            }
            if !progressed {
                break;
            }
        }

        if !work.is_empty() {
            peeled.error = Some(PubsyncError::DecodeIncomplete {
                residual: work.residual(),
            });
        }
        peeled
    }

    fn residual(&self) -> usize {
        self.cells.iter().filter(|cell| !cell.is_empty()).count()
    }

    /// Encode the table as an opaque name component: cells as little-endian
    /// `count`, `key_sum`, `key_check` words in cell order, zlib-compressed.
    ///
    /// # Errors
    ///
    /// Returns `Codec` if compression fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut raw = Vec::with_capacity(self.cells.len() * CELL_BYTES);
        for cell in &self.cells {
            raw.extend_from_slice(&cell.count.to_le_bytes());
            raw.extend_from_slice(&cell.key_sum.to_le_bytes());
            raw.extend_from_slice(&cell.key_check.to_le_bytes());
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&raw)
            .and_then(|()| encoder.finish())
            .map_err(|e| PubsyncError::Codec(format!("IBLT compress: {e}")))
    }

    /// Decode a received name component into a table sized for
    /// `expected_entries`.
    ///
    /// # Errors
    ///
    /// Returns `Codec` if decompression fails, or `SizeMismatch` if the
    /// decompressed cell array does not match the configured capacity.
    pub fn decode(expected_entries: usize, component: &[u8]) -> Result<Self> {
        let mut iblt = Self::new(expected_entries);

        let mut raw = Vec::with_capacity(iblt.cells.len() * CELL_BYTES);
        ZlibDecoder::new(component)
            .read_to_end(&mut raw)
            .map_err(|e| PubsyncError::Codec(format!("IBLT decompress: {e}")))?;

        let expected = iblt.cells.len() * CELL_BYTES;
        if raw.len() != expected {
            return Err(PubsyncError::SizeMismatch {
                expected,
                actual: raw.len(),
            });
        }

        for (cell, chunk) in iblt.cells.iter_mut().zip(raw.chunks_exact(CELL_BYTES)) {
            cell.count = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            cell.key_sum = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
            cell.key_check = u32::from_le_bytes([chunk[8], chunk[9], chunk[10], chunk[11]]);
        }
        Ok(iblt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn capacity_rounds_to_hash_count() {
        assert_eq!(Iblt::new(32).cell_count(), 48);
        assert_eq!(Iblt::new(85).cell_count(), 129);
        assert_eq!(Iblt::new(1).cell_count(), 3);
    }

    #[test]
    fn basic_decode() {
        let mut ours = Iblt::new(32);
        for key in [1, 2, 3] {
            ours.insert(key);
        }

        let peeled = ours.difference(&Iblt::new(32)).list();
        assert!(peeled.is_complete());
        assert_eq!(peeled.positive, BTreeSet::from([1, 2, 3]));
        assert!(peeled.negative.is_empty());
    }

    #[test]
    fn overflow_decode_is_incomplete() {
        let mut ours = Iblt::new(32);
        let mut rng = StdRng::seed_from_u64(2);
        let mut keys = BTreeSet::new();
        while keys.len() < 128 {
            keys.insert(rng.gen::<u32>());
        }
        for &key in &keys {
            ours.insert(key);
        }

        let peeled = ours.difference(&Iblt::new(32)).list();
        assert!(!peeled.is_complete());
        assert!(matches!(
            peeled.error,
            Some(PubsyncError::DecodeIncomplete { residual }) if residual > 0
        ));
    }

    #[test]
    fn difference_signs() {
        let mut a = Iblt::new(32);
        a.insert(1);
        a.insert(2);
        let mut b = Iblt::new(32);
        b.insert(2);
        b.insert(3);

        let peeled = a.difference(&b).list();
        assert!(peeled.is_complete());
        assert_eq!(peeled.positive, BTreeSet::from([1]));
        assert_eq!(peeled.negative, BTreeSet::from([3]));
    }

    #[test]
    fn balanced_updates_leave_table_empty() {
        let mut iblt = Iblt::new(32);
        let keys = [10, 20, 30, 40, 50];
        for &key in &keys {
            iblt.insert(key);
        }
        for &key in &keys {
            iblt.erase(key).unwrap();
        }
        assert!(iblt.is_empty());
        assert_eq!(iblt, Iblt::new(32));
    }

    #[test]
    fn erase_is_inverse_of_insert() {
        let mut iblt = Iblt::new(32);
        iblt.insert(111);
        iblt.insert(222);
        let snapshot = iblt.clone();

        iblt.insert(333);
        iblt.erase(333).unwrap();
        assert_eq!(iblt, snapshot);
    }

    #[test]
    fn erase_refuses_unknown_key() {
        let mut iblt = Iblt::new(32);
        iblt.insert(5);
        let snapshot = iblt.clone();

        let err = iblt.erase(6).unwrap_err();
        assert!(matches!(err, PubsyncError::InvalidErase { key: 6 }));
        assert_eq!(iblt, snapshot);
    }

    #[test]
    fn erase_refuses_double_erase() {
        let mut iblt = Iblt::new(32);
        iblt.insert(9);
        iblt.erase(9).unwrap();
        let snapshot = iblt.clone();

        assert!(iblt.erase(9).is_err());
        assert_eq!(iblt, snapshot);
    }

    #[test]
    fn duplicate_insertions_erase_one_at_a_time() {
        let mut iblt = Iblt::new(32);
        iblt.insert(77);
        iblt.insert(77);
        iblt.erase(77).unwrap();
        iblt.erase(77).unwrap();
        assert!(iblt.is_empty());
        assert!(iblt.erase(77).is_err());
    }

    #[test]
    fn wire_roundtrip() {
        let mut iblt = Iblt::new(32);
        for key in [0xdead_beef, 0xcafe_f00d, 42] {
            iblt.insert(key);
        }

        let component = iblt.encode().unwrap();
        let back = Iblt::decode(32, &component).unwrap();
        assert_eq!(iblt, back);
    }

    #[test]
    fn empty_table_wire_roundtrip() {
        let iblt = Iblt::new(85);
        let component = iblt.encode().unwrap();
        assert_eq!(Iblt::decode(85, &component).unwrap(), iblt);
    }

    #[test]
    fn decode_rejects_wrong_capacity() {
        let mut iblt = Iblt::new(32);
        iblt.insert(1);
        let component = iblt.encode().unwrap();

        let err = Iblt::decode(64, &component).unwrap_err();
        assert!(matches!(err, PubsyncError::SizeMismatch { .. }));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Iblt::decode(32, &[0x01, 0x02, 0x03]).is_err());
    }

    #[test]
    fn symmetric_difference_trials() {
        let mut rng = StdRng::seed_from_u64(7);
        let trials = 500;
        let mut complete = 0;

        for _ in 0..trials {
            let mut universe = BTreeSet::new();
            while universe.len() < 48 {
                universe.insert(rng.gen::<u32>());
            }
            let universe: Vec<u32> = universe.into_iter().collect();
            let (a_only, rest) = universe.split_at(12);
            let (b_only, shared) = rest.split_at(12);

            let mut a = Iblt::new(32);
            let mut b = Iblt::new(32);
            for &key in a_only.iter().chain(shared) {
                a.insert(key);
            }
            for &key in b_only.iter().chain(shared) {
                b.insert(key);
            }

            let peeled = a.difference(&b).list();
            if peeled.is_complete() {
                assert_eq!(peeled.positive, a_only.iter().copied().collect());
                assert_eq!(peeled.negative, b_only.iter().copied().collect());
                complete += 1;
            }
        }

        // The 1.5x slack target: at least 99% of in-capacity differences decode.
        assert!(
            complete * 100 >= trials * 99,
            "only {complete}/{trials} decodes completed"
        );
    }
}
