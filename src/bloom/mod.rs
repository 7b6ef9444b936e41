/*!
Split-block Bloom filters (spec.md §4.6): the Parquet split-block scheme,
hashed with XXH64 seed 0, used for equality-predicate file skipping on
high-cardinality columns. Built with [`twox_hash::XxHash64`] (the standard
XXH64 implementation in the Rust ecosystem); the surrounding block/salt
scheme has no crate, so it's hand-rolled directly from the Parquet format
spec, the same way [`crate::hash::murmur3`] hand-rolls MurmurHash3 for the
bucket transform.
*/
use std::hash::Hasher;

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::error::{IcebergError, Result};

/// 4-byte file-format tag, distinct from any other file kind this crate
/// writes (spec.md §6).
pub const MAGIC: [u8; 4] = *b"IBBF";
const FORMAT_VERSION: u8 = 1;
const BLOCK_BYTES: usize = 32;
const WORDS_PER_BLOCK: usize = 8;

/// The 8 fixed odd salt constants of the Parquet split-block Bloom filter
/// scheme. Each salts one of the 8 words in a 32-byte block so that a
/// single 32-bit hash sets (up to) 8 bits spread across the block.
const SALT: [u32; WORDS_PER_BLOCK] = [
    0x47b6_137b, 0x4497_4d91, 0x8824_ad5b, 0xa2b7_289d, 0x7054_95c7, 0x2df1_424b, 0x9efc_4947, 0x5c6b_fb31,
];

fn xxh64(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(bytes);
    hasher.finish()
}

fn block_mask(low32: u32) -> [u32; WORDS_PER_BLOCK] {
    let mut mask = [0u32; WORDS_PER_BLOCK];
    for (i, salt) in SALT.iter().enumerate() {
        let y = low32.wrapping_mul(*salt);
        mask[i] = 1u32 << (y >> 27);
    }
    mask
}

/// A single column's split-block Bloom filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    blocks: Vec<[u32; WORDS_PER_BLOCK]>,
}

impl BloomFilter {
    /// A filter with exactly `num_blocks` empty 32-byte blocks.
    pub fn new(num_blocks: u32) -> Self {
        BloomFilter {
            blocks: vec![[0u32; WORDS_PER_BLOCK]; num_blocks.max(1) as usize],
        }
    }

    /// Size a filter for `expected_items` at the target false-positive
    /// rate `fpp`, optionally clamped to fit within `byte_budget` bytes
    /// (spec.md §4.6).
    pub fn with_capacity(expected_items: u64, fpp: f64, byte_budget: Option<u64>) -> Self {
        BloomFilter::new(optimal_num_blocks(expected_items, fpp, byte_budget))
    }

    /// Number of 32-byte blocks in this filter.
    pub fn num_blocks(&self) -> u32 {
        self.blocks.len() as u32
    }

    fn locate(&self, bytes: &[u8]) -> (usize, [u32; WORDS_PER_BLOCK]) {
        let h = xxh64(bytes);
        let block_index = ((h >> 32) as u32 as u64 % self.blocks.len() as u64) as usize;
        let mask = block_mask(h as u32);
        (block_index, mask)
    }

    /// Insert one item.
    pub fn insert(&mut self, bytes: &[u8]) {
        let (idx, mask) = self.locate(bytes);
        for (word, bit) in self.blocks[idx].iter_mut().zip(mask.iter()) {
            *word |= bit;
        }
    }

    /// Whether `bytes` might be a member. `false` is a hard guarantee of
    /// absence; `true` may be a false positive.
    pub fn might_contain(&self, bytes: &[u8]) -> bool {
        let (idx, mask) = self.locate(bytes);
        self.blocks[idx].iter().zip(mask.iter()).all(|(word, bit)| word & bit == *bit)
    }

    /// Whether any of `items` might be a member.
    pub fn might_contain_any(&self, items: &[&[u8]]) -> bool {
        items.iter().any(|item| self.might_contain(item))
    }

    /// Merge `other` into `self` by block-wise bitwise OR. Both filters
    /// must have the same block count (spec.md §4.6); mismatched sizes
    /// cannot be merged.
    pub fn merge(&mut self, other: &BloomFilter) -> Result<()> {
        if self.blocks.len() != other.blocks.len() {
            return Err(IcebergError::Validation(format!(
                "cannot merge bloom filters with {} and {} blocks",
                self.blocks.len(),
                other.blocks.len()
            )));
        }
        for (a, b) in self.blocks.iter_mut().zip(other.blocks.iter()) {
            for (wa, wb) in a.iter_mut().zip(b.iter()) {
                *wa |= wb;
            }
        }
        Ok(())
    }

    /// Serialize as `magic(4) | version(1) | num_blocks(4, LE) |
    /// blocks[num_blocks * 32]` (spec.md §4.6, §6).
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(9 + self.blocks.len() * BLOCK_BYTES);
        out.extend_from_slice(&MAGIC);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&(self.blocks.len() as u32).to_le_bytes());
        for block in &self.blocks {
            for word in block {
                out.extend_from_slice(&word.to_le_bytes());
            }
        }
        out
    }

    /// Parse a filter previously produced by [`BloomFilter::serialize`].
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 9 || data[0..4] != MAGIC {
            return Err(IcebergError::Validation("bad bloom filter magic".to_string()));
        }
        let version = data[4];
        if version != FORMAT_VERSION {
            return Err(IcebergError::Validation(format!("unsupported bloom filter version {version}")));
        }
        let num_blocks = u32::from_le_bytes(data[5..9].try_into().unwrap()) as usize;
        let expected_len = 9 + num_blocks * BLOCK_BYTES;
        if data.len() != expected_len {
            return Err(IcebergError::Validation(format!(
                "bloom filter length mismatch: expected {expected_len}, got {}",
                data.len()
            )));
        }
        let mut blocks = Vec::with_capacity(num_blocks);
        let mut pos = 9;
        for _ in 0..num_blocks {
            let mut block = [0u32; WORDS_PER_BLOCK];
            for word in block.iter_mut() {
                *word = u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap());
                pos += 4;
            }
            blocks.push(block);
        }
        Ok(BloomFilter { blocks })
    }
}

/// Compute a block count sized for `expected_items` at false-positive rate
/// `fpp`, rounded to a power of two, clamped by an optional byte budget
/// and never smaller than one block.
pub fn optimal_num_blocks(expected_items: u64, fpp: f64, byte_budget: Option<u64>) -> u32 {
    let n = expected_items.max(1) as f64;
    let num_bits = (-8.0 * n / (1.0 - fpp.powf(1.0 / 8.0)).ln()).ceil();
    let num_bytes = (num_bits / 8.0).ceil() as u64;
    let mut num_blocks = ((num_bytes + (BLOCK_BYTES as u64 - 1)) / BLOCK_BYTES as u64).max(1);
    num_blocks = num_blocks.next_power_of_two();
    if let Some(budget) = byte_budget {
        let budget_blocks = (budget / BLOCK_BYTES as u64).max(1);
        num_blocks = num_blocks.min(budget_blocks);
    }
    num_blocks as u32
}

/// Whether a reader should bother opening a data file given an (optional)
/// equality-predicate Bloom filter: no filter means "yes, can't skip";
/// a filter says "maybe" or "definitely not" (spec.md §4.6).
pub fn should_read_file(filter: Option<&BloomFilter>, probe_bytes: &[u8]) -> bool {
    match filter {
        None => true,
        Some(f) => f.might_contain(probe_bytes),
    }
}

/// Trailer metadata recorded alongside a serialized filter, describing how
/// it was built (spec.md §4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloomFilterTrailer {
    /// Number of items inserted.
    pub count: u64,
    /// Target false-positive rate used to size the filter.
    pub false_positive_rate: f64,
    /// Always `"SPLIT_BLOCK"`.
    pub algorithm: String,
    /// Always `"XXHASH64"`.
    pub hash_function: String,
}

impl BloomFilterTrailer {
    /// Build a trailer describing a filter built for `count` items at
    /// `false_positive_rate`.
    pub fn new(count: u64, false_positive_rate: f64) -> Self {
        BloomFilterTrailer {
            count,
            false_positive_rate,
            algorithm: "SPLIT_BLOCK".to_string(),
            hash_function: "XXHASH64".to_string(),
        }
    }
}

/// One entry in a bloom-filter file's directory, locating a single column's
/// filter within the aggregate blob (spec.md §4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloomFilterDirectoryEntry {
    /// Field id the filter was built over.
    pub field_id: i32,
    /// Column name, for human-readable tooling.
    pub column_name: String,
    /// Byte offset of this column's serialized filter within the file.
    pub offset: u64,
    /// Byte length of this column's serialized filter.
    pub length: u64,
}

/// An aggregate bloom-filter file: one filter per column, addressed by a
/// directory. Layout: `directory_len(8, LE) | directory (JSON) |
/// filter bytes back-to-back at the offsets the directory records`.
#[derive(Debug, Clone, Default)]
pub struct BloomFilterFile {
    entries: Vec<(BloomFilterDirectoryEntry, Vec<u8>)>,
}

impl BloomFilterFile {
    /// An empty file, ready to have per-column filters added.
    pub fn new() -> Self {
        BloomFilterFile::default()
    }

    /// Add one column's filter to the file.
    pub fn add_column(&mut self, field_id: i32, column_name: impl Into<String>, filter: &BloomFilter) {
        let bytes = filter.serialize();
        self.entries.push((
            BloomFilterDirectoryEntry {
                field_id,
                column_name: column_name.into(),
                offset: 0,
                length: bytes.len() as u64,
            },
            bytes,
        ));
    }

    /// Serialize the aggregate file, computing final offsets.
    pub fn write(&self) -> Result<Vec<u8>> {
        let mut directory: Vec<BloomFilterDirectoryEntry> = Vec::with_capacity(self.entries.len());
        let mut blobs: Vec<&[u8]> = Vec::with_capacity(self.entries.len());
        // Offsets are relative to the start of the blob region, computed
        // after the directory is serialized below.
        let mut running: u64 = 0;
        for (entry, bytes) in &self.entries {
            directory.push(BloomFilterDirectoryEntry {
                field_id: entry.field_id,
                column_name: entry.column_name.clone(),
                offset: running,
                length: bytes.len() as u64,
            });
            running += bytes.len() as u64;
            blobs.push(bytes);
        }
        let directory_json =
            serde_json::to_vec(&directory).map_err(|e| IcebergError::Validation(e.to_string()))?;
        let mut out = Vec::with_capacity(8 + directory_json.len() + running as usize);
        out.extend_from_slice(&(directory_json.len() as u64).to_le_bytes());
        out.extend_from_slice(&directory_json);
        for blob in blobs {
            out.extend_from_slice(blob);
        }
        Ok(out)
    }

    /// Parse an aggregate file's directory (without eagerly parsing every
    /// filter) and return `(directory, blob_region)`.
    pub fn read_directory(data: &[u8]) -> Result<(Vec<BloomFilterDirectoryEntry>, &[u8])> {
        if data.len() < 8 {
            return Err(IcebergError::Validation("bloom filter file too short".to_string()));
        }
        let directory_len = u64::from_le_bytes(data[0..8].try_into().unwrap()) as usize;
        let directory_start = 8;
        let blob_start = directory_start + directory_len;
        if data.len() < blob_start {
            return Err(IcebergError::Validation("bloom filter file truncated".to_string()));
        }
        let directory: Vec<BloomFilterDirectoryEntry> =
            serde_json::from_slice(&data[directory_start..blob_start]).map_err(|e| IcebergError::Validation(e.to_string()))?;
        Ok((directory, &data[blob_start..]))
    }

    /// Read and parse the filter for one column out of an aggregate file's
    /// bytes, given its directory entry.
    pub fn read_column(blob_region: &[u8], entry: &BloomFilterDirectoryEntry) -> Result<BloomFilter> {
        let start = entry.offset as usize;
        let end = start + entry.length as usize;
        if end > blob_region.len() {
            return Err(IcebergError::Validation("bloom filter directory entry out of range".to_string()));
        }
        BloomFilter::parse(&blob_region[start..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_no_false_negatives() {
        let mut f = BloomFilter::with_capacity(1000, 0.01, None);
        let items: Vec<Vec<u8>> = (0..1000).map(|i: u32| i.to_le_bytes().to_vec()).collect();
        for item in &items {
            f.insert(item);
        }
        for item in &items {
            assert!(f.might_contain(item));
        }
    }

    #[test]
    fn test_serialize_parse_roundtrip() {
        let mut f = BloomFilter::new(4);
        f.insert(b"hello");
        f.insert(b"world");
        let bytes = f.serialize();
        let back = BloomFilter::parse(&bytes).unwrap();
        assert_eq!(f, back);
        assert!(back.might_contain(b"hello"));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = BloomFilter::new(1).serialize();
        bytes[0] = 0;
        assert!(BloomFilter::parse(&bytes).is_err());
    }

    #[test]
    fn test_merge_same_block_count() {
        let mut a = BloomFilter::new(2);
        a.insert(b"a");
        let mut b = BloomFilter::new(2);
        b.insert(b"b");
        a.merge(&b).unwrap();
        assert!(a.might_contain(b"a"));
        assert!(a.might_contain(b"b"));
    }

    #[test]
    fn test_merge_rejects_mismatched_block_count() {
        let mut a = BloomFilter::new(2);
        let b = BloomFilter::new(4);
        assert!(a.merge(&b).is_err());
    }

    #[test]
    fn test_should_read_file_with_no_filter() {
        assert!(should_read_file(None, b"anything"));
    }

    #[test]
    fn test_should_read_file_with_filter_absent_item() {
        let f = BloomFilter::new(8);
        assert!(!should_read_file(Some(&f), b"not-inserted"));
    }

    #[test]
    fn test_file_directory_roundtrip() {
        let mut file = BloomFilterFile::new();
        let mut f1 = BloomFilter::new(2);
        f1.insert(b"x");
        let mut f2 = BloomFilter::new(2);
        f2.insert(b"y");
        file.add_column(1, "a", &f1);
        file.add_column(2, "b", &f2);
        let bytes = file.write().unwrap();
        let (directory, blob_region) = BloomFilterFile::read_directory(&bytes).unwrap();
        assert_eq!(directory.len(), 2);
        let back_f1 = BloomFilterFile::read_column(blob_region, &directory[0]).unwrap();
        assert!(back_f1.might_contain(b"x"));
    }

    proptest! {
        // spec.md §8 invariant 7: no false negatives for inserted items.
        #[test]
        fn prop_no_false_negatives(items in prop::collection::vec(any::<Vec<u8>>(), 1..50)) {
            let mut f = BloomFilter::with_capacity(items.len() as u64, 0.01, None);
            for item in &items {
                f.insert(item);
            }
            for item in &items {
                prop_assert!(f.might_contain(item));
            }
        }
    }
}
