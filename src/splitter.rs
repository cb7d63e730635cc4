//! Deterministic bucketing of keys into `[1, 100]`.
//!
//! The hash function is versioned by the control plane (`algo` field of a flag definition), so
//! every algorithm ever shipped has to keep producing the same buckets.
use std::io::{self, Cursor};

use crate::{flag::Partition, CONTROL_TREATMENT};

/// A hash strategy used for bucketing.
pub trait BucketHasher {
    /// Hash `key` with `seed`. The result is widened to `i64` so that both signed and unsigned
    /// 32-bit hashes can be bucketed the same way.
    fn hash(&self, key: &str, seed: i32) -> io::Result<i64>;
}

/// The first-generation hash: a Java-style string hash (`31 * h + c` over UTF-16 code units) XOR-ed with
/// the seed.
pub struct LegacyHasher;

impl BucketHasher for LegacyHasher {
    fn hash(&self, key: &str, seed: i32) -> io::Result<i64> {
        let h = key
            .encode_utf16()
            .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32));
        Ok(i64::from(h ^ seed))
    }
}

/// MurmurHash3 (x86, 32-bit) over the UTF-8 bytes of the key, read as an unsigned number.
pub struct Murmur3Hasher;

impl BucketHasher for Murmur3Hasher {
    fn hash(&self, key: &str, seed: i32) -> io::Result<i64> {
        let hash = murmur3::murmur3_32(&mut Cursor::new(key.as_bytes()), seed as u32)?;
        Ok(i64::from(hash))
    }
}

/// Hash algorithm selected per flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// `algo: 1`, and the fallback for unknown or missing identifiers.
    #[default]
    Legacy,
    /// `algo: 2`.
    Murmur3,
}

impl Algorithm {
    /// Map the identifier found in a flag definition to an algorithm.
    pub fn from_id(id: Option<i32>) -> Algorithm {
        match id {
            Some(2) => Algorithm::Murmur3,
            _ => Algorithm::Legacy,
        }
    }

    fn hasher(self) -> &'static dyn BucketHasher {
        match self {
            Algorithm::Legacy => &LegacyHasher,
            Algorithm::Murmur3 => &Murmur3Hasher,
        }
    }

    /// Compute the bucket (`1..=100`) of `key` under `seed`.
    ///
    /// # Errors
    ///
    /// Propagates a failure to read the key while hashing.
    pub fn bucket(self, key: &str, seed: i32) -> io::Result<i32> {
        self.hasher().hash(key, seed).map(bucket)
    }
}

fn bucket(hash: i64) -> i32 {
    // `%` truncates towards zero, so negative hashes are folded back with `abs()`.
    ((hash % 100).abs() + 1) as i32
}

/// Select a treatment from `partitions` for `key`.
///
/// Partition weights are accumulated in order until they cover the key's bucket. An empty list
/// or weights that never reach the bucket produce `control`.
pub(crate) fn get_treatment<'a>(
    key: &str,
    seed: i32,
    partitions: &'a [Partition],
    algorithm: Algorithm,
) -> io::Result<&'a str> {
    if partitions.is_empty() {
        return Ok(CONTROL_TREATMENT);
    }
    if let [partition] = partitions {
        if partition.size == 100 {
            return Ok(&partition.treatment);
        }
    }

    let bucket = algorithm.bucket(key, seed)?;
    let mut covered = 0;
    for partition in partitions {
        covered += partition.size;
        if covered >= bucket {
            return Ok(&partition.treatment);
        }
    }
    Ok(CONTROL_TREATMENT)
}
