use std::hash::Hasher;

use lazy_static::lazy_static;
use pyo3::pyclass;
use siphasher::sip::SipHasher;

#[pyclass(eq, eq_int)]
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum HashMethod {
    SipHash,
    XXHash,
    Strong,
}

impl HashMethod {
    /// Hash one token assembled from one or more byte slices.
    pub fn hash_parts<'a>(self, parts: impl Iterator<Item = &'a [u8]>) -> u64 {
        match self {
            HashMethod::SipHash => sip_hash_fn(parts),
            HashMethod::XXHash => xxh3_hash_fn(parts),
            HashMethod::Strong => strong_hash_fn(parts),
        }
    }

    /// Hash a single contiguous token.
    pub fn hash_bytes(self, bytes: &[u8]) -> u64 {
        self.hash_parts(std::iter::once(bytes))
    }
}

pub fn sip_hash_fn<'a>(parts: impl Iterator<Item = &'a [u8]>) -> u64 {
    let mut hasher = SipHasher::new();
    for part in parts {
        hasher.write(part);
    }
    hasher.finish()
}

pub fn xxh3_hash_fn<'a>(parts: impl Iterator<Item = &'a [u8]>) -> u64 {
    let mut hasher = xxhash_rust::xxh3::Xxh3::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.digest()
}

const STRONG_SEED: u64 = 0xBB40_E64D_A205_B064;
const STRONG_MULT: u64 = 7_664_345_821_815_920_749;

lazy_static! {
    static ref STRONG_BYTE_TABLE: [u64; 256] = {
        let mut table = [0u64; 256];
        let mut h: u64 = 0x544B_2FBA_CAAF_1684;
        for slot in table.iter_mut() {
            for _ in 0..31 {
                h ^= h << 13;
                h ^= h >> 7;
                h ^= h << 17;
            }
            *slot = h;
        }
        table
    };
}

/// Multiplicative byte-table hash. No per-process state, so values are
/// stable across runs and platforms.
pub fn strong_hash_fn<'a>(parts: impl Iterator<Item = &'a [u8]>) -> u64 {
    let mut h = STRONG_SEED;
    for part in parts {
        for &byte in part {
            h = h.wrapping_mul(STRONG_MULT) ^ STRONG_BYTE_TABLE[byte as usize];
        }
    }
    h
}
