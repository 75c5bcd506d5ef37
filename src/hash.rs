//! Content hashing for ropes.
//!
//! The hash is a seeded FNV-1a over the byte stream. Feeding it byte by byte
//! means the result doesn't depend on how the rope happens to be chunked, so
//! structurally different ropes with the same bytes hash the same.

use std::sync::OnceLock;

const FNV_PRIME: u64 = 0x0000_0100_0000_01B3;
const FNV_OFFSET: u64 = 0xCBF2_9CE4_8422_2325;

static SEED: OnceLock<u64> = OnceLock::new();

#[cfg(feature = "ddos_protection")]
fn make_seed() -> u64 {
    use rand::prelude::*;
    SmallRng::from_entropy().gen()
}

#[cfg(not(feature = "ddos_protection"))]
fn make_seed() -> u64 { 0x5eed }

pub(crate) fn seed() -> u64 {
    *SEED.get_or_init(make_seed)
}

#[derive(Debug, Clone)]
pub(crate) struct RopeHasher(u64);

impl RopeHasher {
    pub(crate) fn new() -> Self {
        RopeHasher(FNV_OFFSET ^ seed())
    }

    #[inline]
    pub(crate) fn write(&mut self, bytes: &[u8]) {
        let mut h = self.0;
        for &b in bytes {
            h ^= b as u64;
            h = h.wrapping_mul(FNV_PRIME);
        }
        self.0 = h;
    }

    pub(crate) fn finish(&self) -> u64 {
        // Zero is reserved as the "not computed yet" marker in rope caches.
        if self.0 == 0 { 1 } else { self.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_chunks(chunks: &[&[u8]]) -> u64 {
        let mut h = RopeHasher::new();
        for c in chunks { h.write(c); }
        h.finish()
    }

    #[test]
    fn chunking_does_not_matter() {
        assert_eq!(hash_chunks(&[b"hello world"]), hash_chunks(&[b"hel", b"", b"lo wor", b"ld"]));
        assert_ne!(hash_chunks(&[b"hello"]), hash_chunks(&[b"hellp"]));
        assert_ne!(hash_chunks(&[]), 0);
    }
}
