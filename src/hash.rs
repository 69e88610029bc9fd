use std::fmt;
use std::hash::Hasher as StdHasher;

use twox_hash::XxHash32;

/// Seed for package checksums, part of the wire format.
pub const CHECKSUM_SEED: u32 = 0;

// Make the checksum api be similiar to blake3's
pub struct Checksum(XxHash32);

impl Checksum {
    pub fn new() -> Checksum {
        Checksum(XxHash32::with_seed(CHECKSUM_SEED))
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.write(data);
    }

    pub fn finalize(self) -> u32 {
        self.0.finish() as u32
    }
}

impl Default for Checksum {
    fn default() -> Self {
        Checksum::new()
    }
}

pub fn checksum(data: &[u8]) -> u32 {
    let mut hash = Checksum::new();
    hash.update(data);
    hash.finalize()
}

/// BLAKE3 digest of one standard sized chunk, advertised by [`crate::info::Info`]
/// when the holder uses hash codes.
#[derive(PartialEq, Eq, Clone, Copy, Hash)]
pub struct ChunkHash(blake3::Hash);

pub const CHUNK_HASH_LEN: usize = blake3::OUT_LEN;

impl ChunkHash {
    pub fn compute(data: &[u8]) -> Self {
        ChunkHash(blake3::hash(data))
    }

    pub fn as_bytes(&self) -> &[u8; CHUNK_HASH_LEN] {
        self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }
}

impl From<[u8; CHUNK_HASH_LEN]> for ChunkHash {
    fn from(bytes: [u8; CHUNK_HASH_LEN]) -> Self {
        ChunkHash(blake3::Hash::from(bytes))
    }
}

impl TryFrom<&[u8]> for ChunkHash {
    type Error = usize;

    /// Fails with the offending length.
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; CHUNK_HASH_LEN] = bytes.try_into().map_err(|_| bytes.len())?;
        Ok(ChunkHash::from(arr))
    }
}

impl fmt::Debug for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkHash({})", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod test_hash {
    use super::*;

    #[test]
    fn checksum_streaming_matches_oneshot() {
        let mut hash = Checksum::new();
        hash.update(b"Hello ");
        hash.update(b"World!");

        assert_eq!(hash.finalize(), checksum(b"Hello World!"));
    }

    #[test]
    fn checksum_detects_order() {
        assert_ne!(checksum(&[0x00, 0x01]), checksum(&[0x01, 0x00]));
    }

    #[test]
    fn chunk_hash_from_slice() {
        let hash = ChunkHash::compute(b"chunk");
        let copy = ChunkHash::try_from(&hash.as_bytes()[..]).unwrap();
        assert_eq!(hash, copy);

        assert_eq!(ChunkHash::try_from(&[0u8; 5][..]), Err(5));
    }
}
