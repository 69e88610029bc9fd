use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use log::warn;
use sodiumoxide::randombytes::randombytes_into;

use crate::wire::{ProtocolError, WireReader, WireWriter};

pub const CONTENT_ID_LEN: usize = 16;

static SODIUM: OnceLock<bool> = OnceLock::new();

/// Initialize libsodium once per process, safe to call from any thread.
/// Returns false when it could not be initialized.
pub fn init() -> bool {
    *SODIUM.get_or_init(|| {
        let ok = sodiumoxide::init().is_ok();
        if !ok {
            warn!("libsodium failed to initialize");
        }
        ok
    })
}

/// Identity of a dataset, independent of which bytes of it have been
/// transferred so far.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId([u8; CONTENT_ID_LEN]);

impl ContentId {
    /// Fresh identifier from the crypto grade RNG.
    pub fn new() -> Self {
        init();
        let mut bytes = [0u8; CONTENT_ID_LEN];
        randombytes_into(&mut bytes);
        ContentId(bytes)
    }

    pub fn from_bytes(bytes: [u8; CONTENT_ID_LEN]) -> Self {
        ContentId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CONTENT_ID_LEN] {
        &self.0
    }

    pub fn from_reader<R: WireReader>(reader: &mut R) -> Result<Self, ProtocolError> {
        let mut bytes = [0u8; CONTENT_ID_LEN];
        bytes.copy_from_slice(reader.take(CONTENT_ID_LEN)?);
        Ok(ContentId(bytes))
    }

    pub fn write_to<W: WireWriter>(&self, writer: &mut W) {
        writer.append_bytes(&self.0);
    }
}

impl Default for ContentId {
    fn default() -> Self {
        ContentId::new()
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", hex::encode(self.0))
    }
}

impl FromStr for ContentId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; CONTENT_ID_LEN];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(ContentId(bytes))
    }
}
