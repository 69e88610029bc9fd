//! Checksummed package, the payload container embedded by other messages
//!
//! | Type    | Name             | Description |
//! | ------: | ---------------- | ----------- |
//! | u8      | flags            | bit 0: payload is zstd compressed, bit 1: checksum present, others must be 0 |
//! | u32     | uncompressed_len | Length of the payload once decompressed |
//! | u32     | payload_len      | Length of the payload as carried on the wire |
//! | u32     | checksum         | xxHash32 (seed 0) of the wire payload, only present when flagged |
//! | [u8; N] | payload          | `payload_len` bytes |
//!
//! The checksum covers the bytes on the wire, after compression, so a broken
//! compressor shows up as a checksum failure on the receiving side.
use std::io::{Error, ErrorKind};

use log::{debug, warn};

use crate::hash;
use crate::wire::{ProtocolError, WireReader, WireWriter};

const FLAG_COMPRESSED: u8 = 0b0000_0001;
const FLAG_CHECKSUM: u8 = 0b0000_0010;
const FLAG_MASK: u8 = FLAG_COMPRESSED | FLAG_CHECKSUM;

/// Largest payload a package will carry, in either form.
pub const MAX_PACKAGE_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageConfig {
    pub use_compression: bool,
    pub do_checksum: bool,
}

impl PackageConfig {
    pub const PLAIN: PackageConfig = PackageConfig {
        use_compression: false,
        do_checksum: false,
    };

    pub fn new(use_compression: bool, do_checksum: bool) -> Self {
        PackageConfig {
            use_compression,
            do_checksum,
        }
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.use_compression {
            flags |= FLAG_COMPRESSED;
        }
        if self.do_checksum {
            flags |= FLAG_CHECKSUM;
        }
        flags
    }
}

impl Default for PackageConfig {
    fn default() -> Self {
        PackageConfig::new(true, true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    config: PackageConfig,
    data: Vec<u8>,
    encoded: Vec<u8>,
    checksum: Option<u32>,
    valid_checksum: bool,
}

impl Package {
    /// Wrap `data`, compressing and checksumming it per `config`.
    pub fn new(data: Vec<u8>, config: PackageConfig) -> std::io::Result<Self> {
        if data.len() > MAX_PACKAGE_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("package of {} bytes exceeds {}", data.len(), MAX_PACKAGE_SIZE),
            ));
        }

        let encoded = if config.use_compression {
            zstd::bulk::compress(&data, zstd::DEFAULT_COMPRESSION_LEVEL)?
        } else {
            data.clone()
        };
        let checksum = config.do_checksum.then(|| hash::checksum(&encoded));

        debug!(
            "package: {} bytes -> {} on wire, {:?}",
            data.len(),
            encoded.len(),
            config
        );

        Ok(Package {
            config,
            data,
            encoded,
            checksum,
            valid_checksum: true,
        })
    }

    /// Carry `data` as is, no compression and no checksum. Callers bound the
    /// size themselves.
    pub(crate) fn stored(data: Vec<u8>) -> Self {
        Package {
            config: PackageConfig::PLAIN,
            encoded: data.clone(),
            data,
            checksum: None,
            valid_checksum: true,
        }
    }

    pub fn config(&self) -> PackageConfig {
        self.config
    }

    pub fn use_compression(&self) -> bool {
        self.config.use_compression
    }

    pub fn do_checksum(&self) -> bool {
        self.config.do_checksum
    }

    /// False only when a checksum was carried and did not match. The decoded
    /// data of such a package is empty.
    pub fn valid_checksum(&self) -> bool {
        self.valid_checksum
    }

    /// The decoded payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Size of the payload as carried on the wire.
    pub fn encoded_len(&self) -> usize {
        self.encoded.len()
    }

    pub fn write_to<W: WireWriter>(&self, writer: &mut W) {
        writer.append_u8(self.config.flags());
        writer.append_u32(self.data.len() as u32);
        writer.append_u32(self.encoded.len() as u32);
        if let Some(checksum) = self.checksum {
            writer.append_u32(checksum);
        }
        writer.append_bytes(&self.encoded);
    }

    pub fn from_reader<R: WireReader>(reader: &mut R) -> Result<Self, ProtocolError> {
        let flags = reader.extract_u8()?;
        if flags & !FLAG_MASK != 0 {
            return Err(ProtocolError::MalformedMessage(format!(
                "unknown package flags 0x{:02x}",
                flags
            )));
        }
        let config = PackageConfig::new(flags & FLAG_COMPRESSED != 0, flags & FLAG_CHECKSUM != 0);

        let uncompressed_len = reader.extract_u32()? as usize;
        let payload_len = reader.extract_u32()? as usize;
        if uncompressed_len > MAX_PACKAGE_SIZE || payload_len > MAX_PACKAGE_SIZE {
            return Err(ProtocolError::MalformedMessage(format!(
                "package of {}/{} bytes exceeds {}",
                uncompressed_len, payload_len, MAX_PACKAGE_SIZE
            )));
        }

        let checksum = if config.do_checksum {
            Some(reader.extract_u32()?)
        } else {
            None
        };
        let encoded = reader.extract_bytes(payload_len)?;

        if let Some(expected) = checksum {
            let actual = hash::checksum(&encoded);
            if actual != expected {
                warn!(
                    "package checksum mismatch: expected {:08x}, got {:08x}",
                    expected, actual
                );
                return Ok(Package {
                    config,
                    data: Vec::new(),
                    encoded,
                    checksum,
                    valid_checksum: false,
                });
            }
        }

        let data = if config.use_compression {
            zstd::bulk::decompress(&encoded, uncompressed_len).map_err(ProtocolError::Decompression)?
        } else {
            encoded.clone()
        };

        if data.len() != uncompressed_len {
            return Err(ProtocolError::MalformedMessage(format!(
                "package declared {} bytes but decoded to {}",
                uncompressed_len,
                data.len()
            )));
        }

        Ok(Package {
            config,
            data,
            encoded,
            checksum,
            valid_checksum: true,
        })
    }
}
