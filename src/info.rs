//! Dataset information exchange
//!
//! A requester asks for [`InfoRequest`], the holder answers with either an
//! [`Info`] describing the dataset or a [`NoInfo`].
//!
//! `Info` field order on the wire:
//!
//! | Type          | Name            | Description |
//! | ------------: | --------------- | ----------- |
//! | [u8; 16]      | dataset_id      | |
//! | u64           | data_length     | Total size of the dataset |
//! | u32           | data_chunk_size | Standard chunk size, unit of hash codes and availability |
//! | bool          | use_encryption  | |
//! | bool          | use_signing     | |
//! | bool          | uses_hash_codes | |
//! | u32 + N × counted bytes | hash codes | One BLAKE3 digest per chunk, count 0 when none |
//! | bool          | all_available   | |
//! | bool          | has_availability | |
//! | u32 + package | availability    | Only when `has_availability`: bit count, then the bitmap in a compressed package |
//! | `Option<Message>` | extra_info  | |
use std::io::{Read, Seek, SeekFrom};

use log::{debug, warn};

use crate::buf;
use crate::content_id::ContentId;
use crate::hash::ChunkHash;
use crate::package::{Package, PackageConfig, MAX_PACKAGE_SIZE};
use crate::wire::{Message, ProtocolError, Transmissible, WireReader, WireWriter};

/// Which standard chunks of a dataset a holder can serve. Bit `i` covers
/// `[i * data_chunk_size, (i + 1) * data_chunk_size)`, least significant bit
/// first within each byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkAvailability {
    bits: Vec<u8>,
    len: usize,
}

impl ChunkAvailability {
    /// Largest map that fits in a single package.
    pub const MAX_LEN: usize = MAX_PACKAGE_SIZE * 8;

    pub fn new(len: usize) -> std::io::Result<Self> {
        if len > Self::MAX_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("availability map of {} chunks exceeds {}", len, Self::MAX_LEN),
            ));
        }

        Ok(ChunkAvailability {
            bits: vec![0; len.div_ceil(8)],
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> bool {
        index < self.len && self.bits[index >> 3] & (1 << (index & 7)) != 0
    }

    /// Out of range indexes are ignored.
    pub fn set(&mut self, index: usize, available: bool) {
        if index >= self.len {
            return;
        }
        if available {
            self.bits[index >> 3] |= 1 << (index & 7);
        } else {
            self.bits[index >> 3] &= !(1 << (index & 7));
        }
    }

    pub fn count(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn is_full(&self) -> bool {
        self.count() == self.len
    }

    fn write_to<W: WireWriter>(&self, writer: &mut W) {
        writer.append_u32(self.len as u32);
        // Availability maps are long runs of the same bit
        let package = Package::new(self.bits.clone(), PackageConfig::new(true, false)).unwrap_or_else(|e| {
            warn!("availability map: compression failed, sending stored: {}", e);
            Package::stored(self.bits.clone())
        });
        package.write_to(writer);
    }

    fn from_reader<R: WireReader>(reader: &mut R) -> Result<Self, ProtocolError> {
        let len = reader.extract_u32()? as usize;
        let package = Package::from_reader(reader)?;
        if !package.valid_checksum() || package.data().len() != len.div_ceil(8) {
            return Err(ProtocolError::MalformedMessage(format!(
                "availability map of {} bits carried {} bytes",
                len,
                package.data().len()
            )));
        }

        let mut bits = package.into_data();
        // Padding bits past the end are meaningless, keep them clear
        if len % 8 != 0 {
            if let Some(last) = bits.last_mut() {
                *last &= (1u8 << (len % 8)) - 1;
            }
        }

        Ok(ChunkAvailability { bits, len })
    }
}

/// Everything a requester needs to know before asking for chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    pub dataset_id: ContentId,
    pub data_length: u64,
    pub data_chunk_size: u32,
    pub use_encryption: bool,
    pub use_signing: bool,
    pub uses_hash_codes: bool,
    pub chunk_hash_codes: Vec<ChunkHash>,
    pub all_available: bool,
    pub available_chunks: Option<ChunkAvailability>,
    pub extra_info: Option<Message>,
}

impl Info {
    pub fn new(dataset_id: ContentId) -> Self {
        Info {
            dataset_id,
            data_length: 0,
            data_chunk_size: 0,
            use_encryption: false,
            use_signing: false,
            uses_hash_codes: false,
            chunk_hash_codes: Vec::new(),
            all_available: false,
            available_chunks: None,
            extra_info: None,
        }
    }

    /// Holder side: describe the whole of `source` as fully available,
    /// optionally hashing every standard chunk.
    pub fn describe<S: Read + Seek>(
        source: &mut S,
        dataset_id: ContentId,
        data_chunk_size: u32,
        hash_codes: bool,
    ) -> std::io::Result<Self> {
        if data_chunk_size == 0 || data_chunk_size as usize > MAX_PACKAGE_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid chunk size {}", data_chunk_size),
            ));
        }

        let mut info = Info::new(dataset_id);
        info.data_length = source.seek(SeekFrom::End(0))?;
        info.data_chunk_size = data_chunk_size;
        info.all_available = true;

        if hash_codes {
            info.uses_hash_codes = true;
            for index in 0..info.chunk_count() {
                let (offset, size) = info.chunk_range(index).unwrap_or_default();
                let data = buf::read_at(source, offset, size as usize)?;
                info.chunk_hash_codes.push(ChunkHash::compute(&data));
            }
        }

        debug!(
            "describe {}: {} bytes in {} chunks",
            dataset_id,
            info.data_length,
            info.chunk_count()
        );
        Ok(info)
    }

    /// Number of standard chunks, the last one possibly short.
    pub fn chunk_count(&self) -> usize {
        if self.data_chunk_size == 0 {
            return 0;
        }
        self.data_length.div_ceil(self.data_chunk_size as u64) as usize
    }

    /// `(offset, size)` of the chunk at `index`.
    pub fn chunk_range(&self, index: usize) -> Option<(u64, u32)> {
        if index >= self.chunk_count() {
            return None;
        }
        let offset = index as u64 * self.data_chunk_size as u64;
        let size = (self.data_length - offset).min(self.data_chunk_size as u64) as u32;
        Some((offset, size))
    }

    /// Index of the standard chunk starting exactly at `offset`.
    pub fn chunk_index(&self, offset: u64) -> Option<usize> {
        if self.data_chunk_size == 0 || offset % self.data_chunk_size as u64 != 0 {
            return None;
        }
        let index = (offset / self.data_chunk_size as u64) as usize;
        (index < self.chunk_count()).then_some(index)
    }

    pub fn has_chunk(&self, index: usize) -> bool {
        if index >= self.chunk_count() {
            return false;
        }
        if self.all_available {
            return true;
        }
        self.available_chunks
            .as_ref()
            .is_some_and(|available| available.get(index))
    }

    pub fn hash_code(&self, index: usize) -> Option<&ChunkHash> {
        if self.uses_hash_codes {
            self.chunk_hash_codes.get(index)
        } else {
            None
        }
    }

    /// Whether this describes the dataset a requester asked for.
    pub fn matches(&self, dataset_id: &ContentId, extra_info: Option<&Message>) -> bool {
        self.dataset_id == *dataset_id && self.extra_info.as_ref() == extra_info
    }
}

impl Transmissible for Info {
    const MESSAGE_ID: [u8; 4] = *b"INFO";
    const NAME: &'static str = "Info";

    fn write_fields<W: WireWriter>(&self, writer: &mut W) {
        self.dataset_id.write_to(writer);
        writer.append_u64(self.data_length);
        writer.append_u32(self.data_chunk_size);
        writer.append_bool(self.use_encryption);
        writer.append_bool(self.use_signing);
        writer.append_bool(self.uses_hash_codes);
        writer.append_u32(self.chunk_hash_codes.len() as u32);
        for hash in self.chunk_hash_codes.iter() {
            writer.append_counted_bytes(hash.as_bytes());
        }
        writer.append_bool(self.all_available);
        writer.append_bool(self.available_chunks.is_some());
        if let Some(available) = &self.available_chunks {
            available.write_to(writer);
        }
        writer.append_optional_message(self.extra_info.as_ref());
    }

    fn read_fields<R: WireReader>(reader: &mut R) -> Result<Self, ProtocolError> {
        let mut info = Info::new(ContentId::from_reader(reader)?);
        info.data_length = reader.extract_u64()?;
        info.data_chunk_size = reader.extract_u32()?;
        info.use_encryption = reader.extract_bool()?;
        info.use_signing = reader.extract_bool()?;
        info.uses_hash_codes = reader.extract_bool()?;

        let count = reader.extract_u32()? as usize;
        // Each hash takes at least its length prefix, cap the allocation
        info.chunk_hash_codes = Vec::with_capacity(count.min(reader.remaining() / 4));
        for _ in 0..count {
            let bytes = reader.extract_counted_bytes()?;
            let hash = ChunkHash::try_from(&bytes[..]).map_err(|len| {
                ProtocolError::MalformedMessage(format!("hash code of {} bytes", len))
            })?;
            info.chunk_hash_codes.push(hash);
        }

        info.all_available = reader.extract_bool()?;
        if reader.extract_bool()? {
            info.available_chunks = Some(ChunkAvailability::from_reader(reader)?);
        }
        info.extra_info = reader.extract_optional_message()?;

        Ok(info)
    }
}

fn write_id_fields<W: WireWriter>(writer: &mut W, dataset_id: &ContentId, extra_info: Option<&Message>) {
    dataset_id.write_to(writer);
    writer.append_optional_message(extra_info);
}

fn read_id_fields<R: WireReader>(reader: &mut R) -> Result<(ContentId, Option<Message>), ProtocolError> {
    let dataset_id = ContentId::from_reader(reader)?;
    let extra_info = reader.extract_optional_message()?;
    Ok((dataset_id, extra_info))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoRequest {
    pub dataset_id: ContentId,
    pub extra_info: Option<Message>,
}

impl InfoRequest {
    pub fn new(dataset_id: ContentId) -> Self {
        InfoRequest {
            dataset_id,
            extra_info: None,
        }
    }

    pub fn with_extra_info(mut self, extra_info: Message) -> Self {
        self.extra_info = Some(extra_info);
        self
    }
}

impl Transmissible for InfoRequest {
    const MESSAGE_ID: [u8; 4] = *b"IREQ";
    const NAME: &'static str = "InfoRequest";

    fn write_fields<W: WireWriter>(&self, writer: &mut W) {
        write_id_fields(writer, &self.dataset_id, self.extra_info.as_ref());
    }

    fn read_fields<R: WireReader>(reader: &mut R) -> Result<Self, ProtocolError> {
        let (dataset_id, extra_info) = read_id_fields(reader)?;
        Ok(InfoRequest {
            dataset_id,
            extra_info,
        })
    }
}

/// Holder's answer when it knows nothing about the requested dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoInfo {
    pub dataset_id: ContentId,
    pub extra_info: Option<Message>,
}

impl NoInfo {
    pub fn new(dataset_id: ContentId) -> Self {
        NoInfo {
            dataset_id,
            extra_info: None,
        }
    }

    /// Decline `request`, echoing its extra info.
    pub fn answering(request: &InfoRequest) -> Self {
        NoInfo {
            dataset_id: request.dataset_id,
            extra_info: request.extra_info.clone(),
        }
    }
}

impl Transmissible for NoInfo {
    const MESSAGE_ID: [u8; 4] = *b"NOIN";
    const NAME: &'static str = "NoInfo";

    fn write_fields<W: WireWriter>(&self, writer: &mut W) {
        write_id_fields(writer, &self.dataset_id, self.extra_info.as_ref());
    }

    fn read_fields<R: WireReader>(reader: &mut R) -> Result<Self, ProtocolError> {
        let (dataset_id, extra_info) = read_id_fields(reader)?;
        Ok(NoInfo {
            dataset_id,
            extra_info,
        })
    }
}


#[cfg(test)]
mod test_info_ids {
    use super::*;

    fn extra() -> Message {
        let mut message = Message::new(*b"TILE");
        message.append_u32(17);
        message.append_u32(4);
        message
    }

    #[test]
    fn info_request_round_trip() {
        let request = InfoRequest::new(ContentId::new());
        let decoded = InfoRequest::from_message(&request.to_message()).unwrap();

        assert_eq!(decoded, request);
        assert_eq!(decoded.extra_info, None);
    }

    #[test]
    fn info_request_extra_info() {
        let request = InfoRequest::new(ContentId::new()).with_extra_info(extra());
        let decoded = InfoRequest::from_message(&request.to_message()).unwrap();

        assert_eq!(decoded.extra_info, Some(extra()));
        assert_eq!(decoded.dataset_id, request.dataset_id);
    }

    #[test]
    fn no_info_round_trip() {
        let request = InfoRequest::new(ContentId::new()).with_extra_info(extra());
        let answer = NoInfo::answering(&request);
        let decoded = NoInfo::from_message(&answer.to_message()).unwrap();

        assert_eq!(decoded, answer);
        assert_eq!(decoded.dataset_id, request.dataset_id);
        assert_eq!(decoded.extra_info, Some(extra()));

        let bare = NoInfo::new(ContentId::new());
        assert_eq!(NoInfo::from_message(&bare.to_message()).unwrap(), bare);
    }

    #[test]
    fn kinds_are_not_interchangeable() {
        let request = InfoRequest::new(ContentId::new());

        match NoInfo::from_message(&request.to_message()) {
            Err(ProtocolError::UnexpectedMessage { expected, found }) => {
                assert_eq!(expected, "NoInfo");
                assert_eq!(found, "IREQ");
            }
            x => panic!("unexpected: {:?}", x),
        }
    }
}
