use std::io::{Error, ErrorKind, Read, Seek, Write};

use log::{debug, warn};

use crate::buf;
use crate::content_id::ContentId;
use crate::hash::ChunkHash;
use crate::package::{Package, PackageConfig, MAX_PACKAGE_SIZE};
use crate::wire::{Message, ProtocolError, Transmissible, WireReader, WireWriter};

/// An addressed byte range `[offset, offset + chunk_size)` of a dataset.
///
/// `chunk_size` is the number of bytes actually carried, so only the final
/// chunk of a dataset is shorter than the dataset's standard chunk size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub dataset_id: ContentId,
    pub offset: u64,
    pub chunk_size: u32,
    pub payload: Package,
    pub extra_info: Option<Message>,
}

impl Chunk {
    pub fn new(
        dataset_id: ContentId,
        offset: u64,
        data: Vec<u8>,
        config: PackageConfig,
    ) -> std::io::Result<Self> {
        let payload = Package::new(data, config)?;

        Ok(Chunk {
            dataset_id,
            offset,
            chunk_size: payload.data().len() as u32,
            payload,
            extra_info: None,
        })
    }

    /// Read up to `chunk_size` bytes at `offset` out of `source`. Fewer bytes
    /// are carried when the source ends first.
    pub fn from_source<S: Read + Seek>(
        source: &mut S,
        dataset_id: ContentId,
        offset: u64,
        chunk_size: u32,
        config: PackageConfig,
    ) -> std::io::Result<Self> {
        if chunk_size as usize > MAX_PACKAGE_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("chunk of {} bytes exceeds {}", chunk_size, MAX_PACKAGE_SIZE),
            ));
        }

        let data = buf::read_at(source, offset, chunk_size as usize)?;
        debug!(
            "chunk {} @ {}: read {} of {} bytes",
            dataset_id,
            offset,
            data.len(),
            chunk_size
        );

        Chunk::new(dataset_id, offset, data, config)
    }

    pub fn with_extra_info(mut self, extra_info: Message) -> Self {
        self.extra_info = Some(extra_info);
        self
    }

    pub fn is_valid(&self) -> bool {
        self.payload.valid_checksum()
    }

    pub fn data(&self) -> &[u8] {
        self.payload.data()
    }

    /// One past the last byte this chunk covers, `None` when that lies past
    /// `u64::MAX`.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.chunk_size as u64)
    }

    pub fn matches_hash(&self, expected: &ChunkHash) -> bool {
        self.is_valid() && ChunkHash::compute(self.data()) == *expected
    }

    /// Write the decoded bytes at `offset`. Does nothing when the payload
    /// failed its checksum, callers should check [`Chunk::is_valid`] first.
    pub fn write_into<W: Write + Seek>(&self, sink: &mut W) -> std::io::Result<()> {
        if !self.is_valid() {
            warn!(
                "chunk {} @ {}: not writing, payload failed checksum",
                self.dataset_id, self.offset
            );
            return Ok(());
        }

        buf::write_at(sink, self.offset, self.data())
    }
}

impl Transmissible for Chunk {
    const MESSAGE_ID: [u8; 4] = *b"CHNK";
    const NAME: &'static str = "Chunk";

    fn write_fields<W: WireWriter>(&self, writer: &mut W) {
        self.dataset_id.write_to(writer);
        writer.append_u64(self.offset);
        writer.append_u32(self.chunk_size);
        self.payload.write_to(writer);
        writer.append_optional_message(self.extra_info.as_ref());
    }

    fn read_fields<R: WireReader>(reader: &mut R) -> Result<Self, ProtocolError> {
        let dataset_id = ContentId::from_reader(reader)?;
        let offset = reader.extract_u64()?;
        let chunk_size = reader.extract_u32()?;
        let payload = Package::from_reader(reader)?;
        let extra_info = reader.extract_optional_message()?;

        if payload.valid_checksum() && payload.data().len() != chunk_size as usize {
            return Err(ProtocolError::MalformedMessage(format!(
                "chunk declares {} bytes but carries {}",
                chunk_size,
                payload.data().len()
            )));
        }

        Ok(Chunk {
            dataset_id,
            offset,
            chunk_size,
            payload,
            extra_info,
        })
    }
}

#[cfg(test)]
mod test_chunk {
    use super::*;
    use std::io::{Cursor, Seek, SeekFrom};

    fn source(len: usize) -> Cursor<Vec<u8>> {
        Cursor::new((0..len).map(|i| (i % 251) as u8).collect())
    }

    fn tile_index(index: u32) -> Message {
        let mut message = Message::new(*b"TILE");
        message.append_u32(index);
        message
    }

    #[test]
    fn from_source_round_trip() {
        let mut src = source(50_000);
        let id = ContentId::new();

        let chunk = Chunk::from_source(&mut src, id, 0, 4096, PackageConfig::default()).unwrap();
        let decoded = Chunk::from_message(&chunk.to_message()).unwrap();

        assert_eq!(decoded.chunk_size, 4096);
        assert!(decoded.is_valid());
        assert_eq!(decoded.dataset_id, id);
        assert_eq!(decoded.offset, 0);
        assert_eq!(decoded.data(), &src.get_ref()[..4096]);
        assert_eq!(decoded.extra_info, None);
    }

    #[test]
    fn size_is_clamped_to_source() {
        let len = 10_000usize;
        let mut src = source(len);
        let id = ContentId::new();

        for (offset, size) in [(0u64, 4096u32), (8192, 4096), (9999, 10), (10_000, 16), (20_000, 16)] {
            let chunk = Chunk::from_source(&mut src, id, offset, size, PackageConfig::PLAIN).unwrap();
            let expected = (size as usize).min(len.saturating_sub(offset as usize));

            assert_eq!(chunk.data().len(), expected, "offset {}", offset);
            assert_eq!(chunk.chunk_size as usize, expected);
        }
    }

    #[test]
    fn all_configs_round_trip() {
        let mut src = source(5000);
        let id = ContentId::new();

        for (use_compression, do_checksum) in [(false, false), (true, false), (false, true), (true, true)] {
            let config = PackageConfig::new(use_compression, do_checksum);
            let chunk = Chunk::from_source(&mut src, id, 1000, 3000, config).unwrap();
            let decoded = Chunk::from_message(&chunk.to_message()).unwrap();

            assert_eq!(decoded, chunk);
            assert_eq!(decoded.data(), &src.get_ref()[1000..4000]);
        }
    }

    #[test]
    fn extra_info_round_trip() {
        let mut src = source(100);
        let chunk = Chunk::from_source(&mut src, ContentId::new(), 10, 20, PackageConfig::default())
            .unwrap()
            .with_extra_info(tile_index(42));

        let decoded = Chunk::from_message(&chunk.to_message()).unwrap();
        assert_eq!(decoded.extra_info, Some(tile_index(42)));
        assert_eq!(decoded.offset, 10);
        assert_eq!(decoded.chunk_size, 20);
        assert_eq!(decoded.data(), chunk.data());
    }

    #[test]
    fn write_into_places_bytes() {
        let mut src = source(300);
        let id = ContentId::new();
        let mut sink = Cursor::new(Vec::new());

        // Out of order on purpose
        for offset in [200u64, 0, 100] {
            let chunk = Chunk::from_source(&mut src, id, offset, 100, PackageConfig::default()).unwrap();
            let decoded = Chunk::from_message(&chunk.to_message()).unwrap();
            decoded.write_into(&mut sink).unwrap();
        }

        assert_eq!(sink.into_inner(), src.into_inner());
    }

    #[test]
    fn corrupt_chunk_is_soft_failure() {
        let mut src = source(1000);
        let chunk = Chunk::from_source(&mut src, ContentId::new(), 0, 1000, PackageConfig::new(false, true)).unwrap();
        let mut bytes = chunk.to_message().into_bytes();

        // Flip a byte inside the payload (the extra info flag is the last byte)
        let idx = bytes.len() - 10;
        bytes[idx] ^= 0x40;

        let decoded = Chunk::from_message(&Message::from_bytes(bytes).unwrap()).unwrap();
        assert!(!decoded.is_valid());

        let mut sink = Cursor::new(vec![0xAAu8; 4]);
        decoded.write_into(&mut sink).unwrap();
        assert_eq!(sink.into_inner(), vec![0xAAu8; 4]);
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut src = source(100);
        let chunk = Chunk::from_source(&mut src, ContentId::new(), 0, 50, PackageConfig::PLAIN).unwrap();
        let mut message = chunk.to_message();
        message.append_u8(0);

        assert!(matches!(
            Chunk::from_message(&message),
            Err(ProtocolError::MalformedMessage(_))
        ));
    }

    #[test]
    fn wrong_identifier_rejected() {
        let mut message = Message::new(*b"NOPE");
        message.append_bytes(&[0; 32]);

        assert!(matches!(
            Chunk::from_message(&message),
            Err(ProtocolError::UnexpectedMessage { expected: "Chunk", .. })
        ));
    }

    #[test]
    fn size_mismatch_rejected() {
        let mut src = source(100);
        let mut chunk = Chunk::from_source(&mut src, ContentId::new(), 0, 50, PackageConfig::PLAIN).unwrap();
        chunk.chunk_size = 60;

        assert!(matches!(
            Chunk::from_message(&chunk.to_message()),
            Err(ProtocolError::MalformedMessage(_))
        ));
    }

    #[test]
    fn end_of_range() {
        let mut src = source(100);
        let chunk = Chunk::from_source(&mut src, ContentId::new(), 10, 20, PackageConfig::PLAIN).unwrap();
        assert_eq!(chunk.end(), Some(30));

        let far = Chunk::new(ContentId::new(), u64::MAX - 4, vec![1; 8], PackageConfig::default()).unwrap();
        let decoded = Chunk::from_message(&far.to_message()).unwrap();
        assert_eq!(decoded.offset, u64::MAX - 4);
        assert_eq!(decoded.end(), None);

        let last = Chunk::new(ContentId::new(), u64::MAX - 4, vec![1; 4], PackageConfig::PLAIN).unwrap();
        assert_eq!(last.end(), Some(u64::MAX));
    }

    #[test]
    fn hash_codes() {
        let mut src = source(100);
        let chunk = Chunk::from_source(&mut src, ContentId::new(), 0, 64, PackageConfig::default()).unwrap();

        assert!(chunk.matches_hash(&ChunkHash::compute(&src.get_ref()[..64])));
        assert!(!chunk.matches_hash(&ChunkHash::compute(&src.get_ref()[1..65])));
    }

    #[test]
    fn file_backed_source_and_sink() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&source(9000).into_inner()).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let id = ContentId::new();
        let mut out = tempfile::tempfile().unwrap();
        for offset in [8192u64, 4096, 0] {
            let chunk = Chunk::from_source(&mut file, id, offset, 4096, PackageConfig::default()).unwrap();
            Chunk::from_message(&chunk.to_message()).unwrap().write_into(&mut out).unwrap();
        }

        out.seek(SeekFrom::Start(0)).unwrap();
        let mut written = Vec::new();
        out.read_to_end(&mut written).unwrap();
        assert_eq!(written, source(9000).into_inner());
    }
}
