use std::fmt;
use std::io::{Read, Seek};

use crate::chunk::Chunk;
use crate::content_id::ContentId;
use crate::package::PackageConfig;
use crate::wire::{Message, ProtocolError, Transmissible, WireReader, WireWriter};

/// Opaque access-control blob. Carried, never interpreted.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Certificate(Vec<u8>);

impl Certificate {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Certificate(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Certificate({} bytes)", self.0.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    pub dataset_id: ContentId,
    pub offset: u64,
    pub chunk_size: u32,
    pub encrypt: bool,
    pub sign: bool,
    pub certificate: Option<Certificate>,
    pub extra_info: Option<Message>,
}

impl ChunkRequest {
    pub fn new(
        dataset_id: ContentId,
        offset: u64,
        chunk_size: u32,
        encrypt: bool,
        sign: bool,
        certificate: Option<Certificate>,
    ) -> Self {
        ChunkRequest {
            dataset_id,
            offset,
            chunk_size,
            encrypt,
            sign,
            certificate,
            extra_info: None,
        }
    }

    pub fn with_extra_info(mut self, extra_info: Message) -> Self {
        self.extra_info = Some(extra_info);
        self
    }

    /// Holder side: read the requested range out of `source` and echo the
    /// request's dataset id and extra info in the answer.
    pub fn serve<S: Read + Seek>(&self, source: &mut S, config: PackageConfig) -> std::io::Result<Chunk> {
        let mut chunk = Chunk::from_source(source, self.dataset_id, self.offset, self.chunk_size, config)?;
        chunk.extra_info = self.extra_info.clone();
        Ok(chunk)
    }

    pub fn is_answered_by(&self, chunk: &Chunk) -> bool {
        chunk.dataset_id == self.dataset_id
            && chunk.offset == self.offset
            && chunk.chunk_size <= self.chunk_size
            && chunk.extra_info == self.extra_info
    }
}

impl Transmissible for ChunkRequest {
    const MESSAGE_ID: [u8; 4] = *b"CREQ";
    const NAME: &'static str = "ChunkRequest";

    fn write_fields<W: WireWriter>(&self, writer: &mut W) {
        self.dataset_id.write_to(writer);
        writer.append_u64(self.offset);
        writer.append_u32(self.chunk_size);
        writer.append_bool(self.encrypt);
        writer.append_bool(self.sign);
        writer.append_bool(self.certificate.is_some());
        if let Some(certificate) = &self.certificate {
            writer.append_counted_bytes(certificate.as_bytes());
        }
        writer.append_optional_message(self.extra_info.as_ref());
    }

    fn read_fields<R: WireReader>(reader: &mut R) -> Result<Self, ProtocolError> {
        let dataset_id = ContentId::from_reader(reader)?;
        let offset = reader.extract_u64()?;
        let chunk_size = reader.extract_u32()?;
        let encrypt = reader.extract_bool()?;
        let sign = reader.extract_bool()?;
        let certificate = if reader.extract_bool()? {
            Some(Certificate::from_bytes(reader.extract_counted_bytes()?))
        } else {
            None
        };
        let extra_info = reader.extract_optional_message()?;

        Ok(ChunkRequest {
            dataset_id,
            offset,
            chunk_size,
            encrypt,
            sign,
            certificate,
            extra_info,
        })
    }
}

#[cfg(test)]
mod test_chunk_request {
    use super::*;
    use std::io::Cursor;

    fn extra() -> Message {
        let mut message = Message::new(*b"XTRA");
        message.append_str("coverage/tile/7");
        message
    }

    #[test]
    fn no_certificate_round_trip() {
        let request = ChunkRequest::new(ContentId::new(), 0, 10_000, false, true, None);
        let decoded = ChunkRequest::from_message(&request.to_message()).unwrap();

        assert_eq!(decoded, request);
        assert_eq!(decoded.certificate, None);
        assert!(!decoded.encrypt);
        assert!(decoded.sign);
        assert_eq!(decoded.chunk_size, 10_000);
    }

    #[test]
    fn certificate_and_extra_info_are_orthogonal() {
        let id = ContentId::new();
        let certificate = Some(Certificate::from_bytes(vec![0xC0, 0xFF, 0xEE]));

        for certificate in [None, certificate] {
            for extra_info in [None, Some(extra())] {
                let mut request = ChunkRequest::new(id, 1 << 40, 32768, true, false, certificate.clone());
                request.extra_info = extra_info.clone();

                let decoded = ChunkRequest::from_message(&request.to_message()).unwrap();
                assert_eq!(decoded.certificate, certificate);
                assert_eq!(decoded.extra_info, extra_info);
                assert_eq!(decoded, request);
            }
        }
    }

    #[test]
    fn empty_certificate_is_not_absent() {
        let request = ChunkRequest::new(ContentId::new(), 0, 1, false, false, Some(Certificate::from_bytes(vec![])));
        let decoded = ChunkRequest::from_message(&request.to_message()).unwrap();

        assert_eq!(decoded.certificate, Some(Certificate::from_bytes(vec![])));
    }

    #[test]
    fn truncated_certificate() {
        let request = ChunkRequest::new(ContentId::new(), 0, 1, false, false, Some(Certificate::from_bytes(vec![1; 40])));
        let mut bytes = request.to_message().into_bytes();
        bytes.truncate(bytes.len() - 11);

        assert!(matches!(
            ChunkRequest::from_message(&Message::from_bytes(bytes).unwrap()),
            Err(ProtocolError::TruncatedMessage { .. })
        ));
    }

    #[test]
    fn serve_answers_request() {
        let mut source = Cursor::new(vec![9u8; 300]);
        let request = ChunkRequest::new(ContentId::new(), 256, 128, false, false, None).with_extra_info(extra());

        let chunk = request.serve(&mut source, PackageConfig::default()).unwrap();
        assert_eq!(chunk.chunk_size, 44);
        assert_eq!(chunk.extra_info, Some(extra()));
        assert!(request.is_answered_by(&chunk));

        let other = ChunkRequest::new(request.dataset_id, 0, 128, false, false, None);
        assert!(!other.is_answered_by(&chunk));
    }
}
