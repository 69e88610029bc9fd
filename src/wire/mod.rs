//! Typed append/extract wire envelope
//!
//! Every protocol message is a flat byte buffer that starts with a 4 byte
//! identifier followed by the message fields, appended one after the other
//! in a fixed order. There is no per-field tagging, so both sides must agree
//! on the field order of each message kind. Unless otherwise noted everything
//! is stored in Little Endian format.
//!
//! | Type          | Encoding |
//! | ------------: | -------- |
//! | u8            | 1 byte |
//! | bool          | 1 byte, `0x00` or `0x01`, anything else is malformed |
//! | u32 / u64     | 4 / 8 bytes |
//! | counted bytes | `u32` length followed by that many bytes |
//! | string        | counted bytes holding UTF-8 |
//! | message       | counted bytes holding a complete nested message (identifier included) |
//! | `Option<T>`   | a bool presence flag, followed by `T` only when set |
//!
//! # Message identifiers
//!
//! | Identifier | Message |
//! | :--------: | ------- |
//! | CHNK       | [`crate::chunk::Chunk`] |
//! | CREQ       | [`crate::request::ChunkRequest`] |
//! | INFO       | [`crate::info::Info`] |
//! | IREQ       | [`crate::info::InfoRequest`] |
//! | NOIN       | [`crate::info::NoInfo`] |
//!
//! Decoders must consume the whole message. Bytes left over after the last
//! declared field are rejected with [`ProtocolError::MalformedMessage`] so
//! that a sender speaking a newer layout fails loudly instead of losing
//! fields. New fields belong in the `ExtraInfo` slot every message carries.
pub mod message;
pub mod reader;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

pub use message::Message;
pub use reader::MessageReader;

/// Length of the identifier at the start of every message.
pub const ID_LEN: usize = 4;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("truncated message: needed {needed} bytes but only {remaining} remain")]
    TruncatedMessage { needed: usize, remaining: usize },
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("expected a {expected} message, found {found:?}")]
    UnexpectedMessage {
        expected: &'static str,
        found: String,
    },
    #[error("payload decompression failed")]
    Decompression(#[source] std::io::Error),
}

/// Append side of the envelope.
///
/// Appending never fails, the buffer simply grows.
///
/// # Panics
///
/// Counted fields panic when longer than `u32::MAX` bytes. Payload sized
/// fields are bounded well below that by [`crate::package::MAX_PACKAGE_SIZE`].
pub trait WireWriter {
    fn append_bytes(&mut self, data: &[u8]);

    fn append_u8(&mut self, value: u8) {
        self.append_bytes(&[value]);
    }

    fn append_bool(&mut self, value: bool) {
        self.append_u8(value as u8);
    }

    fn append_u32(&mut self, value: u32) {
        self.append_bytes(&value.to_le_bytes());
    }

    fn append_u64(&mut self, value: u64) {
        self.append_bytes(&value.to_le_bytes());
    }

    fn append_counted_bytes(&mut self, data: &[u8]) {
        let len = u32::try_from(data.len()).unwrap_or_else(|_| {
            panic!("counted field of {} bytes exceeds the u32 length prefix", data.len())
        });
        self.append_u32(len);
        self.append_bytes(data);
    }

    fn append_str(&mut self, value: &str) {
        self.append_counted_bytes(value.as_bytes());
    }

    fn append_message(&mut self, message: &Message) {
        self.append_counted_bytes(message.as_bytes());
    }

    fn append_optional_message(&mut self, message: Option<&Message>) {
        self.append_bool(message.is_some());
        if let Some(message) = message {
            self.append_message(message);
        }
    }
}

/// Extract side of the envelope.
///
/// Every extraction is bounds checked against what is left, nothing is ever
/// zero filled.
pub trait WireReader {
    /// Consume exactly `count` bytes.
    fn take(&mut self, count: usize) -> Result<&[u8], ProtocolError>;

    /// Number of bytes not consumed yet.
    fn remaining(&self) -> usize;

    fn at_end(&self) -> bool {
        self.remaining() == 0
    }

    fn assert_at_end(&self, context: &str) -> Result<(), ProtocolError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(ProtocolError::MalformedMessage(format!(
                "{} trailing bytes in a {} message",
                self.remaining(),
                context
            )))
        }
    }

    fn extract_bytes(&mut self, count: usize) -> Result<Vec<u8>, ProtocolError> {
        self.take(count).map(<[u8]>::to_vec)
    }

    fn extract_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    fn extract_bool(&mut self) -> Result<bool, ProtocolError> {
        match self.extract_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            x => Err(ProtocolError::MalformedMessage(format!(
                "invalid boolean value 0x{:02x}",
                x
            ))),
        }
    }

    fn extract_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    fn extract_u64(&mut self) -> Result<u64, ProtocolError> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    fn extract_counted_bytes(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.extract_u32()? as usize;
        self.extract_bytes(len)
    }

    fn extract_string(&mut self) -> Result<String, ProtocolError> {
        String::from_utf8(self.extract_counted_bytes()?)
            .map_err(|e| ProtocolError::MalformedMessage(format!("invalid UTF-8 string: {}", e)))
    }

    fn extract_message(&mut self) -> Result<Message, ProtocolError> {
        Message::from_bytes(self.extract_counted_bytes()?)
    }

    fn extract_optional_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        if self.extract_bool()? {
            self.extract_message().map(Some)
        } else {
            Ok(None)
        }
    }
}

/// A protocol message kind with a stable identifier and a fixed field order.
pub trait Transmissible: Sized {
    const MESSAGE_ID: [u8; ID_LEN];

    /// Human readable name used in errors.
    const NAME: &'static str;

    fn write_fields<W: WireWriter>(&self, writer: &mut W);

    fn read_fields<R: WireReader>(reader: &mut R) -> Result<Self, ProtocolError>;

    fn to_message(&self) -> Message {
        let mut message = Message::new(Self::MESSAGE_ID);
        self.write_fields(&mut message);
        message
    }

    fn from_message(message: &Message) -> Result<Self, ProtocolError> {
        if !message.starts_with(&Self::MESSAGE_ID) {
            return Err(ProtocolError::UnexpectedMessage {
                expected: Self::NAME,
                found: message.identifier_lossy(),
            });
        }

        let mut reader = MessageReader::new(message);
        let value = Self::read_fields(&mut reader)?;
        reader.assert_at_end(Self::NAME)?;
        Ok(value)
    }
}
