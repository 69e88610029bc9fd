use crate::wire::{Message, ProtocolError, WireReader, ID_LEN};

/// Sequential field reader over a [`Message`], positioned just after the
/// identifier.
pub struct MessageReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> MessageReader<'a> {
    pub fn new(message: &'a Message) -> Self {
        MessageReader {
            bytes: message.as_bytes(),
            position: ID_LEN,
        }
    }

    /// Read fields out of a bare buffer that has no identifier.
    pub fn from_body(bytes: &'a [u8]) -> Self {
        MessageReader { bytes, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

impl WireReader for MessageReader<'_> {
    fn take(&mut self, count: usize) -> Result<&[u8], ProtocolError> {
        let remaining = self.remaining();
        if count > remaining {
            return Err(ProtocolError::TruncatedMessage {
                needed: count,
                remaining,
            });
        }

        let start = self.position;
        self.position += count;
        Ok(&self.bytes[start..self.position])
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }
}
