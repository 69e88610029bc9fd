use std::fmt;

use crate::wire::{ProtocolError, WireWriter, ID_LEN};

/// An owned protocol message: identifier followed by the appended fields.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Message {
    bytes: Vec<u8>,
}

impl Message {
    pub fn new(id: [u8; ID_LEN]) -> Self {
        let mut bytes = Vec::with_capacity(64);
        bytes.extend_from_slice(&id);
        Message { bytes }
    }

    /// Wrap bytes received from the transport.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ProtocolError> {
        if bytes.len() < ID_LEN {
            return Err(ProtocolError::TruncatedMessage {
                needed: ID_LEN,
                remaining: bytes.len(),
            });
        }
        Ok(Message { bytes })
    }

    pub fn identifier(&self) -> [u8; ID_LEN] {
        let mut id = [0u8; ID_LEN];
        id.copy_from_slice(&self.bytes[..ID_LEN]);
        id
    }

    pub(crate) fn identifier_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes[..ID_LEN]).into_owned()
    }

    pub fn starts_with(&self, id: &[u8; ID_LEN]) -> bool {
        self.bytes[..ID_LEN] == id[..]
    }

    /// Fields after the identifier.
    pub fn body(&self) -> &[u8] {
        &self.bytes[ID_LEN..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Length of the fields, the identifier not included. See
    /// [`Message::as_bytes`] for the full encoding.
    pub fn len(&self) -> usize {
        self.bytes.len() - ID_LEN
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WireWriter for Message {
    fn append_bytes(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }
}

impl WireWriter for Vec<u8> {
    fn append_bytes(&mut self, data: &[u8]) {
        self.extend_from_slice(data);
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.identifier_lossy())
            .field("len", &self.body().len())
            .finish()
    }
}
