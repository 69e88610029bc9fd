//! Chunked dataset transfer protocol
//!
//! A requester learns about a dataset through an [`InfoRequest`] answered by
//! [`Info`] or [`NoInfo`], then pulls it piecewise with [`ChunkRequest`]s,
//! each answered by a [`Chunk`] carrying a checksummed, optionally compressed
//! [`Package`]. Every message is encoded in the [`wire`] envelope.
pub mod buf;
pub mod chunk;
pub mod content_id;
pub mod hash;
pub mod info;
pub mod package;
pub mod request;
pub mod transfer;
pub mod wire;

pub use chunk::Chunk;
pub use content_id::ContentId;
pub use info::{ChunkAvailability, Info, InfoRequest, NoInfo};
pub use package::{Package, PackageConfig};
pub use request::{Certificate, ChunkRequest};
pub use transfer::{ChunkOutcome, Transfer, TransferError, TransferState};
pub use wire::{Message, ProtocolError, Transmissible};
