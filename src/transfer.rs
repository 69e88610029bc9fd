//! Requester side bookkeeping for one dataset
//!
//! `Transfer` owns no transport. It hands out the messages to send, takes the
//! answers that came back, and writes accepted chunks into the sink.
//!
//! ```text
//! Unknown -> AwaitingInfo -> InfoKnown <-> AwaitingChunks
//!                  |
//!                  +-> InfoAbsent
//! ```
use std::collections::BTreeSet;
use std::io::{Seek, Write};

use log::{debug, info, warn};
use thiserror::Error;

use crate::chunk::Chunk;
use crate::content_id::ContentId;
use crate::info::{ChunkAvailability, Info, InfoRequest, NoInfo};
use crate::package::MAX_PACKAGE_SIZE;
use crate::request::{Certificate, ChunkRequest};
use crate::wire::Message;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error(transparent)]
    IO(#[from] std::io::Error),

    #[error("{action} is not valid in state {state:?}")]
    InvalidState {
        action: &'static str,
        state: TransferState,
    },

    #[error("answer for dataset {found}, expected {expected}")]
    DatasetMismatch { expected: ContentId, found: ContentId },

    #[error("unusable info: {0}")]
    InvalidInfo(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Unknown,
    AwaitingInfo,
    InfoKnown,
    AwaitingChunks,
    InfoAbsent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Accepted and written to the sink.
    Written,
    /// Failed its checksum or hash code, it will be requested again.
    Corrupt,
    /// Not an answer to anything outstanding, ignored.
    Unsolicited,
}

pub struct Transfer<W: Write + Seek> {
    dataset_id: ContentId,
    extra_info: Option<Message>,
    certificate: Option<Certificate>,
    sink: W,
    state: TransferState,
    info: Option<Info>,
    received: ChunkAvailability,
    outstanding: BTreeSet<usize>,
}

impl<W: Write + Seek> Transfer<W> {
    pub fn new(dataset_id: ContentId, sink: W) -> Self {
        Transfer {
            dataset_id,
            extra_info: None,
            certificate: None,
            sink,
            state: TransferState::Unknown,
            info: None,
            received: ChunkAvailability::default(),
            outstanding: BTreeSet::new(),
        }
    }

    /// Attach extra info to every request sent.
    pub fn with_extra_info(mut self, extra_info: Message) -> Self {
        self.extra_info = Some(extra_info);
        self
    }

    /// Present `certificate` with every chunk request.
    pub fn with_certificate(mut self, certificate: Certificate) -> Self {
        self.certificate = Some(certificate);
        self
    }

    pub fn dataset_id(&self) -> ContentId {
        self.dataset_id
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn info(&self) -> Option<&Info> {
        self.info.as_ref()
    }

    fn expect_state(&self, action: &'static str, allowed: &[TransferState]) -> Result<(), TransferError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(TransferError::InvalidState {
                action,
                state: self.state,
            })
        }
    }

    fn expect_dataset(&self, found: ContentId) -> Result<(), TransferError> {
        if found == self.dataset_id {
            Ok(())
        } else {
            Err(TransferError::DatasetMismatch {
                expected: self.dataset_id,
                found,
            })
        }
    }

    /// Ask for the dataset description. May be repeated while waiting.
    pub fn request_info(&mut self) -> Result<InfoRequest, TransferError> {
        self.expect_state("request_info", &[TransferState::Unknown, TransferState::AwaitingInfo])?;

        let mut request = InfoRequest::new(self.dataset_id);
        request.extra_info = self.extra_info.clone();

        self.state = TransferState::AwaitingInfo;
        Ok(request)
    }

    pub fn on_info(&mut self, info: Info) -> Result<(), TransferError> {
        self.expect_state("on_info", &[TransferState::AwaitingInfo])?;
        self.expect_dataset(info.dataset_id)?;

        if info.data_length > 0 && info.data_chunk_size == 0 {
            return Err(TransferError::InvalidInfo(format!(
                "{} bytes with a zero chunk size",
                info.data_length
            )));
        }
        if info.data_chunk_size as usize > MAX_PACKAGE_SIZE {
            return Err(TransferError::InvalidInfo(format!(
                "chunk size {} exceeds {}",
                info.data_chunk_size, MAX_PACKAGE_SIZE
            )));
        }

        let count = info.chunk_count();
        if info.uses_hash_codes && info.chunk_hash_codes.len() != count {
            return Err(TransferError::InvalidInfo(format!(
                "{} hash codes for {} chunks",
                info.chunk_hash_codes.len(),
                count
            )));
        }
        if let Some(available) = &info.available_chunks {
            if available.len() != count {
                return Err(TransferError::InvalidInfo(format!(
                    "availability of {} chunks for {} chunks",
                    available.len(),
                    count
                )));
            }
        }
        if info.extra_info != self.extra_info {
            debug!("info {}: extra info differs from the request", self.dataset_id);
        }

        self.received =
            ChunkAvailability::new(count).map_err(|e| TransferError::InvalidInfo(e.to_string()))?;
        info!(
            "info {}: {} bytes in {} chunks of {}",
            self.dataset_id, info.data_length, count, info.data_chunk_size
        );

        self.info = Some(info);
        self.state = TransferState::InfoKnown;
        Ok(())
    }

    pub fn on_no_info(&mut self, no_info: &NoInfo) -> Result<(), TransferError> {
        self.expect_state("on_no_info", &[TransferState::AwaitingInfo])?;
        self.expect_dataset(no_info.dataset_id)?;

        info!("info {}: holder has no such dataset", self.dataset_id);
        self.state = TransferState::InfoAbsent;
        Ok(())
    }

    /// Up to `max` requests for chunks that are neither received nor in
    /// flight, lowest offsets first. Chunks the holder does not advertise are
    /// skipped.
    pub fn next_requests(&mut self, max: usize) -> Result<Vec<ChunkRequest>, TransferError> {
        self.expect_state(
            "next_requests",
            &[TransferState::InfoKnown, TransferState::AwaitingChunks],
        )?;
        let info = match &self.info {
            Some(info) => info,
            None => {
                return Err(TransferError::InvalidState {
                    action: "next_requests",
                    state: self.state,
                })
            }
        };

        let mut requests = Vec::new();
        for index in 0..info.chunk_count() {
            if requests.len() >= max {
                break;
            }
            if self.received.get(index) || self.outstanding.contains(&index) || !info.has_chunk(index) {
                continue;
            }
            let Some((offset, size)) = info.chunk_range(index) else {
                continue;
            };

            let mut request = ChunkRequest::new(
                self.dataset_id,
                offset,
                size,
                info.use_encryption,
                info.use_signing,
                self.certificate.clone(),
            );
            request.extra_info = self.extra_info.clone();

            self.outstanding.insert(index);
            requests.push(request);
        }

        if !self.outstanding.is_empty() {
            self.state = TransferState::AwaitingChunks;
        }
        debug!(
            "transfer {}: {} new requests, {} in flight",
            self.dataset_id,
            requests.len(),
            self.outstanding.len()
        );
        Ok(requests)
    }

    pub fn on_chunk(&mut self, chunk: &Chunk) -> Result<ChunkOutcome, TransferError> {
        self.expect_state("on_chunk", &[TransferState::AwaitingChunks])?;
        let info = match &self.info {
            Some(info) => info,
            None => return Ok(ChunkOutcome::Unsolicited),
        };

        let index = match info.chunk_index(chunk.offset) {
            Some(index) if chunk.dataset_id == self.dataset_id && self.outstanding.contains(&index) => index,
            _ => {
                debug!(
                    "transfer {}: unsolicited chunk {} @ {}",
                    self.dataset_id, chunk.dataset_id, chunk.offset
                );
                return Ok(ChunkOutcome::Unsolicited);
            }
        };
        self.outstanding.remove(&index);

        let expected_size = info.chunk_range(index).map(|(_, size)| size);
        let corrupt = if !chunk.is_valid() {
            Some("failed checksum")
        } else if Some(chunk.chunk_size) != expected_size {
            Some("wrong size")
        } else if info.hash_code(index).is_some_and(|hash| !chunk.matches_hash(hash)) {
            Some("failed hash code")
        } else {
            None
        };

        let outcome = if let Some(reason) = corrupt {
            warn!(
                "transfer {}: chunk {} @ {} {}, will re-request",
                self.dataset_id, index, chunk.offset, reason
            );
            Ok(ChunkOutcome::Corrupt)
        } else {
            let received = &mut self.received;
            chunk.write_into(&mut self.sink).map(|()| {
                received.set(index, true);
                ChunkOutcome::Written
            })
        };

        // A failed write leaves the chunk missing, eligible for re-request
        if self.outstanding.is_empty() {
            self.state = TransferState::InfoKnown;
        }
        let outcome = outcome?;

        if self.is_complete() {
            self.sink.flush()?;
            info!("transfer {}: complete", self.dataset_id);
        }
        Ok(outcome)
    }

    /// Indexes of chunks not yet written, in flight or not.
    pub fn missing_chunks(&self) -> Vec<usize> {
        (0..self.received.len()).filter(|i| !self.received.get(*i)).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.info.is_some() && self.received.is_full()
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}
