//! Record source over an SML byte stream.

use std::collections::VecDeque;
use std::io::Read;

use smlbridge_core::{DecodeError, MeasurementRecord, RecordSource};

use crate::message::decode_payload;
use crate::transport::FrameReader;

/// Yields the list entries of every SML frame in a stream.
///
/// A frame is decoded completely before its first record is returned, so a
/// corrupt frame produces an error and no records at all.
pub struct SmlReader<R> {
    frames: FrameReader<R>,
    pending: VecDeque<MeasurementRecord>,
    frames_read: usize,
}

impl<R: Read> SmlReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            frames: FrameReader::new(reader),
            pending: VecDeque::new(),
            frames_read: 0,
        }
    }

    /// Frames decoded so far.
    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    /// Bytes consumed from the underlying reader.
    pub fn offset(&self) -> usize {
        self.frames.offset()
    }
}

impl<R: Read> RecordSource for SmlReader<R> {
    fn next_record(&mut self) -> Result<Option<MeasurementRecord>, DecodeError> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }

            let Some(payload) = self.frames.next_frame()? else {
                return Ok(None);
            };
            let records = decode_payload(&payload)?;
            self.frames_read += 1;
            tracing::debug!(
                "Frame {} decoded: {} records ({} bytes)",
                self.frames_read,
                records.len(),
                payload.len()
            );
            self.pending.extend(records);
        }
    }
}
