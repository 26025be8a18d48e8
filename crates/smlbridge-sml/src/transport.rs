//! SML transport protocol v1 framing.
//!
//! ```text
//! 1b1b1b1b 01010101   start sequence
//! <payload>           4-byte blocks, a literal 1b1b1b1b block is doubled
//! 1b1b1b1b 1a PP CC CC  end: PP = fill bytes, CCCC = CRC-16/X.25 (low byte first)
//! ```
//!
//! The CRC covers the frame from the start sequence through `PP`, exactly
//! as the bytes appear on the wire.

use std::io::{self, Read};

use smlbridge_core::DecodeError;

use crate::crc::Crc16;

pub const ESCAPE: [u8; 4] = [0x1b; 4];
pub const START: [u8; 4] = [0x01; 4];
pub const END_MARKER: u8 = 0x1a;

/// Reads transport frames and returns their unescaped payloads.
pub struct FrameReader<R> {
    reader: R,
    offset: usize,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, offset: 0 }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Next frame payload with fill bytes removed, or `None` at end of stream.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, DecodeError> {
        if !self.seek_start()? {
            return Ok(None);
        }
        let frame_start = self.offset - 8;

        let mut crc = start_crc();
        let mut payload = Vec::new();

        loop {
            let block = self.read_block()?;
            if block != ESCAPE {
                crc.update(&block);
                payload.extend_from_slice(&block);
                continue;
            }

            let next = self.read_block()?;
            if next == ESCAPE {
                crc.update(&ESCAPE);
                crc.update(&ESCAPE);
                payload.extend_from_slice(&ESCAPE);
            } else if next == START {
                tracing::warn!(
                    "Frame at offset {} restarted at offset {}",
                    frame_start,
                    self.offset - 8
                );
                crc = start_crc();
                payload.clear();
            } else if next[0] == END_MARKER {
                crc.update(&ESCAPE);
                crc.update(&next[..2]);

                let stored = u16::from_le_bytes([next[2], next[3]]);
                let computed = crc.finish();
                if stored != computed {
                    return Err(DecodeError::Checksum {
                        expected: stored,
                        actual: computed,
                    });
                }

                let fill = usize::from(next[1]);
                if fill > 3 || fill > payload.len() {
                    return Err(DecodeError::malformed(
                        self.offset - 4,
                        format!("invalid fill byte count {fill}"),
                    ));
                }
                payload.truncate(payload.len() - fill);
                return Ok(Some(payload));
            } else {
                return Err(DecodeError::malformed(
                    self.offset - 4,
                    format!("invalid escape sequence {:02x?}", next),
                ));
            }
        }
    }

    /// Skip input up to and including the next start sequence.
    fn seek_start(&mut self) -> Result<bool, DecodeError> {
        let mut window = [0u8; 8];
        let mut filled = 0usize;
        let mut byte = [0u8; 1];

        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => {
                    if filled > 0 {
                        tracing::debug!("Ignoring {} trailing bytes", filled.min(8));
                    }
                    return Ok(false);
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
            self.offset += 1;
            window.copy_within(1.., 0);
            window[7] = byte[0];
            filled += 1;

            if filled >= 8 && window[..4] == ESCAPE && window[4..] == START {
                return Ok(true);
            }
        }
    }

    fn read_block(&mut self) -> Result<[u8; 4], DecodeError> {
        let mut block = [0u8; 4];
        match self.reader.read_exact(&mut block) {
            Ok(()) => {
                self.offset += 4;
                Ok(block)
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(DecodeError::Truncated(
                format!("stream ended inside a frame near offset {}", self.offset),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

fn start_crc() -> Crc16 {
    let mut crc = Crc16::new();
    crc.update(&ESCAPE);
    crc.update(&START);
    crc
}

/// Wrap a payload into a transport frame.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let fill = (4 - payload.len() % 4) % 4;
    let mut padded = payload.to_vec();
    padded.resize(payload.len() + fill, 0x00);

    let mut frame = Vec::with_capacity(padded.len() + 16);
    frame.extend_from_slice(&ESCAPE);
    frame.extend_from_slice(&START);
    for block in padded.chunks(4) {
        frame.extend_from_slice(block);
        if block == ESCAPE {
            frame.extend_from_slice(&ESCAPE);
        }
    }
    frame.extend_from_slice(&ESCAPE);
    frame.push(END_MARKER);
    frame.push(fill as u8);

    let crc = crate::crc::crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(bytes: &[u8]) -> Result<Vec<Vec<u8>>, DecodeError> {
        let mut reader = FrameReader::new(bytes);
        let mut out = Vec::new();
        while let Some(frame) = reader.next_frame()? {
            out.push(frame);
        }
        Ok(out)
    }

    #[test]
    fn test_roundtrip_with_fill() {
        let payload = [0x76, 0x05, 0x01, 0x02, 0x03, 0x04, 0x00];
        let frame = encode_frame(&payload);
        assert_eq!(frame.len() % 4, 0);
        assert_eq!(frames(&frame).unwrap(), [payload.to_vec()]);
    }

    #[test]
    fn test_escaped_block() {
        let payload = [0x01, 0x02, 0x03, 0x04, 0x1b, 0x1b, 0x1b, 0x1b, 0x05];
        let frame = encode_frame(&payload);
        // the literal escape block is doubled on the wire
        assert_eq!(&frame[12..20], &[0x1b; 8]);
        assert_eq!(frames(&frame).unwrap(), [payload.to_vec()]);
    }

    #[test]
    fn test_garbage_between_frames_skipped() {
        let mut bytes = vec![0xff, 0x00, 0x1b];
        bytes.extend(encode_frame(&[1, 2, 3, 4]));
        bytes.extend([0x42; 5]);
        bytes.extend(encode_frame(&[5, 6]));
        bytes.extend([0x1b, 0x1b]);

        assert_eq!(frames(&bytes).unwrap(), [vec![1, 2, 3, 4], vec![5, 6]]);
    }

    #[test]
    fn test_empty_stream() {
        assert!(frames(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut frame = encode_frame(&[1, 2, 3, 4]);
        frame[9] ^= 0xff;
        assert!(matches!(frames(&frame), Err(DecodeError::Checksum { .. })));
    }

    #[test]
    fn test_truncated_frame() {
        let frame = encode_frame(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let err = frames(&frame[..frame.len() - 6]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated(_)));
    }

    #[test]
    fn test_invalid_escape() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&ESCAPE);
        bytes.extend_from_slice(&START);
        bytes.extend_from_slice(&ESCAPE);
        bytes.extend_from_slice(&[0x02, 0x00, 0x00, 0x00]);
        assert!(matches!(
            frames(&bytes),
            Err(DecodeError::Malformed { offset: 12, .. })
        ));
    }

    #[test]
    fn test_restart_discards_partial_frame() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&ESCAPE);
        bytes.extend_from_slice(&START);
        bytes.extend_from_slice(&[9, 9, 9, 9]);
        bytes.extend(encode_frame(&[1, 2, 3, 4]));
        assert_eq!(frames(&bytes).unwrap(), [vec![1, 2, 3, 4]]);
    }
}
