//! Frame reassembly for partial and combined socket reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForLength`: Need at least 5 bytes (marker + u32 length)
//! - `WaitingForPayload`: Length known, need N payload bytes
//!
//! Extraction is a loop, so a chunk holding thousands of frames costs no
//! extra stack.
//!
//! # Example
//!
//! ```
//! use tarantool_wire::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! // Length prefix arrives first, payload later
//! assert!(buffer.push(&[0xce, 0, 0, 0, 2]).unwrap().is_empty());
//! let frames = buffer.push(&[0x80, 0x80]).unwrap();
//! assert_eq!(frames.len(), 1);
//! assert_eq!(&frames[0][..], &[0x80, 0x80]);
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{decode_length_prefix, DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE};
use crate::error::Result;

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for a complete length prefix.
    WaitingForLength,
    /// Prefix consumed, waiting for this many payload bytes.
    WaitingForPayload { expected: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// Emitted frames are the payloads only (header map + body map); the
/// length prefix is stripped.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed frame length.
    max_frame_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max frame: 64MB.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new frame buffer with custom max frame size.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForLength,
            max_frame_size,
        }
    }

    /// Append bytes from a socket read without extracting anything.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract the next complete frame, if one is buffered.
    ///
    /// # Errors
    ///
    /// Returns a framing error when the next length prefix is bad. Frames
    /// returned by earlier calls are unaffected. The buffer is unusable
    /// afterwards until [`clear`](Self::clear) is called.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        let expected = match self.state {
            State::WaitingForPayload { expected } => expected,
            State::WaitingForLength => {
                match decode_length_prefix(&self.buffer, self.max_frame_size)? {
                    Some(length) => {
                        let _ = self.buffer.split_to(LENGTH_PREFIX_SIZE);
                        let expected = length as usize;
                        self.state = State::WaitingForPayload { expected };
                        expected
                    }
                    None => return Ok(None),
                }
            }
        };

        if self.buffer.len() < expected {
            return Ok(None);
        }

        self.state = State::WaitingForLength;
        Ok(Some(self.buffer.split_to(expected).freeze()))
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Returns the complete frames in arrival order (may be empty if still
    /// waiting for data). Partial data is retained for the next push.
    ///
    /// # Errors
    ///
    /// Returns a framing error on a bad length prefix, discarding frames
    /// extracted in the same call. Use [`extend`](Self::extend) with
    /// [`next_frame`](Self::next_frame) to keep them.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.extend(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Number of buffered bytes not yet part of an emitted frame.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when no partial frame is held: nothing buffered and no
    /// payload outstanding.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.state == State::WaitingForLength
    }

    /// Payload length of the frame in progress, if its prefix was read.
    pub fn expected_len(&self) -> Option<usize> {
        match self.state {
            State::WaitingForLength => None,
            State::WaitingForPayload { expected } => Some(expected),
        }
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForLength;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
