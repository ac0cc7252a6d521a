// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! The receiving half of a stream (§4.5 "Receive states").

use super::RecvState;
use crate::{error::TransportError, varint::VarInt};
use alloc::collections::BTreeMap;

/// Reassembles out-of-order STREAM data by offset (§4.5 "receive buffer").
/// Keyed by the start offset of each still-unread chunk; adjacent and
/// overlapping chunks are merged eagerly so the map never holds more
/// entries than there are gaps in the data received so far.
#[derive(Debug, Default)]
struct Reassembler {
    chunks: BTreeMap<u64, alloc::vec::Vec<u8>>,
    read_offset: u64,
}

impl Reassembler {
    fn insert(&mut self, mut offset: u64, mut data: &[u8]) {
        if data.is_empty() {
            return;
        }
        // Drop any prefix already consumed by the application.
        if offset < self.read_offset {
            let skip = (self.read_offset - offset) as usize;
            if skip >= data.len() {
                return;
            }
            data = &data[skip..];
            offset = self.read_offset;
        }

        let end = offset + data.len() as u64;

        // Merge with any overlapping predecessor.
        let mut merged_offset = offset;
        let mut merged: alloc::vec::Vec<u8> = data.to_vec();
        if let Some((&prev_offset, prev_data)) = self.chunks.range(..=offset).next_back() {
            let prev_end = prev_offset + prev_data.len() as u64;
            if prev_end >= offset {
                let mut combined = prev_data.clone();
                if prev_end < end {
                    let tail_start = (prev_end - offset) as usize;
                    combined.extend_from_slice(&merged[tail_start..]);
                }
                merged = combined;
                merged_offset = prev_offset;
                self.chunks.remove(&prev_offset);
            }
        }

        // Absorb overlapping/adjacent successors.
        let merged_end = merged_offset + merged.len() as u64;
        let overlapping: alloc::vec::Vec<u64> = self
            .chunks
            .range(merged_offset..=merged_end)
            .map(|(&k, _)| k)
            .collect();
        for key in overlapping {
            if let Some(next_data) = self.chunks.remove(&key) {
                let next_end = key + next_data.len() as u64;
                let cur_end = merged_offset + merged.len() as u64;
                if next_end > cur_end {
                    let tail_start = (cur_end - key) as usize;
                    merged.extend_from_slice(&next_data[tail_start.min(next_data.len())..]);
                }
            }
        }

        self.chunks.insert(merged_offset, merged);
    }

    /// True if bytes `[read_offset, read_offset + len)` are all available.
    fn contiguous_len(&self) -> u64 {
        if let Some((&offset, data)) = self.chunks.iter().next() {
            if offset == self.read_offset {
                return data.len() as u64;
            }
        }
        0
    }

    fn read(&mut self, max_len: usize) -> alloc::vec::Vec<u8> {
        let Some((&offset, data)) = self.chunks.iter().next() else {
            return alloc::vec::Vec::new();
        };
        if offset != self.read_offset {
            return alloc::vec::Vec::new();
        }
        let take = data.len().min(max_len);
        let out = data[..take].to_vec();
        if take == data.len() {
            self.chunks.remove(&offset);
        } else {
            let remaining = data[take..].to_vec();
            self.chunks.remove(&offset);
            self.chunks.insert(offset + take as u64, remaining);
        }
        self.read_offset += take as u64;
        out
    }

    fn highest_received_offset(&self) -> u64 {
        self.chunks
            .iter()
            .map(|(&offset, data)| offset + data.len() as u64)
            .max()
            .unwrap_or(self.read_offset)
    }
}

#[derive(Debug)]
pub struct RecvStream {
    state: RecvState,
    reassembler: Reassembler,
    final_size: Option<u64>,
    reset_error_code: Option<VarInt>,
    max_stream_data_sent: u64,
}

impl RecvStream {
    pub fn new() -> Self {
        Self {
            state: RecvState::Recv,
            reassembler: Reassembler::default(),
            final_size: None,
            reset_error_code: None,
            max_stream_data_sent: 0,
        }
    }

    pub fn state(&self) -> RecvState {
        self.state
    }

    pub fn final_size(&self) -> Option<u64> {
        self.final_size
    }

    /// §4.5 invariant: "the final size of a stream ... must not change
    /// after it is first established", checked on every frame carrying an
    /// end offset, FIN or not.
    fn check_final_size(&mut self, end_offset: u64, is_final: bool) -> Result<(), TransportError> {
        if let Some(known) = self.final_size {
            if end_offset > known || (is_final && end_offset != known) {
                return Err(TransportError::FINAL_SIZE_ERROR);
            }
        } else if is_final {
            if end_offset < self.reassembler.highest_received_offset() {
                return Err(TransportError::FINAL_SIZE_ERROR);
            }
            self.final_size = Some(end_offset);
        }
        Ok(())
    }

    pub fn on_stream_frame(&mut self, offset: u64, data: &[u8], fin: bool) -> Result<(), TransportError> {
        if self.state.is_terminal() || matches!(self.state, RecvState::ResetRecvd) {
            return Ok(());
        }
        let end_offset = offset + data.len() as u64;
        self.check_final_size(end_offset, fin)?;
        self.reassembler.insert(offset, data);
        if fin && matches!(self.state, RecvState::Recv) {
            self.state = RecvState::SizeKnown;
        }
        self.maybe_complete();
        Ok(())
    }

    fn maybe_complete(&mut self) {
        if let Some(final_size) = self.final_size {
            if self.reassembler.read_offset == final_size && self.reassembler.chunks.is_empty() {
                self.state = RecvState::DataRecvd;
            }
        }
    }

    pub fn on_reset(&mut self, error_code: VarInt, final_size: u64) -> Result<(), TransportError> {
        if self.state.is_terminal() {
            return Ok(());
        }
        self.check_final_size(final_size, true)?;
        self.reset_error_code = Some(error_code);
        self.state = RecvState::ResetRecvd;
        Ok(())
    }

    pub fn reset_error_code(&self) -> Option<VarInt> {
        self.reset_error_code
    }

    /// Bytes currently ready for the application to read, in order.
    pub fn read(&mut self, max_len: usize) -> alloc::vec::Vec<u8> {
        let out = self.reassembler.read(max_len);
        self.maybe_complete();
        if matches!(self.state, RecvState::DataRecvd) && !out.is_empty() {
            // stays DataRecvd until application explicitly marks it read
        }
        out
    }

    /// Application has drained all data after seeing FIN; transitions the
    /// terminal "read" state (§4.5: DataRecvd -> DataRead).
    pub fn mark_data_read(&mut self) {
        if matches!(self.state, RecvState::DataRecvd) {
            self.state = RecvState::DataRead;
        }
    }

    pub fn mark_reset_read(&mut self) {
        if matches!(self.state, RecvState::ResetRecvd) {
            self.state = RecvState::ResetRead;
        }
    }

    pub fn bytes_available(&self) -> u64 {
        self.reassembler.contiguous_len()
    }

    pub fn highest_received_offset(&self) -> u64 {
        self.reassembler.highest_received_offset()
    }
}

impl Default for RecvStream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_chunks_reassemble() {
        let mut s = RecvStream::new();
        s.on_stream_frame(5, b"world", false).unwrap();
        assert_eq!(s.bytes_available(), 0);
        s.on_stream_frame(0, b"hello", false).unwrap();
        assert_eq!(s.bytes_available(), 10);
        assert_eq!(s.read(100), b"helloworld");
    }

    #[test]
    fn overlapping_chunks_merge() {
        let mut s = RecvStream::new();
        s.on_stream_frame(0, b"hello", false).unwrap();
        s.on_stream_frame(3, b"lowombat", true).unwrap();
        assert_eq!(s.read(100), b"hellowombat");
        assert_eq!(s.state(), RecvState::DataRecvd);
    }

    #[test]
    fn final_size_shrink_is_rejected() {
        let mut s = RecvStream::new();
        s.on_stream_frame(0, b"hello", true).unwrap();
        let err = s.on_stream_frame(10, b"x", true).unwrap_err();
        assert_eq!(err, TransportError::FINAL_SIZE_ERROR);
    }

    #[test]
    fn reset_establishes_final_size() {
        let mut s = RecvStream::new();
        s.on_stream_frame(0, b"ab", false).unwrap();
        s.on_reset(VarInt::from_u8(7), 2).unwrap();
        assert_eq!(s.state(), RecvState::ResetRecvd);
        assert_eq!(s.reset_error_code(), Some(VarInt::from_u8(7)));
    }

    #[test]
    fn reset_below_already_received_data_is_final_size_error() {
        let mut s = RecvStream::new();
        s.on_stream_frame(0, b"hello", false).unwrap();
        let err = s.on_reset(VarInt::from_u8(1), 2).unwrap_err();
        assert_eq!(err, TransportError::FINAL_SIZE_ERROR);
    }
}
