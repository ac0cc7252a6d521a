// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! Offset-indexed buffering for a single encryption level's CRYPTO stream,
//! in both directions (§4.4).

use crate::error::TransportError;
use alloc::{collections::BTreeMap, vec::Vec};

/// Reassembles inbound CRYPTO bytes for one level, releasing the
/// contiguous prefix as it becomes available. Overlapping bytes that
/// disagree with what was already buffered are a protocol violation:
/// CRYPTO data, unlike STREAM data, is never legitimately re-sent with
/// different content at the same offset.
#[derive(Default)]
pub struct CryptoReassembler {
    read_offset: u64,
    pending: BTreeMap<u64, Vec<u8>>,
}

impl CryptoReassembler {
    pub fn buffered_len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Inserts `data` at `offset`, returning any bytes newly made
    /// contiguous with `read_offset` (possibly spanning several prior
    /// inserts).
    pub fn insert(&mut self, offset: u64, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let end = offset + data.len() as u64;
        if end <= self.read_offset {
            return Ok(Vec::new());
        }

        let (offset, data) = if offset < self.read_offset {
            let skip = (self.read_offset - offset) as usize;
            (self.read_offset, &data[skip..])
        } else {
            (offset, data)
        };

        if let Some(existing) = self.pending.get(&offset) {
            let overlap = existing.len().min(data.len());
            if existing[..overlap] != data[..overlap] {
                return Err(TransportError::PROTOCOL_VIOLATION);
            }
            if data.len() > existing.len() {
                self.pending.insert(offset, data.to_vec());
            }
        } else {
            self.pending.insert(offset, data.to_vec());
        }

        let mut out = Vec::new();
        while let Some(chunk) = self.pending.get(&self.read_offset) {
            out.extend_from_slice(chunk);
            self.read_offset += chunk.len() as u64;
            let key = self.read_offset - chunk.len() as u64;
            self.pending.remove(&key);
        }
        Ok(out)
    }
}

/// Buffers this level's outbound CRYPTO bytes starting at offset 0, so
/// `poll` can repeatedly re-emit any still-unacknowledged range for loss
/// repair (§4.6 "CRYPTO data: resend missing offsets").
#[derive(Default)]
pub struct CryptoSendBuffer {
    data: Vec<u8>,
}

impl CryptoSendBuffer {
    pub fn push(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn poll(&mut self, offset: u64, max_len: usize) -> Option<(u64, Vec<u8>)> {
        let offset = offset as usize;
        if offset >= self.data.len() {
            return None;
        }
        let end = (offset + max_len).min(self.data.len());
        Some((offset as u64, self.data[offset..end].to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_bytes_are_released_immediately() {
        let mut r = CryptoReassembler::default();
        let out = r.insert(0, b"hello").unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn out_of_order_bytes_release_once_the_gap_closes() {
        let mut r = CryptoReassembler::default();
        assert!(r.insert(5, b"world").unwrap().is_empty());
        let out = r.insert(0, b"hello").unwrap();
        assert_eq!(out, b"helloworld");
    }

    #[test]
    fn conflicting_retransmission_is_protocol_violation() {
        let mut r = CryptoReassembler::default();
        r.insert(5, b"world").unwrap();
        let err = r.insert(5, b"WORLD").unwrap_err();
        assert_eq!(err, TransportError::PROTOCOL_VIOLATION);
    }

    #[test]
    fn send_buffer_polls_requested_range() {
        let mut s = CryptoSendBuffer::default();
        s.push(b"0123456789");
        let (offset, chunk) = s.poll(3, 4).unwrap();
        assert_eq!(offset, 3);
        assert_eq!(chunk, b"3456");
    }
}
