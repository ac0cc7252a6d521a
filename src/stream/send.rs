// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! The sending half of a stream (§4.5 "Send states").

use super::SendState;
use crate::{error::TransportError, varint::VarInt};

/// What the send side currently owes the wire: not literal frame copies
/// (§9 "Retransmission without per-frame heap objects"), but the minimal
/// facts needed to reserialize a repair at packet-assembly time.
///
/// `buffered` holds every byte from `lowest_unacked_offset` up to the end
/// of what the application has written — both the sent-but-unacked range
/// and the not-yet-sent tail — so a loss-triggered retransmission can
/// re-read the exact bytes that went out the first time instead of
/// reconstructing a placeholder. Bytes are only dropped from the front once
/// `on_data_acked` confirms the peer has them.
#[derive(Debug)]
pub struct SendStream {
    state: SendState,
    buffered: alloc::collections::VecDeque<u8>,
    /// Offset of the first byte not yet acknowledged.
    lowest_unacked_offset: u64,
    /// Offset of the first byte not yet sent.
    send_offset: u64,
    /// Offset one past the last byte the application has written.
    write_offset: u64,
    fin_buffered: bool,
    fin_sent: bool,
    fin_acked: bool,
    final_size: Option<u64>,
    reset_error_code: Option<VarInt>,
    reset_acked: bool,
    peer_max_stream_data: u64,
}

impl SendStream {
    pub fn new() -> Self {
        Self {
            state: SendState::Ready,
            buffered: alloc::collections::VecDeque::new(),
            lowest_unacked_offset: 0,
            send_offset: 0,
            write_offset: 0,
            fin_buffered: false,
            fin_sent: false,
            fin_acked: false,
            final_size: None,
            reset_error_code: None,
            reset_acked: false,
            peer_max_stream_data: 0,
        }
    }

    pub fn state(&self) -> SendState {
        self.state
    }

    pub fn set_peer_max_stream_data(&mut self, limit: u64) {
        self.peer_max_stream_data = self.peer_max_stream_data.max(limit);
    }

    /// How many more bytes we are currently allowed to put on the wire for
    /// this stream (§3 "Flow control", stream scope).
    pub fn available_credit(&self) -> u64 {
        self.peer_max_stream_data.saturating_sub(self.send_offset)
    }

    /// Accepts application bytes for later transmission. Returns an error
    /// if the stream has already entered a state where no more data may be
    /// emitted (§4.5 "A sender MUST NOT emit STREAM/STREAM_DATA_BLOCKED in
    /// Reset Sent or any terminal state").
    pub fn write(&mut self, data: &[u8], fin: bool) -> Result<(), TransportError> {
        if !self.state.may_emit_stream_data() {
            return Err(TransportError::STREAM_STATE_ERROR);
        }
        if self.fin_buffered {
            return Err(TransportError::STREAM_STATE_ERROR);
        }
        self.buffered.extend(data.iter().copied());
        self.write_offset += data.len() as u64;
        if fin {
            self.fin_buffered = true;
        }
        if matches!(self.state, SendState::Ready) && (!data.is_empty() || fin) {
            self.state = SendState::Send;
        }
        Ok(())
    }

    /// Pulls up to `max_len` bytes (bounded by peer flow control) to place
    /// into a STREAM frame, advancing `send_offset`. Returns the data, its
    /// starting offset, and whether this chunk carries FIN. The bytes stay
    /// in `buffered` until acknowledged, so a later loss can resend them
    /// unchanged.
    pub fn poll_transmission(&mut self, max_len: usize) -> Option<(u64, alloc::vec::Vec<u8>, bool)> {
        if self.state.is_terminal() || matches!(self.state, SendState::ResetSent) {
            return None;
        }
        let credit = self.available_credit() as usize;
        let already_sent = (self.send_offset - self.lowest_unacked_offset) as usize;
        let unsent = self.buffered.len().saturating_sub(already_sent);
        let take = unsent.min(max_len).min(credit);
        let offset = self.send_offset;

        let data: alloc::vec::Vec<u8> = self
            .buffered
            .iter()
            .skip(already_sent)
            .take(take)
            .copied()
            .collect();
        self.send_offset += take as u64;

        let fin = self.fin_buffered && self.send_offset == self.write_offset && !self.fin_sent;
        if data.is_empty() && !fin {
            return None;
        }
        if fin {
            self.fin_sent = true;
            self.final_size = Some(self.send_offset);
            self.state = SendState::DataSent;
        } else if matches!(self.state, SendState::Ready) {
            self.state = SendState::Send;
        }
        Some((offset, data, fin))
    }

    pub fn on_data_acked(&mut self, offset: u64, len: u64, fin: bool) {
        let new_low = self.lowest_unacked_offset.max(offset + len);
        let advance = (new_low - self.lowest_unacked_offset).min(self.buffered.len() as u64) as usize;
        self.buffered.drain(..advance);
        self.lowest_unacked_offset = new_low;
        if fin {
            self.fin_acked = true;
        }
        if self.fin_sent && self.fin_acked && self.lowest_unacked_offset >= self.final_size.unwrap_or(0) {
            self.state = SendState::DataRecvd;
        }
    }

    /// A packet carrying `[offset, offset+len)` (and, if `fin`, the FIN bit)
    /// was declared lost. The bytes are still sitting in `buffered` since
    /// they haven't been acked, so repair is just rewinding `send_offset` —
    /// `poll_transmission` will pick the same bytes back up.
    pub fn on_data_lost(&mut self, offset: u64, fin: bool) {
        if matches!(self.state, SendState::ResetSent | SendState::ResetRecvd) {
            return;
        }
        self.send_offset = self.send_offset.min(offset);
        if fin && self.fin_sent {
            self.fin_sent = false;
            if matches!(self.state, SendState::DataSent) {
                self.state = SendState::Send;
            }
        }
    }

    /// Application or peer-driven abort (§4.5 "application-abort or
    /// STOP_SENDING ... -> Reset Sent").
    pub fn reset(&mut self, error_code: VarInt) {
        if self.state.is_terminal() {
            return;
        }
        self.reset_error_code = Some(error_code);
        self.final_size.get_or_insert(self.send_offset);
        self.buffered.clear();
        self.state = SendState::ResetSent;
    }

    pub fn on_reset_acked(&mut self) {
        if matches!(self.state, SendState::ResetSent) {
            self.reset_acked = true;
            self.state = SendState::ResetRecvd;
        }
    }

    pub fn reset_error_code(&self) -> Option<VarInt> {
        self.reset_error_code
    }

    pub fn final_size(&self) -> Option<u64> {
        self.final_size
    }

    pub fn has_pending_data(&self) -> bool {
        self.send_offset < self.write_offset || (self.fin_buffered && !self.fin_sent)
    }
}

impl Default for SendStream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_transmit_then_ack_reaches_data_recvd() {
        let mut s = SendStream::new();
        s.set_peer_max_stream_data(100);
        s.write(b"hello", true).unwrap();
        let (offset, data, fin) = s.poll_transmission(100).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(data, b"hello");
        assert!(fin);
        assert_eq!(s.state(), SendState::DataSent);
        s.on_data_acked(0, 5, true);
        assert_eq!(s.state(), SendState::DataRecvd);
    }

    #[test]
    fn cannot_write_after_fin_buffered() {
        let mut s = SendStream::new();
        s.set_peer_max_stream_data(100);
        s.write(b"a", true).unwrap();
        assert!(s.write(b"b", false).is_err());
    }

    #[test]
    fn flow_control_caps_transmission() {
        let mut s = SendStream::new();
        s.set_peer_max_stream_data(3);
        s.write(b"hello", false).unwrap();
        let (offset, data, fin) = s.poll_transmission(100).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(data, b"hel");
        assert!(!fin);
        assert_eq!(s.poll_transmission(100), None); // blocked: no more credit
    }

    #[test]
    fn lost_data_is_retransmitted_with_the_original_bytes() {
        let mut s = SendStream::new();
        s.set_peer_max_stream_data(100);
        s.write(b"hello world", false).unwrap();
        let (offset, data, fin) = s.poll_transmission(100).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(data, b"hello world");
        assert!(!fin);

        s.on_data_lost(0, fin);
        let (offset, data, fin) = s.poll_transmission(100).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(data, b"hello world");
        assert!(!fin);
    }

    #[test]
    fn lost_fin_is_retransmitted() {
        let mut s = SendStream::new();
        s.set_peer_max_stream_data(10);
        s.write(b"hi", true).unwrap();
        let (_, _, fin) = s.poll_transmission(100).unwrap();
        assert!(fin);
        assert_eq!(s.state(), SendState::DataSent);

        s.on_data_lost(0, fin);
        assert_eq!(s.state(), SendState::Send);
        let (offset, data, fin) = s.poll_transmission(100).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(data, b"hi");
        assert!(fin);
        assert_eq!(s.state(), SendState::DataSent);
    }

    #[test]
    fn reset_after_terminal_is_a_no_op() {
        let mut s = SendStream::new();
        s.set_peer_max_stream_data(10);
        s.write(b"hi", true).unwrap();
        s.poll_transmission(100);
        s.on_data_acked(0, 2, true);
        assert_eq!(s.state(), SendState::DataRecvd);
        s.reset(VarInt::from_u8(1));
        assert_eq!(s.state(), SendState::DataRecvd);
    }
}
