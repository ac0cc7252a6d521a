// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! Stream identifiers, per-direction state machines, flow control, and the
//! stream manager (§3 "Stream", §4.5).

pub mod flow;
pub mod manager;
pub mod recv;
pub mod send;

use crate::varint::VarInt;
use core::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Initiator {
    Local,
    Remote,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Directionality {
    Bidirectional,
    Unidirectional,
}

/// A 62-bit stream identifier whose low two bits encode
/// `(initiator, directionality)` (§3).
#[derive(Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct StreamId(VarInt);

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({})", self.0.as_u64())
    }
}

impl StreamId {
    pub fn from_varint(v: VarInt) -> Self {
        Self(v)
    }

    pub fn as_varint(self) -> VarInt {
        self.0
    }

    pub fn new(is_local: bool, role_is_client: bool, directionality: Directionality, index: u64) -> Self {
        let initiated_by_client = is_local == role_is_client;
        let mut bits = 0u64;
        if !initiated_by_client {
            bits |= 0b01;
        }
        if matches!(directionality, Directionality::Unidirectional) {
            bits |= 0b10;
        }
        Self(VarInt::new(index << 2 | bits).expect("stream index too large"))
    }

    pub fn initiator(self, role_is_client: bool) -> Initiator {
        let initiated_by_client = self.0.as_u64() & 0b01 == 0;
        if initiated_by_client == role_is_client {
            Initiator::Local
        } else {
            Initiator::Remote
        }
    }

    pub fn directionality(self) -> Directionality {
        if self.0.as_u64() & 0b10 == 0 {
            Directionality::Bidirectional
        } else {
            Directionality::Unidirectional
        }
    }

    /// The ordinal of this stream within its (initiator, directionality)
    /// class: opening stream N implicitly opens every lower-numbered
    /// stream of the same class (§3, §4.5).
    pub fn index(self) -> u64 {
        self.0.as_u64() >> 2
    }

    pub fn type_offset(initiator: Initiator, role_is_client: bool, directionality: Directionality) -> u64 {
        let initiated_by_client = match initiator {
            Initiator::Local => role_is_client,
            Initiator::Remote => !role_is_client,
        };
        let mut bits = 0u64;
        if !initiated_by_client {
            bits |= 0b01;
        }
        if matches!(directionality, Directionality::Unidirectional) {
            bits |= 0b10;
        }
        bits
    }
}

/// Send-side stream states (§3, §4.5).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SendState {
    Ready,
    Send,
    DataSent,
    DataRecvd,
    ResetSent,
    ResetRecvd,
}

impl SendState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::DataRecvd | Self::ResetRecvd)
    }

    pub fn may_emit_stream_data(self) -> bool {
        matches!(self, Self::Ready | Self::Send)
    }
}

/// Receive-side stream states (§3, §4.5).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecvState {
    Recv,
    SizeKnown,
    DataRecvd,
    DataRead,
    ResetRecvd,
    ResetRead,
}

impl RecvState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::DataRead | Self::ResetRead)
    }

    pub fn may_send_max_stream_data(self) -> bool {
        matches!(self, Self::Recv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_id_bits_identify_initiator_and_directionality() {
        let client_bidi = StreamId::new(true, true, Directionality::Bidirectional, 0);
        assert_eq!(client_bidi.as_varint().as_u64(), 0);
        assert_eq!(client_bidi.initiator(true), Initiator::Local);
        assert_eq!(client_bidi.directionality(), Directionality::Bidirectional);

        let server_uni = StreamId::new(true, false, Directionality::Unidirectional, 3);
        // server role, locally initiated, uni, index 3: bits = 0b11, id = 3*4+3=15
        assert_eq!(server_uni.as_varint().as_u64(), 15);
        assert_eq!(server_uni.initiator(false), Initiator::Local);
        assert_eq!(server_uni.initiator(true), Initiator::Remote);
    }

    #[test]
    fn index_recovers_ordinal_within_class() {
        let id = StreamId::from_varint(VarInt::new(4 * 7 + 1).unwrap());
        assert_eq!(id.index(), 7);
    }
}
