// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! Owns every stream of a connection: creation rules, concurrency limits,
//! and connection-scope flow control (§4.5).

use super::{
    flow::{ConnectionFlowController, Window},
    recv::RecvStream,
    send::SendStream,
    Directionality, Initiator, StreamId,
};
use crate::error::TransportError;
use alloc::collections::BTreeMap;

struct StreamState {
    send: Option<SendStream>,
    recv: Option<RecvStream>,
    /// Highest offset observed on this stream, for connection-scope flow
    /// control accounting (§4.5 "counted by the highest offset observed
    /// per stream").
    highest_recv_offset: u64,
}

/// Per-(initiator, directionality) count of streams opened so far, used to
/// enforce the peer-advertised concurrency limit and to detect implicit
/// opens of lower-numbered streams (§4.5 "Creation").
#[derive(Clone, Copy, Debug, Default)]
struct ClassLimits {
    opened: u64,
    peer_max: u64,
}

pub struct StreamManager {
    role_is_client: bool,
    streams: BTreeMap<StreamId, StreamState>,
    limits: [ClassLimits; 4],
    pub connection_flow: ConnectionFlowController,
    local_initial_max_stream_data_bidi_local: u64,
    local_initial_max_stream_data_bidi_remote: u64,
    local_initial_max_stream_data_uni: u64,
}

impl StreamManager {
    pub fn new(role_is_client: bool, connection_flow: ConnectionFlowController) -> Self {
        Self {
            role_is_client,
            streams: BTreeMap::new(),
            limits: [ClassLimits::default(); 4],
            connection_flow,
            local_initial_max_stream_data_bidi_local: 0,
            local_initial_max_stream_data_bidi_remote: 0,
            local_initial_max_stream_data_uni: 0,
        }
    }

    pub fn set_local_initial_stream_data_windows(&mut self, bidi_local: u64, bidi_remote: u64, uni: u64) {
        self.local_initial_max_stream_data_bidi_local = bidi_local;
        self.local_initial_max_stream_data_bidi_remote = bidi_remote;
        self.local_initial_max_stream_data_uni = uni;
    }

    pub fn set_peer_max_streams(&mut self, directionality: Directionality, initiator: Initiator, max: u64) {
        let class = Self::class_index(initiator, directionality);
        self.limits[class].peer_max = self.limits[class].peer_max.max(max);
    }

    fn class_index(initiator: Initiator, directionality: Directionality) -> usize {
        let mut idx = 0;
        if matches!(initiator, Initiator::Remote) {
            idx |= 0b01;
        }
        if matches!(directionality, Directionality::Unidirectional) {
            idx |= 0b10;
        }
        idx
    }

    /// Ensures `id` and every lower-numbered same-class stream exist,
    /// enforcing the peer's concurrency limit (§4.5 "Creation", §6.4
    /// STREAM_LIMIT_ERROR).
    fn open_through(&mut self, id: StreamId) -> Result<(), TransportError> {
        let initiator = id.initiator(self.role_is_client);
        let directionality = id.directionality();
        let class = Self::class_index(initiator, directionality);

        // Only the remote-initiated count is bounded by a limit we issued;
        // locally-initiated opens are bounded by the peer's advertised
        // max-streams, checked the same way from our own perspective.
        let limit = self.limits[class].peer_max;
        if id.index() + 1 > limit {
            return Err(TransportError::STREAM_LIMIT_ERROR);
        }

        let bidi_local_window = self.local_initial_max_stream_data_bidi_local;
        let bidi_remote_window = self.local_initial_max_stream_data_bidi_remote;
        let uni_window = self.local_initial_max_stream_data_uni;

        while self.limits[class].opened <= id.index() {
            let index = self.limits[class].opened;
            let opening_id = StreamId::new(
                matches!(initiator, Initiator::Local),
                self.role_is_client,
                directionality,
                index,
            );
            self.streams.entry(opening_id).or_insert_with(|| {
                let has_send = matches!(initiator, Initiator::Local) || matches!(directionality, Directionality::Bidirectional);
                let has_recv = matches!(initiator, Initiator::Remote) || matches!(directionality, Directionality::Bidirectional);
                let mut send = has_send.then(SendStream::new);
                let recv = has_recv.then(RecvStream::new);
                if let Some(send) = send.as_mut() {
                    let window = match (initiator, directionality) {
                        (Initiator::Local, Directionality::Bidirectional) => bidi_remote_window,
                        (Initiator::Remote, Directionality::Bidirectional) => bidi_local_window,
                        (_, Directionality::Unidirectional) => uni_window,
                    };
                    send.set_peer_max_stream_data(window);
                }
                StreamState {
                    send,
                    recv,
                    highest_recv_offset: 0,
                }
            });
            self.limits[class].opened += 1;
        }
        Ok(())
    }

    pub fn on_stream_frame(&mut self, id: StreamId, offset: u64, data: &[u8], fin: bool) -> Result<(), TransportError> {
        self.open_through(id)?;
        let end_offset = offset + data.len() as u64;

        let state = self.streams.get_mut(&id).expect("opened above");
        let delta = end_offset.saturating_sub(state.highest_recv_offset);
        if delta > 0 {
            self.connection_flow.recv.consume_to(self.connection_flow.recv.consumed() + delta)?;
            state.highest_recv_offset = end_offset;
        }

        let Some(recv) = state.recv.as_mut() else {
            return Err(TransportError::STREAM_STATE_ERROR);
        };
        recv.on_stream_frame(offset, data, fin)
    }

    pub fn on_reset_stream(&mut self, id: StreamId, error_code: crate::varint::VarInt, final_size: u64) -> Result<(), TransportError> {
        self.open_through(id)?;
        let state = self.streams.get_mut(&id).expect("opened above");
        let delta = final_size.saturating_sub(state.highest_recv_offset);
        if delta > 0 {
            self.connection_flow.recv.consume_to(self.connection_flow.recv.consumed() + delta)?;
            state.highest_recv_offset = final_size;
        }
        let Some(recv) = state.recv.as_mut() else {
            return Err(TransportError::STREAM_STATE_ERROR);
        };
        recv.on_reset(error_code, final_size)
    }

    /// Application request to open a locally-initiated stream.
    pub fn open_local(&mut self, directionality: Directionality) -> Result<StreamId, TransportError> {
        let class = Self::class_index(Initiator::Local, directionality);
        let index = self.limits[class].opened;
        let id = StreamId::new(true, self.role_is_client, directionality, index);
        self.open_through(id)?;
        Ok(id)
    }

    pub fn send_mut(&mut self, id: StreamId) -> Option<&mut SendStream> {
        self.streams.get_mut(&id).and_then(|s| s.send.as_mut())
    }

    pub fn recv_mut(&mut self, id: StreamId) -> Option<&mut RecvStream> {
        self.streams.get_mut(&id).and_then(|s| s.recv.as_mut())
    }

    pub fn connection_recv_window(&self) -> Window {
        self.connection_flow.recv
    }

    /// Every open send-side stream with bytes or a FIN still to transmit,
    /// for the packet-assembly loop to drain (§4.6 "what must be repaired
    /// or newly sent").
    pub fn send_streams_with_pending_data(&mut self) -> impl Iterator<Item = (StreamId, &mut SendStream)> {
        self.streams
            .iter_mut()
            .filter_map(|(&id, state)| state.send.as_mut().map(|send| (id, send)))
            .filter(|(_, send)| send.has_pending_data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> StreamManager {
        let mut m = StreamManager::new(true, ConnectionFlowController::new(1_000_000, 1_000_000));
        m.set_local_initial_stream_data_windows(1000, 1000, 1000);
        m.set_peer_max_streams(Directionality::Bidirectional, Initiator::Local, 10);
        m.set_peer_max_streams(Directionality::Bidirectional, Initiator::Remote, 10);
        m
    }

    #[test]
    fn opening_high_stream_implicitly_opens_lower_ones() {
        let mut m = manager();
        let id = StreamId::new(false, true, Directionality::Bidirectional, 2);
        m.on_stream_frame(id, 0, b"hi", false).unwrap();
        for index in 0..=2 {
            let lower = StreamId::new(false, true, Directionality::Bidirectional, index);
            assert!(m.recv_mut(lower).is_some());
        }
    }

    #[test]
    fn exceeding_peer_stream_limit_is_stream_limit_error() {
        let mut m = manager();
        m.set_peer_max_streams(Directionality::Bidirectional, Initiator::Remote, 1);
        let id = StreamId::new(false, true, Directionality::Bidirectional, 5);
        let err = m.on_stream_frame(id, 0, b"x", false).unwrap_err();
        assert_eq!(err, TransportError::STREAM_LIMIT_ERROR);
    }

    #[test]
    fn connection_flow_control_tracks_highest_offset_per_stream() {
        let mut m = manager();
        let id = StreamId::new(false, true, Directionality::Bidirectional, 0);
        m.on_stream_frame(id, 0, &[0u8; 100], false).unwrap();
        assert_eq!(m.connection_recv_window().consumed(), 100);
        // Retransmission of already-seen bytes does not double count.
        m.on_stream_frame(id, 0, &[0u8; 100], false).unwrap();
        assert_eq!(m.connection_recv_window().consumed(), 100);
    }

    #[test]
    fn exceeding_connection_flow_control_is_flow_control_error() {
        let mut m = StreamManager::new(true, ConnectionFlowController::new(10, 10));
        m.set_local_initial_stream_data_windows(1000, 1000, 1000);
        m.set_peer_max_streams(Directionality::Bidirectional, Initiator::Remote, 10);
        let id = StreamId::new(false, true, Directionality::Bidirectional, 0);
        let err = m.on_stream_frame(id, 0, &[0u8; 20], false).unwrap_err();
        assert_eq!(err, TransportError::FLOW_CONTROL_ERROR);
    }

    #[test]
    fn open_local_respects_bidi_class_and_returns_sendable_stream() {
        let mut m = manager();
        let id = m.open_local(Directionality::Bidirectional).unwrap();
        assert_eq!(id.initiator(true), Initiator::Local);
        assert!(m.send_mut(id).is_some());
    }
}
