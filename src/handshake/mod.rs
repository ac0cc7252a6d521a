// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! The handshake orchestrator: drives an external TLS collaborator through
//! CRYPTO-frame exchange, key installation, and completion (§4.4, §6.2).

pub mod crypto_buffer;

use crate::{error::TransportError, packet::EncryptionLevel, transport_parameters::TransportParameters};
use alloc::vec::Vec;
use crypto_buffer::CryptoSendBuffer;

/// What the core requires from the TLS collaborator (§6.2). The AEAD/HKDF
/// primitives themselves stay out of scope; this trait only moves bytes and
/// reports the events the handshake state machine needs to react to.
pub trait Tls {
    /// Feeds handshake bytes received at `level`, already in contiguous
    /// offset order.
    fn give_bytes(&mut self, level: EncryptionLevel, bytes: &[u8]) -> Result<(), TransportError>;

    /// Drains any handshake bytes the TLS engine wants to send at `level`.
    fn take_bytes(&mut self, level: EncryptionLevel) -> Option<Vec<u8>>;

    /// Sends the local transport parameters extension body during the
    /// handshake, before the first `take_bytes` call that needs it.
    fn send_transport_parameters(&mut self, encoded: &[u8]);

    /// The peer's transport-parameters extension bytes, once received.
    fn peer_transport_parameters(&mut self) -> Option<Vec<u8>>;

    /// A new read or write key became available at `level`. Returns `true`
    /// exactly once per level per direction.
    fn poll_new_read_key(&mut self) -> Option<EncryptionLevel>;
    fn poll_new_write_key(&mut self) -> Option<EncryptionLevel>;

    fn is_handshake_complete(&mut self) -> bool;

    /// A fatal TLS alert, if one has occurred.
    fn take_alert(&mut self) -> Option<u8>;

    /// The raw secret backing a just-announced read or write key at
    /// `level` (following a `poll_new_read_key`/`poll_new_write_key`
    /// event). Only the TLS collaborator runs the exporter that produces
    /// these; the core only moves the resulting bytes into
    /// [`crate::protection::keys::derive_directional_keys`]. Initial keys
    /// skip this path entirely since they derive from the connection ID
    /// alone (§4.2).
    fn take_secret(&mut self, _level: EncryptionLevel, _is_read: bool) -> Option<Vec<u8>> {
        None
    }
}

/// Per-level CRYPTO stream offset bookkeeping (§4.4: "accumulating receive
/// buffer for CRYPTO frames, offset-indexed").
#[derive(Default)]
struct CryptoRecvStream {
    reassembler: crypto_buffer::CryptoReassembler,
}

/// Drives a `Tls` implementation across the four encryption levels,
/// translating CRYPTO frames into TLS input and TLS output into CRYPTO
/// frames (§4.4).
pub struct Handshake<T: Tls> {
    tls: T,
    role_is_client: bool,
    recv: [CryptoRecvStream; 3],
    send: [CryptoSendBuffer; 3],
    complete: bool,
    confirmed: bool,
    retry_received: bool,
}

/// Total bytes buffered across every level before further CRYPTO data is
/// rejected (§4.4: "at least 4096 bytes across the handshake").
pub const MAX_CRYPTO_BUFFER: usize = 4096;

fn space_index(level: EncryptionLevel) -> Option<usize> {
    match level {
        EncryptionLevel::Initial => Some(0),
        EncryptionLevel::Handshake => Some(1),
        EncryptionLevel::OneRtt => Some(2),
        EncryptionLevel::ZeroRtt => None,
    }
}

impl<T: Tls> Handshake<T> {
    pub fn new(tls: T, role_is_client: bool) -> Self {
        Self {
            tls,
            role_is_client,
            recv: Default::default(),
            send: Default::default(),
            complete: false,
            confirmed: false,
            retry_received: false,
        }
    }

    pub fn send_transport_parameters(&mut self, params: &TransportParameters) {
        let mut encoder = crate::codec::EncoderBuffer::new();
        encoder.encode(params);
        self.tls.send_transport_parameters(encoder.as_slice());
    }

    pub fn peer_transport_parameters(&mut self) -> Result<Option<TransportParameters>, TransportError> {
        let Some(bytes) = self.tls.peer_transport_parameters() else {
            return Ok(None);
        };
        let buffer = crate::codec::DecoderBuffer::new(&bytes);
        Ok(Some(TransportParameters::decode(buffer)?))
    }

    /// Feeds a CRYPTO frame's bytes into the per-level reassembler, and if
    /// this extends the contiguous run, hands the newly-contiguous bytes to
    /// TLS (§4.4: "on receipt of contiguous bytes ... feed them to TLS").
    pub fn on_crypto_frame(&mut self, level: EncryptionLevel, offset: u64, data: &[u8]) -> Result<(), TransportError> {
        let Some(idx) = space_index(level) else {
            return Err(TransportError::PROTOCOL_VIOLATION);
        };

        let total_buffered: usize = self.recv.iter().map(|r| r.reassembler.buffered_len()).sum();
        if total_buffered + data.len() > MAX_CRYPTO_BUFFER {
            return Err(TransportError::CRYPTO_BUFFER_EXCEEDED);
        }

        let contiguous = self.recv[idx].reassembler.insert(offset, data)?;
        if !contiguous.is_empty() {
            self.tls.give_bytes(level, &contiguous)?;
        }
        Ok(())
    }

    /// Drains TLS output for every level and appends it to this
    /// handshake's outbound CRYPTO streams, then surfaces key/completion
    /// events. Call after every `on_crypto_frame` and once per
    /// `process_timer` tick.
    pub fn poll(&mut self) -> Result<HandshakeEvents, TransportError> {
        if let Some(alert) = self.tls.take_alert() {
            return Err(TransportError::crypto_error(alert, "TLS reported a fatal alert"));
        }

        for level in [EncryptionLevel::Initial, EncryptionLevel::Handshake, EncryptionLevel::OneRtt] {
            let idx = space_index(level).unwrap();
            while let Some(bytes) = self.tls.take_bytes(level) {
                self.send[idx].push(&bytes);
            }
        }

        let mut events = HandshakeEvents::default();
        events.new_read_key = self.tls.poll_new_read_key();
        events.new_write_key = self.tls.poll_new_write_key();

        if !self.complete && self.tls.is_handshake_complete() {
            self.complete = true;
            events.handshake_complete = true;
            // §4.4: "server then sends HANDSHAKE_DONE ... The server
            // records confirmation when the handshake completes."
            if !self.role_is_client {
                self.confirmed = true;
                events.send_handshake_done = true;
            }
        }
        Ok(events)
    }

    /// Client-side confirmation: receipt of HANDSHAKE_DONE (§4.4).
    pub fn on_handshake_done_received(&mut self) -> Result<(), TransportError> {
        if !self.role_is_client {
            return Err(TransportError::PROTOCOL_VIOLATION);
        }
        self.confirmed = true;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// Pending outbound CRYPTO bytes for `level`, starting at `offset`.
    pub fn poll_crypto_data(&mut self, level: EncryptionLevel, offset: u64, max_len: usize) -> Option<(u64, Vec<u8>)> {
        let idx = space_index(level)?;
        self.send[idx].poll(offset, max_len)
    }

    /// Forwards to [`Tls::take_secret`], for the endpoint layer to turn
    /// into `DirectionalKeys` after a key-ready event.
    pub fn take_secret(&mut self, level: EncryptionLevel, is_read: bool) -> Option<Vec<u8>> {
        self.tls.take_secret(level, is_read)
    }

    /// §4.4: a server's Retry (processed by the endpoint, not here) forces
    /// Initial keys to be re-derived; this just records that it happened so
    /// a second Retry can be rejected.
    pub fn on_retry(&mut self) -> Result<(), TransportError> {
        if self.retry_received {
            return Err(TransportError::PROTOCOL_VIOLATION);
        }
        self.retry_received = true;
        Ok(())
    }
}

#[derive(Default)]
pub struct HandshakeEvents {
    pub new_read_key: Option<EncryptionLevel>,
    pub new_write_key: Option<EncryptionLevel>,
    pub handshake_complete: bool,
    pub send_handshake_done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedTls {
        complete: bool,
        outbound: VecDeque<(EncryptionLevel, Vec<u8>)>,
    }

    impl Tls for ScriptedTls {
        fn give_bytes(&mut self, _level: EncryptionLevel, _bytes: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }
        fn take_bytes(&mut self, level: EncryptionLevel) -> Option<Vec<u8>> {
            if self.outbound.front().map(|(l, _)| *l) == Some(level) {
                self.outbound.pop_front().map(|(_, b)| b)
            } else {
                None
            }
        }
        fn send_transport_parameters(&mut self, _encoded: &[u8]) {}
        fn peer_transport_parameters(&mut self) -> Option<Vec<u8>> {
            None
        }
        fn poll_new_read_key(&mut self) -> Option<EncryptionLevel> {
            None
        }
        fn poll_new_write_key(&mut self) -> Option<EncryptionLevel> {
            None
        }
        fn is_handshake_complete(&mut self) -> bool {
            self.complete
        }
        fn take_alert(&mut self) -> Option<u8> {
            None
        }
    }

    #[test]
    fn contiguous_crypto_bytes_reach_tls() {
        let mut hs = Handshake::new(ScriptedTls::default(), true);
        hs.on_crypto_frame(EncryptionLevel::Initial, 0, b"hello").unwrap();
    }

    #[test]
    fn out_of_order_crypto_is_buffered_until_contiguous() {
        let mut hs = Handshake::new(ScriptedTls::default(), true);
        hs.on_crypto_frame(EncryptionLevel::Initial, 5, b"world").unwrap();
        hs.on_crypto_frame(EncryptionLevel::Initial, 0, b"hello").unwrap();
    }

    #[test]
    fn exceeding_crypto_buffer_cap_is_rejected() {
        let mut hs = Handshake::new(ScriptedTls::default(), true);
        let chunk = alloc::vec![0u8; MAX_CRYPTO_BUFFER];
        // buffered out of order so it never drains via contiguous delivery
        let err = hs.on_crypto_frame(EncryptionLevel::Initial, 1, &chunk).unwrap_err();
        assert_eq!(err, TransportError::CRYPTO_BUFFER_EXCEEDED);
    }

    #[test]
    fn server_sends_handshake_done_on_completion() {
        let mut hs = Handshake::new(ScriptedTls { complete: true, ..Default::default() }, false);
        let events = hs.poll().unwrap();
        assert!(events.handshake_complete);
        assert!(events.send_handshake_done);
        assert!(hs.is_confirmed());
    }

    #[test]
    fn client_confirms_only_on_handshake_done_receipt() {
        let mut hs = Handshake::new(ScriptedTls { complete: true, ..Default::default() }, true);
        hs.poll().unwrap();
        assert!(!hs.is_confirmed());
        hs.on_handshake_done_received().unwrap();
        assert!(hs.is_confirmed());
    }

    #[test]
    fn second_retry_is_protocol_violation() {
        let mut hs = Handshake::new(ScriptedTls::default(), true);
        hs.on_retry().unwrap();
        let err = hs.on_retry().unwrap_err();
        assert_eq!(err, TransportError::PROTOCOL_VIOLATION);
    }
}
