// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! Sent-record lifecycle, ACK processing, and retransmission-of-information
//! (§4.6). The congestion controller and RTT-driven loss timer are external
//! collaborators; this module only tracks what was sent, what was acked,
//! and what must be repaired.

pub mod ack_ranges;
pub mod sent_packets;

use core::time::Duration;

pub use ack_ranges::AckRanges;
pub use sent_packets::{SentPacketInfo, SentPackets};

/// Whether a packet contains a frame other than ACK, PADDING, or
/// CONNECTION_CLOSE, and therefore obligates the peer to acknowledge it
/// within `max_ack_delay` (§4.6 "ACK generation").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AckElicitation {
    NonEliciting,
    Eliciting,
}

impl AckElicitation {
    pub fn is_eliciting(self) -> bool {
        matches!(self, Self::Eliciting)
    }
}

/// The unit of repair: not a frame, but the fact that needs to be
/// re-communicated if its carrying packet is lost (§4.6 "Retransmission of
/// information, not packets").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetransmittableItem {
    CryptoData { offset: u64, len: u64 },
    StreamData { stream_id: crate::stream::StreamId, offset: u64, len: u64, fin: bool },
    ResetStream { stream_id: crate::stream::StreamId },
    StopSending { stream_id: crate::stream::StreamId },
    MaxData,
    MaxStreamData { stream_id: crate::stream::StreamId },
    MaxStreams { directionality: crate::stream::Directionality },
    DataBlocked,
    StreamDataBlocked { stream_id: crate::stream::StreamId },
    StreamsBlocked { directionality: crate::stream::Directionality },
    NewConnectionId { sequence_number: u64 },
    RetireConnectionId { sequence_number: u64 },
    PathChallenge,
    NewToken,
    HandshakeDone,
}

/// An external collaborator supplying congestion feedback (Non-goal: this
/// crate implements no specific algorithm, consumed via this interface
/// instead, per §1 and §9).
pub trait CongestionController {
    fn on_packet_sent(&mut self, bytes_sent: u32, is_congestion_controlled: bool);
    fn on_packet_acked(&mut self, bytes_acked: u32, rtt: Duration);
    fn on_packet_lost(&mut self, bytes_lost: u32, persistent_congestion: bool);
    fn congestion_window(&self) -> u32;
    fn bytes_in_flight(&self) -> u32;

    fn is_congestion_limited(&self) -> bool {
        self.bytes_in_flight() >= self.congestion_window()
    }
}

/// RFC 9002 §5 smoothed-RTT estimator, decoupled from any specific
/// congestion controller so both cubic- and BBR-style controllers (or a
/// test double) can consume the same samples.
#[derive(Clone, Copy, Debug)]
pub struct RttEstimator {
    min_rtt: Duration,
    smoothed_rtt: Duration,
    rttvar: Duration,
    first_sample_taken: bool,
}

impl RttEstimator {
    pub fn new(initial_rtt: Duration) -> Self {
        Self {
            min_rtt: initial_rtt,
            smoothed_rtt: initial_rtt,
            rttvar: initial_rtt / 2,
            first_sample_taken: false,
        }
    }

    pub fn smoothed_rtt(&self) -> Duration {
        self.smoothed_rtt
    }

    pub fn min_rtt(&self) -> Duration {
        self.min_rtt
    }

    pub fn rttvar(&self) -> Duration {
        self.rttvar
    }

    pub fn pto_period(&self) -> Duration {
        self.smoothed_rtt + (self.rttvar * 4).max(Duration::from_millis(1))
    }

    /// Feeds in one ACK sample: `rtt_sample` is the wall-clock send-to-ack
    /// latency, `ack_delay` is the peer-reported delay (already capped by
    /// `max_ack_delay` by the caller per §4.6 item 3).
    pub fn update(&mut self, rtt_sample: Duration, ack_delay: Duration, handshake_confirmed: bool) {
        self.min_rtt = self.min_rtt.min(rtt_sample);

        let adjusted = if handshake_confirmed {
            rtt_sample.saturating_sub(ack_delay).max(self.min_rtt)
        } else {
            rtt_sample
        };

        if !self.first_sample_taken {
            self.first_sample_taken = true;
            self.smoothed_rtt = adjusted;
            self.rttvar = adjusted / 2;
            return;
        }

        let diff = if adjusted > self.smoothed_rtt {
            adjusted - self.smoothed_rtt
        } else {
            self.smoothed_rtt - adjusted
        };
        self.rttvar = (self.rttvar * 3 + diff) / 4;
        self.smoothed_rtt = (self.smoothed_rtt * 7 + adjusted) / 8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_seeds_smoothed_rtt_directly() {
        let mut rtt = RttEstimator::new(Duration::from_millis(333));
        rtt.update(Duration::from_millis(100), Duration::from_millis(0), true);
        assert_eq!(rtt.smoothed_rtt(), Duration::from_millis(100));
        assert_eq!(rtt.min_rtt(), Duration::from_millis(100));
    }

    #[test]
    fn ack_delay_is_ignored_before_handshake_confirmation() {
        let mut rtt = RttEstimator::new(Duration::from_millis(333));
        rtt.update(Duration::from_millis(100), Duration::from_millis(50), false);
        assert_eq!(rtt.smoothed_rtt(), Duration::from_millis(100));
    }

    #[test]
    fn pto_period_grows_with_variance() {
        let mut rtt = RttEstimator::new(Duration::from_millis(100));
        rtt.update(Duration::from_millis(100), Duration::ZERO, true);
        rtt.update(Duration::from_millis(300), Duration::ZERO, true);
        assert!(rtt.pto_period() > Duration::from_millis(100));
    }
}
