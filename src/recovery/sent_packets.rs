// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-space sent-record tracking and ACK-range application
//! (§4.6 "Sent-record lifecycle").

use super::{AckElicitation, CongestionController, RetransmittableItem};
use crate::{error::TransportError, packet::number::PacketNumber};
use alloc::{collections::BTreeMap, vec::Vec};
use core::time::Duration;

#[derive(Clone, Debug)]
pub struct SentPacketInfo {
    pub time_sent: Duration,
    pub sent_bytes: u32,
    pub ack_elicitation: AckElicitation,
    pub congestion_controlled: bool,
    pub items: Vec<RetransmittableItem>,
}

/// One packet-number space's worth of in-flight records, keyed by full
/// packet number so lookups during ACK processing are O(log n) instead of
/// the linear scan a Vec would need.
#[derive(Default)]
pub struct SentPackets {
    records: BTreeMap<u64, SentPacketInfo>,
}

/// What happened while applying one ACK frame to a space.
#[derive(Debug, Default)]
pub struct AckOutcome {
    pub newly_acked: Vec<(PacketNumber, SentPacketInfo)>,
    pub any_ack_eliciting_newly_acked: bool,
}

impl SentPackets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_packet_sent(&mut self, pn: PacketNumber, info: SentPacketInfo) {
        self.records.insert(pn.as_u64(), info);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, pn: PacketNumber) -> Option<&SentPacketInfo> {
        self.records.get(&pn.as_u64())
    }

    /// Validates and applies a decoded ACK range list against this space's
    /// sent records (§4.6 item 1-2). `next_pn` is the packet number this
    /// space will use for its *next* send, used to reject an ack of a
    /// packet number we have not sent yet.
    pub fn on_ack_ranges(
        &mut self,
        space: crate::packet::number::PacketNumberSpace,
        ranges: &[(u64, u64)],
        next_pn: u64,
        congestion_controller: &mut dyn CongestionController,
        rtt_sample_cb: &mut dyn FnMut(Duration),
        now: Duration,
    ) -> Result<AckOutcome, TransportError> {
        let mut outcome = AckOutcome::default();
        let mut prev_smallest: Option<u64> = None;

        for &(smallest, largest) in ranges {
            if smallest > largest {
                return Err(TransportError::FRAME_ENCODING_ERROR);
            }
            if largest >= next_pn {
                return Err(TransportError::PROTOCOL_VIOLATION);
            }
            if let Some(prev) = prev_smallest {
                // Ranges must be strictly descending and disjoint.
                if largest >= prev {
                    return Err(TransportError::FRAME_ENCODING_ERROR);
                }
            }
            prev_smallest = Some(smallest);

            for value in smallest..=largest {
                if let Some(info) = self.records.remove(&value) {
                    if info.ack_elicitation.is_eliciting() {
                        outcome.any_ack_eliciting_newly_acked = true;
                    }
                    if info.congestion_controlled {
                        congestion_controller.on_packet_acked(info.sent_bytes, Duration::ZERO);
                    }
                    let elapsed = now.saturating_sub(info.time_sent);
                    rtt_sample_cb(elapsed);
                    outcome.newly_acked.push((PacketNumber::new(space, value), info));
                }
            }
        }

        Ok(outcome)
    }

    /// Packets sent before `now - loss_delay` and below `largest_acked`
    /// that were never acknowledged are declared lost (simplified RFC 9002
    /// §6.1 time-threshold rule; packet-threshold is left to the caller).
    pub fn detect_losses(
        &mut self,
        largest_acked: u64,
        loss_delay: Duration,
        now: Duration,
        congestion_controller: &mut dyn CongestionController,
    ) -> Vec<(u64, SentPacketInfo)> {
        let mut lost = Vec::new();
        let threshold = now.saturating_sub(loss_delay);
        let lost_keys: Vec<u64> = self
            .records
            .range(..=largest_acked)
            .filter(|(_, info)| info.time_sent <= threshold)
            .map(|(&pn, _)| pn)
            .collect();

        for pn in lost_keys {
            if let Some(info) = self.records.remove(&pn) {
                if info.congestion_controlled {
                    congestion_controller.on_packet_lost(info.sent_bytes, false);
                }
                lost.push((pn, info));
            }
        }
        lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::number::PacketNumberSpace;

    struct NoopCc {
        acked: u32,
        lost: u32,
    }
    impl CongestionController for NoopCc {
        fn on_packet_sent(&mut self, _: u32, _: bool) {}
        fn on_packet_acked(&mut self, bytes: u32, _: Duration) {
            self.acked += bytes;
        }
        fn on_packet_lost(&mut self, bytes: u32, _: bool) {
            self.lost += bytes;
        }
        fn congestion_window(&self) -> u32 {
            u32::MAX
        }
        fn bytes_in_flight(&self) -> u32 {
            0
        }
    }

    fn info(t: u64) -> SentPacketInfo {
        SentPacketInfo {
            time_sent: Duration::from_millis(t),
            sent_bytes: 100,
            ack_elicitation: AckElicitation::Eliciting,
            congestion_controlled: true,
            items: Vec::new(),
        }
    }

    #[test]
    fn ack_range_out_of_order_is_rejected() {
        let mut sp = SentPackets::new();
        let mut cc = NoopCc { acked: 0, lost: 0 };
        let mut cb = |_: Duration| {};
        let err = sp
            .on_ack_ranges(PacketNumberSpace::Application, &[(0, 5), (3, 8)], 100, &mut cc, &mut cb, Duration::ZERO)
            .unwrap_err();
        assert_eq!(err, TransportError::FRAME_ENCODING_ERROR);
    }

    #[test]
    fn ack_of_unsent_packet_is_protocol_violation() {
        let mut sp = SentPackets::new();
        let mut cc = NoopCc { acked: 0, lost: 0 };
        let mut cb = |_: Duration| {};
        let err = sp
            .on_ack_ranges(PacketNumberSpace::Application, &[(5, 5)], 5, &mut cc, &mut cb, Duration::ZERO)
            .unwrap_err();
        assert_eq!(err, TransportError::PROTOCOL_VIOLATION);
    }

    #[test]
    fn acking_a_sent_packet_removes_it_and_credits_congestion_controller() {
        let mut sp = SentPackets::new();
        sp.on_packet_sent(PacketNumber::new(PacketNumberSpace::Application, 1), info(0));
        let mut cc = NoopCc { acked: 0, lost: 0 };
        let mut cb = |_: Duration| {};
        let outcome = sp
            .on_ack_ranges(PacketNumberSpace::Application, &[(1, 1)], 2, &mut cc, &mut cb, Duration::from_millis(10))
            .unwrap();
        assert_eq!(outcome.newly_acked.len(), 1);
        assert!(outcome.any_ack_eliciting_newly_acked);
        assert_eq!(cc.acked, 100);
        assert!(sp.is_empty());
    }

    #[test]
    fn old_unacked_packets_below_largest_acked_are_declared_lost() {
        let mut sp = SentPackets::new();
        sp.on_packet_sent(PacketNumber::new(PacketNumberSpace::Application, 1), info(0));
        sp.on_packet_sent(PacketNumber::new(PacketNumberSpace::Application, 2), info(100));
        let mut cc = NoopCc { acked: 0, lost: 0 };
        let lost = sp.detect_losses(2, Duration::from_millis(50), Duration::from_millis(100), &mut cc);
        assert_eq!(lost.len(), 1);
        assert_eq!(lost[0].0, 1);
        assert_eq!(cc.lost, 100);
    }
}
