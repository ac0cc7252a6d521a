// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! Idle timeout tracking (§4.8 "Idle timeout").

use core::time::Duration;

pub struct IdleTimer {
    local_max_idle_timeout: Duration,
    peer_max_idle_timeout: Option<Duration>,
    last_activity: Duration,
    sent_ack_eliciting_since_receipt: bool,
}

impl IdleTimer {
    pub fn new(local_max_idle_timeout: Duration, now: Duration) -> Self {
        Self {
            local_max_idle_timeout,
            peer_max_idle_timeout: None,
            last_activity: now,
            sent_ack_eliciting_since_receipt: false,
        }
    }

    pub fn on_peer_max_idle_timeout(&mut self, timeout: Duration) {
        self.peer_max_idle_timeout = Some(timeout);
    }

    /// Effective timeout is the min of both sides', treating 0 (disabled)
    /// as "no limit" (§4.8). Also floored at `3*PTO` so a short advertised
    /// timeout can't fire before probe loss could be detected.
    pub fn effective_timeout(&self, pto: Duration) -> Option<Duration> {
        let candidates = [self.local_max_idle_timeout, self.peer_max_idle_timeout.unwrap_or(Duration::ZERO)]
            .into_iter()
            .filter(|d| !d.is_zero());

        candidates.min().map(|timeout| timeout.max(pto * 3))
    }

    pub fn on_packet_received(&mut self, now: Duration) {
        self.last_activity = now;
        self.sent_ack_eliciting_since_receipt = false;
    }

    pub fn on_ack_eliciting_packet_sent(&mut self, now: Duration) {
        if !self.sent_ack_eliciting_since_receipt {
            self.sent_ack_eliciting_since_receipt = true;
            self.last_activity = now;
        }
    }

    pub fn is_expired(&self, now: Duration, pto: Duration) -> bool {
        match self.effective_timeout(pto) {
            Some(timeout) => now.saturating_sub(self.last_activity) >= timeout,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_timeout_is_the_minimum_of_both_sides() {
        let mut t = IdleTimer::new(Duration::from_secs(30), Duration::ZERO);
        t.on_peer_max_idle_timeout(Duration::from_secs(10));
        assert_eq!(t.effective_timeout(Duration::from_millis(1)), Some(Duration::from_secs(10)));
    }

    #[test]
    fn zero_on_either_side_disables_that_side() {
        let mut t = IdleTimer::new(Duration::from_secs(30), Duration::ZERO);
        t.on_peer_max_idle_timeout(Duration::ZERO);
        assert_eq!(t.effective_timeout(Duration::from_millis(1)), Some(Duration::from_secs(30)));
    }

    #[test]
    fn expires_after_effective_timeout_elapses() {
        let mut t = IdleTimer::new(Duration::from_secs(10), Duration::ZERO);
        t.on_peer_max_idle_timeout(Duration::from_secs(10));
        assert!(!t.is_expired(Duration::from_secs(5), Duration::from_millis(1)));
        assert!(t.is_expired(Duration::from_secs(11), Duration::from_millis(1)));
    }

    #[test]
    fn receiving_a_packet_resets_the_timer() {
        let mut t = IdleTimer::new(Duration::from_secs(10), Duration::ZERO);
        t.on_packet_received(Duration::from_secs(9));
        assert!(!t.is_expired(Duration::from_secs(15), Duration::from_millis(1)));
    }
}
