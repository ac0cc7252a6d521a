// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! Connection- and stream-scoped flow control windows (§3 "Flow control",
//! §4.5, §4.9 "initial_max_data" family).

use crate::error::TransportError;

/// One side of a credit-based flow control window: a monotonically
/// increasing limit and a monotonically increasing amount consumed.
/// Used both for the connection-wide data window and for each stream's
/// window, mirroring how the teacher keeps a single limit type reused
/// across connection and stream scope.
#[derive(Clone, Copy, Debug, Default)]
pub struct Window {
    consumed: u64,
    limit: u64,
}

impl Window {
    pub fn new(initial_limit: u64) -> Self {
        Self {
            consumed: 0,
            limit: initial_limit,
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn available(&self) -> u64 {
        self.limit.saturating_sub(self.consumed)
    }

    /// Raises the limit; a MAX_DATA/MAX_STREAM_DATA that doesn't increase
    /// the limit is ignored rather than rejected (§4.9).
    pub fn set_limit(&mut self, new_limit: u64) {
        self.limit = self.limit.max(new_limit);
    }

    /// Accounts for newly received or sent bytes, rejecting the frame if
    /// it would push consumption past the advertised limit
    /// (§6.4 FLOW_CONTROL_ERROR).
    pub fn consume_to(&mut self, end_offset: u64) -> Result<(), TransportError> {
        if end_offset > self.limit {
            return Err(TransportError::FLOW_CONTROL_ERROR);
        }
        self.consumed = self.consumed.max(end_offset);
        Ok(())
    }

    /// True once less than half the window remains, the point at which
    /// the teacher's connection limits module schedules a MAX_DATA update
    /// so the peer never actually blocks on window exhaustion.
    pub fn should_send_update(&self) -> bool {
        self.limit.saturating_sub(self.consumed) < self.limit / 2
    }
}

/// Tracks both directions of connection-scoped data flow control.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConnectionFlowController {
    pub send: Window,
    pub recv: Window,
}

impl ConnectionFlowController {
    pub fn new(initial_max_data_sent_by_peer: u64, initial_max_data_advertised_locally: u64) -> Self {
        Self {
            send: Window::new(initial_max_data_sent_by_peer),
            recv: Window::new(initial_max_data_advertised_locally),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consuming_past_limit_is_flow_control_error() {
        let mut w = Window::new(10);
        w.consume_to(10).unwrap();
        let err = w.consume_to(11).unwrap_err();
        assert_eq!(err, TransportError::FLOW_CONTROL_ERROR);
    }

    #[test]
    fn limit_only_ever_increases() {
        let mut w = Window::new(10);
        w.set_limit(5);
        assert_eq!(w.limit(), 10);
        w.set_limit(20);
        assert_eq!(w.limit(), 20);
    }

    #[test]
    fn update_threshold_fires_past_halfway() {
        let mut w = Window::new(100);
        assert!(!w.should_send_update());
        w.consume_to(60).unwrap();
        assert!(w.should_send_update());
    }
}
