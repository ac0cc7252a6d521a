// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! The Closing/Draining state machine (§4.8).

use super::error::Error;
use core::time::Duration;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CloseState {
    Open,
    /// Retains only enough state to identify and respond to late packets
    /// with a repeated CONNECTION_CLOSE (§4.8 "Immediate close").
    Closing,
    /// No further packets sent; late datagrams are discarded
    /// (§4.8 "Draining").
    Draining,
    /// `3*PTO` has elapsed since entering Closing/Draining; all state may
    /// be discarded (§4.8 "Duration").
    Discarded,
}

pub struct CloseManager {
    state: CloseState,
    error: Option<Error>,
    entered_at: Option<Duration>,
    /// §4.8: "SHOULD rate-limit these responses" — a simple packet-count
    /// threshold between CONNECTION_CLOSE retransmissions while Closing.
    responses_sent: u32,
}

impl CloseManager {
    pub fn new() -> Self {
        Self {
            state: CloseState::Open,
            error: None,
            entered_at: None,
            responses_sent: 0,
        }
    }

    pub fn state(&self) -> CloseState {
        self.state
    }

    pub fn error(&self) -> Option<Error> {
        self.error
    }

    /// We are the one sending CONNECTION_CLOSE (§4.8 "Immediate close").
    pub fn on_local_close(&mut self, error: Error, now: Duration) {
        if matches!(self.state, CloseState::Open) {
            self.state = CloseState::Closing;
            self.error = Some(error);
            self.entered_at = Some(now);
        }
    }

    /// The peer's CONNECTION_CLOSE arrived (§4.8 "Draining",
    /// "Closing->Draining").
    pub fn on_peer_close(&mut self, error: Error, now: Duration) {
        match self.state {
            CloseState::Open => {
                self.state = CloseState::Draining;
                self.error = Some(error);
                self.entered_at = Some(now);
            }
            CloseState::Closing => {
                // Keep the original end-time (§4.8 "retain the same end-time").
                self.state = CloseState::Draining;
            }
            CloseState::Draining | CloseState::Discarded => {}
        }
    }

    pub fn on_stateless_reset(&mut self, now: Duration) {
        if matches!(self.state, CloseState::Open | CloseState::Closing) {
            self.state = CloseState::Draining;
            self.error = Some(Error::StatelessReset);
            self.entered_at = Some(now);
        }
    }

    pub fn on_idle_timeout(&mut self, now: Duration) {
        if matches!(self.state, CloseState::Open) {
            self.state = CloseState::Discarded;
            self.error = Some(Error::IdleTimerExpired);
            self.entered_at = Some(now);
        }
    }

    /// Should a retransmitted CONNECTION_CLOSE be sent in response to an
    /// incoming packet while Closing (§4.8 rate limiting)?
    pub fn should_respond_while_closing(&mut self, max_responses: u32) -> bool {
        if !matches!(self.state, CloseState::Closing) {
            return false;
        }
        if self.responses_sent >= max_responses {
            return false;
        }
        self.responses_sent += 1;
        true
    }

    /// Advances Closing/Draining to Discarded once `3*PTO` has elapsed
    /// (§4.8 "Duration").
    pub fn on_timer(&mut self, now: Duration, pto: Duration) {
        if let (CloseState::Closing | CloseState::Draining, Some(entered_at)) = (self.state, self.entered_at) {
            if now.saturating_sub(entered_at) >= pto * 3 {
                self.state = CloseState::Discarded;
            }
        }
    }
}

impl Default for CloseManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connection::error::Initiator, error::TransportError};

    fn err() -> Error {
        Error::Transport { error: TransportError::NO_ERROR, initiator: Initiator::Local }
    }

    #[test]
    fn local_close_enters_closing() {
        let mut m = CloseManager::new();
        m.on_local_close(err(), Duration::ZERO);
        assert_eq!(m.state(), CloseState::Closing);
    }

    #[test]
    fn peer_close_while_closing_moves_to_draining_and_keeps_end_time() {
        let mut m = CloseManager::new();
        m.on_local_close(err(), Duration::from_secs(1));
        m.on_peer_close(err(), Duration::from_secs(5));
        assert_eq!(m.state(), CloseState::Draining);
        m.on_timer(Duration::from_secs(1) + Duration::from_millis(300) * 3, Duration::from_millis(100));
        assert_eq!(m.state(), CloseState::Discarded);
    }

    #[test]
    fn rate_limit_caps_responses_while_closing() {
        let mut m = CloseManager::new();
        m.on_local_close(err(), Duration::ZERO);
        assert!(m.should_respond_while_closing(2));
        assert!(m.should_respond_while_closing(2));
        assert!(!m.should_respond_while_closing(2));
    }

    #[test]
    fn discards_after_three_pto_in_closing() {
        let mut m = CloseManager::new();
        m.on_local_close(err(), Duration::ZERO);
        m.on_timer(Duration::from_millis(299), Duration::from_millis(100));
        assert_eq!(m.state(), CloseState::Closing);
        m.on_timer(Duration::from_millis(300), Duration::from_millis(100));
        assert_eq!(m.state(), CloseState::Discarded);
    }
}
