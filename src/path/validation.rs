// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! PATH_CHALLENGE / PATH_RESPONSE validation (§4.7 "Path validation").

use core::time::Duration;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationState {
    Unvalidated,
    Validating,
    Validated,
    Failed,
}

/// One outstanding challenge. Multiple may be in flight at once
/// (§4.7 "Multiple in-flight challenges allowed").
#[derive(Clone, Copy, Debug)]
pub struct Challenge {
    payload: [u8; 8],
    sent_at: Duration,
}

impl Challenge {
    pub fn new(payload: [u8; 8], sent_at: Duration) -> Self {
        Self { payload, sent_at }
    }

    pub fn payload(&self) -> [u8; 8] {
        self.payload
    }

    /// §4.7: fails after `max(3*PTO, 6*kInitialRtt)` with no response.
    pub fn has_expired(&self, now: Duration, pto: Duration, initial_rtt: Duration) -> bool {
        let timeout = (pto * 3).max(initial_rtt * 6);
        now.saturating_sub(self.sent_at) >= timeout
    }
}

/// Drives one path's validation lifecycle: may have several outstanding
/// challenges, resolves to `Validated` on any matching PATH_RESPONSE, to
/// `Failed` once every outstanding challenge has expired with no response.
#[derive(Debug, Default)]
pub struct Validator {
    state: Option<ValidationState>,
    outstanding: alloc::vec::Vec<Challenge>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            state: Some(ValidationState::Unvalidated),
            outstanding: alloc::vec::Vec::new(),
        }
    }

    pub fn state(&self) -> ValidationState {
        self.state.unwrap_or(ValidationState::Unvalidated)
    }

    pub fn start_challenge(&mut self, payload: [u8; 8], now: Duration) {
        self.state = Some(ValidationState::Validating);
        self.outstanding.push(Challenge::new(payload, now));
    }

    /// Resolves validation if `payload` matches any outstanding challenge
    /// (§4.7: "on any path" — the caller is responsible for applying this
    /// to the path the response actually arrived on, per RFC 9000 §8.2.3).
    pub fn on_path_response(&mut self, payload: [u8; 8]) -> bool {
        if self.outstanding.iter().any(|c| c.payload() == payload) {
            self.state = Some(ValidationState::Validated);
            self.outstanding.clear();
            true
        } else {
            false
        }
    }

    pub fn on_timer(&mut self, now: Duration, pto: Duration, initial_rtt: Duration) {
        if matches!(self.state, Some(ValidationState::Validated)) {
            return;
        }
        self.outstanding.retain(|c| !c.has_expired(now, pto, initial_rtt));
        if self.outstanding.is_empty() && matches!(self.state, Some(ValidationState::Validating)) {
            self.state = Some(ValidationState::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_response_validates() {
        let mut v = Validator::new();
        v.start_challenge([1; 8], Duration::ZERO);
        assert!(v.on_path_response([1; 8]));
        assert_eq!(v.state(), ValidationState::Validated);
    }

    #[test]
    fn mismatched_response_does_not_validate() {
        let mut v = Validator::new();
        v.start_challenge([1; 8], Duration::ZERO);
        assert!(!v.on_path_response([2; 8]));
        assert_eq!(v.state(), ValidationState::Validating);
    }

    #[test]
    fn expiry_without_response_fails() {
        let mut v = Validator::new();
        v.start_challenge([1; 8], Duration::ZERO);
        v.on_timer(Duration::from_secs(10), Duration::from_millis(100), Duration::from_millis(100));
        assert_eq!(v.state(), ValidationState::Failed);
    }
}
