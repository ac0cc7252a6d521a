// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! Stateless reset token generation and the "is this a stateless reset"
//! matching surface (§4.8 "Stateless reset", "Token generation").

use crate::connection::id::{LocalId, StatelessResetToken};

/// A per-cluster secret used to derive stateless-reset tokens for every CID
/// this endpoint (or any of its peers sharing the secret) issues. §5
/// "Shared resource policy": this key is shared across an entire cluster
/// and MUST NOT be rotated without coordinated connection draining.
pub trait TokenSecret {
    /// Derives the 16-byte token for `cid` (§4.8: "truncate_16(HMAC(
    /// static_key, cid))" or an HKDF-Expand equivalent).
    fn derive_token(&self, cid: &LocalId) -> StatelessResetToken;
}

/// A minimum datagram length below which an incoming packet could not
/// possibly encode a valid stateless-reset (2 fixed bits + >=38 unpredictable
/// bits + a 16-byte token, §4.8).
pub const MIN_STATELESS_RESET_DATAGRAM_LEN: usize = 1 + 16;

/// Builds the UDP datagram body for a stateless reset: a short-header-like
/// first byte, `unpredictable.len()` bytes of random padding, then the
/// 16-byte token (§4.8 "Format"). The caller supplies the random padding
/// and must size the whole reply `< 3x` and `<` the triggering datagram's
/// length when that length is `<= 43` bytes, to bound reflection loops.
pub fn build(unpredictable: &[u8], token: &StatelessResetToken, triggering_datagram_len: usize) -> alloc::vec::Vec<u8> {
    let mut out = alloc::vec::Vec::with_capacity(1 + unpredictable.len() + StatelessResetToken::LEN);
    // Two fixed bits (01), remaining bits unpredictable, so the datagram
    // is indistinguishable from a short-header packet to an observer.
    let mut first_byte = unpredictable.first().copied().unwrap_or(0);
    first_byte = (first_byte & 0b0011_1111) | 0b0100_0000;
    out.push(first_byte);
    out.extend_from_slice(unpredictable.get(1..).unwrap_or(&[]));
    out.extend_from_slice(token.as_bytes());

    cap_reply_length(out, triggering_datagram_len)
}

fn cap_reply_length(mut reply: alloc::vec::Vec<u8>, triggering_len: usize) -> alloc::vec::Vec<u8> {
    let max_len = if triggering_len <= 43 {
        (triggering_len.saturating_sub(1)).min(triggering_len * 3)
    } else {
        triggering_len * 3 - 1
    };
    if reply.len() > max_len.max(MIN_STATELESS_RESET_DATAGRAM_LEN.min(max_len.max(1))) {
        reply.truncate(max_len.max(1));
    }
    reply
}

/// Scans the tail of an unparseable, undecryptable datagram against the set
/// of tokens this endpoint still considers valid for its active CIDs, per
/// §4.8: "An endpoint receiving any UDP datagram whose last 16 bytes match a
/// stored stateless-reset token ... transitions to Draining".
pub fn matches_any<'a>(datagram: &[u8], tokens: impl Iterator<Item = &'a StatelessResetToken>) -> bool {
    if datagram.len() < StatelessResetToken::LEN {
        return false;
    }
    let tail = &datagram[datagram.len() - StatelessResetToken::LEN..];
    tokens.into_iter().any(|token| token.matches(tail))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSecret(StatelessResetToken);
    impl TokenSecret for FixedSecret {
        fn derive_token(&self, _cid: &LocalId) -> StatelessResetToken {
            self.0
        }
    }

    #[test]
    fn derive_token_is_stable_for_a_given_cid() {
        let secret = FixedSecret(StatelessResetToken::new([7; 16]));
        let cid = LocalId::try_from_bytes(&[1, 2, 3, 4]).unwrap();
        assert_eq!(secret.derive_token(&cid).as_bytes(), &[7; 16]);
    }

    #[test]
    fn matches_any_finds_a_token_in_the_tail() {
        let token = StatelessResetToken::new([9; 16]);
        let mut datagram = alloc::vec![0u8; 30];
        datagram.extend_from_slice(token.as_bytes());
        assert!(matches_any(&datagram, core::iter::once(&token)));
    }

    #[test]
    fn short_datagrams_never_match() {
        let token = StatelessResetToken::new([9; 16]);
        let datagram = alloc::vec![0u8; 4];
        assert!(!matches_any(&datagram, core::iter::once(&token)));
    }

    #[test]
    fn reply_is_capped_below_triggering_length_for_small_packets() {
        let token = StatelessResetToken::new([1; 16]);
        let reply = build(&[0u8; 64], &token, 40);
        assert!(reply.len() < 40);
    }
}
