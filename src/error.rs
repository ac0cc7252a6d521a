// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! The transport error taxonomy (§6.4, §7).
//!
//! Every connection-level failure is represented as a [`TransportError`]:
//! a 62-bit error code, an optional frame type that triggered it, and a
//! static reason string for diagnostics. The same type backs both
//! locally-detected errors (about to be sent in a `CONNECTION_CLOSE`) and
//! errors decoded from a peer's `CONNECTION_CLOSE`.

use crate::varint::VarInt;
use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TransportError {
    pub code: VarInt,
    pub frame_type: Option<VarInt>,
    pub reason: &'static str,
}

impl TransportError {
    pub const fn new(code: VarInt, reason: &'static str) -> Self {
        Self {
            code,
            reason,
            frame_type: None,
        }
    }

    #[must_use]
    pub const fn with_frame_type(mut self, frame_type: VarInt) -> Self {
        self.frame_type = Some(frame_type);
        self
    }

    #[must_use]
    pub const fn with_reason(mut self, reason: &'static str) -> Self {
        self.reason = reason;
        self
    }

    /// Builds a `CRYPTO_ERROR(alert)` code from a TLS alert (§4.4, §6.4).
    pub fn crypto_error(alert: u8, reason: &'static str) -> Self {
        Self {
            code: VarInt::from_u16(0x100 | alert as u16),
            reason,
            frame_type: None,
        }
    }

    pub fn is_crypto_error(&self) -> bool {
        (0x100..0x200).contains(&self.code.as_u64())
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "transport error 0x{:x}", self.code.as_u64())
        } else {
            f.write_str(self.reason)
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TransportError {}

macro_rules! def_error {
    ($name:ident, $code:expr, $doc:expr) => {
        #[doc = $doc]
        pub const $name: TransportError = TransportError::new(VarInt::from_u32($code), $doc);
    };
}

impl TransportError {
    def_error!(
        NO_ERROR,
        0x0,
        "the connection is being closed abruptly in the absence of any error"
    );
    def_error!(
        INTERNAL_ERROR,
        0x1,
        "the endpoint encountered an internal error and cannot continue"
    );
    def_error!(
        CONNECTION_REFUSED,
        0x2,
        "the server refused to accept a new connection"
    );
    def_error!(
        FLOW_CONTROL_ERROR,
        0x3,
        "an endpoint received more data than permitted by its advertised limits"
    );
    def_error!(
        STREAM_LIMIT_ERROR,
        0x4,
        "an endpoint received a frame for a stream exceeding its advertised stream limit"
    );
    def_error!(
        STREAM_STATE_ERROR,
        0x5,
        "an endpoint received a frame for a stream not in a state that permitted it"
    );
    def_error!(
        FINAL_SIZE_ERROR,
        0x6,
        "an endpoint received stream data inconsistent with an established final size"
    );
    def_error!(
        FRAME_ENCODING_ERROR,
        0x7,
        "an endpoint received a badly formatted frame"
    );
    def_error!(
        TRANSPORT_PARAMETER_ERROR,
        0x8,
        "an endpoint received malformed or invalid transport parameters"
    );
    def_error!(
        CONNECTION_ID_LIMIT_ERROR,
        0x9,
        "an endpoint received more connection IDs than its advertised limit allows"
    );
    def_error!(
        PROTOCOL_VIOLATION,
        0xa,
        "an endpoint detected a protocol compliance error not covered by a more specific code"
    );
    def_error!(
        INVALID_TOKEN,
        0xb,
        "a server received a client Initial token that could not be validated"
    );
    def_error!(
        APPLICATION_ERROR,
        0xc,
        "the application has closed the connection"
    );
    def_error!(
        CRYPTO_BUFFER_EXCEEDED,
        0xd,
        "an endpoint received more CRYPTO frame data than it can buffer"
    );
    def_error!(
        KEY_UPDATE_ERROR,
        0xe,
        "an endpoint detected an error with key update"
    );
    def_error!(
        AEAD_LIMIT_REACHED,
        0xf,
        "the AEAD confidentiality or integrity use limit was reached"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crypto_error_lands_in_reserved_range() {
        let err = TransportError::crypto_error(0x28, "handshake_failure");
        assert!(err.is_crypto_error());
        assert_eq!(err.code.as_u64(), 0x128);
    }

    #[test]
    fn generic_codes_are_always_available() {
        assert_eq!(TransportError::PROTOCOL_VIOLATION.code.as_u64(), 0xa);
        assert_eq!(TransportError::INTERNAL_ERROR.code.as_u64(), 0x1);
    }
}
