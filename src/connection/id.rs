// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! Connection IDs (§3 "Connection ID (CID)").
//!
//! A connection ID is an opaque byte string of 0-20 bytes chosen by the
//! endpoint that will *receive* packets bearing it. Endpoints exchange
//! disjoint ID spaces: the `LocalId` type below is what *we* issue for our
//! peer to address us with, and `PeerId` is what our peer issued for us to
//! address them with. They share a representation but are kept distinct
//! types so a routing bug (using the wrong set as a destination) is caught
//! at compile time.

use crate::codec::{DecoderBuffer, DecoderError, DecoderResult, DecoderValue, EncoderBuffer, EncoderValue};
use core::{convert::TryFrom, fmt, time::Duration};

pub const MAX_LEN: usize = 20;

/// The minimum length a client must choose for its first destination CID
/// (§4.4 "Connection IDs at handshake").
pub const MIN_INITIAL_LEN: usize = 8;

/// The minimum lifetime a connection ID should remain active once issued
/// before its issuer requests retirement (not mandated by the wire format,
/// but load-bearing for §4.7's `Retire Prior To` churn to stay bounded).
pub const MIN_LIFETIME: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConnectionIdError;

impl fmt::Display for ConnectionIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection ID exceeds the maximum length of {MAX_LEN} bytes")
    }
}

macro_rules! define_id {
    ($name:ident) => {
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name {
            bytes: [u8; MAX_LEN],
            len: u8,
        }

        impl $name {
            #[inline]
            pub fn try_from_bytes(bytes: &[u8]) -> Result<Self, ConnectionIdError> {
                if bytes.len() > MAX_LEN {
                    return Err(ConnectionIdError);
                }
                let mut buf = [0u8; MAX_LEN];
                buf[..bytes.len()].copy_from_slice(bytes);
                Ok(Self {
                    bytes: buf,
                    len: bytes.len() as u8,
                })
            }

            #[inline]
            pub fn as_bytes(&self) -> &[u8] {
                &self.bytes[..self.len as usize]
            }

            #[inline]
            pub fn len(&self) -> usize {
                self.len as usize
            }

            #[inline]
            pub fn is_empty(&self) -> bool {
                self.len == 0
            }

            #[cfg(any(test, feature = "testing"))]
            pub fn test_id(tag: u8) -> Self {
                Self::try_from_bytes(&[tag; 8]).unwrap()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:02x?})", stringify!($name), self.as_bytes())
            }
        }

        impl<'a> DecoderValue<'a> for $name {
            fn decode(buffer: DecoderBuffer<'a>) -> DecoderResult<'a, Self> {
                let (len, buffer) = buffer.decode_u8()?;
                if len as usize > MAX_LEN {
                    return Err(DecoderError::InvalidValue);
                }
                let (slice, buffer) = buffer.decode_slice(len as usize)?;
                let id = Self::try_from_bytes(slice.as_slice()).map_err(|_| DecoderError::InvalidValue)?;
                Ok((id, buffer))
            }
        }

        impl EncoderValue for $name {
            fn encode(&self, encoder: &mut EncoderBuffer) {
                encoder.write_u8(self.len);
                encoder.write_slice(self.as_bytes());
            }

            fn encoding_size(&self) -> usize {
                1 + self.len as usize
            }
        }
    };
}

define_id!(LocalId);
define_id!(PeerId);

/// A CID as it appears embedded inline in a long header, with no separate
/// length prefix byte read by the caller (the length is read up front; see
/// [`crate::packet::long`]).
impl LocalId {
    pub fn decode_with_len<'a>(
        buffer: DecoderBuffer<'a>,
        len: usize,
    ) -> DecoderResult<'a, Self> {
        let (slice, buffer) = buffer.decode_slice(len)?;
        let id = Self::try_from_bytes(slice.as_slice()).map_err(|_| DecoderError::InvalidValue)?;
        Ok((id, buffer))
    }
}

impl PeerId {
    pub fn decode_with_len<'a>(
        buffer: DecoderBuffer<'a>,
        len: usize,
    ) -> DecoderResult<'a, Self> {
        let (slice, buffer) = buffer.decode_slice(len)?;
        let id = Self::try_from_bytes(slice.as_slice()).map_err(|_| DecoderError::InvalidValue)?;
        Ok((id, buffer))
    }
}

/// A 128-bit stateless reset token, bound 1:1 to the connection ID it was
/// issued alongside (§3, §4.8).
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct StatelessResetToken([u8; 16]);

impl StatelessResetToken {
    pub const LEN: usize = 16;

    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Constant-time equality, required because tokens are compared against
    /// unauthenticated datagram suffixes (§4.8 "comparison MUST be
    /// constant-time").
    pub fn matches(&self, candidate: &[u8]) -> bool {
        use subtle::ConstantTimeEq;
        candidate.len() == 16 && self.0.ct_eq(candidate).into()
    }
}

impl fmt::Debug for StatelessResetToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatelessResetToken(..)")
    }
}

impl<'a> DecoderValue<'a> for StatelessResetToken {
    fn decode(buffer: DecoderBuffer<'a>) -> DecoderResult<'a, Self> {
        let (slice, buffer) = buffer.decode_slice(16)?;
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(slice.as_slice());
        Ok((Self(bytes), buffer))
    }
}

impl EncoderValue for StatelessResetToken {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.write_slice(&self.0);
    }

    fn encoding_size(&self) -> usize {
        16
    }
}

/// A connection ID issued by us, paired with its sequence number and reset
/// token (§3, §4.7). Sequence 0 has no reset token on the wire (carried
/// implicitly via the transport parameter instead), so it is optional here.
#[derive(Clone, Debug)]
pub struct IssuedId {
    pub sequence_number: crate::varint::VarInt,
    pub id: LocalId,
    pub stateless_reset_token: Option<StatelessResetToken>,
    pub retired: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_codec() {
        let id = LocalId::try_from_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let mut encoder = EncoderBuffer::new();
        encoder.encode(&id);
        let (decoded, rest) = DecoderBuffer::new(encoder.as_slice()).decode::<LocalId>().unwrap();
        assert_eq!(decoded, id);
        assert!(rest.is_empty());
    }

    #[test]
    fn rejects_overlong_ids() {
        let bytes = [0u8; MAX_LEN + 1];
        assert!(LocalId::try_from_bytes(&bytes).is_err());
    }

    #[test]
    fn reset_token_matches_is_constant_time_and_correct() {
        let token = StatelessResetToken::new([0x42; 16]);
        assert!(token.matches(&[0x42; 16]));
        assert!(!token.matches(&[0x41; 16]));
        assert!(!token.matches(&[0x42; 15]));
    }
}
