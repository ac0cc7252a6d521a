// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! CONNECTION_CLOSE, transport (0x1c) and application (0x1d) variants
//! (§4.8, §6.1, §7).

use crate::{
    codec::{DecoderBuffer, DecoderError, DecoderResult, EncoderBuffer, EncoderValue},
    varint::VarInt,
};

#[derive(Clone, Debug)]
pub struct ConnectionClose<'a> {
    pub is_application: bool,
    pub error_code: VarInt,
    /// Only meaningful for the transport variant; the application variant
    /// carries no frame type on the wire (§6.1).
    pub frame_type: Option<VarInt>,
    pub reason_phrase: &'a [u8],
}

impl<'a> ConnectionClose<'a> {
    pub fn frame_type(&self) -> u64 {
        if self.is_application {
            super::ty::CONNECTION_CLOSE_APPLICATION
        } else {
            super::ty::CONNECTION_CLOSE_TRANSPORT
        }
    }

    pub fn decode(is_application: bool, buffer: DecoderBuffer<'a>) -> DecoderResult<'a, Self> {
        let (error_code, buffer) = buffer.decode::<VarInt>()?;
        let (frame_type, buffer) = if is_application {
            (None, buffer)
        } else {
            let (ft, buffer) = buffer.decode::<VarInt>()?;
            (Some(ft), buffer)
        };
        let (len, buffer) = buffer.decode::<VarInt>()?;
        let len: usize = len.try_into().map_err(|_| DecoderError::InvalidValue)?;
        let (slice, buffer) = buffer.decode_slice(len)?;

        core::str::from_utf8(slice.as_slice()).map_err(|_| DecoderError::InvalidValue)?;

        Ok((
            Self {
                is_application,
                error_code,
                frame_type,
                reason_phrase: slice.as_slice(),
            },
            buffer,
        ))
    }

    /// Converts an application-scoped close into the transport-scoped form
    /// required when closing during the handshake, per §4.8: "A
    /// CONNECTION_CLOSE(0x1d) MUST NOT appear in Initial or Handshake
    /// packets ... must be converted to CONNECTION_CLOSE(0x1c) with error
    /// APPLICATION_ERROR and an empty reason phrase."
    pub fn downgrade_for_handshake(&self) -> ConnectionClose<'static> {
        ConnectionClose {
            is_application: false,
            error_code: crate::error::TransportError::APPLICATION_ERROR.code,
            frame_type: None,
            reason_phrase: &[],
        }
    }
}

impl EncoderValue for ConnectionClose<'_> {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&VarInt::from_u8(self.frame_type() as u8));
        encoder.encode(&self.error_code);
        if !self.is_application {
            encoder.encode(&self.frame_type.unwrap_or(VarInt::ZERO));
        }
        encoder.encode(&VarInt::try_from(self.reason_phrase.len()).expect("reason phrase too long"));
        encoder.write_slice(self.reason_phrase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EncoderBuffer;

    #[test]
    fn transport_close_round_trips_with_frame_type() {
        let original = ConnectionClose {
            is_application: false,
            error_code: crate::error::TransportError::FLOW_CONTROL_ERROR.code,
            frame_type: Some(VarInt::from_u8(0x11)),
            reason_phrase: b"too much data",
        };
        let mut encoder = EncoderBuffer::new();
        encoder.encode(&original);
        let (decoded, _) = ConnectionClose::decode(false, DecoderBuffer::new(encoder.as_slice())).unwrap();
        assert_eq!(decoded.error_code, original.error_code);
        assert_eq!(decoded.frame_type, original.frame_type);
        assert_eq!(decoded.reason_phrase, original.reason_phrase);
    }

    #[test]
    fn application_close_carries_no_frame_type() {
        let original = ConnectionClose {
            is_application: true,
            error_code: VarInt::from_u8(42),
            frame_type: None,
            reason_phrase: b"bye",
        };
        let mut encoder = EncoderBuffer::new();
        encoder.encode(&original);
        let (decoded, _) = ConnectionClose::decode(true, DecoderBuffer::new(encoder.as_slice())).unwrap();
        assert!(decoded.frame_type.is_none());
    }

    #[test]
    fn downgrade_empties_reason_and_uses_application_error() {
        let app_close = ConnectionClose {
            is_application: true,
            error_code: VarInt::from_u8(9),
            frame_type: None,
            reason_phrase: b"leaking application state",
        };
        let downgraded = app_close.downgrade_for_handshake();
        assert!(!downgraded.is_application);
        assert_eq!(downgraded.error_code, crate::error::TransportError::APPLICATION_ERROR.code);
        assert!(downgraded.reason_phrase.is_empty());
    }

    #[test]
    fn rejects_non_utf8_reason_phrase() {
        let bytes_with_invalid_utf8_reason: &[u8] = &[
            0x1c, // type
            0x00, // error_code
            0x00, // frame_type
            0x01, // reason len = 1
            0xff, // invalid utf8
        ];
        let err = ConnectionClose::decode(false, DecoderBuffer::new(&bytes_with_invalid_utf8_reason[1..])).unwrap_err();
        assert_eq!(err, DecoderError::InvalidValue);
    }
}
