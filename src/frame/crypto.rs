// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! The CRYPTO frame, carrying TLS handshake bytes at a single encryption
//! level (§4.4, §6.1).

use crate::{
    codec::{DecoderBuffer, DecoderError, DecoderResult, EncoderBuffer, EncoderValue},
    varint::VarInt,
};

#[derive(Clone, Debug)]
pub struct Crypto<'a> {
    pub offset: VarInt,
    pub data: &'a [u8],
}

impl<'a> Crypto<'a> {
    pub fn decode(buffer: DecoderBuffer<'a>) -> DecoderResult<'a, Self> {
        let (offset, buffer) = buffer.decode::<VarInt>()?;
        let (len, buffer) = buffer.decode::<VarInt>()?;
        let len: usize = len.try_into().map_err(|_| DecoderError::InvalidValue)?;
        let (slice, buffer) = buffer.decode_slice(len)?;

        if offset.as_u64().checked_add(len as u64).filter(|&v| v <= crate::varint::MAX_VARINT_VALUE).is_none() {
            return Err(DecoderError::InvalidValue);
        }

        Ok((
            Self {
                offset,
                data: slice.as_slice(),
            },
            buffer,
        ))
    }

    pub fn end_offset(&self) -> u64 {
        self.offset.as_u64() + self.data.len() as u64
    }
}

impl EncoderValue for Crypto<'_> {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&VarInt::from_u8(super::ty::CRYPTO as u8));
        encoder.encode(&self.offset);
        encoder.encode(&VarInt::try_from(self.data.len()).expect("crypto frame too large"));
        encoder.write_slice(self.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EncoderBuffer;

    #[test]
    fn round_trips() {
        let original = Crypto {
            offset: VarInt::from_u16(10),
            data: b"client hello",
        };
        let mut encoder = EncoderBuffer::new();
        encoder.encode(&original);
        let (decoded, rest) = super::super::decode(DecoderBuffer::new(encoder.as_slice())).unwrap();
        assert!(rest.is_empty());
        let crate::frame::Frame::Crypto(decoded) = decoded else { panic!() };
        assert_eq!(decoded.offset, original.offset);
        assert_eq!(decoded.data, original.data);
    }
}
