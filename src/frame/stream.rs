// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! The STREAM frame family, types 0x08-0x0f: the low 3 bits of the type
//! encode FIN, LEN, and OFF (§4.5, §6.1).

use crate::{
    codec::{DecoderBuffer, DecoderError, DecoderResult, EncoderBuffer, EncoderValue},
    varint::VarInt,
};

#[derive(Clone, Debug)]
pub struct Stream<'a> {
    pub stream_id: VarInt,
    pub offset: VarInt,
    pub data: &'a [u8],
    pub fin: bool,
}

impl<'a> Stream<'a> {
    pub fn frame_type(&self) -> u64 {
        let mut bits = 0u64;
        if self.fin {
            bits |= 0b001;
        }
        bits |= 0b010; // always emit an explicit length
        if self.offset.as_u64() != 0 {
            bits |= 0b100;
        }
        super::ty::STREAM_START | bits
    }

    pub fn decode(frame_type: u64, buffer: DecoderBuffer<'a>) -> DecoderResult<'a, Self> {
        let bits = frame_type & 0b111;
        let fin = bits & 0b001 != 0;
        let has_len = bits & 0b010 != 0;
        let has_off = bits & 0b100 != 0;

        let (stream_id, buffer) = buffer.decode::<VarInt>()?;

        let (offset, buffer) = if has_off {
            buffer.decode::<VarInt>()?
        } else {
            (VarInt::ZERO, buffer)
        };

        let (data, buffer) = if has_len {
            let (len, buffer) = buffer.decode::<VarInt>()?;
            let len: usize = len.try_into().map_err(|_| DecoderError::InvalidValue)?;
            let (slice, buffer) = buffer.decode_slice(len)?;
            (slice.as_slice(), buffer)
        } else {
            // No length field: STREAM data extends to the end of the
            // packet (§6.1), i.e. the rest of this frame's buffer.
            let slice = buffer.as_slice();
            (slice, buffer.skip(slice.len())?)
        };

        if offset
            .as_u64()
            .checked_add(data.len() as u64)
            .filter(|&v| v <= crate::varint::MAX_VARINT_VALUE)
            .is_none()
        {
            return Err(DecoderError::InvalidValue);
        }

        Ok((
            Self {
                stream_id,
                offset,
                data,
                fin,
            },
            buffer,
        ))
    }

    pub fn end_offset(&self) -> u64 {
        self.offset.as_u64() + self.data.len() as u64
    }
}

impl EncoderValue for Stream<'_> {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&VarInt::try_from(self.frame_type()).unwrap());
        encoder.encode(&self.stream_id);
        if self.offset.as_u64() != 0 {
            encoder.encode(&self.offset);
        }
        encoder.encode(&VarInt::try_from(self.data.len()).expect("stream frame too large"));
        encoder.write_slice(self.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EncoderBuffer;

    #[test]
    fn fin_with_zero_length_and_zero_offset_is_legal() {
        let original = Stream {
            stream_id: VarInt::from_u8(0),
            offset: VarInt::ZERO,
            data: &[],
            fin: true,
        };
        let mut encoder = EncoderBuffer::new();
        encoder.encode(&original);
        let (decoded, rest) = super::super::decode(DecoderBuffer::new(encoder.as_slice())).unwrap();
        assert!(rest.is_empty());
        let crate::frame::Frame::Stream(decoded) = decoded else { panic!() };
        assert!(decoded.fin);
        assert!(decoded.data.is_empty());
    }

    #[test]
    fn round_trips_offset_and_data() {
        let original = Stream {
            stream_id: VarInt::from_u8(4),
            offset: VarInt::from_u16(5),
            data: b"world",
            fin: true,
        };
        let mut encoder = EncoderBuffer::new();
        encoder.encode(&original);
        let (decoded, _) = super::super::decode(DecoderBuffer::new(encoder.as_slice())).unwrap();
        let crate::frame::Frame::Stream(decoded) = decoded else { panic!() };
        assert_eq!(decoded.stream_id, original.stream_id);
        assert_eq!(decoded.offset, original.offset);
        assert_eq!(decoded.data, original.data);
        assert!(decoded.fin);
    }

    #[test]
    fn rejects_offset_plus_length_overflow() {
        let bytes: &[u8] = &[
            0x0c, // STREAM, OFF bit set, no LEN bit -> data extends to end
            0x01, // stream_id = 1
            0xbf, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, // offset near VarInt::MAX (4 byte hdr->8byte varint)
            0xff, 0xff, 0xff, // trailing "data" that would overflow when added to offset
        ];
        let err = super::super::decode(DecoderBuffer::new(bytes)).unwrap_err();
        assert_eq!(err, crate::error::TransportError::FRAME_ENCODING_ERROR);
    }
}
