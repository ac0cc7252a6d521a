// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! Long header packets: Initial, 0-RTT, Handshake, Retry, and Version
//! Negotiation (§6.1).

use crate::{
    codec::{DecoderBuffer, DecoderError, DecoderResult, EncoderBuffer, EncoderValue},
    connection::id::{LocalId, PeerId},
    varint::VarInt,
};

pub const DESTINATION_CONNECTION_ID_MAX_LEN: usize = 20;

pub const QUIC_VERSION_1: u32 = 0x0000_0001;
pub const VERSION_NEGOTIATION: u32 = 0x0000_0000;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LongHeaderType {
    Initial,
    ZeroRtt,
    Handshake,
    Retry,
}

impl LongHeaderType {
    fn from_type_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::Initial,
            0b01 => Self::ZeroRtt,
            0b10 => Self::Handshake,
            0b11 => Self::Retry,
            _ => unreachable!(),
        }
    }

    fn type_bits(self) -> u8 {
        match self {
            Self::Initial => 0b00,
            Self::ZeroRtt => 0b01,
            Self::Handshake => 0b10,
            Self::Retry => 0b11,
        }
    }
}

/// The portion of a long header that can be parsed *before* header
/// protection is removed: version, DCID, SCID, and (for Initial) the
/// token. The packet-number length and reserved bits live in the protected
/// first byte and are only trustworthy after protection removal.
#[derive(Clone, Debug)]
pub struct LongHeader<'a> {
    pub first_byte: u8,
    pub header_type: LongHeaderType,
    pub version: u32,
    pub destination_connection_id: PeerId,
    pub source_connection_id: LocalId,
    pub token: Option<&'a [u8]>,
    /// Length of (packet number + payload), as declared on the wire. Used
    /// to know how much of the datagram this packet occupies, for
    /// splitting coalesced packets (§2 "split coalesced packets").
    pub remainder_len: usize,
}

impl<'a> LongHeader<'a> {
    /// Parses everything up through the `length` field. The caller still
    /// needs to remove header protection on the returned remainder before
    /// decoding the packet number and payload (§4.2).
    pub fn decode(buffer: DecoderBuffer<'a>) -> DecoderResult<'a, Self> {
        let (first_byte, buffer) = buffer.decode_u8()?;
        if first_byte & 0xc0 != 0xc0 {
            return Err(DecoderError::InvalidValue);
        }
        let (version, buffer) = buffer.decode_u32()?;

        if version == VERSION_NEGOTIATION {
            return Err(DecoderError::InvalidValue); // handled by a dedicated path
        }

        let header_type = LongHeaderType::from_type_bits(first_byte >> 4);

        let (dcid_len, buffer) = buffer.decode_u8()?;
        if dcid_len as usize > DESTINATION_CONNECTION_ID_MAX_LEN {
            return Err(DecoderError::InvalidValue);
        }
        let (destination_connection_id, buffer) = PeerId::decode_with_len(buffer, dcid_len as usize)?;

        let (scid_len, buffer) = buffer.decode_u8()?;
        if scid_len as usize > DESTINATION_CONNECTION_ID_MAX_LEN {
            return Err(DecoderError::InvalidValue);
        }
        let (source_connection_id, buffer) = LocalId::decode_with_len(buffer, scid_len as usize)?;

        let (token, buffer) = if matches!(header_type, LongHeaderType::Initial) {
            let (token_len, buffer) = buffer.decode::<VarInt>()?;
            let token_len: usize = token_len.try_into().map_err(|_| DecoderError::InvalidValue)?;
            let (slice, buffer) = buffer.decode_slice(token_len)?;
            (Some(slice.as_slice()), buffer)
        } else {
            (None, buffer)
        };

        if matches!(header_type, LongHeaderType::Retry) {
            // Retry carries no length/packet-number; the remainder is
            // token-already-consumed-above plus a 16 byte integrity tag.
            return Ok((
                Self {
                    first_byte,
                    header_type,
                    version,
                    destination_connection_id,
                    source_connection_id,
                    token,
                    remainder_len: buffer.len(),
                },
                buffer,
            ));
        }

        let (length, buffer) = buffer.decode::<VarInt>()?;
        let length: usize = length.try_into().map_err(|_| DecoderError::InvalidValue)?;

        Ok((
            Self {
                first_byte,
                header_type,
                version,
                destination_connection_id,
                source_connection_id,
                token,
                remainder_len: length,
            },
            buffer,
        ))
    }

    pub fn encode_prefix(
        header_type: LongHeaderType,
        version: u32,
        destination_connection_id: &PeerId,
        source_connection_id: &LocalId,
        token: &[u8],
        unprotected_type_and_pn_bits: u8,
        encoder: &mut EncoderBuffer,
    ) {
        let first_byte = 0xc0 | (header_type.type_bits() << 4) | (unprotected_type_and_pn_bits & 0x0f);
        encoder.write_u8(first_byte);
        encoder.write_u32(version);
        encoder.encode(destination_connection_id);
        encoder.encode(source_connection_id);
        if matches!(header_type, LongHeaderType::Initial) {
            let token_len = VarInt::try_from(token.len()).expect("token too large");
            encoder.encode(&token_len);
            encoder.write_slice(token);
        }
    }
}

/// A Version Negotiation packet (§6.1). Carries no packet number and is
/// never acknowledged.
#[derive(Clone, Debug)]
pub struct VersionNegotiation {
    pub destination_connection_id: PeerId,
    pub source_connection_id: LocalId,
}

impl VersionNegotiation {
    pub fn decode<'a>(buffer: DecoderBuffer<'a>) -> DecoderResult<'a, (Self, alloc::vec::Vec<u32>)> {
        let (first_byte, buffer) = buffer.decode_u8()?;
        if first_byte & 0x80 == 0 {
            return Err(DecoderError::InvalidValue);
        }
        let (version, buffer) = buffer.decode_u32()?;
        if version != VERSION_NEGOTIATION {
            return Err(DecoderError::InvalidValue);
        }
        let (dcid_len, buffer) = buffer.decode_u8()?;
        let (destination_connection_id, buffer) = PeerId::decode_with_len(buffer, dcid_len as usize)?;
        let (scid_len, buffer) = buffer.decode_u8()?;
        let (source_connection_id, mut buffer) = LocalId::decode_with_len(buffer, scid_len as usize)?;

        let mut versions = alloc::vec::Vec::new();
        while !buffer.is_empty() {
            let (v, rest) = buffer.decode_u32()?;
            versions.push(v);
            buffer = rest;
        }

        Ok((
            (
                Self {
                    destination_connection_id,
                    source_connection_id,
                },
                versions,
            ),
            buffer,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecoderBuffer;

    #[test]
    fn decodes_initial_header_prefix() {
        let dcid = PeerId::try_from_bytes(&[0x83, 0x94, 0xc8, 0xf0, 0x3e, 0x51, 0x57, 0x08]).unwrap();
        let scid = LocalId::try_from_bytes(&[0xaa; 4]).unwrap();
        let mut encoder = EncoderBuffer::new();
        LongHeader::encode_prefix(
            LongHeaderType::Initial,
            QUIC_VERSION_1,
            &dcid,
            &scid,
            &[],
            0x03,
            &mut encoder,
        );
        encoder.encode(&VarInt::try_from(1200usize).unwrap());

        let (header, _) = LongHeader::decode(DecoderBuffer::new(encoder.as_slice())).unwrap();
        assert_eq!(header.header_type, LongHeaderType::Initial);
        assert_eq!(header.version, QUIC_VERSION_1);
        assert_eq!(header.destination_connection_id, dcid);
        assert_eq!(header.source_connection_id, scid);
        assert_eq!(header.remainder_len, 1200);
    }
}
