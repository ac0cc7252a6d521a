// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! Frame codec and dispatch (§4.3, §6.1).
//!
//! Frame types use the varint encoding but must always choose the
//! shortest form (§4.1); [`decode`] enforces that for the discriminator
//! before dispatching to a per-type decoder. An unknown type is
//! `FRAME_ENCODING_ERROR`; everything else about whether a frame is
//! *permitted* in the packet it arrived in is left to the caller (the
//! connection engine), since that depends on packet type, not frame
//! content.

pub mod ack;
pub mod connection_close;
pub mod crypto;
pub mod stream;

use crate::{
    codec::{DecoderBuffer, DecoderError, DecoderResult, EncoderBuffer, EncoderValue},
    connection::id::{LocalId, StatelessResetToken},
    error::TransportError,
    varint::{self, VarInt},
};

macro_rules! frame_type {
    ($name:ident, $value:expr) => {
        pub const $name: u64 = $value;
    };
}

pub mod ty {
    frame_type!(PADDING, 0x00);
    frame_type!(PING, 0x01);
    frame_type!(ACK, 0x02);
    frame_type!(ACK_ECN, 0x03);
    frame_type!(RESET_STREAM, 0x04);
    frame_type!(STOP_SENDING, 0x05);
    frame_type!(CRYPTO, 0x06);
    frame_type!(NEW_TOKEN, 0x07);
    frame_type!(STREAM_START, 0x08);
    frame_type!(STREAM_END, 0x0f);
    frame_type!(MAX_DATA, 0x10);
    frame_type!(MAX_STREAM_DATA, 0x11);
    frame_type!(MAX_STREAMS_BIDI, 0x12);
    frame_type!(MAX_STREAMS_UNI, 0x13);
    frame_type!(DATA_BLOCKED, 0x14);
    frame_type!(STREAM_DATA_BLOCKED, 0x15);
    frame_type!(STREAMS_BLOCKED_BIDI, 0x16);
    frame_type!(STREAMS_BLOCKED_UNI, 0x17);
    frame_type!(NEW_CONNECTION_ID, 0x18);
    frame_type!(RETIRE_CONNECTION_ID, 0x19);
    frame_type!(PATH_CHALLENGE, 0x1a);
    frame_type!(PATH_RESPONSE, 0x1b);
    frame_type!(CONNECTION_CLOSE_TRANSPORT, 0x1c);
    frame_type!(CONNECTION_CLOSE_APPLICATION, 0x1d);
    frame_type!(HANDSHAKE_DONE, 0x1e);
}

/// A probing frame: one that by itself does not indicate loss of the path
/// it was sent on, so the sender isn't required to update congestion state
/// across paths when it's retransmitted (§9 GLOSSARY "Probing frame").
pub fn is_probing(frame_type: u64) -> bool {
    matches!(
        frame_type,
        ty::PATH_CHALLENGE | ty::PATH_RESPONSE | ty::NEW_CONNECTION_ID | ty::PADDING
    )
}

pub fn is_ack_eliciting(frame_type: u64) -> bool {
    !matches!(frame_type, ty::ACK | ty::ACK_ECN | ty::PADDING | ty::CONNECTION_CLOSE_TRANSPORT | ty::CONNECTION_CLOSE_APPLICATION)
}

#[derive(Clone, Debug)]
pub struct Ping;

#[derive(Clone, Debug)]
pub struct Padding {
    pub len: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct ResetStream {
    pub stream_id: VarInt,
    pub application_error_code: VarInt,
    pub final_size: VarInt,
}

#[derive(Clone, Copy, Debug)]
pub struct StopSending {
    pub stream_id: VarInt,
    pub application_error_code: VarInt,
}

#[derive(Clone, Debug)]
pub struct NewToken<'a> {
    pub token: &'a [u8],
}

#[derive(Clone, Copy, Debug)]
pub struct MaxData {
    pub maximum_data: VarInt,
}

#[derive(Clone, Copy, Debug)]
pub struct MaxStreamData {
    pub stream_id: VarInt,
    pub maximum_stream_data: VarInt,
}

#[derive(Clone, Copy, Debug)]
pub struct MaxStreams {
    pub bidirectional: bool,
    pub maximum_streams: VarInt,
}

#[derive(Clone, Copy, Debug)]
pub struct DataBlocked {
    pub data_limit: VarInt,
}

#[derive(Clone, Copy, Debug)]
pub struct StreamDataBlocked {
    pub stream_id: VarInt,
    pub stream_data_limit: VarInt,
}

#[derive(Clone, Copy, Debug)]
pub struct StreamsBlocked {
    pub bidirectional: bool,
    pub stream_limit: VarInt,
}

#[derive(Clone, Debug)]
pub struct NewConnectionId {
    pub sequence_number: VarInt,
    pub retire_prior_to: VarInt,
    pub connection_id: LocalId,
    pub stateless_reset_token: StatelessResetToken,
}

#[derive(Clone, Copy, Debug)]
pub struct RetireConnectionId {
    pub sequence_number: VarInt,
}

#[derive(Clone, Copy, Debug)]
pub struct PathChallenge {
    pub data: [u8; 8],
}

#[derive(Clone, Copy, Debug)]
pub struct PathResponse {
    pub data: [u8; 8],
}

#[derive(Clone, Copy, Debug)]
pub struct HandshakeDone;

/// A decoded frame, borrowing from the datagram that carried it. Dispatched
/// to the stream manager / ack manager / path manager / handshake
/// orchestrator by the connection engine (§4.3).
#[derive(Clone, Debug)]
pub enum Frame<'a> {
    Padding(Padding),
    Ping(Ping),
    Ack(ack::Ack),
    ResetStream(ResetStream),
    StopSending(StopSending),
    Crypto(crypto::Crypto<'a>),
    NewToken(NewToken<'a>),
    Stream(stream::Stream<'a>),
    MaxData(MaxData),
    MaxStreamData(MaxStreamData),
    MaxStreams(MaxStreams),
    DataBlocked(DataBlocked),
    StreamDataBlocked(StreamDataBlocked),
    StreamsBlocked(StreamsBlocked),
    NewConnectionId(NewConnectionId),
    RetireConnectionId(RetireConnectionId),
    PathChallenge(PathChallenge),
    PathResponse(PathResponse),
    ConnectionClose(connection_close::ConnectionClose<'a>),
    HandshakeDone(HandshakeDone),
}

impl<'a> Frame<'a> {
    pub fn frame_type(&self) -> u64 {
        match self {
            Self::Padding(_) => ty::PADDING,
            Self::Ping(_) => ty::PING,
            Self::Ack(a) => if a.ecn_counts.is_some() { ty::ACK_ECN } else { ty::ACK },
            Self::ResetStream(_) => ty::RESET_STREAM,
            Self::StopSending(_) => ty::STOP_SENDING,
            Self::Crypto(_) => ty::CRYPTO,
            Self::NewToken(_) => ty::NEW_TOKEN,
            Self::Stream(s) => s.frame_type(),
            Self::MaxData(_) => ty::MAX_DATA,
            Self::MaxStreamData(_) => ty::MAX_STREAM_DATA,
            Self::MaxStreams(m) => if m.bidirectional { ty::MAX_STREAMS_BIDI } else { ty::MAX_STREAMS_UNI },
            Self::DataBlocked(_) => ty::DATA_BLOCKED,
            Self::StreamDataBlocked(_) => ty::STREAM_DATA_BLOCKED,
            Self::StreamsBlocked(s) => if s.bidirectional { ty::STREAMS_BLOCKED_BIDI } else { ty::STREAMS_BLOCKED_UNI },
            Self::NewConnectionId(_) => ty::NEW_CONNECTION_ID,
            Self::RetireConnectionId(_) => ty::RETIRE_CONNECTION_ID,
            Self::PathChallenge(_) => ty::PATH_CHALLENGE,
            Self::PathResponse(_) => ty::PATH_RESPONSE,
            Self::ConnectionClose(c) => c.frame_type(),
            Self::HandshakeDone(_) => ty::HANDSHAKE_DONE,
        }
    }

    pub fn is_ack_eliciting(&self) -> bool {
        is_ack_eliciting(self.frame_type())
    }

    pub fn is_probing(&self) -> bool {
        is_probing(self.frame_type())
    }
}

/// Decodes a single frame from the front of `buffer`, returning the frame
/// and the remaining buffer. A malformed frame type or field yields
/// `FRAME_ENCODING_ERROR`; an unrecognized frame type also yields
/// `FRAME_ENCODING_ERROR` (§4.3).
pub fn decode<'a>(buffer: DecoderBuffer<'a>) -> Result<(Frame<'a>, DecoderBuffer<'a>), TransportError> {
    let (frame_type, rest) = varint::decode_canonical(buffer).map_err(|_| TransportError::FRAME_ENCODING_ERROR)?;
    let code = frame_type.as_u64();

    if (ty::STREAM_START..=ty::STREAM_END).contains(&code) {
        let (s, rest) = stream::Stream::decode(code, rest).map_err(map_decode_err)?;
        return Ok((Frame::Stream(s), rest));
    }

    let result = match code {
        ty::PADDING => {
            let mut rest = rest;
            let mut len = 0usize;
            while rest.peek_byte(0).map(|b| b == 0).unwrap_or(false) {
                rest = rest.skip(1).unwrap();
                len += 1;
            }
            Ok((Frame::Padding(Padding { len: len + 1 }), rest))
        }
        ty::PING => Ok((Frame::Ping(Ping), rest)),
        ty::ACK | ty::ACK_ECN => ack::Ack::decode(code == ty::ACK_ECN, rest).map(|(a, r)| (Frame::Ack(a), r)),
        ty::RESET_STREAM => decode_reset_stream(rest).map(|(f, r)| (Frame::ResetStream(f), r)),
        ty::STOP_SENDING => decode_stop_sending(rest).map(|(f, r)| (Frame::StopSending(f), r)),
        ty::CRYPTO => crypto::Crypto::decode(rest).map(|(f, r)| (Frame::Crypto(f), r)),
        ty::NEW_TOKEN => decode_new_token(rest).map(|(f, r)| (Frame::NewToken(f), r)),
        ty::MAX_DATA => decode_max_data(rest).map(|(f, r)| (Frame::MaxData(f), r)),
        ty::MAX_STREAM_DATA => decode_max_stream_data(rest).map(|(f, r)| (Frame::MaxStreamData(f), r)),
        ty::MAX_STREAMS_BIDI | ty::MAX_STREAMS_UNI => {
            decode_max_streams(code == ty::MAX_STREAMS_BIDI, rest).map(|(f, r)| (Frame::MaxStreams(f), r))
        }
        ty::DATA_BLOCKED => decode_data_blocked(rest).map(|(f, r)| (Frame::DataBlocked(f), r)),
        ty::STREAM_DATA_BLOCKED => decode_stream_data_blocked(rest).map(|(f, r)| (Frame::StreamDataBlocked(f), r)),
        ty::STREAMS_BLOCKED_BIDI | ty::STREAMS_BLOCKED_UNI => {
            decode_streams_blocked(code == ty::STREAMS_BLOCKED_BIDI, rest).map(|(f, r)| (Frame::StreamsBlocked(f), r))
        }
        ty::NEW_CONNECTION_ID => decode_new_connection_id(rest).map(|(f, r)| (Frame::NewConnectionId(f), r)),
        ty::RETIRE_CONNECTION_ID => decode_retire_connection_id(rest).map(|(f, r)| (Frame::RetireConnectionId(f), r)),
        ty::PATH_CHALLENGE => decode_path_challenge(rest).map(|(f, r)| (Frame::PathChallenge(f), r)),
        ty::PATH_RESPONSE => decode_path_response(rest).map(|(f, r)| (Frame::PathResponse(f), r)),
        ty::CONNECTION_CLOSE_TRANSPORT | ty::CONNECTION_CLOSE_APPLICATION => {
            connection_close::ConnectionClose::decode(code == ty::CONNECTION_CLOSE_APPLICATION, rest)
                .map(|(f, r)| (Frame::ConnectionClose(f), r))
        }
        ty::HANDSHAKE_DONE => Ok((Frame::HandshakeDone(HandshakeDone), rest)),
        _ => return Err(TransportError::FRAME_ENCODING_ERROR),
    };

    result.map_err(map_decode_err)
}

fn map_decode_err(_: DecoderError) -> TransportError {
    TransportError::FRAME_ENCODING_ERROR
}

fn decode_reset_stream(buffer: DecoderBuffer<'_>) -> DecoderResult<'_, ResetStream> {
    let (stream_id, buffer) = buffer.decode::<VarInt>()?;
    let (application_error_code, buffer) = buffer.decode::<VarInt>()?;
    let (final_size, buffer) = buffer.decode::<VarInt>()?;
    Ok((
        ResetStream {
            stream_id,
            application_error_code,
            final_size,
        },
        buffer,
    ))
}

fn decode_stop_sending(buffer: DecoderBuffer<'_>) -> DecoderResult<'_, StopSending> {
    let (stream_id, buffer) = buffer.decode::<VarInt>()?;
    let (application_error_code, buffer) = buffer.decode::<VarInt>()?;
    Ok((
        StopSending {
            stream_id,
            application_error_code,
        },
        buffer,
    ))
}

fn decode_new_token<'a>(buffer: DecoderBuffer<'a>) -> DecoderResult<'a, NewToken<'a>> {
    let (len, buffer) = buffer.decode::<VarInt>()?;
    let len: usize = len.try_into().map_err(|_| DecoderError::InvalidValue)?;
    if len == 0 {
        return Err(DecoderError::InvalidValue);
    }
    let (slice, buffer) = buffer.decode_slice(len)?;
    Ok((NewToken { token: slice.as_slice() }, buffer))
}

fn decode_max_data(buffer: DecoderBuffer<'_>) -> DecoderResult<'_, MaxData> {
    let (maximum_data, buffer) = buffer.decode::<VarInt>()?;
    Ok((MaxData { maximum_data }, buffer))
}

fn decode_max_stream_data(buffer: DecoderBuffer<'_>) -> DecoderResult<'_, MaxStreamData> {
    let (stream_id, buffer) = buffer.decode::<VarInt>()?;
    let (maximum_stream_data, buffer) = buffer.decode::<VarInt>()?;
    Ok((
        MaxStreamData {
            stream_id,
            maximum_stream_data,
        },
        buffer,
    ))
}

fn decode_max_streams(bidirectional: bool, buffer: DecoderBuffer<'_>) -> DecoderResult<'_, MaxStreams> {
    let (maximum_streams, buffer) = buffer.decode::<VarInt>()?;
    if maximum_streams.as_u64() > (1u64 << 60) {
        return Err(DecoderError::InvalidValue);
    }
    Ok((
        MaxStreams {
            bidirectional,
            maximum_streams,
        },
        buffer,
    ))
}

fn decode_data_blocked(buffer: DecoderBuffer<'_>) -> DecoderResult<'_, DataBlocked> {
    let (data_limit, buffer) = buffer.decode::<VarInt>()?;
    Ok((DataBlocked { data_limit }, buffer))
}

fn decode_stream_data_blocked(buffer: DecoderBuffer<'_>) -> DecoderResult<'_, StreamDataBlocked> {
    let (stream_id, buffer) = buffer.decode::<VarInt>()?;
    let (stream_data_limit, buffer) = buffer.decode::<VarInt>()?;
    Ok((
        StreamDataBlocked {
            stream_id,
            stream_data_limit,
        },
        buffer,
    ))
}

fn decode_streams_blocked(bidirectional: bool, buffer: DecoderBuffer<'_>) -> DecoderResult<'_, StreamsBlocked> {
    let (stream_limit, buffer) = buffer.decode::<VarInt>()?;
    if stream_limit.as_u64() > (1u64 << 60) {
        return Err(DecoderError::InvalidValue);
    }
    Ok((
        StreamsBlocked {
            bidirectional,
            stream_limit,
        },
        buffer,
    ))
}

fn decode_new_connection_id(buffer: DecoderBuffer<'_>) -> DecoderResult<'_, NewConnectionId> {
    let (sequence_number, buffer) = buffer.decode::<VarInt>()?;
    let (retire_prior_to, buffer) = buffer.decode::<VarInt>()?;
    if retire_prior_to.as_u64() > sequence_number.as_u64() {
        return Err(DecoderError::InvalidValue);
    }
    let (len, buffer) = buffer.decode_u8()?;
    let (connection_id, buffer) = LocalId::decode_with_len(buffer, len as usize)?;
    let (stateless_reset_token, buffer) = buffer.decode::<StatelessResetToken>()?;
    Ok((
        NewConnectionId {
            sequence_number,
            retire_prior_to,
            connection_id,
            stateless_reset_token,
        },
        buffer,
    ))
}

fn decode_retire_connection_id(buffer: DecoderBuffer<'_>) -> DecoderResult<'_, RetireConnectionId> {
    let (sequence_number, buffer) = buffer.decode::<VarInt>()?;
    Ok((RetireConnectionId { sequence_number }, buffer))
}

fn decode_path_challenge(buffer: DecoderBuffer<'_>) -> DecoderResult<'_, PathChallenge> {
    let (slice, buffer) = buffer.decode_slice(8)?;
    let mut data = [0u8; 8];
    data.copy_from_slice(slice.as_slice());
    Ok((PathChallenge { data }, buffer))
}

fn decode_path_response(buffer: DecoderBuffer<'_>) -> DecoderResult<'_, PathResponse> {
    let (slice, buffer) = buffer.decode_slice(8)?;
    let mut data = [0u8; 8];
    data.copy_from_slice(slice.as_slice());
    Ok((PathResponse { data }, buffer))
}

// === Encoding ===

impl EncoderValue for Ping {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&VarInt::from_u8(ty::PING as u8));
    }
}

impl EncoderValue for ResetStream {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&VarInt::from_u8(ty::RESET_STREAM as u8));
        encoder.encode(&self.stream_id);
        encoder.encode(&self.application_error_code);
        encoder.encode(&self.final_size);
    }
}

impl EncoderValue for StopSending {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&VarInt::from_u8(ty::STOP_SENDING as u8));
        encoder.encode(&self.stream_id);
        encoder.encode(&self.application_error_code);
    }
}

impl EncoderValue for NewToken<'_> {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&VarInt::from_u8(ty::NEW_TOKEN as u8));
        encoder.encode(&VarInt::try_from(self.token.len()).expect("token too large"));
        encoder.write_slice(self.token);
    }
}

impl EncoderValue for MaxData {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&VarInt::from_u8(ty::MAX_DATA as u8));
        encoder.encode(&self.maximum_data);
    }
}

impl EncoderValue for MaxStreamData {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&VarInt::from_u8(ty::MAX_STREAM_DATA as u8));
        encoder.encode(&self.stream_id);
        encoder.encode(&self.maximum_stream_data);
    }
}

impl EncoderValue for MaxStreams {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        let ty = if self.bidirectional { ty::MAX_STREAMS_BIDI } else { ty::MAX_STREAMS_UNI };
        encoder.encode(&VarInt::from_u8(ty as u8));
        encoder.encode(&self.maximum_streams);
    }
}

impl EncoderValue for DataBlocked {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&VarInt::from_u8(ty::DATA_BLOCKED as u8));
        encoder.encode(&self.data_limit);
    }
}

impl EncoderValue for StreamDataBlocked {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&VarInt::from_u8(ty::STREAM_DATA_BLOCKED as u8));
        encoder.encode(&self.stream_id);
        encoder.encode(&self.stream_data_limit);
    }
}

impl EncoderValue for StreamsBlocked {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        let ty = if self.bidirectional { ty::STREAMS_BLOCKED_BIDI } else { ty::STREAMS_BLOCKED_UNI };
        encoder.encode(&VarInt::from_u8(ty as u8));
        encoder.encode(&self.stream_limit);
    }
}

impl EncoderValue for NewConnectionId {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&VarInt::from_u8(ty::NEW_CONNECTION_ID as u8));
        encoder.encode(&self.sequence_number);
        encoder.encode(&self.retire_prior_to);
        encoder.write_u8(self.connection_id.len() as u8);
        encoder.write_slice(self.connection_id.as_bytes());
        encoder.encode(&self.stateless_reset_token);
    }
}

impl EncoderValue for RetireConnectionId {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&VarInt::from_u8(ty::RETIRE_CONNECTION_ID as u8));
        encoder.encode(&self.sequence_number);
    }
}

impl EncoderValue for PathChallenge {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&VarInt::from_u8(ty::PATH_CHALLENGE as u8));
        encoder.write_slice(&self.data);
    }
}

impl EncoderValue for PathResponse {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&VarInt::from_u8(ty::PATH_RESPONSE as u8));
        encoder.write_slice(&self.data);
    }
}

impl EncoderValue for HandshakeDone {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&VarInt::from_u8(ty::HANDSHAKE_DONE as u8));
    }
}

impl EncoderValue for Padding {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        for _ in 0..self.len {
            encoder.write_u8(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EncoderBuffer;

    #[test]
    fn unknown_type_is_frame_encoding_error() {
        let bytes = [0x3f]; // not a registered frame type
        let err = decode(DecoderBuffer::new(&bytes)).unwrap_err();
        assert_eq!(err, TransportError::FRAME_ENCODING_ERROR);
    }

    #[test]
    fn max_streams_limit_enforced() {
        let mut encoder = EncoderBuffer::new();
        encoder.encode(&MaxStreams {
            bidirectional: true,
            maximum_streams: VarInt::MAX,
        });
        let err = decode(DecoderBuffer::new(encoder.as_slice())).unwrap_err();
        assert_eq!(err, TransportError::FRAME_ENCODING_ERROR);
    }

    #[test]
    fn reset_stream_round_trips() {
        let frame = ResetStream {
            stream_id: VarInt::from_u8(4),
            application_error_code: VarInt::from_u8(1),
            final_size: VarInt::from_u16(1000),
        };
        let mut encoder = EncoderBuffer::new();
        encoder.encode(&frame);
        let (decoded, rest) = decode(DecoderBuffer::new(encoder.as_slice())).unwrap();
        assert!(rest.is_empty());
        match decoded {
            Frame::ResetStream(r) => {
                assert_eq!(r.stream_id, frame.stream_id);
                assert_eq!(r.final_size, frame.final_size);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn new_connection_id_rejects_retire_prior_to_exceeding_sequence() {
        let ncid = NewConnectionId {
            sequence_number: VarInt::from_u8(1),
            retire_prior_to: VarInt::from_u8(2),
            connection_id: LocalId::try_from_bytes(&[1; 8]).unwrap(),
            stateless_reset_token: StatelessResetToken::new([0; 16]),
        };
        let mut encoder = EncoderBuffer::new();
        encoder.encode(&ncid);
        let err = decode(DecoderBuffer::new(encoder.as_slice())).unwrap_err();
        assert_eq!(err, TransportError::FRAME_ENCODING_ERROR);
    }
}
