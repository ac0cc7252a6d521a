// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! Transport parameter IDs, encoding, and validation (§4.9, §6.3, §4.4a).

use crate::{
    codec::{DecoderBuffer, DecoderError, EncoderBuffer, EncoderValue},
    connection::id::{LocalId, StatelessResetToken},
    error::TransportError,
    varint::VarInt,
};
use alloc::vec::Vec;

pub mod id {
    pub const ORIGINAL_DESTINATION_CONNECTION_ID: u64 = 0x00;
    pub const MAX_IDLE_TIMEOUT: u64 = 0x01;
    pub const STATELESS_RESET_TOKEN: u64 = 0x02;
    pub const MAX_UDP_PAYLOAD_SIZE: u64 = 0x03;
    pub const INITIAL_MAX_DATA: u64 = 0x04;
    pub const INITIAL_MAX_STREAM_DATA_BIDI_LOCAL: u64 = 0x05;
    pub const INITIAL_MAX_STREAM_DATA_BIDI_REMOTE: u64 = 0x06;
    pub const INITIAL_MAX_STREAM_DATA_UNI: u64 = 0x07;
    pub const INITIAL_MAX_STREAMS_BIDI: u64 = 0x08;
    pub const INITIAL_MAX_STREAMS_UNI: u64 = 0x09;
    pub const ACK_DELAY_EXPONENT: u64 = 0x0a;
    pub const MAX_ACK_DELAY: u64 = 0x0b;
    pub const DISABLE_ACTIVE_MIGRATION: u64 = 0x0c;
    pub const PREFERRED_ADDRESS: u64 = 0x0d;
    pub const ACTIVE_CONNECTION_ID_LIMIT: u64 = 0x0e;
    pub const INITIAL_SOURCE_CONNECTION_ID: u64 = 0x0f;
    pub const RETRY_SOURCE_CONNECTION_ID: u64 = 0x10;

    /// IDs of the form `31*N + 27` are reserved grease slots (§4.9) and
    /// must be ignored by a decoder, never treated as unknown-and-fatal.
    pub fn is_grease(value: u64) -> bool {
        value >= 27 && (value - 27) % 31 == 0
    }
}

const MAX_VARINT_PARAM: u64 = (1u64 << 60) - 1;

#[derive(Clone, Debug, Default)]
pub struct TransportParameters {
    pub original_destination_connection_id: Option<LocalId>,
    pub max_idle_timeout_millis: u64,
    pub stateless_reset_token: Option<StatelessResetToken>,
    pub max_udp_payload_size: u64,
    pub initial_max_data: u64,
    pub initial_max_stream_data_bidi_local: u64,
    pub initial_max_stream_data_bidi_remote: u64,
    pub initial_max_stream_data_uni: u64,
    pub initial_max_streams_bidi: u64,
    pub initial_max_streams_uni: u64,
    pub ack_delay_exponent: u64,
    pub max_ack_delay_millis: u64,
    pub disable_active_migration: bool,
    pub active_connection_id_limit: u64,
    pub initial_source_connection_id: Option<LocalId>,
    pub retry_source_connection_id: Option<LocalId>,
}

impl TransportParameters {
    pub fn defaults() -> Self {
        Self {
            max_udp_payload_size: 65527,
            ack_delay_exponent: 3,
            max_ack_delay_millis: 25,
            active_connection_id_limit: 2,
            ..Default::default()
        }
    }

    /// Decodes the `(id, length, value)*` sequence from a TLS extension
    /// body (§4.9). Unknown non-grease IDs are ignored per the same rule,
    /// since no IDs outside the recognized set are defined by this
    /// version; duplicates of a recognized ID are rejected.
    pub fn decode(mut buffer: DecoderBuffer<'_>) -> Result<Self, TransportError> {
        let mut params = Self::defaults();
        let mut seen = Vec::new();

        while !buffer.is_empty() {
            let (raw_id, rest) = buffer
                .decode::<VarInt>()
                .map_err(|_| TransportError::TRANSPORT_PARAMETER_ERROR)?;
            let (len, rest) = rest.decode::<VarInt>().map_err(|_| TransportError::TRANSPORT_PARAMETER_ERROR)?;
            let len: usize = len.try_into().map_err(|_| TransportError::TRANSPORT_PARAMETER_ERROR)?;
            let (value, rest) = rest.decode_slice(len).map_err(|_| TransportError::TRANSPORT_PARAMETER_ERROR)?;
            buffer = rest;

            let raw_id = raw_id.as_u64();
            if id::is_grease(raw_id) {
                continue;
            }
            if seen.contains(&raw_id) {
                return Err(TransportError::TRANSPORT_PARAMETER_ERROR);
            }
            seen.push(raw_id);

            let value_buffer = DecoderBuffer::new(value.as_slice());
            apply_param(&mut params, raw_id, value_buffer)?;
        }

        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<(), TransportError> {
        if self.ack_delay_exponent > 20 {
            return Err(TransportError::TRANSPORT_PARAMETER_ERROR);
        }
        if self.max_ack_delay_millis >= (1 << 14) {
            return Err(TransportError::TRANSPORT_PARAMETER_ERROR);
        }
        if self.max_udp_payload_size < 1200 {
            return Err(TransportError::TRANSPORT_PARAMETER_ERROR);
        }
        if self.active_connection_id_limit < 2 {
            return Err(TransportError::TRANSPORT_PARAMETER_ERROR);
        }
        for limit in [
            self.initial_max_data,
            self.initial_max_stream_data_bidi_local,
            self.initial_max_stream_data_bidi_remote,
            self.initial_max_stream_data_uni,
            self.initial_max_streams_bidi,
            self.initial_max_streams_uni,
        ] {
            if limit > MAX_VARINT_PARAM {
                return Err(TransportError::TRANSPORT_PARAMETER_ERROR);
            }
        }
        Ok(())
    }

    /// §4.4: "If a server accepts 0-RTT it MUST NOT advertise lower limits"
    /// for these five values, checked against the remembered values from
    /// the original connection.
    pub fn regresses_0rtt_limits(&self, remembered: &Self) -> bool {
        self.active_connection_id_limit < remembered.active_connection_id_limit
            || self.initial_max_data < remembered.initial_max_data
            || self.initial_max_stream_data_bidi_local < remembered.initial_max_stream_data_bidi_local
            || self.initial_max_stream_data_bidi_remote < remembered.initial_max_stream_data_bidi_remote
            || self.initial_max_stream_data_uni < remembered.initial_max_stream_data_uni
            || self.initial_max_streams_bidi < remembered.initial_max_streams_bidi
            || self.initial_max_streams_uni < remembered.initial_max_streams_uni
    }
}

fn decode_varint_param(buffer: DecoderBuffer<'_>) -> Result<u64, TransportError> {
    let (value, rest) = buffer.decode::<VarInt>().map_err(|_| TransportError::TRANSPORT_PARAMETER_ERROR)?;
    if !rest.is_empty() {
        return Err(TransportError::TRANSPORT_PARAMETER_ERROR);
    }
    Ok(value.as_u64())
}

fn apply_param(params: &mut TransportParameters, raw_id: u64, buffer: DecoderBuffer<'_>) -> Result<(), TransportError> {
    use id::*;
    match raw_id {
        ORIGINAL_DESTINATION_CONNECTION_ID => {
            params.original_destination_connection_id =
                Some(LocalId::try_from_bytes(buffer.as_slice()).map_err(|_| TransportError::TRANSPORT_PARAMETER_ERROR)?);
        }
        MAX_IDLE_TIMEOUT => params.max_idle_timeout_millis = decode_varint_param(buffer)?,
        STATELESS_RESET_TOKEN => {
            if buffer.as_slice().len() != StatelessResetToken::LEN {
                return Err(TransportError::TRANSPORT_PARAMETER_ERROR);
            }
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(buffer.as_slice());
            params.stateless_reset_token = Some(StatelessResetToken::new(bytes));
        }
        MAX_UDP_PAYLOAD_SIZE => params.max_udp_payload_size = decode_varint_param(buffer)?,
        INITIAL_MAX_DATA => params.initial_max_data = decode_varint_param(buffer)?,
        INITIAL_MAX_STREAM_DATA_BIDI_LOCAL => params.initial_max_stream_data_bidi_local = decode_varint_param(buffer)?,
        INITIAL_MAX_STREAM_DATA_BIDI_REMOTE => params.initial_max_stream_data_bidi_remote = decode_varint_param(buffer)?,
        INITIAL_MAX_STREAM_DATA_UNI => params.initial_max_stream_data_uni = decode_varint_param(buffer)?,
        INITIAL_MAX_STREAMS_BIDI => params.initial_max_streams_bidi = decode_varint_param(buffer)?,
        INITIAL_MAX_STREAMS_UNI => params.initial_max_streams_uni = decode_varint_param(buffer)?,
        ACK_DELAY_EXPONENT => params.ack_delay_exponent = decode_varint_param(buffer)?,
        MAX_ACK_DELAY => params.max_ack_delay_millis = decode_varint_param(buffer)?,
        DISABLE_ACTIVE_MIGRATION => {
            if !buffer.is_empty() {
                return Err(TransportError::TRANSPORT_PARAMETER_ERROR);
            }
            params.disable_active_migration = true;
        }
        PREFERRED_ADDRESS => {
            // Opaque to this core; presence is recorded but its contents are
            // routed to the path manager only once preferred-address
            // migration is actually performed (out of scope here).
        }
        ACTIVE_CONNECTION_ID_LIMIT => params.active_connection_id_limit = decode_varint_param(buffer)?,
        INITIAL_SOURCE_CONNECTION_ID => {
            params.initial_source_connection_id =
                Some(LocalId::try_from_bytes(buffer.as_slice()).map_err(|_| TransportError::TRANSPORT_PARAMETER_ERROR)?);
        }
        RETRY_SOURCE_CONNECTION_ID => {
            params.retry_source_connection_id =
                Some(LocalId::try_from_bytes(buffer.as_slice()).map_err(|_| TransportError::TRANSPORT_PARAMETER_ERROR)?);
        }
        _ => {
            // Unknown, non-grease IDs are ignored (§4.9).
        }
    }
    Ok(())
}

fn encode_varint_param(encoder: &mut EncoderBuffer, id: u64, value: u64) {
    let value = VarInt::try_from(value).expect("transport parameter value exceeds varint range");
    encoder.encode(&VarInt::try_from(id).unwrap());
    encoder.encode(&VarInt::try_from(value.encoding_size()).unwrap());
    encoder.encode(&value);
}

impl EncoderValue for TransportParameters {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        use id::*;

        if let Some(cid) = &self.original_destination_connection_id {
            encoder.encode(&VarInt::try_from(ORIGINAL_DESTINATION_CONNECTION_ID).unwrap());
            encoder.encode(&VarInt::try_from(cid.len()).unwrap());
            encoder.write_slice(cid.as_bytes());
        }
        encode_varint_param(encoder, MAX_IDLE_TIMEOUT, self.max_idle_timeout_millis);
        if let Some(token) = &self.stateless_reset_token {
            encoder.encode(&VarInt::try_from(STATELESS_RESET_TOKEN).unwrap());
            encoder.encode(&VarInt::try_from(StatelessResetToken::LEN).unwrap());
            encoder.write_slice(token.as_bytes());
        }
        encode_varint_param(encoder, MAX_UDP_PAYLOAD_SIZE, self.max_udp_payload_size);
        encode_varint_param(encoder, INITIAL_MAX_DATA, self.initial_max_data);
        encode_varint_param(encoder, INITIAL_MAX_STREAM_DATA_BIDI_LOCAL, self.initial_max_stream_data_bidi_local);
        encode_varint_param(encoder, INITIAL_MAX_STREAM_DATA_BIDI_REMOTE, self.initial_max_stream_data_bidi_remote);
        encode_varint_param(encoder, INITIAL_MAX_STREAM_DATA_UNI, self.initial_max_stream_data_uni);
        encode_varint_param(encoder, INITIAL_MAX_STREAMS_BIDI, self.initial_max_streams_bidi);
        encode_varint_param(encoder, INITIAL_MAX_STREAMS_UNI, self.initial_max_streams_uni);
        encode_varint_param(encoder, ACK_DELAY_EXPONENT, self.ack_delay_exponent);
        encode_varint_param(encoder, MAX_ACK_DELAY, self.max_ack_delay_millis);
        if self.disable_active_migration {
            encoder.encode(&VarInt::try_from(DISABLE_ACTIVE_MIGRATION).unwrap());
            encoder.encode(&VarInt::from_u8(0));
        }
        encode_varint_param(encoder, ACTIVE_CONNECTION_ID_LIMIT, self.active_connection_id_limit);
        if let Some(cid) = &self.initial_source_connection_id {
            encoder.encode(&VarInt::try_from(INITIAL_SOURCE_CONNECTION_ID).unwrap());
            encoder.encode(&VarInt::try_from(cid.len()).unwrap());
            encoder.write_slice(cid.as_bytes());
        }
        if let Some(cid) = &self.retry_source_connection_id {
            encoder.encode(&VarInt::try_from(RETRY_SOURCE_CONNECTION_ID).unwrap());
            encoder.encode(&VarInt::try_from(cid.len()).unwrap());
            encoder.write_slice(cid.as_bytes());
        }
    }
}

impl From<DecoderError> for TransportError {
    fn from(_: DecoderError) -> Self {
        TransportError::TRANSPORT_PARAMETER_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_codec() {
        let mut params = TransportParameters::defaults();
        params.initial_max_data = 1_000_000;
        params.initial_source_connection_id = Some(LocalId::try_from_bytes(&[1, 2, 3, 4]).unwrap());

        let mut encoder = EncoderBuffer::new();
        encoder.encode(&params);
        let decoded = TransportParameters::decode(DecoderBuffer::new(encoder.as_slice())).unwrap();
        assert_eq!(decoded.initial_max_data, 1_000_000);
        assert_eq!(decoded.initial_source_connection_id, params.initial_source_connection_id);
    }

    #[test]
    fn duplicate_id_is_transport_parameter_error() {
        let mut encoder = EncoderBuffer::new();
        encode_varint_param(&mut encoder, id::MAX_IDLE_TIMEOUT, 1000);
        encode_varint_param(&mut encoder, id::MAX_IDLE_TIMEOUT, 2000);
        let err = TransportParameters::decode(DecoderBuffer::new(encoder.as_slice())).unwrap_err();
        assert_eq!(err, TransportError::TRANSPORT_PARAMETER_ERROR);
    }

    #[test]
    fn grease_ids_are_ignored() {
        let mut encoder = EncoderBuffer::new();
        encoder.encode(&VarInt::try_from(27u64).unwrap());
        encoder.encode(&VarInt::from_u8(3));
        encoder.write_slice(&[1, 2, 3]);
        let params = TransportParameters::decode(DecoderBuffer::new(encoder.as_slice())).unwrap();
        assert_eq!(params.max_udp_payload_size, 65527);
    }

    #[test]
    fn out_of_range_ack_delay_exponent_is_rejected() {
        let mut encoder = EncoderBuffer::new();
        encode_varint_param(&mut encoder, id::ACK_DELAY_EXPONENT, 21);
        let err = TransportParameters::decode(DecoderBuffer::new(encoder.as_slice())).unwrap_err();
        assert_eq!(err, TransportError::TRANSPORT_PARAMETER_ERROR);
    }

    #[test]
    fn zero_rtt_limit_regression_is_detected() {
        let mut remembered = TransportParameters::defaults();
        remembered.initial_max_data = 1000;
        let mut offered = TransportParameters::defaults();
        offered.initial_max_data = 500;
        assert!(offered.regresses_0rtt_limits(&remembered));
    }
}
