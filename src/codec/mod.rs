// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! Wire codec primitives: a bounds-checked decoding cursor and a growable
//! encoding buffer, in the spirit of `s2n-codec`'s `DecoderBuffer`/
//! `EncoderBuffer` split. Multi-byte integers go through `byteorder` for
//! the actual big-endian reads/writes rather than hand-rolled
//! `from_be_bytes`/`to_be_bytes` calls, the same crate `s2n-codec` itself
//! depends on for this (`common/s2n-codec`'s `Cargo.toml`).
//!
//! Decoding never panics. Any attempt to read past the end of the buffer
//! yields [`DecoderError::UnexpectedEof`] rather than aborting, so malformed
//! or truncated datagrams are turned into an error the caller can act on
//! (discard the packet, or tear down the connection) instead of a crash.

use alloc::vec::Vec;
use byteorder::{BigEndian, ByteOrder};
use core::fmt;

/// Failure decoding a value from a [`DecoderBuffer`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecoderError {
    /// The buffer did not contain enough bytes to decode the value.
    UnexpectedEof,
    /// The value was present but violated a wire-format constraint, e.g. a
    /// non-shortest variable-length integer encoding.
    InvalidValue,
}

impl fmt::Display for DecoderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "insufficient input to decode value"),
            Self::InvalidValue => write!(f, "value violated a wire-format constraint"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecoderError {}

pub type DecoderResult<'a, T> = Result<(T, DecoderBuffer<'a>), DecoderError>;

/// A cursor over an immutable byte slice that yields values without copying
/// the remainder of the buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DecoderBuffer<'a> {
    bytes: &'a [u8],
}

impl<'a> DecoderBuffer<'a> {
    #[inline]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn as_slice(&self) -> &'a [u8] {
        self.bytes
    }

    #[inline]
    pub fn peek_byte(&self, offset: usize) -> Result<u8, DecoderError> {
        self.bytes
            .get(offset)
            .copied()
            .ok_or(DecoderError::UnexpectedEof)
    }

    /// Splits off the first `len` bytes, returning them and the remainder.
    #[inline]
    pub fn decode_slice(self, len: usize) -> DecoderResult<'a, DecoderBuffer<'a>> {
        if self.bytes.len() < len {
            return Err(DecoderError::UnexpectedEof);
        }
        let (head, tail) = self.bytes.split_at(len);
        Ok((DecoderBuffer::new(head), DecoderBuffer::new(tail)))
    }

    #[inline]
    pub fn skip(self, len: usize) -> Result<DecoderBuffer<'a>, DecoderError> {
        let (_, rest) = self.decode_slice(len)?;
        Ok(rest)
    }

    #[inline]
    pub fn decode<T: DecoderValue<'a>>(self) -> DecoderResult<'a, T> {
        T::decode(self)
    }

    #[inline]
    pub fn decode_u8(self) -> DecoderResult<'a, u8> {
        let byte = self.peek_byte(0)?;
        Ok((byte, self.skip(1)?))
    }

    #[inline]
    pub fn decode_u16(self) -> DecoderResult<'a, u16> {
        let (slice, rest) = self.decode_slice(2)?;
        Ok((BigEndian::read_u16(slice.as_slice()), rest))
    }

    #[inline]
    pub fn decode_u32(self) -> DecoderResult<'a, u32> {
        let (slice, rest) = self.decode_slice(4)?;
        Ok((BigEndian::read_u32(slice.as_slice()), rest))
    }

    #[inline]
    pub fn decode_u64(self) -> DecoderResult<'a, u64> {
        let (slice, rest) = self.decode_slice(8)?;
        Ok((BigEndian::read_u64(slice.as_slice()), rest))
    }

    #[inline]
    pub fn decode_u128(self) -> DecoderResult<'a, u128> {
        let (slice, rest) = self.decode_slice(16)?;
        Ok((BigEndian::read_u128(slice.as_slice()), rest))
    }
}

/// A type that can be parsed out of the front of a [`DecoderBuffer`].
pub trait DecoderValue<'a>: Sized {
    fn decode(buffer: DecoderBuffer<'a>) -> DecoderResult<'a, Self>;
}

/// A growable little buffer for serializing wire values, in front-to-back
/// order.
#[derive(Clone, Debug, Default)]
pub struct EncoderBuffer {
    bytes: Vec<u8>,
}

impl EncoderBuffer {
    #[inline]
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    #[inline]
    pub fn write_slice(&mut self, slice: &[u8]) {
        self.bytes.extend_from_slice(slice);
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        let start = self.bytes.len();
        self.bytes.resize(start + 2, 0);
        BigEndian::write_u16(&mut self.bytes[start..], value);
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        let start = self.bytes.len();
        self.bytes.resize(start + 4, 0);
        BigEndian::write_u32(&mut self.bytes[start..], value);
    }

    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        let start = self.bytes.len();
        self.bytes.resize(start + 8, 0);
        BigEndian::write_u64(&mut self.bytes[start..], value);
    }

    #[inline]
    pub fn write_u128(&mut self, value: u128) {
        let start = self.bytes.len();
        self.bytes.resize(start + 16, 0);
        BigEndian::write_u128(&mut self.bytes[start..], value);
    }

    #[inline]
    pub fn encode<T: EncoderValue>(&mut self, value: &T) {
        value.encode(self);
    }

    /// Reserves `len` bytes at the current position and runs `f` to fill
    /// them, panicking if `f` writes a different number of bytes. Used by
    /// fixed-width encodings (varints) that need the buffer pre-sized.
    #[inline]
    pub fn write_sized(&mut self, len: usize, f: impl FnOnce(&mut [u8])) {
        let start = self.bytes.len();
        self.bytes.resize(start + len, 0);
        f(&mut self.bytes[start..start + len]);
    }
}

/// A type that can serialize itself onto an [`EncoderBuffer`].
pub trait EncoderValue {
    fn encode(&self, encoder: &mut EncoderBuffer);

    /// The number of bytes `encode` will write, without writing them.
    fn encoding_size(&self) -> usize {
        let mut tmp = EncoderBuffer::new();
        self.encode(&mut tmp);
        tmp.len()
    }
}

impl<'a> DecoderValue<'a> for u8 {
    #[inline]
    fn decode(buffer: DecoderBuffer<'a>) -> DecoderResult<'a, Self> {
        buffer.decode_u8()
    }
}

impl<'a> DecoderValue<'a> for u16 {
    #[inline]
    fn decode(buffer: DecoderBuffer<'a>) -> DecoderResult<'a, Self> {
        buffer.decode_u16()
    }
}

impl<'a> DecoderValue<'a> for u32 {
    #[inline]
    fn decode(buffer: DecoderBuffer<'a>) -> DecoderResult<'a, Self> {
        buffer.decode_u32()
    }
}

impl<'a> DecoderValue<'a> for u64 {
    #[inline]
    fn decode(buffer: DecoderBuffer<'a>) -> DecoderResult<'a, Self> {
        buffer.decode_u64()
    }
}

impl<'a> DecoderValue<'a> for u128 {
    #[inline]
    fn decode(buffer: DecoderBuffer<'a>) -> DecoderResult<'a, Self> {
        buffer.decode_u128()
    }
}

impl EncoderValue for u8 {
    #[inline]
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.write_u8(*self);
    }
}

impl EncoderValue for u16 {
    #[inline]
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.write_u16(*self);
    }
}

impl EncoderValue for u32 {
    #[inline]
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.write_u32(*self);
    }
}

impl EncoderValue for u64 {
    #[inline]
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.write_u64(*self);
    }
}

impl EncoderValue for u128 {
    #[inline]
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.write_u128(*self);
    }
}

/// A varint-length-prefixed opaque byte blob (§4.1: "opaque byte blobs with
/// varint length prefix").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LengthPrefixed<'a>(pub &'a [u8]);

impl<'a> DecoderValue<'a> for LengthPrefixed<'a> {
    #[inline]
    fn decode(buffer: DecoderBuffer<'a>) -> DecoderResult<'a, Self> {
        let (len, buffer) = buffer.decode::<crate::varint::VarInt>()?;
        let len: usize = len.try_into().map_err(|_| DecoderError::InvalidValue)?;
        let (slice, buffer) = buffer.decode_slice(len)?;
        Ok((LengthPrefixed(slice.as_slice()), buffer))
    }
}

impl EncoderValue for LengthPrefixed<'_> {
    #[inline]
    fn encode(&self, encoder: &mut EncoderBuffer) {
        let len = crate::varint::VarInt::try_from(self.0.len()).expect("blob too large for varint length");
        encoder.encode(&len);
        encoder.write_slice(self.0);
    }
}
