// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! Packet protection: AEAD seal/open, header protection, key derivation,
//! and key update (§4.2).
//!
//! The AEAD and HKDF primitives themselves are out of scope for this crate
//! (§1: "OS timers and cryptographic primitives ... out of scope") and are
//! consumed through the [`Aead`] and [`HeaderProtectionMask`] traits. A
//! caller wires in `aws-lc-rs`, `ring`, or any other primitive library the
//! way `s2n-quic-crypto` does for the teacher.

pub mod keys;

use crate::varint::VarInt;
use core::fmt;

pub const SAMPLE_LEN: usize = 16;
/// Offset of the header-protection sample from the start of the packet
/// number field, assuming the worst-case 4-byte packet number (§4.2).
pub const SAMPLE_OFFSET: usize = 4;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProtectionError {
    /// AEAD open failed: bad MAC, wrong key, or corrupted ciphertext.
    DecryptionFailed,
    /// The AEAD's confidentiality/integrity use limit was reached
    /// (§4.2, §6.4 `AEAD_LIMIT_REACHED`).
    UseLimitReached,
    /// The sample didn't contain enough bytes to compute a header
    /// protection mask.
    SampleTooShort,
}

impl fmt::Display for ProtectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DecryptionFailed => write!(f, "AEAD open failed"),
            Self::UseLimitReached => write!(f, "AEAD confidentiality/integrity limit reached"),
            Self::SampleTooShort => write!(f, "insufficient ciphertext for a header protection sample"),
        }
    }
}

/// The nonce for a packet is the 96-bit IV XORed with the left-padded
/// 62-bit packet number (§4.2 "AEAD nonce").
pub fn nonce(iv: &[u8; 12], packet_number: u64) -> [u8; 12] {
    let mut nonce = *iv;
    let pn_bytes = packet_number.to_be_bytes();
    for i in 0..8 {
        nonce[12 - 8 + i] ^= pn_bytes[i];
    }
    nonce
}

/// An AEAD collaborator for one direction (send or receive) of one
/// encryption level.
pub trait Aead {
    /// Encrypts `payload` in place and appends the authentication tag,
    /// authenticating `header` as associated data (§4.2 "Associated
    /// data").
    fn seal(&mut self, nonce: &[u8; 12], header: &[u8], payload: &mut alloc::vec::Vec<u8>) -> Result<(), ProtectionError>;

    /// Decrypts `payload` (which includes the trailing tag) in place,
    /// shrinking it to the plaintext length.
    fn open(&mut self, nonce: &[u8; 12], header: &[u8], payload: &mut alloc::vec::Vec<u8>) -> Result<(), ProtectionError>;

    fn tag_len(&self) -> usize;
}

/// A header-protection collaborator: derives a 5-byte mask from a 16-byte
/// ciphertext sample (§4.2 "Header protection").
pub trait HeaderProtectionMask {
    fn mask(&self, sample: &[u8; SAMPLE_LEN]) -> [u8; 5];
}

/// Applies header protection to an encoded long/short header in place.
/// `pn_offset` is the byte offset of the packet number field within
/// `packet`; `pn_len` is its encoded length in bytes.
pub fn apply_header_protection(
    hp: &dyn HeaderProtectionMask,
    packet: &mut [u8],
    pn_offset: usize,
    pn_len: usize,
    long_header: bool,
) -> Result<(), ProtectionError> {
    let sample_offset = pn_offset + SAMPLE_OFFSET;
    let sample_end = sample_offset
        .checked_add(SAMPLE_LEN)
        .filter(|&end| end <= packet.len())
        .ok_or(ProtectionError::SampleTooShort)?;
    let mut sample = [0u8; SAMPLE_LEN];
    sample.copy_from_slice(&packet[sample_offset..sample_end]);
    let mask = hp.mask(&sample);

    let byte0_mask = if long_header { 0x0f } else { 0x1f };
    packet[0] ^= mask[0] & byte0_mask;

    for i in 0..pn_len {
        packet[pn_offset + i] ^= mask[1 + i];
    }
    Ok(())
}

/// Removes header protection: same operation, since XOR is its own
/// inverse, but named separately because the caller flow differs (§4.2
/// "On receipt: remove header protection first").
pub fn remove_header_protection(
    hp: &dyn HeaderProtectionMask,
    packet: &mut [u8],
    pn_offset: usize,
    max_pn_len: usize,
    long_header: bool,
) -> Result<u8, ProtectionError> {
    let sample_offset = pn_offset + SAMPLE_OFFSET;
    let sample_end = sample_offset
        .checked_add(SAMPLE_LEN)
        .filter(|&end| end <= packet.len())
        .ok_or(ProtectionError::SampleTooShort)?;
    let mut sample = [0u8; SAMPLE_LEN];
    sample.copy_from_slice(&packet[sample_offset..sample_end]);
    let mask = hp.mask(&sample);

    let byte0_mask = if long_header { 0x0f } else { 0x1f };
    packet[0] ^= mask[0] & byte0_mask;

    // After unmasking byte 0 we know the true packet-number length.
    let pn_len = (packet[0] & 0x03) as usize + 1;
    let pn_len = pn_len.min(max_pn_len);

    for i in 0..pn_len {
        packet[pn_offset + i] ^= mask[1 + i];
    }
    Ok(packet[0])
}

/// HKDF-Expand-Label, as used to derive `key`, `iv`, `hp`, and the next key
/// update secret (§4.2). The HKDF primitive itself is supplied by the
/// caller through [`keys::Hkdf`].
pub fn expand_label(hkdf: &dyn keys::Hkdf, secret: &[u8], label: &str, out_len: usize) -> alloc::vec::Vec<u8> {
    hkdf.expand_label(secret, label.as_bytes(), out_len)
}

/// The fixed version-1 Initial salt (§4.2).
pub const INITIAL_SALT_V1: [u8; 20] = [
    0x38, 0x76, 0x2c, 0xf7, 0xf5, 0x59, 0x34, 0xb3, 0x4d, 0x17, 0x9a, 0xe6, 0xa4, 0xc8, 0x0c, 0xad, 0xcc, 0xbb, 0x7f,
    0x0a,
];

pub fn crypto_error_for(_: ProtectionError) -> VarInt {
    crate::error::TransportError::AEAD_LIMIT_REACHED.code
}

#[cfg(test)]
mod tests {
    use super::*;

    struct XorMask(u8);
    impl HeaderProtectionMask for XorMask {
        fn mask(&self, sample: &[u8; SAMPLE_LEN]) -> [u8; 5] {
            let mut out = [0u8; 5];
            out.copy_from_slice(&[self.0 ^ sample[0], sample[1], sample[2], sample[3], sample[4]]);
            out
        }
    }

    #[test]
    fn apply_then_remove_is_identity() {
        let hp = XorMask(0xaa);
        let mut packet = alloc::vec![0u8; 32];
        packet[0] = 0xc3; // long header, pn_len bits = 3 (4 bytes)
        let pn_offset = 10;
        let pn_len = 4;

        let original = packet.clone();
        apply_header_protection(&hp, &mut packet, pn_offset, pn_len, true).unwrap();
        assert_ne!(packet[0], original[0]);

        let first_byte = remove_header_protection(&hp, &mut packet, pn_offset, 4, true).unwrap();
        assert_eq!(first_byte, original[0]);
        assert_eq!(packet[pn_offset..pn_offset + pn_len], original[pn_offset..pn_offset + pn_len]);
    }

    #[test]
    fn nonce_xors_packet_number_into_iv_tail() {
        let iv = [0u8; 12];
        let n = nonce(&iv, 0x1234);
        assert_eq!(&n[4..], &0x1234u64.to_be_bytes());
    }
}
