// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! Key schedule, per-epoch key material, and 1-RTT key update (§4.2).

use super::{Aead, HeaderProtectionMask, ProtectionError};
use alloc::{boxed::Box, vec::Vec};
use zeroize::Zeroize;

/// The HKDF collaborator used to derive per-level secrets and keys. Kept
/// separate from [`Aead`] because the same HKDF hash (SHA-256 for the AEADs
/// QUIC v1 defines) derives material for all four levels.
pub trait Hkdf {
    fn extract(&self, salt: &[u8], ikm: &[u8]) -> Vec<u8>;
    fn expand_label(&self, secret: &[u8], label: &[u8], out_len: usize) -> Vec<u8>;
    fn hash_len(&self) -> usize;
}

/// Key material for one direction of one encryption level, zeroized on
/// drop so discarded keys don't linger in memory (§4.2 "Key discard",
/// §9 "Key material").
pub struct DirectionalKeys {
    secret: Vec<u8>,
    aead: Box<dyn Aead>,
    header_protection: Box<dyn HeaderProtectionMask>,
    /// Packets sealed or opened under this key. Compared against the
    /// AEAD's confidentiality/integrity limit (§4.2, §6.4).
    use_count: u64,
    use_limit: u64,
}

impl DirectionalKeys {
    pub fn new(
        secret: Vec<u8>,
        aead: Box<dyn Aead>,
        header_protection: Box<dyn HeaderProtectionMask>,
        use_limit: u64,
    ) -> Self {
        Self {
            secret,
            aead,
            header_protection,
            use_count: 0,
            use_limit,
        }
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    pub fn header_protection(&self) -> &dyn HeaderProtectionMask {
        self.header_protection.as_ref()
    }

    pub fn tag_len(&self) -> usize {
        self.aead.tag_len()
    }

    pub fn record_use(&mut self) -> Result<(), ProtectionError> {
        self.use_count += 1;
        if self.use_count > self.use_limit {
            return Err(ProtectionError::UseLimitReached);
        }
        Ok(())
    }

    pub fn seal(
        &mut self,
        nonce: &[u8; 12],
        header: &[u8],
        payload: &mut Vec<u8>,
    ) -> Result<(), ProtectionError> {
        self.record_use()?;
        self.aead.seal(nonce, header, payload)
    }

    pub fn open(
        &mut self,
        nonce: &[u8; 12],
        header: &[u8],
        payload: &mut Vec<u8>,
    ) -> Result<(), ProtectionError> {
        self.record_use()?;
        self.aead.open(nonce, header, payload)
    }
}

impl Zeroize for DirectionalKeys {
    #[inline]
    fn zeroize(&mut self) {
        self.secret.zeroize();
    }
}

impl Drop for DirectionalKeys {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl core::fmt::Debug for DirectionalKeys {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "DirectionalKeys(use_count={})", self.use_count)
    }
}

/// A factory that turns a derived secret into `DirectionalKeys`, supplied
/// by the caller's chosen cipher suite (the AEAD/HP primitives themselves
/// are out of scope here).
pub trait KeyMaterialFactory {
    fn aead_key_len(&self) -> usize;
    fn header_protection_key_len(&self) -> usize;
    fn use_limit(&self) -> u64;
    fn build_aead(&self, key: &[u8]) -> Box<dyn Aead>;
    fn build_header_protection(&self, key: &[u8]) -> Box<dyn HeaderProtectionMask>;
}

/// Derives `key`, `iv`, and `hp` from a secret via HKDF-Expand-Label, and
/// bundles them into [`DirectionalKeys`] (§4.2 "Key schedule").
pub fn derive_directional_keys(
    hkdf: &dyn Hkdf,
    factory: &dyn KeyMaterialFactory,
    secret: Vec<u8>,
) -> (DirectionalKeys, Vec<u8>) {
    let key = hkdf.expand_label(&secret, b"quic key", factory.aead_key_len());
    let iv = hkdf.expand_label(&secret, b"quic iv", 12);
    let hp = hkdf.expand_label(&secret, b"quic hp", factory.header_protection_key_len());

    let aead = factory.build_aead(&key);
    let header_protection = factory.build_header_protection(&hp);

    let keys = DirectionalKeys::new(secret.clone(), aead, header_protection, factory.use_limit());
    (keys, iv)
}

/// Derives the version-1 Initial secrets for both directions from the
/// client's first destination CID (§4.2).
pub fn initial_secrets(hkdf: &dyn Hkdf, destination_connection_id: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let initial_secret = hkdf.extract(&super::INITIAL_SALT_V1, destination_connection_id);
    let client = hkdf.expand_label(&initial_secret, b"client in", hkdf.hash_len());
    let server = hkdf.expand_label(&initial_secret, b"server in", hkdf.hash_len());
    (client, server)
}

/// 1-RTT key update state: tracks the current key phase and whether we are
/// allowed to initiate another update yet (§4.2 "Key update").
#[derive(Debug, Eq, PartialEq)]
pub enum KeyUpdatePhase {
    /// No packet in the current phase has been acknowledged yet; updating
    /// again is forbidden (rule b).
    AwaitingAck,
    /// At least one packet in the current phase has been acknowledged, and
    /// we have sent something in it; updating is permitted.
    Ready,
}

pub struct KeyUpdateError;

/// Derives the next 1-RTT secret from the current one via
/// HKDF-Expand-Label(secret, "quic ku", "", hash_len) (§4.2).
pub fn next_secret(hkdf: &dyn Hkdf, current_secret: &[u8]) -> Vec<u8> {
    hkdf.expand_label(current_secret, b"quic ku", hkdf.hash_len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protection::SAMPLE_LEN;

    struct NullAead;
    impl Aead for NullAead {
        fn seal(&mut self, _: &[u8; 12], _: &[u8], payload: &mut Vec<u8>) -> Result<(), ProtectionError> {
            payload.extend_from_slice(&[0u8; 16]);
            Ok(())
        }
        fn open(&mut self, _: &[u8; 12], _: &[u8], payload: &mut Vec<u8>) -> Result<(), ProtectionError> {
            if payload.len() < 16 {
                return Err(ProtectionError::DecryptionFailed);
            }
            let new_len = payload.len() - 16;
            payload.truncate(new_len);
            Ok(())
        }
        fn tag_len(&self) -> usize {
            16
        }
    }

    struct NullHp;
    impl HeaderProtectionMask for NullHp {
        fn mask(&self, _sample: &[u8; SAMPLE_LEN]) -> [u8; 5] {
            [0; 5]
        }
    }

    #[test]
    fn use_limit_is_enforced() {
        let mut keys = DirectionalKeys::new(Vec::new(), Box::new(NullAead), Box::new(NullHp), 2);
        let nonce = [0u8; 12];
        let mut payload = Vec::new();
        keys.seal(&nonce, &[], &mut payload).unwrap();
        keys.seal(&nonce, &[], &mut payload).unwrap();
        assert!(matches!(
            keys.seal(&nonce, &[], &mut payload),
            Err(ProtectionError::UseLimitReached)
        ));
    }
}
