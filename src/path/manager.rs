// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! Active connection ID sets and migration bookkeeping
//! (§4.7 "CID issuance", "CID retirement", "Migration").

use super::{validation::Validator, AmplificationLimiter};
use crate::{
    connection::id::{IssuedId, LocalId, PeerId, StatelessResetToken},
    error::TransportError,
    varint::VarInt,
};
use alloc::vec::Vec;

/// The set of connection IDs we have issued to our peer, addressable by
/// sequence number (§4.7 "CID issuance").
#[derive(Default)]
pub struct LocalIdRegistry {
    issued: Vec<IssuedId>,
    retire_prior_to: u64,
    peer_active_connection_id_limit: u64,
}

impl LocalIdRegistry {
    pub fn new(peer_active_connection_id_limit: u64) -> Self {
        Self {
            issued: Vec::new(),
            retire_prior_to: 0,
            peer_active_connection_id_limit,
        }
    }

    pub fn active_count(&self) -> usize {
        self.issued.iter().filter(|id| !id.retired).count()
    }

    /// Issues a new CID, failing if doing so would push the peer's active
    /// count past its advertised limit (§6.4 CONNECTION_ID_LIMIT_ERROR).
    pub fn issue(&mut self, sequence_number: VarInt, id: LocalId, token: StatelessResetToken) -> Result<(), TransportError> {
        if self.active_count() as u64 + 1 > self.peer_active_connection_id_limit {
            return Err(TransportError::CONNECTION_ID_LIMIT_ERROR);
        }
        self.issued.push(IssuedId {
            sequence_number,
            id,
            stateless_reset_token: Some(token),
            retired: false,
        });
        Ok(())
    }

    pub fn retire(&mut self, sequence_number: VarInt) {
        if let Some(entry) = self.issued.iter_mut().find(|e| e.sequence_number == sequence_number) {
            entry.retired = true;
        }
    }
}

/// What we know about a connection ID our peer issued to us
/// (§4.7 "CID issuance"/"CID retirement").
#[derive(Clone, Debug)]
struct PeerIssuedId {
    sequence_number: u64,
    id: PeerId,
    stateless_reset_token: Option<StatelessResetToken>,
    retired: bool,
}

/// Tracks the peer's connection IDs available for us to use as destination,
/// and the `Retire Prior To` watermark (§4.7 "CID retirement").
#[derive(Default)]
pub struct PeerIdRegistry {
    known: Vec<PeerIssuedId>,
    retire_prior_to: u64,
}

impl PeerIdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes a NEW_CONNECTION_ID frame, returning the sequence numbers
    /// that must now be retired because of an advancing `retire_prior_to`
    /// (§4.7: "MUST emit RETIRE_CONNECTION_ID for each seq in
    /// [oldest_active, RPT)").
    pub fn on_new_connection_id(
        &mut self,
        sequence_number: u64,
        id: PeerId,
        retire_prior_to: u64,
        token: StatelessResetToken,
    ) -> Result<Vec<u64>, TransportError> {
        if let Some(existing) = self.known.iter().find(|e| e.sequence_number == sequence_number) {
            let matches = existing.id == id && existing.stateless_reset_token.as_ref() == Some(&token);
            return if matches {
                Ok(Vec::new())
            } else {
                Err(TransportError::PROTOCOL_VIOLATION)
            };
        }

        self.known.push(PeerIssuedId {
            sequence_number,
            id,
            stateless_reset_token: Some(token),
            retired: false,
        });

        let mut newly_retired = Vec::new();
        if retire_prior_to > self.retire_prior_to {
            for entry in self.known.iter_mut() {
                if entry.sequence_number < retire_prior_to && !entry.retired {
                    entry.retired = true;
                    newly_retired.push(entry.sequence_number);
                }
            }
            self.retire_prior_to = retire_prior_to;
        }
        Ok(newly_retired)
    }

    /// Every stateless-reset token the peer has issued us, for matching
    /// against an otherwise-unparseable datagram (§4.8).
    pub fn tokens(&self) -> impl Iterator<Item = &StatelessResetToken> {
        self.known.iter().filter_map(|e| e.stateless_reset_token.as_ref())
    }

    /// Returns an unretired CID not equal to `avoid`, for use on a new
    /// path during migration (§4.7 "Migration").
    pub fn pick_unused(&self, avoid: Option<PeerId>) -> Option<PeerId> {
        self.known
            .iter()
            .find(|e| !e.retired && Some(e.id) != avoid)
            .map(|e| e.id)
    }

    pub fn on_retire_connection_id(&mut self, sequence_number: u64, used_destination_cid: PeerId) -> Result<(), TransportError> {
        let Some(entry) = self.known.iter_mut().find(|e| e.sequence_number == sequence_number) else {
            return Err(TransportError::PROTOCOL_VIOLATION);
        };
        if entry.id == used_destination_cid {
            return Err(TransportError::PROTOCOL_VIOLATION);
        }
        entry.retired = true;
        Ok(())
    }
}

/// One network path between the two endpoints: its validation state, its
/// anti-amplification budget while unvalidated, and the CIDs it uses
/// (§4.7, §9 "Timers required per connection": path validation per path).
pub struct Path {
    pub validator: Validator,
    pub amplification_limiter: AmplificationLimiter,
    pub peer_cid: PeerId,
    pub is_original: bool,
}

impl Path {
    pub fn new(peer_cid: PeerId, is_original: bool) -> Self {
        Self {
            validator: Validator::new(),
            amplification_limiter: AmplificationLimiter::default(),
            peer_cid,
            is_original,
        }
    }
}

/// Owns every known path for a connection plus the peer-issued CID set
/// migration draws replacement CIDs from.
#[derive(Default)]
pub struct PathManager {
    pub local_ids: LocalIdRegistry,
    pub peer_ids: PeerIdRegistry,
    paths: Vec<Path>,
    active_path: usize,
}

impl PathManager {
    pub fn new(peer_active_connection_id_limit: u64, initial_peer_cid: PeerId) -> Self {
        Self {
            local_ids: LocalIdRegistry::new(peer_active_connection_id_limit),
            peer_ids: PeerIdRegistry::new(),
            paths: alloc::vec![Path::new(initial_peer_cid, true)],
            active_path: 0,
        }
    }

    pub fn active_path(&self) -> &Path {
        &self.paths[self.active_path]
    }

    pub fn active_path_mut(&mut self) -> &mut Path {
        &mut self.paths[self.active_path]
    }

    /// Handles a non-probing packet from a new source address signalling
    /// migration: installs a new path using an as-yet-unused peer CID and
    /// begins path validation on it (§4.7 "Migration").
    pub fn on_migration_signal(&mut self) -> Result<(), TransportError> {
        let avoid = Some(self.active_path().peer_cid);
        let Some(new_cid) = self.peer_ids.pick_unused(avoid) else {
            return Err(TransportError::PROTOCOL_VIOLATION);
        };
        self.paths.push(Path::new(new_cid, false));
        self.active_path = self.paths.len() - 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer_id(tag: u8) -> PeerId {
        PeerId::try_from_bytes(&[tag; 8]).unwrap()
    }

    fn local_id(tag: u8) -> LocalId {
        LocalId::try_from_bytes(&[tag; 8]).unwrap()
    }

    #[test]
    fn issuing_past_peer_limit_is_connection_id_limit_error() {
        let mut reg = LocalIdRegistry::new(1);
        reg.issue(VarInt::from_u8(0), local_id(1), StatelessResetToken::new([0; 16])).unwrap();
        let err = reg.issue(VarInt::from_u8(1), local_id(2), StatelessResetToken::new([0; 16])).unwrap_err();
        assert_eq!(err, TransportError::CONNECTION_ID_LIMIT_ERROR);
    }

    #[test]
    fn duplicate_new_connection_id_is_idempotent() {
        let mut reg = PeerIdRegistry::new();
        let token = StatelessResetToken::new([1; 16]);
        reg.on_new_connection_id(0, peer_id(1), 0, token).unwrap();
        assert!(reg.on_new_connection_id(0, peer_id(1), 0, token).unwrap().is_empty());
    }

    #[test]
    fn conflicting_new_connection_id_for_same_sequence_is_protocol_violation() {
        let mut reg = PeerIdRegistry::new();
        reg.on_new_connection_id(0, peer_id(1), 0, StatelessResetToken::new([1; 16])).unwrap();
        let err = reg.on_new_connection_id(0, peer_id(2), 0, StatelessResetToken::new([1; 16])).unwrap_err();
        assert_eq!(err, TransportError::PROTOCOL_VIOLATION);
    }

    #[test]
    fn advancing_retire_prior_to_retires_older_sequences() {
        let mut reg = PeerIdRegistry::new();
        reg.on_new_connection_id(0, peer_id(1), 0, StatelessResetToken::new([1; 16])).unwrap();
        reg.on_new_connection_id(1, peer_id(2), 0, StatelessResetToken::new([2; 16])).unwrap();
        let retired = reg.on_new_connection_id(2, peer_id(3), 2, StatelessResetToken::new([3; 16])).unwrap();
        assert_eq!(retired, alloc::vec![0, 1]);
    }

    #[test]
    fn retiring_the_cid_used_as_destination_is_protocol_violation() {
        let mut reg = PeerIdRegistry::new();
        let id = peer_id(1);
        reg.on_new_connection_id(0, id, 0, StatelessResetToken::new([1; 16])).unwrap();
        let err = reg.on_retire_connection_id(0, id).unwrap_err();
        assert_eq!(err, TransportError::PROTOCOL_VIOLATION);
    }

    #[test]
    fn migration_picks_a_fresh_peer_cid() {
        let mut pm = PathManager::new(4, peer_id(1));
        pm.peer_ids.on_new_connection_id(1, peer_id(2), 0, StatelessResetToken::new([2; 16])).unwrap();
        pm.on_migration_signal().unwrap();
        assert_eq!(pm.active_path().peer_cid, peer_id(2));
        assert!(!pm.active_path().is_original);
    }
}
