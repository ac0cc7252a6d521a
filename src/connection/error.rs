// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! The outcomes a connection can end in (§4.8 "Close & Stateless Reset").

use crate::{error::TransportError, varint::VarInt};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Initiator {
    Local,
    Remote,
}

/// Why a connection is no longer usable. Distinct from [`TransportError`],
/// which is only the wire-level error code: this also captures who closed
/// the connection and by what mechanism, since the close state machine and
/// the application surface care about that distinction (§4.8, §5
/// "Cancellation").
#[derive(Clone, Copy, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// A CONNECTION_CLOSE (transport 0x1c) was sent or received.
    Transport { error: TransportError, initiator: Initiator },
    /// A CONNECTION_CLOSE (application 0x1d) was sent or received.
    Application { error_code: VarInt, initiator: Initiator },
    /// A datagram matched a stored stateless-reset token (§4.8).
    StatelessReset,
    /// Neither side sent or received a packet within `max_idle_timeout`.
    IdleTimerExpired,
}

impl Error {
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Transport { initiator: Initiator::Local, .. } | Self::Application { initiator: Initiator::Local, .. }
        )
    }
}
