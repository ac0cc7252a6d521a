// Copyright quic-core contributors
// SPDX-License-Identifier: Apache-2.0

//! A sans-I/O QUIC version 1 protocol engine.
//!
//! This crate owns the machinery that must stay internally consistent for a
//! QUIC connection to function: packet and frame codecs, packet protection,
//! connection and stream state machines, handshake orchestration against an
//! external TLS collaborator, loss recovery bookkeeping, flow control,
//! connection ID lifecycle, and path validation/migration.
//!
//! It performs no socket or timer I/O. Callers drive the engine through the
//! suspension points on [`connection::Connection`] and [`endpoint::Endpoint`]:
//! feed in datagrams and timer ticks, read out the datagrams and events that
//! result.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod codec;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod packet;
pub mod path;
pub mod protection;
pub mod random;
pub mod recovery;
pub mod stateless_reset;
pub mod stream;
pub mod transport_parameters;
pub mod varint;

pub use varint::VarInt;
