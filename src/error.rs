// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the shadow client.
//!
//! This module maps the return-code taxonomy of the shadow protocol onto a
//! layered [`thiserror`] hierarchy: synchronous failures (bad input,
//! capacity, state) are [`Error`] variants; request failures and timeouts
//! are delivered through [`crate::ack::Ack`] instead, never as an `Err`.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied argument failed validation (category 1).
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// The in-flight table is at `MAX_IN_FLIGHT_MESSAGE` capacity (category 2).
    #[error("too many in-flight messages")]
    TooManyInFlight,

    /// The delta handler registry is at `MAX_SHADOW_PROPERTY_HANDLER` capacity (category 2).
    #[error("too many shadow property handlers")]
    TooManyDeltaHandlers,

    /// The client registry is at `MAX_CLIENT` capacity.
    #[error("too many clients")]
    TooManyClients,

    /// An operation requiring the READY state was attempted before it was reached (category 3).
    #[error("client is not connected")]
    NotConnected,

    /// `complete()` was asked to resolve a request-id with no matching in-flight entry.
    ///
    /// This is returned to internal callers of [`crate::inflight::InFlightTable::complete`];
    /// it never crosses the public API, since an unmatched reply is a protocol
    /// anomaly (category 7 in the spec) that is logged and dropped, not raised.
    #[error("no matching in-flight message for request {0}")]
    NoMatchingInFlight(String),

    /// A transport-level failure (category 4): connect, subscribe, or publish failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl Error {
    /// The wire-level [`ReturnCode`] this error corresponds to.
    #[must_use]
    pub fn code(&self) -> ReturnCode {
        match self {
            Error::BadArgument(_) => ReturnCode::BadArgument,
            Error::TooManyInFlight => ReturnCode::TooManyInFlightMessage,
            Error::TooManyDeltaHandlers => ReturnCode::TooManyShadowPropertyHandler,
            Error::TooManyClients => ReturnCode::Failure,
            Error::NotConnected => ReturnCode::NotConnected,
            Error::NoMatchingInFlight(_) => ReturnCode::NoMatchingInFlightMessage,
            Error::Transport(_) => ReturnCode::Failure,
        }
    }
}

/// Errors from the injected MQTT transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying MQTT client rejected an operation.
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// The connection loop observed a fatal connection error.
    #[error("MQTT connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    /// The broker did not acknowledge `CONNECT` within `CONNECT_TIMEOUT`.
    #[error("connect timed out after {0}s")]
    ConnectTimeout(u64),

    /// The broker did not acknowledge all subscriptions within `SUBSCRIBE_TIMEOUT`.
    #[error("subscribe timed out after {0}s")]
    SubscribeTimeout(u64),

    /// The broker URL could not be parsed into host/port.
    #[error("invalid broker url: {0}")]
    InvalidBrokerUrl(String),

    /// The background event-loop task's channel to the client closed.
    #[error("transport event channel closed")]
    ChannelClosed,
}

/// The wire-level return codes named in the shadow protocol's external interface.
///
/// Kept for callers that want the original vocabulary (e.g. for logging
/// alongside a non-Rust counterpart service); idiomatic callers use
/// [`Error`]/[`crate::ack::Ack`] directly. `NullPointer` has no Rust code
/// path that can produce it — the type system rules out the null/dangling
/// references it denotes — and is retained only for completeness of the
/// wire vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    /// The operation succeeded.
    Success,
    /// An unspecified failure occurred.
    Failure,
    /// Unreachable from Rust; retained for wire-vocabulary completeness.
    NullPointer,
    /// A caller-supplied argument failed validation.
    BadArgument,
    /// The client is not in the READY state.
    NotConnected,
    /// The in-flight table is full.
    TooManyInFlightMessage,
    /// `complete()` found no matching in-flight entry.
    NoMatchingInFlightMessage,
    /// The delta handler registry is full.
    TooManyShadowPropertyHandler,
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReturnCode::Success => "SUCCESS",
            ReturnCode::Failure => "FAILURE",
            ReturnCode::NullPointer => "NULL_POINTER",
            ReturnCode::BadArgument => "BAD_ARGUMENT",
            ReturnCode::NotConnected => "NOT_CONNECTED",
            ReturnCode::TooManyInFlightMessage => "TOO_MANY_IN_FLIGHT_MESSAGE",
            ReturnCode::NoMatchingInFlightMessage => "NO_MATCHING_IN_FLIGHT_MESSAGE",
            ReturnCode::TooManyShadowPropertyHandler => "TOO_MANY_SHADOW_PROPERTY_HANDLER",
        };
        f.write_str(s)
    }
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
