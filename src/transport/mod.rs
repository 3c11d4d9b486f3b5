// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The transport abstraction (SPEC_FULL.md §6/§9): the shadow engine is
//! expressed against this trait rather than `rumqttc` directly, following
//! the source's call to make the transport an injected interface and the
//! teacher's own `protocol::Protocol` trait.

mod rumqttc_transport;

#[cfg(test)]
mod fake;

pub use rumqttc_transport::RumqttcTransport;
#[cfg(test)]
pub use fake::FakeTransport;

use tokio::sync::mpsc;

use crate::config::QoS;
use crate::error::TransportError;

/// An event the transport delivers asynchronously, outside the call/response
/// flow of [`Transport`]'s own methods.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The broker acknowledged the connection (the `ConnAck`-equivalent
    /// signal `ShadowClient::connect` waits for before subscribing).
    Connected,
    /// The broker acknowledged the subscription batch issued after `Connected`.
    Subscribed,
    /// The broker connection was lost; the dispatcher must return to
    /// `CONNECTING` and re-subscribe before re-entering `READY`.
    ConnectionLost,
    /// An inbound message arrived on a subscribed topic.
    Message { topic: String, payload: Vec<u8> },
    /// A previously-issued publish failed asynchronously.
    PublishFailed { topic: String, error: String },
}

/// The injected MQTT transport contract (SPEC_FULL.md §6).
///
/// Implementations hand back an [`mpsc::Receiver<TransportEvent>`] from
/// [`Transport::connect`] rather than exposing an `events()` stream
/// directly — matching the teacher's own `handle_broker_events`/`response_rx`
/// shape. The shadow engine (`ShadowClient<T>`) is generic over `T:
/// Transport`, the same way the teacher's `Device<C: Protocol>` is generic
/// over its protocol, so this trait never needs to be object-safe.
#[allow(async_fn_in_trait)]
pub trait Transport: Send + Sync {
    /// Connects to the broker, returning the event receiver the caller
    /// should poll for the remaining lifetime of the connection.
    async fn connect(&self) -> Result<mpsc::Receiver<TransportEvent>, TransportError>;

    /// Subscribes to every `(topic, qos)` pair. The protocol subscribes to
    /// all seven shadow reply topics in one call at connect time.
    async fn subscribe_many(&self, topics: &[(String, QoS)]) -> Result<(), TransportError>;

    /// Publishes `payload` to `topic` at `qos`.
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), TransportError>;

    /// Disconnects from the broker. Best-effort; used by `destroy`.
    async fn disconnect(&self);
}
