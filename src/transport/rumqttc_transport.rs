// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The real MQTT transport, backed by `rumqttc`.
//!
//! Grounded on `protocol/mqtt_broker.rs`: a unique client id per process
//! (an atomic counter plus the process id), an `AsyncClient`/`EventLoop`
//! pair, and a background task translating `rumqttc` events into
//! [`TransportEvent`]s over an `mpsc` channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS as RumqttcQoS};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace, warn};

use super::{Transport, TransportEvent};
use crate::config::QoS;
use crate::error::TransportError;

static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_client_id(device_name: &str) -> String {
    let n = CLIENT_ID_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("shadow-{device_name}-{}-{n}", std::process::id())
}

/// Parses a broker URL of the form `[mqtt://|tcp://]host:port` into its
/// host and port, defaulting to port 1883 if omitted.
fn parse_broker_url(url: &str) -> Result<(String, u16), TransportError> {
    let rest = url
        .trim_start_matches("mqtt://")
        .trim_start_matches("tcp://");

    match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| TransportError::InvalidBrokerUrl(url.to_string()))?;
            if host.is_empty() {
                return Err(TransportError::InvalidBrokerUrl(url.to_string()));
            }
            Ok((host.to_string(), port))
        }
        None if !rest.is_empty() => Ok((rest.to_string(), 1883)),
        None => Err(TransportError::InvalidBrokerUrl(url.to_string())),
    }
}

/// A `rumqttc`-backed [`Transport`].
pub struct RumqttcTransport {
    client: AsyncClient,
    // `rumqttc::EventLoop` is not `Clone` and must be polled from exactly
    // one task; stashing it here lets `new` be synchronous (matching
    // `Transport::connect` being the point at which polling actually
    // starts, as the trait's docs describe) while still owning it until
    // `connect` is called.
    event_loop: Mutex<Option<rumqttc::EventLoop>>,
}

impl RumqttcTransport {
    /// Builds the transport without starting the event loop.
    ///
    /// Unlike `protocol/mqtt.rs`'s fixed `sleep(500ms)` "to ensure the
    /// broker has processed CONNECT", this transport makes no such guess:
    /// `connect()` spawns the event-loop-draining task and returns a
    /// channel of [`TransportEvent`]s; the caller (`ShadowClient::connect`)
    /// waits on that channel for the first successful `ConnAck`-equivalent
    /// event the same way `mqtt_broker.rs` waits on its `oneshot` for
    /// `ConnAck`, rather than guessing with a blind sleep.
    pub fn new(
        broker_url: &str,
        device_name: &str,
        username: Option<&str>,
        password: Option<&str>,
        keep_alive: Duration,
    ) -> Result<Self, TransportError> {
        let (host, port) = parse_broker_url(broker_url)?;
        let client_id = unique_client_id(device_name);

        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(keep_alive);
        if let (Some(user), Some(pass)) = (username, password) {
            options.set_credentials(user, pass);
        }

        let (client, event_loop) = AsyncClient::new(options, 64);

        Ok(Self {
            client,
            event_loop: Mutex::new(Some(event_loop)),
        })
    }
}

fn spawn_event_loop(mut event_loop: rumqttc::EventLoop, tx: mpsc::Sender<TransportEvent>) {
    tokio::spawn(async move {
        loop {
            let outcome = match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    debug!("mqtt transport connected");
                    tx.send(TransportEvent::Connected).await
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    debug!("mqtt transport subscriptions acknowledged");
                    tx.send(TransportEvent::Subscribed).await
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    debug!("mqtt transport observed broker-initiated disconnect");
                    tx.send(TransportEvent::ConnectionLost).await
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    trace!(topic = %publish.topic, "mqtt transport inbound publish");
                    tx.send(TransportEvent::Message {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    })
                    .await
                }
                Ok(_) => {
                    trace!("mqtt transport event");
                    Ok(())
                }
                Err(err) => {
                    // rumqttc retries the connection internally on the next
                    // poll(); we only surface that the link dropped, not
                    // that the transport itself has given up.
                    warn!(error = %err, "mqtt transport connection error, will retry");
                    tx.send(TransportEvent::ConnectionLost).await
                }
            };

            if outcome.is_err() {
                // The receiver (and therefore the client) is gone.
                break;
            }
        }
    });
}

impl Transport for RumqttcTransport {
    async fn connect(&self) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        let event_loop = self
            .event_loop
            .lock()
            .await
            .take()
            .ok_or(TransportError::ChannelClosed)?;

        let (tx, rx) = mpsc::channel(64);
        spawn_event_loop(event_loop, tx);
        Ok(rx)
    }

    async fn subscribe_many(&self, topics: &[(String, QoS)]) -> Result<(), TransportError> {
        let filtered: Vec<(String, RumqttcQoS)> = topics
            .iter()
            .map(|(topic, qos)| (topic.clone(), (*qos).into()))
            .collect();
        self.client
            .subscribe_many(
                filtered
                    .into_iter()
                    .map(|(topic, qos)| rumqttc::SubscribeFilter::new(topic, qos)),
            )
            .await
            .map_err(TransportError::Client)
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), TransportError> {
        self.client
            .publish(topic, qos.into(), false, payload)
            .await
            .map_err(TransportError::Client)
    }

    async fn disconnect(&self) {
        if let Err(err) = self.client.disconnect().await {
            warn!(error = %err, "error disconnecting mqtt transport");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_broker_url_with_scheme_and_port() {
        let (host, port) = parse_broker_url("mqtt://192.168.1.50:1883").unwrap();
        assert_eq!(host, "192.168.1.50");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_broker_url_with_tcp_scheme() {
        let (host, port) = parse_broker_url("tcp://broker.local:8883").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 8883);
    }

    #[test]
    fn parse_broker_url_without_scheme_or_port_defaults() {
        let (host, port) = parse_broker_url("broker.local").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_broker_url_rejects_empty_host() {
        assert!(parse_broker_url("mqtt://:1883").is_err());
    }

    #[test]
    fn unique_client_id_differs_across_calls() {
        let a = unique_client_id("dev1");
        let b = unique_client_id("dev1");
        assert_ne!(a, b);
    }
}
