// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! An in-memory [`Transport`] for exercising the shadow engine and inbound
//! dispatcher without a broker.
//!
//! Grounded in SPEC_FULL.md §9's transport-abstraction note and the
//! teacher's own acknowledgment (in `tests/mqtt_integration.rs`) that its
//! mock broker can't forward pub/sub between clients — so callback/routing
//! logic there is tested via pure unit tests instead. This fake plays the
//! same role here: it hands the test full control over what "arrives" on
//! the wire, including injecting replies immediately after a publish and
//! simulating `ConnectionLost`.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Transport, TransportEvent};
use crate::config::QoS;
use crate::error::TransportError;

/// A publish record captured by [`FakeTransport`], for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPublish {
    pub topic: String,
    pub payload: Vec<u8>,
}

struct Inner {
    published: Vec<RecordedPublish>,
    subscribed: Vec<String>,
    events_tx: Option<mpsc::Sender<TransportEvent>>,
    disconnected: bool,
}

/// An in-memory transport a test can drive by hand: publish calls are
/// recorded rather than sent anywhere, and the test injects
/// [`TransportEvent`]s through [`FakeTransport::inject`] to simulate
/// broker replies, deltas, or connection loss.
#[derive(Clone)]
pub struct FakeTransport {
    inner: Arc<Mutex<Inner>>,
}

impl FakeTransport {
    /// Creates a fresh fake transport with nothing published or subscribed yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                published: Vec::new(),
                subscribed: Vec::new(),
                events_tx: None,
                disconnected: false,
            })),
        }
    }

    /// Sends `event` to the receiver handed back by [`Transport::connect`],
    /// as if the broker had delivered it.
    pub fn inject(&self, event: TransportEvent) {
        let tx = self.inner.lock().events_tx.clone();
        if let Some(tx) = tx {
            // `try_send` is fine: tests drive a bounded number of events
            // and assert on the outcome, so a full channel is a test bug,
            // not a condition to handle gracefully.
            tx.try_send(event).expect("fake transport event channel full");
        }
    }

    /// Every payload published so far, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<RecordedPublish> {
        self.inner.lock().published.clone()
    }

    /// Every topic subscribed to so far.
    #[must_use]
    pub fn subscribed(&self) -> Vec<String> {
        self.inner.lock().subscribed.clone()
    }

    /// True once [`Transport::disconnect`] has been called.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.inner.lock().disconnected
    }
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for FakeTransport {
    async fn connect(&self) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        let (tx, rx) = mpsc::channel(64);
        self.inner.lock().events_tx = Some(tx);
        Ok(rx)
    }

    async fn subscribe_many(&self, topics: &[(String, QoS)]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        inner.subscribed.extend(topics.iter().map(|(t, _)| t.clone()));
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, _qos: QoS) -> Result<(), TransportError> {
        self.inner.lock().published.push(RecordedPublish {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    async fn disconnect(&self) {
        self.inner.lock().disconnected = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_then_inject_is_observed_on_receiver() {
        let transport = FakeTransport::new();
        let mut rx = transport.connect().await.unwrap();

        transport.inject(TransportEvent::Message {
            topic: "baidu/iot/shadow/dev1/update/accepted".to_string(),
            payload: b"{}".to_vec(),
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, TransportEvent::Message { .. }));
    }

    #[tokio::test]
    async fn publish_is_recorded() {
        let transport = FakeTransport::new();
        transport
            .publish("topic/a", b"payload".to_vec(), QoS::AtLeastOnce)
            .await
            .unwrap();

        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "topic/a");
        assert_eq!(published[0].payload, b"payload");
    }

    #[tokio::test]
    async fn subscribe_many_is_recorded() {
        let transport = FakeTransport::new();
        transport
            .subscribe_many(&[("a".to_string(), QoS::AtLeastOnce), ("b".to_string(), QoS::AtLeastOnce)])
            .await
            .unwrap();

        assert_eq!(transport.subscribed(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn disconnect_is_observable() {
        let transport = FakeTransport::new();
        assert!(!transport.is_disconnected());
        transport.disconnect().await;
        assert!(transport.is_disconnected());
    }
}
