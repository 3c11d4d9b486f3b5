// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests against `mockforge-mqtt`: the raw connect/subscribe
//! plumbing of `RumqttcTransport`, run against a broker that actually
//! speaks the wire protocol instead of the in-process `FakeTransport`.
//!
//! NOTE: the mockforge-mqtt broker used here doesn't fully support pub/sub
//! forwarding between clients, so request/reply correlation, delta
//! dispatch, and the connection state machine are exercised instead in
//! `src/client.rs`'s unit tests against `FakeTransport`. For full
//! end-to-end testing with real message delivery, point `ShadowClientBuilder`
//! at a real broker such as Mosquitto.

use std::time::Duration;

use mockforge_mqtt::broker::MqttConfig;
use mockforge_mqtt::start_mqtt_server;
use shadow_client::{ConnectionState, ShadowClientBuilder};
use tokio::time::sleep;

/// Helper to find an available port for testing.
fn get_test_port() -> u16 {
    use std::sync::atomic::{AtomicU16, Ordering};
    static PORT_COUNTER: AtomicU16 = AtomicU16::new(18900);
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Starts a mock MQTT broker on the given port.
async fn start_mock_broker(port: u16) {
    let config = MqttConfig {
        port,
        host: "127.0.0.1".to_string(),
        ..Default::default()
    };

    tokio::spawn(async move {
        let _ = start_mqtt_server(config).await;
    });

    // Give the broker time to start, bind to port, and be ready to accept connections
    sleep(Duration::from_millis(500)).await;
}

mod connect_handshake {
    use super::*;

    #[tokio::test]
    async fn connect_reaches_ready_with_mqtt_scheme() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let broker_url = format!("mqtt://127.0.0.1:{port}");
        let client = ShadowClientBuilder::new(&broker_url, "shadow_test_device")
            .build()
            .await
            .expect("builder constructs transport");

        client.connect().await.expect("connect reaches READY");
        assert_eq!(client.state(), ConnectionState::Ready);

        client.destroy().await;
    }

    #[tokio::test]
    async fn connect_reaches_ready_with_tcp_scheme() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let broker_url = format!("tcp://127.0.0.1:{port}");
        let client = ShadowClientBuilder::new(&broker_url, "shadow_test_device_tcp")
            .build()
            .await
            .expect("builder constructs transport");

        client.connect().await.expect("connect reaches READY");
        assert_eq!(client.state(), ConnectionState::Ready);

        client.destroy().await;
    }

    #[tokio::test]
    async fn connect_reaches_ready_without_scheme() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let broker_url = format!("127.0.0.1:{port}");
        let client = ShadowClientBuilder::new(&broker_url, "shadow_test_device_bare")
            .build()
            .await
            .expect("builder constructs transport");

        client.connect().await.expect("connect reaches READY");
        assert_eq!(client.state(), ConnectionState::Ready);

        client.destroy().await;
    }

    #[tokio::test]
    async fn two_clients_get_distinct_client_ids_on_same_broker() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let broker_url = format!("mqtt://127.0.0.1:{port}");
        let a = ShadowClientBuilder::new(&broker_url, "device_a").build().await.unwrap();
        let b = ShadowClientBuilder::new(&broker_url, "device_b").build().await.unwrap();

        a.connect().await.expect("device_a connects");
        b.connect().await.expect("device_b connects");

        assert_eq!(a.state(), ConnectionState::Ready);
        assert_eq!(b.state(), ConnectionState::Ready);

        a.destroy().await;
        b.destroy().await;
    }
}

mod credentials {
    use super::*;

    #[tokio::test]
    async fn connect_with_credentials_against_broker_without_auth() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let broker_url = format!("mqtt://127.0.0.1:{port}");
        let client = ShadowClientBuilder::new(&broker_url, "device_with_creds")
            .credentials("device", "secret")
            .build()
            .await
            .unwrap();

        client.connect().await.expect("broker without auth still accepts CONNECT");
        assert_eq!(client.state(), ConnectionState::Ready);

        client.destroy().await;
    }
}
