// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! An async client for a cloud IoT device-shadow service over MQTT.
//!
//! A "shadow" is a JSON document the cloud holds on a device's behalf:
//! `reported` state the device pushes up, `desired` state set from
//! elsewhere, and a `delta` the device is notified of when the two diverge.
//! This crate speaks the wire protocol (`baidu/iot/shadow/<device>/...`
//! topics, request/reply correlation by `requestId`) over an injected
//! [`Transport`], defaulting to [`RumqttcTransport`] for real brokers.
//!
//! # Components
//!
//! | Module | Responsibility |
//! |---|---|
//! | [`topic`] | Derives and classifies the eleven shadow topics for a device name |
//! | [`inflight`] | Correlates a published request with its eventual reply or timeout |
//! | [`delta`] | Dispatches `desired` deltas to registered property handlers |
//! | [`reaper`] | Process-wide background task expiring overdue in-flight requests |
//! | [`registry`] | Process-wide set of live clients, enumerated by the reaper |
//! | [`transport`] | The injected MQTT transport, real or fake |
//! | [`client`] | The public [`ShadowClient`] handle and its connection state machine |
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use shadow_client::{ShadowClientBuilder, ShadowConfig};
//!
//! #[tokio::main]
//! async fn main() -> shadow_client::Result<()> {
//!     let client = ShadowClientBuilder::new("mqtt://broker.local:1883", "thermostat-01")
//!         .credentials("device", "secret")
//!         .config(ShadowConfig::builder().max_in_flight_message(16).build())
//!         .build()
//!         .await?;
//!
//!     client.connect().await?;
//!
//!     let ack = client.update(json!({"targetTemp": 21.5}), 5).await?;
//!     println!("update acked: {ack:?}");
//!
//!     client.register_delta(Some("targetTemp"), |_key, desired| {
//!         println!("cloud wants targetTemp = {desired}");
//!         None
//!     })?;
//!
//!     client.destroy().await;
//!     Ok(())
//! }
//! ```

pub mod ack;
pub mod client;
pub mod config;
pub mod delta;
pub mod error;
pub mod inflight;
pub mod reaper;
pub mod registry;
pub mod topic;
pub mod transport;

pub use ack::{Ack, Action, DeltaError};
pub use client::{ConnectionState, ShadowClient, ShadowClientBuilder};
pub use config::{QoS, ShadowConfig, ShadowConfigBuilder, MAX_CLIENT};
pub use delta::DeltaHandlerId;
pub use error::{Error, ReturnCode, Result, TransportError};
pub use transport::{RumqttcTransport, Transport, TransportEvent};
