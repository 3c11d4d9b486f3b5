// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed configuration for a shadow client.
//!
//! Mirrors the recognized options of SPEC_FULL.md §6 (`KEEP_ALIVE`,
//! `CONNECT_TIMEOUT`, `SUBSCRIBE_TIMEOUT`, `QOS`, `MAX_CLIENT`,
//! `MAX_IN_FLIGHT_MESSAGE`, `MAX_SHADOW_PROPERTY_HANDLER`) as a struct built
//! through a fluent builder, following the shape of `MqttBrokerConfig`.

use std::time::Duration;

/// QoS level for both inbound and outbound shadow messages.
///
/// The protocol fixes this at `AtLeastOnce` (§6: "QoS for both directions is
/// 1"), but the level is still configurable for deployments against brokers
/// with different delivery guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    /// At most once.
    AtMostOnce,
    /// At least once (the protocol default).
    #[default]
    AtLeastOnce,
    /// Exactly once.
    ExactlyOnce,
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

/// Resource bounds and timeouts for a shadow client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowConfig {
    pub(crate) keep_alive: Duration,
    pub(crate) connect_timeout: Duration,
    pub(crate) subscribe_timeout: Duration,
    pub(crate) qos: QoS,
    pub(crate) max_in_flight_message: usize,
    pub(crate) max_shadow_property_handler: usize,
}

/// Process-wide bound on live clients, enforced by [`crate::registry::ClientRegistry`].
///
/// Not part of [`ShadowConfig`] because it governs the registry shared by
/// every client in the process, not any one client's own resource budget.
pub const MAX_CLIENT: usize = 64;

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            subscribe_timeout: Duration::from_secs(10),
            qos: QoS::AtLeastOnce,
            max_in_flight_message: 32,
            max_shadow_property_handler: 16,
        }
    }
}

impl ShadowConfig {
    /// Starts a builder seeded with the defaults.
    #[must_use]
    pub fn builder() -> ShadowConfigBuilder {
        ShadowConfigBuilder::default()
    }

    /// The MQTT keep-alive interval.
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// How long `connect()` waits for the broker to acknowledge `CONNECT`.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// How long `connect()` waits for the broker to acknowledge all subscriptions.
    #[must_use]
    pub fn subscribe_timeout(&self) -> Duration {
        self.subscribe_timeout
    }

    /// QoS used for publish and subscribe.
    #[must_use]
    pub fn qos(&self) -> QoS {
        self.qos
    }

    /// `MAX_IN_FLIGHT_MESSAGE`: the in-flight table's admission-control cap.
    #[must_use]
    pub fn max_in_flight_message(&self) -> usize {
        self.max_in_flight_message
    }

    /// `MAX_SHADOW_PROPERTY_HANDLER`: the delta registry's capacity.
    #[must_use]
    pub fn max_shadow_property_handler(&self) -> usize {
        self.max_shadow_property_handler
    }
}

/// Fluent builder for [`ShadowConfig`].
#[derive(Debug, Clone, Default)]
pub struct ShadowConfigBuilder {
    config: ShadowConfig,
}

impl ShadowConfigBuilder {
    /// Sets `KEEP_ALIVE`.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.config.keep_alive = keep_alive;
        self
    }

    /// Sets `CONNECT_TIMEOUT`.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets `SUBSCRIBE_TIMEOUT`.
    #[must_use]
    pub fn subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.config.subscribe_timeout = timeout;
        self
    }

    /// Sets `QOS`.
    #[must_use]
    pub fn qos(mut self, qos: QoS) -> Self {
        self.config.qos = qos;
        self
    }

    /// Sets `MAX_IN_FLIGHT_MESSAGE`.
    #[must_use]
    pub fn max_in_flight_message(mut self, max: usize) -> Self {
        self.config.max_in_flight_message = max;
        self
    }

    /// Sets `MAX_SHADOW_PROPERTY_HANDLER`.
    #[must_use]
    pub fn max_shadow_property_handler(mut self, max: usize) -> Self {
        self.config.max_shadow_property_handler = max;
        self
    }

    /// Finishes the builder, producing a [`ShadowConfig`].
    #[must_use]
    pub fn build(self) -> ShadowConfig {
        self.config
    }
}
