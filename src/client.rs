// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The shadow engine (C5) and inbound dispatcher (C6): the public surface
//! (`create`/`connect`/`update`/`get`/`delete`/`registerDelta`/`destroy`)
//! and the per-client state machine and message classification that drive
//! the in-flight table (C2) and delta registry (C3).
//!
//! Grounded on `protocol/mqtt.rs` and `protocol/mqtt_broker.rs` for the
//! connect/build pattern and the oneshot-channel "block until ready" idiom,
//! and on `device/mqtt_builder.rs` for the builder-with-entry-point shape.

use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::Mutex as SyncMutex;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ack::{Ack, Action, DeltaError};
use crate::config::{ShadowConfig, MAX_CLIENT};
use crate::delta::{DeltaCallback, DeltaHandlerId, DeltaRegistry, RegisterOutcome};
use crate::error::{Error, Result, TransportError};
use crate::inflight::{Callback, CompleteOutcome, InFlightTable, InsertOutcome};
use crate::reaper::{self, ReaperHandle};
use crate::registry::{AddOutcome, ClientId, ClientRegistry, Reapable};
use crate::topic::{Classified, TopicContract};
use crate::transport::{RumqttcTransport, Transport, TransportEvent};

/// The per-client connection/subscription state machine (SPEC_FULL.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; the initial state, and the state after a fatal error.
    Down,
    /// `connect()` has been called; waiting for the broker to acknowledge `CONNECT`.
    Connecting,
    /// Connected; waiting for the broker to acknowledge the subscription batch.
    Subscribing,
    /// Connected and subscribed; `update`/`get`/`delete`/`registerDelta` are accepted.
    Ready,
}

struct ConnectionInfo {
    state: ConnectionState,
    last_error: Option<String>,
}

/// Process-wide registry + reaper, shared by every [`ShadowClient`]
/// regardless of its transport type. Grounded on `protocol/broker_pool.rs`'s
/// `BrokerPool::global()` `OnceLock` singleton.
struct Global {
    registry: Arc<ClientRegistry>,
    _reaper: ReaperHandle,
}

static GLOBAL: OnceLock<Global> = OnceLock::new();

fn global() -> &'static Global {
    GLOBAL.get_or_init(|| {
        let registry = Arc::new(ClientRegistry::new(MAX_CLIENT));
        let reaper = reaper::spawn(registry.clone());
        Global { registry, _reaper: reaper }
    })
}

/// The client's private state (C1-C4 plus the connection state machine),
/// shared between the handle the caller holds and the background
/// dispatcher task.
pub(crate) struct ClientInner<T: Transport> {
    device_name: String,
    topics: TopicContract,
    inflight: InFlightTable,
    delta: DeltaRegistry,
    config: ShadowConfig,
    transport: Arc<T>,
    connection: SyncMutex<ConnectionInfo>,
}

impl<T: Transport> Reapable for ClientInner<T> {
    fn reap(&self, now: Instant) -> usize {
        self.inflight.reap(now)
    }
}

impl<T: Transport> Drop for ClientInner<T> {
    fn drop(&mut self) {
        // Best-effort fallback for callers who let every `ShadowClient`
        // handle go out of scope instead of calling `destroy()` — mirrors
        // `shared_mqtt_client.rs`'s `Drop` impl: spawn the async teardown
        // since `Drop::drop` cannot itself await.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let transport = self.transport.clone();
            handle.spawn(async move {
                transport.disconnect().await;
            });
        }
    }
}

impl<T: Transport> ClientInner<T> {
    fn new(device_name: String, transport: T, config: ShadowConfig) -> Self {
        let topics = TopicContract::new(&device_name);
        let inflight = InFlightTable::new(config.max_in_flight_message());
        let delta = DeltaRegistry::new(config.max_shadow_property_handler());
        Self {
            device_name,
            topics,
            inflight,
            delta,
            config,
            transport: Arc::new(transport),
            connection: SyncMutex::new(ConnectionInfo {
                state: ConnectionState::Down,
                last_error: None,
            }),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.connection.lock().state = state;
        debug!(device = %self.device_name, ?state, "shadow client state transition");
    }

    fn set_error(&self, error: String) {
        self.connection.lock().last_error = Some(error);
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection.lock().state
    }

    /// The last transport error recorded against this client, if any.
    pub fn last_error(&self) -> Option<String> {
        self.connection.lock().last_error.clone()
    }

    fn require_ready(&self) -> Result<()> {
        if self.state() == ConnectionState::Ready {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// C5's `*_send` contract: insert into the in-flight table **before**
    /// publishing, then publish.
    ///
    /// If publish fails after a successful insert, the slot is left
    /// occupied for the reaper rather than rolled back (SPEC_FULL.md §9
    /// open question 1, preserved as specified) — rolling back would race
    /// a reply the broker may already have dispatched before the local
    /// publish call reported failure.
    async fn send_request(
        &self,
        action: Action,
        mut body: Value,
        timeout_sec: u8,
        callback: Callback,
    ) -> Result<()> {
        self.require_ready()?;

        let request_id = Uuid::new_v4().to_string();
        body["requestId"] = Value::String(request_id.clone());

        match self.inflight.insert(
            request_id.clone(),
            action,
            callback,
            Duration::from_secs(u64::from(timeout_sec)),
        ) {
            InsertOutcome::Full => return Err(Error::TooManyInFlight),
            InsertOutcome::Ok => {}
        }

        let topic = self.topics.publish_topic(action).to_string();
        let payload = serde_json::to_vec(&body).expect("shadow request body is always serializable");

        if let Err(err) = self.transport.publish(&topic, payload, self.config.qos()).await {
            warn!(
                device = %self.device_name,
                request_id,
                error = %err,
                "publish failed after in-flight insert; slot left for reaper"
            );
        }

        Ok(())
    }

    /// Inbound dispatcher (C6): classify `topic`, route to the in-flight
    /// table or the delta registry.
    async fn dispatch_message(&self, topic: &str, payload: &[u8]) {
        if payload.len() < 3 {
            warn!(device = %self.device_name, topic, "dropping undersized shadow payload");
            return;
        }

        let value: Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(err) => {
                warn!(device = %self.device_name, topic, error = %err, "dropping malformed shadow payload");
                return;
            }
        };

        match self.topics.classify(topic) {
            Classified::Reply { action, accepted } => self.dispatch_reply(action, accepted, &value),
            Classified::Delta => self.dispatch_delta(&value).await,
            Classified::Unknown => {
                warn!(device = %self.device_name, topic, "dropping message on unrecognized topic");
            }
        }
    }

    fn dispatch_reply(&self, action: Action, accepted: bool, value: &Value) {
        let Some(request_id) = value.get("requestId").and_then(Value::as_str) else {
            warn!(device = %self.device_name, ?action, "reply missing requestId, dropping");
            return;
        };
        if request_id.len() > 64 {
            warn!(device = %self.device_name, "requestId exceeds 64 chars, dropping");
            return;
        }

        if let Some(recorded) = self.inflight.action_of(request_id) {
            if recorded != action {
                warn!(
                    device = %self.device_name,
                    request_id,
                    ?action,
                    ?recorded,
                    "reply action does not match the action the request was published under"
                );
            }
        }

        let ack = if accepted {
            Ack::accepted(value.clone())
        } else {
            let code = value.get("code").and_then(Value::as_str).unwrap_or_default();
            let message = value.get("message").and_then(Value::as_str).unwrap_or_default();
            Ack::rejected(code, message)
        };

        match self.inflight.complete(request_id, ack) {
            CompleteOutcome::Ok => {}
            CompleteOutcome::NoMatch => {
                warn!(device = %self.device_name, request_id, "no matching in-flight entry for reply");
            }
        }
    }

    async fn dispatch_delta(&self, value: &Value) {
        let Some(desired) = value.get("desired") else {
            warn!(device = %self.device_name, "delta message missing desired object, dropping");
            return;
        };

        if let Some(err) = self.delta.dispatch(desired) {
            let request_id = value.get("requestId").and_then(Value::as_str).unwrap_or_default();
            let rejection = json!({
                "requestId": request_id,
                "code": err.code,
                "message": err.message,
            });
            let payload = serde_json::to_vec(&rejection).expect("delta rejection is always serializable");
            let topic = self.topics.delta_rejected().to_string();
            if let Err(publish_err) = self.transport.publish(&topic, payload, self.config.qos()).await {
                warn!(device = %self.device_name, error = %publish_err, "failed to publish delta/rejected");
            }
        }
    }
}

/// Waits for `events_rx` to deliver an event matching `predicate`, within
/// `timeout`. Events that don't match (e.g. a stray message arriving before
/// the handshake completes) are discarded. Returns `Err(true)` on timeout,
/// `Err(false)` if the channel closed first.
async fn wait_for<F>(
    events_rx: &mut mpsc::Receiver<TransportEvent>,
    timeout: Duration,
    mut predicate: F,
) -> std::result::Result<(), bool>
where
    F: FnMut(&TransportEvent) -> bool,
{
    let wait = async {
        loop {
            match events_rx.recv().await {
                Some(event) if predicate(&event) => return Ok(()),
                Some(_) => {}
                None => return Err(false),
            }
        }
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(result) => result,
        Err(_) => Err(true),
    }
}

/// Steady-state dispatcher: owns the transport's event receiver for the
/// rest of the connection's life, routing messages and driving the state
/// machine through reconnects (SPEC_FULL.md §9 auto-reconnect semantics:
/// re-subscribe before re-entering `READY`).
async fn run_event_loop<T: Transport>(inner: Arc<ClientInner<T>>, mut events_rx: mpsc::Receiver<TransportEvent>) {
    while let Some(event) = events_rx.recv().await {
        match event {
            TransportEvent::Message { topic, payload } => {
                inner.dispatch_message(&topic, &payload).await;
            }
            TransportEvent::ConnectionLost => {
                warn!(device = %inner.device_name, "connection lost, returning to CONNECTING");
                inner.set_state(ConnectionState::Connecting);
            }
            TransportEvent::Connected => {
                debug!(device = %inner.device_name, "connected, re-subscribing before READY");
                inner.set_state(ConnectionState::Subscribing);
                let subs = inner.topics.subscriptions(inner.config.qos());
                if let Err(err) = inner.transport.subscribe_many(&subs).await {
                    warn!(device = %inner.device_name, error = %err, "subscribe failed after (re)connect");
                    inner.set_error(err.to_string());
                }
            }
            TransportEvent::Subscribed => {
                inner.set_state(ConnectionState::Ready);
            }
            TransportEvent::PublishFailed { topic, error } => {
                warn!(device = %inner.device_name, topic, error, "publish failed asynchronously");
            }
        }
    }
    debug!(device = %inner.device_name, "transport event channel closed, dispatcher exiting");
}

/// A handle to a device's shadow client. Cheaply `Clone`-able (an `Arc`
/// clone, following `DeviceManager`'s clone-the-handle idiom); every clone
/// shares the same underlying connection, in-flight table, and delta
/// registry.
pub struct ShadowClient<T: Transport = RumqttcTransport> {
    inner: Arc<ClientInner<T>>,
    registry_id: Arc<SyncMutex<Option<ClientId>>>,
}

impl<T: Transport> Clone for ShadowClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            registry_id: self.registry_id.clone(),
        }
    }
}

impl<T: Transport> ShadowClient<T> {
    /// Constructs a client directly from an already-built transport,
    /// registering it with the process-wide registry. Used by
    /// [`ShadowClientBuilder::build`] and, in tests, to wire up a
    /// [`crate::transport::FakeTransport`].
    ///
    /// The transport is not connected yet (`create(...) → client`,
    /// SPEC_FULL.md §4.5: "transport is not yet connected").
    pub fn from_transport(device_name: impl Into<String>, transport: T, config: ShadowConfig) -> Result<Self> {
        let inner = Arc::new(ClientInner::new(device_name.into(), transport, config));
        let dyn_inner: Arc<dyn Reapable> = inner.clone();

        let registry_id = match global().registry.add(&dyn_inner) {
            AddOutcome::Ok(id) => Some(id),
            AddOutcome::Full => return Err(Error::TooManyClients),
        };

        Ok(Self {
            inner,
            registry_id: Arc::new(SyncMutex::new(registry_id)),
        })
    }

    /// Current connection state (exposed mainly for tests and diagnostics;
    /// the public operations enforce `READY` themselves).
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// The last transport error recorded, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error()
    }

    /// Initiates the connection; resolves once the client reaches `READY`
    /// or a transport error is observed (SPEC_FULL.md §4.5/§4.6).
    pub async fn connect(&self) -> Result<()> {
        self.inner.set_state(ConnectionState::Connecting);

        let mut events_rx = self.inner.transport.connect().await.map_err(|err| {
            self.inner.set_state(ConnectionState::Down);
            self.inner.set_error(err.to_string());
            Error::Transport(err)
        })?;

        wait_for(&mut events_rx, self.inner.config.connect_timeout(), |event| {
            matches!(event, TransportEvent::Connected)
        })
        .await
        .map_err(|timed_out| {
            self.inner.set_state(ConnectionState::Down);
            let err = if timed_out {
                TransportError::ConnectTimeout(self.inner.config.connect_timeout().as_secs())
            } else {
                TransportError::ChannelClosed
            };
            self.inner.set_error(err.to_string());
            Error::Transport(err)
        })?;

        self.inner.set_state(ConnectionState::Subscribing);
        let subs = self.inner.topics.subscriptions(self.inner.config.qos());
        self.inner.transport.subscribe_many(&subs).await.map_err(|err| {
            self.inner.set_state(ConnectionState::Down);
            self.inner.set_error(err.to_string());
            Error::Transport(err)
        })?;

        wait_for(&mut events_rx, self.inner.config.subscribe_timeout(), |event| {
            matches!(event, TransportEvent::Subscribed)
        })
        .await
        .map_err(|timed_out| {
            self.inner.set_state(ConnectionState::Down);
            let err = if timed_out {
                TransportError::SubscribeTimeout(self.inner.config.subscribe_timeout().as_secs())
            } else {
                TransportError::ChannelClosed
            };
            self.inner.set_error(err.to_string());
            Error::Transport(err)
        })?;

        self.inner.set_state(ConnectionState::Ready);

        let inner = self.inner.clone();
        tokio::spawn(run_event_loop(inner, events_rx));

        Ok(())
    }

    /// Publishes `{reported, requestId}` on `<prefix>/update` and awaits the
    /// eventual [`Ack`] directly.
    pub async fn update(&self, reported: Value, timeout_sec: u8) -> Result<Ack> {
        self.send_and_await(Action::Update, json!({ "reported": reported }), timeout_sec).await
    }

    /// Like [`ShadowClient::update`], but delivers the result to `callback`
    /// instead of being awaited — for callers integrating with non-async code.
    pub async fn update_cb(
        &self,
        reported: Value,
        timeout_sec: u8,
        callback: impl Fn(Ack) + Send + Sync + 'static,
    ) -> Result<()> {
        self.inner
            .send_request(Action::Update, json!({ "reported": reported }), timeout_sec, Arc::new(callback))
            .await
    }

    /// Publishes `{requestId}` on `<prefix>/get` and awaits the eventual [`Ack`].
    pub async fn get(&self, timeout_sec: u8) -> Result<Ack> {
        self.send_and_await(Action::Get, json!({}), timeout_sec).await
    }

    /// Callback-based variant of [`ShadowClient::get`].
    pub async fn get_cb(&self, timeout_sec: u8, callback: impl Fn(Ack) + Send + Sync + 'static) -> Result<()> {
        self.inner.send_request(Action::Get, json!({}), timeout_sec, Arc::new(callback)).await
    }

    /// Publishes `{requestId}` on `<prefix>/delete` and awaits the eventual [`Ack`].
    pub async fn delete(&self, timeout_sec: u8) -> Result<Ack> {
        self.send_and_await(Action::Delete, json!({}), timeout_sec).await
    }

    /// Callback-based variant of [`ShadowClient::delete`].
    pub async fn delete_cb(&self, timeout_sec: u8, callback: impl Fn(Ack) + Send + Sync + 'static) -> Result<()> {
        self.inner.send_request(Action::Delete, json!({}), timeout_sec, Arc::new(callback)).await
    }

    async fn send_and_await(&self, action: Action, body: Value, timeout_sec: u8) -> Result<Ack> {
        let (tx, rx) = oneshot::channel();
        let tx = SyncMutex::new(Some(tx));
        let callback: Callback = Arc::new(move |ack| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(ack);
            }
        });

        self.inner.send_request(action, body, timeout_sec, callback).await?;
        rx.await.map_err(|_| Error::Transport(TransportError::ChannelClosed))
    }

    /// Appends a delta handler. `key = None` receives the whole `desired`
    /// object; `key = Some(k)` receives only the sub-object at `k` when
    /// present. Requires the `READY` state.
    pub fn register_delta(
        &self,
        key: Option<&str>,
        callback: impl Fn(Option<&str>, &Value) -> Option<DeltaError> + Send + Sync + 'static,
    ) -> Result<DeltaHandlerId> {
        self.inner.require_ready()?;
        let cb: DeltaCallback = Arc::new(callback);
        match self.inner.delta.register(key.map(str::to_string), cb) {
            RegisterOutcome::Ok(id) => Ok(id),
            RegisterOutcome::Full => Err(Error::TooManyDeltaHandlers),
        }
    }

    /// Removes this client from the process-wide registry and disconnects
    /// its transport. In-flight callbacks are **not** synthesized here —
    /// callers must not rely on callbacks firing after `destroy`
    /// (SPEC_FULL.md §4.5/§5).
    pub async fn destroy(self) {
        if let Some(id) = self.registry_id.lock().take() {
            global().registry.remove(id);
        }
        self.inner.transport.disconnect().await;
        self.inner.set_state(ConnectionState::Down);
    }
}

/// Fluent builder for a [`ShadowClient<RumqttcTransport>`], mirroring
/// `device/mqtt_builder.rs`'s `MqttDeviceBuilder`.
pub struct ShadowClientBuilder<T: Transport = RumqttcTransport> {
    broker: String,
    device_name: String,
    username: Option<String>,
    password: Option<String>,
    config: ShadowConfig,
    _transport: PhantomData<T>,
}

impl ShadowClientBuilder<RumqttcTransport> {
    /// Starts a builder for the given broker URL and device name.
    #[must_use]
    pub fn new(broker: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            device_name: device_name.into(),
            username: None,
            password: None,
            config: ShadowConfig::default(),
            _transport: PhantomData,
        }
    }

    /// Sets broker credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Overrides the default [`ShadowConfig`].
    #[must_use]
    pub fn config(mut self, config: ShadowConfig) -> Self {
        self.config = config;
        self
    }

    /// Constructs the client. Performs no I/O — the transport is built but
    /// not connected (`create(...) → client`, SPEC_FULL.md §4.5).
    ///
    /// # Errors
    ///
    /// Returns an error if the broker URL is malformed or the process-wide
    /// client registry is at `MAX_CLIENT` capacity.
    pub async fn build(self) -> Result<ShadowClient<RumqttcTransport>> {
        let transport = RumqttcTransport::new(
            &self.broker,
            &self.device_name,
            self.username.as_deref(),
            self.password.as_deref(),
            self.config.keep_alive(),
        )
        .map_err(Error::Transport)?;

        ShadowClient::from_transport(self.device_name, transport, self.config)
    }
}
