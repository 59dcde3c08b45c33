//! Hub — ordering point for membership and broadcast.
//!
//! DESIGN
//! ======
//! One task owns the client registry. Registrations, departures, inbound
//! payloads, stats queries and shutdown all arrive on a single bounded queue
//! and are processed one at a time, so a client's registration is always
//! handled before anything it sends and every recipient sees the same order.
//!
//! An inbound payload is first handed to the collector (waiting until it is
//! accepted), then fanned out to every other client. The log order therefore
//! matches the hub's processing order.
//!
//! ERROR HANDLING
//! ==============
//! Delivery never blocks. A recipient whose queue is full or closed is
//! evicted: dropping its handle closes the live queue, which makes its write
//! task send a close frame. A failed replay read is counted and logged; the
//! joining client stays registered without history.

use std::collections::HashMap;
use std::ops::ControlFlow;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::env_parse;
use crate::services::client::{ClientHandle, ClientId};
use crate::services::collector::{CollectorHandle, ReplayScope};

const DEFAULT_HUB_QUEUE_CAPACITY: usize = 1024;

#[derive(Clone, Copy, Debug)]
pub struct HubConfig {
    /// Capacity of the hub event queue.
    pub queue_capacity: usize,
    /// History sent to each joining client.
    pub replay_scope: ReplayScope,
}

impl HubConfig {
    #[must_use]
    pub fn from_env(replay_scope: ReplayScope) -> Self {
        Self {
            queue_capacity: env_parse("HUB_QUEUE_CAPACITY", DEFAULT_HUB_QUEUE_CAPACITY),
            replay_scope,
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { queue_capacity: DEFAULT_HUB_QUEUE_CAPACITY, replay_scope: ReplayScope::default() }
    }
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
#[error("hub is not running")]
pub struct HubClosed;

/// Counters exposed at `GET /stats`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub clients: usize,
    pub inbound: u64,
    pub evictions: u64,
    pub replay_failures: u64,
}

pub(crate) enum HubEvent {
    Register(ClientHandle),
    Unregister(ClientId),
    Inbound { source: ClientId, payload: Bytes },
    Stats(oneshot::Sender<HubStats>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Clone, Copy, Debug)]
enum EvictReason {
    LiveQueueFull,
    LiveQueueClosed,
    ReplaySlotOccupied,
}

impl EvictReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::LiveQueueFull => "live queue full",
            Self::LiveQueueClosed => "live queue closed",
            Self::ReplaySlotOccupied => "replay slot occupied",
        }
    }
}

// =============================================================================
// HANDLE
// =============================================================================

#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubEvent>,
}

impl HubHandle {
    /// Add a client and queue its replay batch.
    ///
    /// # Errors
    ///
    /// Returns [`HubClosed`] if the hub loop has ended.
    pub async fn register(&self, client: ClientHandle) -> Result<(), HubClosed> {
        self.send(HubEvent::Register(client)).await
    }

    /// Remove a client. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`HubClosed`] if the hub loop has ended.
    pub async fn unregister(&self, id: ClientId) -> Result<(), HubClosed> {
        self.send(HubEvent::Unregister(id)).await
    }

    /// Persist `payload` and broadcast it to everyone except `source`.
    ///
    /// # Errors
    ///
    /// Returns [`HubClosed`] if the hub loop has ended.
    pub async fn inbound(&self, source: ClientId, payload: Bytes) -> Result<(), HubClosed> {
        self.send(HubEvent::Inbound { source, payload }).await
    }

    /// # Errors
    ///
    /// Returns [`HubClosed`] if the hub loop has ended.
    pub async fn stats(&self) -> Result<HubStats, HubClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(HubEvent::Stats(reply)).await?;
        rx.await.map_err(|_| HubClosed)
    }

    /// Drop every client and end the loop. No-op once the hub has stopped.
    pub async fn shutdown(&self) {
        let (ack, rx) = oneshot::channel();
        if self.send(HubEvent::Shutdown(ack)).await.is_ok() {
            let _ = rx.await;
        }
    }

    async fn send(&self, event: HubEvent) -> Result<(), HubClosed> {
        self.tx.send(event).await.map_err(|_| HubClosed)
    }
}

// =============================================================================
// PROCESSING LOOP
// =============================================================================

pub struct Hub {
    events: mpsc::Receiver<HubEvent>,
    clients: HashMap<ClientId, ClientHandle>,
    collector: CollectorHandle,
    replay_scope: ReplayScope,
    stats: HubStats,
}

impl Hub {
    #[must_use]
    pub fn new(collector: CollectorHandle, config: HubConfig) -> (Self, HubHandle) {
        let (tx, events) = mpsc::channel(config.queue_capacity.max(1));
        let hub = Self {
            events,
            clients: HashMap::new(),
            collector,
            replay_scope: config.replay_scope,
            stats: HubStats::default(),
        };
        (hub, HubHandle { tx })
    }

    /// Process events until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        info!(replay_scope = ?self.replay_scope, "hub: running");

        let mut ack = None;
        while let Some(event) = self.events.recv().await {
            if let ControlFlow::Break(done) = self.process(event).await {
                ack = Some(done);
                break;
            }
        }

        self.events.close();
        let dropped = self.clients.len();
        self.clients.clear();
        info!(dropped, "hub: stopped");

        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    async fn process(&mut self, event: HubEvent) -> ControlFlow<oneshot::Sender<()>> {
        match event {
            HubEvent::Register(client) => self.register(client).await,
            HubEvent::Unregister(id) => {
                if self.clients.remove(&id).is_some() {
                    info!(client_id = %id, clients = self.clients.len(), "hub: client unregistered");
                }
            }
            HubEvent::Inbound { source, payload } => self.inbound(source, payload).await,
            HubEvent::Stats(reply) => {
                let _ = reply.send(HubStats { clients: self.clients.len(), ..self.stats });
            }
            HubEvent::Shutdown(ack) => return ControlFlow::Break(ack),
        }
        ControlFlow::Continue(())
    }

    async fn register(&mut self, client: ClientHandle) {
        let id = client.id;
        let replay = client.replay.clone();
        self.clients.insert(id, client);
        info!(client_id = %id, clients = self.clients.len(), "hub: client registered");

        let history = match self.replay_scope {
            ReplayScope::Full => self.collector.read_all().await,
            ReplayScope::SinceLastClear => self.collector.read_since_last_clear().await,
        };
        let records = match history {
            Ok(records) => records,
            Err(e) => {
                self.stats.replay_failures += 1;
                error!(client_id = %id, error = %e, "hub: replay read failed; client joins without history");
                return;
            }
        };

        let count = records.len();
        match replay.try_send(records) {
            Ok(()) => debug!(client_id = %id, count, "hub: replay queued"),
            Err(TrySendError::Full(_)) => self.evict(id, EvictReason::ReplaySlotOccupied),
            Err(TrySendError::Closed(_)) => self.evict(id, EvictReason::LiveQueueClosed),
        }
    }

    async fn inbound(&mut self, source: ClientId, payload: Bytes) {
        self.stats.inbound += 1;

        if let Err(e) = self.collector.submit(payload.clone()).await {
            warn!(client_id = %source, error = %e, "hub: payload not persisted");
        }

        let mut evicted = Vec::new();
        for (id, client) in &self.clients {
            if *id == source {
                continue;
            }
            match client.live.try_send(payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => evicted.push((*id, EvictReason::LiveQueueFull)),
                Err(TrySendError::Closed(_)) => evicted.push((*id, EvictReason::LiveQueueClosed)),
            }
        }

        for (id, reason) in evicted {
            self.evict(id, reason);
        }
    }

    fn evict(&mut self, id: ClientId, reason: EvictReason) {
        if self.clients.remove(&id).is_some() {
            self.stats.evictions += 1;
            warn!(
                client_id = %id,
                reason = reason.as_str(),
                clients = self.clients.len(),
                "hub: client evicted"
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;

    /// A handle with no loop behind it; the receiver shows what was sent.
    pub(crate) fn detached_handle(capacity: usize) -> (HubHandle, mpsc::Receiver<HubEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (HubHandle { tx }, rx)
    }
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod tests;
