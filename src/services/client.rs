//! Connection actor — one read task and one write task per socket.
//!
//! DESIGN
//! ======
//! The read side forwards every data frame to the hub tagged with this
//! client's id. The write side multiplexes three sources onto the socket:
//! the one-shot replay batch, the live broadcast queue and a keep-alive ping
//! timer. The replay branch is polled first so a joining client always
//! receives its history before live events queued behind it.
//!
//! LIFECYCLE
//! =========
//! 1. `serve` registers the client; the hub queues its replay batch
//! 2. Read loop runs until close, error, or a missed pong deadline
//! 3. Exit path always unregisters; the hub drops the handle
//! 4. Closed live queue → write side sends a close frame and exits
//! 5. Any failed or timed-out write ends the write side; once the read side
//!    is done the writer gets one `write_wait` to finish before it is aborted

use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::Message;
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::env_parse;
use crate::services::hub::HubHandle;

pub type ClientId = Uuid;

const DEFAULT_WS_WRITE_WAIT_MS: u64 = 10_000;
const DEFAULT_WS_PONG_WAIT_MS: u64 = 10_000;
const DEFAULT_WS_MAX_MESSAGE_BYTES: usize = 10 * 1024;
const DEFAULT_WS_SEND_QUEUE_CAPACITY: usize = 1028;

/// Per-connection limits and timers, loaded from environment variables.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionConfig {
    /// Upper bound on any single socket write.
    pub write_wait: Duration,
    /// Read deadline, extended each time a pong arrives.
    pub pong_wait: Duration,
    /// Interval between pings. Shorter than `pong_wait`.
    pub ping_period: Duration,
    /// Largest inbound message accepted by the upgrade.
    pub max_message_bytes: usize,
    /// Capacity of the live broadcast queue.
    pub send_queue_capacity: usize,
}

impl ConnectionConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_timing(
            Duration::from_millis(env_parse("WS_WRITE_WAIT_MS", DEFAULT_WS_WRITE_WAIT_MS)),
            Duration::from_millis(env_parse("WS_PONG_WAIT_MS", DEFAULT_WS_PONG_WAIT_MS)),
            env_parse("WS_MAX_MESSAGE_BYTES", DEFAULT_WS_MAX_MESSAGE_BYTES),
            env_parse("WS_SEND_QUEUE_CAPACITY", DEFAULT_WS_SEND_QUEUE_CAPACITY),
        )
    }

    fn with_timing(write_wait: Duration, pong_wait: Duration, max_message_bytes: usize, send_queue_capacity: usize) -> Self {
        Self {
            write_wait,
            pong_wait,
            ping_period: (pong_wait * 9 / 10).max(Duration::from_millis(1)),
            max_message_bytes,
            send_queue_capacity,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::with_timing(
            Duration::from_millis(DEFAULT_WS_WRITE_WAIT_MS),
            Duration::from_millis(DEFAULT_WS_PONG_WAIT_MS),
            DEFAULT_WS_MAX_MESSAGE_BYTES,
            DEFAULT_WS_SEND_QUEUE_CAPACITY,
        )
    }
}

// =============================================================================
// QUEUES
// =============================================================================

/// The hub's side of a connection.
#[derive(Clone, Debug)]
pub struct ClientHandle {
    pub id: ClientId,
    pub live: mpsc::Sender<Bytes>,
    pub replay: mpsc::Sender<Vec<Bytes>>,
}

/// The write task's side of a connection.
pub struct ClientQueues {
    pub live: mpsc::Receiver<Bytes>,
    pub replay: mpsc::Receiver<Vec<Bytes>>,
}

/// Create the paired queues for a new connection with a fresh id.
#[must_use]
pub fn client_channels(config: &ConnectionConfig) -> (ClientHandle, ClientQueues) {
    let (live_tx, live_rx) = mpsc::channel(config.send_queue_capacity.max(1));
    let (replay_tx, replay_rx) = mpsc::channel(1);
    let handle = ClientHandle { id: Uuid::new_v4(), live: live_tx, replay: replay_tx };
    (handle, ClientQueues { live: live_rx, replay: replay_rx })
}

// =============================================================================
// CONNECTION
// =============================================================================

/// Drive one upgraded socket until either side ends.
///
/// `S` is an upgraded [`axum::extract::ws::WebSocket`] outside tests.
pub async fn serve<S, E>(socket: S, hub: HubHandle, config: ConnectionConfig)
where
    S: Stream<Item = Result<Message, E>> + Sink<Message, Error = E> + Send + 'static,
    E: Display + Send + 'static,
{
    let (handle, queues) = client_channels(&config);
    let client_id = handle.id;

    if hub.register(handle).await.is_err() {
        warn!(%client_id, "ws: hub not running; dropping connection");
        return;
    }
    info!(%client_id, "ws: client connected");

    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(write_pump(client_id, sink, queues, config));

    let writer_done = tokio::select! {
        () = read_pump(client_id, stream, &hub, config.pong_wait) => false,
        _ = &mut writer => true,
    };

    let _ = hub.unregister(client_id).await;
    if !writer_done && timeout(config.write_wait, &mut writer).await.is_err() {
        writer.abort();
        debug!(%client_id, "ws: write side aborted");
    }
    info!(%client_id, "ws: client disconnected");
}

/// Forward inbound data frames to the hub until the connection ends.
///
/// Text frames are relayed as their UTF-8 bytes; the hub treats them like
/// any other payload.
pub async fn read_pump<S, E>(client_id: ClientId, mut stream: S, hub: &HubHandle, pong_wait: Duration)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let msg = match tokio::time::timeout_at(deadline, stream.next()).await {
            Err(_) => {
                info!(%client_id, "ws: pong deadline passed");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(%client_id, error = %e, "ws: read failed");
                break;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        match msg {
            Message::Binary(payload) => {
                if hub.inbound(client_id, payload).await.is_err() {
                    break;
                }
            }
            Message::Pong(_) => deadline = Instant::now() + pong_wait,
            Message::Text(text) => {
                let payload = Bytes::copy_from_slice(text.as_str().as_bytes());
                if hub.inbound(client_id, payload).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) => {}
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum WriteError {
    #[error("write timed out")]
    Timeout,
    #[error("{0}")]
    Transport(String),
}

async fn write_frame<S, E>(sink: &mut S, msg: Message, wait: Duration) -> Result<(), WriteError>
where
    S: Sink<Message, Error = E> + Unpin,
    E: Display,
{
    match tokio::time::timeout(wait, sink.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(WriteError::Transport(e.to_string())),
        Err(_) => Err(WriteError::Timeout),
    }
}

/// Write replay, live events and pings to the socket until the hub lets go
/// or a write fails.
pub async fn write_pump<S, E>(client_id: ClientId, mut sink: S, mut queues: ClientQueues, config: ConnectionConfig)
where
    S: Sink<Message, Error = E> + Unpin,
    E: Display,
{
    let mut ping = tokio::time::interval_at(Instant::now() + config.ping_period, config.ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            Some(batch) = queues.replay.recv() => {
                let total = batch.len();
                for (i, payload) in batch.into_iter().enumerate() {
                    if let Err(e) = write_frame(&mut sink, Message::Binary(payload), config.write_wait).await {
                        warn!(%client_id, error = %e, written = i, total, "ws: replay write failed");
                        return;
                    }
                }
                debug!(%client_id, total, "ws: replay written");
            }
            msg = queues.live.recv() => {
                let Some(payload) = msg else {
                    let _ = write_frame(&mut sink, Message::Close(None), config.write_wait).await;
                    break;
                };
                if let Err(e) = write_frame(&mut sink, Message::Binary(payload), config.write_wait).await {
                    warn!(%client_id, error = %e, "ws: live write failed");
                    break;
                }
            }
            _ = ping.tick() => {
                if let Err(e) = write_frame(&mut sink, Message::Ping(Bytes::new()), config.write_wait).await {
                    debug!(%client_id, error = %e, "ws: ping failed");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
