//! Collector — single-owner append log of drawing events.
//!
//! DESIGN
//! ======
//! One task owns both file handles. Submissions, replay reads and the stop
//! request arrive on the same bounded command queue and are handled strictly
//! in arrival order, so a read observes every submission queued before it and
//! the log order equals the order in which the hub submitted.
//!
//! FORMAT
//! ======
//! `[u64 little-endian length][length bytes of payload]`, repeated to EOF.
//! No header, footer or checksum. Each record is written with a single
//! `write_all`, so a crash can only leave a truncated tail.
//!
//! ERROR HANDLING
//! ==============
//! Payloads that fail to decode are skipped, never fatal. Append I/O errors
//! are logged and the task keeps serving. A corrupt or truncated log aborts
//! the read with a descriptive error rather than returning a shortened
//! history.

use std::io::SeekFrom;
use std::path::Path;

use bytes::Bytes;
use events::Action;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::env_parse;

/// File name of the event log inside the message store directory.
pub const LOG_FILE_NAME: &str = "collected.bin";

const PREFIX_LEN: usize = 8;

const DEFAULT_COLLECTOR_QUEUE_CAPACITY: usize = 1;
const DEFAULT_COLLECTOR_MAX_RECORD_BYTES: u64 = 16 * 1024 * 1024;

/// Tuning knobs for the collector, loaded from environment variables.
#[derive(Clone, Copy, Debug)]
pub struct CollectorConfig {
    /// Command queue capacity. 1 keeps submission close to a hand-off.
    pub queue_capacity: usize,
    /// Largest record length accepted on read-back.
    pub max_record_bytes: u64,
}

impl CollectorConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            queue_capacity: env_parse("COLLECTOR_QUEUE_CAPACITY", DEFAULT_COLLECTOR_QUEUE_CAPACITY),
            max_record_bytes: env_parse("COLLECTOR_MAX_RECORD_BYTES", DEFAULT_COLLECTOR_MAX_RECORD_BYTES),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_COLLECTOR_QUEUE_CAPACITY,
            max_record_bytes: DEFAULT_COLLECTOR_MAX_RECORD_BYTES,
        }
    }
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("log i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("truncated length prefix at offset {offset}: read {read} of 8 bytes")]
    TruncatedPrefix { offset: u64, read: usize },
    #[error("truncated record at offset {offset}: expected {expected} bytes, read {read}")]
    TruncatedRecord { offset: u64, expected: u64, read: usize },
    #[error("record at offset {offset} claims {len} bytes (max {max})")]
    RecordTooLarge { offset: u64, len: u64, max: u64 },
    #[error("collector stopped")]
    Stopped,
}

/// Which part of the history a read returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReplayScope {
    /// Every persisted record.
    Full,
    /// The most recent clear marker and everything after it.
    #[default]
    SinceLastClear,
}

/// Lifecycle of the owning task. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectorState {
    Created,
    Running,
    Stopping,
    Stopped,
}

type ReadReply = oneshot::Sender<Result<Vec<Bytes>, CollectorError>>;

enum Command {
    Submit(Bytes),
    Read { scope: ReplayScope, reply: ReadReply },
    Stop(oneshot::Sender<()>),
}

// =============================================================================
// HANDLE
// =============================================================================

/// Requester side of the collector. Cheap to clone.
#[derive(Clone)]
pub struct CollectorHandle {
    tx: mpsc::Sender<Command>,
    state: watch::Receiver<CollectorState>,
}

impl CollectorHandle {
    /// Queue a payload for append. Returns once the collector has accepted it.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Stopped`] if the collector no longer accepts work.
    pub async fn submit(&self, payload: Bytes) -> Result<(), CollectorError> {
        self.tx
            .send(Command::Submit(payload))
            .await
            .map_err(|_| CollectorError::Stopped)
    }

    /// Every persisted payload, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an I/O or corruption error from the log, or `Stopped`.
    pub async fn read_all(&self) -> Result<Vec<Bytes>, CollectorError> {
        self.read(ReplayScope::Full).await
    }

    /// The last clear marker and every payload after it. Falls back to the
    /// full history when no clear was ever persisted.
    ///
    /// # Errors
    ///
    /// Same as [`CollectorHandle::read_all`].
    pub async fn read_since_last_clear(&self) -> Result<Vec<Bytes>, CollectorError> {
        self.read(ReplayScope::SinceLastClear).await
    }

    /// Read the history selected by `scope`.
    ///
    /// # Errors
    ///
    /// Same as [`CollectorHandle::read_all`].
    pub async fn read(&self, scope: ReplayScope) -> Result<Vec<Bytes>, CollectorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Read { scope, reply })
            .await
            .map_err(|_| CollectorError::Stopped)?;
        rx.await.map_err(|_| CollectorError::Stopped)?
    }

    /// Drain pending submissions, close the log and wait for completion.
    /// Calling this on a stopped collector is a no-op.
    pub async fn stop(&self) {
        let (ack, rx) = oneshot::channel();
        if self.tx.send(Command::Stop(ack)).await.is_err() {
            return;
        }
        let _ = rx.await;
    }

    #[must_use]
    pub fn state(&self) -> CollectorState {
        *self.state.borrow()
    }
}

// =============================================================================
// OWNING TASK
// =============================================================================

/// Owner of the log's write and read handles.
pub struct Collector<W, R> {
    writer: W,
    reader: R,
    commands: mpsc::Receiver<Command>,
    state: watch::Sender<CollectorState>,
    max_record_bytes: u64,
    appended: u64,
}

impl<W, R> Collector<W, R>
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + AsyncSeek + Unpin + Send + 'static,
{
    /// Build a collector in the `Created` state. Nothing runs until [`Collector::start`].
    pub fn new(writer: W, reader: R, config: CollectorConfig) -> (Self, CollectorHandle) {
        let (tx, commands) = mpsc::channel(config.queue_capacity.max(1));
        let (state, state_rx) = watch::channel(CollectorState::Created);
        let collector = Self {
            writer,
            reader,
            commands,
            state,
            max_record_bytes: config.max_record_bytes,
            appended: 0,
        };
        (collector, CollectorHandle { tx, state: state_rx })
    }

    /// Spawn the owning task.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        self.state.send_replace(CollectorState::Running);
        info!("collector: running");

        let mut acks = Vec::new();
        while let Some(command) = self.commands.recv().await {
            if let Some(ack) = self.handle(command).await {
                acks.push(ack);
                break;
            }
        }

        // PHASE: DRAIN
        // Anything already queued behind the stop request is still honoured.
        self.state.send_replace(CollectorState::Stopping);
        self.commands.close();
        while let Some(command) = self.commands.recv().await {
            acks.extend(self.handle(command).await);
        }

        if let Err(e) = self.close_writer().await {
            error!(error = %e, "collector: failed to close log writer");
        }
        self.state.send_replace(CollectorState::Stopped);
        info!(appended = self.appended, "collector: stopped");

        for ack in acks {
            let _ = ack.send(());
        }
    }

    /// Apply one command. Returns the acknowledgement channel of a stop request.
    async fn handle(&mut self, command: Command) -> Option<oneshot::Sender<()>> {
        match command {
            Command::Submit(payload) => {
                self.append(&payload).await;
                None
            }
            Command::Read { scope, reply } => {
                let result = self.read_records().await.map(|records| match scope {
                    ReplayScope::Full => records,
                    ReplayScope::SinceLastClear => since_last_clear(records),
                });
                if let Err(e) = &result {
                    error!(error = %e, ?scope, "collector: log read failed");
                }
                let _ = reply.send(result);
                None
            }
            Command::Stop(ack) => Some(ack),
        }
    }

    async fn append(&mut self, payload: &[u8]) {
        match events::decode_action(payload) {
            Ok(action) if !action.is_persistent() => {
                debug!(action = action.as_str(), "collector: skipping ephemeral event");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, len = payload.len(), "collector: skipping undecodable payload");
                return;
            }
        }

        let record = encode_record(payload);
        match self.write_record(&record).await {
            Ok(()) => self.appended += 1,
            Err(e) => error!(error = %e, len = payload.len(), "collector: append failed"),
        }
    }

    async fn write_record(&mut self, record: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(record).await?;
        self.writer.flush().await
    }

    async fn close_writer(&mut self) -> std::io::Result<()> {
        self.writer.flush().await?;
        self.writer.shutdown().await
    }

    async fn read_records(&mut self) -> Result<Vec<Bytes>, CollectorError> {
        self.reader.seek(SeekFrom::Start(0)).await?;
        read_records_from(BufReader::new(&mut self.reader), self.max_record_bytes).await
    }
}

// =============================================================================
// LOG FORMAT
// =============================================================================

/// Create the store directory and open the log for append and for reading.
///
/// # Errors
///
/// Returns an I/O error if the directory or file cannot be created or opened.
pub async fn open_log(dir: &Path) -> Result<(File, File), CollectorError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(LOG_FILE_NAME);

    let writer = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    let reader = File::open(&path).await?;

    info!(path = %path.display(), "collector: log opened");
    Ok((writer, reader))
}

/// Frame a payload as `[u64 LE length][payload]` in one buffer.
#[must_use]
pub fn encode_record(payload: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(PREFIX_LEN + payload.len());
    record.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    record.extend_from_slice(payload);
    record
}

/// Parse length-prefixed records until a clean end of stream.
async fn read_records_from<T>(mut reader: T, max_record_bytes: u64) -> Result<Vec<Bytes>, CollectorError>
where
    T: AsyncRead + Unpin,
{
    let mut records = Vec::new();
    let mut offset = 0u64;

    loop {
        let mut prefix = [0u8; PREFIX_LEN];
        let read = read_full(&mut reader, &mut prefix).await?;
        if read == 0 {
            break;
        }
        if read < PREFIX_LEN {
            return Err(CollectorError::TruncatedPrefix { offset, read });
        }

        let len = u64::from_le_bytes(prefix);
        let size = usize::try_from(len)
            .ok()
            .filter(|_| len <= max_record_bytes)
            .ok_or(CollectorError::RecordTooLarge { offset, len, max: max_record_bytes })?;
        let mut payload = vec![0u8; size];

        let read = read_full(&mut reader, &mut payload).await?;
        if read < payload.len() {
            return Err(CollectorError::TruncatedRecord { offset, expected: len, read });
        }

        records.push(Bytes::from(payload));
        offset += PREFIX_LEN as u64 + len;
    }

    Ok(records)
}

/// Fill `buf` unless the stream ends first. Returns the number of bytes read.
async fn read_full<T>(reader: &mut T, buf: &mut [u8]) -> std::io::Result<usize>
where
    T: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Keep the last clear marker and everything after it.
///
/// Scans backward; a record that does not decode is never a boundary. With no
/// marker at all the whole history is returned.
#[must_use]
pub fn since_last_clear(mut records: Vec<Bytes>) -> Vec<Bytes> {
    let boundary = records
        .iter()
        .rposition(|record| events::decode_action(record).is_ok_and(Action::is_boundary));
    match boundary {
        Some(start) => records.split_off(start),
        None => records,
    }
}

#[cfg(test)]
#[path = "collector_test.rs"]
mod tests;
