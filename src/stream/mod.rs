//! Resilient streaming client.
//!
//! A [`StreamClient`] owns one TCP connection to an [`Endpoint`] and a
//! background thread running a single-threaded tokio runtime. The event
//! loop resolves, connects, sends and watches for the peer going away,
//! retrying after a fixed delay on any failure. The caller only ever sees
//! [`StreamClient::write`], which never blocks and never fails: bytes are
//! queued while connected and dropped otherwise.

mod event_loop;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::{BridgeError, Endpoint};

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Delay between a failure and the next attempt.
    pub retry_delay: Duration,
    /// Buffers queued for the event loop before writes start dropping.
    pub queue_depth: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(1),
            queue_depth: 64,
        }
    }
}

/// Where the connection state machine currently is.
///
/// While waiting out a retry delay the state is the one that will be
/// retried: `Resolving` after a resolve or transport failure, `Connecting`
/// after a connect failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Resolving,
    Connecting,
    Established,
}

impl ClientState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ClientState::Resolving,
            2 => ClientState::Connecting,
            3 => ClientState::Established,
            _ => ClientState::Idle,
        }
    }
}

/// Counters since the client was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub connect_attempts: u64,
    pub connections: u64,
    pub bytes_queued: u64,
    pub bytes_sent: u64,
    pub bytes_dropped: u64,
}

/// State shared between the caller and the event loop thread.
#[derive(Debug, Default)]
struct Shared {
    connected: AtomicBool,
    state: AtomicU8,
    connect_attempts: AtomicU64,
    connections: AtomicU64,
    bytes_queued: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_dropped: AtomicU64,
}

impl Shared {
    fn set_state(&self, state: ClientState) {
        self.state.store(state as u8, Ordering::Release);
        self.connected
            .store(state == ClientState::Established, Ordering::Release);
    }

    fn drop_bytes(&self, n: usize) {
        self.bytes_dropped.fetch_add(n as u64, Ordering::Relaxed);
    }
}

struct Running {
    thread: JoinHandle<()>,
    stop: oneshot::Sender<()>,
    tx: mpsc::Sender<Vec<u8>>,
}

pub struct StreamClient {
    endpoint: Endpoint,
    options: ClientOptions,
    shared: Arc<Shared>,
    running: Option<Running>,
}

impl StreamClient {
    pub fn new(endpoint: Endpoint, options: ClientOptions) -> Self {
        Self {
            endpoint,
            options,
            shared: Arc::new(Shared::default()),
            running: None,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .map(|r| !r.thread.is_finished())
            .unwrap_or(false)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ClientState {
        ClientState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> ClientStats {
        let s = &self.shared;
        ClientStats {
            connect_attempts: s.connect_attempts.load(Ordering::Relaxed),
            connections: s.connections.load(Ordering::Relaxed),
            bytes_queued: s.bytes_queued.load(Ordering::Relaxed),
            bytes_sent: s.bytes_sent.load(Ordering::Relaxed),
            bytes_dropped: s.bytes_dropped.load(Ordering::Relaxed),
        }
    }

    /// Launch the event loop. Does nothing if it is already running.
    pub fn start(&mut self) -> Result<(), BridgeError> {
        if self.is_running() {
            return Ok(());
        }
        // reap a loop that died on its own before starting a fresh one
        self.stop();

        tracing::debug!(endpoint = %self.endpoint, "starting stream client");
        let (tx, rx) = mpsc::channel(self.options.queue_depth.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        let shared = self.shared.clone();
        let endpoint = self.endpoint.clone();
        let retry_delay = self.options.retry_delay;

        shared.set_state(ClientState::Resolving);
        let thread = std::thread::Builder::new()
            .name("pcmbridge-stream".to_owned())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        tracing::error!("could not build stream runtime: {}", e);
                        shared.set_state(ClientState::Idle);
                        return;
                    }
                };
                let link = event_loop::Link {
                    endpoint,
                    retry_delay,
                    shared: shared.clone(),
                };
                rt.block_on(async move {
                    tokio::select! {
                        _ = stop_rx => {}
                        _ = link.run(rx) => {}
                    }
                });
                // the socket and timers went with the loop; a lookup stuck in
                // the resolver must not hold up stop()
                rt.shutdown_background();
                shared.set_state(ClientState::Idle);
            })
            .map_err(|e| {
                self.shared.set_state(ClientState::Idle);
                BridgeError::Spawn(e)
            })?;

        self.running = Some(Running {
            thread,
            stop: stop_tx,
            tx,
        });
        Ok(())
    }

    /// Cancel everything in flight and wait for the event loop to exit.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            tracing::debug!(endpoint = %self.endpoint, "stopping stream client");
            // the loop may already be gone, in which case there is no one to tell
            let _ = running.stop.send(());
            drop(running.tx);
            if running.thread.join().is_err() {
                tracing::error!("stream thread panicked");
            }
        }
        self.shared.set_state(ClientState::Idle);
    }

    /// Hand `data` to the event loop. Never blocks; drops when disconnected
    /// or when the send queue is full.
    pub fn write(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let running = match self.running {
            Some(ref r) if self.is_connected() => r,
            _ => {
                tracing::trace!("not connected, dropping {} bytes", data.len());
                self.shared.drop_bytes(data.len());
                return;
            }
        };
        match running.tx.try_send(data.to_vec()) {
            Ok(()) => {
                self.shared
                    .bytes_queued
                    .fetch_add(data.len() as u64, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(buf)) => {
                tracing::debug!("send queue full, dropping {} bytes", buf.len());
                self.shared.drop_bytes(buf.len());
            }
            Err(mpsc::error::TrySendError::Closed(buf)) => {
                self.shared.drop_bytes(buf.len());
            }
        }
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish()
    }
}
