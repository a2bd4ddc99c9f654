use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::{ClientState, Shared};
use crate::{Endpoint, NetError};

// inbound data is only read to notice the peer going away
const SCRATCH_SIZE: usize = 100;

pub(super) struct Link {
    pub endpoint: Endpoint,
    pub retry_delay: Duration,
    pub shared: Arc<Shared>,
}

impl Link {
    /// Resolve, connect, pump, and start over on failure. Only returns by
    /// being dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<Vec<u8>>) {
        loop {
            self.shared.set_state(ClientState::Resolving);
            let addr = match self.resolve().await {
                Ok(addr) => addr,
                Err(e) => {
                    tracing::warn!("{}", e);
                    self.backoff(&mut rx).await;
                    continue;
                }
            };

            let stream = self.connect(addr, &mut rx).await;
            self.shared.set_state(ClientState::Established);
            self.shared.connections.fetch_add(1, Ordering::Relaxed);
            tracing::info!(%addr, "connected");

            let (reader, writer) = stream.into_split();
            let err = tokio::select! {
                e = watch(reader) => e,
                e = self.pump(writer, &mut rx) => e,
            };
            self.shared.set_state(ClientState::Resolving);
            tracing::warn!(%addr, "{}", err);
            self.backoff(&mut rx).await;
        }
    }

    async fn resolve(&self) -> Result<SocketAddr, NetError> {
        let authority = self.endpoint.authority();
        tracing::debug!(endpoint = %self.endpoint, "resolving");
        let mut addrs = tokio::net::lookup_host(authority)
            .await
            .map_err(|source| NetError::ResolutionFailure {
                endpoint: self.endpoint.clone(),
                source,
            })?;
        addrs.next().ok_or_else(|| NetError::ResolutionFailure {
            endpoint: self.endpoint.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
        })
    }

    /// Keep trying `addr` until it accepts. Connect failures never re-resolve.
    async fn connect(&self, addr: SocketAddr, rx: &mut mpsc::Receiver<Vec<u8>>) -> TcpStream {
        loop {
            self.shared.set_state(ClientState::Connecting);
            self.shared.connect_attempts.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%addr, "connecting");
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!("could not set TCP_NODELAY: {}", e);
                    }
                    return stream;
                }
                Err(source) => {
                    tracing::warn!("{}", NetError::ConnectionFailure { addr, source });
                    self.backoff(rx).await;
                }
            }
        }
    }

    /// Write queued buffers in order until the transport fails.
    async fn pump(&self, mut writer: OwnedWriteHalf, rx: &mut mpsc::Receiver<Vec<u8>>) -> NetError {
        while let Some(buf) = rx.recv().await {
            if let Err(e) = writer.write_all(&buf).await {
                self.shared.drop_bytes(buf.len());
                return NetError::TransportFailure(e);
            }
            self.shared
                .bytes_sent
                .fetch_add(buf.len() as u64, Ordering::Relaxed);
            tracing::trace!("wrote {} bytes", buf.len());
        }
        // every sender is gone, so the client is shutting down
        std::future::pending().await
    }

    /// Sleep out the retry delay, discarding anything queued meanwhile.
    async fn backoff(&self, rx: &mut mpsc::Receiver<Vec<u8>>) {
        self.flush_queue(rx);
        tokio::time::sleep(self.retry_delay).await;
        self.flush_queue(rx);
    }

    fn flush_queue(&self, rx: &mut mpsc::Receiver<Vec<u8>>) {
        while let Ok(buf) = rx.try_recv() {
            self.shared.drop_bytes(buf.len());
        }
    }
}

/// Read and discard until the peer closes or errors.
async fn watch(mut reader: OwnedReadHalf) -> NetError {
    let mut scratch = [0u8; SCRATCH_SIZE];
    loop {
        match reader.read(&mut scratch).await {
            Ok(0) => return NetError::peer_closed(),
            Ok(n) => tracing::trace!("discarded {} inbound bytes", n),
            Err(e) => return NetError::TransportFailure(e),
        }
    }
}
