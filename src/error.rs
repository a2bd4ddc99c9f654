//! Error types.
//!
//! [`BridgeError`] is what the host sees: contract violations returned
//! synchronously from [`VirtualDevice`](crate::VirtualDevice) calls.
//! [`NetError`] never leaves the streaming client; the event loop logs it
//! and retries.

use std::net::SocketAddr;

use crate::Endpoint;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// An operation that needs the streaming client ran before `prepare`.
    #[error("device not prepared")]
    NotPrepared,

    /// Channel areas do not describe one interleaved block.
    #[error("unsupported buffer layout: {reason}")]
    UnsupportedLayout {
        /// What was wrong with the areas.
        reason: String,
    },

    /// The interleaved block is smaller than the transfer asks for.
    #[error("buffer too short: need {needed} bytes, have {available}")]
    ShortBuffer {
        /// Bytes the transfer would read.
        needed: usize,
        /// Bytes actually available past the offset.
        available: usize,
    },

    /// Only playback is implemented.
    #[error("unsupported stream direction: {0:?}")]
    UnsupportedDirection(crate::Direction),

    /// The event loop thread could not be spawned.
    #[error("could not spawn streaming thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl BridgeError {
    pub fn layout(reason: impl Into<String>) -> Self {
        Self::UnsupportedLayout {
            reason: reason.into(),
        }
    }
}

/// Network faults seen by the streaming client's event loop.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("could not resolve {endpoint}: {source}")]
    ResolutionFailure {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    #[error("could not connect to {addr}: {source}")]
    ConnectionFailure {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("transport failure: {0}")]
    TransportFailure(#[source] std::io::Error),
}

impl NetError {
    pub(crate) fn peer_closed() -> Self {
        Self::TransportFailure(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed by peer",
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(BridgeError::NotPrepared.to_string(), "device not prepared");
        assert_eq!(
            BridgeError::layout("non-interleaved").to_string(),
            "unsupported buffer layout: non-interleaved"
        );
        let err = BridgeError::ShortBuffer {
            needed: 16,
            available: 8,
        };
        assert_eq!(err.to_string(), "buffer too short: need 16 bytes, have 8");
    }

    #[test]
    fn net_error_sources() {
        use std::error::Error;

        let err = NetError::ResolutionFailure {
            endpoint: Endpoint::new("nowhere.invalid", 4953),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such host"),
        };
        assert!(err.to_string().contains("tcp://nowhere.invalid:4953"));
        assert!(err.source().is_some());
        assert!(NetError::peer_closed().to_string().contains("closed by peer"));
    }
}
