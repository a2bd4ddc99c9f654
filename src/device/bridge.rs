use std::time::Instant;

use parking_lot::Mutex;

use super::pacer::{sleep_until, PacingClock};
use super::{interleaved_region, Capabilities, ChannelArea, Direction, HwParams, OpenMode};
use crate::{
    BridgeConfig, BridgeError, ClientOptions, ClientState, ClientStats, Endpoint, StreamClient,
    VirtualDevice,
};

/// A [`VirtualDevice`] that forwards playback to a remote sink over TCP.
pub struct Bridge {
    endpoint: Endpoint,
    options: ClientOptions,
    capabilities: Capabilities,
    pace: bool,
    state: Mutex<BridgeState>,
}

#[derive(Default)]
struct BridgeState {
    clock: PacingClock,
    started: bool,
    prepared: Option<Prepared>,
    /// Bumped by `close`, so a transfer still sleeping from before can tell
    /// its frames belong to a session that is gone.
    session: u64,
}

struct Prepared {
    client: StreamClient,
    params: HwParams,
}

impl Bridge {
    pub fn open(
        config: &BridgeConfig,
        direction: Direction,
        mode: OpenMode,
    ) -> Result<Self, BridgeError> {
        tracing::info!(
            ?direction,
            ?mode,
            format = %config.format,
            endpoint = %config.endpoint,
            "opening bridge"
        );
        if direction != Direction::Playback {
            return Err(BridgeError::UnsupportedDirection(direction));
        }
        // some hosts open non-blocking yet still expect to be paced
        let pace = mode == OpenMode::Blocking || config.pace_nonblocking;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            options: config.client.clone(),
            capabilities: Capabilities::for_format(&config.format),
            pace,
            state: Mutex::new(BridgeState::default()),
        })
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn frames_written(&self) -> u64 {
        self.state.lock().clock.frames_written()
    }

    pub fn client_state(&self) -> ClientState {
        self.state
            .lock()
            .prepared
            .as_ref()
            .map(|p| p.client.state())
            .unwrap_or(ClientState::Idle)
    }

    pub fn stats(&self) -> Option<ClientStats> {
        self.state.lock().prepared.as_ref().map(|p| p.client.stats())
    }
}

impl BridgeState {
    fn prepared(&mut self) -> Result<&mut Prepared, BridgeError> {
        self.prepared.as_mut().ok_or(BridgeError::NotPrepared)
    }

    fn start(&mut self) -> Result<(), BridgeError> {
        let prepared = self.prepared.as_mut().ok_or(BridgeError::NotPrepared)?;
        prepared.client.start()?;
        self.clock.rearm();
        self.started = true;
        Ok(())
    }
}

impl VirtualDevice for Bridge {
    fn prepare(&self, params: &HwParams) -> Result<(), BridgeError> {
        let mut state = self.state.lock();
        tracing::info!(
            format = %params.format,
            buffer_size = params.buffer_size,
            period_size = params.period_size,
            "prepare"
        );
        if let Some(ref mut prepared) = state.prepared {
            prepared.params = *params;
            return Ok(());
        }
        state.prepared = Some(Prepared {
            client: StreamClient::new(self.endpoint.clone(), self.options.clone()),
            params: *params,
        });
        Ok(())
    }

    fn start(&self) -> Result<(), BridgeError> {
        let mut state = self.state.lock();
        tracing::info!("start");
        state.start()
    }

    fn stop(&self) -> Result<(), BridgeError> {
        let mut state = self.state.lock();
        tracing::info!("stop");
        state.prepared()?.client.stop();
        state.started = false;
        Ok(())
    }

    fn pointer(&self) -> Result<u64, BridgeError> {
        let mut state = self.state.lock();
        let buffer_size = state.prepared()?.params.buffer_size;
        let pos = state.clock.pointer(buffer_size);
        tracing::trace!("pointer: {}", pos);
        Ok(pos)
    }

    fn transfer(
        &self,
        areas: &[ChannelArea<'_>],
        offset: usize,
        frames: usize,
    ) -> Result<usize, BridgeError> {
        let (session, deadline) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let format = state.prepared()?.params.format;
            if frames == 0 {
                return Ok(0);
            }
            tracing::trace!(offset, frames, "transfer");

            let region = interleaved_region(areas, format.bytes_per_frame(), offset, frames)?;
            if !state.started {
                // playback starts implicitly on the first write
                state.start()?;
            }
            state.prepared()?.client.write(region);
            let deadline = state
                .clock
                .advance(frames as u64, format.rate(), Instant::now());
            (state.session, deadline)
        };

        // the lock is not held while sleeping, so pointer() stays responsive
        if self.pace {
            sleep_until(deadline);
        }

        let mut state = self.state.lock();
        if state.session == session {
            state.clock.commit(frames as u64);
        } else {
            tracing::debug!(frames, "device closed during transfer, not counting");
        }
        Ok(frames)
    }

    fn close(&self) -> Result<(), BridgeError> {
        let mut state = self.state.lock();
        tracing::info!("close");
        if let Some(mut prepared) = state.prepared.take() {
            prepared.client.stop();
        }
        *state = BridgeState {
            session: state.session.wrapping_add(1),
            ..BridgeState::default()
        };
        Ok(())
    }

    fn drain(&self) -> Result<(), BridgeError> {
        let _state = self.state.lock();
        // nothing acknowledges delivery, so there is nothing to wait for
        tracing::info!("drain");
        Ok(())
    }

    fn pause(&self, enable: bool) -> Result<(), BridgeError> {
        let _state = self.state.lock();
        tracing::info!(enable, "pause");
        Ok(())
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("endpoint", &self.endpoint)
            .field("pace", &self.pace)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::SampleFormat;

    fn config() -> BridgeConfig {
        BridgeConfig {
            // nothing listens on the discard port in test environments
            endpoint: Endpoint::new("127.0.0.1", 9),
            client: ClientOptions {
                retry_delay: Duration::from_millis(50),
                queue_depth: 4,
            },
            ..BridgeConfig::default()
        }
    }

    fn params(buffer_size: u64) -> HwParams {
        HwParams {
            format: SampleFormat::new(48000, 16, 2).unwrap(),
            buffer_size,
            period_size: buffer_size / 2,
        }
    }

    #[test]
    fn capture_is_refused() {
        assert!(matches!(
            Bridge::open(&config(), Direction::Capture, OpenMode::Blocking),
            Err(BridgeError::UnsupportedDirection(Direction::Capture))
        ));
    }

    #[test]
    fn needs_prepare() {
        let bridge = Bridge::open(&config(), Direction::Playback, OpenMode::Blocking).unwrap();
        let data = [0u8; 16];
        let areas = ChannelArea::interleaved(&data, &params(8).format);
        assert!(matches!(bridge.start(), Err(BridgeError::NotPrepared)));
        assert!(matches!(bridge.stop(), Err(BridgeError::NotPrepared)));
        assert!(matches!(bridge.pointer(), Err(BridgeError::NotPrepared)));
        assert!(matches!(
            bridge.transfer(&areas, 0, 4),
            Err(BridgeError::NotPrepared)
        ));
        assert!(bridge.drain().is_ok());
        assert!(bridge.pause(true).is_ok());
        assert!(bridge.close().is_ok());
    }

    #[test]
    fn zero_frames_is_free() {
        let bridge = Bridge::open(&config(), Direction::Playback, OpenMode::Blocking).unwrap();
        bridge.prepare(&params(1024)).unwrap();
        let start = Instant::now();
        assert_eq!(bridge.transfer(&[], 0, 0).unwrap(), 0);
        assert!(start.elapsed() < Duration::from_millis(20));
        assert_eq!(bridge.pointer().unwrap(), 0);
        assert_eq!(bridge.client_state(), ClientState::Idle);
    }

    #[test]
    fn bad_layout_transfers_nothing() {
        let bridge = Bridge::open(&config(), Direction::Playback, OpenMode::Blocking).unwrap();
        bridge.prepare(&params(1024)).unwrap();
        let left = [0u8; 64];
        let right = [0u8; 64];
        let fmt = params(1024).format;
        let mut areas = ChannelArea::interleaved(&left, &fmt);
        areas[1].data = &right;
        assert!(matches!(
            bridge.transfer(&areas, 0, 8),
            Err(BridgeError::UnsupportedLayout { .. })
        ));
        assert_eq!(bridge.frames_written(), 0);
        assert_eq!(bridge.stats().unwrap().bytes_dropped, 0);
    }

    #[test]
    fn prepare_keeps_client() {
        let bridge = Bridge::open(&config(), Direction::Playback, OpenMode::Blocking).unwrap();
        bridge.prepare(&params(1024)).unwrap();
        bridge.start().unwrap();
        bridge.prepare(&params(2048)).unwrap();
        assert!(bridge.client_state() != ClientState::Idle);
        bridge.stop().unwrap();
        bridge.stop().unwrap();
        assert_eq!(bridge.client_state(), ClientState::Idle);
        bridge.close().unwrap();
        assert!(bridge.stats().is_none());
    }

    #[test]
    fn unpaced_nonblocking_counts_frames() {
        let cfg = BridgeConfig {
            pace_nonblocking: false,
            ..config()
        };
        let bridge = Bridge::open(&cfg, Direction::Playback, OpenMode::NonBlocking).unwrap();
        bridge.prepare(&params(1000)).unwrap();
        let data = vec![0u8; 48000 * 4];
        let fmt = params(1000).format;
        let areas = ChannelArea::interleaved(&data, &fmt);

        let start = Instant::now();
        for _ in 0..4 {
            assert_eq!(bridge.transfer(&areas, 0, 48000).unwrap(), 48000);
        }
        // four seconds of audio, written without waiting
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(bridge.frames_written(), 192000);
        assert_eq!(bridge.pointer().unwrap(), 0);
        // nothing is connected, so everything was dropped
        assert_eq!(bridge.stats().unwrap().bytes_dropped, 4 * 48000 * 4);
        bridge.close().unwrap();
    }
}
