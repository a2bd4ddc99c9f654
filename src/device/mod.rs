//! The host-facing side: a playback device with no hardware behind it.
//!
//! A host drives a [`VirtualDevice`] through the usual callback set. The
//! [`Bridge`] implementation forwards every transferred buffer to a
//! [`StreamClient`](crate::StreamClient) and sleeps the caller to keep the
//! nominal sample rate.

mod bridge;
mod pacer;

pub use bridge::Bridge;
pub use pacer::PacingClock;

use crate::{BridgeError, PcmFormat, SampleFormat};

/// Callback set a host expects from a playback device.
pub trait VirtualDevice {
    fn prepare(&self, params: &HwParams) -> Result<(), BridgeError>;
    fn start(&self) -> Result<(), BridgeError>;
    fn stop(&self) -> Result<(), BridgeError>;

    /// Current position in the virtual ring buffer, in frames.
    fn pointer(&self) -> Result<u64, BridgeError>;

    /// Consume `frames` frames starting `offset` frames into `areas`.
    /// Returns the number of frames accepted.
    fn transfer(
        &self,
        areas: &[ChannelArea<'_>],
        offset: usize,
        frames: usize,
    ) -> Result<usize, BridgeError>;

    fn close(&self) -> Result<(), BridgeError>;
    fn drain(&self) -> Result<(), BridgeError>;
    fn pause(&self, enable: bool) -> Result<(), BridgeError>;

    fn resume(&self) -> Result<(), BridgeError> {
        self.start()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Playback,
    Capture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    #[default]
    Blocking,
    NonBlocking,
}

/// Parameters the host settled on before `prepare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwParams {
    pub format: SampleFormat,
    /// Virtual ring buffer size, in frames.
    pub buffer_size: u64,
    pub period_size: u64,
}

/// Where one channel's samples live. Offsets are in bits, like the
/// hardware descriptors they mirror.
#[derive(Debug, Clone, Copy)]
pub struct ChannelArea<'a> {
    pub data: &'a [u8],
    /// Offset of this channel's first sample.
    pub first: usize,
    /// Distance between consecutive samples of this channel.
    pub step: usize,
}

impl<'a> ChannelArea<'a> {
    /// The areas of a plain interleaved buffer.
    pub fn interleaved(data: &'a [u8], format: &SampleFormat) -> Vec<ChannelArea<'a>> {
        let width = format.pcm().physical_width() * 8;
        let step = format.bytes_per_frame() * 8;
        (0..format.channels() as usize)
            .map(|c| ChannelArea {
                data,
                first: c * width,
                step,
            })
            .collect()
    }
}

/// Check that `areas` are one interleaved block of `frame_bytes`-sized
/// frames and return the bytes for `frames` frames after `offset`.
pub(crate) fn interleaved_region<'a>(
    areas: &[ChannelArea<'a>],
    frame_bytes: usize,
    offset: usize,
    frames: usize,
) -> Result<&'a [u8], BridgeError> {
    let first = areas
        .first()
        .ok_or_else(|| BridgeError::layout("no channel areas"))?;
    for area in areas {
        if area.data.as_ptr() != first.data.as_ptr() || area.data.len() != first.data.len() {
            return Err(BridgeError::layout("channels live in separate buffers"));
        }
        if area.step != first.step {
            return Err(BridgeError::layout("channels have different strides"));
        }
        if area.first >= first.step {
            return Err(BridgeError::layout("channel offset outside the frame"));
        }
    }
    if first.step != frame_bytes * 8 {
        return Err(BridgeError::layout(format!(
            "stride of {} bits does not match {} byte frames",
            first.step, frame_bytes
        )));
    }

    let start = offset.saturating_mul(frame_bytes);
    let needed = frames.saturating_mul(frame_bytes);
    let available = first.data.len().saturating_sub(start);
    if needed > available {
        return Err(BridgeError::ShortBuffer { needed, available });
    }
    Ok(&first.data[start..start + needed])
}

/// Ranges a host may negotiate within, announced before `prepare`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub interleaved_only: bool,
    pub formats: Vec<PcmFormat>,
    pub channels: (u16, u16),
    pub rate: (u32, u32),
    pub periods: (u32, u32),
    pub buffer_bytes: (usize, usize),
}

impl Capabilities {
    /// A device fixed to exactly `format`.
    pub fn for_format(format: &SampleFormat) -> Self {
        Self {
            interleaved_only: true,
            formats: vec![format.pcm()],
            channels: (format.channels(), format.channels()),
            rate: (format.rate(), format.rate()),
            periods: (2, 4),
            buffer_bytes: (32 * 1024, 64 * 1024),
        }
    }

    /// The largest buffer the device allows, split into the fewest periods.
    pub fn default_params(&self, format: &SampleFormat) -> HwParams {
        let frame = format.bytes_per_frame().max(1);
        let periods = self.periods.0.max(1) as u64;
        // whole periods only
        let period_size = (self.buffer_bytes.1 / frame) as u64 / periods;
        HwParams {
            format: *format,
            buffer_size: period_size * periods,
            period_size,
        }
    }

    pub fn allows(&self, params: &HwParams) -> bool {
        let fmt = &params.format;
        let bytes = params.buffer_size as usize * fmt.bytes_per_frame();
        let periods = match params.period_size {
            0 => 0,
            p if params.buffer_size % p != 0 => 0,
            p => params.buffer_size / p,
        };
        self.formats.contains(&fmt.pcm())
            && (self.channels.0..=self.channels.1).contains(&fmt.channels())
            && (self.rate.0..=self.rate.1).contains(&fmt.rate())
            && (self.buffer_bytes.0..=self.buffer_bytes.1).contains(&bytes)
            && (self.periods.0 as u64..=self.periods.1 as u64).contains(&periods)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn stereo16() -> SampleFormat {
        SampleFormat::new(44100, 16, 2).unwrap()
    }

    #[test]
    fn interleaved_areas_pass() {
        let fmt = stereo16();
        let data: Vec<u8> = (0..64).collect();
        let areas = ChannelArea::interleaved(&data, &fmt);
        assert_eq!(areas.len(), 2);
        assert_eq!(areas[1].first, 16);

        let region = interleaved_region(&areas, 4, 2, 3).unwrap();
        assert_eq!(region, &data[8..20]);
        assert!(interleaved_region(&areas, 4, 0, 0).unwrap().is_empty());
    }

    #[test]
    fn separate_buffers_rejected() {
        let fmt = stereo16();
        let left = vec![0u8; 32];
        let right = vec![0u8; 32];
        let mut areas = ChannelArea::interleaved(&left, &fmt);
        areas[1].data = &right;
        assert!(matches!(
            interleaved_region(&areas, 4, 0, 1),
            Err(BridgeError::UnsupportedLayout { .. })
        ));
    }

    #[test]
    fn planar_stride_rejected() {
        let data = vec![0u8; 64];
        let areas = [
            ChannelArea {
                data: &data,
                first: 0,
                step: 16,
            },
            ChannelArea {
                data: &data,
                first: 256,
                step: 16,
            },
        ];
        assert!(matches!(
            interleaved_region(&areas, 4, 0, 1),
            Err(BridgeError::UnsupportedLayout { .. })
        ));
        assert!(matches!(
            interleaved_region(&areas[..1], 4, 0, 1),
            Err(BridgeError::UnsupportedLayout { .. })
        ));
        assert!(matches!(
            interleaved_region(&[], 4, 0, 1),
            Err(BridgeError::UnsupportedLayout { .. })
        ));
    }

    #[test]
    fn short_buffer() {
        let fmt = stereo16();
        let data = vec![0u8; 40];
        let areas = ChannelArea::interleaved(&data, &fmt);
        match interleaved_region(&areas, 4, 5, 6) {
            Err(BridgeError::ShortBuffer { needed, available }) => {
                assert_eq!(needed, 24);
                assert_eq!(available, 20);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn capabilities() {
        let fmt = stereo16();
        let caps = Capabilities::for_format(&fmt);
        assert_eq!(caps.formats, vec![PcmFormat::S16Le]);
        let params = caps.default_params(&fmt);
        assert_eq!(params.buffer_size, 16384);
        assert_eq!(params.period_size, 8192);
        assert!(caps.allows(&params));

        let too_small = HwParams {
            buffer_size: 1024,
            ..params
        };
        assert!(!caps.allows(&too_small));
        let ragged = HwParams {
            buffer_size: 10000,
            period_size: 4096,
            ..params
        };
        assert!(!caps.allows(&ragged));
        let no_period = HwParams {
            period_size: 0,
            ..params
        };
        assert!(!caps.allows(&no_period));

        // five 8 bit channels do not divide the largest buffer evenly
        let odd = SampleFormat::new(44100, 8, 5).unwrap();
        let caps = Capabilities::for_format(&odd);
        let params = caps.default_params(&odd);
        assert_eq!(params.period_size, 6553);
        assert_eq!(params.buffer_size, 13106);
        assert!(caps.allows(&params));
        let caps = Capabilities::for_format(&fmt);
        let params = caps.default_params(&fmt);

        let other_rate = HwParams {
            format: SampleFormat::new(48000, 16, 2).unwrap(),
            ..params
        };
        assert!(!caps.allows(&other_rate));
    }
}
