use crate::device::{ChannelArea, HwParams, VirtualDevice};
use crate::SampleFormat;

/// Plays float samples through a [`VirtualDevice`], one period per transfer.
pub struct DeviceSink<D> {
    device: D,
    format: SampleFormat,
    period: usize,
    bytes: Vec<u8>,
}

impl<D> DeviceSink<D>
where
    D: VirtualDevice,
{
    pub fn new(device: D, params: &HwParams) -> Self {
        Self {
            device,
            format: params.format,
            period: (params.period_size as usize).max(1),
            bytes: Vec::new(),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn into_inner(self) -> D {
        self.device
    }
}

impl<D> super::Sink for DeviceSink<D>
where
    D: VirtualDevice,
{
    fn samplerate(&self) -> f32 {
        self.format.rate() as f32
    }

    fn channels(&self) -> u16 {
        self.format.channels()
    }

    fn write(&mut self, buffer: &[f32]) -> anyhow::Result<()> {
        let channels = self.format.channels() as usize;
        if buffer.len() % channels != 0 {
            anyhow::bail!("buffer does not hold whole frames");
        }
        for chunk in buffer.chunks(self.period * channels) {
            self.bytes.clear();
            self.format.pcm().encode(chunk, &mut self.bytes);
            let frames = chunk.len() / channels;
            let areas = ChannelArea::interleaved(&self.bytes, &self.format);
            let mut done = 0;
            while done < frames {
                let n = self.device.transfer(&areas, done, frames - done)?;
                if n == 0 {
                    anyhow::bail!("device accepted no frames");
                }
                done += n;
            }
        }
        Ok(())
    }
}
