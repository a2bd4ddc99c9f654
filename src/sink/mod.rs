mod device;

pub use device::DeviceSink;

pub trait Sink {
    fn samplerate(&self) -> f32;
    fn channels(&self) -> u16;

    fn write(&mut self, buffer: &[f32]) -> anyhow::Result<()>;
}
