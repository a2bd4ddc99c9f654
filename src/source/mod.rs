mod sine;

pub use sine::Sine;

pub trait Source {
    fn samplerate(&self) -> f32;
    fn channels(&self) -> u16;

    /// Fill `buffer` with interleaved samples, returning how many were written.
    fn fill(&mut self, buffer: &mut [f32]) -> usize;
}
