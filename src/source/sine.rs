/// A test tone, the same on every channel.
pub struct Sine {
    samplerate: f32,
    channels: u16,
    amplitude: f32,
    step: f64,
    phase: f64,
}

impl Sine {
    pub fn new(samplerate: f32, channels: u16, frequency: f32) -> Self {
        Sine {
            samplerate,
            channels: channels.max(1),
            amplitude: 0.5,
            step: std::f64::consts::TAU * frequency as f64 / samplerate as f64,
            phase: 0.0,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }
}

impl super::Source for Sine {
    fn samplerate(&self) -> f32 {
        self.samplerate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn fill(&mut self, buffer: &mut [f32]) -> usize {
        let channels = self.channels as usize;
        let whole = buffer.len() - buffer.len() % channels;
        for frame in buffer[..whole].chunks_mut(channels) {
            let v = self.amplitude * self.phase.sin() as f32;
            frame.iter_mut().for_each(|s| *s = v);
            // keep the phase small so long runs stay precise
            self.phase = (self.phase + self.step) % std::f64::consts::TAU;
        }
        whole
    }
}

#[cfg(test)]
mod test {
    use super::super::Source;
    use super::Sine;

    #[test]
    fn channels_match() {
        let mut sine = Sine::new(8000.0, 2, 1000.0).with_amplitude(1.0);
        let mut buffer = [0.0; 17];
        assert_eq!(sine.fill(&mut buffer), 16);
        for frame in buffer[..16].chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
        // a quarter period in, the tone peaks
        assert!((buffer[4] - 1.0).abs() < 1e-6);
    }
}
