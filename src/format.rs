use std::fmt;

/// Sample encodings the bridge can forward. All little-endian, signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmFormat {
    S8,
    S16Le,
    /// 24 significant bits, stored in the low bytes of a 4 byte container
    S24Le,
    S32Le,
}

/// Negotiated stream format: rate, bit depth and channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFormat {
    rate: u32,
    bits: u16,
    channels: u16,
}

impl PcmFormat {
    pub fn from_bits(bits: u16) -> anyhow::Result<Self> {
        Ok(match bits {
            8 => PcmFormat::S8,
            16 => PcmFormat::S16Le,
            24 => PcmFormat::S24Le,
            32 => PcmFormat::S32Le,
            _ => anyhow::bail!("unsupported bit depth {}", bits),
        })
    }

    /// Bytes one sample occupies in memory, which for S24 is the container.
    pub fn physical_width(&self) -> usize {
        match self {
            PcmFormat::S8 => 1,
            PcmFormat::S16Le => 2,
            PcmFormat::S24Le => 4,
            PcmFormat::S32Le => 4,
        }
    }

    /// Append `samples` to `out` in this encoding, clipping to [-1, 1].
    pub fn encode(&self, samples: &[f32], out: &mut Vec<u8>) {
        out.reserve(samples.len() * self.physical_width());
        for v in samples {
            let v = v.clamp(-1.0, 1.0) as f64;
            match self {
                PcmFormat::S8 => out.push((v * i8::MAX as f64).round() as i8 as u8),
                PcmFormat::S16Le => {
                    out.extend_from_slice(&((v * i16::MAX as f64).round() as i16).to_le_bytes())
                }
                PcmFormat::S24Le => {
                    let s = (v * 8_388_607.0).round() as i32;
                    out.extend_from_slice(&s.to_le_bytes());
                }
                PcmFormat::S32Le => {
                    out.extend_from_slice(&((v * i32::MAX as f64).round() as i32).to_le_bytes())
                }
            }
        }
    }
}

impl SampleFormat {
    pub fn new(rate: u32, bits: u16, channels: u16) -> anyhow::Result<Self> {
        if rate == 0 {
            anyhow::bail!("sample rate must be positive");
        }
        if channels == 0 {
            anyhow::bail!("channel count must be positive");
        }
        PcmFormat::from_bits(bits)?;
        Ok(Self {
            rate,
            bits,
            channels,
        })
    }

    /// Parse `rate:bits:channels`, e.g. `44100:16:2`.
    pub fn from_str(spec: &str) -> anyhow::Result<Self> {
        let parts: Vec<&str> = spec.trim().split(':').collect();
        if parts.len() != 3 {
            anyhow::bail!("sample format should look like rate:bits:channels");
        }
        let field = |s: &str, what: &str| {
            s.trim()
                .parse::<u32>()
                .map_err(|_| anyhow::anyhow!("bad {} in sample format: {:?}", what, s))
        };
        let rate = field(parts[0], "rate")?;
        let bits = u16::try_from(field(parts[1], "bit depth")?)
            .map_err(|_| anyhow::anyhow!("bad bit depth in sample format"))?;
        let channels = u16::try_from(field(parts[2], "channel count")?)
            .map_err(|_| anyhow::anyhow!("bad channel count in sample format"))?;
        Self::new(rate, bits, channels)
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn bits(&self) -> u16 {
        self.bits
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn pcm(&self) -> PcmFormat {
        // bits are validated on construction
        PcmFormat::from_bits(self.bits).unwrap_or(PcmFormat::S16Le)
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.pcm().physical_width() * self.channels as usize
    }
}

impl Default for SampleFormat {
    fn default() -> Self {
        Self {
            rate: 44100,
            bits: 16,
            channels: 2,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.rate, self.bits, self.channels)
    }
}
