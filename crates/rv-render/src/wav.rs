//! WAV input/output via hound

use std::path::Path;

use anyhow::{Context, Result, bail};
use rv_core::{MultiChannelBuffer, Sample};

/// Decoded audio, planar
pub struct WavAudio {
    pub buffer: MultiChannelBuffer,
    pub sample_rate: u32,
}

/// Load a WAV file (integer or float) as planar f64
pub fn load_wav(path: &Path) -> Result<WavAudio> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let spec = reader.spec();
    let num_channels = spec.channels as usize;
    if num_channels == 0 {
        bail!("{} has no channels", path.display());
    }

    let samples: Vec<Sample> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("decoding {}", path.display()))?,
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            let max_val = (1i64 << (bits - 1)) as f64;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f64 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()
                .with_context(|| format!("decoding {}", path.display()))?
        }
    };

    Ok(WavAudio {
        buffer: deinterleave(&samples, num_channels),
        sample_rate: spec.sample_rate,
    })
}

/// Write planar audio as 32-bit float WAV
pub fn write_wav(path: &Path, buffer: &MultiChannelBuffer, sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: u16::try_from(buffer.num_channels()).context("too many channels for WAV")?,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;

    // Interleave channels
    for i in 0..buffer.frames() {
        for c in 0..buffer.num_channels() {
            let sample = buffer
                .channel(c)
                .and_then(|ch| ch.get(i))
                .copied()
                .unwrap_or(0.0);
            writer.write_sample(sample as f32)?;
        }
    }
    writer.finalize().context("finalizing WAV")?;
    Ok(())
}

fn deinterleave(samples: &[Sample], num_channels: usize) -> MultiChannelBuffer {
    let frames = samples.len() / num_channels;
    let channels = (0..num_channels)
        .map(|c| (0..frames).map(|i| samples[i * num_channels + c]).collect())
        .collect();
    MultiChannelBuffer::from_channels(channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_deinterleave() {
        let buffer = deinterleave(&[1.0, -1.0, 2.0, -2.0, 3.0, -3.0, 9.0], 2);
        assert_eq!(buffer.frames(), 3);
        assert_eq!(buffer.channel(0), Some(&[1.0, 2.0, 3.0][..]));
        assert_eq!(buffer.channel(1), Some(&[-1.0, -2.0, -3.0][..]));
    }

    #[test]
    fn test_write_then_load() {
        let path = std::env::temp_dir().join(format!("rv-render-wav-{}.wav", std::process::id()));
        let buffer = MultiChannelBuffer::from_channels(vec![vec![0.5, -0.25], vec![0.0, 1.0]]);
        write_wav(&path, &buffer, 44100).unwrap();

        let loaded = load_wav(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.sample_rate, 44100);
        assert_eq!(loaded.buffer.num_channels(), 2);
        assert_relative_eq!(loaded.buffer.channel(0).unwrap()[1], -0.25);
        assert_relative_eq!(loaded.buffer.channel(1).unwrap()[1], 1.0);
    }
}
