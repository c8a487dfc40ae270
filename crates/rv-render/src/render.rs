//! Block-by-block offline render

use rv_core::{Decibels, MultiChannelBuffer, ProcessSpec, Sample, Settings};
use rv_dsp::ReverbEngine;
use rv_dsp::analysis::{TailMeter, block_peak};

/// Summary of one render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderReport {
    pub blocks: usize,
    pub peak: Sample,
    pub peak_db: f64,
    /// Time until the output last exceeded −60 dB of its loudest block
    pub tail_seconds: f64,
    pub faults: u64,
}

/// Unit impulse at frame 0 on every channel
pub fn impulse(channels: usize, frames: usize) -> MultiChannelBuffer {
    let mut buffer = MultiChannelBuffer::new(channels, frames.max(1));
    for c in 0..channels {
        if let Some(channel) = buffer.channel_mut(c) {
            channel[0] = 1.0;
        }
    }
    buffer
}

/// Pad `input` with `tail_frames` of silence so the reverb can ring out
pub fn with_tail(input: MultiChannelBuffer, tail_frames: usize) -> MultiChannelBuffer {
    let mut channels = input.into_channels();
    for channel in &mut channels {
        channel.resize(channel.len() + tail_frames, 0.0);
    }
    MultiChannelBuffer::from_channels(channels)
}

/// Run `buffer` through `engine` in place, `spec.max_block_size` frames at a time
pub fn render(
    engine: &mut ReverbEngine,
    spec: &ProcessSpec,
    settings: &Settings,
    buffer: &mut MultiChannelBuffer,
) -> RenderReport {
    let block_size = spec.max_block_size.max(1);
    let mut meter = TailMeter::new(Decibels(-60.0));
    let mut peak: Sample = 0.0;
    let mut blocks = 0;

    let mut start = 0;
    while start < buffer.frames() {
        let mut slices = buffer.channel_slices_mut(start, block_size);
        engine.process(&mut slices, settings);

        let current = block_peak(&slices);
        peak = peak.max(current);
        meter.push_peak(current);

        blocks += 1;
        start += block_size;
    }

    let report = RenderReport {
        blocks,
        peak,
        peak_db: Decibels::from_gain(peak).0,
        tail_seconds: meter.tail_seconds(block_size, spec.sample_rate),
        faults: engine.fault_count(),
    };
    log::debug!("render finished: {report:?}");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_dsp::decorrelation::Decorrelation;

    fn prepared(spec: &ProcessSpec) -> ReverbEngine {
        let mut engine = ReverbEngine::new().with_decorrelation(Decorrelation::Seeded(9));
        engine.prepare(*spec).unwrap();
        engine
    }

    #[test]
    fn test_impulse_buffer() {
        let buffer = impulse(2, 8);
        assert_eq!(buffer.channel(1).unwrap()[0], 1.0);
        assert!(buffer.channel(1).unwrap()[1..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_with_tail_pads() {
        let buffer = with_tail(impulse(1, 4), 10);
        assert_eq!(buffer.frames(), 14);
    }

    #[test]
    fn test_impulse_render_reports_tail() {
        let spec = ProcessSpec::new(48000.0, 512, 2);
        let settings = Settings {
            gain: 1.0,
            decay: 0.8,
            ..Settings::default()
        };
        let mut engine = prepared(&spec);
        let mut buffer = with_tail(impulse(2, 1), 48000 * 3);
        let report = render(&mut engine, &spec, &settings, &mut buffer);

        assert_eq!(report.blocks, (48000_usize * 3 + 1).div_ceil(512));
        assert!(report.peak > 0.0 && report.peak <= 1.0);
        assert!(report.tail_seconds > 0.1);
        assert!(report.tail_seconds < 3.0);
        assert_eq!(report.faults, 0);
    }

    #[test]
    fn test_short_final_block() {
        let spec = ProcessSpec::new(8000.0, 64, 1);
        let mut engine = prepared(&spec);
        let mut buffer = MultiChannelBuffer::new(1, 100);
        let report = render(&mut engine, &spec, &Settings::default(), &mut buffer);
        assert_eq!(report.blocks, 2);
        assert_eq!(engine.write_position(), Some(100));
    }
}
