//! Block level metering

use rv_core::{Decibels, Sample};

/// Root mean square of one channel
pub fn rms(samples: &[Sample]) -> Sample {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f64>() / samples.len() as f64).sqrt()
}

/// Largest absolute sample of one channel
pub fn peak(samples: &[Sample]) -> Sample {
    samples.iter().fold(0.0, |p, s| p.max(s.abs()))
}

/// RMS across every channel of a block
pub fn block_rms<S: AsRef<[Sample]>>(block: &[S]) -> Sample {
    let (sum, count) = block.iter().fold((0.0, 0usize), |(sum, count), ch| {
        let ch = ch.as_ref();
        (sum + ch.iter().map(|s| s * s).sum::<f64>(), count + ch.len())
    });
    if count == 0 { 0.0 } else { (sum / count as f64).sqrt() }
}

/// Peak across every channel of a block
pub fn block_peak<S: AsRef<[Sample]>>(block: &[S]) -> Sample {
    block.iter().map(|ch| peak(ch.as_ref())).fold(0.0, f64::max)
}

/// Tracks how long a decaying signal stays above a level relative to its
/// loudest block
///
/// Echoes in a sparse tail come and go, so the length is the index of the
/// last block above threshold, not the first one below it. Blocks fed
/// through [`TailMeter::push`] are also tracked frame by frame.
#[derive(Debug, Clone)]
pub struct TailMeter {
    threshold: Decibels,
    reference: Sample,
    blocks: usize,
    last_above: Option<usize>,
    frames: usize,
    last_frame_above: Option<usize>,
}

impl TailMeter {
    /// `threshold` is relative to the loudest block seen, e.g. `Decibels(-60.0)`
    pub fn new(threshold: Decibels) -> Self {
        Self {
            threshold,
            reference: 0.0,
            blocks: 0,
            last_above: None,
            frames: 0,
            last_frame_above: None,
        }
    }

    /// Feed the next block
    pub fn push<S: AsRef<[Sample]>>(&mut self, block: &[S]) {
        let frames = block.iter().map(|ch| ch.as_ref().len()).max().unwrap_or(0);
        for i in 0..frames {
            let peak = block
                .iter()
                .filter_map(|ch| ch.as_ref().get(i))
                .fold(0.0, |p: Sample, s| p.max(s.abs()));
            let index = self.frames;
            self.frames += 1;
            if !peak.is_finite() {
                continue;
            }
            self.reference = self.reference.max(peak);
            if peak > self.floor() && peak > 0.0 {
                self.last_frame_above = Some(index);
            }
        }
        self.push_peak(block_peak(block));
    }

    #[inline]
    fn floor(&self) -> Sample {
        self.reference * self.threshold.to_gain()
    }

    /// Feed the next block's peak directly
    pub fn push_peak(&mut self, peak: Sample) {
        let index = self.blocks;
        self.blocks += 1;
        if !peak.is_finite() {
            return;
        }
        self.reference = self.reference.max(peak);
        if peak > self.floor() && peak > 0.0 {
            self.last_above = Some(index);
        }
    }

    #[inline]
    pub fn blocks_seen(&self) -> usize {
        self.blocks
    }

    #[inline]
    pub fn reference_peak(&self) -> Sample {
        self.reference
    }

    /// Blocks up to and including the last one above threshold
    pub fn tail_blocks(&self) -> usize {
        self.last_above.map_or(0, |i| i + 1)
    }

    /// Frames up to and including the last one above threshold
    ///
    /// Only blocks fed through [`TailMeter::push`] are counted.
    pub fn tail_frames(&self) -> usize {
        self.last_frame_above.map_or(0, |i| i + 1)
    }

    /// Tail length in seconds for a fixed block size
    pub fn tail_seconds(&self, block_size: usize, sample_rate: f64) -> f64 {
        (self.tail_blocks() * block_size) as f64 / sample_rate
    }

    /// True once the most recent block fell below threshold
    pub fn has_decayed(&self) -> bool {
        self.blocks > 0 && self.tail_blocks() < self.blocks
    }

    pub fn reset(&mut self) {
        self.reference = 0.0;
        self.blocks = 0;
        self.last_above = None;
        self.frames = 0;
        self.last_frame_above = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rms_and_peak() {
        assert_relative_eq!(rms(&[1.0, -1.0, 1.0, -1.0]), 1.0);
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(peak(&[0.1, -0.7, 0.3]), 0.7);

        let block = vec![vec![0.0; 4], vec![2.0; 4]];
        assert_relative_eq!(block_rms(&block), 2.0_f64.sqrt());
        assert_eq!(block_peak(&block), 2.0);
    }

    #[test]
    fn test_tail_meter_counts_until_last_loud_block() {
        let mut meter = TailMeter::new(Decibels(-60.0));
        for p in [1.0, 0.1, 0.0, 0.01, 0.0001, 0.0] {
            meter.push_peak(p);
        }
        // 0.01 at index 3 is the last block above 0.001
        assert_eq!(meter.tail_blocks(), 4);
        assert!(meter.has_decayed());
        assert_relative_eq!(meter.tail_seconds(100, 1000.0), 0.4);
    }

    #[test]
    fn test_tail_meter_counts_frames() {
        let mut meter = TailMeter::new(Decibels(-60.0));
        meter.push(&[vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 0.5, 0.0, 0.0]]);
        // Second channel sets the last loud frame of the next block
        meter.push(&[vec![0.0, 0.0, 0.0, 0.0], vec![0.0, -0.002, 0.0005, 0.0]]);
        meter.push(&[vec![0.0; 4], vec![0.0; 4]]);

        assert_eq!(meter.tail_frames(), 6);
        assert_eq!(meter.tail_blocks(), 2);
        assert!(meter.has_decayed());
    }

    #[test]
    fn test_tail_meter_silence() {
        let mut meter = TailMeter::new(Decibels(-60.0));
        meter.push(&[vec![0.0; 8]]);
        assert_eq!(meter.tail_blocks(), 0);
        meter.reset();
        assert_eq!(meter.blocks_seen(), 0);
        assert_eq!(meter.tail_frames(), 0);
    }
}
