//! Multichannel circular delay line
//!
//! All internal channels live in one flat arena (`channels × capacity`),
//! addressed through bounds-checked accessors. The write position is not
//! owned by the line: a single [`WriteHead`] is shared by every channel and
//! every line of the engine and advanced once per block.
//!
//! Capacity is `3 × (max_block_size + sample_rate)`, so one block read or
//! write wraps at most once regardless of delay or write position.

use rv_core::{ProcessSpec, RvError, RvResult, Sample};

use crate::{sanitize, try_zeroed};

/// Gain applied to every sample copied into a line
pub const WRITE_GAIN: Sample = 0.8;

/// Shared circular write position, always in `[0, capacity)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteHead {
    pos: usize,
    capacity: usize,
}

impl WriteHead {
    pub fn new(capacity: usize) -> Self {
        Self { pos: 0, capacity }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Move forward by `frames`, modulo capacity
    #[inline]
    pub fn advance(&mut self, frames: usize) {
        if self.capacity > 0 {
            self.pos = (self.pos + frames % self.capacity) % self.capacity;
        }
    }

    /// Index of `frame` within the block starting at the head
    #[inline]
    pub fn rotate(&self, frame: usize) -> usize {
        if self.capacity == 0 {
            return 0;
        }
        (self.pos + frame % self.capacity) % self.capacity
    }

    /// Index `delay` samples behind the head, moved forward by `offset`
    #[inline]
    pub fn behind(&self, delay: usize, offset: usize) -> usize {
        if self.capacity == 0 {
            return 0;
        }
        let delay = delay.min(self.capacity);
        (self.pos + (self.capacity - delay) + offset % self.capacity) % self.capacity
    }

    pub fn reset(&mut self) {
        self.pos = 0;
    }
}

/// Fixed-capacity ring buffer per internal channel
#[derive(Debug, Clone, Default)]
pub struct MultiDelayLine {
    data: Vec<Sample>,
    channels: usize,
    capacity: usize,
    sample_rate: f64,
}

impl MultiDelayLine {
    /// Ring length needed for `spec`
    pub fn capacity_for(spec: &ProcessSpec) -> usize {
        3 * (spec.max_block_size + spec.sample_rate.ceil() as usize)
    }

    /// Allocate a zeroed line, reporting allocation failure instead of aborting
    pub fn try_new(channels: usize, capacity: usize, sample_rate: f64) -> RvResult<Self> {
        let total = channels
            .checked_mul(capacity)
            .ok_or(RvError::Allocation {
                requested: usize::MAX,
            })?;

        Ok(Self {
            data: try_zeroed(total)?,
            channels,
            capacity,
            sample_rate,
        })
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whole samples for `delay_ms`, clamped to the capacity
    #[inline]
    pub fn samples_for(&self, delay_ms: f64) -> usize {
        let samples = (delay_ms * 0.001 * self.sample_rate).round();
        if samples.is_finite() && samples > 0.0 {
            (samples as usize).min(self.capacity)
        } else {
            0
        }
    }

    #[inline]
    fn channel_slice(&self, channel: usize) -> RvResult<&[Sample]> {
        if channel >= self.channels {
            return Err(RvError::ChannelOutOfRange {
                channel,
                channels: self.channels,
            });
        }
        let start = channel * self.capacity;
        Ok(&self.data[start..start + self.capacity])
    }

    #[inline]
    fn channel_slice_mut(&mut self, channel: usize) -> RvResult<&mut [Sample]> {
        if channel >= self.channels {
            return Err(RvError::ChannelOutOfRange {
                channel,
                channels: self.channels,
            });
        }
        let start = channel * self.capacity;
        Ok(&mut self.data[start..start + self.capacity])
    }

    #[inline]
    fn check_span(&self, head: &WriteHead, start: usize, len: usize) -> RvResult<()> {
        if head.capacity() != self.capacity || start >= self.capacity.max(1) || len > self.capacity
        {
            return Err(RvError::SpanOutOfRange {
                start,
                len,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Copy `samples` into `channel` at the head, attenuated by [`WRITE_GAIN`]
    ///
    /// Non-finite input is stored as silence so one bad block cannot poison
    /// the line.
    pub fn write(&mut self, head: &WriteHead, channel: usize, samples: &[Sample]) -> RvResult<()> {
        let start = head.position();
        self.check_span(head, start, samples.len())?;
        let capacity = self.capacity;
        let ring = self.channel_slice_mut(channel)?;

        let first = samples.len().min(capacity - start);
        let (head_part, tail_part) = samples.split_at(first);

        for (dst, &src) in ring[start..start + first].iter_mut().zip(head_part) {
            *dst = sanitize(src) * WRITE_GAIN;
        }
        for (dst, &src) in ring[..tail_part.len()].iter_mut().zip(tail_part) {
            *dst = sanitize(src) * WRITE_GAIN;
        }
        Ok(())
    }

    /// Fill `out` from `channel`, `delay_ms` behind the head plus `offset_samples`
    pub fn read(
        &self,
        head: &WriteHead,
        channel: usize,
        delay_ms: f64,
        offset_samples: usize,
        out: &mut [Sample],
    ) -> RvResult<()> {
        let delay = self.samples_for(delay_ms);
        self.read_samples(head, channel, delay, offset_samples, out)
    }

    /// Sample-domain variant of [`MultiDelayLine::read`]
    ///
    /// The offset is clamped to the delay so a read never passes the block
    /// that was just written at the head.
    pub fn read_samples(
        &self,
        head: &WriteHead,
        channel: usize,
        delay_samples: usize,
        offset_samples: usize,
        out: &mut [Sample],
    ) -> RvResult<()> {
        let delay = delay_samples.min(self.capacity);
        let read_pos = head.behind(delay, offset_samples.min(delay));
        self.check_span(head, read_pos, out.len())?;
        let ring = self.channel_slice(channel)?;

        let first = out.len().min(self.capacity - read_pos);
        let (head_part, tail_part) = out.split_at_mut(first);
        head_part.copy_from_slice(&ring[read_pos..read_pos + first]);
        tail_part.copy_from_slice(&ring[..tail_part.len()]);
        Ok(())
    }

    /// Single sample at an absolute ring index
    #[inline]
    pub fn sample_at(&self, channel: usize, index: usize) -> RvResult<Sample> {
        let ring = self.channel_slice(channel)?;
        ring.get(index).copied().ok_or(RvError::SpanOutOfRange {
            start: index,
            len: 1,
            capacity: self.capacity,
        })
    }

    /// Accumulate into a single sample at an absolute ring index
    #[inline]
    pub fn add_at(&mut self, channel: usize, index: usize, value: Sample) -> RvResult<()> {
        let capacity = self.capacity;
        let ring = self.channel_slice_mut(channel)?;
        let slot = ring.get_mut(index).ok_or(RvError::SpanOutOfRange {
            start: index,
            len: 1,
            capacity,
        })?;
        *slot += value;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// Pointer to the arena, used to verify processing never reallocates
    pub fn storage_ptr(&self) -> *const Sample {
        self.data.as_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    const SR: f64 = 1000.0;

    fn line(capacity: usize) -> (MultiDelayLine, WriteHead) {
        (
            MultiDelayLine::try_new(2, capacity, SR).unwrap(),
            WriteHead::new(capacity),
        )
    }

    #[test]
    fn test_capacity_for_spec() {
        let spec = ProcessSpec::new(48000.0, 512, 2);
        assert_eq!(MultiDelayLine::capacity_for(&spec), 3 * (512 + 48000));
    }

    #[test]
    fn test_write_applies_gain() {
        let (mut dl, head) = line(16);
        dl.write(&head, 0, &[1.0, -0.5]).unwrap();
        assert_relative_eq!(dl.sample_at(0, 0).unwrap(), 0.8);
        assert_relative_eq!(dl.sample_at(0, 1).unwrap(), -0.4);
        assert_eq!(dl.sample_at(1, 0).unwrap(), 0.0);
    }

    #[test]
    fn test_write_wraps_once() {
        let (mut dl, mut head) = line(8);
        head.advance(6);
        dl.write(&head, 1, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let ring: Vec<_> = (0..8).map(|i| dl.sample_at(1, i).unwrap()).collect();
        assert_relative_eq!(ring[6], 0.8);
        assert_relative_eq!(ring[7], 1.6);
        assert_relative_eq!(ring[0], 2.4);
        assert_relative_eq!(ring[1], 3.2);
        assert_eq!(ring[2], 0.0);
    }

    #[test]
    fn test_read_behind_head() {
        let (mut dl, mut head) = line(10);
        dl.write(&head, 0, &[1.0, 2.0, 3.0]).unwrap();
        head.advance(3);
        dl.write(&head, 0, &[4.0, 5.0, 6.0]).unwrap();

        // 3 ms at 1 kHz = 3 samples behind the second block
        let mut out = [0.0; 3];
        dl.read(&head, 0, 3.0, 0, &mut out).unwrap();
        assert_relative_eq!(out[0], 0.8);
        assert_relative_eq!(out[2], 2.4);

        // Zero delay returns the block just written
        dl.read(&head, 0, 0.0, 0, &mut out).unwrap();
        assert_relative_eq!(out[0], 3.2);
    }

    #[test]
    fn test_read_wraps_across_boundary() {
        let (mut dl, mut head) = line(8);
        head.advance(6);
        dl.write(&head, 0, &[1.0, 2.0, 3.0]).unwrap();
        head.advance(3);
        let mut out = [0.0; 3];
        dl.read_samples(&head, 0, 3, 0, &mut out).unwrap();
        assert_relative_eq!(out[0], 0.8);
        assert_relative_eq!(out[1], 1.6);
        assert_relative_eq!(out[2], 2.4);
    }

    #[test]
    fn test_offset_never_passes_head() {
        let (mut dl, head) = line(8);
        dl.write(&head, 0, &[1.0, 2.0]).unwrap();
        let mut out = [0.0; 2];
        // Offset larger than the delay is clamped to the delay
        dl.read_samples(&head, 0, 0, 5, &mut out).unwrap();
        assert_relative_eq!(out[0], 0.8);
    }

    #[test]
    fn test_rejects_bad_channel_and_span() {
        let (mut dl, head) = line(8);
        assert!(matches!(
            dl.write(&head, 2, &[0.0]),
            Err(RvError::ChannelOutOfRange { channel: 2, .. })
        ));
        assert!(matches!(
            dl.write(&head, 0, &[0.0; 9]),
            Err(RvError::SpanOutOfRange { .. })
        ));
        let foreign = WriteHead::new(16);
        assert!(dl.write(&foreign, 0, &[0.0]).is_err());
        assert!(dl.sample_at(0, 8).is_err());
        assert!(dl.add_at(0, 8, 1.0).is_err());
    }

    #[test]
    fn test_random_positions_stay_in_bounds() {
        let capacity = 97;
        let (mut dl, mut head) = line(capacity);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut out = vec![0.0; capacity];

        for _ in 0..2000 {
            head.advance(rng.random_range(0..capacity * 2));
            assert!(head.position() < capacity);

            let len = rng.random_range(0..=capacity);
            let block = vec![1.0; len];
            dl.write(&head, 1, &block).unwrap();

            let delay = rng.random_range(0..=capacity * 2);
            let offset = rng.random_range(0..capacity * 2);
            dl.read_samples(&head, 1, delay, offset, &mut out[..len]).unwrap();
            assert!(head.behind(delay, offset) < capacity);
            assert!(head.rotate(len) < capacity);
        }
    }

    #[test]
    fn test_write_stores_non_finite_as_silence() {
        let (mut dl, head) = line(8);
        dl.write(&head, 0, &[f64::NAN, f64::INFINITY, 1.0]).unwrap();
        assert_eq!(dl.sample_at(0, 0).unwrap(), 0.0);
        assert_eq!(dl.sample_at(0, 1).unwrap(), 0.0);
        assert_relative_eq!(dl.sample_at(0, 2).unwrap(), 0.8);
    }

    #[test]
    fn test_samples_for_clamps() {
        let (dl, _) = line(50);
        assert_eq!(dl.samples_for(10.0), 10);
        assert_eq!(dl.samples_for(1e6), 50);
        assert_eq!(dl.samples_for(-3.0), 0);
        assert_eq!(dl.samples_for(f64::NAN), 0);
    }
}
