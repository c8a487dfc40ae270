//! Cascaded diffusion network
//!
//! Every step reads the input line at a per-channel staggered delay,
//! scrambles the channels with Permutation then Hadamard, and accumulates
//! with a gain that falls off per step. Later steps are longer and quieter,
//! which smears a transient into a dense cloud before it reaches the
//! feedback loop.

use rv_core::{RvResult, Sample};

use crate::delay_line::{MultiDelayLine, WriteHead};
use crate::decorrelation::DecorrelationOffsets;
use crate::matrix::MixBank;
use crate::{ChannelBuffers, Frame, INTERNAL_CHANNELS, try_channel_buffers};

const N: usize = INTERNAL_CHANNELS;

/// Base delay of step `i` (1-based) in milliseconds: `(20 + i) × 1.6^i`
#[inline]
pub fn step_delay_ms(step: u32) -> f64 {
    (20.0 + step as f64) * 1.6_f64.powi(step as i32)
}

/// Delay for `channel` within step `i`, spread evenly up to the base delay
#[inline]
pub fn segment_delay_ms(step: u32, channel: usize) -> f64 {
    step_delay_ms(step) * (channel + 1) as f64 / N as f64
}

/// Accumulation gain of step `i`
#[inline]
pub fn step_gain(step: u32) -> Sample {
    0.9 - 0.1 * step as f64
}

/// Diffusion stage with preallocated per-channel scratch
#[derive(Debug, Default)]
pub struct DiffusionNetwork {
    taps: ChannelBuffers,
    max_block: usize,
}

impl DiffusionNetwork {
    pub fn try_new(max_block: usize) -> RvResult<Self> {
        Ok(Self {
            taps: try_channel_buffers(max_block)?,
            max_block,
        })
    }

    #[inline]
    pub fn max_block(&self) -> usize {
        self.max_block
    }

    /// Diffuse `frames` samples read from `line` into `out`
    ///
    /// `input` holds the undiffused block and is copied through unchanged
    /// when `steps` is zero.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &mut self,
        line: &MultiDelayLine,
        head: &WriteHead,
        offsets: &DecorrelationOffsets,
        mix: &MixBank,
        input: &ChannelBuffers,
        out: &mut ChannelBuffers,
        frames: usize,
        steps: u32,
    ) -> RvResult<()> {
        let frames = frames.min(self.max_block);

        if steps == 0 {
            for (dst, src) in out.iter_mut().zip(input.iter()) {
                dst[..frames].copy_from_slice(&src[..frames]);
            }
            return Ok(());
        }

        for channel in out.iter_mut() {
            channel[..frames].fill(0.0);
        }

        for step in 1..=steps {
            for (channel, tap) in self.taps.iter_mut().enumerate() {
                line.read(
                    head,
                    channel,
                    segment_delay_ms(step, channel),
                    offsets.get(channel),
                    &mut tap[..frames],
                )?;
            }

            let gain = step_gain(step);
            for frame in 0..frames {
                let vector: Frame = std::array::from_fn(|c| self.taps[c][frame]);
                let mixed = mix.diffuse(&vector);
                for (channel, value) in out.iter_mut().zip(mixed) {
                    channel[frame] += gain * value;
                }
            }
        }

        let norm = 1.0 / steps as f64;
        for channel in out.iter_mut() {
            for sample in &mut channel[..frames] {
                *sample *= norm;
            }
        }
        Ok(())
    }
}
