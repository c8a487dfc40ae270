//! Pre-delayed feedback loop
//!
//! The damped, diffused block is written into the diffused line, then each
//! frame reads that line one pre-delay back, reflects the tap through the
//! Householder matrix and feeds it both to the wet output and back into the
//! line. The loop gain is `decay`, held below one so the recursion always
//! dies out.

use rv_core::{MAX_DECAY, RvResult, Sample, Settings};

use crate::delay_line::{MultiDelayLine, WriteHead};
use crate::matrix::{MixBank, MixKind};
use crate::{ChannelBuffers, Frame, INTERNAL_CHANNELS, Processor, sanitize};

/// Gain of the feedback tap in the wet signal
pub const MAKEUP_GAIN: Sample = 0.8;

/// Loop gain while frozen
pub const FREEZE_DECAY: Sample = 0.9995;

/// Feedback/decay stage
#[derive(Debug, Clone, Default)]
pub struct FeedbackCore {
    loop_delay: usize,
}

impl FeedbackCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loop length of the last processed block, in samples
    #[inline]
    pub fn loop_delay(&self) -> usize {
        self.loop_delay
    }

    /// Gain applied to the recirculated signal
    #[inline]
    pub fn loop_gain(decay: f64, freeze: bool) -> f64 {
        if freeze {
            FREEZE_DECAY
        } else if decay.is_finite() {
            decay.clamp(0.0, MAX_DECAY)
        } else {
            0.0
        }
    }

    /// Run one block through the loop
    ///
    /// `diffused` is written into `line` at the head (zeroed first while
    /// frozen). `wet` holds the fanned-out input on entry and receives the
    /// feedback tap on exit.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &mut self,
        line: &mut MultiDelayLine,
        head: &WriteHead,
        mix: &MixBank,
        diffused: &mut ChannelBuffers,
        wet: &mut ChannelBuffers,
        frames: usize,
        settings: &Settings,
    ) -> RvResult<()> {
        let freeze = settings.freeze;
        let gain = Self::loop_gain(settings.decay, freeze);

        for (channel, samples) in diffused.iter_mut().enumerate() {
            let samples = &mut samples[..frames];
            if freeze {
                samples.fill(0.0);
            }
            line.write(head, channel, samples)?;
        }

        let delay = line.samples_for(settings.pre_delay_ms).max(1);
        self.loop_delay = delay;

        for frame in 0..frames {
            let read_index = head.behind(delay, frame);
            let write_index = head.rotate(frame);

            let mut tap: Frame = [0.0; INTERNAL_CHANNELS];
            for (channel, value) in tap.iter_mut().enumerate() {
                *value = line.sample_at(channel, read_index)?;
            }
            let reflected = mix.apply(MixKind::Householder, &tap);

            for (channel, &f) in reflected.iter().enumerate() {
                let x = if freeze { 0.0 } else { wet[channel][frame] };
                wet[channel][frame] += MAKEUP_GAIN * f;
                line.add_at(channel, write_index, sanitize(gain * (x + f)))?;
            }
        }
        Ok(())
    }
}

impl Processor for FeedbackCore {
    fn reset(&mut self) {
        self.loop_delay = 0;
    }
}
