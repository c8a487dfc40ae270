//! rv-dsp: Feedback-delay-network reverb for Reverie
//!
//! Real-time safe: every buffer is sized in `prepare`, nothing in the
//! per-block path allocates, locks or blocks.
//!
//! ## Modules
//! - `delay_line` - Multichannel circular delay line with a shared write head
//! - `matrix` - 4×4 Householder, Hadamard and permutation mix matrices
//! - `decorrelation` - Per-channel read offsets (entropy, seeded or fixed)
//! - `diffusion` - Cascaded delay + permute + Hadamard diffusion network
//! - `damping` - Per-channel low-pass damping bank
//! - `feedback` - Pre-delayed feedback tap and decay recursion
//! - `routing` - Host channel fan-out / fan-in
//! - `analysis` - Block RMS/peak and tail length metering
//! - `engine` - Block orchestrator (`ReverbEngine`)

pub mod analysis;
pub mod damping;
pub mod decorrelation;
pub mod delay_line;
pub mod diffusion;
pub mod engine;
pub mod feedback;
pub mod matrix;
pub mod routing;

pub use engine::{EngineState, ReverbEngine};

use rv_core::{ProcessSpec, RvError, RvResult, Sample, Settings};

/// Width of the internal network, independent of the host channel count
pub const INTERNAL_CHANNELS: usize = 4;

/// One time-aligned sample per internal channel
pub type Frame = [Sample; INTERNAL_CHANNELS];

/// One scratch buffer per internal channel
pub type ChannelBuffers = [Vec<Sample>; INTERNAL_CHANNELS];

/// Largest magnitude written to the output or back into a delay line
pub const OUTPUT_CEILING: Sample = 8.0;

/// Zeroed buffer of `len` samples, reporting allocation failure instead of aborting
pub(crate) fn try_zeroed(len: usize) -> RvResult<Vec<Sample>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| RvError::Allocation { requested: len })?;
    buffer.resize(len, 0.0);
    Ok(buffer)
}

/// One zeroed scratch buffer of `len` samples per internal channel
pub(crate) fn try_channel_buffers(len: usize) -> RvResult<ChannelBuffers> {
    Ok([
        try_zeroed(len)?,
        try_zeroed(len)?,
        try_zeroed(len)?,
        try_zeroed(len)?,
    ])
}

/// Replace non-finite values with silence and clamp to the output ceiling
#[inline(always)]
pub fn sanitize(sample: Sample) -> Sample {
    if sample.is_finite() {
        sample.clamp(-OUTPUT_CEILING, OUTPUT_CEILING)
    } else {
        0.0
    }
}

/// Trait for all DSP processors
pub trait Processor: Send {
    /// Reset processor state
    fn reset(&mut self);

    /// Get latency in samples
    fn latency(&self) -> usize {
        0
    }
}

/// Mono processor trait
pub trait MonoProcessor: Processor {
    /// Process a single sample
    fn process_sample(&mut self, input: Sample) -> Sample;

    /// Process a block of samples
    fn process_block(&mut self, buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }
}

/// Multichannel block processor with an explicit prepare/release lifecycle
pub trait BlockProcessor: Processor {
    /// Size every buffer for `spec`. Called off the audio thread.
    fn prepare(&mut self, spec: ProcessSpec) -> RvResult<()>;

    /// Transform `block` (`channels × frames`) in place
    fn process(&mut self, block: &mut [&mut [Sample]], settings: &Settings);

    /// Free every buffer
    fn release(&mut self);
}
