//! Block orchestrator
//!
//! `ReverbEngine` owns every buffer and stage of the network. `prepare`
//! sizes everything for the host configuration; `process` then runs the
//! per-block pipeline without allocating:
//!
//! ```text
//! dry copy (optionally reversed) → fan-out → input line
//!   → diffusion → damping → diffused line / feedback loop
//!   → fan-in → dry/wet mix → master gain → sanitize
//! ```

use rv_core::{ProcessSpec, RvError, RvResult, Sample, Settings};

use crate::damping::DampingBank;
use crate::decorrelation::{Decorrelation, DecorrelationOffsets};
use crate::delay_line::{MultiDelayLine, WriteHead};
use crate::diffusion::DiffusionNetwork;
use crate::feedback::FeedbackCore;
use crate::matrix::MixBank;
use crate::routing::{fan_in, fan_out};
use crate::{
    BlockProcessor, ChannelBuffers, INTERNAL_CHANNELS, Processor, sanitize, try_channel_buffers,
    try_zeroed,
};

/// Fixed attenuation of the wet signal in the final mix
pub const WET_SCALE: Sample = 0.8;

/// Engine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Uninitialized,
    Prepared,
    Processing,
    Released,
}

/// Everything sized by `prepare`
#[derive(Debug)]
struct Buffers {
    head: WriteHead,
    input_line: MultiDelayLine,
    diffused_line: MultiDelayLine,
    diffusion: DiffusionNetwork,
    /// Fanned-out input, then the wet signal
    internal: ChannelBuffers,
    diffused: ChannelBuffers,
    /// Host-layout copy of the (possibly reversed) input
    dry: Vec<Vec<Sample>>,
    /// Host-layout wet signal after fan-in
    wet: Vec<Vec<Sample>>,
}

impl Buffers {
    fn try_new(spec: &ProcessSpec) -> RvResult<Self> {
        let capacity = MultiDelayLine::capacity_for(spec);
        let block = spec.max_block_size;

        let host = |channels: usize| -> RvResult<Vec<Vec<Sample>>> {
            let mut buffers = Vec::new();
            buffers
                .try_reserve_exact(channels)
                .map_err(|_| RvError::Allocation {
                    requested: channels,
                })?;
            for _ in 0..channels {
                buffers.push(try_zeroed(block)?);
            }
            Ok(buffers)
        };

        Ok(Self {
            head: WriteHead::new(capacity),
            input_line: MultiDelayLine::try_new(INTERNAL_CHANNELS, capacity, spec.sample_rate)?,
            diffused_line: MultiDelayLine::try_new(INTERNAL_CHANNELS, capacity, spec.sample_rate)?,
            diffusion: DiffusionNetwork::try_new(block)?,
            internal: try_channel_buffers(block)?,
            diffused: try_channel_buffers(block)?,
            dry: host(spec.channel_count)?,
            wet: host(spec.channel_count)?,
        })
    }

    fn clear(&mut self) {
        self.head.reset();
        self.input_line.clear();
        self.diffused_line.clear();
        for channel in self
            .internal
            .iter_mut()
            .chain(self.diffused.iter_mut())
            .chain(self.dry.iter_mut())
            .chain(self.wet.iter_mut())
        {
            channel.fill(0.0);
        }
    }
}

/// Four-channel feedback delay network reverb
#[derive(Debug)]
pub struct ReverbEngine {
    state: EngineState,
    spec: Option<ProcessSpec>,
    buffers: Option<Buffers>,
    mix: MixBank,
    decorrelation: Decorrelation,
    offsets: DecorrelationOffsets,
    damping: DampingBank,
    feedback: FeedbackCore,
    fault_count: u64,
}

impl ReverbEngine {
    pub fn new() -> Self {
        Self {
            state: EngineState::Uninitialized,
            spec: None,
            buffers: None,
            mix: MixBank::new(),
            decorrelation: Decorrelation::default(),
            offsets: DecorrelationOffsets::default(),
            damping: DampingBank::new(ProcessSpec::default().sample_rate),
            feedback: FeedbackCore::new(),
            fault_count: 0,
        }
    }

    /// Builder form of [`ReverbEngine::set_decorrelation`]
    pub fn with_decorrelation(mut self, source: Decorrelation) -> Self {
        self.set_decorrelation(source);
        self
    }

    /// Choose where the decorrelation table comes from
    ///
    /// Takes effect immediately when prepared, otherwise on the next `prepare`.
    pub fn set_decorrelation(&mut self, source: Decorrelation) {
        self.decorrelation = source;
        if let Some(spec) = self.spec {
            self.offsets = DecorrelationOffsets::generate(source, spec.sample_rate);
        }
    }

    /// Offsets currently applied to the diffusion reads
    pub fn decorrelation_offsets(&self) -> [usize; INTERNAL_CHANNELS] {
        self.offsets.as_array()
    }

    #[inline]
    pub fn state(&self) -> EngineState {
        self.state
    }

    #[inline]
    pub fn spec(&self) -> Option<ProcessSpec> {
        self.spec
    }

    /// Blocks aborted by an internal bounds error since the last prepare
    #[inline]
    pub fn fault_count(&self) -> u64 {
        self.fault_count
    }

    /// Current shared write position, `None` until prepared
    pub fn write_position(&self) -> Option<usize> {
        self.buffers.as_ref().map(|b| b.head.position())
    }

    /// Address and capacity of every prepared buffer
    ///
    /// Comparing two snapshots shows whether processing reallocated.
    pub fn allocation_snapshot(&self) -> Vec<(*const Sample, usize)> {
        let Some(buffers) = self.buffers.as_ref() else {
            return Vec::new();
        };
        let mut snapshot = vec![
            (buffers.input_line.storage_ptr(), buffers.input_line.capacity()),
            (
                buffers.diffused_line.storage_ptr(),
                buffers.diffused_line.capacity(),
            ),
        ];
        for channel in buffers
            .internal
            .iter()
            .chain(buffers.diffused.iter())
            .chain(buffers.dry.iter())
            .chain(buffers.wet.iter())
        {
            snapshot.push((channel.as_ptr(), channel.capacity()));
        }
        snapshot
    }

    /// Prepare for `spec`, keeping the previous buffers if anything fails
    pub fn prepare(&mut self, spec: ProcessSpec) -> RvResult<()> {
        if let Err(err) = spec.validate() {
            log::warn!("rejecting process spec {spec:?}: {err}");
            return Err(err);
        }
        if spec.channel_count > INTERNAL_CHANNELS {
            log::warn!(
                "{} host channels: channels past {INTERNAL_CHANNELS} receive no wet signal",
                spec.channel_count
            );
        }

        let buffers = match Buffers::try_new(&spec) {
            Ok(buffers) => buffers,
            Err(err) => {
                log::warn!("prepare failed, keeping previous buffers: {err}");
                return Err(err);
            }
        };

        self.offsets = DecorrelationOffsets::generate(self.decorrelation, spec.sample_rate);
        self.damping.set_sample_rate(spec.sample_rate);
        self.feedback.reset();
        self.fault_count = 0;

        log::debug!(
            "prepared: {} Hz, block {}, {} channels, line capacity {}, offsets {:?}",
            spec.sample_rate,
            spec.max_block_size,
            spec.channel_count,
            buffers.head.capacity(),
            self.offsets.as_array()
        );

        self.buffers = Some(buffers);
        self.spec = Some(spec);
        self.state = EngineState::Prepared;
        Ok(())
    }

    /// Process one host block in place
    ///
    /// A no-op until prepared. Blocks longer than the prepared maximum are
    /// split into chunks.
    pub fn process(&mut self, block: &mut [&mut [Sample]], settings: &Settings) {
        let (Some(spec), Some(_)) = (self.spec, self.buffers.as_ref()) else {
            return;
        };
        let settings = settings.sanitized();

        for channel in block.iter_mut().skip(spec.channel_count) {
            channel.fill(0.0);
        }

        let channels = block.len().min(spec.channel_count);
        if channels == 0 {
            return;
        }
        let host = &mut block[..channels];
        let frames = host.iter().map(|c| c.len()).min().unwrap_or(0);

        let mut start = 0;
        while start < frames {
            let len = (frames - start).min(spec.max_block_size);
            if self.process_chunk(host, start, len, &settings).is_err() {
                self.fault_count += 1;
            }
            start += len;
        }
        self.state = EngineState::Processing;
    }

    /// One chunk of at most `max_block_size` frames
    ///
    /// On error the host samples and the write head are left untouched.
    /// Delay-line writes made before the failure stay in the lines and are
    /// overwritten by the next chunk, which starts at the same head position.
    fn process_chunk(
        &mut self,
        host: &mut [&mut [Sample]],
        start: usize,
        frames: usize,
        settings: &Settings,
    ) -> RvResult<()> {
        let Self {
            buffers,
            mix,
            offsets,
            damping,
            feedback,
            ..
        } = self;
        let buf = buffers.as_mut().ok_or(RvError::NotPrepared)?;
        let channels = host.len();
        let end = start + frames;

        for (dry, src) in buf.dry.iter_mut().zip(host.iter()) {
            let dry = &mut dry[..frames];
            dry.copy_from_slice(&src[start..end]);
            if settings.reverse {
                dry.reverse();
            }
        }

        fan_out(&buf.dry[..channels], &mut buf.internal, frames);

        for (channel, samples) in buf.internal.iter().enumerate() {
            buf.input_line
                .write(&buf.head, channel, &samples[..frames])?;
        }

        buf.diffusion.process(
            &buf.input_line,
            &buf.head,
            offsets,
            mix,
            &buf.internal,
            &mut buf.diffused,
            frames,
            settings.diffusion_steps,
        )?;

        damping.set_cutoff(settings.damping_frequency);
        damping.process(&mut buf.diffused, frames, settings.damping);

        feedback.process(
            &mut buf.diffused_line,
            &buf.head,
            mix,
            &mut buf.diffused,
            &mut buf.internal,
            frames,
            settings,
        )?;

        fan_in(&buf.internal, &mut buf.wet[..channels], frames);

        let wet_gain = settings.wet_level * WET_SCALE;
        for ((out, dry), wet) in host.iter_mut().zip(&buf.dry).zip(&buf.wet) {
            let samples = out[start..end]
                .iter_mut()
                .zip(&dry[..frames])
                .zip(&wet[..frames]);
            for ((y, &d), &w) in samples {
                *y = sanitize((d * settings.dry_level + w * wet_gain) * settings.gain);
            }
        }

        buf.head.advance(frames);
        Ok(())
    }

    /// Free every buffer
    pub fn release(&mut self) {
        if self.buffers.take().is_some() {
            log::debug!("released engine buffers");
        }
        self.spec = None;
        self.state = EngineState::Released;
    }
}

impl Default for ReverbEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for ReverbEngine {
    fn reset(&mut self) {
        if let Some(buffers) = self.buffers.as_mut() {
            buffers.clear();
        }
        self.damping.reset();
        self.feedback.reset();
    }
}

impl BlockProcessor for ReverbEngine {
    fn prepare(&mut self, spec: ProcessSpec) -> RvResult<()> {
        ReverbEngine::prepare(self, spec)
    }

    fn process(&mut self, block: &mut [&mut [Sample]], settings: &Settings) {
        ReverbEngine::process(self, block, settings)
    }

    fn release(&mut self) {
        ReverbEngine::release(self)
    }
}
