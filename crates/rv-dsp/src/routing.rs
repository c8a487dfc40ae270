//! Host channel fan-out / fan-in
//!
//! The network always runs four channels. Host layouts with fewer channels
//! are spread cyclically over the network and folded back on the way out;
//! host channels past the fourth carry no wet signal.

use rv_core::Sample;

use crate::{ChannelBuffers, INTERNAL_CHANNELS, sanitize};

const N: usize = INTERNAL_CHANNELS;

/// Gain applied to every internal channel when folding into `host_channels`
#[inline]
pub fn fan_in_gain(host_channels: usize) -> Sample {
    host_channels.min(N) as f64 / N as f64
}

/// Internal channel `c` takes host channel `c mod M`
///
/// Non-finite host samples arrive as silence.
pub fn fan_out<S: AsRef<[Sample]>>(host: &[S], internal: &mut ChannelBuffers, frames: usize) {
    if host.is_empty() {
        for channel in internal.iter_mut() {
            channel[..frames].fill(0.0);
        }
        return;
    }
    for (c, channel) in internal.iter_mut().enumerate() {
        let source = host[c % host.len()].as_ref();
        let frames = frames.min(source.len());
        for (dst, &src) in channel[..frames].iter_mut().zip(&source[..frames]) {
            *dst = sanitize(src);
        }
    }
}

/// Fold the internal channels back onto `host`, replacing its contents
///
/// Internal channel `c < min(M, N)` overwrites host channel `c`; channels
/// `c ≥ M` are added into host channel `c mod M`. Host channels `≥ N` are
/// silenced.
pub fn fan_in<S: AsMut<[Sample]>>(internal: &ChannelBuffers, host: &mut [S], frames: usize) {
    let m = host.len();
    if m == 0 {
        return;
    }
    let gain = fan_in_gain(m);

    for channel in host.iter_mut().skip(N) {
        let channel = channel.as_mut();
        let frames = frames.min(channel.len());
        channel[..frames].fill(0.0);
    }

    for (c, source) in internal.iter().enumerate() {
        let target = host[c % m].as_mut();
        let frames = frames.min(target.len()).min(source.len());
        let pairs = target[..frames].iter_mut().zip(&source[..frames]);
        if c < m {
            for (dst, &src) in pairs {
                *dst = src * gain;
            }
        } else {
            for (dst, &src) in pairs {
                *dst += src * gain;
            }
        }
    }
}
