//! Sample types and audio buffer definitions

/// Type alias for audio samples (always f64 for maximum precision)
pub type Sample = f64;

/// Owned planar multichannel buffer (`channels × frames`)
///
/// Engines take blocks as `&mut [&mut [Sample]]`; `channel_slices_mut`
/// produces that view. Intended for offline drivers and tests, not for the
/// audio thread.
#[derive(Debug, Clone)]
pub struct MultiChannelBuffer {
    channels: Vec<Vec<Sample>>,
    frames: usize,
}

impl MultiChannelBuffer {
    pub fn new(num_channels: usize, frames: usize) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; num_channels],
            frames,
        }
    }

    /// Build from per-channel sample vectors. Shorter channels are zero-padded.
    pub fn from_channels(mut channels: Vec<Vec<Sample>>) -> Self {
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        for channel in &mut channels {
            channel.resize(frames, 0.0);
        }
        Self { channels, frames }
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn channel(&self, index: usize) -> Option<&[Sample]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> Option<&mut [Sample]> {
        self.channels.get_mut(index).map(Vec::as_mut_slice)
    }

    /// Mutable per-channel view over `frames` starting at `start`
    pub fn channel_slices_mut(&mut self, start: usize, frames: usize) -> Vec<&mut [Sample]> {
        let start = start.min(self.frames);
        let end = (start + frames).min(self.frames);
        self.channels
            .iter_mut()
            .map(|channel| &mut channel[start..end])
            .collect()
    }

    pub fn into_channels(self) -> Vec<Vec<Sample>> {
        self.channels
    }

    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_channels_pads_shorter_channels() {
        let buffer = MultiChannelBuffer::from_channels(vec![vec![1.0; 4], vec![0.5; 2]]);
        assert_eq!(buffer.frames(), 4);
        assert_eq!(buffer.channel(1), Some(&[0.5, 0.5, 0.0, 0.0][..]));
    }

    #[test]
    fn test_channel_slices_are_clipped_to_frames() {
        let mut buffer = MultiChannelBuffer::new(2, 10);
        let slices = buffer.channel_slices_mut(8, 16);
        assert_eq!(slices.len(), 2);
        assert!(slices.iter().all(|s| s.len() == 2));
    }

    #[test]
    fn test_clear_keeps_shape() {
        let mut buffer = MultiChannelBuffer::from_channels(vec![vec![0.3; 5]; 3]);
        buffer.clear();
        assert_eq!(buffer.num_channels(), 3);
        assert_eq!(buffer.frames(), 5);
        assert!(buffer.into_channels().iter().flatten().all(|&s| s == 0.0));
    }
}
