// src/audio_buffer.rs

/// A planar multichannel view over a host-provided sample slice.
///
/// Layout is `[ch0 frames..., ch1 frames..., ...]`.
#[derive(Debug)]
pub struct AudioBuffer<'a> {
    pub channels: usize,
    pub frames: usize,
    pub data: &'a mut [f32],
}

impl<'a> AudioBuffer<'a> {
    /// Create a new AudioBuffer wrapping existing planar data.
    ///
    /// Trailing samples that do not fill a whole frame are ignored.
    #[inline]
    pub fn new(data: &'a mut [f32], channels: usize) -> Self {
        let channels = channels.max(1);
        let frames = data.len() / channels;
        Self {
            channels,
            frames,
            data,
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    #[inline]
    pub fn channel(&self, ch: usize) -> &[f32] {
        let start = ch * self.frames;
        &self.data[start..start + self.frames]
    }

    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        let start = ch * self.frames;
        &mut self.data[start..start + self.frames]
    }

    /// Borrow the first two channels mutably at once.
    ///
    /// Returns `None` for the right channel on mono buffers.
    #[inline]
    pub fn stereo_mut(&mut self) -> (&mut [f32], Option<&mut [f32]>) {
        let frames = self.frames;
        let (left, rest) = self.data.split_at_mut(frames);
        if self.channels > 1 {
            (left, Some(&mut rest[..frames]))
        } else {
            (left, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planar_channels() {
        let mut data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let buffer = AudioBuffer::new(&mut data, 2);

        assert_eq!(buffer.frames, 3);
        assert_eq!(buffer.channel(0), &[1.0, 2.0, 3.0]);
        assert_eq!(buffer.channel(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_stereo_mut_on_mono() {
        let mut data = [0.5; 4];
        let mut buffer = AudioBuffer::new(&mut data, 1);
        let (left, right) = buffer.stereo_mut();

        assert_eq!(left.len(), 4);
        assert!(right.is_none());
    }
}
