//! Tone synthesis
//!
//! Renders a short sine burst into an interleaved stereo i16 buffer with the
//! tone on one channel and silence on the other.
//!
//! Envelope policy: a linear fade-in *and* a linear fade-out of the same
//! length are applied to every tone, cached or not. The fade length is
//! clamped to half the tone so the two ramps never overlap.

use std::f64::consts::TAU;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{
    DEFAULT_SAMPLE_RATE, MAX_TONE_DURATION_SECS, TONE_DURATION_SECS, TONE_FADE_SECS, TONE_VOLUME,
};
use crate::error::SynthError;

/// Stereo output channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Left,
    Right,
}

impl Channel {
    /// Both channels, left first
    pub const ALL: [Channel; 2] = [Channel::Left, Channel::Right];

    /// Position of this channel inside an interleaved frame
    pub fn index(self) -> usize {
        match self {
            Channel::Left => 0,
            Channel::Right => 1,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Left => f.write_str("left"),
            Channel::Right => f.write_str("right"),
        }
    }
}

/// What to play for one classified packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToneDescriptor {
    pub frequency_hz: u32,
    pub channel: Channel,
}

impl ToneDescriptor {
    pub fn new(frequency_hz: u32, channel: Channel) -> Self {
        Self {
            frequency_hz,
            channel,
        }
    }
}

impl fmt::Display for ToneDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz on {} channel", self.frequency_hz, self.channel)
    }
}

/// Interleaved stereo PCM, cheap to clone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StereoBuffer {
    samples: Arc<[i16]>,
    sample_rate: u32,
}

impl StereoBuffer {
    /// Wrap interleaved `[L, R, L, R, ..]` samples
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        debug_assert!(samples.len() % 2 == 0, "stereo buffer must hold whole frames");
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of stereo frames (sample pairs)
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples of a single channel
    pub fn channel(&self, channel: Channel) -> impl Iterator<Item = i16> + '_ {
        self.samples
            .chunks_exact(2)
            .map(move |frame| frame[channel.index()])
    }

    /// Largest absolute sample value on a channel
    pub fn peak(&self, channel: Channel) -> u16 {
        self.channel(channel)
            .map(i16::unsigned_abs)
            .max()
            .unwrap_or(0)
    }

    /// Playback length at the buffer's sample rate
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Tone envelope and format parameters shared by every tone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneShape {
    pub duration_secs: f64,
    pub sample_rate: u32,
    /// Peak level relative to i16 full scale, in (0, 1]
    pub volume: f32,
    pub fade_secs: f64,
}

impl Default for ToneShape {
    fn default() -> Self {
        Self {
            duration_secs: TONE_DURATION_SECS,
            sample_rate: DEFAULT_SAMPLE_RATE,
            volume: TONE_VOLUME,
            fade_secs: TONE_FADE_SECS,
        }
    }
}

impl ToneShape {
    pub fn validate(&self) -> Result<(), SynthError> {
        if !(self.duration_secs > 0.0 && self.duration_secs <= MAX_TONE_DURATION_SECS) {
            return Err(SynthError::InvalidDuration(self.duration_secs));
        }
        if self.sample_rate == 0 {
            return Err(SynthError::InvalidSampleRate(self.sample_rate));
        }
        if !(self.volume > 0.0 && self.volume <= 1.0) {
            return Err(SynthError::InvalidVolume(self.volume));
        }
        if !(self.fade_secs.is_finite() && self.fade_secs >= 0.0) {
            return Err(SynthError::InvalidFade(self.fade_secs));
        }
        Ok(())
    }

    /// Stereo frames per tone: `round(sample_rate * duration)`
    pub fn frame_count(&self) -> usize {
        (self.sample_rate as f64 * self.duration_secs).round() as usize
    }

    /// Frames in each fade ramp, never more than half the tone
    pub fn fade_frames(&self) -> usize {
        let fade_secs = self.fade_secs.min(self.duration_secs / 2.0);
        let frames = (self.sample_rate as f64 * fade_secs).round() as usize;
        frames.min(self.frame_count() / 2)
    }
}

/// Linear fade gain for frame `index` of a `len`-frame tone.
///
/// Rises from 0 over the first `fade_len` frames and falls from 1 over the
/// last `fade_len` frames; 1 in between.
pub fn fade_gain(index: usize, len: usize, fade_len: usize) -> f64 {
    if fade_len == 0 || index >= len {
        return 1.0;
    }
    let fade = fade_len as f64;
    let mut gain = 1.0;
    if index < fade_len {
        gain *= index as f64 / fade;
    }
    let fade_out_start = len.saturating_sub(fade_len);
    if index >= fade_out_start {
        gain *= 1.0 - (index - fade_out_start) as f64 / fade;
    }
    gain
}

/// Render a tone with explicit parameters.
///
/// The buffer is normalized to its own peak: the loudest sample lands on
/// `i16::MAX * volume` whatever the frequency or length. A buffer whose peak
/// is zero (0 Hz, or too short to hold a non-zero sample) is left silent.
pub fn render_tone(frequency_hz: u32, channel: Channel, shape: &ToneShape) -> StereoBuffer {
    let len = shape.frame_count();
    let fade_len = shape.fade_frames();
    let rate = shape.sample_rate as f64;
    let omega = TAU * frequency_hz as f64;

    let tone: Vec<f64> = (0..len)
        .map(|i| (omega * i as f64 / rate).sin() * fade_gain(i, len, fade_len))
        .collect();

    let peak = tone.iter().fold(0.0f64, |acc, s| acc.max(s.abs()));
    let scale = if peak > f64::EPSILON {
        i16::MAX as f64 * shape.volume as f64 / peak
    } else {
        0.0
    };

    let mut samples = vec![0i16; len * 2];
    let slot = channel.index();
    for (frame, value) in samples.chunks_exact_mut(2).zip(&tone) {
        frame[slot] = (value * scale).round() as i16;
    }

    StereoBuffer::new(samples, shape.sample_rate)
}

/// Renders tones for a fixed [`ToneShape`]
#[derive(Debug, Clone)]
pub struct ToneSynthesizer {
    shape: ToneShape,
}

impl ToneSynthesizer {
    pub fn new(shape: ToneShape) -> Result<Self, SynthError> {
        shape.validate()?;
        Ok(Self { shape })
    }

    pub fn shape(&self) -> &ToneShape {
        &self.shape
    }

    pub fn render(&self, descriptor: &ToneDescriptor) -> StereoBuffer {
        render_tone(descriptor.frequency_hz, descriptor.channel, &self.shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn shape(duration_secs: f64, volume: f32, fade_secs: f64) -> ToneShape {
        ToneShape {
            duration_secs,
            sample_rate: 44100,
            volume,
            fade_secs,
        }
    }

    #[test]
    fn test_frame_count_rounds() {
        assert_eq!(shape(0.15, 0.1, 0.05).frame_count(), 6615);
        assert_eq!(shape(0.1, 0.1, 0.05).frame_count(), 4410);
        // 44100 * 0.00001 = 0.441
        assert_eq!(shape(0.00001, 0.1, 0.0).frame_count(), 0);
    }

    #[test]
    fn test_render_layout() {
        let buffer = render_tone(330, Channel::Left, &ToneShape::default());
        assert_eq!(buffer.frames(), 6615);
        assert_eq!(buffer.samples().len(), 6615 * 2);
        assert!(buffer.channel(Channel::Right).all(|s| s == 0));
        assert!(buffer.peak(Channel::Left) > 0);

        let buffer = render_tone(261, Channel::Right, &ToneShape::default());
        assert!(buffer.channel(Channel::Left).all(|s| s == 0));
        assert!(buffer.peak(Channel::Right) > 0);
    }

    #[test]
    fn test_peak_is_volume_scaled_full_scale() {
        for volume in [0.1f32, 0.5, 1.0] {
            let buffer = render_tone(523, Channel::Left, &shape(0.15, volume, 0.05));
            let expected = i16::MAX as f64 * volume as f64;
            let peak = buffer.peak(Channel::Left) as f64;
            assert!((peak - expected).abs() <= 1.0, "volume {volume}: peak {peak}");
        }
    }

    #[test]
    fn test_fade_clamped_for_short_tones() {
        let short = shape(0.01, 0.1, 0.05);
        assert_eq!(short.frame_count(), 441);
        assert_eq!(short.fade_frames(), 220);

        let buffer = render_tone(392, Channel::Left, &short);
        assert_eq!(buffer.frames(), 441);
        assert_eq!(buffer.samples()[0], 0);
    }

    #[test]
    fn test_fade_envelope_monotonic() {
        let len = 6615;
        let fade_len = 2205;
        let gains: Vec<f64> = (0..len).map(|i| fade_gain(i, len, fade_len)).collect();

        assert_eq!(gains[0], 0.0);
        assert!(gains[..fade_len].windows(2).all(|w| w[0] <= w[1]));
        assert!(gains[len - fade_len..].windows(2).all(|w| w[0] >= w[1]));
        assert!(gains[fade_len..len - fade_len].iter().all(|g| *g == 1.0));
    }

    #[test]
    fn test_fade_edges_are_quiet() {
        let buffer = render_tone(330, Channel::Left, &ToneShape::default());
        let left: Vec<i16> = buffer.channel(Channel::Left).collect();
        let edge = 20;
        let head = left[..edge].iter().map(|s| s.unsigned_abs()).max().unwrap();
        let tail = left[left.len() - edge..]
            .iter()
            .map(|s| s.unsigned_abs())
            .max()
            .unwrap();
        let peak = buffer.peak(Channel::Left);
        assert!(head < peak / 10);
        assert!(tail < peak / 10);
    }

    #[test]
    fn test_zero_peak_is_silent() {
        let buffer = render_tone(0, Channel::Left, &ToneShape::default());
        assert_eq!(buffer.frames(), 6615);
        assert!(buffer.samples().iter().all(|s| *s == 0));

        let empty = render_tone(330, Channel::Right, &shape(0.00001, 0.1, 0.05));
        assert_eq!(empty.frames(), 0);
    }

    #[test]
    fn test_render_is_deterministic() {
        let synth = ToneSynthesizer::new(ToneShape::default()).unwrap();
        let descriptor = ToneDescriptor::new(330, Channel::Left);
        assert_eq!(synth.render(&descriptor), synth.render(&descriptor));
    }

    #[test]
    fn test_shape_validation() {
        assert!(ToneShape::default().validate().is_ok());
        assert_eq!(
            shape(0.0, 0.1, 0.05).validate(),
            Err(SynthError::InvalidDuration(0.0))
        );
        assert_eq!(
            shape(0.1, 0.0, 0.05).validate(),
            Err(SynthError::InvalidVolume(0.0))
        );
        assert_eq!(
            shape(0.1, 1.5, 0.05).validate(),
            Err(SynthError::InvalidVolume(1.5))
        );
        assert_eq!(
            shape(0.1, 0.1, -1.0).validate(),
            Err(SynthError::InvalidFade(-1.0))
        );
        assert_eq!(
            shape(1e15, 0.1, 0.05).validate(),
            Err(SynthError::InvalidDuration(1e15))
        );
        assert_eq!(
            shape(f64::INFINITY, 0.1, 0.05).validate(),
            Err(SynthError::InvalidDuration(f64::INFINITY))
        );
        assert!(shape(MAX_TONE_DURATION_SECS, 0.1, 0.05).validate().is_ok());
        let mut zero_rate = ToneShape::default();
        zero_rate.sample_rate = 0;
        assert!(ToneSynthesizer::new(zero_rate).is_err());
    }

    #[test]
    fn test_buffer_duration() {
        let buffer = render_tone(330, Channel::Left, &shape(0.1, 0.1, 0.05));
        assert_eq!(buffer.duration(), Duration::from_millis(100));
    }

    proptest! {
        #[test]
        fn prop_render_shape(
            frequency in 20u32..4000,
            duration in 0.005f64..0.3,
            volume in 0.01f32..=1.0,
            fade in 0.0f64..0.2,
            left in any::<bool>(),
        ) {
            let channel = if left { Channel::Left } else { Channel::Right };
            let other = if left { Channel::Right } else { Channel::Left };
            let shape = shape(duration, volume, fade);
            let buffer = render_tone(frequency, channel, &shape);

            prop_assert_eq!(buffer.frames(), (44100.0 * duration).round() as usize);
            prop_assert!(buffer.channel(other).all(|s| s == 0));

            let expected = i16::MAX as f64 * volume as f64;
            let peak = buffer.peak(channel) as f64;
            prop_assert!((peak - expected).abs() <= 1.0, "peak {} expected {}", peak, expected);
        }
    }
}
