// src/oscillator.rs

use std::f32::consts::TAU;

/// Synthesis parameters derived from one paint sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioParams {
    /// Hz
    pub frequency: f32,
    /// 0-1
    pub amplitude: f32,
    /// Normalized canvas time, 0-1
    pub time: f32,
    /// 0 = left, 1 = right
    pub pan: f32,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            frequency: 440.0,
            amplitude: 0.0,
            time: 0.0,
            pan: 0.5,
        }
    }
}

/// A single additive sine voice.
///
/// Amplitude and pan glide toward their targets; frequency is set
/// directly and is not smoothed here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Oscillator {
    pub frequency: f32,
    pub amplitude: f32,
    pub target_amplitude: f32,
    pub pan: f32,
    pub target_pan: f32,
    /// Always in `[0, 1)`.
    pub phase: f32,
    pub phase_increment: f32,
}

impl Default for Oscillator {
    fn default() -> Self {
        Self {
            frequency: 440.0,
            amplitude: 0.0,
            target_amplitude: 0.0,
            pan: 0.5,
            target_pan: 0.5,
            phase: 0.0,
            phase_increment: 0.0,
        }
    }
}

impl Oscillator {
    /// Set frequency and the amplitude/pan targets.
    ///
    /// A non-finite frequency keeps the current one.
    pub fn set_parameters(&mut self, params: &AudioParams) {
        if params.frequency.is_finite() {
            self.frequency = params.frequency.max(0.0);
        }
        self.target_amplitude = clamp_unit(params.amplitude, 0.0);
        self.target_pan = clamp_unit(params.pan, 0.5);
    }

    /// Advance phase by one sample and wrap into `[0, 1)`.
    #[inline]
    pub fn update_phase(&mut self, sample_rate: f32) {
        self.phase_increment = if sample_rate > 0.0 { self.frequency / sample_rate } else { 0.0 };
        self.phase += self.phase_increment;

        if self.phase >= 1.0 || self.phase < 0.0 {
            self.phase -= self.phase.floor();
        }
        // fract of a tiny negative rounds up to exactly 1.0
        if !(0.0..1.0).contains(&self.phase) {
            self.phase = 0.0;
        }
    }

    #[inline]
    pub fn get_sample(&self) -> f32 {
        (self.phase * TAU).sin() * self.amplitude
    }

    /// One-pole glide toward targets: amplitude at twice the base rate,
    /// pan at the base rate.
    #[inline]
    pub fn smooth_parameters(&mut self, rate: f32) {
        let amplitude_rate = (rate * 2.0).clamp(0.0, 1.0);
        let pan_rate = rate.clamp(0.0, 1.0);

        self.amplitude += (self.target_amplitude - self.amplitude) * amplitude_rate;
        self.pan += (self.target_pan - self.pan) * pan_rate;
    }

    /// Whether the oscillator is audible or heading there.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.target_amplitude > 0.0 || self.amplitude > 1.0e-4
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[inline]
fn clamp_unit(value: f32, fallback: f32) -> f32 {
    if value.is_nan() { fallback } else { value.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_phase_stays_wrapped() {
        let frequencies = [0.0, 1.0, 440.0, 12_345.6, 47_999.0, 48_000.0, 96_000.0, 1.0e9, -220.0];

        for freq in frequencies {
            let mut osc = Oscillator {
                frequency: freq,
                ..Default::default()
            };
            for _ in 0..10_000 {
                osc.update_phase(48_000.0);
                assert!(
                    (0.0..1.0).contains(&osc.phase),
                    "freq {} produced phase {}",
                    freq,
                    osc.phase
                );
            }
        }
    }

    #[test]
    fn test_set_parameters_clamps() {
        let mut osc = Oscillator::default();
        osc.set_parameters(&AudioParams {
            frequency: f32::NAN,
            amplitude: 3.0,
            time: 0.0,
            pan: f32::NAN,
        });

        assert_eq!(osc.frequency, 440.0);
        assert_eq!(osc.target_amplitude, 1.0);
        assert_eq!(osc.target_pan, 0.5);
    }

    #[test]
    fn test_smoothing_converges_without_jumping() {
        let mut osc = Oscillator::default();
        osc.target_amplitude = 1.0;
        osc.target_pan = 1.0;

        osc.smooth_parameters(0.01);
        assert_abs_diff_eq!(osc.amplitude, 0.02, epsilon = 1e-6);
        assert_abs_diff_eq!(osc.pan, 0.505, epsilon = 1e-6);

        for _ in 0..5_000 {
            osc.smooth_parameters(0.01);
        }
        assert_abs_diff_eq!(osc.amplitude, 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(osc.pan, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_sample_is_scaled_sine() {
        let osc = Oscillator {
            amplitude: 0.5,
            phase: 0.25,
            ..Default::default()
        };
        assert_abs_diff_eq!(osc.get_sample(), 0.5, epsilon = 1e-6);
    }
}
