// src/voice.rs
//
// Per-slot lifecycle state shared by the control and audio threads.
//
// Write discipline (one writer per field):
// - control thread: `activate` (-> Attack), targets, `last_used_time`,
//   `generation`, `in_use = true`, `release_request`
// - audio thread: forward envelope transitions (Attack -> Sustain ->
//   Release -> Inactive), `envelope_value`, `rendered_generation`,
//   `in_use = false`, consuming `release_request`

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use crate::atomic_float::{AtomicF32, AtomicF64};
use crate::oscillator::AudioParams;

/// Envelope stage of one oscillator slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EnvelopePhase {
    Inactive = 0,
    Attack = 1,
    Sustain = 2,
    Release = 3,
}

impl EnvelopePhase {
    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            1 => EnvelopePhase::Attack,
            2 => EnvelopePhase::Sustain,
            3 => EnvelopePhase::Release,
            _ => EnvelopePhase::Inactive,
        }
    }

    #[inline]
    pub fn is_active(self) -> bool {
        self != EnvelopePhase::Inactive
    }
}

/// Per-sample envelope increments, resolved once per sample rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeSteps {
    pub attack: f32,
    pub release: f32,
}

impl EnvelopeSteps {
    pub fn new(sample_rate: f64, attack_seconds: f32, release_seconds: f32) -> Self {
        let sample_rate = sample_rate.max(1.0) as f32;
        Self {
            attack: 1.0 / (attack_seconds * sample_rate).max(1.0),
            release: 1.0 / (release_seconds * sample_rate).max(1.0),
        }
    }
}

/// Identifies one activation of one slot.
///
/// A handle goes stale once the slot is re-activated (voice stolen).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    pub index: usize,
    pub generation: u32,
}

/// Envelope and lifecycle wrapper around one oscillator slot.
#[derive(Debug)]
pub struct EnhancedOscillatorState {
    envelope_phase: AtomicU8,
    envelope_value: AtomicF32,

    target_frequency: AtomicF32,
    target_amplitude: AtomicF32,
    target_pan: AtomicF32,

    /// Monotonic milliseconds of the last control-side touch.
    last_used_time: AtomicF64,
    in_use: AtomicBool,

    generation: AtomicU32,
    rendered_generation: AtomicU32,
    /// Generation the control thread wants released, 0 for none.
    release_request: AtomicU32,
}

impl Default for EnhancedOscillatorState {
    fn default() -> Self {
        Self {
            envelope_phase: AtomicU8::new(EnvelopePhase::Inactive as u8),
            envelope_value: AtomicF32::new(0.0),
            target_frequency: AtomicF32::new(440.0),
            target_amplitude: AtomicF32::new(0.0),
            target_pan: AtomicF32::new(0.5),
            last_used_time: AtomicF64::new(0.0),
            in_use: AtomicBool::new(false),
            generation: AtomicU32::new(0),
            rendered_generation: AtomicU32::new(0),
            release_request: AtomicU32::new(0),
        }
    }
}

impl EnhancedOscillatorState {
    // ───────────────────────────────────────────────────────────────
    // Readers (any thread)
    // ───────────────────────────────────────────────────────────────

    #[inline]
    pub fn envelope_phase(&self) -> EnvelopePhase {
        EnvelopePhase::from_u8(self.envelope_phase.load(Ordering::Acquire))
    }

    /// Active iff the envelope is in Attack, Sustain or Release.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.envelope_phase().is_active()
    }

    #[inline]
    pub fn envelope_value(&self) -> f32 {
        self.envelope_value.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    #[inline]
    pub fn last_used_time(&self) -> f64 {
        self.last_used_time.load(Ordering::Relaxed)
    }

    pub fn targets(&self) -> AudioParams {
        AudioParams {
            frequency: self.target_frequency.load(Ordering::Relaxed),
            amplitude: self.target_amplitude.load(Ordering::Relaxed),
            time: 0.0,
            pan: self.target_pan.load(Ordering::Relaxed),
        }
    }

    /// Handle for the current activation.
    #[inline]
    pub fn handle(&self, index: usize) -> VoiceHandle {
        VoiceHandle {
            index,
            generation: self.generation(),
        }
    }

    // ───────────────────────────────────────────────────────────────
    // Control thread
    // ───────────────────────────────────────────────────────────────

    /// Start a new activation: Attack from zero with the given targets.
    ///
    /// Returns the new generation.
    pub fn activate(&self, params: &AudioParams, now_ms: f64) -> u32 {
        self.set_targets(params);
        self.touch(now_ms);

        // 0 is reserved for "no release request".
        let generation = match self.generation.load(Ordering::Relaxed).wrapping_add(1) {
            0 => 1,
            next => next,
        };
        self.generation.store(generation, Ordering::Release);
        // Phase before `in_use`: see `reclaim_if_finished`.
        self.envelope_phase
            .store(EnvelopePhase::Attack as u8, Ordering::SeqCst);
        self.in_use.store(true, Ordering::SeqCst);
        generation
    }

    pub fn set_targets(&self, params: &AudioParams) {
        self.target_frequency
            .store(params.frequency, Ordering::Relaxed);
        self.target_amplitude
            .store(params.amplitude, Ordering::Relaxed);
        self.target_pan.store(params.pan, Ordering::Relaxed);
    }

    #[inline]
    pub fn touch(&self, now_ms: f64) {
        self.last_used_time.store(now_ms, Ordering::Relaxed);
    }

    /// Ask the audio thread to move activation `generation` into Release.
    ///
    /// Ignored by the audio thread if the slot has been re-activated since.
    pub fn request_release(&self, generation: u32) {
        self.release_request.store(generation, Ordering::Release);
    }

    // ───────────────────────────────────────────────────────────────
    // Audio thread
    // ───────────────────────────────────────────────────────────────

    /// Reset the envelope the first time a new activation is rendered.
    ///
    /// Returns `true` when `generation` had not been rendered before.
    #[inline]
    pub fn begin_render(&self, generation: u32) -> bool {
        if self.rendered_generation.load(Ordering::Relaxed) == generation {
            return false;
        }
        self.rendered_generation
            .store(generation, Ordering::Relaxed);
        self.envelope_value.store(0.0, Ordering::Relaxed);
        true
    }

    /// Consume a pending release request for the current activation.
    #[inline]
    pub fn take_release_request(&self) -> bool {
        if self.release_request.load(Ordering::Acquire) == 0 {
            return false;
        }
        let requested = self.release_request.swap(0, Ordering::AcqRel);
        requested != 0 && requested == self.generation()
    }

    /// Any active phase -> Release.
    #[inline]
    pub fn release(&self) {
        for from in [EnvelopePhase::Attack, EnvelopePhase::Sustain] {
            if self.transition(from, EnvelopePhase::Release) {
                return;
            }
        }
    }

    /// Advance the envelope by one sample and return its value.
    ///
    /// Attack ramps to 1 and moves to Sustain, Sustain holds at 1,
    /// Release ramps to 0 and moves to Inactive.
    #[inline]
    pub fn update_envelope(&self, steps: EnvelopeSteps) -> f32 {
        let mut value = self.envelope_value.load(Ordering::Relaxed);

        match self.envelope_phase() {
            EnvelopePhase::Inactive => value = 0.0,
            EnvelopePhase::Attack => {
                value += steps.attack;
                if value >= 1.0 {
                    value = 1.0;
                    self.transition(EnvelopePhase::Attack, EnvelopePhase::Sustain);
                }
            }
            EnvelopePhase::Sustain => value = 1.0,
            EnvelopePhase::Release => {
                value -= steps.release;
                if value <= 0.0 {
                    value = 0.0;
                    self.transition(EnvelopePhase::Release, EnvelopePhase::Inactive);
                }
            }
        }

        self.envelope_value.store(value, Ordering::Relaxed);
        value
    }

    /// Clear `in_use` once the slot is observed Inactive.
    ///
    /// Returns `true` if the slot was just reclaimed.
    #[inline]
    pub fn reclaim_if_finished(&self) -> bool {
        if self.envelope_phase() != EnvelopePhase::Inactive
            || self
                .in_use
                .compare_exchange(true, false, Ordering::SeqCst, Ordering::Relaxed)
                .is_err()
        {
            return false;
        }

        // Re-activated between the two loads: hand the slot back.
        if self.envelope_phase.load(Ordering::SeqCst) != EnvelopePhase::Inactive as u8 {
            self.in_use.store(true, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Forward transition that loses to a concurrent `activate`.
    #[inline]
    fn transition(&self, from: EnvelopePhase, to: EnvelopePhase) -> bool {
        self.envelope_phase
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
