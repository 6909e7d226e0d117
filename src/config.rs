// src/config.rs
//
// Engine configuration and defaults.

use std::time::Duration;

use crate::canvas::{Bounds, CanvasMapping};
use crate::pool::MAX_OSCILLATORS;

// Default audio configuration
pub const DEFAULT_SAMPLE_RATE: f64 = 48_000.0;
pub const DEFAULT_BLOCK_SIZE: usize = 512;

pub const DEFAULT_MIN_FREQUENCY: f32 = 20.0;
pub const DEFAULT_MAX_FREQUENCY: f32 = 20_000.0;
pub const DEFAULT_CANVAS: Bounds = Bounds::new(-100.0, -50.0, 100.0, 50.0);

pub const DEFAULT_REGION_SIZE: f32 = 50.0;
pub const DEFAULT_GRID_CELL_SIZE: f32 = 10.0;
pub const DEFAULT_INFLUENCE_RADIUS: f32 = 20.0;

pub const DEFAULT_ATTACK_SECONDS: f32 = 0.01;
pub const DEFAULT_RELEASE_SECONDS: f32 = 0.1;
pub const DEFAULT_PARAMETER_SMOOTHING: f32 = 0.001;

pub const DEFAULT_MASTER_GAIN: f32 = 0.7;
pub const MAX_MASTER_GAIN: f32 = 2.0;
pub const DEFAULT_GAIN_RAMP_SECONDS: f64 = 0.01;

/// Every ~2 s at 48 kHz / 512.
pub const DEFAULT_COMPACTION_INTERVAL: u32 = 100;

pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_COMMAND_BUDGET: Duration = Duration::from_micros(500);

/// Configuration for a paint engine and its renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaintConfig {
    pub sample_rate: f64,
    pub block_size: usize,
    /// Pool size, at most `MAX_OSCILLATORS`.
    pub max_oscillators: usize,

    pub min_frequency: f32,
    pub max_frequency: f32,
    pub log_frequency_scale: bool,
    pub canvas: Bounds,

    pub region_size: f32,
    pub grid_cell_size: f32,
    pub influence_radius: f32,

    pub attack_seconds: f32,
    pub release_seconds: f32,
    /// Per-sample one-pole base rate for amplitude/pan glides.
    pub parameter_smoothing: f32,

    pub master_gain: f32,
    pub gain_ramp_seconds: f64,
    pub panning: bool,
    pub start_active: bool,

    /// Blocks between back-buffer compactions; 0 disables.
    pub compaction_interval: u32,

    pub command_queue_capacity: usize,
    /// Wall-clock budget for draining commands in one block.
    pub command_budget: Duration,
}

impl Default for PaintConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            max_oscillators: MAX_OSCILLATORS,
            min_frequency: DEFAULT_MIN_FREQUENCY,
            max_frequency: DEFAULT_MAX_FREQUENCY,
            log_frequency_scale: true,
            canvas: DEFAULT_CANVAS,
            region_size: DEFAULT_REGION_SIZE,
            grid_cell_size: DEFAULT_GRID_CELL_SIZE,
            influence_radius: DEFAULT_INFLUENCE_RADIUS,
            attack_seconds: DEFAULT_ATTACK_SECONDS,
            release_seconds: DEFAULT_RELEASE_SECONDS,
            parameter_smoothing: DEFAULT_PARAMETER_SMOOTHING,
            master_gain: DEFAULT_MASTER_GAIN,
            gain_ramp_seconds: DEFAULT_GAIN_RAMP_SECONDS,
            panning: true,
            start_active: true,
            compaction_interval: DEFAULT_COMPACTION_INTERVAL,
            command_queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
            command_budget: DEFAULT_COMMAND_BUDGET,
        }
    }
}

impl PaintConfig {
    /// Same config with a different pool size.
    pub fn with_max_oscillators(mut self, max_oscillators: usize) -> Self {
        self.max_oscillators = max_oscillators;
        self
    }

    /// Same config with a different sample rate and block size.
    pub fn with_audio(mut self, sample_rate: f64, block_size: usize) -> Self {
        self.sample_rate = sample_rate;
        self.block_size = block_size;
        self
    }

    /// Clamp every field into its usable range.
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let positive = |value: f32, fallback: f32| {
            if value.is_finite() && value > 0.0 { value } else { fallback }
        };

        let mapping = self.mapping();
        Self {
            sample_rate: if self.sample_rate.is_finite() && self.sample_rate >= 1.0 {
                self.sample_rate
            } else {
                defaults.sample_rate
            },
            block_size: self.block_size.max(1),
            max_oscillators: self.max_oscillators.clamp(1, MAX_OSCILLATORS),
            min_frequency: mapping.min_frequency(),
            max_frequency: mapping.max_frequency(),
            log_frequency_scale: self.log_frequency_scale,
            canvas: mapping.bounds(),
            region_size: positive(self.region_size, defaults.region_size),
            grid_cell_size: positive(self.grid_cell_size, defaults.grid_cell_size),
            influence_radius: positive(self.influence_radius, defaults.influence_radius),
            attack_seconds: positive(self.attack_seconds, defaults.attack_seconds),
            release_seconds: positive(self.release_seconds, defaults.release_seconds),
            parameter_smoothing: if self.parameter_smoothing.is_finite() {
                self.parameter_smoothing.clamp(0.0, 1.0)
            } else {
                defaults.parameter_smoothing
            },
            master_gain: clamp_gain(self.master_gain),
            gain_ramp_seconds: if self.gain_ramp_seconds.is_finite() {
                self.gain_ramp_seconds.max(0.0)
            } else {
                defaults.gain_ramp_seconds
            },
            panning: self.panning,
            start_active: self.start_active,
            compaction_interval: self.compaction_interval,
            command_queue_capacity: self.command_queue_capacity.max(1),
            command_budget: self.command_budget,
        }
    }

    /// Coordinate mapping described by this config.
    pub fn mapping(&self) -> CanvasMapping {
        CanvasMapping::new(
            self.canvas,
            self.min_frequency,
            self.max_frequency,
            self.log_frequency_scale,
        )
    }
}

/// Master gain is kept in `[0, MAX_MASTER_GAIN]`; NaN mutes.
pub fn clamp_gain(gain: f32) -> f32 {
    if gain.is_nan() { 0.0 } else { gain.clamp(0.0, MAX_MASTER_GAIN) }
}
