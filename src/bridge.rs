//! Thread-safe split between the paint control surface and the renderer.
//!
//! # Architecture
//!
//! - **Control thread** owns [`PaintEngine`]: strokes, slot allocation and
//!   every write into the back buffer
//! - **Audio thread** owns [`PaintRenderer`]: front buffer reads, envelope
//!   transitions and slot reclamation
//! - Both hold the same [`OscillatorPool`] and [`SharedControls`]; finished
//!   slot indices travel audio -> control over an `rtrb` ring
//!
//! # Usage
//!
//! ```ignore
//! let (mut engine, mut renderer) = create_paint_engine(PaintConfig::default());
//!
//! // Control thread
//! engine.begin_stroke(Point::new(0.0, 0.0), 0.8, Color::WHITE);
//! engine.update_stroke(Point::new(4.0, 2.0), 0.8);
//!
//! // Audio thread
//! renderer.prepare_to_play(48_000.0, 512);
//! renderer.process_block(&mut buffer);
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};

use log::info;

use crate::atomic_float::AtomicF32;
use crate::config::{PaintConfig, clamp_gain};
use crate::engine::PaintEngine;
use crate::pool::OscillatorPool;
use crate::renderer::PaintRenderer;

/// Snapshot of renderer telemetry for UI meters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PaintReadback {
    pub cpu_load: f32,
    pub active_oscillators: usize,
    pub blocks_processed: u64,
    pub active: bool,
}

/// Lock-free controls and telemetry shared by both halves.
///
/// Control-side setters are read by the renderer once per block; the
/// renderer publishes CPU load and the active slot count back.
#[derive(Debug)]
pub struct SharedControls {
    /// Stored as f32 bits
    cpu_load: AtomicF32,
    active_oscillators: AtomicUsize,
    blocks_processed: AtomicU64,

    master_gain: AtomicF32,
    panning: AtomicBool,
    active: AtomicBool,
}

impl SharedControls {
    pub fn new(config: &PaintConfig) -> Self {
        Self {
            cpu_load: AtomicF32::new(0.0),
            active_oscillators: AtomicUsize::new(0),
            blocks_processed: AtomicU64::new(0),
            master_gain: AtomicF32::new(clamp_gain(config.master_gain)),
            panning: AtomicBool::new(config.panning),
            active: AtomicBool::new(config.start_active),
        }
    }

    // MARK: - Telemetry (written by the renderer)

    /// Processing time over block duration for the last block.
    #[inline]
    pub fn cpu_load(&self) -> f32 {
        self.cpu_load.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn active_oscillators(&self) -> usize {
        self.active_oscillators.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn blocks_processed(&self) -> u64 {
        self.blocks_processed.load(Ordering::Relaxed)
    }

    pub fn readback(&self) -> PaintReadback {
        PaintReadback {
            cpu_load: self.cpu_load(),
            active_oscillators: self.active_oscillators(),
            blocks_processed: self.blocks_processed(),
            active: self.is_active(),
        }
    }

    #[inline]
    pub(crate) fn publish_block(&self, cpu_load: f32, active_oscillators: usize) {
        self.cpu_load.store(cpu_load, Ordering::Relaxed);
        self.active_oscillators
            .store(active_oscillators, Ordering::Relaxed);
        self.blocks_processed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn reset_telemetry(&self) {
        self.cpu_load.store(0.0, Ordering::Relaxed);
        self.active_oscillators.store(0, Ordering::Relaxed);
    }

    // MARK: - Controls (written by the control side)

    /// Target master gain; the renderer ramps toward it.
    #[inline]
    pub fn master_gain(&self) -> f32 {
        self.master_gain.load(Ordering::Relaxed)
    }

    /// Clamp to `[0, 2]` and store. Returns the stored value.
    pub fn set_master_gain(&self, gain: f32) -> f32 {
        let gain = clamp_gain(gain);
        self.master_gain.store(gain, Ordering::Relaxed);
        gain
    }

    #[inline]
    pub fn panning_enabled(&self) -> bool {
        self.panning.load(Ordering::Relaxed)
    }

    pub fn set_panning_enabled(&self, enabled: bool) {
        self.panning.store(enabled, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }
}

/// Create a linked control/audio pair over one oscillator pool.
///
/// The config is sanitized first, so any input yields a working engine.
pub fn create_paint_engine(config: PaintConfig) -> (PaintEngine, PaintRenderer) {
    let config = config.sanitized();
    let pool = Arc::new(OscillatorPool::new(config.max_oscillators));
    let controls = Arc::new(SharedControls::new(&config));

    // An index can be reclaimed again before the control side drains it.
    let (reclaimed_tx, reclaimed_rx) = rtrb::RingBuffer::new(pool.capacity() * 2);

    let engine = PaintEngine::new(
        config,
        Arc::clone(&pool),
        Arc::clone(&controls),
        reclaimed_rx,
    );
    let renderer = PaintRenderer::new(config, pool, controls, reclaimed_tx);

    info!(
        "paint engine created: {} oscillators, {} Hz, block {}",
        config.max_oscillators, config.sample_rate, config.block_size
    );
    (engine, renderer)
}
