//! WebAssembly bindings via wasm-bindgen for browser integration.
//!
//! This module is only compiled when the `web` feature is enabled.
//!
//! # Usage
//!
//! Build with wasm-pack:
//! ```bash
//! wasm-pack build --target web --features web
//! ```
//!
//! # JavaScript Example
//!
//! ```javascript
//! import init, { spectral_canvas_init, SpectralCanvas } from './spectral_canvas.js';
//!
//! await init();
//! spectral_canvas_init();
//!
//! const canvas = new SpectralCanvas();
//! canvas.begin_stroke(0, 0, 0.8, 0xFF00FFFF);
//! canvas.update_stroke(4, 2, 0.8);
//!
//! // In the AudioWorklet
//! canvas.render(128, left, right);
//! ```

use wasm_bindgen::prelude::*;

use crate::audio_buffer::AudioBuffer;
use crate::bridge::PaintReadback;
use crate::canvas::{Bounds, Point};
use crate::color::Color;
use crate::config::{DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE, PaintConfig};
use crate::engine_controller::{EngineController, PaintClient, create_engine_controller};
use crate::pool::MAX_OSCILLATORS;

// ═══════════════════════════════════════════════════════════════════════════
// Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the wasm module. Call this once before using any other functions.
/// Sets up panic hooks and console logging.
#[wasm_bindgen]
pub fn spectral_canvas_init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════

/// Configuration for creating a canvas.
#[wasm_bindgen]
#[derive(Clone, Copy)]
pub struct SpectralConfig {
    /// Sample rate in Hz (e.g., 44100.0, 48000.0).
    pub sample_rate: f64,
    /// Render block size in frames. AudioWorklets use 128.
    pub block_size: u32,
    /// Oscillator pool capacity, at most 256.
    pub max_oscillators: u32,
}

#[wasm_bindgen]
impl SpectralConfig {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(sample_rate: f64, block_size: u32, max_oscillators: u32) -> Self {
        Self {
            sample_rate,
            block_size,
            max_oscillators,
        }
    }
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE as u32,
            max_oscillators: MAX_OSCILLATORS as u32,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Readback Data
// ═══════════════════════════════════════════════════════════════════════════

/// Renderer telemetry for UI meters.
#[wasm_bindgen]
#[derive(Clone, Copy, Default)]
pub struct SpectralReadback {
    /// Processing time over block duration.
    pub cpu_load: f32,
    pub active_oscillators: u32,
    pub blocks_processed: u64,
    pub active: bool,
}

impl From<PaintReadback> for SpectralReadback {
    fn from(r: PaintReadback) -> Self {
        Self {
            cpu_load: r.cpu_load,
            active_oscillators: r.active_oscillators as u32,
            blocks_processed: r.blocks_processed,
            active: r.active,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Canvas
// ═══════════════════════════════════════════════════════════════════════════

/// Both engine halves in one object.
///
/// Browsers run the gesture handlers and the AudioWorklet in separate
/// realms, so commands still pass through the queue and are applied at
/// the start of each `render`.
#[wasm_bindgen]
pub struct SpectralCanvas {
    client: PaintClient,
    controller: EngineController,
    scratch: Vec<f32>,
}

#[wasm_bindgen]
impl SpectralCanvas {
    #[wasm_bindgen(constructor)]
    pub fn new() -> SpectralCanvas {
        Self::new_with_config(SpectralConfig::default())
    }

    pub fn new_with_config(config: SpectralConfig) -> SpectralCanvas {
        let config = PaintConfig::default()
            .with_max_oscillators(config.max_oscillators as usize)
            .with_audio(config.sample_rate, config.block_size as usize)
            .sanitized();
        let (client, controller) = create_engine_controller(config);

        SpectralCanvas {
            client,
            controller,
            scratch: vec![0.0; config.block_size * 2],
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Strokes
    // ─────────────────────────────────────────────────────────────────────────

    /// `argb` is a packed 0xAARRGGBB colour. Returns `false` if the queue was full.
    pub fn begin_stroke(&mut self, x: f32, y: f32, pressure: f32, argb: u32) -> bool {
        self.client
            .begin_stroke(Point::new(x, y), pressure, Color::from_argb(argb))
            .is_ok()
    }

    pub fn update_stroke(&mut self, x: f32, y: f32, pressure: f32) -> bool {
        self.client
            .update_stroke(Point::new(x, y), pressure)
            .is_ok()
    }

    pub fn end_stroke(&mut self) -> bool {
        self.client.end_stroke().is_ok()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Canvas
    // ─────────────────────────────────────────────────────────────────────────

    pub fn clear(&mut self) -> bool {
        self.client.clear_canvas().is_ok()
    }

    pub fn clear_region(&mut self, left: f32, bottom: f32, right: f32, top: f32) -> bool {
        self.client
            .clear_region(Bounds::new(left, bottom, right, top))
            .is_ok()
    }

    pub fn set_frequency_range(&mut self, min_hz: f32, max_hz: f32) -> bool {
        self.client.set_frequency_range(min_hz, max_hz).is_ok()
    }

    pub fn set_canvas_region(&mut self, left: f32, right: f32, bottom: f32, top: f32) -> bool {
        self.client
            .set_canvas_region(left, right, bottom, top)
            .is_ok()
    }

    pub fn set_playhead(&mut self, position: f32) -> bool {
        self.client.set_playhead_position(position).is_ok()
    }

    pub fn set_master_gain(&mut self, gain: f32) -> bool {
        self.client.set_master_gain(gain).is_ok()
    }

    pub fn set_active(&mut self, active: bool) -> bool {
        self.client.set_active(active).is_ok()
    }

    pub fn set_panning(&self, enabled: bool) {
        self.client.set_panning_enabled(enabled);
    }

    pub fn canvas_y_to_frequency(&self, y: f32) -> f32 {
        self.client.mapping().canvas_y_to_frequency(y)
    }

    pub fn frequency_to_canvas_y(&self, frequency: f32) -> f32 {
        self.client.mapping().frequency_to_canvas_y(frequency)
    }

    pub fn canvas_x_to_time(&self, x: f32) -> f32 {
        self.client.mapping().canvas_x_to_time(x)
    }

    pub fn time_to_canvas_x(&self, time: f32) -> f32 {
        self.client.mapping().time_to_canvas_x(time)
    }

    pub fn get_readback(&self) -> SpectralReadback {
        self.client.readback().into()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rendering
    // ─────────────────────────────────────────────────────────────────────────

    pub fn prepare(&mut self, sample_rate: f64, block_size: u32) {
        self.controller
            .prepare_to_play(sample_rate, block_size as usize);
        let needed = self.controller.renderer().block_size() * 2;
        if self.scratch.len() < needed {
            self.scratch.resize(needed, 0.0);
        }
    }

    /// Render `frames` into separate channel arrays, in block-sized chunks.
    pub fn render(&mut self, frames: u32, left: &mut [f32], right: &mut [f32]) {
        let total_frames = frames as usize;
        if left.len() < total_frames || right.len() < total_frames {
            left.fill(0.0);
            right.fill(0.0);
            return;
        }

        let max_block = self.controller.renderer().block_size();
        let mut offset = 0;
        while offset < total_frames {
            let chunk_frames = (total_frames - offset).min(max_block);

            let data = &mut self.scratch[..chunk_frames * 2];
            let mut buffer = AudioBuffer::new(data, 2);
            self.controller.process_block(&mut buffer);

            left[offset..offset + chunk_frames].copy_from_slice(buffer.channel(0));
            right[offset..offset + chunk_frames].copy_from_slice(buffer.channel(1));
            offset += chunk_frames;
        }
    }

    pub fn release(&mut self) {
        self.controller.release_resources();
    }
}

impl Default for SpectralCanvas {
    fn default() -> Self {
        Self::new()
    }
}
