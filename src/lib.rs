// src/lib.rs
//
// Library entry point for Rust, FFI (iOS/Swift) and wasm consumers.

pub mod atomic_float;
pub mod audio_buffer;
pub mod bridge;
pub mod canvas;
pub mod color;
pub mod command;
pub mod config;
pub mod engine;
pub mod engine_controller;
pub mod oscillator;
pub mod pool;
pub mod region;
pub mod renderer;
pub mod smoothing;
pub mod spatial_grid;
pub mod stroke;
pub mod voice;
pub mod voice_allocator;

#[cfg(feature = "ios")]
pub mod ffi;

#[cfg(feature = "web")]
pub mod wasm;

// Re-export key types for Rust consumers
pub use audio_buffer::AudioBuffer;
pub use bridge::{PaintReadback, SharedControls, create_paint_engine};
pub use canvas::{Bounds, CanvasMapping, Point};
pub use color::Color;
pub use command::{CommandQueueFull, PaintCommand};
pub use config::PaintConfig;
pub use engine::PaintEngine;
pub use engine_controller::{EngineController, PaintClient, create_engine_controller};
pub use pool::{MAX_OSCILLATORS, OscillatorPool};
pub use renderer::PaintRenderer;
pub use voice::{EnvelopePhase, VoiceHandle};
