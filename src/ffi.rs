// C-compatible FFI bindings for Swift/iOS integration.
//
// Safety requirements:
// - All pointers must be non-null unless documented otherwise
// - All handles must be created by this module and not fabricated
// - Canvas functions belong to the UI thread, renderer functions to the audio thread
// - Caller must call the corresponding _destroy function for each _create

use log::{LevelFilter, debug, info, warn};
use oslog::OsLogger;

use crate::audio_buffer::AudioBuffer;
use crate::bridge::PaintReadback;
use crate::canvas::{Bounds, Point};
use crate::color::Color;
use crate::command::CommandQueueFull;
use crate::config::{
    DEFAULT_BLOCK_SIZE, DEFAULT_MASTER_GAIN, DEFAULT_MAX_FREQUENCY, DEFAULT_MIN_FREQUENCY,
    DEFAULT_SAMPLE_RATE, PaintConfig,
};
use crate::engine_controller::{EngineController, PaintClient, create_engine_controller};
use crate::pool::MAX_OSCILLATORS;

// Logger subsystem identifier
const LOG_SUBSYSTEM: &str = "com.spectralcanvas.engine";

// ═══════════════════════════════════════════════════════════════════════════
// Logger Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the oslog logger.
///
/// Call once at application startup. Output appears in Console.app and
/// Xcode's debug console.
#[unsafe(no_mangle)]
pub extern "C" fn spectral_canvas_init_logger() {
    OsLogger::new(LOG_SUBSYSTEM)
        .level_filter(LevelFilter::Debug)
        .init()
        .ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Opaque Handle Types
// ═══════════════════════════════════════════════════════════════════════════

/// Opaque handle to the PaintClient (UI-side).
pub struct SpectralCanvas {
    inner: PaintClient,
}

/// Opaque handle to the EngineController (audio-side).
pub struct SpectralRenderer {
    inner: EngineController,
    /// Planar stereo scratch, one block long.
    scratch: Vec<f32>,
}

impl SpectralRenderer {
    fn block_size(&self) -> usize {
        self.inner.renderer().block_size()
    }

    /// Render `frames` (at most one block) into the planar scratch buffer.
    fn render_chunk(&mut self, frames: usize) -> (&[f32], &[f32]) {
        let data = &mut self.scratch[..frames * 2];
        let mut buffer = AudioBuffer::new(data, 2);
        self.inner.process_block(&mut buffer);

        let (left, right) = self.scratch[..frames * 2].split_at(frames);
        (left, right)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// FFI Result Types
// ═══════════════════════════════════════════════════════════════════════════

/// Readback data from the renderer (for UI meters/displays).
#[repr(C)]
pub struct SpectralReadback {
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
// Configuration
// ═══════════════════════════════════════════════════════════════════════════

/// Configuration for creating a canvas and renderer.
#[repr(C)]
pub struct SpectralConfig {
    /// Sample rate in Hz (e.g., 44100.0, 48000.0).
    pub sample_rate: f64,
    /// Render block size in frames.
    pub block_size: u32,
    /// Oscillator pool capacity, at most 256.
    pub max_oscillators: u32,
    pub min_frequency: f32,
    pub max_frequency: f32,
    pub master_gain: f32,
    pub panning: bool,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE as u32,
            max_oscillators: MAX_OSCILLATORS as u32,
            min_frequency: DEFAULT_MIN_FREQUENCY,
            max_frequency: DEFAULT_MAX_FREQUENCY,
            master_gain: DEFAULT_MASTER_GAIN,
            panning: true,
        }
    }
}

impl From<&SpectralConfig> for PaintConfig {
    fn from(cfg: &SpectralConfig) -> Self {
        PaintConfig {
            min_frequency: cfg.min_frequency,
            max_frequency: cfg.max_frequency,
            master_gain: cfg.master_gain,
            panning: cfg.panning,
            ..PaintConfig::default()
        }
        .with_max_oscillators(cfg.max_oscillators as usize)
        .with_audio(cfg.sample_rate, cfg.block_size as usize)
    }
}

/// Get the default configuration values.
#[unsafe(no_mangle)]
pub extern "C" fn spectral_canvas_default_config() -> SpectralConfig {
    SpectralConfig::default()
}

/// Create a canvas and renderer pair with default configuration.
///
/// # Safety
/// `out_renderer` must be a valid pointer to store the renderer handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn canvas_create(
    out_renderer: *mut *mut SpectralRenderer,
) -> *mut SpectralCanvas {
    let config = SpectralConfig::default();
    unsafe { canvas_create_with_config(&config, out_renderer) }
}

/// Create a canvas and renderer pair with custom configuration.
///
/// Returns the canvas handle. The renderer handle is returned via
/// `out_renderer`. Both must be destroyed with their destroy functions.
///
/// # Safety
/// - `config` must be a valid pointer to a SpectralConfig or NULL
/// - `out_renderer` must be a valid pointer to store the renderer handle
#[unsafe(no_mangle)]
pub unsafe extern "C" fn canvas_create_with_config(
    config: *const SpectralConfig,
    out_renderer: *mut *mut SpectralRenderer,
) -> *mut SpectralCanvas {
    let cfg = if config.is_null() {
        SpectralConfig::default()
    } else {
        unsafe { std::ptr::read(config) }
    };
    let config = PaintConfig::from(&cfg).sanitized();

    let (client, controller) = create_engine_controller(config);

    if !out_renderer.is_null() {
        unsafe {
            *out_renderer = Box::into_raw(Box::new(SpectralRenderer {
                inner: controller,
                scratch: vec![0.0; config.block_size * 2],
            }));
        }
    }

    info!("canvas created via FFI");
    Box::into_raw(Box::new(SpectralCanvas { inner: client }))
}

/// Destroy a canvas handle.
///
/// # Safety
/// `canvas` must be a valid pointer returned by `canvas_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn canvas_destroy(canvas: *mut SpectralCanvas) {
    if !canvas.is_null() {
        unsafe { drop(Box::from_raw(canvas)) };
    }
}

/// Destroy a renderer handle.
///
/// # Safety
/// `renderer` must be a valid pointer returned via `canvas_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn renderer_destroy(renderer: *mut SpectralRenderer) {
    if !renderer.is_null() {
        unsafe { drop(Box::from_raw(renderer)) };
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Canvas - Strokes
// ═══════════════════════════════════════════════════════════════════════════

fn queued(result: Result<(), CommandQueueFull>) -> bool {
    // PaintClient already logged the drop.
    result.is_ok()
}

/// Start a stroke. `argb` is a packed 0xAARRGGBB colour.
///
/// Returns `false` if the command queue was full.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn canvas_begin_stroke(
    canvas: *mut SpectralCanvas,
    x: f32,
    y: f32,
    pressure: f32,
    argb: u32,
) -> bool {
    if canvas.is_null() {
        return false;
    }
    let color = Color::from_argb(argb);
    queued(unsafe { (*canvas).inner.begin_stroke(Point::new(x, y), pressure, color) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn canvas_update_stroke(
    canvas: *mut SpectralCanvas,
    x: f32,
    y: f32,
    pressure: f32,
) -> bool {
    if canvas.is_null() {
        return false;
    }
    queued(unsafe { (*canvas).inner.update_stroke(Point::new(x, y), pressure) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn canvas_end_stroke(canvas: *mut SpectralCanvas) -> bool {
    if canvas.is_null() {
        return false;
    }
    queued(unsafe { (*canvas).inner.end_stroke() })
}

// ═══════════════════════════════════════════════════════════════════════════
// Canvas - Layout and Output
// ═══════════════════════════════════════════════════════════════════════════

#[unsafe(no_mangle)]
pub unsafe extern "C" fn canvas_clear(canvas: *mut SpectralCanvas) -> bool {
    if canvas.is_null() {
        return false;
    }
    queued(unsafe { (*canvas).inner.clear_canvas() })
}

/// Remove every region intersecting the rectangle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn canvas_clear_region(
    canvas: *mut SpectralCanvas,
    left: f32,
    bottom: f32,
    right: f32,
    top: f32,
) -> bool {
    if canvas.is_null() {
        return false;
    }
    let bounds = Bounds::new(left, bottom, right, top);
    queued(unsafe { (*canvas).inner.clear_region(bounds) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn canvas_set_frequency_range(
    canvas: *mut SpectralCanvas,
    min_hz: f32,
    max_hz: f32,
) -> bool {
    if canvas.is_null() {
        return false;
    }
    queued(unsafe { (*canvas).inner.set_frequency_range(min_hz, max_hz) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn canvas_set_region(
    canvas: *mut SpectralCanvas,
    left: f32,
    right: f32,
    bottom: f32,
    top: f32,
) -> bool {
    if canvas.is_null() {
        return false;
    }
    queued(unsafe { (*canvas).inner.set_canvas_region(left, right, bottom, top) })
}

/// Move the playhead. `position` is normalized 0-1.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn canvas_set_playhead(canvas: *mut SpectralCanvas, position: f32) -> bool {
    if canvas.is_null() {
        return false;
    }
    queued(unsafe { (*canvas).inner.set_playhead_position(position) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn canvas_set_master_gain(canvas: *mut SpectralCanvas, gain: f32) -> bool {
    if canvas.is_null() {
        return false;
    }
    queued(unsafe { (*canvas).inner.set_master_gain(gain) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn canvas_set_active(canvas: *mut SpectralCanvas, active: bool) -> bool {
    if canvas.is_null() {
        return false;
    }
    queued(unsafe { (*canvas).inner.set_active(active) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn canvas_set_panning(canvas: *mut SpectralCanvas, enabled: bool) {
    if canvas.is_null() {
        return;
    }
    unsafe { (*canvas).inner.set_panning_enabled(enabled) };
}

// ═══════════════════════════════════════════════════════════════════════════
// Canvas - Queries
// ═══════════════════════════════════════════════════════════════════════════

/// Get the latest renderer telemetry.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn canvas_get_readback(canvas: *const SpectralCanvas) -> SpectralReadback {
    if canvas.is_null() {
        return PaintReadback::default().into();
    }
    unsafe { (*canvas).inner.readback().into() }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn canvas_y_to_frequency(canvas: *const SpectralCanvas, y: f32) -> f32 {
    if canvas.is_null() {
        return 0.0;
    }
    unsafe { (*canvas).inner.mapping().canvas_y_to_frequency(y) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn canvas_frequency_to_y(
    canvas: *const SpectralCanvas,
    frequency: f32,
) -> f32 {
    if canvas.is_null() {
        return 0.0;
    }
    unsafe { (*canvas).inner.mapping().frequency_to_canvas_y(frequency) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn canvas_x_to_time(canvas: *const SpectralCanvas, x: f32) -> f32 {
    if canvas.is_null() {
        return 0.0;
    }
    unsafe { (*canvas).inner.mapping().canvas_x_to_time(x) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn canvas_time_to_x(canvas: *const SpectralCanvas, time: f32) -> f32 {
    if canvas.is_null() {
        return 0.0;
    }
    unsafe { (*canvas).inner.mapping().time_to_canvas_x(time) }
}

// ═══════════════════════════════════════════════════════════════════════════
// Renderer (Audio-side)
// ═══════════════════════════════════════════════════════════════════════════

/// Prepare for playback at a new sample rate and block size.
///
/// # Safety
/// Must not be called while audio is being rendered.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn renderer_prepare(
    renderer: *mut SpectralRenderer,
    sample_rate: f64,
    block_size: u32,
) {
    if renderer.is_null() {
        return;
    }
    let wrapper = unsafe { &mut (*renderer) };
    wrapper
        .inner
        .prepare_to_play(sample_rate, block_size as usize);

    let needed = wrapper.block_size() * 2;
    if wrapper.scratch.len() < needed {
        wrapper.scratch.resize(needed, 0.0);
    }
    debug!("renderer prepared via FFI: {sample_rate} Hz, block {block_size}");
}

/// Render audio frames into separate left and right buffers.
///
/// Queued canvas commands are applied before each block. Hosts asking for
/// more than one block per callback are served in block-sized chunks.
///
/// # Safety
/// - Must be called from the audio thread
/// - Output buffers must be valid and have space for `frames` samples
#[unsafe(no_mangle)]
pub unsafe extern "C" fn renderer_render(
    renderer: *mut SpectralRenderer,
    frames: u32,
    output_left: *mut f32,
    output_right: *mut f32,
) {
    let total_frames = frames as usize;

    // Fill with silence if invalid
    if renderer.is_null() || output_left.is_null() || output_right.is_null() {
        if !output_left.is_null() {
            unsafe { std::ptr::write_bytes(output_left, 0, total_frames) };
        }
        if !output_right.is_null() {
            unsafe { std::ptr::write_bytes(output_right, 0, total_frames) };
        }
        return;
    }

    let wrapper = unsafe { &mut (*renderer) };
    let max_block = wrapper.block_size();

    let out_left = unsafe { std::slice::from_raw_parts_mut(output_left, total_frames) };
    let out_right = unsafe { std::slice::from_raw_parts_mut(output_right, total_frames) };

    let mut offset = 0;
    while offset < total_frames {
        let chunk_frames = (total_frames - offset).min(max_block);
        let (left, right) = wrapper.render_chunk(chunk_frames);

        out_left[offset..offset + chunk_frames].copy_from_slice(left);
        out_right[offset..offset + chunk_frames].copy_from_slice(right);
        offset += chunk_frames;
    }
}

/// Render audio to an interleaved stereo buffer.
///
/// Output format: [L0, R0, L1, R1, L2, R2, ...]
///
/// # Safety
/// - `output` must have space for `frames * 2` floats
#[unsafe(no_mangle)]
pub unsafe extern "C" fn renderer_render_interleaved(
    renderer: *mut SpectralRenderer,
    frames: u32,
    output: *mut f32,
) {
    let total_frames = frames as usize;

    if renderer.is_null() || output.is_null() {
        if !output.is_null() {
            unsafe { std::ptr::write_bytes(output, 0, total_frames * 2) };
        }
        return;
    }

    let wrapper = unsafe { &mut (*renderer) };
    let max_block = wrapper.block_size();

    let out_slice = unsafe { std::slice::from_raw_parts_mut(output, total_frames * 2) };

    let mut offset = 0;
    while offset < total_frames {
        let chunk_frames = (total_frames - offset).min(max_block);
        let (left, right) = wrapper.render_chunk(chunk_frames);

        let out_chunk = &mut out_slice[offset * 2..(offset + chunk_frames) * 2];
        for (i, frame) in out_chunk.chunks_exact_mut(2).enumerate() {
            frame[0] = left[i];
            frame[1] = right[i];
        }
        offset += chunk_frames;
    }
}

/// Silence all oscillators and drop render state.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn renderer_release(renderer: *mut SpectralRenderer) {
    if renderer.is_null() {
        return;
    }
    unsafe { (*renderer).inner.release_resources() };
}

/// Number of commands still waiting for the audio thread.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn renderer_pending_commands(renderer: *const SpectralRenderer) -> u32 {
    if renderer.is_null() {
        return 0;
    }
    let pending = unsafe { (*renderer).inner.pending_commands() };
    if pending > 0 {
        warn!("{pending} paint commands waiting for the audio thread");
    }
    pending as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_render_destroy() {
        let mut renderer: *mut SpectralRenderer = std::ptr::null_mut();
        let canvas = unsafe { canvas_create(&mut renderer) };
        assert!(!canvas.is_null());
        assert!(!renderer.is_null());

        unsafe {
            assert!(canvas_begin_stroke(canvas, 0.0, 0.0, 1.0, 0xFF00_FFFF));
            assert!(canvas_update_stroke(canvas, 1.0, 0.0, 1.0));
        }

        // Longer than one block, exercises chunking.
        let frames = 1500;
        let mut left = vec![0.0f32; frames];
        let mut right = vec![0.0f32; frames];
        unsafe {
            renderer_render(renderer, frames as u32, left.as_mut_ptr(), right.as_mut_ptr());
        }
        assert!(left.iter().any(|&s| s != 0.0));

        let readback = unsafe { canvas_get_readback(canvas) };
        assert_eq!(readback.blocks_processed, 3);
        assert_eq!(readback.active_oscillators, 1);

        unsafe {
            renderer_destroy(renderer);
            canvas_destroy(canvas);
        }
    }

    #[test]
    fn test_null_handles_are_ignored() {
        let mut left = [1.0f32; 8];
        unsafe {
            assert!(!canvas_end_stroke(std::ptr::null_mut()));
            assert_eq!(canvas_y_to_frequency(std::ptr::null(), 0.0), 0.0);
            renderer_render(std::ptr::null_mut(), 8, left.as_mut_ptr(), std::ptr::null_mut());
        }
        assert!(left.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_interleaved_render() {
        let mut renderer: *mut SpectralRenderer = std::ptr::null_mut();
        let canvas = unsafe { canvas_create(&mut renderer) };
        let mut out = vec![1.0f32; 256 * 2];
        unsafe {
            renderer_render_interleaved(renderer, 256, out.as_mut_ptr());
            renderer_destroy(renderer);
            canvas_destroy(canvas);
        }
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
