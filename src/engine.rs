// src/engine.rs

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace};

use crate::bridge::SharedControls;
use crate::canvas::{Bounds, CanvasMapping, Point};
use crate::color::Color;
use crate::command::PaintCommand;
use crate::config::PaintConfig;
use crate::oscillator::AudioParams;
use crate::pool::OscillatorPool;
use crate::region::RegionMap;
use crate::spatial_grid::SpatialGrid;
use crate::stroke::{Stroke, StrokeId, StrokePoint};
use crate::voice::VoiceHandle;
use crate::voice_allocator::OscillatorAllocator;

/// Pressure above which a sample gets a fresh voice when one is free.
pub const ALLOCATE_IF_FREE_PRESSURE: f32 = 0.1;
/// Pressure above which a sample always gets a fresh voice.
pub const ALWAYS_ALLOCATE_PRESSURE: f32 = 0.5;

/// Map one paint sample to synthesis parameters.
///
/// Y gives frequency, X gives time, pressure gives amplitude and hue gives
/// pan. Colours without a hue (greys, transparent black) pan centre.
pub fn stroke_point_to_audio_params(mapping: &CanvasMapping, point: &StrokePoint) -> AudioParams {
    let color = point.color;
    let pan = if color == Color::TRANSPARENT_BLACK || color.saturation() <= 0.0 {
        0.5
    } else {
        color.hue()
    };

    AudioParams {
        frequency: mapping.canvas_y_to_frequency(point.position.y),
        amplitude: point.pressure,
        time: mapping.canvas_x_to_time(point.position.x),
        pan,
    }
}

/// Control-side paint engine.
///
/// Owns strokes, regions, the spatial grid and slot allocation. Every
/// operation is total: inputs are clamped and an exhausted pool steals.
///
/// Does NOT render; see [`crate::renderer::PaintRenderer`].
pub struct PaintEngine {
    config: PaintConfig,
    mapping: CanvasMapping,
    allocator: OscillatorAllocator,
    grid: SpatialGrid,
    regions: RegionMap,
    controls: Arc<SharedControls>,

    current_stroke: Option<Stroke>,
    /// Voices started by the in-flight stroke.
    stroke_voices: Vec<VoiceHandle>,

    /// Normalized 0-1
    playhead: f32,
    /// One voice per finalized stroke under the playhead.
    playback_voices: HashMap<StrokeId, VoiceHandle>,

    // Scratch
    nearby: Vec<usize>,
    covering: Vec<StrokeId>,
}

impl PaintEngine {
    pub(crate) fn new(
        config: PaintConfig,
        pool: Arc<OscillatorPool>,
        controls: Arc<SharedControls>,
        reclaimed: rtrb::Consumer<usize>,
    ) -> Self {
        let mapping = config.mapping();
        let capacity = pool.capacity();

        Self {
            config,
            mapping,
            allocator: OscillatorAllocator::new(pool, reclaimed, config.influence_radius),
            grid: SpatialGrid::new(mapping.bounds(), config.grid_cell_size, capacity),
            regions: RegionMap::new(config.region_size),
            controls,
            current_stroke: None,
            stroke_voices: Vec::with_capacity(capacity),
            playhead: 0.0,
            playback_voices: HashMap::with_capacity(capacity),
            nearby: Vec::with_capacity(capacity),
            covering: Vec::with_capacity(capacity),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Commands
    // ═══════════════════════════════════════════════════════════════════

    /// Apply one queued command.
    pub fn apply(&mut self, command: PaintCommand) {
        match command {
            PaintCommand::BeginStroke {
                position,
                pressure,
                color,
            } => self.begin_stroke(position, pressure, color),
            PaintCommand::UpdateStroke { position, pressure } => {
                self.update_stroke(position, pressure)
            }
            PaintCommand::EndStroke => self.end_stroke(),
            PaintCommand::ClearCanvas => self.clear_canvas(),
            PaintCommand::ClearRegion { bounds } => {
                self.clear_region(&bounds);
            }
            PaintCommand::SetFrequencyRange { min_hz, max_hz } => {
                self.set_frequency_range(min_hz, max_hz)
            }
            PaintCommand::SetCanvasRegion {
                left,
                right,
                bottom,
                top,
            } => self.set_canvas_region(left, right, bottom, top),
            PaintCommand::SetPlayheadPosition { position } => self.set_playhead_position(position),
            PaintCommand::SetMasterGain { gain } => self.set_master_gain(gain),
            PaintCommand::SetPaintActive { active } => self.set_active(active),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Strokes
    // ═══════════════════════════════════════════════════════════════════

    /// Start a stroke, ending any stroke still in flight.
    ///
    /// The first sample only records the stroke; voices start with the
    /// first update.
    pub fn begin_stroke(&mut self, position: Point, pressure: f32, color: Color) {
        if self.current_stroke.is_some() {
            self.end_stroke();
        }

        let mut stroke = Stroke::new();
        let point = StrokePoint::new(position, pressure, color);
        stroke.add_point(point);

        debug!(
            "stroke {} started at ({:.1}, {:.1}) pressure={:.2}",
            stroke.id(),
            point.position.x,
            point.position.y,
            point.pressure
        );
        self.current_stroke = Some(stroke);
    }

    /// Append a sample to the current stroke and update the voices around it.
    ///
    /// With no stroke in flight this starts one instead.
    pub fn update_stroke(&mut self, position: Point, pressure: f32) {
        let Some(stroke) = self.current_stroke.as_mut() else {
            self.begin_stroke(position, pressure, Color::WHITE);
            return;
        };

        let color = stroke.first_point().map_or(Color::WHITE, |p| p.color);
        let point = StrokePoint::new(position, pressure, color);
        stroke.add_point(point);

        self.update_oscillators_incremental(&point);
        self.allocator.flush_pending_writes();
    }

    /// Finalize the current stroke and file it under the region of its
    /// first point. Its voices move into release.
    pub fn end_stroke(&mut self) {
        let Some(mut stroke) = self.current_stroke.take() else {
            return;
        };
        stroke.finalize();

        for voice in self.stroke_voices.drain(..) {
            self.allocator.release_oscillator(voice);
        }

        let id = stroke.id();
        let points = stroke.points().len();
        if self.regions.insert_stroke(Arc::new(stroke)).is_some() {
            debug!("stroke {id} ended with {points} points");
            self.update_canvas_oscillators();
        }
    }

    /// Route one new sample to fresh or nearby voices.
    fn update_oscillators_incremental(&mut self, point: &StrokePoint) {
        self.allocator.drain_reclaimed();

        let params = stroke_point_to_audio_params(&self.mapping, point);
        self.grid.nearby_into(point.position, &mut self.nearby);

        if self.nearby.is_empty() || self.should_allocate_new_oscillator(point) {
            let index = self.allocator.allocate_oscillator();
            let voice = self.activate_oscillator(index, &params, point.position);
            self.stroke_voices.push(voice);
            return;
        }

        for &index in &self.nearby {
            self.allocator.update_oscillator_with_influence(
                index,
                point.position,
                &params,
                point.pressure,
                &self.mapping,
            );
        }
    }

    /// The two pressure branches overlap on purpose: above
    /// `ALWAYS_ALLOCATE_PRESSURE` the free list is not consulted.
    pub fn should_allocate_new_oscillator(&self, point: &StrokePoint) -> bool {
        (point.pressure > ALLOCATE_IF_FREE_PRESSURE && self.allocator.free_count() > 0)
            || point.pressure > ALWAYS_ALLOCATE_PRESSURE
    }

    pub fn stroke_point_to_audio_params(&self, point: &StrokePoint) -> AudioParams {
        stroke_point_to_audio_params(&self.mapping, point)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Oscillators
    // ═══════════════════════════════════════════════════════════════════

    pub fn allocate_oscillator(&mut self) -> usize {
        self.allocator.allocate_oscillator()
    }

    pub fn find_best_oscillator_for_replacement(&self) -> usize {
        self.allocator.find_best_oscillator_for_replacement()
    }

    /// Activate `index` at `position` and file it in the spatial grid.
    pub fn activate_oscillator(
        &mut self,
        index: usize,
        params: &AudioParams,
        position: Point,
    ) -> VoiceHandle {
        let voice = self.allocator.activate_oscillator(index, params, position);
        self.grid.assign(index, position);
        trace!(
            "oscillator {index} activated at {:.1} Hz (generation {})",
            params.frequency, voice.generation
        );
        voice
    }

    pub fn release_oscillator(&mut self, voice: VoiceHandle) -> bool {
        self.allocator.release_oscillator(voice)
    }

    /// Publish writes that were deferred by a pending swap.
    pub fn flush_pending_writes(&mut self) -> bool {
        self.allocator.flush_pending_writes()
    }

    #[inline]
    pub fn has_pending_writes(&self) -> bool {
        self.allocator.has_pending_writes()
    }

    /// Put every active oscillator back into the grid from scratch.
    pub fn rebuild_spatial_grid(&mut self) {
        self.grid
            .initialize(self.mapping.bounds(), self.config.grid_cell_size);

        let pool = Arc::clone(self.allocator.pool());
        for (index, state) in pool.states().iter().enumerate() {
            if state.is_active() {
                let position = Point::new(
                    self.allocator.position(index).x,
                    self.mapping.frequency_to_canvas_y(state.targets().frequency),
                );
                self.grid.assign(index, position);
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Canvas
    // ═══════════════════════════════════════════════════════════════════

    /// Drop every stroke and region and release every voice.
    pub fn clear_canvas(&mut self) {
        self.current_stroke = None;
        self.stroke_voices.clear();
        self.playback_voices.clear();
        self.regions.clear();
        self.grid.clear();

        let released = self.allocator.release_all();
        self.allocator.flush_pending_writes();
        debug!("canvas cleared, {released} voices released");
    }

    /// Remove finalized strokes whose bounds intersect `area`.
    ///
    /// Returns the number of strokes removed.
    pub fn clear_region(&mut self, area: &Bounds) -> usize {
        let removed = self.regions.remove_strokes_in(area);
        for stroke in &removed {
            if let Some(voice) = self.playback_voices.remove(&stroke.id()) {
                self.allocator.release_oscillator(voice);
            }
        }
        self.regions.cull_empty();

        if !removed.is_empty() {
            debug!("cleared {} strokes from region", removed.len());
        }
        removed.len()
    }

    pub fn cull_inactive_regions(&mut self) -> usize {
        self.regions.cull_empty()
    }

    /// Move the playhead (normalized, clamped to `[0, 1]`).
    pub fn set_playhead_position(&mut self, position: f32) {
        let position = if position.is_nan() { 0.0 } else { position.clamp(0.0, 1.0) };
        if position == self.playhead {
            return;
        }
        self.playhead = position;
        self.update_canvas_oscillators();
    }

    #[inline]
    pub fn playhead_position(&self) -> f32 {
        self.playhead
    }

    /// Drive one voice per finalized stroke that spans the playhead, from
    /// the stroke sample nearest it. Strokes no longer under the playhead
    /// release their voice.
    pub fn update_canvas_oscillators(&mut self) {
        let x = self.mapping.time_to_canvas_x(self.playhead);
        self.covering.clear();

        for stroke in self.regions.strokes() {
            let Some(bounds) = stroke.bounds() else {
                continue;
            };
            if x < bounds.left || x > bounds.right {
                continue;
            }
            let Some(point) = stroke.point_nearest_x(x) else {
                continue;
            };

            let id = stroke.id();
            let params = stroke_point_to_audio_params(&self.mapping, point);
            self.covering.push(id);

            // Keep the stroke's voice unless it was stolen.
            if let Some(&voice) = self.playback_voices.get(&id) {
                if self.allocator.retarget(voice, &params, point.position) {
                    self.grid.assign(voice.index, point.position);
                    continue;
                }
            }

            let index = self.allocator.allocate_oscillator();
            let voice = self.allocator.activate_oscillator(index, &params, point.position);
            self.grid.assign(index, point.position);
            self.playback_voices.insert(id, voice);
        }

        let covering = &self.covering;
        let allocator = &self.allocator;
        self.playback_voices.retain(|id, voice| {
            let keep = covering.contains(id);
            if !keep {
                allocator.release_oscillator(*voice);
            }
            keep
        });

        self.allocator.flush_pending_writes();
    }

    /// Set the canvas bounds and rebuild the grid for them.
    pub fn set_canvas_region(&mut self, left: f32, right: f32, bottom: f32, top: f32) {
        self.mapping.set_canvas_region(left, right, bottom, top);
        self.rebuild_spatial_grid();
        self.update_canvas_oscillators();
    }

    pub fn set_frequency_range(&mut self, min_hz: f32, max_hz: f32) {
        self.mapping.set_frequency_range(min_hz, max_hz);
        self.rebuild_spatial_grid();
    }

    pub fn set_log_frequency_scale(&mut self, log_scale: bool) {
        self.mapping.set_log_scale(log_scale);
        self.rebuild_spatial_grid();
    }

    // ═══════════════════════════════════════════════════════════════════
    // Output controls
    // ═══════════════════════════════════════════════════════════════════

    pub fn set_master_gain(&mut self, gain: f32) {
        self.controls.set_master_gain(gain);
    }

    pub fn set_panning_enabled(&mut self, enabled: bool) {
        self.controls.set_panning_enabled(enabled);
    }

    pub fn set_active(&mut self, active: bool) {
        self.controls.set_active(active);
        debug!("paint engine {}", if active { "activated" } else { "deactivated" });
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.controls.is_active()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Coordinate mapping
    // ═══════════════════════════════════════════════════════════════════

    /// Snapshot of the current mapping, safe to move to another thread.
    #[inline]
    pub fn mapping(&self) -> CanvasMapping {
        self.mapping
    }

    pub fn canvas_y_to_frequency(&self, y: f32) -> f32 {
        self.mapping.canvas_y_to_frequency(y)
    }

    pub fn frequency_to_canvas_y(&self, frequency: f32) -> f32 {
        self.mapping.frequency_to_canvas_y(frequency)
    }

    pub fn canvas_x_to_time(&self, x: f32) -> f32 {
        self.mapping.canvas_x_to_time(x)
    }

    pub fn time_to_canvas_x(&self, time: f32) -> f32 {
        self.mapping.time_to_canvas_x(time)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Telemetry and inspection
    // ═══════════════════════════════════════════════════════════════════

    pub fn get_current_cpu_load(&self) -> f32 {
        self.controls.cpu_load()
    }

    /// Slots the renderer counted as sounding in its last block.
    pub fn get_active_oscillator_count(&self) -> usize {
        self.controls.active_oscillators()
    }

    #[inline]
    pub fn config(&self) -> &PaintConfig {
        &self.config
    }

    #[inline]
    pub fn controls(&self) -> &Arc<SharedControls> {
        &self.controls
    }

    #[inline]
    pub fn pool(&self) -> &Arc<OscillatorPool> {
        self.allocator.pool()
    }

    pub fn free_indices(&self) -> &[usize] {
        self.allocator.free_indices()
    }

    pub fn regions(&self) -> &RegionMap {
        &self.regions
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn current_stroke(&self) -> Option<&Stroke> {
        self.current_stroke.as_ref()
    }

    pub fn playback_voice_count(&self) -> usize {
        self.playback_voices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::create_paint_engine;
    use crate::pool::MAX_OSCILLATORS;
    use crate::voice::EnvelopePhase;
    use approx::assert_relative_eq;

    fn engine() -> PaintEngine {
        create_paint_engine(PaintConfig::default()).0
    }

    #[test]
    fn test_begin_end_files_one_stroke() {
        let mut engine = engine();
        engine.begin_stroke(Point::new(0.0, 0.0), 0.8, Color::WHITE);
        engine.end_stroke();

        assert!(engine.current_stroke().is_none());
        assert_eq!(engine.regions().len(), 1);

        let strokes: Vec<_> = engine.regions().strokes().collect();
        assert_eq!(strokes.len(), 1);
        assert!(strokes[0].is_finalized());
        assert_eq!(strokes[0].points().len(), 1);
    }

    #[test]
    fn test_low_pressure_first_update_allocates_nothing() {
        let mut engine = engine();
        engine.update_stroke(Point::new(0.0, 0.0), 0.05);

        assert!(engine.current_stroke().is_some());
        assert_eq!(engine.pool().active_count(), 0);
        assert_eq!(engine.free_indices().len(), MAX_OSCILLATORS);
    }

    #[test]
    fn test_update_allocates_then_blends() {
        let mut engine = engine();
        engine.begin_stroke(Point::new(0.0, 0.0), 0.3, Color::WHITE);

        // Empty neighbourhood: allocate.
        engine.update_stroke(Point::new(0.0, 0.0), 0.3);
        assert_eq!(engine.pool().active_count(), 1);

        // Nearby voice and low pressure: blend, no new voice.
        engine.update_stroke(Point::new(1.0, 0.0), 0.08);
        assert_eq!(engine.pool().active_count(), 1);

        // Medium pressure with free slots: allocate.
        engine.update_stroke(Point::new(2.0, 0.0), 0.3);
        assert_eq!(engine.pool().active_count(), 2);
    }

    #[test]
    fn test_allocation_rule_branches() {
        let engine = engine();
        let at = |pressure| StrokePoint::new(Point::default(), pressure, Color::WHITE);

        assert!(!engine.should_allocate_new_oscillator(&at(0.1)));
        assert!(engine.should_allocate_new_oscillator(&at(0.2)));
        assert!(engine.should_allocate_new_oscillator(&at(0.9)));
    }

    #[test]
    fn test_saturated_pool_prefers_release() {
        let mut engine = engine();
        let params = AudioParams {
            amplitude: 1.0,
            ..AudioParams::default()
        };
        for _ in 0..MAX_OSCILLATORS {
            let index = engine.allocate_oscillator();
            engine.activate_oscillator(index, &params, Point::default());
        }
        assert!(engine.free_indices().is_empty());

        let state = engine.pool().state(100);
        state.request_release(state.generation());
        state.take_release_request();
        state.release();
        assert_eq!(state.envelope_phase(), EnvelopePhase::Release);

        assert_eq!(engine.allocate_oscillator(), 100);
    }

    #[test]
    fn test_end_stroke_releases_voices() {
        let mut engine = engine();
        engine.begin_stroke(Point::new(0.0, 0.0), 1.0, Color::WHITE);
        engine.update_stroke(Point::new(0.0, 0.0), 1.0);
        let voice = engine.pool().state(0).handle(0);

        engine.end_stroke();
        assert!(engine.pool().state(0).take_release_request());
        assert_eq!(voice.generation, engine.pool().state(0).generation());
    }

    #[test]
    fn test_audio_params_from_point() {
        let engine = engine();
        let red = StrokePoint::new(Point::new(0.0, 50.0), 0.6, Color::from_rgb(255, 0, 0));
        let params = engine.stroke_point_to_audio_params(&red);

        assert_relative_eq!(params.frequency, 20_000.0, max_relative = 1e-4);
        assert_relative_eq!(params.time, 0.5);
        assert_eq!(params.amplitude, 0.6);
        assert_eq!(params.pan, 0.0);

        let clear = StrokePoint::new(Point::default(), 0.6, Color::TRANSPARENT_BLACK);
        assert_eq!(engine.stroke_point_to_audio_params(&clear).pan, 0.5);
    }

    #[test]
    fn test_clear_region_removes_intersecting_strokes() {
        let mut engine = engine();
        for x in [-80.0, 60.0] {
            engine.begin_stroke(Point::new(x, 0.0), 0.5, Color::WHITE);
            engine.update_stroke(Point::new(x + 5.0, 5.0), 0.5);
            engine.end_stroke();
        }
        assert_eq!(engine.regions().len(), 2);

        assert_eq!(engine.clear_region(&Bounds::new(50.0, -10.0, 70.0, 10.0)), 1);
        assert_eq!(engine.regions().len(), 1);
    }

    #[test]
    fn test_clear_canvas_releases_everything() {
        let mut engine = engine();
        engine.begin_stroke(Point::new(0.0, 0.0), 1.0, Color::WHITE);
        engine.update_stroke(Point::new(0.0, 0.0), 1.0);
        engine.clear_canvas();

        assert!(engine.current_stroke().is_none());
        assert!(engine.regions().is_empty());
        assert!(engine.pool().state(0).take_release_request());
    }

    #[test]
    fn test_playhead_drives_region_playback() {
        let mut engine = engine();
        engine.begin_stroke(Point::new(-10.0, 0.0), 0.7, Color::WHITE);
        engine.update_stroke(Point::new(10.0, 10.0), 0.7);
        engine.end_stroke();
        assert_eq!(engine.playback_voice_count(), 0);

        engine.set_playhead_position(0.5);
        assert_eq!(engine.playback_voice_count(), 1);

        engine.set_playhead_position(0.9);
        assert_eq!(engine.playback_voice_count(), 0);
    }

    #[test]
    fn test_canvas_resize_rebuilds_grid() {
        let mut engine = engine();
        engine.set_canvas_region(0.0, 40.0, 0.0, 20.0);
        assert_eq!(engine.grid().dimensions(), (4, 2));
        assert_relative_eq!(engine.canvas_x_to_time(20.0), 0.5);
    }

    #[test]
    fn test_apply_routes_commands() {
        let mut engine = engine();
        engine.apply(PaintCommand::SetMasterGain { gain: 1.5 });
        engine.apply(PaintCommand::SetPaintActive { active: false });
        engine.apply(PaintCommand::SetFrequencyRange {
            min_hz: 100.0,
            max_hz: 1_000.0,
        });

        assert_eq!(engine.controls().master_gain(), 1.5);
        assert!(!engine.is_active());
        assert_relative_eq!(engine.canvas_y_to_frequency(-50.0), 100.0, max_relative = 1e-4);
    }
}
