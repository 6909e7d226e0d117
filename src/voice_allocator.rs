// src/voice_allocator.rs

use std::sync::Arc;
use std::time::Instant;

use log::{debug, trace};

use crate::canvas::{CanvasMapping, Point};
use crate::oscillator::AudioParams;
use crate::pool::OscillatorPool;
use crate::voice::{EnvelopePhase, VoiceHandle};

/// Influence weights below this are not worth a parameter write.
pub const MIN_INFLUENCE: f32 = 0.01;

/// Gaussian radial-basis weight of a paint sample on an oscillator,
/// clamped to `[0, 1]`.
#[inline]
pub fn calculate_influence(distance: f32, pressure: f32, radius: f32) -> f32 {
    let normalized = distance / radius;
    let influence = pressure * (-(normalized * normalized)).exp();
    if influence.is_nan() { 0.0 } else { influence.clamp(0.0, 1.0) }
}

#[inline]
fn lerp(from: f32, to: f32, amount: f32) -> f32 {
    from + (to - from) * amount
}

/// Control-side slot bookkeeping for the oscillator pool.
///
/// Responsibilities:
/// - hand out slot indices (free stack first, then replacement)
/// - write activations and influence blends into the state array
/// - publish dirty slots into the back buffer
///
/// Does NOT:
/// - reclaim finished slots (the renderer does, and sends them back)
/// - touch the front buffer
pub struct OscillatorAllocator {
    pool: Arc<OscillatorPool>,

    /// Free slot indices; popped from the end.
    free: Vec<usize>,
    free_flags: Vec<bool>,
    reclaimed: rtrb::Consumer<usize>,

    /// Slots whose targets changed since the last publication.
    dirty: Vec<usize>,
    dirty_flags: Vec<bool>,

    positions: Vec<Point>,
    influence_radius: f32,
    epoch: Instant,
}

impl OscillatorAllocator {
    pub fn new(
        pool: Arc<OscillatorPool>,
        reclaimed: rtrb::Consumer<usize>,
        influence_radius: f32,
    ) -> Self {
        let capacity = pool.capacity();
        Self {
            pool,
            // Reversed so the first allocation is slot 0.
            free: (0..capacity).rev().collect(),
            free_flags: vec![true; capacity],
            reclaimed,
            dirty: Vec::with_capacity(capacity),
            dirty_flags: vec![false; capacity],
            positions: vec![Point::default(); capacity],
            influence_radius: if influence_radius.is_finite() && influence_radius > 0.0 {
                influence_radius
            } else {
                1.0
            },
            epoch: Instant::now(),
        }
    }

    #[inline]
    pub fn pool(&self) -> &Arc<OscillatorPool> {
        &self.pool
    }

    #[inline]
    pub fn influence_radius(&self) -> f32 {
        self.influence_radius
    }

    /// Milliseconds since this allocator was created.
    #[inline]
    pub fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1_000.0
    }

    #[inline]
    pub fn free_indices(&self) -> &[usize] {
        &self.free
    }

    #[inline]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    #[inline]
    pub fn position(&self, index: usize) -> Point {
        self.positions[index]
    }

    // ═══════════════════════════════════════════════════════════════════
    // Allocation
    // ═══════════════════════════════════════════════════════════════════

    /// Move indices reclaimed by the audio thread onto the free stack.
    ///
    /// Indices that were re-activated in the meantime, or are already
    /// free, are dropped.
    pub fn drain_reclaimed(&mut self) -> usize {
        let mut returned = 0;
        while let Ok(index) = self.reclaimed.pop() {
            let Some(flag) = self.free_flags.get_mut(index) else {
                continue;
            };
            let state = self.pool.state(index);
            if *flag || state.in_use() || state.is_active() {
                continue;
            }
            *flag = true;
            self.free.push(index);
            returned += 1;
        }
        if returned > 0 {
            trace!("{returned} oscillator slots returned to the free list");
        }
        returned
    }

    /// Pick a slot for a new voice. Never fails: an exhausted pool steals.
    pub fn allocate_oscillator(&mut self) -> usize {
        self.drain_reclaimed();

        while let Some(index) = self.free.pop() {
            self.free_flags[index] = false;
            if !self.pool.state(index).is_active() {
                return index;
            }
        }

        self.find_best_oscillator_for_replacement()
    }

    /// First slot already in Release or Inactive, else the least recently
    /// used one.
    pub fn find_best_oscillator_for_replacement(&self) -> usize {
        let states = self.pool.states();

        if let Some(index) = states.iter().position(|s| {
            matches!(
                s.envelope_phase(),
                EnvelopePhase::Release | EnvelopePhase::Inactive
            )
        }) {
            return index;
        }

        let mut oldest = 0;
        let mut oldest_time = f64::INFINITY;
        for (index, state) in states.iter().enumerate() {
            let used = state.last_used_time();
            if used < oldest_time {
                oldest = index;
                oldest_time = used;
            }
        }
        debug!("oscillator pool saturated, stealing slot {oldest}");
        oldest
    }

    /// Start a new activation of `index` at `position` and queue its
    /// parameters for the back buffer.
    pub fn activate_oscillator(
        &mut self,
        index: usize,
        params: &AudioParams,
        position: Point,
    ) -> VoiceHandle {
        if self.free_flags[index] {
            self.free_flags[index] = false;
            self.free.retain(|&i| i != index);
        }

        let now = self.now_ms();
        let generation = self.pool.state(index).activate(params, now);
        self.positions[index] = position;
        self.mark_dirty(index);

        VoiceHandle { index, generation }
    }

    /// Ask the audio thread to release `voice`. Returns `false` if the
    /// slot has been re-activated since the handle was issued.
    pub fn release_oscillator(&self, voice: VoiceHandle) -> bool {
        let Some(state) = self.pool.states().get(voice.index) else {
            return false;
        };
        if state.generation() != voice.generation || !state.is_active() {
            return false;
        }
        state.request_release(voice.generation);
        true
    }

    /// Request release of every active slot.
    pub fn release_all(&self) -> usize {
        let mut released = 0;
        for state in self.pool.states() {
            if state.is_active() {
                state.request_release(state.generation());
                released += 1;
            }
        }
        released
    }

    // ═══════════════════════════════════════════════════════════════════
    // Influence
    // ═══════════════════════════════════════════════════════════════════

    /// Canvas distance from `point` to the oscillator at `index`.
    ///
    /// x is where the oscillator was placed; y follows its current target
    /// frequency.
    pub fn calculate_distance(&self, index: usize, point: Point, mapping: &CanvasMapping) -> f32 {
        let frequency = self.pool.state(index).targets().frequency;
        let placed = Point::new(
            self.positions[index].x,
            mapping.frequency_to_canvas_y(frequency),
        );
        placed.distance_to(point)
    }

    #[inline]
    pub fn calculate_influence(&self, distance: f32, pressure: f32) -> f32 {
        calculate_influence(distance, pressure, self.influence_radius)
    }

    /// Blend the targets of `index` toward `params`, weighted by influence.
    ///
    /// Returns `false` for inactive slots (stale grid entries) and for
    /// negligible influence.
    pub fn update_oscillator_with_influence(
        &mut self,
        index: usize,
        point: Point,
        params: &AudioParams,
        pressure: f32,
        mapping: &CanvasMapping,
    ) -> bool {
        if !self.pool.state(index).is_active() {
            return false;
        }

        let distance = self.calculate_distance(index, point, mapping);
        let influence = self.calculate_influence(distance, pressure);
        if influence < MIN_INFLUENCE {
            return false;
        }

        let state = self.pool.state(index);
        let current = state.targets();
        state.set_targets(&AudioParams {
            frequency: mapping.clamp_frequency(lerp(current.frequency, params.frequency, influence)),
            amplitude: lerp(current.amplitude, params.amplitude, influence).clamp(0.0, 1.0),
            time: params.time,
            pan: lerp(current.pan, params.pan, influence).clamp(0.0, 1.0),
        });
        state.touch(self.now_ms());
        self.mark_dirty(index);
        true
    }

    /// Retarget a live voice outright. Returns `false` if it was stolen.
    pub fn retarget(&mut self, voice: VoiceHandle, params: &AudioParams, position: Point) -> bool {
        let state = self.pool.state(voice.index);
        if state.generation() != voice.generation || !state.is_active() {
            return false;
        }
        state.set_targets(params);
        state.touch(self.now_ms());
        self.positions[voice.index] = position;
        self.mark_dirty(voice.index);
        true
    }

    // ═══════════════════════════════════════════════════════════════════
    // Publication
    // ═══════════════════════════════════════════════════════════════════

    #[inline]
    pub fn mark_dirty(&mut self, index: usize) {
        if !self.dirty_flags[index] {
            self.dirty_flags[index] = true;
            self.dirty.push(index);
        }
    }

    #[inline]
    pub fn has_pending_writes(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Write dirty slots into the back buffer and request a swap.
    ///
    /// If the back buffer is busy (claimed, or a swap is still pending)
    /// the slots stay dirty for the next call.
    pub fn flush_pending_writes(&mut self) -> bool {
        if self.dirty.is_empty() {
            return false;
        }
        let Some(writer) = self.pool.try_write_back() else {
            trace!("back buffer busy, {} slots deferred", self.dirty.len());
            return false;
        };

        for &index in &self.dirty {
            let state = self.pool.state(index);
            writer.publish_params(index, &state.targets(), state.generation());
            self.dirty_flags[index] = false;
        }
        self.dirty.clear();

        if !writer.publish() {
            trace!("buffer swap already pending, request dropped");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Bounds;
    use approx::assert_relative_eq;

    fn allocator(capacity: usize) -> (OscillatorAllocator, rtrb::Producer<usize>) {
        let pool = Arc::new(OscillatorPool::new(capacity));
        let (producer, consumer) = rtrb::RingBuffer::new(capacity * 2);
        (OscillatorAllocator::new(pool, consumer, 20.0), producer)
    }

    fn params(frequency: f32, amplitude: f32) -> AudioParams {
        AudioParams {
            frequency,
            amplitude,
            time: 0.5,
            pan: 0.5,
        }
    }

    fn mapping() -> CanvasMapping {
        CanvasMapping::new(Bounds::new(-100.0, -50.0, 100.0, 50.0), 20.0, 20_000.0, true)
    }

    #[test]
    fn test_influence_falls_off_with_distance() {
        assert_relative_eq!(calculate_influence(0.0, 0.8, 20.0), 0.8);
        assert_relative_eq!(calculate_influence(20.0, 1.0, 20.0), (-1.0f32).exp());
        assert!(calculate_influence(200.0, 1.0, 20.0) < MIN_INFLUENCE);
        assert_eq!(calculate_influence(f32::NAN, 1.0, 20.0), 0.0);
    }

    #[test]
    fn test_free_stack_then_replacement() {
        let (mut alloc, _producer) = allocator(4);

        for expected in 0..4 {
            let index = alloc.allocate_oscillator();
            assert_eq!(index, expected);
            alloc.activate_oscillator(index, &params(440.0, 1.0), Point::default());
        }
        assert_eq!(alloc.free_count(), 0);

        // Saturated: everything is in Attack, so the oldest is stolen.
        assert_eq!(alloc.allocate_oscillator(), 0);
    }

    #[test]
    fn test_replacement_prefers_winding_down_slots() {
        let (mut alloc, _producer) = allocator(4);
        for _ in 0..4 {
            let index = alloc.allocate_oscillator();
            alloc.activate_oscillator(index, &params(440.0, 1.0), Point::default());
        }

        let state = alloc.pool().state(2);
        state.request_release(state.generation());
        assert!(state.take_release_request());
        state.release();

        assert_eq!(alloc.find_best_oscillator_for_replacement(), 2);
    }

    #[test]
    fn test_reclaimed_indices_are_deduplicated() {
        let (mut alloc, mut producer) = allocator(2);
        let a = alloc.allocate_oscillator();
        let b = alloc.allocate_oscillator();
        alloc.activate_oscillator(a, &params(440.0, 1.0), Point::default());

        // `b` was never activated; `a` still is.
        producer.push(b).unwrap();
        producer.push(b).unwrap();
        producer.push(a).unwrap();

        assert_eq!(alloc.drain_reclaimed(), 1);
        assert_eq!(alloc.free_indices(), &[b]);
    }

    #[test]
    fn test_stale_handle_is_not_released() {
        let (mut alloc, _producer) = allocator(1);
        let first = alloc.activate_oscillator(0, &params(440.0, 1.0), Point::default());
        let second = alloc.activate_oscillator(0, &params(880.0, 1.0), Point::default());

        assert!(!alloc.release_oscillator(first));
        assert!(alloc.release_oscillator(second));
    }

    #[test]
    fn test_influence_blends_targets() {
        let (mut alloc, _producer) = allocator(2);
        let mapping = mapping();
        let position = Point::new(0.0, mapping.frequency_to_canvas_y(440.0));
        alloc.activate_oscillator(0, &params(440.0, 0.2), position);

        let new = params(880.0, 1.0);
        assert!(alloc.update_oscillator_with_influence(0, position, &new, 1.0, &mapping));

        let targets = alloc.pool().state(0).targets();
        assert_relative_eq!(targets.frequency, 880.0, max_relative = 1e-4);
        assert_relative_eq!(targets.amplitude, 1.0);
    }

    #[test]
    fn test_influence_ignores_inactive_and_distant_slots() {
        let (mut alloc, _producer) = allocator(2);
        let mapping = mapping();
        let new = params(880.0, 1.0);

        assert!(!alloc.update_oscillator_with_influence(1, Point::default(), &new, 1.0, &mapping));

        alloc.activate_oscillator(0, &params(440.0, 0.2), Point::new(-90.0, 0.0));
        assert!(!alloc.update_oscillator_with_influence(0, Point::new(90.0, 0.0), &new, 1.0, &mapping));
        assert_eq!(alloc.pool().state(0).targets().amplitude, 0.2);
    }

    #[test]
    fn test_flush_defers_while_swap_pending() {
        let (mut alloc, _producer) = allocator(2);
        alloc.activate_oscillator(0, &params(440.0, 1.0), Point::default());
        assert!(alloc.flush_pending_writes());
        assert!(!alloc.has_pending_writes());

        alloc.activate_oscillator(1, &params(660.0, 1.0), Point::default());
        assert!(!alloc.flush_pending_writes());
        assert!(alloc.has_pending_writes());

        alloc.pool().swap_buffers_if_pending();
        assert!(alloc.flush_pending_writes());
        alloc.pool().swap_buffers_if_pending();

        let front = alloc.pool().front();
        assert_eq!(front[0].load().frequency, 440.0);
        assert_eq!(front[1].load().frequency, 660.0);
        assert_eq!(front[1].generation(), alloc.pool().state(1).generation());
    }
}
