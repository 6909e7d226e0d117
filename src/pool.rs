// src/pool.rs

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering, fence};

use crate::atomic_float::AtomicF32;
use crate::oscillator::{AudioParams, Oscillator};
use crate::voice::EnhancedOscillatorState;

/// Hard upper bound on pool capacity.
pub const MAX_OSCILLATORS: usize = 256;

/// One oscillator in one of the two parameter buffers.
///
/// Published fields (`frequency`, targets, `generation`) are written by the
/// control thread into the back buffer. Render fields (`amplitude`, `pan`,
/// `phase`, `phase_increment`) are written by the audio thread into the
/// front buffer.
#[derive(Debug)]
pub struct OscillatorSlot {
    frequency: AtomicF32,
    amplitude: AtomicF32,
    target_amplitude: AtomicF32,
    pan: AtomicF32,
    target_pan: AtomicF32,
    phase: AtomicF32,
    phase_increment: AtomicF32,
    /// Activation whose parameters this slot carries.
    generation: AtomicU32,
}

impl Default for OscillatorSlot {
    fn default() -> Self {
        let osc = Oscillator::default();
        Self {
            frequency: AtomicF32::new(osc.frequency),
            amplitude: AtomicF32::new(osc.amplitude),
            target_amplitude: AtomicF32::new(osc.target_amplitude),
            pan: AtomicF32::new(osc.pan),
            target_pan: AtomicF32::new(osc.target_pan),
            phase: AtomicF32::new(osc.phase),
            phase_increment: AtomicF32::new(osc.phase_increment),
            generation: AtomicU32::new(0),
        }
    }
}

impl OscillatorSlot {
    #[inline]
    pub fn load(&self) -> Oscillator {
        Oscillator {
            frequency: self.frequency.load(Ordering::Relaxed),
            amplitude: self.amplitude.load(Ordering::Relaxed),
            target_amplitude: self.target_amplitude.load(Ordering::Relaxed),
            pan: self.pan.load(Ordering::Relaxed),
            target_pan: self.target_pan.load(Ordering::Relaxed),
            phase: self.phase.load(Ordering::Relaxed),
            phase_increment: self.phase_increment.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    /// Audio thread: persist the per-sample render state.
    #[inline]
    pub fn store_render_state(&self, osc: &Oscillator) {
        self.amplitude.store(osc.amplitude, Ordering::Relaxed);
        self.pan.store(osc.pan, Ordering::Relaxed);
        self.phase.store(osc.phase, Ordering::Relaxed);
        self.phase_increment
            .store(osc.phase_increment, Ordering::Relaxed);
    }

    /// Control thread: write new parameters for activation `generation`.
    fn publish(&self, params: &AudioParams, generation: u32) {
        let mut osc = self.load();
        osc.set_parameters(params);

        self.frequency.store(osc.frequency, Ordering::Relaxed);
        self.target_amplitude
            .store(osc.target_amplitude, Ordering::Relaxed);
        self.target_pan.store(osc.target_pan, Ordering::Relaxed);
        self.generation.store(generation, Ordering::Release);
    }

    fn copy_published_from(&self, other: &OscillatorSlot) {
        self.frequency
            .store(other.frequency.load(Ordering::Relaxed), Ordering::Relaxed);
        self.target_amplitude.store(
            other.target_amplitude.load(Ordering::Relaxed),
            Ordering::Relaxed,
        );
        self.target_pan
            .store(other.target_pan.load(Ordering::Relaxed), Ordering::Relaxed);
        self.generation
            .store(other.generation.load(Ordering::Relaxed), Ordering::Relaxed);
    }

    fn carry_render_state_from(&self, other: &OscillatorSlot) {
        self.store_render_state(&other.load());
    }

    fn silence(&self) {
        self.target_amplitude.store(0.0, Ordering::Relaxed);
    }

    fn reset_render_state(&self) {
        self.store_render_state(&Oscillator::default());
    }
}

/// Fixed-capacity, double-buffered oscillator pool.
///
/// Two parameter buffers (front/back) plus one lifecycle state array that
/// both threads share. The audio thread reads only the front buffer; the
/// control thread writes only the back buffer, through a [`BackBufferWriter`].
///
/// Swap protocol:
/// - a writer claims the back buffer, writes, then requests a swap
/// - while a swap is pending no writer can claim the back buffer
/// - the audio thread honours at most one pending swap per block
pub struct OscillatorPool {
    buffers: [Box<[OscillatorSlot]>; 2],
    states: Box<[EnhancedOscillatorState]>,

    front_index: AtomicUsize,
    back_index: AtomicUsize,
    swap_pending: AtomicBool,

    /// Set while a writer owns the back buffer.
    back_claimed: AtomicBool,
}

impl OscillatorPool {
    /// Create a pool; capacity is clamped to `1..=MAX_OSCILLATORS`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_OSCILLATORS);
        let make_buffer = || {
            (0..capacity)
                .map(|_| OscillatorSlot::default())
                .collect::<Box<[_]>>()
        };

        Self {
            buffers: [make_buffer(), make_buffer()],
            states: (0..capacity)
                .map(|_| EnhancedOscillatorState::default())
                .collect(),
            front_index: AtomicUsize::new(0),
            back_index: AtomicUsize::new(1),
            swap_pending: AtomicBool::new(false),
            back_claimed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.states.len()
    }

    #[inline]
    pub fn state(&self, index: usize) -> &EnhancedOscillatorState {
        &self.states[index]
    }

    #[inline]
    pub fn states(&self) -> &[EnhancedOscillatorState] {
        &self.states
    }

    /// Number of slots whose envelope is not Inactive.
    pub fn active_count(&self) -> usize {
        self.states.iter().filter(|s| s.is_active()).count()
    }

    /// `(front, back)` buffer indices.
    pub fn buffer_indices(&self) -> (usize, usize) {
        (
            self.front_index.load(Ordering::Acquire),
            self.back_index.load(Ordering::Acquire),
        )
    }

    #[inline]
    pub fn is_swap_pending(&self) -> bool {
        self.swap_pending.load(Ordering::Acquire)
    }

    /// The buffer currently read by the audio thread.
    ///
    /// Audio-thread only: the index is stable between swaps, and swaps
    /// happen on this same thread.
    #[inline]
    pub fn front(&self) -> &[OscillatorSlot] {
        &self.buffers[self.front_index.load(Ordering::Acquire)]
    }

    // ───────────────────────────────────────────────────────────────
    // Swap protocol
    // ───────────────────────────────────────────────────────────────

    /// Ask the audio thread to swap buffers at its next block.
    ///
    /// Returns `false` if a swap is already pending; the request is dropped
    /// rather than queued. Writers request through `BackBufferWriter::publish`
    /// so the back index stays fixed for the life of a claim.
    pub fn request_buffer_swap(&self) -> bool {
        self.swap_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Audio thread: flip front/back if a swap was requested.
    ///
    /// After the flip the new back buffer is primed with the published
    /// parameters of the new front, and the render state of the old front
    /// moves into the new front so phase stays continuous.
    pub fn swap_buffers_if_pending(&self) -> bool {
        if !self.swap_pending.load(Ordering::Acquire) {
            return false;
        }

        let front = self.front_index.load(Ordering::Relaxed);
        let back = self.back_index.load(Ordering::Relaxed);

        fence(Ordering::SeqCst);
        self.front_index.store(back, Ordering::Release);
        self.back_index.store(front, Ordering::Release);
        fence(Ordering::SeqCst);

        let new_front = &self.buffers[back];
        let new_back = &self.buffers[front];
        for (fresh, stale) in new_front.iter().zip(new_back.iter()) {
            fresh.carry_render_state_from(stale);
            stale.copy_published_from(fresh);
        }

        self.swap_pending.store(false, Ordering::Release);
        true
    }

    /// Claim the back buffer for writing.
    ///
    /// Never blocks: returns `None` if another writer holds it or a swap is
    /// still pending.
    pub fn try_write_back(&self) -> Option<BackBufferWriter<'_>> {
        if self
            .back_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        if self.is_swap_pending() {
            self.back_claimed.store(false, Ordering::Release);
            return None;
        }

        // Only a claim holder can request a swap, so with none pending the
        // back index cannot move until this writer publishes.
        // Dropping the writer releases the claim.
        Some(BackBufferWriter {
            pool: self,
            back: self.back_index.load(Ordering::Acquire),
        })
    }

    // ───────────────────────────────────────────────────────────────
    // Audio-thread maintenance
    // ───────────────────────────────────────────────────────────────

    /// Silence stale parameters of free slots in the back buffer and
    /// request a swap. Slot indices never move.
    ///
    /// Skipped (returns `false`) if the back buffer is busy.
    pub fn compact_back_buffer(&self) -> bool {
        let Some(writer) = self.try_write_back() else {
            return false;
        };

        for (index, state) in self.states.iter().enumerate() {
            if !state.is_active() && !state.in_use() {
                writer.slot(index).silence();
            }
        }
        writer.publish()
    }

    /// Audio thread: zero phase and amplitude of the front buffer.
    pub fn reset_render_state(&self) {
        for slot in self.front() {
            slot.reset_render_state();
        }
    }
}

/// Exclusive write access to the back buffer.
pub struct BackBufferWriter<'a> {
    pool: &'a OscillatorPool,
    back: usize,
}

impl BackBufferWriter<'_> {
    #[inline]
    pub fn slot(&self, index: usize) -> &OscillatorSlot {
        &self.pool.buffers[self.back][index]
    }

    /// Write parameters for activation `generation` of slot `index`.
    #[inline]
    pub fn publish_params(&self, index: usize, params: &AudioParams, generation: u32) {
        self.slot(index).publish(params, generation);
    }

    /// Request the swap while still holding the claim, then release it.
    pub fn publish(self) -> bool {
        self.pool.request_buffer_swap()
    }
}

impl Drop for BackBufferWriter<'_> {
    fn drop(&mut self) {
        self.pool.back_claimed.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(frequency: f32) -> AudioParams {
        AudioParams {
            frequency,
            amplitude: 0.5,
            time: 0.0,
            pan: 0.5,
        }
    }

    #[test]
    fn test_capacity_is_clamped() {
        assert_eq!(OscillatorPool::new(0).capacity(), 1);
        assert_eq!(OscillatorPool::new(10_000).capacity(), MAX_OSCILLATORS);
    }

    #[test]
    fn test_only_one_pending_swap() {
        let pool = OscillatorPool::new(4);

        assert!(pool.request_buffer_swap());
        assert!(!pool.request_buffer_swap());
        assert!(pool.swap_buffers_if_pending());
        assert!(!pool.swap_buffers_if_pending());
        assert_eq!(pool.buffer_indices(), (1, 0));
    }

    #[test]
    fn test_writer_is_exclusive_and_blocked_by_pending_swap() {
        let pool = OscillatorPool::new(4);

        let writer = pool.try_write_back().unwrap();
        assert!(pool.try_write_back().is_none());
        assert!(writer.publish());

        // Claim released, but the swap is still pending.
        assert!(pool.try_write_back().is_none());
        pool.swap_buffers_if_pending();
        assert!(pool.try_write_back().is_some());
    }

    #[test]
    fn test_writer_never_gets_front_during_swaps() {
        use std::sync::Arc;
        use std::thread;

        let pool = Arc::new(OscillatorPool::new(4));
        let done = Arc::new(AtomicBool::new(false));

        let audio = {
            let pool = Arc::clone(&pool);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    pool.swap_buffers_if_pending();
                }
            })
        };

        let mut claims: u32 = 0;
        while claims < 2_000 {
            let Some(writer) = pool.try_write_back() else {
                continue;
            };
            // The front cannot move while the claim is held.
            assert_ne!(writer.back, pool.front_index.load(Ordering::SeqCst));
            writer.publish_params(0, &params(100.0 + claims as f32), claims + 1);
            assert_ne!(writer.back, pool.front_index.load(Ordering::SeqCst));
            writer.publish();
            claims += 1;
        }

        done.store(true, Ordering::Release);
        audio.join().unwrap();
    }

    #[test]
    fn test_published_params_reach_front_after_swap() {
        let pool = OscillatorPool::new(4);

        let writer = pool.try_write_back().unwrap();
        writer.publish_params(2, &params(330.0), 7);
        writer.publish();

        assert_eq!(pool.front()[2].generation(), 0);
        pool.swap_buffers_if_pending();

        let osc = pool.front()[2].load();
        assert_eq!(osc.frequency, 330.0);
        assert_eq!(osc.target_amplitude, 0.5);
        assert_eq!(pool.front()[2].generation(), 7);
    }

    #[test]
    fn test_swap_primes_back_and_carries_phase() {
        let pool = OscillatorPool::new(2);

        let writer = pool.try_write_back().unwrap();
        writer.publish_params(0, &params(550.0), 1);
        writer.publish();

        // Audio thread advances phase on the current front.
        let mut osc = pool.front()[0].load();
        osc.phase = 0.75;
        pool.front()[0].store_render_state(&osc);

        pool.swap_buffers_if_pending();
        assert_eq!(pool.front()[0].load().phase, 0.75);

        // The new back already carries the 550 Hz publication.
        let writer = pool.try_write_back().unwrap();
        assert_eq!(writer.slot(0).load().frequency, 550.0);
        assert_eq!(writer.slot(0).generation(), 1);
    }

    #[test]
    fn test_compaction_silences_free_slots() {
        let pool = OscillatorPool::new(2);

        let writer = pool.try_write_back().unwrap();
        writer.publish_params(0, &params(100.0), 1);
        writer.publish_params(1, &params(200.0), 1);
        writer.publish();
        pool.swap_buffers_if_pending();

        pool.state(1).activate(&params(200.0), 0.0);
        assert!(pool.compact_back_buffer());
        pool.swap_buffers_if_pending();

        assert_eq!(pool.front()[0].load().target_amplitude, 0.0);
        assert_eq!(pool.front()[1].load().target_amplitude, 0.5);
    }
}
