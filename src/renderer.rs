// src/renderer.rs

use std::sync::Arc;
use std::time::Instant;

use log::debug;

use crate::audio_buffer::AudioBuffer;
use crate::bridge::SharedControls;
use crate::config::PaintConfig;
use crate::pool::OscillatorPool;
use crate::smoothing::LinearSmoothedValue;
use crate::voice::EnvelopeSteps;

/// Audio-side half of the paint engine.
///
/// This struct runs exclusively on the audio thread.
/// `process_block` must not allocate, lock or log.
pub struct PaintRenderer {
    config: PaintConfig,
    pool: Arc<OscillatorPool>,
    controls: Arc<SharedControls>,
    /// Finished slots, back to the control side.
    reclaimed: rtrb::Producer<usize>,

    sample_rate: f32,
    block_size: usize,
    steps: EnvelopeSteps,
    master_gain: LinearSmoothedValue,

    blocks_since_compaction: u32,
}

impl PaintRenderer {
    pub(crate) fn new(
        config: PaintConfig,
        pool: Arc<OscillatorPool>,
        controls: Arc<SharedControls>,
        reclaimed: rtrb::Producer<usize>,
    ) -> Self {
        let mut renderer = Self {
            config,
            pool,
            controls,
            reclaimed,
            sample_rate: config.sample_rate as f32,
            block_size: config.block_size,
            steps: EnvelopeSteps::new(
                config.sample_rate,
                config.attack_seconds,
                config.release_seconds,
            ),
            master_gain: LinearSmoothedValue::new(config.master_gain),
            blocks_since_compaction: 0,
        };
        renderer
            .master_gain
            .reset(config.sample_rate, config.gain_ramp_seconds);
        renderer
    }

    /// Prepare for playback at a new sample rate and block size.
    ///
    /// Resets the render state of every slot; lifecycle state is kept.
    pub fn prepare_to_play(&mut self, sample_rate: f64, block_size: usize) {
        let sample_rate = if sample_rate.is_finite() && sample_rate >= 1.0 {
            sample_rate
        } else {
            self.config.sample_rate
        };

        self.sample_rate = sample_rate as f32;
        self.block_size = block_size.max(1);
        self.steps = EnvelopeSteps::new(
            sample_rate,
            self.config.attack_seconds,
            self.config.release_seconds,
        );

        self.master_gain
            .reset(sample_rate, self.config.gain_ramp_seconds);
        self.master_gain
            .set_current_and_target(self.controls.master_gain());

        self.pool.reset_render_state();
        self.controls.reset_telemetry();
        self.blocks_since_compaction = 0;

        debug!("paint renderer prepared: {sample_rate} Hz, block {}", self.block_size);
    }

    /// Clear `buffer` and render every sounding oscillator into it.
    ///
    /// Channel 0 is left, channel 1 right; further channels stay silent.
    pub fn process_block(&mut self, buffer: &mut AudioBuffer) {
        buffer.clear();
        if !self.controls.is_active() {
            return;
        }
        let start = Instant::now();

        self.pool.swap_buffers_if_pending();
        self.master_gain.set_target(self.controls.master_gain());

        let frames = buffer.frames;
        let stereo = self.controls.panning_enabled() && buffer.channels > 1;
        let (left, mut right) = buffer.stereo_mut();

        let front = self.pool.front();
        let states = self.pool.states();
        let mut sounding = 0;

        for (index, (slot, state)) in front.iter().zip(states).enumerate() {
            if !state.is_active() {
                if state.reclaim_if_finished() {
                    // Ring holds two entries per slot; a full ring means the
                    // slot is already queued.
                    self.reclaimed.push(index).ok();
                }
                continue;
            }

            // Parameters for this activation not published yet.
            let generation = slot.generation();
            if generation != state.generation() {
                continue;
            }
            state.begin_render(generation);
            if state.take_release_request() {
                state.release();
            }
            sounding += 1;

            let mut osc = slot.load();
            for frame in 0..frames {
                let envelope = state.update_envelope(self.steps);
                osc.smooth_parameters(self.config.parameter_smoothing);
                let sample = osc.get_sample() * envelope;

                match right.as_deref_mut() {
                    Some(right) if stereo => {
                        left[frame] += sample * (1.0 - osc.pan);
                        right[frame] += sample * osc.pan;
                    }
                    _ => left[frame] += sample,
                }
                osc.update_phase(self.sample_rate);

                if !state.is_active() {
                    break;
                }
            }
            slot.store_render_state(&osc);

            if state.reclaim_if_finished() {
                // Full ring: the index is already queued.
                self.reclaimed.push(index).ok();
            }
        }

        for frame in 0..frames {
            let gain = self.master_gain.next_value();
            left[frame] *= gain;
            if let Some(right) = right.as_deref_mut() {
                right[frame] = if stereo { right[frame] * gain } else { left[frame] };
            }
        }

        self.blocks_since_compaction += 1;
        if self.config.compaction_interval > 0
            && self.blocks_since_compaction >= self.config.compaction_interval
        {
            self.blocks_since_compaction = 0;
            self.pool.compact_back_buffer();
        }

        let block_seconds = frames as f64 / f64::from(self.sample_rate);
        let cpu_load = if block_seconds > 0.0 {
            (start.elapsed().as_secs_f64() / block_seconds) as f32
        } else {
            0.0
        };
        self.controls.publish_block(cpu_load, sounding);
    }

    /// Silence everything and drop render state.
    pub fn release_resources(&mut self) {
        self.pool.reset_render_state();
        self.controls.reset_telemetry();
        self.master_gain
            .set_current_and_target(self.controls.master_gain());
    }

    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn pool(&self) -> &Arc<OscillatorPool> {
        &self.pool
    }

    #[inline]
    pub fn controls(&self) -> &Arc<SharedControls> {
        &self.controls
    }
}
