// src/engine_controller.rs
//
// Command-driven wrapper around the paint engine.
//
// The UI side holds a `PaintClient` that queues commands and mirrors the
// coordinate mapping locally. The audio side holds an `EngineController`
// that drains the queue under a wall-clock budget, then renders one block.

use std::sync::Arc;
use std::time::Duration;

use log::warn;

use crate::{
    audio_buffer::AudioBuffer,
    bridge::{PaintReadback, SharedControls, create_paint_engine},
    canvas::{Bounds, CanvasMapping, Point},
    color::Color,
    command::{CommandQueueFull, CommandReceiver, CommandSender, PaintCommand, command_channel},
    config::PaintConfig,
    engine::PaintEngine,
    renderer::PaintRenderer,
};

/// UI-thread handle: queues paint commands for the audio thread.
///
/// Mapping changes are applied to a local copy as soon as they are queued,
/// so coordinate conversions answer immediately.
pub struct PaintClient {
    commands: CommandSender,
    controls: Arc<SharedControls>,
    mapping: CanvasMapping,
}

impl PaintClient {
    /// Queue a command. A full queue hands the command back.
    pub fn send(&mut self, command: PaintCommand) -> Result<(), CommandQueueFull> {
        if let Err(err) = self.commands.send(command) {
            warn!("{err}");
            return Err(err);
        }

        match command {
            PaintCommand::SetFrequencyRange { min_hz, max_hz } => {
                self.mapping.set_frequency_range(min_hz, max_hz);
            }
            PaintCommand::SetCanvasRegion {
                left,
                right,
                bottom,
                top,
            } => self.mapping.set_canvas_region(left, right, bottom, top),
            _ => {}
        }
        Ok(())
    }

    pub fn begin_stroke(
        &mut self,
        position: Point,
        pressure: f32,
        color: Color,
    ) -> Result<(), CommandQueueFull> {
        self.send(PaintCommand::BeginStroke {
            position,
            pressure,
            color,
        })
    }

    pub fn update_stroke(&mut self, position: Point, pressure: f32) -> Result<(), CommandQueueFull> {
        self.send(PaintCommand::UpdateStroke { position, pressure })
    }

    pub fn end_stroke(&mut self) -> Result<(), CommandQueueFull> {
        self.send(PaintCommand::EndStroke)
    }

    pub fn clear_canvas(&mut self) -> Result<(), CommandQueueFull> {
        self.send(PaintCommand::ClearCanvas)
    }

    pub fn clear_region(&mut self, bounds: Bounds) -> Result<(), CommandQueueFull> {
        self.send(PaintCommand::ClearRegion { bounds })
    }

    pub fn set_frequency_range(&mut self, min_hz: f32, max_hz: f32) -> Result<(), CommandQueueFull> {
        self.send(PaintCommand::SetFrequencyRange { min_hz, max_hz })
    }

    pub fn set_canvas_region(
        &mut self,
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
    ) -> Result<(), CommandQueueFull> {
        self.send(PaintCommand::SetCanvasRegion {
            left,
            right,
            bottom,
            top,
        })
    }

    pub fn set_playhead_position(&mut self, position: f32) -> Result<(), CommandQueueFull> {
        self.send(PaintCommand::SetPlayheadPosition { position })
    }

    pub fn set_master_gain(&mut self, gain: f32) -> Result<(), CommandQueueFull> {
        self.send(PaintCommand::SetMasterGain { gain })
    }

    pub fn set_active(&mut self, active: bool) -> Result<(), CommandQueueFull> {
        self.send(PaintCommand::SetPaintActive { active })
    }

    /// Applied directly; panning has no command.
    pub fn set_panning_enabled(&self, enabled: bool) {
        self.controls.set_panning_enabled(enabled);
    }

    #[inline]
    pub fn mapping(&self) -> CanvasMapping {
        self.mapping
    }

    pub fn readback(&self) -> PaintReadback {
        self.controls.readback()
    }

    /// Free slots left in the command queue.
    pub fn queue_slots(&self) -> usize {
        self.commands.slots()
    }
}

/// Controller that owns both engine halves and the command consumer.
///
/// This runs on the audio thread.
pub struct EngineController {
    engine: PaintEngine,
    renderer: PaintRenderer,
    commands: CommandReceiver,
    command_budget: Duration,
}

impl EngineController {
    pub fn new(
        engine: PaintEngine,
        renderer: PaintRenderer,
        commands: CommandReceiver,
        command_budget: Duration,
    ) -> Self {
        Self {
            engine,
            renderer,
            commands,
            command_budget,
        }
    }

    pub fn prepare_to_play(&mut self, sample_rate: f64, block_size: usize) {
        self.renderer.prepare_to_play(sample_rate, block_size);
    }

    /// Apply queued commands within the time budget.
    ///
    /// Returns the number applied; the rest wait for the next block.
    pub fn process_commands(&mut self) -> usize {
        let engine = &mut self.engine;
        let applied = self
            .commands
            .drain_with_time_limit(self.command_budget, |command| engine.apply(command));

        // Retry writes that found the back buffer busy.
        engine.flush_pending_writes();
        applied
    }

    /// Process one audio block.
    ///
    /// This is the main entry point called from the audio callback.
    pub fn process_block(&mut self, buffer: &mut AudioBuffer) {
        self.process_commands();
        self.renderer.process_block(buffer);
    }

    pub fn release_resources(&mut self) {
        self.renderer.release_resources();
    }

    /// Get a reference to the engine.
    pub fn engine(&self) -> &PaintEngine {
        &self.engine
    }

    /// Get a mutable reference to the engine.
    pub fn engine_mut(&mut self) -> &mut PaintEngine {
        &mut self.engine
    }

    pub fn renderer(&self) -> &PaintRenderer {
        &self.renderer
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }
}

/// Create a linked UI client and audio-thread controller.
pub fn create_engine_controller(config: PaintConfig) -> (PaintClient, EngineController) {
    let config = config.sanitized();
    let (engine, mut renderer) = create_paint_engine(config);
    renderer.prepare_to_play(config.sample_rate, config.block_size);

    let (sender, receiver) = command_channel(config.command_queue_capacity);
    let client = PaintClient {
        commands: sender,
        controls: Arc::clone(engine.controls()),
        mapping: engine.mapping(),
    };
    let controller = EngineController::new(engine, renderer, receiver, config.command_budget);
    (client, controller)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn render(controller: &mut EngineController, blocks: usize) -> Vec<f32> {
        let mut data = vec![0.0; 512 * 2];
        for _ in 0..blocks {
            let mut buffer = AudioBuffer::new(&mut data, 2);
            controller.process_block(&mut buffer);
        }
        data
    }

    #[test]
    fn test_engine_controller_creation() {
        let (client, controller) = create_engine_controller(PaintConfig::default());

        assert_eq!(controller.engine().get_active_oscillator_count(), 0);
        assert_eq!(controller.pending_commands(), 0);
        assert_eq!(client.queue_slots(), PaintConfig::default().command_queue_capacity);
        assert!(client.readback().active);
    }

    #[test]
    fn test_commands_then_render() {
        let (mut client, mut controller) = create_engine_controller(PaintConfig::default());
        client
            .begin_stroke(Point::new(0.0, 0.0), 1.0, Color::WHITE)
            .unwrap();
        client.update_stroke(Point::new(1.0, 1.0), 1.0).unwrap();

        let data = render(&mut controller, 4);

        assert_eq!(controller.pending_commands(), 0);
        assert!(controller.engine().current_stroke().is_some());
        assert_eq!(client.readback().active_oscillators, 1);
        assert_eq!(client.readback().blocks_processed, 4);
        assert!(data.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_end_and_clear_commands() {
        let (mut client, mut controller) = create_engine_controller(PaintConfig::default());
        client
            .begin_stroke(Point::new(0.0, 0.0), 0.8, Color::WHITE)
            .unwrap();
        client.end_stroke().unwrap();
        controller.process_commands();
        assert_eq!(controller.engine().regions().len(), 1);

        client.clear_canvas().unwrap();
        controller.process_commands();
        assert!(controller.engine().regions().is_empty());
    }

    #[test]
    fn test_client_mapping_tracks_engine() {
        let (mut client, mut controller) = create_engine_controller(PaintConfig::default());
        client.set_frequency_range(50.0, 5_000.0).unwrap();
        client.set_canvas_region(0.0, 10.0, 0.0, 10.0).unwrap();

        // Local copy updates before the audio thread sees the commands.
        assert_relative_eq!(client.mapping().canvas_y_to_frequency(0.0), 50.0, max_relative = 1e-4);

        controller.process_commands();
        assert_eq!(client.mapping(), controller.engine().mapping());
    }

    #[test]
    fn test_full_queue_is_reported() {
        let config = PaintConfig {
            command_queue_capacity: 1,
            ..PaintConfig::default()
        };
        let (mut client, _controller) = create_engine_controller(config);
        client.end_stroke().unwrap();

        let err = client.set_master_gain(0.2).unwrap_err();
        assert_eq!(err.into_inner(), PaintCommand::SetMasterGain { gain: 0.2 });
    }
}
