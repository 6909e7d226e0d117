// src/command.rs
//
// Bounded SPSC command FIFO from the gesture/UI side to the thread that
// owns the paint engine.

use std::fmt;
use std::time::{Duration, Instant};

use crate::canvas::{Bounds, Point};
use crate::color::Color;
use crate::config::DEFAULT_COMMAND_QUEUE_CAPACITY;

pub const COMMAND_QUEUE_CAPACITY: usize = DEFAULT_COMMAND_QUEUE_CAPACITY;

/// Discrete paint commands, applied in FIFO order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaintCommand {
    // ─────────────────────────────────────────────────────────────
    // Strokes
    // ─────────────────────────────────────────────────────────────
    BeginStroke {
        position: Point,
        pressure: f32,
        color: Color,
    },
    UpdateStroke {
        position: Point,
        pressure: f32,
    },
    EndStroke,

    // ─────────────────────────────────────────────────────────────
    // Canvas
    // ─────────────────────────────────────────────────────────────
    ClearCanvas,
    ClearRegion {
        bounds: Bounds,
    },
    SetFrequencyRange {
        min_hz: f32,
        max_hz: f32,
    },
    SetCanvasRegion {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
    },
    /// Normalized 0-1
    SetPlayheadPosition {
        position: f32,
    },

    // ─────────────────────────────────────────────────────────────
    // Output
    // ─────────────────────────────────────────────────────────────
    SetMasterGain {
        gain: f32,
    },
    SetPaintActive {
        active: bool,
    },
}

/// The FIFO was full; the rejected command is handed back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandQueueFull(pub PaintCommand);

impl CommandQueueFull {
    pub fn into_inner(self) -> PaintCommand {
        self.0
    }
}

impl fmt::Display for CommandQueueFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "paint command queue is full, dropped {:?}", self.0)
    }
}

impl std::error::Error for CommandQueueFull {}

/// Producer half, owned by the gesture/UI thread.
pub struct CommandSender {
    producer: rtrb::Producer<PaintCommand>,
}

/// Consumer half, owned by the thread that drives the engine.
pub struct CommandReceiver {
    consumer: rtrb::Consumer<PaintCommand>,
}

/// Create a bounded command FIFO holding at least one command.
pub fn command_channel(capacity: usize) -> (CommandSender, CommandReceiver) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity.max(1));
    (CommandSender { producer }, CommandReceiver { consumer })
}

impl CommandSender {
    /// Queue a command without blocking.
    pub fn send(&mut self, command: PaintCommand) -> Result<(), CommandQueueFull> {
        self.producer
            .push(command)
            .map_err(|err| match err {
                rtrb::PushError::Full(command) => CommandQueueFull(command),
            })
    }

    /// Free slots left in the queue.
    pub fn slots(&self) -> usize {
        self.producer.slots()
    }
}

impl CommandReceiver {
    pub fn pop(&mut self) -> Option<PaintCommand> {
        self.consumer.pop().ok()
    }

    /// Commands waiting to be drained.
    pub fn len(&self) -> usize {
        self.consumer.slots()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    /// Apply queued commands in order until the queue is empty or `budget`
    /// has elapsed. At least one command is applied if any is queued.
    ///
    /// Returns the number of commands applied.
    pub fn drain_with_time_limit(
        &mut self,
        budget: Duration,
        mut apply: impl FnMut(PaintCommand),
    ) -> usize {
        let start = Instant::now();
        let mut applied = 0;

        while let Ok(command) = self.consumer.pop() {
            apply(command);
            applied += 1;
            if start.elapsed() >= budget {
                break;
            }
        }
        applied
    }
}
