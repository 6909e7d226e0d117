// src/stroke.rs

use std::sync::atomic::{AtomicU32, Ordering};

use crate::canvas::{Bounds, Point};
use crate::color::Color;

pub type StrokeId = u32;

/// Process-wide stroke id counter.
static NEXT_STROKE_ID: AtomicU32 = AtomicU32::new(1);

/// One gesture sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokePoint {
    pub position: Point,
    /// 0-1
    pub pressure: f32,
    pub color: Color,
}

impl StrokePoint {
    /// Build a sample with a sanitized position and pressure clamped to `[0, 1]`.
    pub fn new(position: Point, pressure: f32, color: Color) -> Self {
        Self {
            position: position.sanitized(),
            pressure: if pressure.is_nan() { 0.0 } else { pressure.clamp(0.0, 1.0) },
            color,
        }
    }
}

/// One continuous gesture from press to release.
///
/// Points are append-only until `finalize`, immutable afterwards.
#[derive(Debug, Clone)]
pub struct Stroke {
    id: StrokeId,
    points: Vec<StrokePoint>,
    bounds: Option<Bounds>,
    finalized: bool,
}

impl Stroke {
    /// Start a stroke with a fresh process-wide id.
    pub fn new() -> Self {
        Self {
            id: NEXT_STROKE_ID.fetch_add(1, Ordering::Relaxed),
            points: Vec::with_capacity(256),
            bounds: None,
            finalized: false,
        }
    }

    #[inline]
    pub fn id(&self) -> StrokeId {
        self.id
    }

    #[inline]
    pub fn points(&self) -> &[StrokePoint] {
        &self.points
    }

    #[inline]
    pub fn first_point(&self) -> Option<&StrokePoint> {
        self.points.first()
    }

    #[inline]
    pub fn last_point(&self) -> Option<&StrokePoint> {
        self.points.last()
    }

    #[inline]
    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append a point. Returns `false` once the stroke is finalized.
    pub fn add_point(&mut self, point: StrokePoint) -> bool {
        if self.finalized {
            return false;
        }

        match &mut self.bounds {
            Some(bounds) => bounds.expand_to(point.position),
            None => self.bounds = Some(Bounds::around(point.position)),
        }
        self.points.push(point);
        true
    }

    pub fn finalize(&mut self) {
        self.finalized = true;
        self.points.shrink_to_fit();
    }

    /// The point whose x is closest to `x`, ties going to the earliest.
    pub fn point_nearest_x(&self, x: f32) -> Option<&StrokePoint> {
        self.points.iter().min_by(|a, b| {
            let da = (a.position.x - x).abs();
            let db = (b.position.x - x).abs();
            da.total_cmp(&db)
        })
    }
}

impl Default for Stroke {
    fn default() -> Self {
        Self::new()
    }
}
