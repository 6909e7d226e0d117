// src/canvas.rs
//
// Canvas space geometry and the canvas <-> frequency/time mapping.
//
// Canvas space is logical, not screen pixels. Y maps to frequency,
// X maps to normalized time.

pub const MIN_FREQUENCY_FLOOR: f32 = 1.0;
pub const MIN_FREQUENCY_CEILING: f32 = 20_000.0;
pub const MAX_FREQUENCY_CEILING: f32 = 22_000.0;

/// Smallest allowed width/height of the canvas bounds.
pub const MIN_CANVAS_SPAN: f32 = 1.0e-3;

/// A position in canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn distance_to(self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Replace non-finite coordinates with the origin.
    #[inline]
    pub fn sanitized(self) -> Self {
        Self {
            x: if self.x.is_finite() { self.x } else { 0.0 },
            y: if self.y.is_finite() { self.y } else { 0.0 },
        }
    }
}

/// Axis-aligned rectangle in canvas space (y grows upward).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl Bounds {
    pub const fn new(left: f32, bottom: f32, right: f32, top: f32) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    /// Degenerate bounds covering a single point.
    pub const fn around(point: Point) -> Self {
        Self::new(point.x, point.y, point.x, point.y)
    }

    #[inline]
    pub fn expand_to(&mut self, point: Point) {
        self.left = self.left.min(point.x);
        self.right = self.right.max(point.x);
        self.bottom = self.bottom.min(point.y);
        self.top = self.top.max(point.y);
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }

    #[inline]
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left && point.x <= self.right && point.y >= self.bottom && point.y <= self.top
    }

    /// Closed-interval overlap test; touching edges count.
    #[inline]
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.left <= other.right
            && other.left <= self.right
            && self.bottom <= other.top
            && other.bottom <= self.top
    }
}

/// Pure coordinate mapping between canvas space and synthesis parameters.
///
/// This is a plain `Copy` value, so the GUI can hold its own snapshot and
/// call the mapping functions from any thread.
///
/// Invariants (kept by the setters):
/// - `left < right`, `bottom < top`
/// - `1 <= min_frequency <= 20000`, `min_frequency + 1 <= max_frequency <= 22000`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasMapping {
    bounds: Bounds,
    min_frequency: f32,
    max_frequency: f32,
    log_scale: bool,
}

impl Default for CanvasMapping {
    fn default() -> Self {
        let mut mapping = Self {
            bounds: Bounds::new(-100.0, -50.0, 100.0, 50.0),
            min_frequency: 20.0,
            max_frequency: 20_000.0,
            log_scale: true,
        };
        mapping.set_frequency_range(20.0, 20_000.0);
        mapping
    }
}

impl CanvasMapping {
    pub fn new(bounds: Bounds, min_frequency: f32, max_frequency: f32, log_scale: bool) -> Self {
        let mut mapping = Self {
            log_scale,
            ..Self::default()
        };
        mapping.set_canvas_region(bounds.left, bounds.right, bounds.bottom, bounds.top);
        mapping.set_frequency_range(min_frequency, max_frequency);
        mapping
    }

    // -------------------------------
    // MARK: Setters (invariant-enforcing)
    // -------------------------------

    /// Set the frequency range, clamping into an ordered, non-degenerate range.
    pub fn set_frequency_range(&mut self, min_hz: f32, max_hz: f32) {
        let min_hz = if min_hz.is_finite() { min_hz } else { self.min_frequency };
        let max_hz = if max_hz.is_finite() { max_hz } else { self.max_frequency };

        self.min_frequency = min_hz.clamp(MIN_FREQUENCY_FLOOR, MIN_FREQUENCY_CEILING);
        self.max_frequency = max_hz.clamp(self.min_frequency + 1.0, MAX_FREQUENCY_CEILING);
    }

    /// Set the canvas bounds.
    ///
    /// A collapsed or inverted axis is widened to `MIN_CANVAS_SPAN` above
    /// its lower edge; non-finite edges keep their previous value.
    pub fn set_canvas_region(&mut self, left: f32, right: f32, bottom: f32, top: f32) {
        let pick = |value: f32, fallback: f32| if value.is_finite() { value } else { fallback };

        let left = pick(left, self.bounds.left);
        let right = pick(right, self.bounds.right);
        let bottom = pick(bottom, self.bounds.bottom);
        let top = pick(top, self.bounds.top);

        let (left, right) = widen_axis(left, right);
        let (bottom, top) = widen_axis(bottom, top);
        self.bounds = Bounds::new(left, bottom, right, top);
    }

    pub fn set_log_scale(&mut self, log_scale: bool) {
        self.log_scale = log_scale;
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    #[inline]
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    #[inline]
    pub fn min_frequency(&self) -> f32 {
        self.min_frequency
    }

    #[inline]
    pub fn max_frequency(&self) -> f32 {
        self.max_frequency
    }

    #[inline]
    pub fn is_log_scale(&self) -> bool {
        self.log_scale
    }

    /// Clamp a frequency into the configured range. NaN maps to the minimum.
    #[inline]
    pub fn clamp_frequency(&self, frequency: f32) -> f32 {
        if frequency.is_nan() {
            return self.min_frequency;
        }
        frequency.clamp(self.min_frequency, self.max_frequency)
    }

    // -------------------------------
    // MARK: Mapping
    // -------------------------------

    pub fn canvas_y_to_frequency(&self, y: f32) -> f32 {
        let normalized = (y - self.bounds.bottom) / self.bounds.height();
        let normalized = if normalized.is_nan() { 0.0 } else { normalized.clamp(0.0, 1.0) };

        if self.log_scale {
            let log_min = self.min_frequency.ln();
            let log_max = self.max_frequency.ln();
            (log_min + normalized * (log_max - log_min)).exp()
        } else {
            self.min_frequency + normalized * (self.max_frequency - self.min_frequency)
        }
    }

    pub fn frequency_to_canvas_y(&self, frequency: f32) -> f32 {
        let frequency = self.clamp_frequency(frequency);

        let normalized = if self.log_scale {
            let log_min = self.min_frequency.ln();
            let log_max = self.max_frequency.ln();
            (frequency.ln() - log_min) / (log_max - log_min)
        } else {
            (frequency - self.min_frequency) / (self.max_frequency - self.min_frequency)
        };

        self.bounds.bottom + normalized * self.bounds.height()
    }

    pub fn canvas_x_to_time(&self, x: f32) -> f32 {
        let normalized = (x - self.bounds.left) / self.bounds.width();
        if normalized.is_nan() {
            return 0.0;
        }
        normalized.clamp(0.0, 1.0)
    }

    pub fn time_to_canvas_x(&self, time: f32) -> f32 {
        let time = if time.is_nan() { 0.0 } else { time.clamp(0.0, 1.0) };
        self.bounds.left + time * self.bounds.width()
    }
}

/// Keep `upper` at least one representable span above `lower`.
///
/// The span grows with magnitude so it never rounds away.
fn widen_axis(lower: f32, upper: f32) -> (f32, f32) {
    let span = MIN_CANVAS_SPAN.max(lower.abs() * f32::EPSILON * 4.0);
    let min_upper = lower + span;
    if upper >= min_upper {
        (lower, upper)
    } else if min_upper.is_finite() {
        (lower, min_upper)
    } else {
        (lower - span, lower)
    }
}
