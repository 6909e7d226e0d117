// src/region.rs

use std::collections::HashMap;
use std::sync::Arc;

use crate::canvas::Bounds;
use crate::stroke::{Stroke, StrokeId};

/// Packed `(region_x, region_y)` lookup key.
pub type RegionKey = u64;

/// Pack two grid coordinates into one reversible 64-bit key.
#[inline]
pub fn region_key(region_x: i32, region_y: i32) -> RegionKey {
    ((region_x as u32 as u64) << 32) | (region_y as u32 as u64)
}

#[inline]
pub fn unpack_region_key(key: RegionKey) -> (i32, i32) {
    ((key >> 32) as u32 as i32, key as u32 as i32)
}

/// Fixed-size bucket of canvas space holding finalized strokes.
#[derive(Debug, Clone)]
pub struct CanvasRegion {
    region_x: i32,
    region_y: i32,
    strokes: Vec<Arc<Stroke>>,
}

impl CanvasRegion {
    pub fn new(region_x: i32, region_y: i32) -> Self {
        Self {
            region_x,
            region_y,
            strokes: Vec::with_capacity(16),
        }
    }

    #[inline]
    pub fn coords(&self) -> (i32, i32) {
        (self.region_x, self.region_y)
    }

    #[inline]
    pub fn key(&self) -> RegionKey {
        region_key(self.region_x, self.region_y)
    }

    pub fn add_stroke(&mut self, stroke: Arc<Stroke>) {
        self.strokes.push(stroke);
    }

    pub fn remove_stroke(&mut self, id: StrokeId) {
        self.strokes.retain(|s| s.id() != id);
    }

    #[inline]
    pub fn strokes(&self) -> &[Arc<Stroke>] {
        &self.strokes
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }
}

/// Regions keyed by packed grid coordinates, created on demand.
#[derive(Debug, Clone)]
pub struct RegionMap {
    region_size: f32,
    regions: HashMap<RegionKey, CanvasRegion>,
}

impl RegionMap {
    pub fn new(region_size: f32) -> Self {
        Self {
            region_size: if region_size.is_finite() && region_size > 0.0 { region_size } else { 1.0 },
            regions: HashMap::new(),
        }
    }

    #[inline]
    pub fn region_size(&self) -> f32 {
        self.region_size
    }

    /// Grid coordinates of the region containing `(x, y)`.
    pub fn coords_for(&self, x: f32, y: f32) -> (i32, i32) {
        // `as` saturates, so far-off coordinates land in edge regions.
        (
            (x / self.region_size).floor() as i32,
            (y / self.region_size).floor() as i32,
        )
    }

    pub fn get_or_create(&mut self, x: f32, y: f32) -> &mut CanvasRegion {
        let (region_x, region_y) = self.coords_for(x, y);
        self.regions
            .entry(region_key(region_x, region_y))
            .or_insert_with(|| CanvasRegion::new(region_x, region_y))
    }

    pub fn get(&self, key: RegionKey) -> Option<&CanvasRegion> {
        self.regions.get(&key)
    }

    /// Hand a finalized stroke to the region containing its first point.
    ///
    /// Returns the receiving region's key, or `None` for an empty stroke.
    pub fn insert_stroke(&mut self, stroke: Arc<Stroke>) -> Option<RegionKey> {
        let first = stroke.first_point()?.position;
        let region = self.get_or_create(first.x, first.y);
        region.add_stroke(stroke);
        Some(region.key())
    }

    /// Remove every stroke whose bounds intersect `area`.
    ///
    /// Returns the removed strokes.
    pub fn remove_strokes_in(&mut self, area: &Bounds) -> Vec<Arc<Stroke>> {
        let mut removed = Vec::new();
        for region in self.regions.values_mut() {
            region.strokes.retain(|stroke| {
                let hit = stroke.bounds().is_some_and(|b| b.intersects(area));
                if hit {
                    removed.push(Arc::clone(stroke));
                }
                !hit
            });
        }
        removed
    }

    /// Drop regions that no longer hold strokes.
    pub fn cull_empty(&mut self) -> usize {
        let before = self.regions.len();
        self.regions.retain(|_, region| !region.is_empty());
        before - self.regions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CanvasRegion> {
        self.regions.values()
    }

    pub fn strokes(&self) -> impl Iterator<Item = &Arc<Stroke>> {
        self.regions.values().flat_map(|r| r.strokes.iter())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn clear(&mut self) {
        self.regions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Point;
    use crate::color::Color;
    use crate::stroke::StrokePoint;

    fn stroke_at(points: &[(f32, f32)]) -> Arc<Stroke> {
        let mut stroke = Stroke::new();
        for &(x, y) in points {
            stroke.add_point(StrokePoint::new(Point::new(x, y), 0.5, Color::WHITE));
        }
        stroke.finalize();
        Arc::new(stroke)
    }

    #[test]
    fn test_key_round_trip_with_negatives() {
        for (x, y) in [(0, 0), (-1, 5), (7, -3), (i32::MIN, i32::MAX), (-42, -42)] {
            assert_eq!(unpack_region_key(region_key(x, y)), (x, y));
        }
        assert_ne!(region_key(-1, 0), region_key(0, -1));
    }

    #[test]
    fn test_stroke_goes_to_first_point_region() {
        let mut map = RegionMap::new(50.0);
        let key = map.insert_stroke(stroke_at(&[(-10.0, 60.0), (80.0, 60.0)])).unwrap();

        assert_eq!(unpack_region_key(key), (-1, 1));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(key).unwrap().strokes().len(), 1);
    }

    #[test]
    fn test_empty_stroke_is_not_stored() {
        let mut map = RegionMap::new(50.0);
        assert!(map.insert_stroke(Arc::new(Stroke::new())).is_none());
        assert!(map.is_empty());
    }

    #[test]
    fn test_remove_and_cull() {
        let mut map = RegionMap::new(50.0);
        map.insert_stroke(stroke_at(&[(0.0, 0.0), (10.0, 10.0)]));
        map.insert_stroke(stroke_at(&[(-80.0, -40.0)]));

        let removed = map.remove_strokes_in(&Bounds::new(5.0, 5.0, 20.0, 20.0));
        assert_eq!(removed.len(), 1);
        assert_eq!(map.len(), 2);

        assert_eq!(map.cull_empty(), 1);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_region_remove_by_id() {
        let stroke = stroke_at(&[(1.0, 1.0)]);
        let mut region = CanvasRegion::new(0, 0);
        region.add_stroke(Arc::clone(&stroke));
        region.remove_stroke(stroke.id());
        assert!(region.is_empty());
    }
}
