//! Geographic bounds in Web Mercator meters.

use serde::{Deserialize, Serialize};

/// A bounding box in EPSG:3857 meters.
///
/// Invariant for tile-derived bounds: `west < east` and `south < north`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoBounds {
    /// Create a new bounding box from edge coordinates.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Width of the bounding box in meters.
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Height of the bounding box in meters.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Check if this box overlaps another with positive area.
    pub fn intersects(&self, other: &GeoBounds) -> bool {
        self.west < other.east
            && self.east > other.west
            && self.south < other.north
            && self.north > other.south
    }

    /// Compute the overlapping region of two boxes.
    pub fn intersection(&self, other: &GeoBounds) -> Option<GeoBounds> {
        if !self.intersects(other) {
            return None;
        }

        Some(GeoBounds {
            west: self.west.max(other.west),
            south: self.south.max(other.south),
            east: self.east.min(other.east),
            north: self.north.min(other.north),
        })
    }

    /// True if `other` lies entirely within this box.
    pub fn contains(&self, other: &GeoBounds) -> bool {
        other.west >= self.west
            && other.east <= self.east
            && other.south >= self.south
            && other.north <= self.north
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection() {
        let a = GeoBounds::new(0.0, 0.0, 10.0, 10.0);
        let b = GeoBounds::new(5.0, 5.0, 15.0, 15.0);
        let c = GeoBounds::new(20.0, 20.0, 30.0, 30.0);

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));

        let i = a.intersection(&b).unwrap();
        assert_eq!(i, GeoBounds::new(5.0, 5.0, 10.0, 10.0));
        assert!(a.intersection(&c).is_none());
    }

    #[test]
    fn test_touching_edges_do_not_intersect() {
        let a = GeoBounds::new(0.0, 0.0, 10.0, 10.0);
        let b = GeoBounds::new(10.0, 0.0, 20.0, 10.0);
        assert!(!a.intersects(&b));
    }

    #[test]
    fn test_contains() {
        let outer = GeoBounds::new(-10.0, -10.0, 10.0, 10.0);
        assert!(outer.contains(&GeoBounds::new(-1.0, -1.0, 1.0, 1.0)));
        assert!(!outer.contains(&GeoBounds::new(-11.0, -1.0, 1.0, 1.0)));
    }
}
