//! Axis-aligned bounding box.

use super::Point;
use crate::Coord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 2D axis-aligned bounding box with scaled integer coordinates.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point,
    pub max: Point,
    defined: bool,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundingBox {
    /// An undefined box; merging the first point defines it.
    #[inline]
    pub fn new() -> Self {
        Self {
            min: Point::new(Coord::MAX, Coord::MAX),
            max: Point::new(Coord::MIN, Coord::MIN),
            defined: false,
        }
    }

    #[inline]
    pub fn from_points_minmax(min: Point, max: Point) -> Self {
        Self {
            min,
            max,
            defined: true,
        }
    }

    pub fn from_points(points: &[Point]) -> Self {
        let mut bb = Self::new();
        for p in points {
            bb.merge_point(*p);
        }
        bb
    }

    #[inline]
    pub fn is_defined(&self) -> bool {
        self.defined
    }

    pub fn merge_point(&mut self, p: Point) {
        if self.defined {
            self.min.x = self.min.x.min(p.x);
            self.min.y = self.min.y.min(p.y);
            self.max.x = self.max.x.max(p.x);
            self.max.y = self.max.y.max(p.y);
        } else {
            self.min = p;
            self.max = p;
            self.defined = true;
        }
    }

    pub fn merge(&mut self, other: &BoundingBox) {
        if other.defined {
            self.merge_point(other.min);
            self.merge_point(other.max);
        }
    }

    #[inline]
    pub fn size(&self) -> Point {
        if self.defined {
            self.max - self.min
        } else {
            Point::zero()
        }
    }

    #[inline]
    pub fn center(&self) -> Point {
        Point::new((self.min.x + self.max.x) / 2, (self.min.y + self.max.y) / 2)
    }

    /// Inclusive containment test.
    #[inline]
    pub fn contains_point(&self, p: &Point) -> bool {
        self.defined
            && p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.defined
            && other.defined
            && self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Grow by `margin` on every side.
    pub fn offset(&mut self, margin: Coord) {
        if self.defined {
            self.min -= Point::new(margin, margin);
            self.max += Point::new(margin, margin);
        }
    }
}

impl fmt::Debug for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.defined {
            write!(f, "BoundingBox({:?} - {:?})", self.min, self.max)
        } else {
            write!(f, "BoundingBox(undefined)")
        }
    }
}
