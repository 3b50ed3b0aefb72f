//! Polyline type for open paths.
//!
//! Support toolpaths are built from polylines: clipped perimeter
//! centerlines, anchor tails, infill lines and the fragments produced by
//! extrusion height modulation.

use super::{BoundingBox, Line, Point, PointF, Polygon};
use crate::{Coord, CoordF};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut, Index};

/// An open path. A polyline whose last point equals its first point is
/// a closed loop stored as an open path.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<Point>,
}

impl Polyline {
    #[inline]
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    #[inline]
    pub fn from_points(points: Vec<Point>) -> Self {
        Self { points }
    }

    #[inline]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    #[inline]
    pub fn points_mut(&mut self) -> &mut Vec<Point> {
        &mut self.points
    }

    #[inline]
    pub fn into_points(self) -> Vec<Point> {
        self.points
    }

    #[inline]
    pub fn push(&mut self, point: Point) {
        self.points.push(point);
    }

    /// First point. Panics on an empty polyline.
    #[inline]
    pub fn first_point(&self) -> Point {
        self.points[0]
    }

    /// Last point. Panics on an empty polyline.
    #[inline]
    pub fn last_point(&self) -> Point {
        self.points[self.points.len() - 1]
    }

    /// Segments of the path.
    pub fn lines(&self) -> Vec<Line> {
        self.points
            .windows(2)
            .map(|w| Line::new(w[0], w[1]))
            .collect()
    }

    /// Total length in scaled units.
    pub fn length(&self) -> CoordF {
        self.points.windows(2).map(|w| w[0].distance(&w[1])).sum()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.points.len() > 2 && self.points.first() == self.points.last()
    }

    /// At least two points, not all coincident.
    pub fn is_valid(&self) -> bool {
        self.points.len() >= 2 && self.points.iter().any(|p| *p != self.points[0])
    }

    #[inline]
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.points)
    }

    /// Append another path. A shared joint point is stored once.
    pub fn append(&mut self, other: &Polyline) {
        let skip = match (self.points.last(), other.points.first()) {
            (Some(a), Some(b)) if a == b => 1,
            _ => 0,
        };
        self.points.extend_from_slice(&other.points[skip.min(other.points.len())..]);
    }

    /// Remove `distance` (scaled units) worth of path from the end.
    pub fn clip_end(&mut self, mut distance: CoordF) {
        while distance > 0.0 {
            let Some(last) = self.points.pop() else {
                break;
            };
            let Some(&prev) = self.points.last() else {
                break;
            };
            let segment = last.distance(&prev);
            if segment > distance {
                self.points.push(last.lerp(prev, distance / segment));
                return;
            }
            distance -= segment;
        }
    }

    /// Remove `distance` (scaled units) worth of path from the start.
    pub fn clip_start(&mut self, distance: CoordF) {
        self.reverse();
        self.clip_end(distance);
        self.reverse();
    }

    /// Move the first point outward along the first segment.
    pub fn extend_start(&mut self, distance: CoordF) {
        if self.points.len() < 2 {
            return;
        }
        let dir = PointF::from(self.points[0] - self.points[1]).normalize();
        self.points[0] += Point::from(dir * distance);
    }

    /// Move the last point outward along the last segment.
    pub fn extend_end(&mut self, distance: CoordF) {
        let n = self.points.len();
        if n < 2 {
            return;
        }
        let dir = PointF::from(self.points[n - 1] - self.points[n - 2]).normalize();
        self.points[n - 1] += Point::from(dir * distance);
    }

    /// Every segment points in the direction of the chord from the first
    /// to the last point.
    pub fn is_straight(&self) -> bool {
        if self.points.len() < 2 {
            return false;
        }
        let chord = PointF::from(self.last_point() - self.first_point()).normalize();
        if chord.length_squared() == 0.0 {
            return false;
        }
        self.points.windows(2).all(|w| {
            let dir = PointF::from(w[1] - w[0]).normalize();
            dir.cross(&chord).abs() < 1e-3 && dir.dot(&chord) > 0.0
        })
    }

    /// Translate all points.
    pub fn translate(&mut self, v: Point) {
        for p in &mut self.points {
            *p += v;
        }
    }

    /// Rotate all points around the origin.
    pub fn rotate(&mut self, angle: CoordF) {
        let (s, c) = angle.sin_cos();
        for p in &mut self.points {
            *p = p.rotate_by_cos_sin(c, s);
        }
    }

}

impl fmt::Debug for Polyline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Polyline({} points)", self.points.len())
    }
}

impl Deref for Polyline {
    type Target = [Point];

    fn deref(&self) -> &Self::Target {
        &self.points
    }
}

impl DerefMut for Polyline {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.points
    }
}

impl Index<usize> for Polyline {
    type Output = Point;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl FromIterator<Point> for Polyline {
    fn from_iter<I: IntoIterator<Item = Point>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<Point>> for Polyline {
    fn from(points: Vec<Point>) -> Self {
        Self::from_points(points)
    }
}

impl From<Polygon> for Polyline {
    /// Open path through the polygon's points (not closed).
    fn from(polygon: Polygon) -> Self {
        Self::from_points(polygon.into_points())
    }
}

/// A collection of polylines.
pub type Polylines = Vec<Polyline>;

/// Total length of a set of polylines, in scaled units.
pub fn total_length(polylines: &[Polyline]) -> CoordF {
    polylines.iter().map(Polyline::length).sum()
}
