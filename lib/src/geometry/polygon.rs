//! Polygon type for closed contours.

use super::{BoundingBox, Line, Point, Polyline};
use crate::{Coord, CoordF};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut, Index};

/// A closed polygon. The last point connects back to the first and is not
/// stored twice. Outer contours are counter-clockwise, holes clockwise.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
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

    /// Point at `index`, wrapping around.
    #[inline]
    pub fn point_at(&self, index: usize) -> Point {
        self.points[index % self.points.len()]
    }

    /// All edges including the closing edge.
    pub fn lines(&self) -> Vec<Line> {
        let n = self.points.len();
        if n < 2 {
            return Vec::new();
        }
        (0..n)
            .map(|i| Line::new(self.points[i], self.points[(i + 1) % n]))
            .collect()
    }

    /// Signed area in scaled units squared (shoelace formula).
    /// Positive for counter-clockwise polygons.
    pub fn signed_area(&self) -> CoordF {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let sum: i128 = (0..n)
            .map(|i| self.points[i].cross(&self.points[(i + 1) % n]))
            .sum();
        sum as CoordF / 2.0
    }

    #[inline]
    pub fn area(&self) -> CoordF {
        self.signed_area().abs()
    }

    #[inline]
    pub fn is_counter_clockwise(&self) -> bool {
        self.signed_area() > 0.0
    }

    #[inline]
    pub fn is_clockwise(&self) -> bool {
        self.signed_area() < 0.0
    }

    pub fn make_counter_clockwise(&mut self) {
        if self.is_clockwise() {
            self.reverse();
        }
    }

    pub fn make_clockwise(&mut self) {
        if self.is_counter_clockwise() {
            self.reverse();
        }
    }

    #[inline]
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// Perimeter length in scaled units.
    pub fn length(&self) -> CoordF {
        self.lines().iter().map(Line::length).sum()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.points)
    }

    /// Even-odd ray casting point-in-polygon test.
    pub fn contains_point(&self, p: &Point) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let pi = self.points[i];
            let pj = self.points[j];
            if (pi.y > p.y) != (pj.y > p.y) {
                let x_cross = (pj.x as i128 - pi.x as i128) * (p.y as i128 - pi.y as i128)
                    / (pj.y as i128 - pi.y as i128)
                    + pi.x as i128;
                if (p.x as i128) < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// Open the polygon at its first point: the returned polyline starts and
    /// ends at the first point.
    pub fn split_at_first_point(&self) -> Polyline {
        self.split_at_index(0)
    }

    /// Open the polygon at `index`: the returned polyline starts and ends at
    /// that vertex.
    pub fn split_at_index(&self, index: usize) -> Polyline {
        let n = self.points.len();
        if n == 0 {
            return Polyline::new();
        }
        (0..=n).map(|i| self.points[(index + i) % n]).collect()
    }

    pub fn translate(&mut self, v: Point) {
        for p in &mut self.points {
            *p += v;
        }
    }

    pub fn rotate(&mut self, angle: CoordF) {
        let (s, c) = angle.sin_cos();
        for p in &mut self.points {
            *p = p.rotate_by_cos_sin(c, s);
        }
    }

    /// An axis-aligned rectangle, counter-clockwise.
    pub fn rectangle(min: Point, max: Point) -> Self {
        Self::from_points(vec![
            min,
            Point::new(max.x, min.y),
            max,
            Point::new(min.x, max.y),
        ])
    }

    pub fn square(center: Point, half_size: Coord) -> Self {
        Self::rectangle(
            Point::new(center.x - half_size, center.y - half_size),
            Point::new(center.x + half_size, center.y + half_size),
        )
    }

    /// A regular n-gon centered at `center`, counter-clockwise.
    pub fn regular(center: Point, radius: CoordF, n: usize) -> Self {
        if n < 3 {
            return Self::new();
        }
        (0..n)
            .map(|i| {
                let angle = 2.0 * std::f64::consts::PI * i as CoordF / n as CoordF;
                center
                    + Point::new(
                        (radius * angle.cos()).round() as Coord,
                        (radius * angle.sin()).round() as Coord,
                    )
            })
            .collect()
    }
}

impl fmt::Debug for Polygon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Polygon({} points)", self.points.len())
    }
}

impl Deref for Polygon {
    type Target = [Point];

    fn deref(&self) -> &Self::Target {
        &self.points
    }
}

impl DerefMut for Polygon {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.points
    }
}

impl Index<usize> for Polygon {
    type Output = Point;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl FromIterator<Point> for Polygon {
    fn from_iter<I: IntoIterator<Item = Point>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<Point>> for Polygon {
    fn from(points: Vec<Point>) -> Self {
        Self::from_points(points)
    }
}

/// A collection of polygons.
pub type Polygons = Vec<Polygon>;
