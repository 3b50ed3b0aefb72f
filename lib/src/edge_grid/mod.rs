//! Spatial hash for closest-point-in-radius queries.
//!
//! Points are bucketed into square cells whose side is the smallest power of
//! two not below the search radius, so grid coordinates are obtained with an
//! arithmetic shift. A query only inspects the 3×3 block of cells around the
//! query point.
//!
//! Every stored point carries a payload. Queries can skip entries through a
//! predicate on the payload, which lets callers retire entries without
//! rebuilding the grid.
//!
//! # Example
//!
//! ```ignore
//! use slicer_support::edge_grid::ClosestPointGrid;
//! use slicer_support::geometry::Point;
//!
//! let mut grid = ClosestPointGrid::new(1_000_000); // 1mm search radius
//! grid.insert(Point::new(0, 0), 7);
//! assert_eq!(grid.find(&Point::new(500_000, 0)).map(|(_, v, _)| *v), Some(7));
//! assert!(grid.find(&Point::new(2_000_000, 0)).is_none());
//! ```

use crate::geometry::Point;
use crate::Coord;
use std::collections::HashMap;

/// Bucketed point set answering "closest stored point within the search
/// radius" queries in constant time for evenly spread points.
#[derive(Debug, Clone)]
pub struct ClosestPointGrid<T> {
    search_radius: Coord,
    /// log2 of the cell side.
    grid_log2: u32,
    cells: HashMap<(Coord, Coord), Vec<(Point, T)>>,
    len: usize,
}

impl<T> ClosestPointGrid<T> {
    /// Grid for queries with the given search radius (scaled units).
    pub fn new(search_radius: Coord) -> Self {
        let search_radius = search_radius.max(1);
        let mut grid_log2 = 0u32;
        while (1 as Coord) << grid_log2 < search_radius {
            grid_log2 += 1;
        }
        Self {
            search_radius,
            grid_log2,
            cells: HashMap::new(),
            len: 0,
        }
    }

    #[inline]
    pub fn search_radius(&self) -> Coord {
        self.search_radius
    }

    /// Side of one grid cell (scaled units).
    #[inline]
    pub fn cell_size(&self) -> Coord {
        1 << self.grid_log2
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn cell_of(&self, p: &Point) -> (Coord, Coord) {
        (p.x >> self.grid_log2, p.y >> self.grid_log2)
    }

    pub fn insert(&mut self, p: Point, value: T) {
        let cell = self.cell_of(&p);
        self.cells.entry(cell).or_default().push((p, value));
        self.len += 1;
    }

    /// Closest stored point strictly closer than the search radius, with its
    /// payload and distance.
    pub fn find(&self, p: &Point) -> Option<(Point, &T, f64)> {
        self.find_if(p, |_| true)
    }

    /// Like [`ClosestPointGrid::find`], ignoring entries whose payload is
    /// rejected by `accept`. Among equally close entries the first inserted
    /// one wins.
    pub fn find_if(&self, p: &Point, accept: impl Fn(&T) -> bool) -> Option<(Point, &T, f64)> {
        let (cx, cy) = self.cell_of(p);
        let r2 = (self.search_radius as i128) * (self.search_radius as i128);
        let mut best: Option<(Point, &T, i128)> = None;
        for dy in -1..=1 {
            for dx in -1..=1 {
                let Some(bucket) = self.cells.get(&(cx + dx, cy + dy)) else {
                    continue;
                };
                for (q, value) in bucket {
                    let d2 = p.distance_squared(q);
                    if d2 < r2 && best.map_or(true, |(_, _, b)| d2 < b) && accept(value) {
                        best = Some((*q, value, d2));
                    }
                }
            }
        }
        best.map(|(q, value, d2)| (q, value, (d2 as f64).sqrt()))
    }
}
