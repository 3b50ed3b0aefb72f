//! Extrusion entities produced for support layers.
//!
//! An [`ExtrusionEntityCollection`] is the per-layer output handed to the
//! G-code writer. It holds [`ExtrusionPath`]s (one polyline printed with a
//! single cross-section), multi-paths (consecutive paths printed without a
//! travel), loops and nested collections.
//!
//! Every path carries the flow it is printed with as `mm3_per_mm`, width and
//! height. Paths with fewer than two distinct points or with a non-positive
//! flow are never added to a collection.

use crate::flow::Flow;
use crate::geometry::{Point, Polygon, Polyline};
use crate::{CoordF, SCALING_FACTOR};

/// What an extrusion is printed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtrusionRole {
    /// Sparse support body, raft base.
    SupportMaterial,
    /// Dense interface touching the object, raft interface.
    SupportMaterialInterface,
    /// Support printed with a transition (tree trunk) flow.
    SupportTransition,
}

impl ExtrusionRole {
    pub fn is_interface(&self) -> bool {
        matches!(self, ExtrusionRole::SupportMaterialInterface)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExtrusionRole::SupportMaterial => "support material",
            ExtrusionRole::SupportMaterialInterface => "support interface",
            ExtrusionRole::SupportTransition => "support transition",
        }
    }
}

/// Cross-section of an extrusion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtrusionAttributes {
    /// mm³ of material per mm of travel.
    pub mm3_per_mm: CoordF,
    /// Width (mm).
    pub width: CoordF,
    /// Height (mm).
    pub height: CoordF,
}

impl ExtrusionAttributes {
    /// Attributes of `flow`. A flow whose cross-section collapsed gets a
    /// zero rate, which keeps its paths out of any collection.
    pub fn from_flow(flow: &Flow) -> Self {
        Self {
            mm3_per_mm: flow.mm3_per_mm().unwrap_or(0.0),
            width: flow.width(),
            height: flow.height(),
        }
    }
}

/// A polyline printed with one cross-section.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtrusionPath {
    pub polyline: Polyline,
    pub role: ExtrusionRole,
    pub mm3_per_mm: CoordF,
    pub width: CoordF,
    pub height: CoordF,
}

impl ExtrusionPath {
    pub fn new(polyline: Polyline, role: ExtrusionRole, attributes: ExtrusionAttributes) -> Self {
        Self {
            polyline,
            role,
            mm3_per_mm: attributes.mm3_per_mm,
            width: attributes.width,
            height: attributes.height,
        }
    }

    pub fn from_flow(polyline: Polyline, role: ExtrusionRole, flow: &Flow) -> Self {
        Self::new(polyline, role, ExtrusionAttributes::from_flow(flow))
    }

    #[inline]
    pub fn attributes(&self) -> ExtrusionAttributes {
        ExtrusionAttributes {
            mm3_per_mm: self.mm3_per_mm,
            width: self.width,
            height: self.height,
        }
    }

    #[inline]
    pub fn first_point(&self) -> Point {
        self.polyline.first_point()
    }

    #[inline]
    pub fn last_point(&self) -> Point {
        self.polyline.last_point()
    }

    /// Length in scaled units.
    #[inline]
    pub fn length(&self) -> CoordF {
        self.polyline.length()
    }

    /// Deposited volume in mm³.
    pub fn volume(&self) -> CoordF {
        self.length() / SCALING_FACTOR * self.mm3_per_mm
    }

    /// At least two distinct points and a positive flow.
    pub fn is_valid(&self) -> bool {
        self.polyline.is_valid() && self.mm3_per_mm > 0.0
    }

    pub fn reverse(&mut self) {
        self.polyline.reverse();
    }
}

/// Paths printed one after another without travel, each with its own
/// cross-section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtrusionMultiPath {
    pub paths: Vec<ExtrusionPath>,
}

impl ExtrusionMultiPath {
    pub fn new(paths: Vec<ExtrusionPath>) -> Self {
        Self { paths }
    }

    pub fn first_point(&self) -> Option<Point> {
        self.paths.first().map(ExtrusionPath::first_point)
    }

    pub fn last_point(&self) -> Option<Point> {
        self.paths.last().map(ExtrusionPath::last_point)
    }

    pub fn length(&self) -> CoordF {
        self.paths.iter().map(ExtrusionPath::length).sum()
    }
}

/// A closed loop, possibly made of several paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtrusionLoop {
    pub paths: Vec<ExtrusionPath>,
}

impl ExtrusionLoop {
    /// Single-path loop from a polygon, starting at its first point.
    pub fn from_polygon(polygon: &Polygon, role: ExtrusionRole, flow: &Flow) -> Self {
        Self {
            paths: vec![ExtrusionPath::from_flow(
                polygon.split_at_first_point(),
                role,
                flow,
            )],
        }
    }

    pub fn length(&self) -> CoordF {
        self.paths.iter().map(ExtrusionPath::length).sum()
    }
}

/// Any extrusion entity.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtrusionEntity {
    Path(ExtrusionPath),
    MultiPath(ExtrusionMultiPath),
    Loop(ExtrusionLoop),
    Collection(ExtrusionEntityCollection),
}

impl ExtrusionEntity {
    pub fn role(&self) -> Option<ExtrusionRole> {
        match self {
            ExtrusionEntity::Path(p) => Some(p.role),
            ExtrusionEntity::MultiPath(mp) => mp.paths.first().map(|p| p.role),
            ExtrusionEntity::Loop(l) => l.paths.first().map(|p| p.role),
            ExtrusionEntity::Collection(c) => c.entities.iter().find_map(ExtrusionEntity::role),
        }
    }

    /// Visit every path of this entity, depth first.
    pub fn visit_paths<'a>(&'a self, f: &mut dyn FnMut(&'a ExtrusionPath)) {
        match self {
            ExtrusionEntity::Path(p) => f(p),
            ExtrusionEntity::MultiPath(mp) => mp.paths.iter().for_each(|p| f(p)),
            ExtrusionEntity::Loop(l) => l.paths.iter().for_each(|p| f(p)),
            ExtrusionEntity::Collection(c) => c.entities.iter().for_each(|e| e.visit_paths(f)),
        }
    }
}

/// Ordered set of extrusion entities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtrusionEntityCollection {
    pub entities: Vec<ExtrusionEntity>,
    /// Keep the entities in the given order when printing.
    pub no_sort: bool,
}

impl ExtrusionEntityCollection {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }

    /// Add a path if it is printable.
    pub fn push_path(&mut self, path: ExtrusionPath) {
        if path.is_valid() {
            self.entities.push(ExtrusionEntity::Path(path));
        }
    }

    /// Add a multi-path, dropping invalid members. A single remaining
    /// member is added as a plain path.
    pub fn push_multi_path(&mut self, mut multi_path: ExtrusionMultiPath) {
        multi_path.paths.retain(ExtrusionPath::is_valid);
        match multi_path.paths.len() {
            0 => {}
            1 => {
                if let Some(path) = multi_path.paths.pop() {
                    self.entities.push(ExtrusionEntity::Path(path));
                }
            }
            _ => self.entities.push(ExtrusionEntity::MultiPath(multi_path)),
        }
    }

    pub fn push_loop(&mut self, mut extrusion_loop: ExtrusionLoop) {
        extrusion_loop.paths.retain(ExtrusionPath::is_valid);
        if !extrusion_loop.paths.is_empty() {
            self.entities.push(ExtrusionEntity::Loop(extrusion_loop));
        }
    }

    /// Add a nested collection unless it is empty.
    pub fn push_collection(&mut self, collection: ExtrusionEntityCollection) {
        if !collection.is_empty() {
            self.entities.push(ExtrusionEntity::Collection(collection));
        }
    }

    /// Add each polyline as a separate path with the same role and flow.
    pub fn append_paths(&mut self, polylines: Vec<Polyline>, role: ExtrusionRole, flow: &Flow) {
        let attributes = ExtrusionAttributes::from_flow(flow);
        for polyline in polylines {
            self.push_path(ExtrusionPath::new(polyline, role, attributes));
        }
    }

    /// Add each polygon as a closed loop with the same role and flow.
    pub fn append_loops(&mut self, polygons: &[Polygon], role: ExtrusionRole, flow: &Flow) {
        for polygon in polygons {
            self.push_loop(ExtrusionLoop::from_polygon(polygon, role, flow));
        }
    }

    /// Append all entities of `other`.
    pub fn extend(&mut self, other: ExtrusionEntityCollection) {
        self.entities.extend(other.entities);
    }

    /// All paths, depth first.
    pub fn paths(&self) -> Vec<&ExtrusionPath> {
        let mut out = Vec::new();
        for entity in &self.entities {
            entity.visit_paths(&mut |p| out.push(p));
        }
        out
    }

    /// Total deposited volume in mm³.
    pub fn total_volume(&self) -> CoordF {
        self.paths().iter().map(|p| p.volume()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow() -> Flow {
        Flow::new(0.4, 0.2, 0.4).unwrap()
    }

    fn line(x0: f64, x1: f64) -> Polyline {
        Polyline::from_points(vec![Point::new_scale(x0, 0.0), Point::new_scale(x1, 0.0)])
    }

    #[test]
    fn test_invalid_paths_are_dropped() {
        let mut coll = ExtrusionEntityCollection::new();
        coll.append_paths(
            vec![line(0.0, 10.0), line(5.0, 5.0), Polyline::new()],
            ExtrusionRole::SupportMaterial,
            &flow(),
        );
        assert_eq!(coll.len(), 1);
        let zero = ExtrusionAttributes {
            mm3_per_mm: 0.0,
            width: 0.4,
            height: 0.2,
        };
        coll.push_path(ExtrusionPath::new(line(0.0, 1.0), ExtrusionRole::SupportMaterial, zero));
        assert_eq!(coll.len(), 1);
    }

    #[test]
    fn test_volume() {
        let f = flow();
        let path = ExtrusionPath::from_flow(line(0.0, 10.0), ExtrusionRole::SupportMaterial, &f);
        assert!((path.volume() - 10.0 * f.mm3_per_mm().unwrap()).abs() < 1e-9);
    }

    #[test]
    fn test_multi_path_collapses_single_member() {
        let f = flow();
        let mut coll = ExtrusionEntityCollection::new();
        coll.push_multi_path(ExtrusionMultiPath::new(vec![
            ExtrusionPath::from_flow(line(0.0, 10.0), ExtrusionRole::SupportMaterial, &f),
            ExtrusionPath::from_flow(line(10.0, 10.0), ExtrusionRole::SupportMaterial, &f),
        ]));
        assert!(matches!(coll.entities[0], ExtrusionEntity::Path(_)));
    }

    #[test]
    fn test_nested_paths_visited() {
        let f = flow();
        let mut inner = ExtrusionEntityCollection::new();
        inner.append_loops(
            &[Polygon::square(Point::new(0, 0), 1_000_000)],
            ExtrusionRole::SupportMaterialInterface,
            &f,
        );
        let mut outer = ExtrusionEntityCollection::new();
        outer.append_paths(vec![line(0.0, 1.0)], ExtrusionRole::SupportMaterial, &f);
        outer.push_collection(inner);
        outer.push_collection(ExtrusionEntityCollection::new());
        assert_eq!(outer.len(), 2);
        assert_eq!(outer.paths().len(), 2);
        assert_eq!(
            outer.entities[1].role(),
            Some(ExtrusionRole::SupportMaterialInterface)
        );
    }
}
