//! Object layers as seen by the support generator.
//!
//! A [`Layer`] is one horizontal slice of the printed object: its Z range,
//! the merged island outlines (`lslices`) and the per-region data the
//! contact refiner needs (perimeter centerlines, fill surfaces and the
//! edges of bridges left unsupported).

use super::Surface;
use crate::clipper::union_ex;
use crate::flow::Flow;
use crate::geometry::{get_extents, BoundingBox, ExPolygon, ExPolygons, Polygons, Polylines};
use crate::CoordF;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single sliced layer of an object. Z values are in mm.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Layer {
    id: usize,
    print_z: CoordF,
    height: CoordF,
    regions: Vec<LayerRegion>,
    /// Union of all region slices, one ExPolygon per island.
    pub lslices: ExPolygons,
    lslices_bboxes: Vec<BoundingBox>,
}

impl Layer {
    pub fn new(id: usize, print_z: CoordF, height: CoordF) -> Self {
        Self {
            id,
            print_z,
            height,
            ..Default::default()
        }
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn print_z(&self) -> CoordF {
        self.print_z
    }

    #[inline]
    pub fn height(&self) -> CoordF {
        self.height
    }

    #[inline]
    pub fn bottom_z(&self) -> CoordF {
        self.print_z - self.height
    }

    #[inline]
    pub fn regions(&self) -> &[LayerRegion] {
        &self.regions
    }

    /// Add a region and refresh the island outlines.
    pub fn add_region(&mut self, region: LayerRegion) {
        self.regions.push(region);
        self.make_slices();
    }

    /// Recompute `lslices` from the region slices.
    pub fn make_slices(&mut self) {
        let all: ExPolygons = self
            .regions
            .iter()
            .flat_map(|r| r.slices.iter().cloned())
            .collect();
        self.lslices = union_ex(&all);
        self.lslices_bboxes = self.lslices.iter().map(ExPolygon::bounding_box).collect();
    }

    /// Island outlines with their bounding boxes.
    pub fn islands(&self) -> impl Iterator<Item = (&ExPolygon, &BoundingBox)> {
        self.lslices.iter().zip(self.lslices_bboxes.iter())
    }

    pub fn bounding_box(&self) -> BoundingBox {
        get_extents(&self.lslices)
    }

    pub fn is_empty(&self) -> bool {
        self.lslices.is_empty()
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Layer(id={}, z={:.3}mm, height={:.3}mm, {} regions, {} islands)",
            self.id,
            self.print_z,
            self.height,
            self.regions.len(),
            self.lslices.len()
        )
    }
}

/// One print region of a layer.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct LayerRegion {
    /// Sliced outlines of this region.
    pub slices: ExPolygons,

    /// Classified fill surfaces.
    pub fill_surfaces: Vec<Surface>,

    /// Perimeter centerlines as closed loops.
    pub perimeters: Polygons,

    /// Edges of bridges that are not anchored on the layer below.
    pub unsupported_bridge_edges: Polylines,

    /// Nozzle diameter of the perimeter extruder (mm).
    pub nozzle_diameter: CoordF,

    /// Width of the external perimeter (mm), 0 = nozzle diameter.
    pub external_perimeter_width: CoordF,

    pub region_id: usize,
}

impl LayerRegion {
    pub fn new(nozzle_diameter: CoordF) -> Self {
        Self {
            nozzle_diameter,
            ..Default::default()
        }
    }

    pub fn with_slices(slices: ExPolygons, nozzle_diameter: CoordF) -> Self {
        Self {
            slices,
            nozzle_diameter,
            ..Default::default()
        }
    }

    /// Flow used to print bridging perimeters: a round thread as thick as
    /// the nozzle.
    pub fn bridging_flow(&self) -> Flow {
        Flow::bridging_flow(self.nozzle_diameter, self.nozzle_diameter)
    }

    /// External perimeter width, falling back to the nozzle diameter.
    pub fn external_perimeter_width(&self) -> CoordF {
        if self.external_perimeter_width > 0.0 {
            self.external_perimeter_width
        } else {
            self.nozzle_diameter
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn area(&self) -> CoordF {
        self.slices.iter().map(ExPolygon::area).sum()
    }
}

impl fmt::Debug for LayerRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LayerRegion(region_id={}, {} slices, {} perimeters, {} surfaces)",
            self.region_id,
            self.slices.len(),
            self.perimeters.len(),
            self.fill_surfaces.len()
        )
    }
}
