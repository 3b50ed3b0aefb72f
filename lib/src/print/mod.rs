//! Print object and its registered support layers.
//!
//! - [`PrintObject`] - the sliced object the supports are generated for
//! - [`SupportLayer`] - one physical support layer with its toolpaths
//! - [`BrimConfig`] - brim settings the raft has to keep clear of

use crate::extrusion::ExtrusionEntityCollection;
use crate::geometry::ExPolygons;
use crate::slice::{Layer, SlicingParams};
use crate::CoordF;
use serde::{Deserialize, Serialize};

/// Where a brim is printed around the first layer islands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BrimType {
    #[default]
    NoBrim,
    OuterOnly,
    InnerOnly,
    OuterAndInner,
}

/// Brim settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrimConfig {
    pub brim_type: BrimType,
    /// Brim width (mm).
    pub brim_width: CoordF,
    /// Gap between the brim and the object (mm).
    pub brim_object_gap: CoordF,
}

impl Default for BrimConfig {
    fn default() -> Self {
        Self {
            brim_type: BrimType::NoBrim,
            brim_width: 5.0,
            brim_object_gap: 0.1,
        }
    }
}

impl BrimConfig {
    pub fn new(brim_type: BrimType, brim_width: CoordF, brim_object_gap: CoordF) -> Self {
        Self {
            brim_type,
            brim_width,
            brim_object_gap,
        }
    }

    pub fn has_brim(&self) -> bool {
        self.brim_type != BrimType::NoBrim && self.brim_width > 0.0
    }

    pub fn outer(&self) -> bool {
        matches!(self.brim_type, BrimType::OuterOnly | BrimType::OuterAndInner)
    }

    pub fn inner(&self) -> bool {
        matches!(self.brim_type, BrimType::InnerOnly | BrimType::OuterAndInner)
    }
}

/// A physical support layer registered on the object.
#[derive(Debug, Clone, Default)]
pub struct SupportLayer {
    /// Index in the object's support layer list.
    pub id: usize,
    /// Orientation id, alternates the fill angle between stacked layers.
    pub interface_id: usize,
    pub print_z: CoordF,
    pub height: CoordF,
    pub bottom_z: CoordF,
    /// Toolpaths of this layer.
    pub support_fills: ExtrusionEntityCollection,
    /// Union of the regions printed at this layer. Travel inside an island
    /// needs no retraction.
    pub support_islands: ExPolygons,
}

impl SupportLayer {
    pub fn new(id: usize, interface_id: usize, print_z: CoordF, height: CoordF, bottom_z: CoordF) -> Self {
        Self {
            id,
            interface_id,
            print_z,
            height,
            bottom_z,
            support_fills: ExtrusionEntityCollection::new(),
            support_islands: ExPolygons::new(),
        }
    }
}

/// A sliced object.
#[derive(Debug, Default)]
pub struct PrintObject {
    layers: Vec<Layer>,
    support_layers: Vec<SupportLayer>,
    slicing_params: SlicingParams,
    brim: BrimConfig,
    name: String,
}

impl PrintObject {
    pub fn new(layers: Vec<Layer>, slicing_params: SlicingParams) -> Self {
        Self {
            layers,
            slicing_params,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_brim(mut self, brim: BrimConfig) -> Self {
        self.brim = brim;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn slicing_params(&self) -> &SlicingParams {
        &self.slicing_params
    }

    pub fn brim(&self) -> &BrimConfig {
        &self.brim
    }

    /// A brim is printed unless the object sits on a multi-layer raft. A
    /// single raft layer is printed like a plain first layer.
    pub fn has_brim(&self) -> bool {
        self.brim.has_brim() && self.slicing_params.raft_layers() <= 1
    }

    /// Island outlines of the first layer, empty for an object without
    /// layers.
    pub fn first_layer_islands(&self) -> ExPolygons {
        self.layers
            .first()
            .map(|l| l.lslices.clone())
            .unwrap_or_default()
    }

    /// Register a support layer and return its index.
    pub fn add_support_layer(
        &mut self,
        interface_id: usize,
        print_z: CoordF,
        height: CoordF,
        bottom_z: CoordF,
    ) -> usize {
        let id = self.support_layers.len();
        self.support_layers
            .push(SupportLayer::new(id, interface_id, print_z, height, bottom_z));
        id
    }

    pub fn support_layers(&self) -> &[SupportLayer] {
        &self.support_layers
    }

    pub fn support_layers_mut(&mut self) -> &mut [SupportLayer] {
        &mut self.support_layers
    }

    pub fn clear_support_layers(&mut self) {
        self.support_layers.clear();
    }

    pub fn take_support_layers(&mut self) -> Vec<SupportLayer> {
        std::mem::take(&mut self.support_layers)
    }
}
