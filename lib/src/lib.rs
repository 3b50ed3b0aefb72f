//! # Slicer Support
//!
//! Support structure generation for a fused-deposition slicer.
//!
//! This library turns already-detected support contact regions into a
//! printable support stack:
//! - Bridge-aware refinement of contact regions
//! - Dense interface and base-interface layer synthesis
//! - Raft generation beneath the object
//! - Assembly of all support layers into one Z-sorted stack
//! - Toolpath synthesis (fills, tree perimeters with anchors, loop
//!   interfaces, cross-layer extrusion height modulation)
//!
//! ## Example
//!
//! ```rust,ignore
//! use slicer_support::{SupportConfig, SupportGenerationInput, SupportGenerator, SlicingParams};
//!
//! let generator = SupportGenerator::new(SupportConfig::default(), SlicingParams::default())?;
//! let input = SupportGenerationInput {
//!     top_contacts,
//!     intermediate_layers,
//!     ..SupportGenerationInput::new(storage)
//! };
//! generator.generate(&mut object, input)?;
//! for layer in object.support_layers() {
//!     println!("{} entities at z={:.2}", layer.support_fills.len(), layer.print_z);
//! }
//! ```

pub mod clipper;
pub mod edge_grid;
pub mod extrusion;
pub mod flow;
pub mod geometry;
pub mod infill;
pub mod print;
pub mod slice;
pub mod support;

pub use extrusion::{
    ExtrusionEntity, ExtrusionEntityCollection, ExtrusionLoop, ExtrusionMultiPath, ExtrusionPath,
    ExtrusionRole,
};
pub use flow::{
    support_material_1st_layer_flow, support_material_flow, support_material_interface_flow,
    Flow, FlowError, FlowResult, BRIDGE_EXTRA_SPACING,
};
pub use geometry::{ExPolygon, ExPolygons, Point, Polygon, Polygons, Polyline, Polylines};
pub use print::{BrimConfig, PrintObject, SupportLayer};
pub use slice::{Layer, LayerRegion, SlicingParams, Surface, SurfaceType};
pub use support::{
    LayerHandle, LayerList, LayerStorage, SupportBasePattern, SupportConfig,
    SupportGenerationInput, SupportGenerationResult, SupportGenerator, SupportGeneratorLayer,
    SupportInterfacePattern, SupportLayerLists, SupportLayerType, SupportParameters, SupportStyle,
};

/// Scaled coordinate type (integer, 1 unit = 1 nanometer at SCALING_FACTOR = 1e6).
pub type Coord = i64;

/// Unscaled coordinate type (floating point, in millimeters).
pub type CoordF = f64;

/// Scaling factor: 1mm = 1,000,000 units.
pub const SCALING_FACTOR: f64 = 1_000_000.0;

/// Tolerance used for all Z comparisons between support layers (mm).
pub const EPSILON: f64 = 1e-4;

/// Smallest meaningful distance in scaled units.
pub const SCALED_EPSILON: Coord = 100;

/// Convert from mm to scaled coordinates.
#[inline]
pub fn scale(v: CoordF) -> Coord {
    (v * SCALING_FACTOR).round() as Coord
}

/// Convert from scaled coordinates to mm.
#[inline]
pub fn unscale(v: Coord) -> CoordF {
    v as CoordF / SCALING_FACTOR
}

/// Scale a floating-point value without rounding to an integer.
#[inline]
pub fn scaled(v: CoordF) -> CoordF {
    v * SCALING_FACTOR
}

/// Unscale a floating-point value that is already in scaled units.
#[inline]
pub fn unscaled(v: CoordF) -> CoordF {
    v / SCALING_FACTOR
}

/// Result type for fallible library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Library errors.
///
/// The geometric pipeline itself never fails; errors only arise while
/// validating configuration and building flows.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error(transparent)]
    Flow(#[from] FlowError),
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
