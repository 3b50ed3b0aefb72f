//! Object-side inputs of the support generator: sliced layers, their
//! regions and surfaces, and the slicing parameters.

mod layer;
mod slicing_params;
mod surface;

pub use layer::{Layer, LayerRegion};
pub use slicing_params::SlicingParams;
pub use surface::{Surface, SurfaceType, Surfaces};
