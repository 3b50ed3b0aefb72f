//! Fill patterns for support regions.
//!
//! Support and raft regions are filled by one of four patterns:
//! - [`InfillPattern::Rectilinear`] - parallel lines, printed back and forth
//! - [`InfillPattern::Grid`] - two sets of parallel lines crossing at 90°
//! - [`InfillPattern::Concentric`] - inward offset loops
//! - [`InfillPattern::SupportBase`] - parallel lines linked into zig-zags
//!   where neighbouring lines end close to each other
//!
//! # Algorithm
//!
//! Line patterns rotate the region by `-angle`, lay vertical scan lines at
//! `spacing / density` aligned to a global grid (so lines stack between
//! layers), clip them against the region and rotate the result back.

mod concentric;
mod rectilinear;

pub use concentric::FillConcentric;
pub use rectilinear::{FillGrid, FillRectilinear, FillSupportBase};

use crate::geometry::{ExPolygon, Polylines};
use crate::CoordF;
use serde::{Deserialize, Serialize};

/// Fill pattern used for a support region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InfillPattern {
    #[default]
    Rectilinear,
    Grid,
    Concentric,
    SupportBase,
}

impl std::fmt::Display for InfillPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InfillPattern::Rectilinear => "rectilinear",
            InfillPattern::Grid => "grid",
            InfillPattern::Concentric => "concentric",
            InfillPattern::SupportBase => "support base",
        };
        write!(f, "{}", name)
    }
}

/// Per-call fill parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillParams {
    /// Fill density in (0, 1].
    pub density: CoordF,
    /// Pattern angle in radians.
    pub angle: CoordF,
    /// Extrusion spacing in mm; line distance is `spacing / density`.
    pub spacing: CoordF,
    /// Do not link neighbouring lines.
    pub dont_connect: bool,
}

impl FillParams {
    pub fn new(density: CoordF, angle: CoordF, spacing: CoordF) -> Self {
        Self {
            density,
            angle,
            spacing,
            dont_connect: false,
        }
    }

    /// Distance between neighbouring lines in mm, 0 when nothing is to be
    /// filled.
    pub fn line_spacing(&self) -> CoordF {
        if self.density <= 0.0 || self.spacing <= 0.0 {
            0.0
        } else {
            self.spacing / self.density.min(1.0)
        }
    }
}

/// A fill pattern generator.
pub trait Fill: Send + Sync {
    fn pattern(&self) -> InfillPattern;

    /// Centerlines filling `expolygon`. Closed loops are returned as
    /// polylines whose last point equals the first.
    fn fill_expolygon(&self, expolygon: &ExPolygon, params: &FillParams) -> Polylines;

    fn fill_expolygons(&self, expolygons: &[ExPolygon], params: &FillParams) -> Polylines {
        expolygons
            .iter()
            .flat_map(|e| self.fill_expolygon(e, params))
            .collect()
    }
}

/// Create the filler for a pattern.
pub fn new_from_type(pattern: InfillPattern) -> Box<dyn Fill> {
    match pattern {
        InfillPattern::Rectilinear => Box::new(FillRectilinear),
        InfillPattern::Grid => Box::new(FillGrid),
        InfillPattern::Concentric => Box::new(FillConcentric),
        InfillPattern::SupportBase => Box::new(FillSupportBase),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_spacing() {
        assert!((FillParams::new(0.5, 0.0, 0.4).line_spacing() - 0.8).abs() < 1e-12);
        assert!((FillParams::new(2.0, 0.0, 0.4).line_spacing() - 0.4).abs() < 1e-12);
        assert_eq!(FillParams::new(0.0, 0.0, 0.4).line_spacing(), 0.0);
    }

    #[test]
    fn test_new_from_type() {
        for pattern in [
            InfillPattern::Rectilinear,
            InfillPattern::Grid,
            InfillPattern::Concentric,
            InfillPattern::SupportBase,
        ] {
            assert_eq!(new_from_type(pattern).pattern(), pattern);
        }
    }
}
