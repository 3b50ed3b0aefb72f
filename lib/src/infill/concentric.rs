//! Concentric loops.

use super::{Fill, FillParams, InfillPattern};
use crate::clipper::{offset2_ex, OffsetJoinType};
use crate::geometry::{ExPolygon, Polygon, Polylines};

/// Loops following the region boundary, each one `spacing / density` inside
/// the previous. The outermost loop is the boundary itself.
pub struct FillConcentric;

impl Fill for FillConcentric {
    fn pattern(&self) -> InfillPattern {
        InfillPattern::Concentric
    }

    fn fill_expolygon(&self, expolygon: &ExPolygon, params: &FillParams) -> Polylines {
        let distance = params.line_spacing();
        if distance <= 0.0 {
            return Vec::new();
        }
        let min_spacing = params.spacing;
        let mut loops: Vec<Polygon> = expolygon.to_polygons();
        let mut last = vec![expolygon.clone()];
        while !last.is_empty() {
            last = offset2_ex(
                &last,
                -(distance + 0.5 * min_spacing),
                0.5 * min_spacing,
                OffsetJoinType::Miter,
            );
            loops.extend(last.iter().flat_map(ExPolygon::to_polygons));
        }
        loops
            .iter()
            .filter(|p| p.len() >= 3)
            .map(Polygon::split_at_first_point)
            .collect()
    }
}
