//! Line based patterns: rectilinear, grid and the linked support base.

use super::{Fill, FillParams, InfillPattern};
use crate::clipper::{diff_pl, intersection_pl, offset_ex, OffsetJoinType};
use crate::geometry::{ExPolygon, Point, Polyline, Polylines};
use crate::{scale, Coord, CoordF};

/// Vertical scan lines through `expolygon` rotated by `-angle`, clipped to
/// it. One entry per column, pieces ordered bottom to top. Coordinates stay
/// in the rotated frame.
fn scan_columns(rotated: &ExPolygon, line_spacing: Coord) -> Vec<Polylines> {
    let bbox = rotated.bounding_box();
    if !bbox.is_defined() || line_spacing <= 0 {
        return Vec::new();
    }
    // Align to a global grid so that lines of stacked layers coincide.
    let mut x = bbox.min.x.div_euclid(line_spacing) * line_spacing + line_spacing / 2;
    let clip = std::slice::from_ref(rotated);
    let mut columns = Vec::new();
    while x <= bbox.max.x {
        if x >= bbox.min.x {
            let scan = Polyline::from_points(vec![
                Point::new(x, bbox.min.y - 1),
                Point::new(x, bbox.max.y + 1),
            ]);
            let pieces = intersection_pl(&[scan], clip);
            if !pieces.is_empty() {
                columns.push(pieces);
            }
        }
        x += line_spacing;
    }
    columns
}

fn rotated(expolygon: &ExPolygon, angle: CoordF) -> ExPolygon {
    let mut rotated = expolygon.clone();
    rotated.rotate(-angle);
    rotated
}

fn rotate_back(mut polylines: Polylines, angle: CoordF) -> Polylines {
    for polyline in &mut polylines {
        polyline.rotate(angle);
    }
    polylines
}

/// Columns flattened in boustrophedon order: every other column runs
/// top to bottom.
fn serpentine(columns: Vec<Polylines>) -> Polylines {
    let mut out = Vec::new();
    for (i, mut column) in columns.into_iter().enumerate() {
        if i % 2 == 1 {
            column.reverse();
            for piece in &mut column {
                piece.reverse();
            }
        }
        out.extend(column);
    }
    out
}

fn fill_lines(expolygon: &ExPolygon, params: &FillParams, angle: CoordF) -> Polylines {
    let line_spacing = scale(params.line_spacing());
    if line_spacing <= 0 {
        return Vec::new();
    }
    let region = rotated(expolygon, angle);
    rotate_back(serpentine(scan_columns(&region, line_spacing)), angle)
}

/// Parallel lines at `params.angle`.
pub struct FillRectilinear;

impl Fill for FillRectilinear {
    fn pattern(&self) -> InfillPattern {
        InfillPattern::Rectilinear
    }

    fn fill_expolygon(&self, expolygon: &ExPolygon, params: &FillParams) -> Polylines {
        fill_lines(expolygon, params, params.angle)
    }
}

/// Two line sets at `params.angle` and `params.angle + 90°`, each at half
/// the density.
pub struct FillGrid;

impl Fill for FillGrid {
    fn pattern(&self) -> InfillPattern {
        InfillPattern::Grid
    }

    fn fill_expolygon(&self, expolygon: &ExPolygon, params: &FillParams) -> Polylines {
        let half = FillParams {
            density: params.density * 0.5,
            ..*params
        };
        let mut out = fill_lines(expolygon, &half, params.angle);
        out.extend(fill_lines(
            expolygon,
            &half,
            params.angle + std::f64::consts::FRAC_PI_2,
        ));
        out
    }
}

/// Rectilinear lines linked end to end wherever the connecting segment stays
/// inside the region and is not longer than two line distances.
pub struct FillSupportBase;

impl Fill for FillSupportBase {
    fn pattern(&self) -> InfillPattern {
        InfillPattern::SupportBase
    }

    fn fill_expolygon(&self, expolygon: &ExPolygon, params: &FillParams) -> Polylines {
        let line_spacing = scale(params.line_spacing());
        if line_spacing <= 0 {
            return Vec::new();
        }
        let region = rotated(expolygon, params.angle);
        let lines = serpentine(scan_columns(&region, line_spacing));
        if params.dont_connect {
            return rotate_back(lines, params.angle);
        }

        // Connectors run along the boundary; a small margin keeps them from
        // being rejected for touching it.
        let margin = offset_ex(std::slice::from_ref(&region), 0.01, OffsetJoinType::Miter);
        let max_link = 2.0 * line_spacing as CoordF;
        let mut out: Polylines = Vec::new();
        for line in lines {
            let linked = match out.last_mut() {
                Some(chain) => {
                    let connector =
                        Polyline::from_points(vec![chain.last_point(), line.first_point()]);
                    if connector.length() <= max_link && diff_pl(&[connector], &margin).is_empty()
                    {
                        chain.append(&line);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            };
            if !linked {
                out.push(line);
            }
        }
        rotate_back(out, params.angle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::total_length;

    fn square(size: f64) -> ExPolygon {
        ExPolygon::rectangle(Point::new_scale(0.0, 0.0), Point::new_scale(size, size))
    }

    #[test]
    fn test_rectilinear_line_count() {
        let params = FillParams::new(1.0, 0.0, 1.0);
        let lines = FillRectilinear.fill_expolygon(&square(10.0), &params);
        assert_eq!(lines.len(), 10);
        // Every line spans the full height.
        let total = total_length(&lines);
        assert!((total - scale(100.0) as f64).abs() < 100.0);
    }

    #[test]
    fn test_rectilinear_alternates_direction() {
        let params = FillParams::new(1.0, 0.0, 1.0);
        let lines = FillRectilinear.fill_expolygon(&square(10.0), &params);
        assert!(lines[0].first_point().y < lines[0].last_point().y);
        assert!(lines[1].first_point().y > lines[1].last_point().y);
    }

    #[test]
    fn test_grid_has_both_directions() {
        let params = FillParams::new(1.0, 0.0, 1.0);
        let lines = FillGrid.fill_expolygon(&square(10.0), &params);
        let vertical = lines
            .iter()
            .filter(|l| l.first_point().x == l.last_point().x)
            .count();
        assert!(vertical > 0 && vertical < lines.len());
    }

    #[test]
    fn test_support_base_links_lines() {
        let params = FillParams::new(1.0, 0.0, 1.0);
        let linked = FillSupportBase.fill_expolygon(&square(10.0), &params);
        assert_eq!(linked.len(), 1);
        let separate = FillSupportBase.fill_expolygon(
            &square(10.0),
            &FillParams {
                dont_connect: true,
                ..params
            },
        );
        assert_eq!(separate.len(), 10);
    }

    #[test]
    fn test_rotated_fill_stays_inside() {
        let params = FillParams::new(0.5, 0.7, 0.4);
        let region = square(10.0);
        let lines = FillRectilinear.fill_expolygon(&region, &params);
        assert!(!lines.is_empty());
        let grown = offset_ex(&[region], 0.01, OffsetJoinType::Miter);
        assert!(diff_pl(&lines, &grown).is_empty());
    }
}
