//! # Flow Calculation
//!
//! Converts extrusion dimensions (width, height) into volumetric flow
//! (mm³ per mm of travel) and centerline spacing.
//!
//! ## Rounded Rectangle Cross-Section
//!
//! A normal extrusion is modelled as a rectangle with semicircular ends:
//!
//! ```text
//! area = height × (width - height × (1 - π/4))
//! ```
//!
//! A bridging extrusion hangs in free air and forms a round thread whose
//! diameter equals its width.

use std::f64::consts::PI;
use thiserror::Error;

use crate::{scale, Coord};

/// Extra spacing between bridge threads (mm).
pub const BRIDGE_EXTRA_SPACING: f64 = 0.05;

/// Flow calculation errors.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The width is too small for the height.
    #[error("Flow spacing calculation produced negative spacing. Is extrusion width too small?")]
    NegativeSpacing,

    /// The cross-section collapsed to zero or below.
    #[error("Flow mm3_per_mm() produced negative flow. Is extrusion width too small?")]
    NegativeFlow,

    #[error("Invalid flow argument: {0}")]
    InvalidArgument(String),
}

/// Result type for flow calculations.
pub type FlowResult<T> = Result<T, FlowError>;

/// Flow parameters for one kind of extrusion. All dimensions are in mm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Flow {
    width: f64,
    height: f64,
    spacing: f64,
    nozzle_diameter: f64,
    bridge: bool,
}

impl Flow {
    /// Non-bridging flow. Spacing follows the rounded rectangle model.
    pub fn new(width: f64, height: f64, nozzle_diameter: f64) -> FlowResult<Self> {
        if width <= 0.0 || height <= 0.0 {
            return Err(FlowError::InvalidArgument(format!(
                "width {:.4} and height {:.4} must be positive",
                width, height
            )));
        }
        let spacing = Self::rounded_rectangle_extrusion_spacing(width, height)?;
        Ok(Self {
            width,
            height,
            spacing,
            nozzle_diameter,
            bridge: false,
        })
    }

    /// Bridging flow: round thread of the given diameter.
    pub fn bridging_flow(diameter: f64, nozzle_diameter: f64) -> Self {
        Self {
            width: diameter,
            height: diameter,
            spacing: Self::bridge_extrusion_spacing(diameter),
            nozzle_diameter,
            bridge: true,
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.width
    }

    #[inline]
    pub fn scaled_width(&self) -> Coord {
        scale(self.width)
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.height
    }

    #[inline]
    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    #[inline]
    pub fn scaled_spacing(&self) -> Coord {
        scale(self.spacing)
    }

    #[inline]
    pub fn nozzle_diameter(&self) -> f64 {
        self.nozzle_diameter
    }

    #[inline]
    pub fn is_bridge(&self) -> bool {
        self.bridge
    }

    /// Cross-sectional area in mm², equal to mm³ of material per mm of travel.
    pub fn mm3_per_mm(&self) -> FlowResult<f64> {
        let res = if self.bridge {
            self.width * self.width * 0.25 * PI
        } else {
            self.height * (self.width - self.height * (1.0 - 0.25 * PI))
        };
        if res <= 0.0 {
            Err(FlowError::NegativeFlow)
        } else {
            Ok(res)
        }
    }

    /// Same flow printed at a different layer height.
    pub fn with_height(&self, height: f64) -> FlowResult<Self> {
        if self.bridge {
            return Err(FlowError::InvalidArgument(
                "cannot change the height of a bridging flow".into(),
            ));
        }
        Self::new(self.width, height, self.nozzle_diameter)
    }

    /// Scale the cross-section by `ratio` while keeping the spacing. The
    /// width absorbs the change; if it would drop below the height the
    /// extrusion becomes a round thread of equal area.
    pub fn with_flow_ratio(&self, ratio: f64) -> FlowResult<Self> {
        if self.bridge {
            let diameter = self.width * ratio.sqrt();
            return Ok(Self {
                width: diameter,
                height: diameter,
                ..*self
            });
        }
        let area = self.mm3_per_mm()?;
        let area_new = area * ratio;
        let width_new = self.width - (area - area_new) / self.height;
        if width_new > self.height {
            Ok(Self {
                width: width_new,
                ..*self
            })
        } else {
            let diameter = (area_new / PI).sqrt() * 2.0;
            Ok(Self {
                width: diameter,
                height: diameter,
                ..*self
            })
        }
    }

    /// `width - height × (1 - π/4)`.
    pub fn rounded_rectangle_extrusion_spacing(width: f64, height: f64) -> FlowResult<f64> {
        let spacing = width - height * (1.0 - 0.25 * PI);
        if spacing <= 0.0 {
            Err(FlowError::NegativeSpacing)
        } else {
            Ok(spacing)
        }
    }

    /// Bridge threads are round, so spacing is the diameter plus a small gap.
    #[inline]
    pub fn bridge_extrusion_spacing(diameter: f64) -> f64 {
        diameter + BRIDGE_EXTRA_SPACING
    }
}

/// Width configured for support (0 = fall back to the default line width,
/// and to the nozzle diameter if that is 0 too).
fn support_width(support_line_width: f64, default_line_width: f64, nozzle_diameter: f64) -> f64 {
    if support_line_width > 0.0 {
        support_line_width
    } else if default_line_width > 0.0 {
        default_line_width
    } else {
        nozzle_diameter
    }
}

/// Flow for the support body.
pub fn support_material_flow(
    support_line_width: f64,
    default_line_width: f64,
    nozzle_diameter: f64,
    layer_height: f64,
) -> FlowResult<Flow> {
    Flow::new(
        support_width(support_line_width, default_line_width, nozzle_diameter),
        layer_height,
        nozzle_diameter,
    )
}

/// Flow for dense support interfaces. Uses the same line width as the body.
pub fn support_material_interface_flow(
    support_line_width: f64,
    default_line_width: f64,
    nozzle_diameter: f64,
    layer_height: f64,
) -> FlowResult<Flow> {
    support_material_flow(support_line_width, default_line_width, nozzle_diameter, layer_height)
}

/// Flow for support printed on the first layer.
pub fn support_material_1st_layer_flow(
    initial_layer_line_width: f64,
    support_line_width: f64,
    default_line_width: f64,
    nozzle_diameter: f64,
    initial_layer_height: f64,
) -> FlowResult<Flow> {
    let width = if initial_layer_line_width > 0.0 {
        initial_layer_line_width
    } else {
        support_width(support_line_width, default_line_width, nozzle_diameter)
    };
    Flow::new(width, initial_layer_height, nozzle_diameter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounded_rectangle_area() {
        let flow = Flow::new(0.45, 0.2, 0.4).unwrap();
        let expected = 0.2 * (0.45 - 0.2 * (1.0 - 0.25 * PI));
        assert!((flow.mm3_per_mm().unwrap() - expected).abs() < 1e-12);
        assert!((flow.spacing() - (0.45 - 0.2 * (1.0 - 0.25 * PI))).abs() < 1e-12);
        assert!(!flow.is_bridge());
    }

    #[test]
    fn test_bridging_flow() {
        let flow = Flow::bridging_flow(0.4, 0.4);
        assert!(flow.is_bridge());
        assert!((flow.height() - 0.4).abs() < 1e-12);
        assert!((flow.spacing() - 0.45).abs() < 1e-12);
        assert!((flow.mm3_per_mm().unwrap() - 0.04 * PI).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_dimensions() {
        assert!(Flow::new(0.0, 0.2, 0.4).is_err());
        assert!(matches!(
            Flow::new(0.1, 0.6, 0.4),
            Err(FlowError::NegativeSpacing)
        ));
    }

    #[test]
    fn test_with_height_changes_volume() {
        let flow = Flow::new(0.4, 0.2, 0.4).unwrap();
        let thin = flow.with_height(0.1).unwrap();
        assert!(thin.mm3_per_mm().unwrap() < flow.mm3_per_mm().unwrap());
        assert!((thin.width() - 0.4).abs() < 1e-12);
        assert!(Flow::bridging_flow(0.4, 0.4).with_height(0.2).is_err());
    }

    #[test]
    fn test_with_flow_ratio_keeps_spacing() {
        let flow = Flow::new(0.45, 0.2, 0.4).unwrap();
        let reduced = flow.with_flow_ratio(0.9).unwrap();
        assert!((reduced.spacing() - flow.spacing()).abs() < 1e-12);
        assert!(
            (reduced.mm3_per_mm().unwrap() - 0.9 * flow.mm3_per_mm().unwrap()).abs() < 1e-9
        );
    }

    #[test]
    fn test_support_flow_width_fallbacks() {
        let f = support_material_flow(0.0, 0.0, 0.4, 0.2).unwrap();
        assert!((f.width() - 0.4).abs() < 1e-12);
        let f = support_material_flow(0.0, 0.42, 0.4, 0.2).unwrap();
        assert!((f.width() - 0.42).abs() < 1e-12);
        let f = support_material_1st_layer_flow(0.5, 0.42, 0.42, 0.4, 0.3).unwrap();
        assert!((f.width() - 0.5).abs() < 1e-12);
        assert!((f.height() - 0.3).abs() < 1e-12);
    }
}
