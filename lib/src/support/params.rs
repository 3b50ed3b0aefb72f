//! Derived support parameters.
//!
//! [`SupportParameters`] resolves a [`SupportConfig`] against the slicing
//! parameters once per generation pass: flows for every kind of support
//! layer, fill densities and patterns, fill angles and interface layer
//! counts.

use super::{SupportBasePattern, SupportConfig, SupportInterfacePattern, SupportStyle};
use crate::flow::{
    support_material_1st_layer_flow, support_material_flow, support_material_interface_flow, Flow,
};
use crate::infill::InfillPattern;
use crate::slice::SlicingParams;
use crate::{scaled, CoordF, Result};
use std::f64::consts::{FRAC_PI_4, PI};

/// Support settings resolved for one object.
#[derive(Debug, Clone)]
pub struct SupportParameters {
    pub support_style: SupportStyle,

    pub first_layer_flow: Flow,
    pub support_material_flow: Flow,
    pub support_material_interface_flow: Flow,
    /// Flow of the first interface layer printed over the object, possibly
    /// a bridging flow.
    pub support_material_bottom_interface_flow: Flow,
    pub raft_interface_flow: Flow,

    /// Support and interfaces are printed by the same extruder, so their
    /// regions can be merged.
    pub can_merge_support_regions: bool,
    /// Thinnest support layer (mm).
    pub support_layer_height_min: CoordF,
    /// Closing distance used when merging projected contacts (mm), `None`
    /// derives it from the interface spacing.
    pub closing_radius: Option<CoordF>,

    /// Horizontal gap between support and object (mm). Applied upstream
    /// when the contact regions are detected; carried here for callers.
    pub gap_xy: CoordF,
    /// Horizontal gap between support and object on the first layer (mm).
    pub gap_xy_first_layer: CoordF,

    pub num_top_interface_layers: usize,
    pub num_bottom_interface_layers: usize,
    pub num_top_base_interface_layers: usize,
    pub num_bottom_base_interface_layers: usize,

    /// Extrusion spacing plus the gap between interface lines (mm).
    pub interface_spacing: CoordF,
    pub interface_density: CoordF,
    /// Extrusion spacing plus the gap between base lines (mm).
    pub support_spacing: CoordF,
    pub support_density: CoordF,
    pub raft_interface_density: CoordF,
    pub raft_first_layer_density: CoordF,
    /// Growth of the first raft layer (mm).
    pub raft_first_layer_expansion: CoordF,

    pub base_fill_pattern: InfillPattern,
    pub interface_fill_pattern: InfillPattern,
    pub raft_interface_fill_pattern: InfillPattern,
    /// Pattern of the contact layers touching the object.
    pub contact_fill_pattern: InfillPattern,
    /// Interface pattern as configured, before density resolves it.
    pub interface_pattern: SupportInterfacePattern,
    /// Base layers alternate between two angles.
    pub base_angle_alternates: bool,
    /// Contact layers are wrapped by loops around the overhang.
    pub loop_interface: bool,
    /// Number of loops of a looped contact layer.
    pub num_contact_loops: usize,
    /// Base regions are wrapped by a perimeter.
    pub with_sheath: bool,
    pub soluble_interface: bool,

    /// Angles in radians.
    pub base_angle: CoordF,
    pub interface_angle: CoordF,
    pub raft_angle_1st_layer: CoordF,
    pub raft_angle_base: CoordF,
    pub raft_angle_interface: CoordF,

    /// Tree regions larger than this (scaled units squared) get a second
    /// wall. 0 disables it.
    pub tree_branch_diameter_double_wall_area_scaled: CoordF,
}

impl SupportParameters {
    pub fn new(config: &SupportConfig, slicing: &SlicingParams) -> Result<Self> {
        let nozzle = config.nozzle_diameter;
        let first_layer_flow = support_material_1st_layer_flow(
            config.initial_layer_line_width,
            config.support_line_width,
            config.line_width,
            nozzle,
            slicing.first_print_layer_height,
        )?;
        let support_material_flow = support_material_flow(
            config.support_line_width,
            config.line_width,
            nozzle,
            slicing.layer_height,
        )?;

        let num_top_interface_layers = config.top_interface_layers;
        let num_bottom_interface_layers = config
            .bottom_interface_layers
            .unwrap_or(num_top_interface_layers);
        let has_interfaces = num_top_interface_layers > 0 || num_bottom_interface_layers > 0;

        let support_material_interface_flow = if has_interfaces {
            support_material_interface_flow(
                config.support_line_width,
                config.line_width,
                nozzle,
                slicing.layer_height,
            )?
        } else {
            support_material_flow
        };

        let support_material_bottom_interface_flow =
            if slicing.soluble_interface || !config.thick_bridges {
                support_material_interface_flow.with_flow_ratio(config.bridge_flow_ratio)?
            } else {
                Flow::bridging_flow(config.bridge_flow_ratio.sqrt() * nozzle, nozzle)
            };

        let raft_interface_height = if slicing.interface_raft_layer_height > 0.0 {
            slicing.interface_raft_layer_height
        } else {
            slicing.layer_height
        };
        let raft_interface_flow = support_material_interface_flow_at(config, raft_interface_height)?;

        let (num_top_base_interface_layers, num_bottom_base_interface_layers) =
            if slicing.soluble_interface {
                // Soluble interfaces get a sandwich of non-soluble base
                // interfaces between them and the body.
                (
                    (num_top_interface_layers / 2).min(2),
                    (num_bottom_interface_layers / 2).min(2),
                )
            } else {
                (
                    config.top_base_interface_layers.min(num_top_interface_layers),
                    config.bottom_base_interface_layers.min(num_bottom_interface_layers),
                )
            };

        let support_spacing = config.base_pattern_spacing + support_material_flow.spacing();
        let support_density = (support_material_flow.spacing() / support_spacing).min(1.0);
        let (interface_spacing, interface_density) = if num_top_interface_layers == 0
            && num_bottom_interface_layers == 0
        {
            (support_spacing, support_density)
        } else {
            let spacing = config.interface_spacing + support_material_interface_flow.spacing();
            (spacing, (support_material_interface_flow.spacing() / spacing).min(1.0))
        };
        let raft_interface_density = (raft_interface_flow.spacing()
            / (config.interface_spacing + raft_interface_flow.spacing()))
        .min(1.0);

        let with_sheath = config.with_sheath;
        let base_fill_pattern = if support_density > 0.95 || with_sheath {
            InfillPattern::Rectilinear
        } else {
            InfillPattern::SupportBase
        };
        let interface_fill_pattern = if interface_density > 0.95 {
            InfillPattern::Rectilinear
        } else {
            InfillPattern::SupportBase
        };
        let raft_interface_fill_pattern = if raft_interface_density > 0.95 {
            InfillPattern::Rectilinear
        } else {
            InfillPattern::SupportBase
        };
        let contact_fill_pattern = match config.interface_pattern {
            SupportInterfacePattern::Auto if slicing.soluble_interface => InfillPattern::Concentric,
            SupportInterfacePattern::Concentric => InfillPattern::Concentric,
            _ => interface_fill_pattern,
        };

        let base_angle = config.support_angle.to_radians();
        let interface_angle = (config.support_angle + 90.0).to_radians();
        let (raft_angle_1st_layer, raft_angle_base, raft_angle_interface) =
            if slicing.base_raft_layers > 1 {
                // Keep the first layer orientation of a thick raft base.
                (interface_angle, base_angle, interface_angle)
            } else if slicing.base_raft_layers == 1 || slicing.interface_raft_layers > 1 {
                let first = if config.enable_support {
                    base_angle + 0.785_398_163_397
                } else {
                    base_angle
                };
                (first, base_angle, interface_angle)
            } else {
                (base_angle, base_angle, interface_angle)
            };

        let double_wall = config.tree_branch_diameter_double_wall;
        let tree_branch_diameter_double_wall_area_scaled = if double_wall > 0.0 {
            0.25 * scaled(double_wall).powi(2) * PI
        } else {
            0.0
        };

        Ok(Self {
            support_style: config.style,
            first_layer_flow,
            support_material_flow,
            support_material_interface_flow,
            support_material_bottom_interface_flow,
            raft_interface_flow,
            can_merge_support_regions: config.support_extruder == config.interface_extruder
                || config.support_extruder == 0
                || config.interface_extruder == 0,
            support_layer_height_min: slicing.min_layer_height.max(0.01),
            closing_radius: config.closing_radius,
            gap_xy: config.gap_xy,
            gap_xy_first_layer: config.gap_xy_first_layer,
            num_top_interface_layers,
            num_bottom_interface_layers,
            num_top_base_interface_layers,
            num_bottom_base_interface_layers,
            interface_spacing,
            interface_density,
            support_spacing,
            support_density,
            raft_interface_density,
            raft_first_layer_density: config.raft_first_layer_density,
            raft_first_layer_expansion: config.raft_first_layer_expansion,
            base_fill_pattern,
            interface_fill_pattern,
            raft_interface_fill_pattern,
            contact_fill_pattern,
            interface_pattern: config.interface_pattern,
            base_angle_alternates: config.base_pattern == SupportBasePattern::RectilinearGrid,
            loop_interface: config.interface_loop_pattern,
            num_contact_loops: config.contact_loops,
            with_sheath,
            soluble_interface: slicing.soluble_interface,
            base_angle,
            interface_angle,
            raft_angle_1st_layer,
            raft_angle_base,
            raft_angle_interface,
            tree_branch_diameter_double_wall_area_scaled,
        })
    }

    pub fn num_top_interface_layers_only(&self) -> usize {
        self.num_top_interface_layers - self.num_top_base_interface_layers
    }

    pub fn num_bottom_interface_layers_only(&self) -> usize {
        self.num_bottom_interface_layers - self.num_bottom_base_interface_layers
    }

    pub fn has_top_contacts(&self) -> bool {
        self.num_top_interface_layers > 0
    }

    pub fn has_bottom_contacts(&self) -> bool {
        self.num_bottom_interface_layers > 0
    }

    pub fn has_interfaces(&self) -> bool {
        self.has_top_contacts() || self.has_bottom_contacts()
    }

    pub fn has_base_interfaces(&self) -> bool {
        self.num_top_base_interface_layers > 0 || self.num_bottom_base_interface_layers > 0
    }

    /// Angle of a raft or soluble interface layer. Consecutive layers are
    /// rotated by 90° against each other.
    pub fn raft_interface_angle(&self, interface_id: usize) -> CoordF {
        self.raft_angle_interface
            + if interface_id & 1 == 1 {
                -FRAC_PI_4
            } else {
                FRAC_PI_4
            }
    }

    /// Base angles, indexed by support layer id modulo their count.
    pub fn base_angles(&self) -> Vec<CoordF> {
        if self.base_angle_alternates {
            vec![self.base_angle, self.interface_angle]
        } else {
            vec![self.base_angle]
        }
    }

    /// Angle of a dense interface: fixed for grid supports and for a
    /// configured rectilinear interface, alternating otherwise.
    pub fn support_interface_angle(&self, interface_id: usize) -> CoordF {
        if self.support_style == SupportStyle::Grid
            || self.interface_pattern == SupportInterfacePattern::Rectilinear
        {
            self.interface_angle
        } else {
            self.raft_interface_angle(interface_id)
        }
    }
}

fn support_material_interface_flow_at(config: &SupportConfig, height: CoordF) -> Result<Flow> {
    Ok(support_material_interface_flow(
        config.support_line_width,
        config.line_width,
        config.nozzle_diameter,
        height,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(config: &SupportConfig, slicing: &SlicingParams) -> SupportParameters {
        SupportParameters::new(config, slicing).unwrap()
    }

    #[test]
    fn test_default_parameters() {
        let p = params(&SupportConfig::default(), &SlicingParams::default());
        assert_eq!(p.num_top_interface_layers, 3);
        assert_eq!(p.num_bottom_interface_layers, 3);
        assert!(p.has_interfaces());
        assert!(!p.has_base_interfaces());
        assert!(p.support_density < 1.0);
        assert_eq!(p.base_fill_pattern, InfillPattern::SupportBase);
        assert!(p.can_merge_support_regions);
        assert_eq!(p.gap_xy, SupportConfig::default().gap_xy);
        assert_eq!(p.interface_pattern, SupportInterfacePattern::Auto);
        assert!((p.interface_angle - p.base_angle - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_no_interfaces_share_base_settings() {
        let config = SupportConfig::default()
            .with_interface_layers(0, Some(0));
        let p = params(&config, &SlicingParams::default());
        assert!(!p.has_interfaces());
        assert_eq!(p.interface_density, p.support_density);
        assert_eq!(p.interface_spacing, p.support_spacing);
        assert_eq!(p.support_material_interface_flow, p.support_material_flow);
    }

    #[test]
    fn test_dense_interface_is_rectilinear() {
        let config = SupportConfig {
            interface_spacing: 0.0,
            ..Default::default()
        };
        let p = params(&config, &SlicingParams::default());
        assert!((p.interface_density - 1.0).abs() < 1e-12);
        assert_eq!(p.interface_fill_pattern, InfillPattern::Rectilinear);
        assert_eq!(p.contact_fill_pattern, InfillPattern::Rectilinear);
    }

    #[test]
    fn test_base_interface_counts_clamped() {
        let config = SupportConfig::default()
            .with_interface_layers(2, Some(1))
            .with_base_interface_layers(5, 5);
        let p = params(&config, &SlicingParams::default());
        assert_eq!(p.num_top_base_interface_layers, 2);
        assert_eq!(p.num_bottom_base_interface_layers, 1);
        assert_eq!(p.num_top_interface_layers_only(), 0);
    }

    #[test]
    fn test_soluble_interface() {
        let slicing = SlicingParams {
            soluble_interface: true,
            ..Default::default()
        };
        let config = SupportConfig::default().with_interface_layers(4, None);
        let p = params(&config, &slicing);
        assert_eq!(p.num_top_base_interface_layers, 2);
        assert_eq!(p.contact_fill_pattern, InfillPattern::Concentric);
    }

    #[test]
    fn test_raft_interface_angle_alternates() {
        let p = params(&SupportConfig::default(), &SlicingParams::default());
        let a0 = p.raft_interface_angle(0);
        let a1 = p.raft_interface_angle(1);
        assert!(((a0 - a1) - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert_eq!(p.raft_interface_angle(2), a0);
    }

    #[test]
    fn test_interface_angle_follows_configured_pattern() {
        // Auto stays alternating even when the dense interface resolves to
        // a rectilinear fill.
        let config = SupportConfig {
            interface_spacing: 0.0,
            ..SupportConfig::default().with_style(SupportStyle::Snug)
        };
        let p = params(&config, &SlicingParams::default());
        assert_eq!(p.contact_fill_pattern, InfillPattern::Rectilinear);
        assert_eq!(p.support_interface_angle(0), p.raft_interface_angle(0));
        assert_eq!(p.support_interface_angle(1), p.raft_interface_angle(1));
        assert_ne!(p.support_interface_angle(0), p.support_interface_angle(1));

        // A configured rectilinear interface keeps one angle, sparse or not.
        let config = SupportConfig {
            interface_pattern: SupportInterfacePattern::Rectilinear,
            interface_spacing: 0.5,
            ..SupportConfig::default().with_style(SupportStyle::Snug)
        };
        let p = params(&config, &SlicingParams::default());
        assert_eq!(p.contact_fill_pattern, InfillPattern::SupportBase);
        assert_eq!(p.support_interface_angle(0), p.interface_angle);
        assert_eq!(p.support_interface_angle(1), p.interface_angle);

        // Grid supports never alternate.
        let p = params(&SupportConfig::default(), &SlicingParams::default());
        assert_eq!(p.support_interface_angle(0), p.support_interface_angle(1));
    }

    #[test]
    fn test_alternating_base_angles() {
        let config = SupportConfig {
            base_pattern: SupportBasePattern::RectilinearGrid,
            ..Default::default()
        };
        let p = params(&config, &SlicingParams::default());
        assert_eq!(p.base_angles().len(), 2);
        let p = params(&SupportConfig::default(), &SlicingParams::default());
        assert_eq!(p.base_angles(), vec![p.base_angle]);
    }

    #[test]
    fn test_raft_angles() {
        let thick = params(&SupportConfig::default(), &SlicingParams::default().raft(6, 0.4));
        assert_eq!(thick.raft_angle_1st_layer, thick.interface_angle);
        let thin = params(&SupportConfig::default(), &SlicingParams::default().raft(2, 0.4));
        assert!(thin.raft_angle_1st_layer > thin.base_angle);
    }

    #[test]
    fn test_double_wall_area() {
        let p = params(&SupportConfig::default(), &SlicingParams::default());
        let d = scaled(SupportConfig::default().tree_branch_diameter_double_wall);
        assert!((p.tree_branch_diameter_double_wall_area_scaled - 0.25 * PI * d * d).abs() < 1.0);
    }
}
