//! Slicing parameters relevant to support generation.
//!
//! Holds layer heights, the raft layer stack and the Z gaps between object,
//! support and raft. The raft tops are derived from the raft layer count by
//! [`SlicingParams::update_raft`].

use crate::CoordF;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameters controlling layer heights and the raft stack.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlicingParams {
    /// Regular layer height (mm).
    pub layer_height: CoordF,

    /// Height of the first printed layer (mm). For a raft this is the height
    /// of the first raft layer.
    pub first_print_layer_height: CoordF,

    /// Minimum layer height supported by the nozzles (mm).
    pub min_layer_height: CoordF,

    /// Maximum layer height supported by the nozzles (mm).
    pub max_layer_height: CoordF,

    /// Number of raft base layers.
    pub base_raft_layers: usize,

    /// Number of raft interface layers.
    pub interface_raft_layers: usize,

    /// Height of raft base layers (mm).
    pub base_raft_layer_height: CoordF,

    /// Height of raft interface layers (mm).
    pub interface_raft_layer_height: CoordF,

    /// Height of the raft contact layer (mm).
    pub contact_raft_layer_height: CoordF,

    /// Whether the first object layer uses bridging flow over a non-soluble raft.
    pub first_object_layer_bridging: bool,

    /// Whether the support interface is soluble (zero top Z distance).
    pub soluble_interface: bool,

    /// Gap between raft and object (mm).
    pub gap_raft_object: CoordF,

    /// Gap between object and support below it (mm).
    pub gap_object_support: CoordF,

    /// Gap between support and object above it (mm).
    pub gap_support_object: CoordF,

    /// Top of the last raft base layer (mm).
    pub raft_base_top_z: CoordF,

    /// Top of the last raft interface layer (mm).
    pub raft_interface_top_z: CoordF,

    /// Top of the raft contact layer (mm).
    pub raft_contact_top_z: CoordF,

    /// Z where the object starts (mm): 0 without a raft.
    pub object_print_z_min: CoordF,
}

impl SlicingParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters with the given regular and first layer heights, no raft.
    pub fn with_layer_heights(layer_height: CoordF, first_print_layer_height: CoordF) -> Self {
        Self {
            layer_height,
            first_print_layer_height,
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.layer_height > 0.0
            && self.first_print_layer_height > 0.0
            && self.min_layer_height > 0.0
            && self.max_layer_height >= self.min_layer_height
    }

    #[inline]
    pub fn has_raft(&self) -> bool {
        self.raft_layers() > 0
    }

    /// Total number of raft layers, base and interface.
    #[inline]
    pub fn raft_layers(&self) -> usize {
        self.base_raft_layers + self.interface_raft_layers
    }

    /// Split `raft_layers` configured raft layers into base and interface
    /// layers and derive the raft Z tops.
    ///
    /// Half of the layers (rounded up) become interface layers. Intermediate
    /// raft layers are printed as thick as the nozzles allow. A single raft
    /// layer is only a contact layer printed at the first layer height.
    pub fn update_raft(
        &mut self,
        raft_layers: usize,
        support_nozzle_diameter: CoordF,
        interface_nozzle_diameter: CoordF,
    ) {
        self.base_raft_layers = raft_layers;
        self.interface_raft_layers = 0;
        self.raft_base_top_z = 0.0;
        self.raft_interface_top_z = 0.0;
        self.raft_contact_top_z = 0.0;
        self.object_print_z_min = 0.0;

        if self.base_raft_layers > 0 {
            self.interface_raft_layers = (self.base_raft_layers + 1) / 2;
            self.base_raft_layers -= self.interface_raft_layers;
            self.base_raft_layer_height = self.layer_height.max(0.75 * support_nozzle_diameter);
            self.interface_raft_layer_height =
                self.layer_height.max(0.75 * interface_nozzle_diameter);
            self.contact_raft_layer_height =
                self.layer_height.max(0.75 * interface_nozzle_diameter);
            self.first_object_layer_bridging = false;
        }

        if self.has_raft() {
            if self.raft_layers() == 1 {
                self.contact_raft_layer_height = self.first_print_layer_height;
                self.raft_contact_top_z = self.first_print_layer_height;
            } else {
                self.raft_base_top_z = self.first_print_layer_height
                    + (self.base_raft_layers - 1) as CoordF * self.base_raft_layer_height;
                self.raft_interface_top_z = self.raft_base_top_z
                    + (self.interface_raft_layers - 1) as CoordF * self.interface_raft_layer_height;
                self.raft_contact_top_z = self.raft_interface_top_z + self.contact_raft_layer_height;
            }
            self.object_print_z_min = self.raft_contact_top_z + self.gap_raft_object;
        }
    }

    /// Builder: regular layer height.
    pub fn layer_height(mut self, height: CoordF) -> Self {
        self.layer_height = height;
        self
    }

    /// Builder: first printed layer height.
    pub fn first_print_layer_height(mut self, height: CoordF) -> Self {
        self.first_print_layer_height = height;
        self
    }

    /// Builder: configure a raft of `raft_layers` layers for nozzles of
    /// diameter `nozzle_diameter`.
    pub fn raft(mut self, raft_layers: usize, nozzle_diameter: CoordF) -> Self {
        self.update_raft(raft_layers, nozzle_diameter, nozzle_diameter);
        self
    }
}

impl Default for SlicingParams {
    fn default() -> Self {
        Self {
            layer_height: 0.2,
            first_print_layer_height: 0.2,
            min_layer_height: 0.07,
            max_layer_height: 0.3,
            base_raft_layers: 0,
            interface_raft_layers: 0,
            base_raft_layer_height: 0.3,
            interface_raft_layer_height: 0.2,
            contact_raft_layer_height: 0.2,
            first_object_layer_bridging: false,
            soluble_interface: false,
            gap_raft_object: 0.1,
            gap_object_support: 0.2,
            gap_support_object: 0.2,
            raft_base_top_z: 0.0,
            raft_interface_top_z: 0.0,
            raft_contact_top_z: 0.0,
            object_print_z_min: 0.0,
        }
    }
}

impl fmt::Display for SlicingParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SlicingParams(layer_height={:.3}mm, first_layer={:.3}mm, raft={}+{})",
            self.layer_height,
            self.first_print_layer_height,
            self.base_raft_layers,
            self.interface_raft_layers
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slicing_params_default() {
        let params = SlicingParams::default();
        assert!((params.layer_height - 0.2).abs() < 1e-6);
        assert!(params.is_valid());
        assert!(!params.has_raft());
    }

    #[test]
    fn test_slicing_params_invalid() {
        let mut params = SlicingParams::default();
        params.layer_height = 0.0;
        assert!(!params.is_valid());

        params.layer_height = 0.2;
        params.min_layer_height = 0.5;
        assert!(!params.is_valid());
    }

    #[test]
    fn test_single_raft_layer_is_contact_only() {
        let params = SlicingParams::with_layer_heights(0.2, 0.3).raft(1, 0.4);
        assert_eq!(params.raft_layers(), 1);
        assert_eq!(params.base_raft_layers, 0);
        assert_eq!(params.interface_raft_layers, 1);
        assert!((params.raft_contact_top_z - 0.3).abs() < 1e-9);
        assert!((params.object_print_z_min - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_multi_layer_raft_tops() {
        // 4 layers: 2 base, 2 interface. Intermediate heights max(0.2, 0.3) = 0.3.
        let params = SlicingParams::with_layer_heights(0.2, 0.25).raft(4, 0.4);
        assert_eq!(params.base_raft_layers, 2);
        assert_eq!(params.interface_raft_layers, 2);
        assert!((params.raft_base_top_z - 0.55).abs() < 1e-9);
        assert!((params.raft_interface_top_z - 0.85).abs() < 1e-9);
        assert!((params.raft_contact_top_z - 1.15).abs() < 1e-9);
    }

    #[test]
    fn test_raft_reset() {
        let mut params = SlicingParams::default().raft(3, 0.4);
        assert!(params.has_raft());
        params.update_raft(0, 0.4, 0.4);
        assert!(!params.has_raft());
        assert_eq!(params.raft_contact_top_z, 0.0);
    }
}
