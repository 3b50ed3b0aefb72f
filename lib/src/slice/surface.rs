//! Classified fill surfaces of a layer region.
//!
//! The support generator only reads surfaces: bottom bridges with a known
//! bridge angle are treated as self-supporting when refining contacts.

use crate::geometry::ExPolygon;
use crate::CoordF;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a surface within a layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceType {
    /// Top surface (visible from above).
    Top,
    /// Bottom surface resting on the bed or on support.
    Bottom,
    /// Bottom surface that bridges over air.
    BottomBridge,
    #[default]
    InternalSolid,
    Internal,
    InternalBridge,
    InternalVoid,
}

impl SurfaceType {
    #[inline]
    pub fn is_bottom(&self) -> bool {
        matches!(self, SurfaceType::Bottom | SurfaceType::BottomBridge)
    }

    #[inline]
    pub fn is_bridge(&self) -> bool {
        matches!(self, SurfaceType::BottomBridge | SurfaceType::InternalBridge)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SurfaceType::Top => "top",
            SurfaceType::Bottom => "bottom",
            SurfaceType::BottomBridge => "bottom bridge",
            SurfaceType::InternalSolid => "internal solid",
            SurfaceType::Internal => "internal",
            SurfaceType::InternalBridge => "internal bridge",
            SurfaceType::InternalVoid => "internal void",
        }
    }
}

impl fmt::Display for SurfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A classified region within a layer.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Surface {
    pub expolygon: ExPolygon,
    pub surface_type: SurfaceType,
    /// Bridge direction in radians, `None` until bridge detection ran or
    /// when no direction could be found.
    pub bridge_angle: Option<CoordF>,
}

impl Surface {
    pub fn new(expolygon: ExPolygon, surface_type: SurfaceType) -> Self {
        Self {
            expolygon,
            surface_type,
            bridge_angle: None,
        }
    }

    /// A bottom bridge surface.
    pub fn bridge(expolygon: ExPolygon, angle: Option<CoordF>) -> Self {
        Self {
            expolygon,
            surface_type: SurfaceType::BottomBridge,
            bridge_angle: angle,
        }
    }

    /// Bottom bridge whose direction has been determined.
    #[inline]
    pub fn is_anchored_bridge(&self) -> bool {
        self.surface_type == SurfaceType::BottomBridge
            && self.bridge_angle.map_or(false, |a| a >= 0.0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.expolygon.is_empty()
    }

    #[inline]
    pub fn area(&self) -> CoordF {
        self.expolygon.area()
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Surface({:?}, bridge_angle={:?}, {:?})",
            self.surface_type, self.bridge_angle, self.expolygon
        )
    }
}

impl From<ExPolygon> for Surface {
    fn from(expolygon: ExPolygon) -> Self {
        Self::new(expolygon, SurfaceType::default())
    }
}

pub type Surfaces = Vec<Surface>;
