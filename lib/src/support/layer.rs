//! Support layer records and the arena holding them.
//!
//! Every stage of the generator works on [`SupportGeneratorLayer`]s owned by
//! one [`LayerStorage`]. Stages refer to layers through [`LayerHandle`]s
//! collected in [`LayerList`]s, so a layer can sit in several lists at once
//! and survive until the whole generation pass is done.
//!
//! Layers can be allocated concurrently from worker threads through
//! [`LayerStorage::allocate`]; such layers become readable after
//! [`LayerStorage::flush`]. Single threaded code uses
//! [`LayerStorage::allocate_unguarded`], which skips the lock.

use crate::clipper::union;
use crate::geometry::ExPolygons;
use crate::{CoordF, EPSILON};
use std::cmp::Ordering;
use std::ops::{Index, IndexMut};
use std::sync::{Mutex, PoisonError};

/// Classification of a support layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SupportLayerType {
    /// Raft base layer, printed with the support flow.
    RaftBase,
    /// Raft interface layer, printed with the interface flow.
    RaftInterface,
    /// Bottom contact layer placed on top of the object.
    BottomContact,
    /// Dense interface layer above a bottom contact.
    BottomInterface,
    /// Sparse support body.
    Base,
    /// Dense interface layer below a top contact.
    TopInterface,
    /// Top contact layer touching the overhang.
    TopContact,
    #[default]
    Unclassified,
}

impl SupportLayerType {
    /// Covered by some form of dense interface.
    pub fn is_interface(self) -> bool {
        matches!(
            self,
            SupportLayerType::RaftInterface
                | SupportLayerType::BottomContact
                | SupportLayerType::BottomInterface
                | SupportLayerType::TopContact
                | SupportLayerType::TopInterface
        )
    }

    pub fn is_raft(self) -> bool {
        matches!(self, SupportLayerType::RaftBase | SupportLayerType::RaftInterface)
    }

    pub fn is_contact(self) -> bool {
        matches!(self, SupportLayerType::TopContact | SupportLayerType::BottomContact)
    }

    pub fn name(self) -> &'static str {
        match self {
            SupportLayerType::RaftBase => "raft base",
            SupportLayerType::RaftInterface => "raft interface",
            SupportLayerType::BottomContact => "bottom contact",
            SupportLayerType::BottomInterface => "bottom interface",
            SupportLayerType::Base => "base",
            SupportLayerType::TopInterface => "top interface",
            SupportLayerType::TopContact => "top contact",
            SupportLayerType::Unclassified => "unclassified",
        }
    }
}

impl std::fmt::Display for SupportLayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One horizontal slab of support material.
#[derive(Debug, Clone, Default)]
pub struct SupportGeneratorLayer {
    pub layer_type: SupportLayerType,
    /// Top of the slab (mm).
    pub print_z: CoordF,
    /// Bottom of the slab (mm). Below `print_z - height` for layers printed
    /// over a bridging gap.
    pub bottom_z: CoordF,
    /// Thickness of the extrusions (mm).
    pub height: CoordF,
    /// Printed in free air with a bridging flow.
    pub bridging: bool,
    /// Object layer above this contact, if known.
    pub idx_object_layer_above: Option<usize>,
    /// Object layer below this contact, if known.
    pub idx_object_layer_below: Option<usize>,
    /// Region to be printed.
    pub polygons: ExPolygons,
    /// Contact region. For raft interface layers, the support columns
    /// cutting through the raft.
    pub contact_polygons: Option<ExPolygons>,
    /// Whole overhang above a top contact.
    pub overhang_polygons: Option<ExPolygons>,
    /// Regions where support was enforced.
    pub enforcer_polygons: Option<ExPolygons>,
}

impl SupportGeneratorLayer {
    pub fn new(layer_type: SupportLayerType) -> Self {
        Self {
            layer_type,
            ..Default::default()
        }
    }

    /// Builder: Z range of the slab.
    pub fn with_z(mut self, print_z: CoordF, bottom_z: CoordF, height: CoordF) -> Self {
        self.print_z = print_z;
        self.bottom_z = bottom_z;
        self.height = height;
        self
    }

    pub fn with_polygons(mut self, polygons: ExPolygons) -> Self {
        self.polygons = polygons;
        self
    }

    pub fn with_bridging(mut self, bridging: bool) -> Self {
        self.bridging = bridging;
        self
    }

    /// Bottom of the extrusions, ignoring any bridging gap.
    #[inline]
    pub fn bottom_print_z(&self) -> CoordF {
        self.print_z - self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Raising `print_z`, then falling `height`, then bridging layers first.
    pub fn compare(&self, other: &Self) -> Ordering {
        self.print_z
            .total_cmp(&other.print_z)
            .then_with(|| other.height.total_cmp(&self.height))
            .then_with(|| other.bridging.cmp(&self.bridging))
    }

    /// Same Z within [`EPSILON`].
    #[inline]
    pub fn is_at(&self, print_z: CoordF) -> bool {
        (self.print_z - print_z).abs() < EPSILON
    }

    /// Move the regions of `other` into this layer. The Z range of this layer
    /// is kept, `other` is left without regions.
    pub fn merge(&mut self, other: &mut SupportGeneratorLayer) {
        self.polygons = union(&self.polygons, &std::mem::take(&mut other.polygons));
        merge_optional(&mut self.contact_polygons, other.contact_polygons.take());
        merge_optional(&mut self.overhang_polygons, other.overhang_polygons.take());
        merge_optional(&mut self.enforcer_polygons, other.enforcer_polygons.take());
    }
}

fn merge_optional(dst: &mut Option<ExPolygons>, src: Option<ExPolygons>) {
    match (dst.as_mut(), src) {
        (_, None) => {}
        (Some(d), Some(s)) if !d.is_empty() => {
            if !s.is_empty() {
                *d = union(d, &s);
            }
        }
        (_, Some(s)) => *dst = Some(s),
    }
}

/// Stable reference to a layer in a [`LayerStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerHandle(usize);

impl LayerHandle {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Ordered handles into a [`LayerStorage`].
pub type LayerList = Vec<LayerHandle>;

/// Arena owning every support layer of one generation pass.
#[derive(Debug, Default)]
pub struct LayerStorage {
    layers: Vec<SupportGeneratorLayer>,
    pending: Mutex<Vec<SupportGeneratorLayer>>,
}

impl LayerStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate from a worker thread. The layer is readable once the storage
    /// has been flushed.
    pub fn allocate(&self, layer: SupportGeneratorLayer) -> LayerHandle {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = LayerHandle(self.layers.len() + pending.len());
        pending.push(layer);
        handle
    }

    /// Allocate without locking.
    pub fn allocate_unguarded(&mut self, layer: SupportGeneratorLayer) -> LayerHandle {
        self.flush();
        self.layers.push(layer);
        LayerHandle(self.layers.len() - 1)
    }

    /// Make layers allocated through [`LayerStorage::allocate`] readable.
    pub fn flush(&mut self) {
        let pending = self.pending.get_mut().unwrap_or_else(PoisonError::into_inner);
        self.layers.append(pending);
    }

    /// Number of readable layers.
    #[inline]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    #[inline]
    pub fn get(&self, handle: LayerHandle) -> Option<&SupportGeneratorLayer> {
        self.layers.get(handle.0)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: LayerHandle) -> Option<&mut SupportGeneratorLayer> {
        self.layers.get_mut(handle.0)
    }

    /// Two distinct layers borrowed mutably at once.
    pub fn pair_mut(
        &mut self,
        a: LayerHandle,
        b: LayerHandle,
    ) -> Option<(&mut SupportGeneratorLayer, &mut SupportGeneratorLayer)> {
        if a == b || a.0 >= self.layers.len() || b.0 >= self.layers.len() {
            return None;
        }
        if a.0 < b.0 {
            let (lo, hi) = self.layers.split_at_mut(b.0);
            Some((&mut lo[a.0], &mut hi[0]))
        } else {
            let (lo, hi) = self.layers.split_at_mut(a.0);
            Some((&mut hi[0], &mut lo[b.0]))
        }
    }

    /// Merge `src` into `dst`, see [`SupportGeneratorLayer::merge`].
    pub fn merge(&mut self, dst: LayerHandle, src: LayerHandle) {
        if let Some((dst, src)) = self.pair_mut(dst, src) {
            dst.merge(src);
        }
    }

    /// Layers of a list, in list order.
    pub fn layers<'a>(&'a self, list: &'a [LayerHandle]) -> impl Iterator<Item = &'a SupportGeneratorLayer> + 'a {
        list.iter().map(move |&h| &self[h])
    }

    /// Sort a list by the layer ordering, see [`SupportGeneratorLayer::compare`].
    pub fn sort(&self, list: &mut LayerList) {
        list.sort_by(|&a, &b| self[a].compare(&self[b]));
    }

    /// Sort a list by raising `print_z` only, keeping the order of equal
    /// entries.
    pub fn sort_by_print_z(&self, list: &mut LayerList) {
        list.sort_by(|&a, &b| self[a].print_z.total_cmp(&self[b].print_z));
    }

    /// Index of the first layer of a list sorted by `print_z` for which
    /// `pred` holds. `pred` must be false for a prefix of the list and true
    /// for the rest.
    pub fn partition_point(
        &self,
        list: &[LayerHandle],
        pred: impl Fn(&SupportGeneratorLayer) -> bool,
    ) -> usize {
        list.partition_point(|&h| !pred(&self[h]))
    }
}

impl Index<LayerHandle> for LayerStorage {
    type Output = SupportGeneratorLayer;

    fn index(&self, handle: LayerHandle) -> &Self::Output {
        &self.layers[handle.0]
    }
}

impl IndexMut<LayerHandle> for LayerStorage {
    fn index_mut(&mut self, handle: LayerHandle) -> &mut Self::Output {
        &mut self.layers[handle.0]
    }
}

/// The named layer lists produced by the generator stages.
#[derive(Debug, Clone, Default)]
pub struct SupportLayerLists {
    pub raft_layers: LayerList,
    pub bottom_contacts: LayerList,
    pub top_contacts: LayerList,
    pub intermediate_layers: LayerList,
    pub interface_layers: LayerList,
    pub base_interface_layers: LayerList,
}

impl SupportLayerLists {
    /// All lists in assembly order: raft, bottom contacts, top contacts,
    /// intermediate, interface, base interface.
    pub fn all(&self) -> [&LayerList; 6] {
        [
            &self.raft_layers,
            &self.bottom_contacts,
            &self.top_contacts,
            &self.intermediate_layers,
            &self.interface_layers,
            &self.base_interface_layers,
        ]
    }

    pub fn len(&self) -> usize {
        self.all().iter().map(|l| l.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-sort every list by the layer ordering.
    pub fn sort(&mut self, storage: &LayerStorage) {
        for list in [
            &mut self.raft_layers,
            &mut self.bottom_contacts,
            &mut self.top_contacts,
            &mut self.intermediate_layers,
            &mut self.interface_layers,
            &mut self.base_interface_layers,
        ] {
            storage.sort(list);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{ExPolygon, Point};

    fn layer(print_z: f64, height: f64, bridging: bool) -> SupportGeneratorLayer {
        SupportGeneratorLayer::new(SupportLayerType::Base)
            .with_z(print_z, print_z - height, height)
            .with_bridging(bridging)
    }

    fn square(x: f64, size: f64) -> ExPolygon {
        ExPolygon::rectangle(Point::new_scale(x, 0.0), Point::new_scale(x + size, size))
    }

    #[test]
    fn test_ordering() {
        let a = layer(0.2, 0.2, false);
        let b = layer(0.4, 0.2, false);
        assert_eq!(a.compare(&b), Ordering::Less);
        // Thicker layers first at equal Z.
        let thick = layer(0.4, 0.3, false);
        assert_eq!(thick.compare(&b), Ordering::Less);
        // Bridging first at equal Z and height.
        let bridge = layer(0.4, 0.2, true);
        assert_eq!(bridge.compare(&b), Ordering::Less);
        assert_eq!(b.compare(&bridge), Ordering::Greater);
        assert_eq!(b.compare(&b.clone()), Ordering::Equal);
    }

    #[test]
    fn test_layer_type_classes() {
        assert!(SupportLayerType::TopContact.is_interface());
        assert!(SupportLayerType::RaftInterface.is_interface());
        assert!(!SupportLayerType::Base.is_interface());
        assert!(!SupportLayerType::RaftBase.is_interface());
        assert!(SupportLayerType::RaftBase.is_raft());
        assert!(SupportLayerType::BottomContact.is_contact());
        assert_eq!(SupportLayerType::TopInterface.to_string(), "top interface");
    }

    #[test]
    fn test_merge_keeps_absent_and_present_apart() {
        let mut dst = layer(0.4, 0.2, false).with_polygons(vec![square(0.0, 5.0)]);
        let mut src = layer(0.45, 0.25, false).with_polygons(vec![square(4.0, 5.0)]);
        src.overhang_polygons = Some(vec![square(4.0, 5.0)]);
        dst.contact_polygons = Some(Vec::new());
        dst.merge(&mut src);

        assert_eq!(dst.polygons.len(), 1);
        assert!((dst.print_z - 0.4).abs() < 1e-12);
        assert!(dst.overhang_polygons.as_ref().is_some_and(|p| p.len() == 1));
        // Present but empty stays present.
        assert!(dst.contact_polygons.as_ref().is_some_and(|p| p.is_empty()));
        assert!(dst.enforcer_polygons.is_none());
        assert!(src.is_empty());
        assert!(src.overhang_polygons.is_none());
    }

    #[test]
    fn test_storage_allocation() {
        let mut storage = LayerStorage::new();
        let a = storage.allocate_unguarded(layer(0.2, 0.2, false));
        let b = storage.allocate(layer(0.4, 0.2, false));
        let c = storage.allocate(layer(0.6, 0.2, false));
        assert_eq!(storage.len(), 1);
        assert!(storage.get(b).is_none());
        storage.flush();
        assert_eq!(storage.len(), 3);
        assert!((storage[c].print_z - 0.6).abs() < 1e-12);
        let d = storage.allocate_unguarded(layer(0.8, 0.2, false));
        assert_eq!(d.index(), 3);
        assert_eq!(a.index(), 0);
    }

    #[test]
    fn test_parallel_allocation() {
        use rayon::prelude::*;
        let mut storage = LayerStorage::new();
        let handles: Vec<LayerHandle> = (0..64)
            .into_par_iter()
            .map(|i| storage.allocate(layer(0.2 * (i + 1) as f64, 0.2, false)))
            .collect();
        storage.flush();
        assert_eq!(storage.len(), 64);
        let mut indices: Vec<usize> = handles.iter().map(|h| h.index()).collect();
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), 64);
    }

    #[test]
    fn test_sort_and_partition() {
        let mut storage = LayerStorage::new();
        let mut list: LayerList = [0.6, 0.2, 0.4]
            .iter()
            .map(|&z| storage.allocate_unguarded(layer(z, 0.2, false)))
            .collect();
        storage.sort(&mut list);
        let zs: Vec<f64> = storage.layers(&list).map(|l| l.print_z).collect();
        assert_eq!(zs, vec![0.2, 0.4, 0.6]);
        assert_eq!(storage.partition_point(&list, |l| l.print_z >= 0.3), 1);
        assert_eq!(storage.partition_point(&list, |l| l.print_z >= 1.0), 3);
    }

    #[test]
    fn test_storage_merge() {
        let mut storage = LayerStorage::new();
        let a = storage.allocate_unguarded(layer(0.2, 0.2, false).with_polygons(vec![square(0.0, 2.0)]));
        let b = storage.allocate_unguarded(layer(0.21, 0.2, false).with_polygons(vec![square(10.0, 2.0)]));
        storage.merge(a, b);
        assert_eq!(storage[a].polygons.len(), 2);
        assert!(storage[b].is_empty());
        assert!(storage.pair_mut(a, a).is_none());
    }
}
