//! Mutable per-triangle state stored in a tile's arena.

use crate::camera::VisMask;

use super::cache::CacheSlot;
use super::queue::QueueSlot;

/// Packed state bits plus the priority-delay countdown (high nibble).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NodeFlags(u8);

impl NodeFlags {
  /// Height, wedge bounds and thickness reflect the current heights.
  pub const COORD_VALID: u8 = 1 << 0;
  /// The renderer has consumed this triangle since it became active.
  pub const IN_VERTEX_BUFFER: u8 = 1 << 1;
  pub const IN_SPLIT_QUEUE: u8 = 1 << 2;
  pub const IN_MERGE_QUEUE: u8 = 1 << 3;

  /// Largest countdown the high nibble can hold.
  pub const MAX_DELAY: u8 = 15;
  const DELAY_SHIFT: u8 = 4;

  #[inline]
  pub fn contains(self, bit: u8) -> bool {
    self.0 & bit != 0
  }

  #[inline]
  pub fn set(&mut self, bit: u8, on: bool) {
    if on {
      self.0 |= bit;
    } else {
      self.0 &= !bit;
    }
  }

  /// Remaining ticks before the node is re-tested.
  #[inline]
  pub fn delay(self) -> u8 {
    self.0 >> Self::DELAY_SHIFT
  }

  /// Store a countdown, saturating at [`Self::MAX_DELAY`].
  #[inline]
  pub fn set_delay(&mut self, ticks: u32) {
    let ticks = ticks.min(Self::MAX_DELAY as u32) as u8;
    self.0 = (self.0 & 0x0f) | (ticks << Self::DELAY_SHIFT);
  }
}

/// State of one triangle (or corner vertex) in a tile.
///
/// Geometry is not stored here; it comes from the shared
/// [`TriangleIndexSpace`](super::TriangleIndexSpace).
#[derive(Clone, Copy, Debug, Default)]
pub struct TriangleNode {
  pub(crate) height: f32,
  pub(crate) min_height: f32,
  pub(crate) max_height: f32,
  pub(crate) thickness: f32,
  pub(crate) priority: u16,
  pub(crate) vis: VisMask,
  pub(crate) flags: NodeFlags,
  pub(crate) cache_slot: Option<CacheSlot>,
  pub(crate) split_slot: Option<QueueSlot>,
  pub(crate) merge_slot: Option<QueueSlot>,
}

impl TriangleNode {
  /// World height at this index's grid point.
  #[inline]
  pub fn height(&self) -> f32 {
    self.height
  }

  /// Lowest height under the triangle.
  #[inline]
  pub fn min_height(&self) -> f32 {
    self.min_height
  }

  /// Highest height under the triangle.
  #[inline]
  pub fn max_height(&self) -> f32 {
    self.max_height
  }

  /// Wedge thickness bounding the error of not splitting.
  #[inline]
  pub fn thickness(&self) -> f32 {
    self.thickness
  }

  /// Quantised split priority; 0 = never split.
  #[inline]
  pub fn priority(&self) -> u16 {
    self.priority
  }

  #[inline]
  pub fn visibility(&self) -> VisMask {
    self.vis
  }

  #[inline]
  pub fn flags(&self) -> NodeFlags {
    self.flags
  }

  /// Render cache slot, present exactly while the triangle is active.
  #[inline]
  pub fn cache_slot(&self) -> Option<CacheSlot> {
    self.cache_slot
  }

  #[inline]
  pub fn is_active(&self) -> bool {
    self.cache_slot.is_some()
  }

  #[inline]
  pub fn in_split_queue(&self) -> bool {
    self.flags.contains(NodeFlags::IN_SPLIT_QUEUE)
  }

  #[inline]
  pub fn in_merge_queue(&self) -> bool {
    self.flags.contains(NodeFlags::IN_MERGE_QUEUE)
  }

  pub(crate) fn set_split_slot(&mut self, slot: Option<QueueSlot>) {
    self.split_slot = slot;
    self.flags.set(NodeFlags::IN_SPLIT_QUEUE, slot.is_some());
  }

  pub(crate) fn set_merge_slot(&mut self, slot: Option<QueueSlot>) {
    self.merge_slot = slot;
    self.flags.set(NodeFlags::IN_MERGE_QUEUE, slot.is_some());
  }

  /// Back to the merged baseline, keeping sampled heights.
  pub(crate) fn reset_state(&mut self) {
    self.priority = 0;
    self.vis = VisMask::OUT;
    self.cache_slot = None;
    self.split_slot = None;
    self.merge_slot = None;
    self.flags = NodeFlags::default();
  }
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
