//! Render cache slot allocator.
//!
//! Every active triangle owns one slot; the renderer uses it to address its
//! vertex buffer entry. Freed slots are reused before new ones are minted, so
//! slot numbers stay below the peak active count.

/// Render buffer slot owned by an active triangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheSlot(u32);

impl CacheSlot {
  /// Raw slot number.
  #[inline]
  pub fn index(self) -> u32 {
    self.0
  }
}

/// Free-list slot allocator.
#[derive(Clone, Debug, Default)]
pub struct SlotCache {
  free: Vec<CacheSlot>,
  minted: u32,
}

impl SlotCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Take a free slot.
  pub fn alloc(&mut self) -> CacheSlot {
    self.free.pop().unwrap_or_else(|| {
      let slot = CacheSlot(self.minted);
      self.minted += 1;
      slot
    })
  }

  /// Return a slot to the free list.
  pub fn free(&mut self, slot: CacheSlot) {
    debug_assert!(slot.0 < self.minted);
    self.free.push(slot);
  }

  /// Slots currently handed out.
  pub fn in_use(&self) -> usize {
    self.minted as usize - self.free.len()
  }

  /// Highest slot count ever needed.
  pub fn capacity(&self) -> usize {
    self.minted as usize
  }

  pub fn clear(&mut self) {
    self.free.clear();
    self.minted = 0;
  }
}
