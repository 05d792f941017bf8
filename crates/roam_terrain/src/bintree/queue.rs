//! Bucketed priority queue over `(tile, triangle)` keys.
//!
//! Priorities are quantised into a fixed number of buckets. Each bucket is a
//! doubly linked list threaded through a slab of entries, and an occupancy
//! bitmap finds the highest or lowest non-empty bucket in a handful of word
//! scans. Inserting returns a [`QueueSlot`] the caller stores on its node, so
//! removal and re-bucketing never search.
//!
//! Queues built with tie-breaking also keep the unquantised priority of each
//! entry. When a bucket grows past a small threshold a heap over that bucket
//! is built on the next peek and maintained from then on; smaller buckets are
//! scanned directly.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::index::TriIndex;
use super::tile::TileId;

/// Number of priority buckets used by the mesh queues.
pub const PRIORITY_RESOLUTION: usize = 256;

/// Bucket size at which tie-breaking switches from scanning to a heap.
const HEAP_THRESHOLD: u32 = 8;

/// Triangle identity stored in a queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueueKey {
  pub tile: TileId,
  pub index: TriIndex,
}

impl QueueKey {
  pub fn new(tile: TileId, index: TriIndex) -> Self {
    Self { tile, index }
  }
}

/// Handle to a queued entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueueSlot(u32);

impl QueueSlot {
  pub(crate) fn from_raw(raw: u32) -> Self {
    Self(raw)
  }
}

/// Which end of the queue [`BucketQueue::peek_extreme`] reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueOrder {
  /// Split queue: most urgent first.
  Highest,
  /// Merge queue: least useful first.
  Lowest,
}

#[derive(Clone, Copy, Debug)]
struct Entry {
  key: QueueKey,
  bucket: u16,
  fine: f32,
  prev: Option<u32>,
  next: Option<u32>,
  stamp: u32,
  live: bool,
}

/// Heap record; stale once its entry's stamp moves on.
#[derive(Clone, Copy, Debug)]
struct Ranked {
  rank: f32,
  slot: u32,
  stamp: u32,
}

impl Ord for Ranked {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .rank
      .total_cmp(&other.rank)
      .then_with(|| other.slot.cmp(&self.slot))
  }
}

impl PartialOrd for Ranked {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl PartialEq for Ranked {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for Ranked {}

/// Fixed-resolution bucket queue with O(1) insert, remove and move.
#[derive(Debug)]
pub struct BucketQueue {
  order: QueueOrder,
  tie_break: bool,
  entries: Vec<Entry>,
  free: Vec<u32>,
  heads: Vec<Option<u32>>,
  counts: Vec<u32>,
  occupancy: Vec<u64>,
  heaps: Vec<Option<BinaryHeap<Ranked>>>,
  len: usize,
}

impl BucketQueue {
  /// Create an empty queue with `resolution` buckets.
  pub fn new(resolution: usize, order: QueueOrder, tie_break: bool) -> Self {
    assert!(resolution > 0 && resolution <= u16::MAX as usize + 1);
    Self {
      order,
      tie_break,
      entries: Vec::new(),
      free: Vec::new(),
      heads: vec![None; resolution],
      counts: vec![0; resolution],
      occupancy: vec![0; resolution.div_ceil(64)],
      heaps: vec![None; resolution],
      len: 0,
    }
  }

  /// Queue of split candidates, highest priority first.
  pub fn split_queue() -> Self {
    Self::new(PRIORITY_RESOLUTION, QueueOrder::Highest, false)
  }

  /// Queue of merge diamonds, lowest priority first, ties broken by raw priority.
  pub fn merge_queue() -> Self {
    Self::new(PRIORITY_RESOLUTION, QueueOrder::Lowest, true)
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.len
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  #[inline]
  pub fn resolution(&self) -> usize {
    self.heads.len()
  }

  #[inline]
  pub fn order(&self) -> QueueOrder {
    self.order
  }

  /// Queue `key` in `bucket`; `fine` is the unquantised priority for tie-breaks.
  pub fn insert(&mut self, bucket: u16, key: QueueKey, fine: f32) -> QueueSlot {
    assert!((bucket as usize) < self.resolution(), "bucket {bucket} out of range");
    let slot = match self.free.pop() {
      Some(slot) => {
        let e = &mut self.entries[slot as usize];
        e.key = key;
        e.fine = fine;
        e.stamp = e.stamp.wrapping_add(1);
        e.live = true;
        slot
      }
      None => {
        self.entries.push(Entry {
          key,
          bucket,
          fine,
          prev: None,
          next: None,
          stamp: 0,
          live: true,
        });
        (self.entries.len() - 1) as u32
      }
    };
    self.link(slot, bucket);
    self.len += 1;
    QueueSlot(slot)
  }

  /// Remove an entry, returning its key.
  ///
  /// # Panics
  /// If the slot is not live.
  pub fn remove(&mut self, slot: QueueSlot) -> QueueKey {
    let QueueSlot(raw) = slot;
    assert!(self.contains(slot), "removing dead queue slot {raw}");
    self.unlink(raw);
    let e = &mut self.entries[raw as usize];
    e.live = false;
    e.stamp = e.stamp.wrapping_add(1);
    let key = e.key;
    self.free.push(raw);
    self.len -= 1;
    key
  }

  /// Re-bucket a live entry, keeping its slot.
  pub fn move_to(&mut self, slot: QueueSlot, bucket: u16, fine: f32) {
    let QueueSlot(raw) = slot;
    assert!(self.contains(slot), "moving dead queue slot {raw}");
    assert!((bucket as usize) < self.resolution(), "bucket {bucket} out of range");
    self.unlink(raw);
    let e = &mut self.entries[raw as usize];
    e.fine = fine;
    e.stamp = e.stamp.wrapping_add(1);
    self.link(raw, bucket);
  }

  #[inline]
  pub fn contains(&self, slot: QueueSlot) -> bool {
    self.entries.get(slot.0 as usize).is_some_and(|e| e.live)
  }

  /// Bucket currently holding `slot`.
  #[inline]
  pub fn bucket(&self, slot: QueueSlot) -> u16 {
    self.entries[slot.0 as usize].bucket
  }

  #[inline]
  pub fn key(&self, slot: QueueSlot) -> QueueKey {
    self.entries[slot.0 as usize].key
  }

  /// Every queued key, in slab order.
  pub fn keys(&self) -> impl Iterator<Item = QueueKey> + '_ {
    self.entries.iter().filter(|e| e.live).map(|e| e.key)
  }

  /// Drop every entry.
  pub fn reset(&mut self) {
    self.entries.clear();
    self.free.clear();
    self.heads.fill(None);
    self.counts.fill(0);
    self.occupancy.fill(0);
    self.heaps.fill(None);
    self.len = 0;
  }

  /// Best entry at the queue's end: highest bucket for split queues, lowest
  /// for merge queues.
  pub fn peek_extreme(&mut self) -> Option<(u16, QueueKey)> {
    let bucket = self.extreme_bucket()?;
    let slot = if !self.tie_break {
      self.heads[bucket as usize]?
    } else if self.counts[bucket as usize] > HEAP_THRESHOLD {
      self.heap_top(bucket)?
    } else {
      self.scan_best(bucket)?
    };
    Some((bucket, self.entries[slot as usize].key))
  }

  fn extreme_bucket(&self) -> Option<u16> {
    match self.order {
      QueueOrder::Highest => self
        .occupancy
        .iter()
        .enumerate()
        .rev()
        .find(|(_, w)| **w != 0)
        .map(|(i, w)| (i * 64 + 63 - w.leading_zeros() as usize) as u16),
      QueueOrder::Lowest => self
        .occupancy
        .iter()
        .enumerate()
        .find(|(_, w)| **w != 0)
        .map(|(i, w)| (i * 64 + w.trailing_zeros() as usize) as u16),
    }
  }

  #[inline]
  fn rank(&self, fine: f32) -> f32 {
    match self.order {
      QueueOrder::Highest => fine,
      QueueOrder::Lowest => -fine,
    }
  }

  fn scan_best(&self, bucket: u16) -> Option<u32> {
    let mut best: Option<Ranked> = None;
    let mut cursor = self.heads[bucket as usize];
    while let Some(slot) = cursor {
      let e = &self.entries[slot as usize];
      let candidate = Ranked {
        rank: self.rank(e.fine),
        slot,
        stamp: e.stamp,
      };
      if best.is_none_or(|b| candidate > b) {
        best = Some(candidate);
      }
      cursor = e.next;
    }
    best.map(|b| b.slot)
  }

  fn heap_top(&mut self, bucket: u16) -> Option<u32> {
    let b = bucket as usize;
    if self.heaps[b].is_none() {
      self.heaps[b] = Some(self.bucket_heap(bucket));
    }
    let heap = self.heaps[b].as_mut()?;
    while let Some(top) = heap.peek() {
      let e = &self.entries[top.slot as usize];
      if e.live && e.stamp == top.stamp && e.bucket == bucket {
        return Some(top.slot);
      }
      heap.pop();
    }
    None
  }

  fn bucket_heap(&self, bucket: u16) -> BinaryHeap<Ranked> {
    let mut heap = BinaryHeap::with_capacity(self.counts[bucket as usize] as usize);
    let mut cursor = self.heads[bucket as usize];
    while let Some(slot) = cursor {
      let e = &self.entries[slot as usize];
      heap.push(Ranked {
        rank: self.rank(e.fine),
        slot,
        stamp: e.stamp,
      });
      cursor = e.next;
    }
    heap
  }

  fn link(&mut self, slot: u32, bucket: u16) {
    let b = bucket as usize;
    let head = self.heads[b];
    if let Some(h) = head {
      self.entries[h as usize].prev = Some(slot);
    }
    let e = &mut self.entries[slot as usize];
    e.bucket = bucket;
    e.prev = None;
    e.next = head;
    let (fine, stamp) = (e.fine, e.stamp);
    let ranked = Ranked {
      rank: self.rank(fine),
      slot,
      stamp,
    };
    self.heads[b] = Some(slot);
    self.counts[b] += 1;
    self.occupancy[b / 64] |= 1u64 << (b % 64);

    let count = self.counts[b] as usize;
    let stale = self.heaps[b].as_ref().is_some_and(|h| h.len() > 4 * count);
    if stale {
      self.heaps[b] = Some(self.bucket_heap(bucket));
    } else if let Some(heap) = self.heaps[b].as_mut() {
      heap.push(ranked);
    }
  }

  fn unlink(&mut self, slot: u32) {
    let Entry {
      bucket, prev, next, ..
    } = self.entries[slot as usize];
    let b = bucket as usize;
    match prev {
      Some(p) => self.entries[p as usize].next = next,
      None => self.heads[b] = next,
    }
    if let Some(n) = next {
      self.entries[n as usize].prev = prev;
    }
    self.counts[b] -= 1;
    if self.counts[b] == 0 {
      self.occupancy[b / 64] &= !(1u64 << (b % 64));
      self.heaps[b] = None;
    }
  }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod queue_test;
