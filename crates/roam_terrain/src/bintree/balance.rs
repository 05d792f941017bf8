//! Split, merge and the per-frame balancing loop.
//!
//! Splits and merges span tiles: a split forces the hypotenuse neighbour to
//! split as well, which may walk up the neighbour's ancestors and cross into
//! adjacent tiles. Recursion depth is bounded by the tree depth.
//!
//! A merge diamond is a split triangle `p` whose children are active, plus
//! the same pair under its hypotenuse neighbour. The diamond's merge-queue
//! slot is stored on `p` and on the neighbour, so breaking either half finds
//! the entry in O(1).

use glam::Vec2;
use smallvec::SmallVec;
use web_time::Instant;

use super::budget::TerrainStats;
use super::index::{TriIndex, TriangleIndexSpace};
use super::mesh::BinTreeMesh;
use super::queue::QueueKey;
use super::tile::{BinTreeTile, MeshQueues, NodeState, TileId, ViewContext};
use crate::camera::Camera;

/// Whether `p` in tile `t` heads a complete merge diamond.
fn is_diamond(tiles: &[BinTreeTile], t: TileId, p: TriIndex) -> bool {
  let tile = &tiles[t.index()];
  if !tile.space().is_triangle(p) || tile.space().is_leaf(p) {
    return false;
  }
  let children_active = |tile: &BinTreeTile, p: TriIndex| {
    tile.is_active(TriangleIndexSpace::right(p)) && tile.is_active(TriangleIndexSpace::left(p))
  };
  if !children_active(tile, p) {
    return false;
  }
  match tile.neighbour(p) {
    Some((nt, n)) => children_active(&tiles[nt.index()], n),
    None => true,
  }
}

/// Whether any part of `tile` lies within `reach` of `position` in XZ.
fn within_reach(tile: &BinTreeTile, position: Vec2, reach: f32) -> bool {
  let bounds = tile.bounds(1);
  let dx = (bounds.min.x - position.x).max(position.x - bounds.max.x).max(0.0);
  let dz = (bounds.min.z - position.y).max(position.y - bounds.max.z).max(0.0);
  dx * dx + dz * dz <= reach * reach
}

/// Mutable view over the mesh parts touched by split and merge.
struct Balancer<'a> {
  tiles: &'a mut [BinTreeTile],
  q: &'a mut MeshQueues,
  ctx: &'a ViewContext,
  stats: &'a mut TerrainStats,
  merge_enabled: bool,
}

impl Balancer<'_> {
  #[inline]
  fn tile(&self, t: TileId) -> &BinTreeTile {
    &self.tiles[t.index()]
  }

  fn is_diamond(&self, t: TileId, p: TriIndex) -> bool {
    is_diamond(&*self.tiles, t, p)
  }

  /// Largest priority either half of the diamond would get once collapsed.
  fn merge_priority(&mut self, t: TileId, p: TriIndex) -> (u16, f32) {
    let halves = std::iter::once((t, p)).chain(self.tile(t).neighbour(p));
    let mut best = (0u16, 0.0f32);
    for (tt, pp) in halves {
      let tile = &self.tiles[tt.index()];
      let vis = tile.classify(pp, self.ctx.full_mask(), self.ctx, self.stats);
      let (bucket, raw) = tile.candidate_priority(pp, vis, self.ctx, self.stats);
      if bucket > best.0 || (bucket == best.0 && raw > best.1) {
        best = (bucket, raw);
      }
    }
    best
  }

  /// Insert, move or drop the merge entry for the diamond at `p`.
  fn update_merge(&mut self, t: TileId, p: TriIndex) {
    if !self.merge_enabled || !self.is_diamond(t, p) {
      self.remove_merge(t, p);
      return;
    }
    let (bucket, raw) = self.merge_priority(t, p);
    if let Some(slot) = self.tile(t).node(p).merge_slot {
      self.q.merge.move_to(slot, bucket, raw);
      self.stats.queue_moves += 1;
      return;
    }
    let slot = self.q.merge.insert(bucket, QueueKey::new(t, p), raw);
    self.stats.queue_inserts += 1;
    self.tiles[t.index()].node_mut(p).set_merge_slot(Some(slot));
    if let Some((nt, n)) = self.tile(t).neighbour(p) {
      self.tiles[nt.index()].node_mut(n).set_merge_slot(Some(slot));
    }
  }

  /// Drop the merge entry of the diamond at `p`, if queued.
  fn remove_merge(&mut self, t: TileId, p: TriIndex) {
    if !self.tile(t).space().is_triangle(p) {
      return;
    }
    let Some(slot) = self.tile(t).node(p).merge_slot else {
      return;
    };
    self.q.merge.remove(slot);
    self.stats.queue_removals += 1;
    self.tiles[t.index()].node_mut(p).set_merge_slot(None);
    if let Some((nt, n)) = self.tile(t).neighbour(p) {
      self.tiles[nt.index()].node_mut(n).set_merge_slot(None);
    }
  }

  /// Split `i`, first splitting whatever ancestors are still merged, then
  /// force the hypotenuse neighbour to the same level.
  fn force_split(&mut self, t: TileId, i: TriIndex) {
    let space = self.tile(t).space();
    assert!(
      space.is_triangle(i) && !space.is_leaf(i),
      "cannot split {i} in {t:?}: not a splittable triangle"
    );
    match self.tile(t).state(i) {
      NodeState::Split => return,
      NodeState::Merged => {
        self.force_split(t, TriangleIndexSpace::parent(i));
        if !self.tile(t).is_active(i) {
          return;
        }
      }
      NodeState::Active => {}
    }

    self.remove_merge(t, TriangleIndexSpace::parent(i));
    let node = *self.tile(t).node(i);
    let tile = &mut self.tiles[t.index()];
    let slot = tile.deactivate(i, self.q, self.stats);
    let right = TriangleIndexSpace::right(i);
    let left = TriangleIndexSpace::left(i);
    tile.activate(right, Some(node.priority), Some(slot), node.vis, self.ctx, self.q, self.stats);
    tile.activate(left, Some(node.priority), None, node.vis, self.ctx, self.q, self.stats);
    self.stats.splits += 1;

    if let Some((nt, n)) = self.tile(t).neighbour(i) {
      self.force_split(nt, n);
    }
    self.update_merge(t, i);
  }

  /// Replace the active children of `p` with `p`.
  fn collapse(&mut self, t: TileId, p: TriIndex) {
    let tile = &mut self.tiles[t.index()];
    let slot = tile.deactivate(TriangleIndexSpace::right(p), self.q, self.stats);
    let spare = tile.deactivate(TriangleIndexSpace::left(p), self.q, self.stats);
    self.q.cache.free(spare);
    tile.activate(p, None, Some(slot), self.ctx.full_mask(), self.ctx, self.q, self.stats);
  }

  /// Merge the diamond headed by `p`.
  fn merge(&mut self, t: TileId, p: TriIndex) {
    assert!(self.is_diamond(t, p), "{p} in {t:?} is not a complete merge diamond");
    self.remove_merge(t, p);
    let neighbour = self.tile(t).neighbour(p);
    self.collapse(t, p);
    if let Some((nt, n)) = neighbour {
      self.collapse(nt, n);
    }
    self.stats.merges += 1;

    self.update_merge(t, TriangleIndexSpace::parent(p));
    if let Some((nt, n)) = neighbour {
      self.update_merge(nt, TriangleIndexSpace::parent(n));
    }
  }
}

/// What one balancing iteration decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
  Merge(QueueKey),
  Split(QueueKey),
  Converged,
}

impl BinTreeMesh {
  fn balancer<'a>(&'a mut self, stats: &'a mut TerrainStats) -> Balancer<'a> {
    Balancer {
      tiles: &mut self.tiles,
      q: &mut self.queues,
      ctx: &self.view,
      stats,
      merge_enabled: self.merge_enabled,
    }
  }

  /// Split triangle `i` of `tile`, forcing neighbours as needed.
  ///
  /// A no-op when `i` is already split. Merged ancestors are split first.
  ///
  /// # Panics
  /// If `i` is a leaf or not a tree triangle.
  pub fn split(&mut self, tile: TileId, i: TriIndex, stats: &mut TerrainStats) {
    self.balancer(stats).force_split(tile, i);
    self.converged = false;
  }

  /// Collapse the diamond headed by the split triangle `p`.
  ///
  /// # Panics
  /// If the children of `p` or of its hypotenuse neighbour are not all active.
  pub fn merge(&mut self, tile: TileId, p: TriIndex, stats: &mut TerrainStats) {
    self.balancer(stats).merge(tile, p);
    self.converged = false;
  }

  /// Whether `p` heads a complete merge diamond.
  pub fn is_mergeable(&self, tile: TileId, p: TriIndex) -> bool {
    is_diamond(&self.tiles, tile, p)
  }

  /// Turn merging on or off.
  ///
  /// Disabling drops every merge entry; enabling rebuilds the queue from all
  /// complete diamonds.
  pub fn set_merge_enabled(&mut self, enabled: bool) {
    self.merge_enabled = enabled;
    self.rebuild_merge_queue();
    self.converged = false;
    tracing::debug!(enabled, diamonds = self.queues.merge.len(), "merge mode changed");
  }

  fn rebuild_merge_queue(&mut self) {
    for tile in &mut self.tiles {
      for p in 1..tile.space().leaf_start() {
        if tile.node(p).merge_slot.is_some() {
          tile.node_mut(p).set_merge_slot(None);
        }
      }
    }
    self.queues.merge.reset();
    if !self.merge_enabled {
      return;
    }
    let mut stats = TerrainStats::default();
    let leaf_start = self.space.leaf_start();
    let tile_count = self.tiles.len();
    let mut b = self.balancer(&mut stats);
    for t in 0..tile_count {
      let t = b.tiles[t].id();
      for p in 1..leaf_start {
        if b.tile(t).node(p).merge_slot.is_none() {
          b.update_merge(t, p);
        }
      }
    }
  }

  /// Bring the mesh up to date with `camera`.
  ///
  /// Skips all work when the camera is unchanged and the previous update
  /// converged; returns whether an update ran. `elapsed_ticks` drains the
  /// priority-delay countdown of far-culled triangles.
  ///
  /// # Panics
  /// If balancing does not converge within
  /// [`DetailBand::iteration_cap`](super::DetailBand::iteration_cap)
  /// iterations.
  #[tracing::instrument(skip_all, fields(frame = self.frames))]
  pub fn update_frame(&mut self, camera: &Camera, elapsed_ticks: u32, stats: &mut TerrainStats) -> bool {
    if self.converged && self.last_camera.as_ref() == Some(camera) {
      return false;
    }
    let start = Instant::now();

    let position = Vec2::new(camera.position.x, camera.position.z);
    let tile_size = self.config.tile_size as f32;
    let jumped = self
      .anchor
      .map_or(true, |anchor| anchor.distance(position) > tile_size);
    if jumped {
      self.anchor = Some(position);
    }
    self.view.position = position;
    self.view.forward = Vec2::new(camera.forward.x, camera.forward.z);
    self.view.frustum = camera.frustum.clone();
    self.view.elapsed_ticks = elapsed_ticks;
    self.view.reset_delays = jumped;

    // Tiles well beyond the far clip keep their previous state.
    let reach = self.view.far_clip + 2.0 * tile_size;
    let full = self.view.full_mask();
    for tile in &mut self.tiles {
      if !within_reach(tile, position, reach) {
        continue;
      }
      tile.compute_visibility(1, full, &self.view, &mut self.queues, stats);
      tile.compute_priority(1, &self.view, &mut self.queues, stats);
    }

    if self.merge_enabled {
      let keys: SmallVec<[QueueKey; 64]> = self
        .queues
        .merge
        .keys()
        .filter(|key| within_reach(&self.tiles[key.tile.index()], position, reach))
        .collect();
      let mut b = self.balancer(stats);
      for key in keys {
        b.update_merge(key.tile, key.index);
      }
    }

    let iterations = self.balance(stats);
    self.converged = true;
    self.last_camera = Some(camera.clone());
    if self.frames == 0 && !self.merge_enabled {
      self.set_merge_enabled(true);
      self.converged = true;
    }
    self.frames += 1;

    stats.frames += 1;
    stats.last_balance_iterations = iterations;
    stats.last_active = self.queues.visible as u32;
    self
      .metrics
      .record_update(start.elapsed().as_micros() as u64, iterations);
    if crate::metrics::is_enabled() {
      self.metrics.update_levels(&self.tiles);
    }
    tracing::debug!(
      iterations,
      collapsed = stats.last_collapse_merges,
      visible = self.queues.visible,
      active = self.queues.active,
      splits = self.queues.split.len(),
      diamonds = self.queues.merge.len(),
      "terrain balanced"
    );
    true
  }

  /// Merge every zero-priority diamond, returning how many were merged.
  ///
  /// Culled or flat diamonds gain nothing from their detail. These merges
  /// only shrink the mesh and are not counted against the iteration cap.
  fn collapse_unneeded(&mut self, stats: &mut TerrainStats) -> u32 {
    if !self.merge_enabled {
      return 0;
    }
    let mut merges = 0;
    while let Some((0, key)) = self.queues.merge.peek_extreme() {
      self.balancer(stats).merge(key.tile, key.index);
      merges += 1;
    }
    merges
  }

  /// Run split and merge steps until the visible count settles in the band.
  fn balance(&mut self, stats: &mut TerrainStats) -> u32 {
    stats.last_collapse_merges = self.collapse_unneeded(stats);

    let cap = self.config.detail.iteration_cap();
    let mut iterations = 0u32;
    loop {
      match self.next_step() {
        Step::Converged => return iterations,
        Step::Merge(key) => self.balancer(stats).merge(key.tile, key.index),
        Step::Split(key) => self.balancer(stats).force_split(key.tile, key.index),
      }
      iterations += 1;
      assert!(
        iterations <= cap,
        "terrain balance did not converge in {cap} iterations ({} visible, {} active)",
        self.queues.visible,
        self.queues.active
      );
    }
  }

  fn next_step(&mut self) -> Step {
    let band = self.config.detail;
    let count = self.queues.visible as u32;
    let split = self.queues.split.peek_extreme();
    let merge = if self.merge_enabled {
      self.queues.merge.peek_extreme()
    } else {
      None
    };

    if let Some((merge_pr, key)) = merge {
      let worthwhile = split.is_some_and(|(split_pr, _)| {
        split_pr as u32 > merge_pr as u32 + band.priority_hysteresis()
      });
      if count > band.max_detail || merge_pr == 0 || (count > band.merge_floor() && worthwhile) {
        return Step::Merge(key);
      }
    }
    match split {
      Some((_, key)) if count < band.min_detail && band.can_split(self.queues.active) => Step::Split(key),
      _ => Step::Converged,
    }
  }
}

#[cfg(test)]
#[path = "balance_test.rs"]
mod balance_test;
