//! BinTreeTile - one triangular half of a terrain grid cell.
//!
//! A tile owns the mutable state of every triangle in its bintree, stored in
//! an arena addressed by [`TriIndex`]. Geometry comes from the shared
//! [`TriangleIndexSpace`]. Split and merge span tiles, so they live on the
//! mesh; the tile provides the per-node pieces they are built from:
//! activation, visibility, priority and height sampling.
//!
//! Mirrored tiles are the lower-right half of their cell and map local
//! coordinates as `offset - local`; the point reflection keeps winding.

use std::sync::Arc;

use glam::{Vec2, Vec3};

use super::bounds::Aabb3;
use super::budget::TerrainStats;
use super::cache::{CacheSlot, SlotCache};
use super::config::TerrainConfig;
use super::index::{Edge, TriIndex, TriangleIndexSpace};
use super::node::{NodeFlags, TriangleNode};
use super::queue::{BucketQueue, QueueKey, PRIORITY_RESOLUTION};
use crate::camera::{Camera, Frustum, VisMask};
use crate::error::{try_alloc, Error, Result};
use crate::height::HeightField;

/// Identifier of a tile within its mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(u32);

impl TileId {
  pub(crate) fn from_raw(raw: u32) -> Self {
    Self(raw)
  }

  /// Position in the mesh's tile list.
  #[inline]
  pub fn index(self) -> usize {
    self.0 as usize
  }
}

/// Adjacent tiles across each boundary edge; `None` at the mesh border.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TileNeighbours {
  pub top: Option<TileId>,
  pub left: Option<TileId>,
  pub diagonal: Option<TileId>,
}

/// Position of a triangle relative to the active frontier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
  /// An ancestor is active; the triangle is not realised.
  Merged,
  /// Rendered leaf of the realised tree.
  Active,
  /// Realised and split; its descendants carry the frontier.
  Split,
}

/// Per-frame view data shared by visibility and priority updates.
#[derive(Clone, Debug)]
pub struct ViewContext {
  /// Camera XZ position.
  pub position: Vec2,
  /// XZ part of the view direction.
  pub forward: Vec2,
  pub frustum: Frustum,
  pub near_clip: f32,
  pub far_clip: f32,
  /// Thickness to priority scale, see [`TerrainConfig::variance_scale`].
  pub variance_scale: f32,
  /// Tile edge in world units; unit of the priority delay.
  pub tile_size: f32,
  /// Ticks since the previous update, drained from delay countdowns.
  pub elapsed_ticks: u32,
  /// Ignore delay countdowns this frame.
  pub reset_delays: bool,
}

impl ViewContext {
  pub fn new(camera: &Camera, config: &TerrainConfig, variance_scale: f32) -> Self {
    Self {
      position: Vec2::new(camera.position.x, camera.position.z),
      forward: Vec2::new(camera.forward.x, camera.forward.z),
      frustum: camera.frustum.clone(),
      near_clip: config.near_clip,
      far_clip: config.far_clip,
      variance_scale,
      tile_size: config.tile_size as f32,
      elapsed_ticks: 1,
      reset_delays: true,
    }
  }

  /// Mask that requests every test.
  #[inline]
  pub fn full_mask(&self) -> VisMask {
    self.frustum.full_mask()
  }
}

/// Queues, cache and counters shared by every tile of a mesh.
#[derive(Debug)]
pub(crate) struct MeshQueues {
  pub split: BucketQueue,
  pub merge: BucketQueue,
  pub cache: SlotCache,
  /// Active triangles.
  pub active: usize,
  /// Active triangles that passed the visibility test.
  pub visible: usize,
}

impl MeshQueues {
  pub fn new() -> Self {
    Self {
      split: BucketQueue::split_queue(),
      merge: BucketQueue::merge_queue(),
      cache: SlotCache::new(),
      active: 0,
      visible: 0,
    }
  }
}

/// Quantise a raw priority into a queue bucket.
#[inline]
pub fn quantize_priority(raw: f32) -> u16 {
  // Negative values saturate to 0.
  raw.min((PRIORITY_RESOLUTION - 1) as f32) as u16
}

/// One triangular half of a grid cell.
#[derive(Debug)]
pub struct BinTreeTile {
  id: TileId,
  space: Arc<TriangleIndexSpace>,
  row_offset: u32,
  col_offset: u32,
  mirror: bool,
  neighbours: TileNeighbours,
  nodes: Vec<TriangleNode>,
  tree_vis: VisMask,
}

impl BinTreeTile {
  /// Allocate a tile whose local `(0,0)` sits at global `(row_offset, col_offset)`.
  pub fn new(
    id: TileId,
    space: Arc<TriangleIndexSpace>,
    row_offset: u32,
    col_offset: u32,
    mirror: bool,
  ) -> Result<Self> {
    let nodes = try_alloc("tile nodes", space.len(), TriangleNode::default())?;
    Ok(Self {
      id,
      space,
      row_offset,
      col_offset,
      mirror,
      neighbours: TileNeighbours::default(),
      nodes,
      tree_vis: VisMask::OUT,
    })
  }

  /// Reset every node to the merged baseline and sample heights.
  ///
  /// Nothing is active afterwards; the mesh activates the root once queues
  /// are available.
  pub fn init<F: HeightField + ?Sized>(&mut self, field: &F) -> Result<()> {
    for i in 0..self.space.len() as TriIndex {
      let (row, col) = (self.global_row(i), self.global_col(i));
      if row >= field.rows() || col >= field.cols() {
        return Err(Error::HeightSample { row, col });
      }
      let height = field.world_height(row, col);
      if !height.is_finite() {
        return Err(Error::HeightSample { row, col });
      }
      let node = &mut self.nodes[i as usize];
      node.reset_state();
      node.height = height;
    }
    self.tree_vis = VisMask::OUT;
    self.refresh_bounds();
    Ok(())
  }

  /// Recompute wedge bounds and thickness bottom-up for every triangle
  /// whose `COORD_VALID` flag is clear.
  pub fn refresh_bounds(&mut self) {
    let space = Arc::clone(&self.space);
    for i in (1..space.tri_count()).rev() {
      if self.nodes[i as usize].flags.contains(NodeFlags::COORD_VALID) {
        continue;
      }
      let [apex, v0, v1] = space.vertices(i);
      let h = |v: TriIndex| self.nodes[v as usize].height;
      let (ha, h0, h1, hc) = (h(apex), h(v0), h(v1), h(i));
      let mut lo = ha.min(h0).min(h1).min(hc);
      let mut hi = ha.max(h0).max(h1).max(hc);
      let mut thickness = 0.0;
      if !space.is_leaf(i) {
        let r = self.nodes[TriangleIndexSpace::right(i) as usize];
        let l = self.nodes[TriangleIndexSpace::left(i) as usize];
        lo = lo.min(r.min_height).min(l.min_height);
        hi = hi.max(r.max_height).max(l.max_height);
        thickness = (hc - (h0 + h1) * 0.5).abs() + r.thickness.max(l.thickness);
      }
      let node = &mut self.nodes[i as usize];
      node.min_height = lo;
      node.max_height = hi;
      node.thickness = thickness;
      node.flags.set(NodeFlags::COORD_VALID, true);
    }
  }

  #[inline]
  pub fn id(&self) -> TileId {
    self.id
  }

  #[inline]
  pub fn space(&self) -> &TriangleIndexSpace {
    &self.space
  }

  #[inline]
  pub fn is_mirror(&self) -> bool {
    self.mirror
  }

  /// Global `(row, col)` of local `(0,0)`.
  #[inline]
  pub fn offset(&self) -> (u32, u32) {
    (self.row_offset, self.col_offset)
  }

  #[inline]
  pub fn neighbours(&self) -> TileNeighbours {
    self.neighbours
  }

  pub(crate) fn set_neighbours(&mut self, neighbours: TileNeighbours) {
    self.neighbours = neighbours;
  }

  /// Visibility of the root from the last update.
  #[inline]
  pub fn tree_visibility(&self) -> VisMask {
    self.tree_vis
  }

  #[inline]
  pub fn node(&self, i: TriIndex) -> &TriangleNode {
    &self.nodes[i as usize]
  }

  pub(crate) fn node_mut(&mut self, i: TriIndex) -> &mut TriangleNode {
    &mut self.nodes[i as usize]
  }

  #[inline]
  pub fn is_active(&self, i: TriIndex) -> bool {
    self.nodes[i as usize].is_active()
  }

  /// Where `i` sits relative to the active frontier.
  pub fn state(&self, i: TriIndex) -> NodeState {
    if self.is_active(i) {
      return NodeState::Active;
    }
    let mut p = TriangleIndexSpace::parent(i);
    while p >= 1 {
      if self.is_active(p) {
        return NodeState::Merged;
      }
      p = TriangleIndexSpace::parent(p);
    }
    NodeState::Split
  }

  /// Hypotenuse neighbour as `(tile, index)`, `None` at the mesh border.
  pub fn neighbour(&self, i: TriIndex) -> Option<(TileId, TriIndex)> {
    let j = self.space.neighbour(i)?;
    let tile = match self.space.edge(i) {
      Edge::Inner => Some(self.id),
      Edge::Top => self.neighbours.top,
      Edge::Left => self.neighbours.left,
      Edge::Diagonal => self.neighbours.diagonal,
    }?;
    Some((tile, j))
  }

  #[inline]
  pub fn global_row(&self, i: TriIndex) -> u32 {
    let r = self.space.row(i);
    if self.mirror {
      self.row_offset - r
    } else {
      self.row_offset + r
    }
  }

  #[inline]
  pub fn global_col(&self, i: TriIndex) -> u32 {
    let c = self.space.col(i);
    if self.mirror {
      self.col_offset - c
    } else {
      self.col_offset + c
    }
  }

  /// World position of vertex index `i` (`x = row`, `z = col`).
  #[inline]
  pub fn vertex(&self, i: TriIndex) -> Vec3 {
    Vec3::new(
      self.global_row(i) as f32,
      self.nodes[i as usize].height,
      self.global_col(i) as f32,
    )
  }

  /// Texture coordinate of vertex `i` over a mesh spanning `extent` grid units.
  #[inline]
  pub fn texture_coord(&self, i: TriIndex, extent: Vec2) -> Vec2 {
    Vec2::new(self.global_row(i) as f32, self.global_col(i) as f32) / extent.max(Vec2::ONE)
  }

  /// XZ midpoint of `i`'s hypotenuse.
  #[inline]
  pub fn center(&self, i: TriIndex) -> Vec2 {
    Vec2::new(self.global_row(i) as f32, self.global_col(i) as f32)
  }

  /// Box around triangle `i` and everything beneath it.
  pub fn bounds(&self, i: TriIndex) -> Aabb3 {
    let corners = self.space.vertices(i).map(|v| self.vertex(v));
    let node = &self.nodes[i as usize];
    Aabb3::from_footprint(&corners, node.min_height, node.max_height)
  }

  /// Height at the local grid point, `None` outside the tile.
  pub fn height(&self, row: u32, col: u32) -> Option<f32> {
    self
      .space
      .lookup(row, col)
      .map(|i| self.nodes[i as usize].height)
  }

  /// Interpolated height at a local position, `None` outside the tile.
  ///
  /// Unit cells are split along the anti-diagonal, which never crosses the
  /// tile's own diagonal edge.
  pub fn height_at(&self, row: f32, col: f32) -> Option<f32> {
    let size = self.space.size();
    if row < 0.0 || col < 0.0 || row + col > size as f32 {
      return None;
    }
    let r0 = (row.floor() as u32).min(size - 1);
    let c0 = (col.floor() as u32).min(size - 1);
    if r0 + c0 >= size {
      // Grid point on the diagonal edge.
      return self.height(r0, c0);
    }
    let (dx, dz) = (row - r0 as f32, col - c0 as f32);
    if dx + dz <= 1.0 {
      let h00 = self.height(r0, c0)?;
      let h10 = self.height(r0 + 1, c0)?;
      let h01 = self.height(r0, c0 + 1)?;
      Some(h00 + dx * (h10 - h00) + dz * (h01 - h00))
    } else {
      let h11 = self.height(r0 + 1, c0 + 1)?;
      let h10 = self.height(r0 + 1, c0)?;
      let h01 = self.height(r0, c0 + 1)?;
      Some(h11 + (1.0 - dx) * (h01 - h11) + (1.0 - dz) * (h10 - h11))
    }
  }

  /// First triangle under `i` crossed by the segment `p1..p2`.
  ///
  /// Descends `depth` levels and tests the flat triangle where it stops, so
  /// a depth of 1 tests `i` itself; 0 descends to the leaves. Subtrees whose
  /// wedge box misses the segment are skipped.
  pub fn ray_test(&self, p1: Vec3, p2: Vec3, i: TriIndex, depth: u32) -> Option<TriIndex> {
    self.ray_cast(p1, p2, i, depth, f32::INFINITY).map(|(hit, _)| hit)
  }

  /// Nearest crossing under `i` no farther than `limit` along the segment,
  /// as the triangle and its segment parameter.
  pub(crate) fn ray_cast(
    &self,
    p1: Vec3,
    p2: Vec3,
    i: TriIndex,
    depth: u32,
    limit: f32,
  ) -> Option<(TriIndex, f32)> {
    let (enter, _) = self.bounds(i).segment_overlap(p1, p2, RAY_EPSILON)?;
    if enter > limit {
      return None;
    }
    if depth == 1 || self.space.is_leaf(i) {
      let [a, b, c] = self.space.vertices(i).map(|v| self.vertex(v));
      return segment_triangle(p1, p2, a, b, c)
        .filter(|&t| t <= limit)
        .map(|t| (i, t));
    }

    let depth = depth.saturating_sub(1);
    let mut best = None;
    let mut limit = limit;
    for child in [TriangleIndexSpace::right(i), TriangleIndexSpace::left(i)] {
      if let Some(hit) = self.ray_cast(p1, p2, child, depth, limit) {
        limit = hit.1;
        best = Some(hit);
      }
    }
    best
  }

  /// Overwrite the height at a local grid point and refresh the wedges.
  ///
  /// Returns false when the point is outside the tile.
  pub fn set_height(&mut self, row: u32, col: u32, height: f32) -> bool {
    if self.space.lookup(row, col).is_none() {
      return false;
    }
    for i in 0..self.space.len() as TriIndex {
      if self.space.row(i) == row && self.space.col(i) == col {
        self.nodes[i as usize].height = height;
      }
    }
    self.invalidate_point(row, col);
    self.refresh_bounds();
    true
  }

  /// Clear `COORD_VALID` on every triangle touching the local grid point,
  /// and on their ancestors.
  pub(crate) fn invalidate_point(&mut self, row: u32, col: u32) {
    let space = Arc::clone(&self.space);
    let at = |v: TriIndex| space.row(v) == row && space.col(v) == col;
    for i in 1..space.tri_count() {
      if !at(i) && !space.vertices(i).into_iter().any(at) {
        continue;
      }
      let mut p = i;
      while p >= 1 && self.nodes[p as usize].flags.contains(NodeFlags::COORD_VALID) {
        self.nodes[p as usize].flags.set(NodeFlags::COORD_VALID, false);
        p = TriangleIndexSpace::parent(p);
      }
    }
  }

  // ===========================================================================
  // Visibility and priority
  // ===========================================================================

  /// Classify triangle `i`, inheriting a settled parent result.
  pub fn classify(&self, i: TriIndex, parent: VisMask, ctx: &ViewContext, stats: &mut TerrainStats) -> VisMask {
    if parent.is_settled() {
      return parent;
    }
    stats.visibility_tests += 1;
    let aabb = self.bounds(i);
    let mut mask = parent;
    if mask.needs_far_test() {
      let p = ctx.position;
      let near = Vec2::new(
        (aabb.min.x - p.x).max(p.x - aabb.max.x).max(0.0),
        (aabb.min.z - p.y).max(p.y - aabb.max.z).max(0.0),
      );
      let far_sq = ctx.far_clip * ctx.far_clip;
      if near.length_squared() > far_sq {
        return VisMask::OUT;
      }
      let far = Vec2::new(
        (p.x - aabb.min.x).abs().max((p.x - aabb.max.x).abs()),
        (p.y - aabb.min.z).abs().max((p.y - aabb.max.z).abs()),
      );
      if far.length_squared() <= far_sq {
        mask = mask.without_far();
      }
    }
    ctx.frustum.classify(&aabb, mask)
  }

  /// Raw split priority of `i`: thickness scaled by depth along the view.
  pub fn priority_calc(&self, i: TriIndex, ctx: &ViewContext) -> f32 {
    let thickness = self.nodes[i as usize].thickness;
    if thickness <= 0.0 {
      return 0.0;
    }
    let offset = self.center(i) - ctx.position;
    let depth = (2.0 * ctx.far_clip - ctx.forward.dot(offset)).max(ctx.near_clip);
    thickness * ctx.variance_scale * depth
  }

  /// Priority `i` would hold in the split queue under visibility `vis`,
  /// as `(bucket, raw)`.
  pub fn candidate_priority(
    &self,
    i: TriIndex,
    vis: VisMask,
    ctx: &ViewContext,
    stats: &mut TerrainStats,
  ) -> (u16, f32) {
    if !vis.is_visible() || self.space.is_leaf(i) {
      return (0, 0.0);
    }
    stats.priority_evaluations += 1;
    let raw = self.priority_calc(i, ctx);
    (quantize_priority(raw), raw)
  }

  /// Ticks a culled triangle may skip: one per tile edge past the far clip.
  fn cull_delay(&self, i: TriIndex, ctx: &ViewContext) -> u32 {
    let excess = self.center(i).distance(ctx.position) - ctx.far_clip;
    if excess <= 0.0 || ctx.tile_size <= 0.0 {
      return 0;
    }
    (excess / ctx.tile_size) as u32
  }

  /// Refresh visibility down to the active frontier under `i`.
  ///
  /// Inner nodes store their classification as a cache; active triangles
  /// update the visible count. Culled far-away triangles get a delay
  /// countdown and are skipped until it drains.
  pub(crate) fn compute_visibility(
    &mut self,
    i: TriIndex,
    parent: VisMask,
    ctx: &ViewContext,
    q: &mut MeshQueues,
    stats: &mut TerrainStats,
  ) {
    let node = self.nodes[i as usize];
    if node.is_active() {
      let delay = node.flags.delay() as u32;
      if delay > ctx.elapsed_ticks && !ctx.reset_delays {
        self.nodes[i as usize].flags.set_delay(delay - ctx.elapsed_ticks);
        return;
      }
      let vis = self.classify(i, parent, ctx, stats);
      match (node.vis.is_visible(), vis.is_visible()) {
        (false, true) => q.visible += 1,
        (true, false) => q.visible -= 1,
        _ => {}
      }
      let delay = if vis.is_visible() { 0 } else { self.cull_delay(i, ctx) };
      let n = &mut self.nodes[i as usize];
      n.vis = vis;
      n.flags.set_delay(delay);
      if i == 1 {
        self.tree_vis = vis;
      }
      return;
    }
    debug_assert!(!self.space.is_leaf(i), "inactive leaf {i} reached from the root");
    let vis = self.classify(i, parent, ctx, stats);
    self.nodes[i as usize].vis = vis;
    if i == 1 {
      self.tree_vis = vis;
    }
    self.compute_visibility(TriangleIndexSpace::right(i), vis, ctx, q, stats);
    self.compute_visibility(TriangleIndexSpace::left(i), vis, ctx, q, stats);
  }

  /// Refresh split priorities of the active triangles under `i`, moving
  /// their split-queue entries.
  pub(crate) fn compute_priority(
    &mut self,
    i: TriIndex,
    ctx: &ViewContext,
    q: &mut MeshQueues,
    stats: &mut TerrainStats,
  ) {
    let node = self.nodes[i as usize];
    if !node.is_active() {
      if !self.space.is_leaf(i) {
        self.compute_priority(TriangleIndexSpace::right(i), ctx, q, stats);
        self.compute_priority(TriangleIndexSpace::left(i), ctx, q, stats);
      }
      return;
    }
    let (priority, raw) = self.candidate_priority(i, node.vis, ctx, stats);
    if priority == node.priority && node.split_slot.is_some() == (priority > 0) {
      return;
    }
    let slot = match (node.split_slot, priority > 0) {
      (Some(slot), true) => {
        q.split.move_to(slot, priority, raw);
        stats.queue_moves += 1;
        Some(slot)
      }
      (Some(slot), false) => {
        q.split.remove(slot);
        stats.queue_removals += 1;
        None
      }
      (None, true) => {
        stats.queue_inserts += 1;
        Some(q.split.insert(priority, QueueKey::new(self.id, i), raw))
      }
      (None, false) => None,
    };
    let n = &mut self.nodes[i as usize];
    n.priority = priority;
    n.set_split_slot(slot);
  }

  // ===========================================================================
  // Activation
  // ===========================================================================

  /// Make `i` an active leaf.
  ///
  /// `parent_priority` caps the new priority strictly below the splitting
  /// parent's; `slot` hands over the parent's cache slot when given.
  #[allow(clippy::too_many_arguments)]
  pub(crate) fn activate(
    &mut self,
    i: TriIndex,
    parent_priority: Option<u16>,
    slot: Option<CacheSlot>,
    parent_vis: VisMask,
    ctx: &ViewContext,
    q: &mut MeshQueues,
    stats: &mut TerrainStats,
  ) {
    assert!(!self.is_active(i), "triangle {i} of {:?} already active", self.id);
    let vis = self.classify(i, parent_vis, ctx, stats);
    let (mut priority, raw) = self.candidate_priority(i, vis, ctx, stats);
    if let Some(cap) = parent_priority.filter(|&cap| cap > 0) {
      priority = priority.min(cap - 1);
    }

    let slot = slot.unwrap_or_else(|| q.cache.alloc());
    q.active += 1;
    if vis.is_visible() {
      q.visible += 1;
    }
    stats.triangles_produced += 1;
    let split_slot = (priority > 0).then(|| {
      stats.queue_inserts += 1;
      q.split.insert(priority, QueueKey::new(self.id, i), raw)
    });

    let node = &mut self.nodes[i as usize];
    debug_assert!(node.merge_slot.is_none());
    node.cache_slot = Some(slot);
    node.vis = vis;
    node.priority = priority;
    node.set_split_slot(split_slot);
    node.flags.set(NodeFlags::IN_VERTEX_BUFFER, false);
    node.flags.set_delay(0);
    if i == 1 {
      self.tree_vis = vis;
    }
  }

  /// Remove `i` from the active set, returning its cache slot.
  ///
  /// # Panics
  /// If `i` is not active or still belongs to a merge diamond.
  pub(crate) fn deactivate(&mut self, i: TriIndex, q: &mut MeshQueues, stats: &mut TerrainStats) -> CacheSlot {
    let node = &mut self.nodes[i as usize];
    let Some(slot) = node.cache_slot.take() else {
      panic!("triangle {i} of {:?} is not active", self.id);
    };
    assert!(node.merge_slot.is_none(), "triangle {i} still in the merge queue");
    q.active -= 1;
    if node.vis.is_visible() {
      q.visible -= 1;
    }
    if let Some(split) = node.split_slot {
      q.split.remove(split);
      stats.queue_removals += 1;
    }
    node.set_split_slot(None);
    node.flags.set(NodeFlags::IN_VERTEX_BUFFER, false);
    slot
  }
}

/// Slack for segments touching a shared edge or grazing a box face.
const RAY_EPSILON: f32 = 1e-4;

/// Segment parameter where `p1..p2` crosses triangle `abc`, if it does.
///
/// Segments lying in the triangle's plane never count as crossing it.
fn segment_triangle(p1: Vec3, p2: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
  let d = p2 - p1;
  let (e1, e2) = (b - a, c - a);
  let h = d.cross(e2);
  let det = e1.dot(h);
  if det.abs() <= f32::EPSILON {
    return None;
  }
  let inv = 1.0 / det;
  let s = p1 - a;
  let u = s.dot(h) * inv;
  if !(-RAY_EPSILON..=1.0 + RAY_EPSILON).contains(&u) {
    return None;
  }
  let q = s.cross(e1);
  let v = d.dot(q) * inv;
  if v < -RAY_EPSILON || u + v > 1.0 + RAY_EPSILON {
    return None;
  }
  let t = e2.dot(q) * inv;
  (0.0..=1.0).contains(&t).then_some(t)
}

#[cfg(test)]
#[path = "tile_test.rs"]
mod tile_test;
