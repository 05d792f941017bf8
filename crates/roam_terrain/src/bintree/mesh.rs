//! BinTreeMesh - the grid of tile pairs covering a height field.
//!
//! Each grid cell of `N x N` height samples is cut along its anti-diagonal
//! into a normal tile (upper-left half) and a mirror tile (lower-right half).
//! The mesh owns every tile, the shared split and merge queues and the
//! per-frame view state; balancing lives in [`super::balance`].

use std::sync::Arc;

use glam::{Vec2, Vec3};
use rayon::prelude::*;

use super::budget::TerrainStats;
use super::config::TerrainConfig;
use super::index::{TriIndex, TriangleIndexSpace};
use super::queue::PRIORITY_RESOLUTION;
use super::tile::{BinTreeTile, MeshQueues, TileId, TileNeighbours, ViewContext};
use crate::camera::Camera;
use crate::error::{Error, Result};
use crate::height::HeightField;
use crate::metrics::TerrainMetrics;

/// Where a segment first meets the terrain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
  pub tile: TileId,
  /// Leaf triangle crossed.
  pub index: TriIndex,
  /// Segment parameter of the crossing, `0` at the start.
  pub t: f32,
  pub point: Vec3,
}

/// A continuous-LOD terrain mesh over a height field.
#[derive(Debug)]
pub struct BinTreeMesh {
  pub(super) config: TerrainConfig,
  pub(super) space: Arc<TriangleIndexSpace>,
  pub(super) tiles: Vec<BinTreeTile>,
  pub(super) cell_rows: u32,
  pub(super) cell_cols: u32,
  pub(super) abs_min: f32,
  pub(super) abs_max: f32,
  pub(super) queues: MeshQueues,
  pub(super) view: ViewContext,
  /// Camera of the last update that ran.
  pub(super) last_camera: Option<Camera>,
  /// Position at the last priority-delay reset.
  pub(super) anchor: Option<Vec2>,
  pub(super) converged: bool,
  pub(super) merge_enabled: bool,
  pub(super) frames: u64,
  pub(super) metrics: TerrainMetrics,
}

impl BinTreeMesh {
  /// Build the tile grid for `field` and activate every tile root.
  ///
  /// The grid covers `(rows - 1) / N` by `(cols - 1) / N` cells; samples past
  /// the last full cell are ignored.
  #[tracing::instrument(skip_all, fields(tile_size = config.tile_size))]
  pub fn build<F>(field: &F, config: TerrainConfig) -> Result<Self>
  where
    F: HeightField + Sync + ?Sized,
  {
    config.validate()?;
    let n = config.tile_size;
    let (rows, cols) = (field.rows(), field.cols());
    if rows <= n || cols <= n {
      return Err(Error::HeightFieldTooSmall {
        rows,
        cols,
        tile_size: n,
      });
    }
    let (cell_rows, cell_cols) = ((rows - 1) / n, (cols - 1) / n);
    let space = Arc::new(TriangleIndexSpace::build(n)?);

    let count = 2 * cell_rows as usize * cell_cols as usize;
    let mut tiles = Vec::new();
    tiles
      .try_reserve_exact(count)
      .map_err(|_| Error::OutOfMemory { what: "tiles", count })?;
    for r in 0..cell_rows {
      for c in 0..cell_cols {
        let id = 2 * (r * cell_cols + c);
        tiles.push(BinTreeTile::new(TileId::from_raw(id), Arc::clone(&space), r * n, c * n, false)?);
        tiles.push(BinTreeTile::new(
          TileId::from_raw(id + 1),
          Arc::clone(&space),
          (r + 1) * n,
          (c + 1) * n,
          true,
        )?);
      }
    }
    tiles.par_iter_mut().try_for_each(|tile| tile.init(field))?;

    let mut mesh = Self {
      view: ViewContext::new(&Camera::unbounded(Vec3::ZERO, Vec3::X), &config, 1.0),
      config,
      space,
      tiles,
      cell_rows,
      cell_cols,
      abs_min: 0.0,
      abs_max: 0.0,
      queues: MeshQueues::new(),
      last_camera: None,
      anchor: None,
      converged: false,
      merge_enabled: false,
      frames: 0,
      metrics: TerrainMetrics::new(),
    };
    mesh.wire_neighbours();
    mesh.refresh_height_range();

    let extent = mesh.extent();
    let centre = Vec3::new(extent.x * 0.5, mesh.abs_max, extent.y * 0.5);
    mesh.view = ViewContext::new(
      &Camera::unbounded(centre, Vec3::X),
      &mesh.config,
      mesh.view.variance_scale,
    );
    let mut stats = TerrainStats::default();
    let full = mesh.view.full_mask();
    for tile in &mut mesh.tiles {
      tile.activate(1, None, None, full, &mesh.view, &mut mesh.queues, &mut stats);
    }

    tracing::debug!(
      cells = cell_rows * cell_cols,
      tiles = mesh.tiles.len(),
      min_height = mesh.abs_min,
      max_height = mesh.abs_max,
      "built terrain mesh"
    );
    Ok(mesh)
  }

  /// Tile id of the normal (`mirror == false`) or mirror half of a cell.
  #[inline]
  pub fn cell_tile(&self, row: u32, col: u32, mirror: bool) -> TileId {
    TileId::from_raw(2 * (row * self.cell_cols + col) + mirror as u32)
  }

  fn wire_neighbours(&mut self) {
    let (nr, nc) = (self.cell_rows, self.cell_cols);
    for r in 0..nr {
      for c in 0..nc {
        let normal = TileNeighbours {
          top: (r > 0).then(|| self.cell_tile(r - 1, c, true)),
          left: (c > 0).then(|| self.cell_tile(r, c - 1, true)),
          diagonal: Some(self.cell_tile(r, c, true)),
        };
        let mirror = TileNeighbours {
          top: (r + 1 < nr).then(|| self.cell_tile(r + 1, c, false)),
          left: (c + 1 < nc).then(|| self.cell_tile(r, c + 1, false)),
          diagonal: Some(self.cell_tile(r, c, false)),
        };
        let id = self.cell_tile(r, c, false).index();
        self.tiles[id].set_neighbours(normal);
        self.tiles[id + 1].set_neighbours(mirror);
      }
    }
  }

  /// Recompute the absolute height range and the priority scale from it.
  pub(super) fn refresh_height_range(&mut self) {
    let (lo, hi) = self.tiles.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), tile| {
      let root = tile.node(1);
      (lo.min(root.min_height()), hi.max(root.max_height()))
    });
    self.abs_min = lo;
    self.abs_max = hi;
    self.view.variance_scale = self
      .config
      .variance_scale(self.abs_max_error(), PRIORITY_RESOLUTION);
  }

  // ===========================================================================
  // Accessors
  // ===========================================================================

  #[inline]
  pub fn config(&self) -> &TerrainConfig {
    &self.config
  }

  /// Index space shared by every tile.
  #[inline]
  pub fn index_space(&self) -> &TriangleIndexSpace {
    &self.space
  }

  #[inline]
  pub fn tiles(&self) -> &[BinTreeTile] {
    &self.tiles
  }

  #[inline]
  pub fn tile(&self, id: TileId) -> &BinTreeTile {
    &self.tiles[id.index()]
  }

  /// Grid cells as `(rows, cols)`.
  #[inline]
  pub fn cells(&self) -> (u32, u32) {
    (self.cell_rows, self.cell_cols)
  }

  /// Covered area in grid units along `(x, z)`.
  #[inline]
  pub fn extent(&self) -> Vec2 {
    let n = self.config.tile_size as f32;
    Vec2::new(self.cell_rows as f32 * n, self.cell_cols as f32 * n)
  }

  /// Lowest and highest world height over the mesh.
  #[inline]
  pub fn height_range(&self) -> (f32, f32) {
    (self.abs_min, self.abs_max)
  }

  #[inline]
  pub fn abs_max_error(&self) -> f32 {
    self.abs_max - self.abs_min
  }

  /// Active triangles, visible or not.
  #[inline]
  pub fn active_count(&self) -> usize {
    self.queues.active
  }

  /// Active triangles that passed the last visibility test.
  #[inline]
  pub fn visible_count(&self) -> usize {
    self.queues.visible
  }

  #[inline]
  pub fn split_queue_len(&self) -> usize {
    self.queues.split.len()
  }

  #[inline]
  pub fn merge_queue_len(&self) -> usize {
    self.queues.merge.len()
  }

  /// Render cache slots currently handed out.
  #[inline]
  pub fn cache_slots_in_use(&self) -> usize {
    self.queues.cache.in_use()
  }

  /// Whether the last update ran to convergence.
  #[inline]
  pub fn is_converged(&self) -> bool {
    self.converged
  }

  #[inline]
  pub fn merge_enabled(&self) -> bool {
    self.merge_enabled
  }

  #[inline]
  pub fn metrics(&self) -> &TerrainMetrics {
    &self.metrics
  }

  // ===========================================================================
  // Heights
  // ===========================================================================

  /// Interpolated world height at `(x, z)`; `0.0` outside the mesh.
  pub fn height(&self, x: f32, z: f32) -> f32 {
    let extent = self.extent();
    if !(x >= 0.0 && z >= 0.0 && x <= extent.x && z <= extent.y) {
      return 0.0;
    }
    let n = self.config.tile_size as f32;
    let r = ((x / n) as u32).min(self.cell_rows - 1);
    let c = ((z / n) as u32).min(self.cell_cols - 1);
    let (fx, fz) = (x - r as f32 * n, z - c as f32 * n);
    let height = if fx + fz <= n {
      self.tile(self.cell_tile(r, c, false)).height_at(fx, fz)
    } else {
      self.tile(self.cell_tile(r, c, true)).height_at(n - fx, n - fz)
    };
    height.unwrap_or(0.0)
  }

  /// Overwrite the world height of global grid point `(row, col)`.
  ///
  /// Every tile sharing the point is updated and re-bounded; the next
  /// [`update_frame`](Self::update_frame) re-evaluates priorities. Returns
  /// false when the point is outside the mesh.
  pub fn set_height(&mut self, row: u32, col: u32, height: f32) -> bool {
    let mut hit = false;
    for tile in &mut self.tiles {
      let (ro, co) = tile.offset();
      let local = if tile.is_mirror() {
        ro.checked_sub(row).zip(co.checked_sub(col))
      } else {
        row.checked_sub(ro).zip(col.checked_sub(co))
      };
      if let Some((lr, lc)) = local {
        hit |= tile.set_height(lr, lc, height);
      }
    }
    if hit {
      self.refresh_height_range();
      self.last_camera = None;
      self.converged = false;
      tracing::trace!(row, col, height, "height edited");
    }
    hit
  }

  /// Nearest crossing of the segment `p1..p2` with the full-detail surface.
  pub fn ray_test(&self, p1: Vec3, p2: Vec3) -> Option<RayHit> {
    let mut best: Option<RayHit> = None;
    for tile in &self.tiles {
      let limit = best.map_or(f32::INFINITY, |hit| hit.t);
      if let Some((index, t)) = tile.ray_cast(p1, p2, 1, 0, limit) {
        best = Some(RayHit {
          tile: tile.id(),
          index,
          t,
          point: p1.lerp(p2, t),
        });
      }
    }
    best
  }

  /// Owning tile and local index of the grid point `(row, col)`.
  pub fn locate(&self, row: u32, col: u32) -> Option<(TileId, TriIndex)> {
    let n = self.config.tile_size;
    let r = (row / n).min(self.cell_rows - 1);
    let c = (col / n).min(self.cell_cols - 1);
    let (lr, lc) = (row - r * n, col - c * n);
    if lr + lc <= n {
      let id = self.cell_tile(r, c, false);
      return self.tile(id).space().lookup(lr, lc).map(|i| (id, i));
    }
    let id = self.cell_tile(r, c, true);
    self
      .tile(id)
      .space()
      .lookup(n.checked_sub(lr)?, n.checked_sub(lc)?)
      .map(|i| (id, i))
  }
}

#[cfg(test)]
#[path = "mesh_test.rs"]
mod mesh_test;
