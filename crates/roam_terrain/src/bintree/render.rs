//! Renderer-facing view of the active frontier.
//!
//! After [`BinTreeMesh::update_frame`] the renderer walks the active, visible
//! triangles. Each carries its cache slot so vertex data can be kept in a
//! persistent buffer; [`BinTreeMesh::pending_uploads`] lists only triangles
//! the renderer has not consumed yet.

use glam::{Vec2, Vec3};
use smallvec::SmallVec;

use super::cache::CacheSlot;
use super::index::{TriIndex, TriangleIndexSpace};
use super::mesh::BinTreeMesh;
use super::node::NodeFlags;
use super::tile::{BinTreeTile, TileId};

/// One corner of a rendered triangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderVertex {
  pub position: Vec3,
  pub uv: Vec2,
}

/// An active, visible triangle ready for submission.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderTriangle {
  pub tile: TileId,
  pub index: TriIndex,
  /// Vertex buffer slot owned while the triangle stays active.
  pub slot: CacheSlot,
  /// Apex, then the hypotenuse ends.
  pub vertices: [RenderVertex; 3],
}

/// Depth-first walk over the active frontier of every tile.
///
/// Borrowing the mesh ties the sequence to the current frame.
pub struct ActiveTriangles<'a> {
  mesh: &'a BinTreeMesh,
  extent: Vec2,
  tile: usize,
  stack: SmallVec<[TriIndex; 32]>,
  pending_only: bool,
}

impl<'a> ActiveTriangles<'a> {
  fn new(mesh: &'a BinTreeMesh, pending_only: bool) -> Self {
    let mut stack = SmallVec::new();
    if !mesh.tiles.is_empty() {
      stack.push(1);
    }
    Self {
      mesh,
      extent: mesh.extent(),
      tile: 0,
      stack,
      pending_only,
    }
  }

  fn emit(&self, tile: &BinTreeTile, i: TriIndex, slot: CacheSlot) -> RenderTriangle {
    let vertices = tile.space().vertices(i).map(|v| RenderVertex {
      position: tile.vertex(v),
      uv: tile.texture_coord(v, self.extent),
    });
    RenderTriangle {
      tile: tile.id(),
      index: i,
      slot,
      vertices,
    }
  }
}

impl Iterator for ActiveTriangles<'_> {
  type Item = RenderTriangle;

  fn next(&mut self) -> Option<RenderTriangle> {
    loop {
      let Some(i) = self.stack.pop() else {
        self.tile += 1;
        if self.tile >= self.mesh.tiles.len() {
          return None;
        }
        self.stack.push(1);
        continue;
      };
      let tile = &self.mesh.tiles[self.tile];
      let node = tile.node(i);
      if let Some(slot) = node.cache_slot() {
        let uploaded = node.flags().contains(NodeFlags::IN_VERTEX_BUFFER);
        if node.visibility().is_visible() && !(self.pending_only && uploaded) {
          return Some(self.emit(tile, i, slot));
        }
        continue;
      }
      if !tile.space().is_leaf(i) {
        self.stack.push(TriangleIndexSpace::left(i));
        self.stack.push(TriangleIndexSpace::right(i));
      }
    }
  }
}

impl BinTreeMesh {
  /// Every active, visible triangle, tile by tile.
  pub fn active_triangles(&self) -> ActiveTriangles<'_> {
    ActiveTriangles::new(self, false)
  }

  /// Active, visible triangles not yet marked uploaded.
  pub fn pending_uploads(&self) -> ActiveTriangles<'_> {
    ActiveTriangles::new(self, true)
  }

  /// Record that the renderer holds the vertex data of `(tile, i)`.
  ///
  /// Returns false when the triangle is not active. The mark is dropped
  /// again when the triangle leaves the frontier.
  pub fn mark_uploaded(&mut self, tile: TileId, i: TriIndex) -> bool {
    let node = self.tiles[tile.index()].node_mut(i);
    if !node.is_active() {
      return false;
    }
    node.flags.set(NodeFlags::IN_VERTEX_BUFFER, true);
    true
  }
}
