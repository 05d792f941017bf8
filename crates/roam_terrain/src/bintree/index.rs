//! Static triangle addressing shared by every tile of one edge size.
//!
//! A tile is the right isosceles triangle with corners at local `(row, col)`
//! `(0,0)`, `(0,N)` and `(N,0)`. Its binary triangle tree is addressed by a
//! 1-based index: the root is `1`, `right(i) = 2i`, `left(i) = 2i + 1`.
//!
//! Every tree triangle is identified with the midpoint of its hypotenuse,
//! which is always a grid point. The three tile corners take the indices
//! left over at the ends of the range:
//!
//! ```text
//!   0 (0,0) ---------- triNo (0,N)
//!     |  \     TOP      /
//!     |    \          /
//!   LEFT     1 (N/2,N/2)
//!     |    /   DIAG
//!     |  /
//!   triNo+1 (N,0)
//! ```
//!
//! Triangle `i` has its right angle at vertex `parent(i)` and its hypotenuse
//! between `v0(i)` and `v1(i)`. Splitting `i` at its midpoint produces
//! `right(i) = (apex i, v0 = parent(i), v1 = v0(i))` and
//! `left(i) = (apex i, v0 = v1(i), v1 = parent(i))`, both keeping the winding
//! of `i`.
//!
//! The hypotenuse neighbour of a triangle is the same-level triangle on the
//! other side of its long edge. For edges on the tile boundary that triangle
//! lives in the adjacent tile, at the index given by the boundary mapping of
//! [`Edge`].

use crate::error::{try_alloc, Error, Result};

/// Index of a vertex or triangle within one tile.
pub type TriIndex = u32;

const NO_INDEX: TriIndex = TriIndex::MAX;

/// Which tile boundary, if any, a triangle's hypotenuse lies on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Edge {
  /// Hypotenuse inside the tile; neighbour shares the midpoint.
  #[default]
  Inner,
  /// `row == 0`; neighbour at `(0, N - col)` in the top tile.
  Top,
  /// `col == 0`; neighbour at `(N - row, 0)` in the left tile.
  Left,
  /// `row + col == N`; neighbour at `(col, row)` in the mirrored twin.
  Diagonal,
}

#[derive(Clone, Copy, Debug, Default)]
struct IndexEntry {
  row: u32,
  col: u32,
  v0: TriIndex,
  v1: TriIndex,
  neighbour: TriIndex,
  edge: Edge,
}

/// Precomputed geometry for every index of an `N`-edge tile.
#[derive(Debug)]
pub struct TriangleIndexSpace {
  size: u32,
  tri_count: u32,
  max_level: u32,
  entries: Vec<IndexEntry>,
  lookup: Vec<TriIndex>,
}

impl TriangleIndexSpace {
  /// Smallest supported tile edge.
  pub const MIN_SIZE: u32 = 2;
  /// Largest supported tile edge.
  pub const MAX_SIZE: u32 = 1024;

  /// Whether `size` can be used as a tile edge.
  pub fn is_valid_size(size: u32) -> bool {
    size.is_power_of_two() && (Self::MIN_SIZE..=Self::MAX_SIZE).contains(&size)
  }

  /// Build the index space for tiles of edge `size`.
  ///
  /// # Panics
  /// If the computed neighbour relation is not symmetric.
  pub fn build(size: u32) -> Result<Self> {
    if !Self::is_valid_size(size) {
      return Err(Error::InvalidTileSize(size));
    }
    let tri_count = size * size;
    let max_level = 2 * size.trailing_zeros() - 1;
    let mut entries = try_alloc("index space", tri_count as usize + 2, IndexEntry::default())?;

    entries[tri_count as usize].col = size;
    entries[tri_count as usize + 1].row = size;
    entries[1].v0 = tri_count + 1;
    entries[1].v1 = tri_count;

    for i in 1..tri_count {
      if i > 1 {
        let p = Self::parent(i);
        let apex = Self::parent(p);
        let parent = entries[p as usize];
        let (v0, v1) = if i % 2 == 0 {
          (apex, parent.v0)
        } else {
          (parent.v1, apex)
        };
        entries[i as usize].v0 = v0;
        entries[i as usize].v1 = v1;
      }
      let entry = entries[i as usize];
      let (a, b) = (entries[entry.v0 as usize], entries[entry.v1 as usize]);
      debug_assert!((a.row + b.row) % 2 == 0 && (a.col + b.col) % 2 == 0);
      let (row, col) = ((a.row + b.row) / 2, (a.col + b.col) / 2);

      let e = &mut entries[i as usize];
      e.row = row;
      e.col = col;
      e.edge = if row == 0 {
        Edge::Top
      } else if col == 0 {
        Edge::Left
      } else if row + col == size {
        Edge::Diagonal
      } else {
        Edge::Inner
      };
    }

    let stride = size as usize + 1;
    let mut lookup = try_alloc("index lookup", stride * stride, NO_INDEX)?;
    for i in (1..tri_count).chain([0, tri_count, tri_count + 1]) {
      let e = entries[i as usize];
      let cell = &mut lookup[e.row as usize * stride + e.col as usize];
      if *cell == NO_INDEX {
        *cell = i;
      }
    }

    let mut space = Self {
      size,
      tri_count,
      max_level,
      entries,
      lookup,
    };
    space.link_neighbours()?;
    Ok(space)
  }

  /// Resolve hypotenuse neighbours one tree level at a time.
  fn link_neighbours(&mut self) -> Result<()> {
    let size = self.size;
    let stride = size as usize + 1;
    let mut level_table = try_alloc("neighbour table", stride * stride, NO_INDEX)?;
    let cell = |row: u32, col: u32| row as usize * stride + col as usize;

    for level in 0..=self.max_level {
      let range = (1u32 << level)..(1u32 << (level + 1));

      for i in range.clone() {
        let e = self.entries[i as usize];
        let slot = &mut level_table[cell(e.row, e.col)];
        if *slot == NO_INDEX {
          *slot = i;
          continue;
        }
        let other = *slot;
        assert!(
          e.edge == Edge::Inner && self.entries[other as usize].edge == Edge::Inner,
          "triangles {other} and {i} share a boundary midpoint"
        );
        self.entries[i as usize].neighbour = other;
        self.entries[other as usize].neighbour = i;
      }

      for i in range.clone() {
        let e = self.entries[i as usize];
        let target = match e.edge {
          Edge::Inner => {
            assert!(e.neighbour != 0, "inner triangle {i} has no partner");
            continue;
          }
          Edge::Top => cell(0, size - e.col),
          Edge::Left => cell(size - e.row, 0),
          Edge::Diagonal => cell(e.col, e.row),
        };
        let j = level_table[target];
        assert!(j != NO_INDEX, "boundary triangle {i} has no mirror at level {level}");
        self.entries[i as usize].neighbour = j;
      }

      for i in range {
        let e = self.entries[i as usize];
        level_table[cell(e.row, e.col)] = NO_INDEX;
      }
    }

    for i in 1..self.tri_count {
      let j = self.entries[i as usize].neighbour;
      assert!(
        j == 0 || self.entries[j as usize].neighbour == i,
        "neighbour relation not symmetric: {i} -> {j} -> {}",
        self.entries[j as usize].neighbour
      );
    }
    Ok(())
  }

  /// Parent index; `0` for the root and the apex corner.
  #[inline]
  pub fn parent(i: TriIndex) -> TriIndex {
    if i < 2 {
      0
    } else {
      i / 2
    }
  }

  #[inline]
  pub fn right(i: TriIndex) -> TriIndex {
    2 * i
  }

  #[inline]
  pub fn left(i: TriIndex) -> TriIndex {
    Self::right(i) + 1
  }

  /// The other child of `i`'s parent.
  #[inline]
  pub fn sibling(i: TriIndex) -> TriIndex {
    i ^ 1
  }

  /// Tree depth of `i`; the root is level 0.
  #[inline]
  pub fn level(i: TriIndex) -> u32 {
    debug_assert!(i > 0);
    31 - i.leading_zeros()
  }

  /// Tile edge length in grid units.
  #[inline]
  pub fn size(&self) -> u32 {
    self.size
  }

  /// `N²`: one past the last tree index, and the `(0,N)` corner.
  #[inline]
  pub fn tri_count(&self) -> u32 {
    self.tri_count
  }

  /// First leaf index.
  #[inline]
  pub fn leaf_start(&self) -> u32 {
    self.tri_count / 2
  }

  /// Level of the leaves.
  #[inline]
  pub fn max_level(&self) -> u32 {
    self.max_level
  }

  /// Arena length covering every tree triangle and the three corners.
  #[inline]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  #[inline]
  pub fn is_leaf(&self, i: TriIndex) -> bool {
    i >= self.leaf_start()
  }

  /// Whether `i` names a tree triangle (not a corner).
  #[inline]
  pub fn is_triangle(&self, i: TriIndex) -> bool {
    i >= 1 && i < self.tri_count
  }

  /// Indices of the tile corners `(0,0)`, `(0,N)`, `(N,0)`.
  #[inline]
  pub fn corners(&self) -> [TriIndex; 3] {
    [0, self.tri_count, self.tri_count + 1]
  }

  #[inline]
  pub fn row(&self, i: TriIndex) -> u32 {
    self.entries[i as usize].row
  }

  #[inline]
  pub fn col(&self, i: TriIndex) -> u32 {
    self.entries[i as usize].col
  }

  #[inline]
  pub fn v0(&self, i: TriIndex) -> TriIndex {
    self.entries[i as usize].v0
  }

  #[inline]
  pub fn v1(&self, i: TriIndex) -> TriIndex {
    self.entries[i as usize].v1
  }

  /// Vertex indices `[apex, v0, v1]` of triangle `i`.
  #[inline]
  pub fn vertices(&self, i: TriIndex) -> [TriIndex; 3] {
    [Self::parent(i), self.v0(i), self.v1(i)]
  }

  #[inline]
  pub fn edge(&self, i: TriIndex) -> Edge {
    self.entries[i as usize].edge
  }

  /// Hypotenuse neighbour, in the adjacent tile when `edge(i)` is a boundary.
  #[inline]
  pub fn neighbour(&self, i: TriIndex) -> Option<TriIndex> {
    match self.entries[i as usize].neighbour {
      0 => None,
      j => Some(j),
    }
  }

  /// An index whose midpoint (or corner) is the local grid point `(row, col)`.
  pub fn lookup(&self, row: u32, col: u32) -> Option<TriIndex> {
    if row > self.size || col > self.size {
      return None;
    }
    match self.lookup[row as usize * (self.size as usize + 1) + col as usize] {
      NO_INDEX => None,
      i => Some(i),
    }
  }
}

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;
