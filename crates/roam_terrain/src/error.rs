//! Recoverable errors raised while building terrain meshes and photon maps.
//!
//! Bookkeeping bugs (queue corruption, split/merge preconditions, balance
//! cycles, querying an unbalanced photon map) are not represented here; those
//! panic, since continuing would hand the renderer an inconsistent mesh.

/// Errors surfaced by mesh construction and photon map allocation.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
  /// An arena allocation could not be satisfied.
  #[error("out of memory allocating {what} ({count} elements)")]
  OutOfMemory { what: &'static str, count: usize },

  /// Tile edge size is not a power of two in the supported range.
  #[error("tile edge size {0} must be a power of two in 2..=1024")]
  InvalidTileSize(u32),

  /// Height field cannot hold a single tile pair of the requested size.
  #[error("height field {rows}x{cols} is too small for tile edge {tile_size}")]
  HeightFieldTooSmall { rows: u32, cols: u32, tile_size: u32 },

  /// The height field returned no usable value for a grid point.
  #[error("height field sample at ({row}, {col}) is missing or not finite")]
  HeightSample { row: u32, col: u32 },

  /// Detail band limits are inconsistent.
  #[error("invalid detail band: {0}")]
  InvalidDetailBand(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Reserve exactly `count` elements, reporting failure as [`Error::OutOfMemory`].
pub(crate) fn try_alloc<T: Clone>(what: &'static str, count: usize, fill: T) -> Result<Vec<T>> {
  let mut values = Vec::new();
  values
    .try_reserve_exact(count)
    .map_err(|_| Error::OutOfMemory { what, count })?;
  values.resize(count, fill);
  Ok(values)
}
