//! TerrainConfig - tile size, triangle budget and clip distances.

use super::budget::DetailBand;
use super::index::TriangleIndexSpace;
use crate::error::{Error, Result};

/// Default tile edge in grid units.
pub const DEFAULT_TILE_SIZE: u32 = 32;

/// Configuration for building and balancing a terrain mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct TerrainConfig {
  /// Tile edge length in grid units; power of two.
  pub tile_size: u32,

  /// Target active-triangle band.
  pub detail: DetailBand,

  /// Minimum depth used by the distance term of the error metric.
  pub near_clip: f32,

  /// Radius in the XZ plane beyond which triangles are culled.
  pub far_clip: f32,
}

impl TerrainConfig {
  /// Check tile size, band and clip distances.
  pub fn validate(&self) -> Result<()> {
    if !TriangleIndexSpace::is_valid_size(self.tile_size) {
      return Err(Error::InvalidTileSize(self.tile_size));
    }
    let max_level = 2 * self.tile_size.trailing_zeros() - 1;
    self.detail.validate(max_level)?;
    if !(self.near_clip > 0.0 && self.far_clip > self.near_clip) {
      return Err(Error::InvalidDetailBand(format!(
        "clip distances must satisfy 0 < near < far, got {} / {}",
        self.near_clip, self.far_clip
      )));
    }
    Ok(())
  }

  /// Same config with a different band.
  pub fn with_detail(mut self, detail: DetailBand) -> Self {
    self.detail = detail;
    self
  }

  /// Same config with a different tile size.
  pub fn with_tile_size(mut self, tile_size: u32) -> Self {
    self.tile_size = tile_size;
    self
  }

  /// Same config with different clip distances.
  pub fn with_clip(mut self, near_clip: f32, far_clip: f32) -> Self {
    self.near_clip = near_clip;
    self.far_clip = far_clip;
    self
  }

  /// Scale from raw wedge thickness to priority buckets.
  ///
  /// `resolution / (abs_max_error * 2 * far_clip)`, or 1 when that product
  /// is not positive (flat terrain).
  #[inline]
  pub fn variance_scale(&self, abs_max_error: f32, resolution: usize) -> f32 {
    let denom = abs_max_error * 2.0 * self.far_clip;
    if denom > 0.0 {
      resolution as f32 / denom
    } else {
      1.0
    }
  }
}

impl Default for TerrainConfig {
  fn default() -> Self {
    Self {
      tile_size: DEFAULT_TILE_SIZE,
      detail: DetailBand::DEFAULT,
      near_clip: 1.0,
      far_clip: 150.0,
    }
  }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
