//! Height field sampling.
//!
//! The terrain mesh only reads heights through [`HeightField`]. Stored values
//! are converted to world units with `base + scale * sample`.
//!
//! [`GridHeightField`] is an owned row-major grid with the usual editing
//! helpers (rescale, translate, clamp, edge closing) and a few generators
//! used by tests and benches.

use crate::error::{try_alloc, Result};

/// Read-only 2D height sampler.
pub trait HeightField {
  /// Number of sample rows (world X extent + 1).
  fn rows(&self) -> u32;

  /// Number of sample columns (world Z extent + 1).
  fn cols(&self) -> u32;

  /// Raw stored height at a grid point. Callers stay within `rows x cols`.
  fn sample(&self, row: u32, col: u32) -> f32;

  /// Vertical scale applied to raw samples.
  fn scale(&self) -> f32 {
    1.0
  }

  /// Vertical offset applied after scaling.
  fn base(&self) -> f32 {
    0.0
  }

  /// Height in world units at a grid point.
  #[inline]
  fn world_height(&self, row: u32, col: u32) -> f32 {
    self.base() + self.scale() * self.sample(row, col)
  }
}

/// Owned, row-major height grid.
#[derive(Clone, Debug, PartialEq)]
pub struct GridHeightField {
  rows: u32,
  cols: u32,
  heights: Vec<f32>,
  scale: f32,
  base: f32,
}

impl GridHeightField {
  /// Allocate a zeroed grid.
  pub fn new(rows: u32, cols: u32) -> Result<Self> {
    let heights = try_alloc("height field", rows as usize * cols as usize, 0.0f32)?;
    Ok(Self {
      rows,
      cols,
      heights,
      scale: 1.0,
      base: 0.0,
    })
  }

  /// Constant-height grid.
  pub fn flat(rows: u32, cols: u32, height: f32) -> Result<Self> {
    Self::from_fn(rows, cols, |_, _| height)
  }

  /// Grid filled from a generator over `(row, col)`.
  pub fn from_fn(rows: u32, cols: u32, mut f: impl FnMut(u32, u32) -> f32) -> Result<Self> {
    let mut field = Self::new(rows, cols)?;
    for row in 0..rows {
      for col in 0..cols {
        let i = field.offset(row, col);
        field.heights[i] = f(row, col);
      }
    }
    Ok(field)
  }

  /// Rolling sine pattern: `amplitude * sin(row/period) * cos(col/period)`.
  pub fn sine(rows: u32, cols: u32, amplitude: f32, period: f32) -> Result<Self> {
    let period = if period.abs() > f32::EPSILON { period } else { 1.0 };
    Self::from_fn(rows, cols, |r, c| {
      amplitude * (r as f32 / period).sin() * (c as f32 / period).cos()
    })
  }

  /// Set the vertical scale and offset used by [`HeightField::world_height`].
  pub fn with_scale_base(mut self, scale: f32, base: f32) -> Self {
    self.scale = scale;
    self.base = base;
    self
  }

  #[inline]
  fn offset(&self, row: u32, col: u32) -> usize {
    row as usize * self.cols as usize + col as usize
  }

  /// Raw value at a grid point, `None` outside the grid.
  pub fn get(&self, row: u32, col: u32) -> Option<f32> {
    (row < self.rows && col < self.cols).then(|| self.heights[self.offset(row, col)])
  }

  /// Overwrite a raw value. Returns false outside the grid.
  pub fn set(&mut self, row: u32, col: u32, height: f32) -> bool {
    if row >= self.rows || col >= self.cols {
      return false;
    }
    let i = self.offset(row, col);
    self.heights[i] = height;
    true
  }

  /// Smallest raw value.
  pub fn min(&self) -> f32 {
    self.heights.iter().copied().fold(f32::INFINITY, f32::min)
  }

  /// Largest raw value.
  pub fn max(&self) -> f32 {
    self.heights.iter().copied().fold(f32::NEG_INFINITY, f32::max)
  }

  /// Multiply every raw value.
  pub fn rescale(&mut self, factor: f32) {
    self.heights.iter_mut().for_each(|h| *h *= factor);
  }

  /// Add a constant to every raw value.
  pub fn translate(&mut self, delta: f32) {
    self.heights.iter_mut().for_each(|h| *h += delta);
  }

  /// Raise every value below `floor` to `floor`.
  pub fn set_min(&mut self, floor: f32) {
    self.heights.iter_mut().for_each(|h| *h = h.max(floor));
  }

  /// Lower every value above `ceiling` to `ceiling`.
  pub fn set_max(&mut self, ceiling: f32) {
    self.heights.iter_mut().for_each(|h| *h = h.min(ceiling));
  }

  /// Make opposite borders match so the grid tiles seamlessly.
  ///
  /// The first and last row (and column) are both replaced by their average.
  pub fn close_edge(&mut self) {
    if self.rows < 2 || self.cols < 2 {
      return;
    }
    let (last_row, last_col) = (self.rows - 1, self.cols - 1);
    for col in 0..self.cols {
      let (a, b) = (self.offset(0, col), self.offset(last_row, col));
      let avg = (self.heights[a] + self.heights[b]) * 0.5;
      self.heights[a] = avg;
      self.heights[b] = avg;
    }
    for row in 0..self.rows {
      let (a, b) = (self.offset(row, 0), self.offset(row, last_col));
      let avg = (self.heights[a] + self.heights[b]) * 0.5;
      self.heights[a] = avg;
      self.heights[b] = avg;
    }
  }
}

impl HeightField for GridHeightField {
  fn rows(&self) -> u32 {
    self.rows
  }

  fn cols(&self) -> u32 {
    self.cols
  }

  #[inline]
  fn sample(&self, row: u32, col: u32) -> f32 {
    self.heights[self.offset(row, col)]
  }

  fn scale(&self) -> f32 {
    self.scale
  }

  fn base(&self) -> f32 {
    self.base
  }
}

#[cfg(test)]
#[path = "height_test.rs"]
mod height_test;
