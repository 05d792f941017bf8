//! Triangle budget for the per-frame balancing loop.
//!
//! The mesh splits until the active-triangle count reaches `min_detail`,
//! merges while it exceeds `max_detail`, and never grows past
//! `abs_max_detail`.

use crate::error::{Error, Result};

/// Divisor of `min_detail` giving the priority gap that triggers a swap.
pub const PRIORITY_HYSTERESIS_DIVISOR: u32 = 30;

/// Divisor of `min_detail` giving the slack kept below the target before
/// swaps are allowed.
pub const MERGE_FLOOR_DIVISOR: u32 = 100;

/// Target active-triangle band.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DetailBand {
	/// Split while fewer triangles than this are active and visible.
	pub min_detail: u32,
	/// Merge while more triangles than this are active and visible.
	pub max_detail: u32,
	/// Hard ceiling; no split is started at or above it.
	pub abs_max_detail: u32,
}

impl DetailBand {
	/// Default band for a full-screen terrain.
	pub const DEFAULT: Self = Self {
		min_detail: 3000,
		max_detail: 3500,
		abs_max_detail: 6000,
	};

	/// Small band for previews and tests.
	pub const SMALL: Self = Self {
		min_detail: 200,
		max_detail: 300,
		abs_max_detail: 600,
	};

	/// Priority gap between the best split and worst merge that justifies
	/// swapping them (`min_detail / 30`).
	#[inline]
	pub fn priority_hysteresis(&self) -> u32 {
		self.min_detail / PRIORITY_HYSTERESIS_DIVISOR
	}

	/// Count above which swaps are allowed (`min_detail - min_detail / 100`).
	#[inline]
	pub fn merge_floor(&self) -> u32 {
		self.min_detail - self.min_detail / MERGE_FLOOR_DIVISOR
	}

	/// Balancing iterations allowed per frame before declaring a cycle.
	#[inline]
	pub fn iteration_cap(&self) -> u32 {
		self.min_detail.max(1)
	}

	/// Check if another split may be started.
	#[inline]
	pub fn can_split(&self, active: usize) -> bool {
		active < self.abs_max_detail as usize
	}

	/// Validate ordering and that the band is wide enough for one forced
	/// split chain of a tree with `max_level` levels.
	pub fn validate(&self, max_level: u32) -> Result<()> {
		if self.min_detail > self.max_detail || self.max_detail > self.abs_max_detail {
			return Err(Error::InvalidDetailBand(format!(
				"expected min <= max <= abs, got {} / {} / {}",
				self.min_detail, self.max_detail, self.abs_max_detail
			)));
		}
		let needed = 4 * (max_level + 1);
		if self.max_detail - self.min_detail < needed {
			return Err(Error::InvalidDetailBand(format!(
				"band {}..{} narrower than {needed}",
				self.min_detail, self.max_detail
			)));
		}
		Ok(())
	}
}

impl Default for DetailBand {
	fn default() -> Self {
		Self::DEFAULT
	}
}

/// Cumulative diagnostic counters. Never read by the balancing decisions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TerrainStats {
	/// Frames that ran the update (skipped frames excluded).
	pub frames: u64,
	/// Triangles made active, ever.
	pub triangles_produced: u64,
	/// Priority evaluations.
	pub priority_evaluations: u64,
	/// Bounding-volume tests against the view.
	pub visibility_tests: u64,
	pub queue_inserts: u64,
	pub queue_removals: u64,
	pub queue_moves: u64,
	pub splits: u64,
	pub merges: u64,
	/// Balancing iterations in the most recent frame.
	pub last_balance_iterations: u32,
	/// Zero-priority diamonds merged ahead of the balance loop in the most
	/// recent frame. Not counted in `last_balance_iterations`.
	pub last_collapse_merges: u32,
	/// Visible active triangles after the most recent frame.
	pub last_active: u32,
}

impl TerrainStats {
	/// Total queue operations of every kind.
	#[inline]
	pub fn queue_operations(&self) -> u64 {
		self.queue_inserts + self.queue_removals + self.queue_moves
	}
}
