//! Axis-aligned bounding box around a triangle's wedge.

use glam::Vec3;

/// Single-precision axis-aligned bounding box.
///
/// Built per triangle from its corner grid positions and the height range of
/// its subtree; tested against the clip planes during visibility updates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb3 {
	/// Minimum corner (inclusive).
	pub min: Vec3,
	/// Maximum corner (inclusive).
	pub max: Vec3,
}

impl Aabb3 {
	/// Create a new AABB from min and max corners.
	///
	/// # Panics
	/// Debug-asserts that min <= max on all axes.
	pub fn new(min: Vec3, max: Vec3) -> Self {
		debug_assert!(
			min.cmple(max).all(),
			"AABB min must be <= max on all axes"
		);
		Self { min, max }
	}

	/// Smallest box around the XZ footprint of `points`, spanning `y_min..=y_max`.
	pub fn from_footprint(points: &[Vec3], y_min: f32, y_max: f32) -> Self {
		let mut min = Vec3::new(f32::INFINITY, y_min, f32::INFINITY);
		let mut max = Vec3::new(f32::NEG_INFINITY, y_max, f32::NEG_INFINITY);
		for p in points {
			min.x = min.x.min(p.x);
			min.z = min.z.min(p.z);
			max.x = max.x.max(p.x);
			max.z = max.z.max(p.z);
		}
		Self::new(min, max)
	}

	/// Check if this AABB contains a point.
	#[inline]
	pub fn contains_point(&self, point: Vec3) -> bool {
		point.cmpge(self.min).all() && point.cmple(self.max).all()
	}

	/// Get the size of the AABB (max - min).
	#[inline]
	pub fn size(&self) -> Vec3 {
		self.max - self.min
	}

	/// Get the center of the AABB.
	#[inline]
	pub fn center(&self) -> Vec3 {
		(self.min + self.max) * 0.5
	}

	/// Range of `t` in `0..=1` for which `p1 + t * (p2 - p1)` lies inside the
	/// box grown by `pad`, or `None` if the segment misses it.
	pub fn segment_overlap(&self, p1: Vec3, p2: Vec3, pad: f32) -> Option<(f32, f32)> {
		let d = p2 - p1;
		let (mut enter, mut exit) = (0.0f32, 1.0f32);
		for axis in 0..3 {
			let (lo, hi) = (self.min[axis] - pad, self.max[axis] + pad);
			if d[axis].abs() <= f32::EPSILON {
				// Parallel slab: inside for the whole segment or never.
				if p1[axis] < lo || p1[axis] > hi {
					return None;
				}
				continue;
			}
			let inv = 1.0 / d[axis];
			let (mut t0, mut t1) = ((lo - p1[axis]) * inv, (hi - p1[axis]) * inv);
			if t0 > t1 {
				std::mem::swap(&mut t0, &mut t1);
			}
			enter = enter.max(t0);
			exit = exit.min(t1);
			if enter > exit {
				return None;
			}
		}
		Some((enter, exit))
	}
}
