//! Camera and view-frustum description consumed by the terrain mesh.
//!
//! The mesh reads three things per frame: the eye position, the forward
//! direction (its XZ part drives the distance term of the error metric) and a
//! set of clip planes. Planes face inward; a point is inside when its signed
//! distance is non-negative.

use glam::Vec3;
use smallvec::SmallVec;

use crate::bintree::Aabb3;

/// Result of classifying a volume against the view.
///
/// Bit 7 marks the volume visible. Bits 0..=5 name the frustum planes the
/// volume straddles and bit 6 the far-clip circle; children only need testing
/// against what is still set. `OUT` (all zero) means fully culled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct VisMask(u8);

impl VisMask {
  /// Fully culled.
  pub const OUT: Self = Self(0);
  /// Visible and fully inside every plane and the far clip.
  pub const INSIDE: Self = Self(Self::VISIBLE_BIT);
  /// Largest frustum plane count a mask can track.
  pub const MAX_PLANES: usize = 6;

  const FAR_BIT: u8 = 0x40;
  const VISIBLE_BIT: u8 = 0x80;
  const PLANE_BITS: u8 = 0x3f;

  /// Visible with the far clip and the first `count` planes still to test.
  pub fn all_planes(count: usize) -> Self {
    debug_assert!(count <= Self::MAX_PLANES);
    let bits = ((1u16 << count) - 1) as u8;
    Self(Self::VISIBLE_BIT | Self::FAR_BIT | bits)
  }

  #[inline]
  pub fn is_visible(self) -> bool {
    self.0 & Self::VISIBLE_BIT != 0
  }

  /// Visible and nothing left to test.
  #[inline]
  pub fn is_inside(self) -> bool {
    self.0 == Self::VISIBLE_BIT
  }

  /// Bitset of straddled frustum planes.
  #[inline]
  pub fn planes(self) -> u8 {
    self.0 & Self::PLANE_BITS
  }

  /// Whether the far-clip circle still cuts the volume.
  #[inline]
  pub fn needs_far_test(self) -> bool {
    self.is_visible() && self.0 & Self::FAR_BIT != 0
  }

  /// Same mask with the far clip resolved as fully inside.
  #[inline]
  pub fn without_far(self) -> Self {
    Self(self.0 & !Self::FAR_BIT)
  }

  /// True when classification can be inherited without testing.
  #[inline]
  pub fn is_settled(self) -> bool {
    !self.is_visible() || self.is_inside()
  }

  #[inline]
  pub fn raw(self) -> u8 {
    self.0
  }
}

/// Inward-facing clip plane `normal . p + distance >= 0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
  pub normal: Vec3,
  pub distance: f32,
}

impl Plane {
  /// Plane through `point`, facing along `normal` (normalised here).
  pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
    let normal = normal.normalize_or_zero();
    Self {
      normal,
      distance: -normal.dot(point),
    }
  }

  #[inline]
  pub fn signed_distance(&self, point: Vec3) -> f32 {
    self.normal.dot(point) + self.distance
  }
}

/// Convex clip volume, at most [`VisMask::MAX_PLANES`] planes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frustum {
  planes: SmallVec<[Plane; 6]>,
}

impl Frustum {
  /// Frustum from inward-facing planes.
  ///
  /// # Panics
  /// More than [`VisMask::MAX_PLANES`] planes.
  pub fn new(planes: impl IntoIterator<Item = Plane>) -> Self {
    let planes: SmallVec<[Plane; 6]> = planes.into_iter().collect();
    assert!(
      planes.len() <= VisMask::MAX_PLANES,
      "frustum supports at most {} planes, got {}",
      VisMask::MAX_PLANES,
      planes.len()
    );
    Self { planes }
  }

  /// No planes: everything inside.
  pub fn unbounded() -> Self {
    Self::default()
  }

  pub fn planes(&self) -> &[Plane] {
    &self.planes
  }

  /// Mask that requests a test against every plane.
  #[inline]
  pub fn full_mask(&self) -> VisMask {
    VisMask::all_planes(self.planes.len())
  }

  /// Classify a box, testing only the planes still set in `mask`.
  ///
  /// The far-clip bit is carried through untouched.
  pub fn classify(&self, aabb: &Aabb3, mask: VisMask) -> VisMask {
    if mask.is_settled() || mask.planes() == 0 {
      return mask;
    }
    let mut bits = mask.raw();
    for (i, plane) in self.planes.iter().enumerate() {
      let bit = 1u8 << i;
      if bits & bit == 0 {
        continue;
      }
      // Farthest and nearest box corners along the plane normal.
      let far = Vec3::select(plane.normal.cmpge(Vec3::ZERO), aabb.max, aabb.min);
      if plane.signed_distance(far) < 0.0 {
        return VisMask::OUT;
      }
      let near = Vec3::select(plane.normal.cmpge(Vec3::ZERO), aabb.min, aabb.max);
      if plane.signed_distance(near) >= 0.0 {
        bits &= !bit;
      }
    }
    VisMask(bits)
  }

  pub fn contains_point(&self, point: Vec3) -> bool {
    self.planes.iter().all(|p| p.signed_distance(point) >= 0.0)
  }
}

/// Eye position, view direction and clip volume for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
  pub position: Vec3,
  pub forward: Vec3,
  pub frustum: Frustum,
}

impl Camera {
  pub fn new(position: Vec3, forward: Vec3, frustum: Frustum) -> Self {
    Self {
      position,
      forward: forward.normalize_or_zero(),
      frustum,
    }
  }

  /// Camera without clip planes; only the far clip culls.
  pub fn unbounded(position: Vec3, forward: Vec3) -> Self {
    Self::new(position, forward, Frustum::unbounded())
  }

  /// Symmetric perspective camera with four side planes.
  ///
  /// Near and far are handled by the mesh's clip distances, so only the
  /// left/right/top/bottom planes are generated.
  pub fn perspective(position: Vec3, forward: Vec3, up: Vec3, fov_y: f32, aspect: f32) -> Self {
    let forward = forward.normalize_or_zero();
    let right = forward.cross(up).normalize_or_zero();
    let up = right.cross(forward);
    let tan_v = (fov_y * 0.5).tan();
    let tan_h = tan_v * aspect;

    let planes = [
      Plane::from_point_normal(position, right + forward * tan_h),
      Plane::from_point_normal(position, -right + forward * tan_h),
      Plane::from_point_normal(position, up + forward * tan_v),
      Plane::from_point_normal(position, -up + forward * tan_v),
    ];
    Self {
      position,
      forward,
      frustum: Frustum::new(planes),
    }
  }
}

#[cfg(test)]
#[path = "camera_test.rs"]
mod camera_test;
