//! Photon map: a left-balanced k-d tree over stored photons.
//!
//! Photons are appended to a flat array sized at construction. After
//! [`PhotonMap::balance`] the array is reordered in place into an implicit
//! heap (node `i` has children `2i` and `2i + 1`, index 0 unused), so lookups
//! need no pointers and no per-node allocation.
//!
//! # Lifecycle
//!
//! 1. [`PhotonMap::with_capacity`]
//! 2. [`PhotonMap::store`] per photon, [`PhotonMap::scale_power`] per light
//! 3. [`PhotonMap::balance`] exactly once
//! 4. [`PhotonMap::locate`] / [`PhotonMap::irradiance`]

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::f32::consts::{PI, TAU};

use glam::Vec3;

use crate::bintree::Aabb3;
use crate::error::{try_alloc, Result};

/// Fewest photons an irradiance estimate accepts before returning zero.
pub const MIN_ESTIMATE_PHOTONS: usize = 8;

/// Angular bins per direction byte.
const DIRECTION_BINS: usize = 256;

/// One stored photon.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Photon {
  pub position: Vec3,
  pub power: Vec3,
  /// Polar angle bin of the incoming direction.
  pub theta: u8,
  /// Azimuth bin of the incoming direction.
  pub phi: u8,
  /// Split axis of this node once balanced (0 = x, 1 = y, 2 = z).
  pub plane: u8,
}

/// Nearest photons found by [`PhotonMap::locate`].
#[derive(Clone, Debug)]
pub struct NearestPhotons<'a> {
  /// Squared search radius: the farthest photon when the requested count
  /// was reached, the caller's limit otherwise.
  pub radius_squared: f32,
  /// Photons with their squared distance, unordered.
  pub photons: Vec<(&'a Photon, f32)>,
}

impl NearestPhotons<'_> {
  pub fn len(&self) -> usize {
    self.photons.len()
  }

  pub fn is_empty(&self) -> bool {
    self.photons.is_empty()
  }
}

/// Max-heap entry ordered by distance.
#[derive(Clone, Copy, Debug)]
struct Candidate {
  dist2: f32,
  index: usize,
}

impl PartialEq for Candidate {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Candidate {
  fn cmp(&self, other: &Self) -> Ordering {
    self.dist2.total_cmp(&other.dist2).then(self.index.cmp(&other.index))
  }
}

/// Byte-quantised direction lookup tables.
#[derive(Clone, Debug)]
struct DirectionTables {
  cos_theta: [f32; DIRECTION_BINS],
  sin_theta: [f32; DIRECTION_BINS],
  cos_phi: [f32; DIRECTION_BINS],
  sin_phi: [f32; DIRECTION_BINS],
}

impl DirectionTables {
  fn new() -> Self {
    let mut tables = Self {
      cos_theta: [0.0; DIRECTION_BINS],
      sin_theta: [0.0; DIRECTION_BINS],
      cos_phi: [0.0; DIRECTION_BINS],
      sin_phi: [0.0; DIRECTION_BINS],
    };
    for i in 0..DIRECTION_BINS {
      // Bin centres
      let t = (i as f32 + 0.5) / DIRECTION_BINS as f32;
      let theta = t * PI;
      let phi = t * TAU - PI;
      tables.cos_theta[i] = theta.cos();
      tables.sin_theta[i] = theta.sin();
      tables.cos_phi[i] = phi.cos();
      tables.sin_phi[i] = phi.sin();
    }
    tables
  }

  fn decode(&self, theta: u8, phi: u8) -> Vec3 {
    let (t, p) = (theta as usize, phi as usize);
    Vec3::new(
      self.sin_theta[t] * self.cos_phi[p],
      self.sin_theta[t] * self.sin_phi[p],
      self.cos_theta[t],
    )
  }
}

/// Quantise a unit direction to `(theta, phi)` bins.
pub fn encode_direction(dir: Vec3) -> (u8, u8) {
  let bins = DIRECTION_BINS as f32;
  let theta = (dir.z.clamp(-1.0, 1.0).acos() * (bins / PI)) as i32;
  let phi = ((dir.y.atan2(dir.x) + PI) * (bins / TAU)) as i32;
  (theta.clamp(0, 255) as u8, phi.clamp(0, 255) as u8)
}

/// Fixed-capacity photon store and k-d tree.
#[derive(Clone, Debug)]
pub struct PhotonMap {
  /// Index 0 unused; `1..=stored` hold photons.
  photons: Vec<Photon>,
  stored: usize,
  max_photons: usize,
  /// First photon not yet covered by `scale_power`.
  prev_scale: usize,
  balanced: bool,
  bbox_min: Vec3,
  bbox_max: Vec3,
  tables: DirectionTables,
}

impl PhotonMap {
  /// Allocate room for `max_photons` photons.
  pub fn with_capacity(max_photons: usize) -> Result<Self> {
    let len = max_photons.checked_add(1).unwrap_or(usize::MAX);
    let photons = try_alloc("photons", len, Photon::default())?;
    Ok(Self {
      photons,
      stored: 0,
      max_photons,
      prev_scale: 1,
      balanced: false,
      bbox_min: Vec3::splat(f32::INFINITY),
      bbox_max: Vec3::splat(f32::NEG_INFINITY),
      tables: DirectionTables::new(),
    })
  }

  /// Store a photon arriving at `position` travelling along `dir`.
  ///
  /// Past capacity the photon is dropped without notice.
  ///
  /// # Panics
  /// If the map is already balanced.
  pub fn store(&mut self, power: Vec3, position: Vec3, dir: Vec3) {
    assert!(!self.balanced, "photon stored after balance");
    if self.stored >= self.max_photons {
      return;
    }
    self.stored += 1;
    let (theta, phi) = encode_direction(dir);
    self.photons[self.stored] = Photon {
      position,
      power,
      theta,
      phi,
      plane: 0,
    };
    self.bbox_min = self.bbox_min.min(position);
    self.bbox_max = self.bbox_max.max(position);
  }

  /// Multiply the power of every photon stored since the previous call.
  pub fn scale_power(&mut self, scale: f32) {
    for photon in &mut self.photons[self.prev_scale..=self.stored] {
      photon.power *= scale;
    }
    self.prev_scale = self.stored + 1;
  }

  /// Reorder the stored photons into a left-balanced k-d tree.
  ///
  /// # Panics
  /// If called twice.
  #[tracing::instrument(skip_all, fields(photons = self.stored))]
  pub fn balance(&mut self) {
    assert!(!self.balanced, "photon map balanced twice");
    self.balanced = true;
    if self.stored == 0 {
      return;
    }

    let mut work: Vec<Photon> = self.photons[1..=self.stored].to_vec();
    balance_segment(&mut work, &mut self.photons, 1, self.bbox_min, self.bbox_max);
    tracing::debug!(photons = self.stored, "photon map balanced");
  }

  pub fn is_balanced(&self) -> bool {
    self.balanced
  }

  /// Number of stored photons.
  pub fn len(&self) -> usize {
    self.stored
  }

  pub fn is_empty(&self) -> bool {
    self.stored == 0
  }

  pub fn capacity(&self) -> usize {
    self.max_photons
  }

  /// Bounding box of every stored photon, if any.
  pub fn bounds(&self) -> Option<Aabb3> {
    (self.stored > 0).then(|| Aabb3::new(self.bbox_min, self.bbox_max))
  }

  /// Stored photons in heap order once balanced, insertion order before.
  pub fn photons(&self) -> &[Photon] {
    &self.photons[1..=self.stored]
  }

  /// Decoded incoming direction of `photon`.
  pub fn direction(&self, photon: &Photon) -> Vec3 {
    self.tables.decode(photon.theta, photon.phi)
  }

  /// Up to `max_count` photons within `sqrt(max_dist2)` of `query`.
  ///
  /// # Panics
  /// If the map has not been balanced.
  pub fn locate(&self, query: Vec3, max_count: usize, max_dist2: f32) -> NearestPhotons<'_> {
    assert!(self.balanced, "photon map queried before balance");
    let mut search = Search {
      photons: &self.photons,
      stored: self.stored,
      query,
      max_count,
      max_dist2,
      heap: BinaryHeap::with_capacity(max_count.saturating_add(1).min(self.stored + 1)),
    };
    if self.stored > 0 && max_count > 0 {
      search.visit(1);
    }

    let radius_squared = search.max_dist2;
    let photons = search
      .heap
      .into_iter()
      .map(|c| (&self.photons[c.index], c.dist2))
      .collect();
    NearestPhotons {
      radius_squared,
      photons,
    }
  }

  /// Irradiance at `position` on a surface facing `normal`.
  ///
  /// Uses up to `max_photons` photons within `max_dist`; returns zero when
  /// fewer than [`MIN_ESTIMATE_PHOTONS`] are found. Photons arriving from
  /// behind the surface are ignored.
  pub fn irradiance(&self, position: Vec3, normal: Vec3, max_dist: f32, max_photons: usize) -> Vec3 {
    let nearest = self.locate(position, max_photons, max_dist * max_dist);
    if nearest.len() < MIN_ESTIMATE_PHOTONS {
      return Vec3::ZERO;
    }

    let flux: Vec3 = nearest
      .photons
      .iter()
      .filter(|(p, _)| self.direction(p).dot(normal) < 0.0)
      .map(|(p, _)| p.power)
      .sum();
    flux * (1.0 / (PI * nearest.radius_squared))
  }
}

/// Size of the left subtree of a left-balanced tree over `n` nodes.
fn left_balanced_median(n: usize) -> usize {
  let mut m = 1;
  while 4 * m <= n {
    m += m;
  }
  if 3 * m <= n {
    2 * m - 1
  } else {
    n - m
  }
}

fn balance_segment(work: &mut [Photon], heap: &mut [Photon], index: usize, bbox_min: Vec3, bbox_max: Vec3) {
  let median = left_balanced_median(work.len());
  let extent = bbox_max - bbox_min;
  let axis = if extent.x >= extent.y && extent.x >= extent.z {
    0
  } else if extent.y >= extent.z {
    1
  } else {
    2
  };

  work.select_nth_unstable_by(median, |a, b| a.position[axis].total_cmp(&b.position[axis]));
  let mut node = work[median];
  node.plane = axis as u8;
  heap[index] = node;
  let split = node.position[axis];

  let (left, rest) = work.split_at_mut(median);
  let right = &mut rest[1..];
  if !left.is_empty() {
    let mut max = bbox_max;
    max[axis] = split;
    balance_segment(left, heap, 2 * index, bbox_min, max);
  }
  if !right.is_empty() {
    let mut min = bbox_min;
    min[axis] = split;
    balance_segment(right, heap, 2 * index + 1, min, bbox_max);
  }
}

/// Recursive nearest-photon walk with a shrinking radius.
struct Search<'a> {
  photons: &'a [Photon],
  stored: usize,
  query: Vec3,
  max_count: usize,
  max_dist2: f32,
  heap: BinaryHeap<Candidate>,
}

impl Search<'_> {
  fn visit(&mut self, index: usize) {
    let photons = self.photons;
    let photon = &photons[index];
    let left = 2 * index;
    let right = left + 1;

    if left <= self.stored {
      let axis = photon.plane as usize;
      let dist1 = self.query[axis] - photon.position[axis];
      let (near, far) = if dist1 > 0.0 { (right, left) } else { (left, right) };
      if near <= self.stored {
        self.visit(near);
      }
      if far <= self.stored && dist1 * dist1 < self.max_dist2 {
        self.visit(far);
      }
    }

    let dist2 = photon.position.distance_squared(self.query);
    if dist2 < self.max_dist2 {
      self.insert(Candidate { dist2, index });
    }
  }

  fn insert(&mut self, candidate: Candidate) {
    self.heap.push(candidate);
    if self.heap.len() > self.max_count {
      self.heap.pop();
    }
    if self.heap.len() == self.max_count {
      if let Some(worst) = self.heap.peek() {
        self.max_dist2 = worst.dist2;
      }
    }
  }
}
