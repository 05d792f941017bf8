//! roam_terrain - view-dependent terrain meshing with binary triangle trees
//!
//! This crate keeps a crack-free, continuously refined triangle mesh over a
//! regular height field. Each frame the mesh trades splits against merges
//! so the number of visible triangles stays inside a fixed band while detail
//! concentrates where the projected geometric error is largest.
//!
//! # Features
//!
//! - **Implicit bintrees**: every triangle is an integer index; parent,
//!   children, vertices and hypotenuse neighbour are index arithmetic
//! - **Split/merge queues**: bucketed priority queues with hysteresis so the
//!   mesh settles instead of oscillating
//! - **Frustum and far-clip culling** with per-triangle retest delays
//! - **Photon map**: a left-balanced k-d tree for irradiance estimates
//!
//! # Example
//!
//! ```ignore
//! use roam_terrain::{BinTreeMesh, Camera, GridHeightField, TerrainConfig, TerrainStats};
//!
//! let field = GridHeightField::sine(257, 257, 20.0, 40.0)?;
//! let mut mesh = BinTreeMesh::build(&field, TerrainConfig::default())?;
//! let mut stats = TerrainStats::default();
//!
//! let camera = Camera::perspective(eye, forward, Vec3::Y, 1.0, 16.0 / 9.0);
//! mesh.update_frame(&camera, 1, &mut stats);
//! for tri in mesh.pending_uploads() {
//!     // upload tri.vertices into slot tri.slot
//! }
//! ```

pub mod bintree;
pub mod camera;
pub mod error;
pub mod height;
pub mod metrics;
pub mod photon;

// Re-export commonly used items
pub use bintree::{
  BinTreeMesh, DetailBand, RayHit, RenderTriangle, RenderVertex, TerrainConfig, TerrainStats, TileId, TriIndex,
};
pub use camera::{Camera, Frustum, Plane, VisMask};
pub use error::{Error, Result};
pub use height::{GridHeightField, HeightField};
pub use metrics::TerrainMetrics;
pub use photon::{NearestPhotons, Photon, PhotonMap};
