//! Binary triangle tree terrain (ROAM).
//!
//! The height field is cut into square cells of `N x N` samples, each split
//! along its anti-diagonal into two tiles. Every tile holds an implicit
//! binary triangle tree addressed by integer index; the active triangles of
//! all trees form a crack-free mesh whose detail follows the camera.
//!
//! Per frame, visibility and split priorities are refreshed near the camera,
//! then a split queue (highest error first) and a merge queue (least useful
//! diamond first) are traded against each other until the visible triangle
//! count settles inside the [`DetailBand`].
//!
//! # Module Structure
//!
//! - [`index`]: `TriangleIndexSpace` - static geometry for one tile size
//! - [`node`]: `TriangleNode` - per-triangle state in a tile arena
//! - [`tile`]: `BinTreeTile` - one half cell, visibility and priority
//! - [`mesh`]: `BinTreeMesh` - tile grid, neighbour wiring, heights
//! - [`balance`]: split, merge and the per-frame update
//! - [`queue`]: `BucketQueue` - bucketed split and merge queues
//! - [`render`]: active triangle iteration for renderers

pub mod balance;
pub mod bounds;
pub mod budget;
pub mod cache;
pub mod config;
pub mod index;
pub mod mesh;
pub mod node;
pub mod queue;
pub mod render;
pub mod tile;

// Re-exports
pub use bounds::Aabb3;
pub use budget::{DetailBand, TerrainStats};
pub use cache::{CacheSlot, SlotCache};
pub use config::{TerrainConfig, DEFAULT_TILE_SIZE};
pub use index::{Edge, TriIndex, TriangleIndexSpace};
pub use mesh::{BinTreeMesh, RayHit};
pub use node::{NodeFlags, TriangleNode};
pub use queue::{BucketQueue, QueueKey, QueueOrder, QueueSlot, PRIORITY_RESOLUTION};
pub use render::{ActiveTriangles, RenderTriangle, RenderVertex};
pub use tile::{BinTreeTile, NodeState, TileId, TileNeighbours, ViewContext};
