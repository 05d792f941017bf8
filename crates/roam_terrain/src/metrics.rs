//! Engine-agnostic metrics collection for terrain statistics.
//!
//! Feature-gated and runtime-toggled, so nothing is gathered unless the
//! `metrics` feature is on and [`COLLECT_METRICS`] is set.
//!
//! # Usage
//!
//! ```ignore
//! use roam_terrain::metrics::COLLECT_METRICS;
//!
//! // Compile with --features metrics
//! COLLECT_METRICS.store(false, Ordering::Relaxed);
//!
//! mesh.update_frame(&camera, 1, &mut stats);
//! println!("{:.1} us", mesh.metrics().avg_update_us());
//! ```

use std::collections::VecDeque;
#[cfg(feature = "metrics")]
use std::sync::atomic::Ordering;
use std::sync::atomic::AtomicBool;

use crate::bintree::{BinTreeTile, TriangleIndexSpace};

/// Deepest tree level tracked per level; deeper levels fold into the last slot.
pub const MAX_TRACKED_LEVELS: usize = 20;

/// Runtime toggle for metrics collection.
pub static COLLECT_METRICS: AtomicBool = AtomicBool::new(true);

/// Check if metrics collection is enabled (both compile-time and runtime).
#[inline]
pub fn is_enabled() -> bool {
    #[cfg(feature = "metrics")]
    {
        COLLECT_METRICS.load(Ordering::Relaxed)
    }
    #[cfg(not(feature = "metrics"))]
    {
        false
    }
}

/// Fixed-capacity history of recent values, oldest evicted first.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    buffer: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a new value, evicting the oldest if at capacity.
    pub fn push(&mut self, value: T) {
        if self.capacity == 0 {
            return;
        }
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Values from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buffer.iter()
    }

    pub fn last(&self) -> Option<&T> {
        self.buffer.back()
    }
}

impl<T: Copy + Default + std::ops::Add<Output = T>> RollingWindow<T> {
    pub fn sum(&self) -> T {
        self.buffer.iter().copied().fold(T::default(), |acc, x| acc + x)
    }
}

impl RollingWindow<u64> {
    /// Mean of the window, 0 when empty.
    pub fn average(&self) -> f64 {
        if self.buffer.is_empty() {
            0.0
        } else {
            self.sum() as f64 / self.buffer.len() as f64
        }
    }

    pub fn min_max(&self) -> Option<(u64, u64)> {
        let min = self.buffer.iter().min()?;
        let max = self.buffer.iter().max()?;
        Some((*min, *max))
    }
}

impl Default for RollingWindow<u64> {
    fn default() -> Self {
        Self::new(128) // ~2 seconds at 60fps
    }
}

/// Mesh-level statistics refreshed by each frame update.
#[derive(Debug, Clone, Default)]
pub struct TerrainMetrics {
    /// Active triangles per tree level (index = level, root is 0).
    pub active_per_level: [u32; MAX_TRACKED_LEVELS],
    /// Rolling window of frame update times in microseconds.
    pub update_timings: RollingWindow<u64>,
    pub last_update_us: u64,
    /// Split/merge steps taken by the last balance loop.
    pub last_iterations: u32,
    /// Frame updates recorded this session.
    pub total_updates: u64,
}

impl TerrainMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to zero, keeping the cumulative update count.
    pub fn reset(&mut self) {
        self.active_per_level.fill(0);
        self.update_timings.clear();
        self.last_update_us = 0;
        self.last_iterations = 0;
    }

    /// Record the cost of one frame update.
    pub fn record_update(&mut self, timing_us: u64, iterations: u32) {
        if !is_enabled() {
            return;
        }
        self.update_timings.push(timing_us);
        self.last_update_us = timing_us;
        self.last_iterations = iterations;
        self.total_updates += 1;
    }

    /// Recount the active frontier of every tile by tree level.
    pub fn update_levels(&mut self, tiles: &[BinTreeTile]) {
        self.active_per_level.fill(0);
        for tile in tiles {
            for i in 1..tile.space().tri_count() {
                if tile.is_active(i) {
                    let level = (TriangleIndexSpace::level(i) as usize).min(MAX_TRACKED_LEVELS - 1);
                    self.active_per_level[level] += 1;
                }
            }
        }
    }

    pub fn total_active(&self) -> u32 {
        self.active_per_level.iter().sum()
    }

    /// Deepest level holding an active triangle.
    pub fn deepest_level(&self) -> Option<usize> {
        self.active_per_level.iter().rposition(|&count| count > 0)
    }

    pub fn avg_update_us(&self) -> f64 {
        self.update_timings.average()
    }
}
