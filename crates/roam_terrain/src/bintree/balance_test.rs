use std::collections::BTreeSet;

use glam::Vec3;

use super::*;
use crate::bintree::{DetailBand, Edge, TerrainConfig};
use crate::height::GridHeightField;

fn config() -> TerrainConfig {
  TerrainConfig::default()
    .with_tile_size(8)
    .with_detail(DetailBand::SMALL)
    .with_clip(1.0, 200.0)
}

fn sine_mesh(cells: u32) -> BinTreeMesh {
  let n = cells * 8 + 1;
  let field = GridHeightField::sine(n, n, 4.0, 2.5).unwrap();
  BinTreeMesh::build(&field, config()).unwrap()
}

fn flat_mesh(cells: u32) -> BinTreeMesh {
  let n = cells * 8 + 1;
  let field = GridHeightField::flat(n, n, 2.0).unwrap();
  BinTreeMesh::build(&field, config()).unwrap()
}

fn overhead(mesh: &BinTreeMesh) -> Camera {
  let extent = mesh.extent();
  Camera::unbounded(Vec3::new(extent.x * 0.5, 20.0, extent.y * 0.5), Vec3::X)
}

fn snapshot(mesh: &BinTreeMesh) -> BTreeSet<(TileId, TriIndex)> {
  let mut active = BTreeSet::new();
  for tile in mesh.tiles() {
    for i in 1..tile.space().tri_count() {
      if tile.is_active(i) {
        active.insert((tile.id(), i));
      }
    }
  }
  active
}

/// Frontier, crack, cache and queue invariants over the whole mesh.
fn check_invariants(mesh: &BinTreeMesh) {
  let space = mesh.index_space();
  let mut slots = BTreeSet::new();
  let mut active = 0;
  let mut diamond_marks = 0;

  for tile in mesh.tiles() {
    // Every root-to-leaf path crosses exactly one active triangle.
    for leaf in space.leaf_start()..space.tri_count() {
      let mut hits = 0;
      let mut i = leaf;
      while i >= 1 {
        hits += tile.is_active(i) as u32;
        i = TriangleIndexSpace::parent(i);
      }
      assert_eq!(hits, 1, "{:?} leaf {leaf} covered {hits} times", tile.id());
    }

    for i in 1..space.tri_count() {
      let node = tile.node(i);
      if node.merge_slot.is_some() {
        diamond_marks += 1;
        assert!(mesh.is_mergeable(tile.id(), i), "stale merge entry at {:?}/{i}", tile.id());
      }
      if !node.is_active() {
        continue;
      }
      active += 1;
      assert!(slots.insert(node.cache_slot().unwrap()), "shared cache slot");
      assert!(node.merge_slot.is_none());

      // No T-junction across the hypotenuse.
      if let Some((nt, n)) = tile.neighbour(i) {
        let other = mesh.tile(nt);
        let ok = other.is_active(n) || (n > 1 && other.is_active(TriangleIndexSpace::parent(n)));
        assert!(ok, "crack between {:?}/{i} and {nt:?}/{n}: {:?}", tile.id(), other.state(n));
      }
    }
  }

  assert_eq!(active, mesh.active_count());
  assert_eq!(mesh.cache_slots_in_use(), active);
  assert_eq!(mesh.active_triangles().count(), mesh.visible_count());
  if mesh.merge_enabled() {
    assert!(diamond_marks >= mesh.merge_queue_len());
    assert!(diamond_marks <= 2 * mesh.merge_queue_len());
  } else {
    assert_eq!(mesh.merge_queue_len(), 0);
  }
}

fn check_band(mesh: &BinTreeMesh, stats: &TerrainStats) {
  let band = mesh.config().detail;
  let count = mesh.visible_count() as u32;
  assert!(
    (band.min_detail..=band.max_detail).contains(&count) || (count < band.min_detail && mesh.split_queue_len() == 0),
    "{count} visible outside {}..={} with {} split candidates",
    band.min_detail,
    band.max_detail,
    mesh.split_queue_len()
  );
  assert_eq!(stats.last_active, count);
  assert!(
    stats.last_balance_iterations <= band.iteration_cap(),
    "{} iterations over a cap of {}",
    stats.last_balance_iterations,
    band.iteration_cap()
  );
}

// =========================================================================
// Split and merge
// =========================================================================

#[test]
fn test_root_split_merge_round_trip() {
  let mut mesh = sine_mesh(1);
  let mut stats = TerrainStats::default();
  let t = mesh.cell_tile(0, 0, false);
  let before = snapshot(&mesh);

  mesh.split(t, 1, &mut stats);
  check_invariants(&mesh);
  assert_eq!(stats.splits, 2, "the mirrored root is forced too");
  assert!(mesh.is_mergeable(t, 1));
  assert_eq!(mesh.active_count(), 4);

  mesh.merge(t, 1, &mut stats);
  check_invariants(&mesh);
  assert_eq!(snapshot(&mesh), before);
  assert_eq!(stats.merges, 1);
}

#[test]
fn test_border_split_merge_round_trip() {
  let mut mesh = sine_mesh(1);
  let mut stats = TerrainStats::default();
  let t = mesh.cell_tile(0, 0, false);
  mesh.split(t, 1, &mut stats);
  let before = snapshot(&mesh);

  // The hypotenuse of 2 lies on the open left border.
  assert_eq!(mesh.tile(t).neighbour(2), None);
  mesh.split(t, 2, &mut stats);
  check_invariants(&mesh);
  assert!(mesh.is_mergeable(t, 2));
  assert!(!mesh.is_mergeable(t, 1));

  mesh.merge(t, 2, &mut stats);
  assert_eq!(snapshot(&mesh), before);
  check_invariants(&mesh);
}

#[test]
fn test_deep_split_forces_neighbours_across_tiles() {
  let mut mesh = sine_mesh(2);
  let mut stats = TerrainStats::default();
  let t = mesh.cell_tile(0, 0, false);
  let space = mesh.index_space();
  let deep = (space.tri_count() / 4..space.leaf_start())
    .find(|&i| space.edge(i) == Edge::Diagonal)
    .unwrap();

  mesh.split(t, deep, &mut stats);
  check_invariants(&mesh);
  let twin = mesh.cell_tile(0, 0, true);
  assert_eq!(mesh.tile(twin).state(1), NodeState::Split);
  assert!(stats.splits > 2);

  // Splitting again is a no-op.
  let splits = stats.splits;
  mesh.split(t, deep, &mut stats);
  assert_eq!(stats.splits, splits);
}

#[test]
fn test_split_keeps_parent_slot_for_right_child() {
  let mut mesh = sine_mesh(1);
  let mut stats = TerrainStats::default();
  let t = mesh.cell_tile(0, 0, false);
  let slot = mesh.tile(t).node(1).cache_slot();
  mesh.split(t, 1, &mut stats);
  assert_eq!(mesh.tile(t).node(2).cache_slot(), slot);
  mesh.merge(t, 1, &mut stats);
  assert_eq!(mesh.tile(t).node(1).cache_slot(), slot);
}

#[test]
#[should_panic]
fn test_merge_incomplete_diamond_panics() {
  let mut mesh = sine_mesh(1);
  let mut stats = TerrainStats::default();
  let t = mesh.cell_tile(0, 0, false);
  mesh.merge(t, 1, &mut stats);
}

#[test]
#[should_panic]
fn test_split_leaf_panics() {
  let mut mesh = sine_mesh(1);
  let mut stats = TerrainStats::default();
  let t = mesh.cell_tile(0, 0, false);
  let leaf = mesh.index_space().leaf_start();
  mesh.split(t, leaf, &mut stats);
}

// =========================================================================
// Frame updates
// =========================================================================

/// A flat field has nothing worth splitting: the roots stay.
#[test]
fn test_flat_field_stays_at_roots() {
  let mut mesh = flat_mesh(4);
  let mut stats = TerrainStats::default();
  let far = Camera::unbounded(Vec3::new(1000.0, 50.0, 1000.0), Vec3::NEG_X);

  assert!(mesh.update_frame(&far, 1, &mut stats));
  assert_eq!(mesh.active_count(), 32);
  for tile in mesh.tiles() {
    assert!(tile.is_active(1));
  }
  assert_eq!(stats.last_balance_iterations, 0);
  assert!(!mesh.update_frame(&far, 1, &mut stats), "unchanged camera is skipped");

  let near = overhead(&mesh);
  assert!(mesh.update_frame(&near, 1, &mut stats));
  assert_eq!(mesh.active_count(), 32);
  assert_eq!(mesh.visible_count(), 32);
  check_invariants(&mesh);
}

#[test]
fn test_first_frame_splits_into_band() {
  let mut mesh = sine_mesh(2);
  let mut stats = TerrainStats::default();
  let camera = overhead(&mesh);

  assert!(mesh.update_frame(&camera, 1, &mut stats));
  check_invariants(&mesh);
  check_band(&mesh, &stats);
  assert!(mesh.visible_count() > 8);
  assert!(mesh.is_converged());
  assert!(mesh.merge_enabled(), "merging starts after the first frame");
  assert_eq!(stats.frames, 1);
  assert!(stats.splits > 0);
  assert!(stats.triangles_produced > 0);
  assert!(stats.queue_operations() > 0);
  assert!(stats.priority_evaluations > 0);

  assert!(!mesh.update_frame(&camera, 1, &mut stats));
  assert_eq!(stats.frames, 1);
}

#[test]
fn test_moving_camera_keeps_invariants() {
  let mut mesh = sine_mesh(2);
  let mut stats = TerrainStats::default();
  let extent = mesh.extent();

  for step in 0..12 {
    let t = step as f32 / 11.0;
    let position = Vec3::new(extent.x * t, 15.0, extent.y * (1.0 - t));
    let forward = Vec3::new(1.0 - t, -0.3, t);
    let camera = Camera::unbounded(position, forward);
    assert!(mesh.update_frame(&camera, 1, &mut stats));
    check_invariants(&mesh);
    check_band(&mesh, &stats);
  }
  assert_eq!(stats.frames, 12);
}

#[test]
fn test_perspective_culling() {
  let mut mesh = sine_mesh(1);
  let mut stats = TerrainStats::default();
  let camera = Camera::perspective(
    Vec3::new(-4.0, 6.0, 4.0),
    Vec3::new(1.0, -0.4, 0.0),
    Vec3::Y,
    0.6,
    1.0,
  );
  mesh.update_frame(&camera, 1, &mut stats);
  check_invariants(&mesh);
  assert!(mesh.visible_count() < mesh.active_count() || mesh.split_queue_len() == 0);
  for tri in mesh.active_triangles() {
    assert!(mesh.tile(tri.tile).node(tri.index).visibility().is_visible());
  }
}

#[test]
fn test_far_clip_culls_everything_beyond() {
  let mut mesh = sine_mesh(2);
  let mut stats = TerrainStats::default();
  let camera = overhead(&mesh);
  mesh.update_frame(&camera, 1, &mut stats);

  let away = Camera::unbounded(Vec3::new(-205.0, 10.0, 8.0), Vec3::X);
  mesh.update_frame(&away, 1, &mut stats);
  check_invariants(&mesh);
  assert_eq!(mesh.visible_count(), 0);
  // Culled diamonds have zero merge priority and collapse back to the roots.
  assert_eq!(mesh.active_count(), mesh.tiles().len());
  assert!(stats.last_collapse_merges > 0);
  assert!(stats.last_balance_iterations <= mesh.config().detail.iteration_cap());
}

/// Collapsing hundreds of culled diamonds does not eat the iteration cap.
#[test]
fn test_mass_collapse_stays_within_iteration_cap() {
  let mut mesh = sine_mesh(4);
  let mut stats = TerrainStats::default();
  mesh.update_frame(&overhead(&mesh), 1, &mut stats);

  let half = mesh.index_space().leaf_start() / 2;
  let ids: Vec<TileId> = mesh.tiles().iter().map(|tile| tile.id()).collect();
  for &t in &ids {
    for i in 1..half {
      mesh.split(t, i, &mut stats);
    }
  }
  let split_active = mesh.active_count();
  assert!(split_active >= ids.len() * half as usize);
  check_invariants(&mesh);

  // Looking straight up: every tile is in reach and every triangle culled.
  let extent = mesh.extent();
  let up = Camera::perspective(
    Vec3::new(extent.x * 0.5, 30.0, extent.y * 0.5),
    Vec3::Y,
    Vec3::X,
    0.5,
    1.0,
  );
  assert!(mesh.update_frame(&up, 1, &mut stats));
  check_invariants(&mesh);
  assert_eq!(mesh.visible_count(), 0);
  assert_eq!(mesh.active_count(), ids.len());
  // A merge retires at most two active triangles.
  assert!(stats.last_collapse_merges as usize >= (split_active - ids.len()) / 2);
  assert!(stats.last_balance_iterations <= mesh.config().detail.min_detail);
}

/// Tiles farther than the far clip plus two tiles keep their state.
#[test]
fn test_distant_tiles_are_left_untouched() {
  let detail = DetailBand {
    min_detail: 100,
    max_detail: 300,
    abs_max_detail: 600,
  };
  let config = config().with_detail(detail).with_clip(1.0, 20.0);
  // Flat near the origin, rolling elsewhere.
  let field = GridHeightField::from_fn(65, 65, |r, c| {
    if r <= 32 && c <= 32 {
      0.0
    } else {
      4.0 * (r as f32 / 2.5).sin() * (c as f32 / 2.5).cos()
    }
  })
  .unwrap();
  let mut mesh = BinTreeMesh::build(&field, config).unwrap();
  let mut stats = TerrainStats::default();

  let look = Vec3::new(0.3, -1.0, 0.2);
  mesh.update_frame(&Camera::unbounded(Vec3::new(60.0, 20.0, 60.0), look), 1, &mut stats);
  mesh.update_frame(&Camera::unbounded(Vec3::new(58.0, 20.0, 60.0), look), 1, &mut stats);
  check_invariants(&mesh);

  let t = mesh.cell_tile(7, 7, false);
  let record = |mesh: &BinTreeMesh| -> Vec<_> {
    let tile = mesh.tile(t);
    (1..tile.space().tri_count())
      .map(|i| {
        let node = tile.node(i);
        (node.is_active(), node.visibility(), node.in_split_queue(), node.priority())
      })
      .collect()
  };
  let before = record(&mesh);
  assert!(!mesh.tile(t).is_active(1), "the distant tile should hold detail");

  mesh.update_frame(&Camera::unbounded(Vec3::new(4.0, 20.0, 4.0), look), 1, &mut stats);
  check_invariants(&mesh);
  assert_eq!(record(&mesh), before);
  // Stale: well beyond the far clip yet still marked visible.
  assert!(mesh.tile(t).node(1).visibility().is_visible());
}

#[test]
fn test_height_edit_triggers_update() {
  let mut mesh = sine_mesh(1);
  let mut stats = TerrainStats::default();
  let camera = overhead(&mesh);
  mesh.update_frame(&camera, 1, &mut stats);
  assert!(!mesh.update_frame(&camera, 1, &mut stats));

  assert!(mesh.set_height(4, 4, 30.0));
  assert!(mesh.update_frame(&camera, 1, &mut stats));
  check_invariants(&mesh);
}

// =========================================================================
// Merge mode
// =========================================================================

#[test]
fn test_merge_mode_toggle() {
  let mut mesh = sine_mesh(2);
  let mut stats = TerrainStats::default();
  mesh.update_frame(&overhead(&mesh), 1, &mut stats);
  let diamonds = mesh.merge_queue_len();
  assert!(diamonds > 0);

  mesh.set_merge_enabled(false);
  assert_eq!(mesh.merge_queue_len(), 0);
  check_invariants(&mesh);

  mesh.set_merge_enabled(true);
  assert_eq!(mesh.merge_queue_len(), diamonds);
  check_invariants(&mesh);
}

// =========================================================================
// Render bookkeeping
// =========================================================================

#[test]
fn test_render_triangles_follow_the_surface() {
  let mut mesh = sine_mesh(2);
  let mut stats = TerrainStats::default();
  mesh.update_frame(&overhead(&mesh), 1, &mut stats);

  for tri in mesh.active_triangles() {
    for v in tri.vertices {
      assert!((mesh.height(v.position.x, v.position.z) - v.position.y).abs() < 1e-4);
      assert!(v.uv.cmpge(glam::Vec2::ZERO).all() && v.uv.cmple(glam::Vec2::ONE).all());
    }
    assert_eq!(mesh.tile(tri.tile).node(tri.index).cache_slot(), Some(tri.slot));
  }
}

#[test]
fn test_pending_uploads_track_marks() {
  let mut mesh = sine_mesh(1);
  let mut stats = TerrainStats::default();
  mesh.update_frame(&overhead(&mesh), 1, &mut stats);

  let pending: Vec<_> = mesh.pending_uploads().map(|t| (t.tile, t.index)).collect();
  assert_eq!(pending.len(), mesh.visible_count());
  for &(t, i) in &pending {
    assert!(mesh.mark_uploaded(t, i));
  }
  assert_eq!(mesh.pending_uploads().count(), 0);
  assert_eq!(mesh.active_triangles().count(), pending.len());

  let t = mesh.cell_tile(0, 0, false);
  assert!(!mesh.mark_uploaded(t, 1), "split roots are not active");
}
