use super::*;
use crate::bintree::{DetailBand, NodeState};
use crate::height::GridHeightField;

fn small_config() -> TerrainConfig {
  TerrainConfig::default()
    .with_tile_size(8)
    .with_detail(DetailBand::SMALL)
    .with_clip(1.0, 200.0)
}

fn plane(x: u32, z: u32) -> f32 {
  0.5 * x as f32 + 0.25 * z as f32
}

fn plane_mesh(cells: u32) -> BinTreeMesh {
  let n = cells * 8 + 1;
  let field = GridHeightField::from_fn(n, n, plane).unwrap();
  BinTreeMesh::build(&field, small_config()).unwrap()
}

// =========================================================================
// Build
// =========================================================================

#[test]
fn test_build_activates_every_root() {
  let mesh = plane_mesh(4);
  assert_eq!(mesh.cells(), (4, 4));
  assert_eq!(mesh.tiles().len(), 32);
  assert_eq!(mesh.active_count(), 32);
  assert_eq!(mesh.cache_slots_in_use(), 32);
  for tile in mesh.tiles() {
    assert_eq!(tile.state(1), NodeState::Active);
    assert_eq!(tile.state(2), NodeState::Merged);
  }
  assert!(!mesh.merge_enabled());
  assert_eq!(mesh.extent(), Vec2::splat(32.0));
}

#[test]
fn test_build_ignores_partial_cells() {
  let field = GridHeightField::flat(20, 30, 1.0).unwrap();
  let mesh = BinTreeMesh::build(&field, small_config()).unwrap();
  assert_eq!(mesh.cells(), (2, 3));
}

#[test]
fn test_build_rejects_small_field() {
  let field = GridHeightField::flat(8, 40, 1.0).unwrap();
  let err = BinTreeMesh::build(&field, small_config()).unwrap_err();
  assert_eq!(
    err,
    Error::HeightFieldTooSmall {
      rows: 8,
      cols: 40,
      tile_size: 8
    }
  );
}

#[test]
fn test_build_rejects_bad_config() {
  let field = GridHeightField::flat(33, 33, 1.0).unwrap();
  let config = small_config().with_tile_size(6);
  assert_eq!(BinTreeMesh::build(&field, config).unwrap_err(), Error::InvalidTileSize(6));

  let narrow = DetailBand {
    min_detail: 100,
    max_detail: 110,
    abs_max_detail: 200,
  };
  let config = small_config().with_detail(narrow);
  assert!(matches!(
    BinTreeMesh::build(&field, config),
    Err(Error::InvalidDetailBand(_))
  ));
}

#[test]
fn test_height_range_uses_scale_and_base() {
  let field = GridHeightField::from_fn(17, 17, plane)
    .unwrap()
    .with_scale_base(2.0, -1.0);
  let mesh = BinTreeMesh::build(&field, small_config()).unwrap();
  assert_eq!(mesh.height_range(), (-1.0, 2.0 * plane(16, 16) - 1.0));
  assert_eq!(mesh.abs_max_error(), 2.0 * plane(16, 16));
}

// =========================================================================
// Neighbour wiring
// =========================================================================

#[test]
fn test_cell_tile_ids() {
  let mesh = plane_mesh(3);
  assert_eq!(mesh.cell_tile(0, 0, false).index(), 0);
  assert_eq!(mesh.cell_tile(0, 0, true).index(), 1);
  assert_eq!(mesh.cell_tile(1, 2, true).index(), 11);
  for tile in mesh.tiles() {
    assert_eq!(tile.is_mirror(), tile.id().index() % 2 == 1);
  }
}

#[test]
fn test_border_tiles_have_open_edges() {
  let mesh = plane_mesh(2);
  let corner = mesh.tile(mesh.cell_tile(0, 0, false)).neighbours();
  assert_eq!(corner.top, None);
  assert_eq!(corner.left, None);
  assert_eq!(corner.diagonal, Some(mesh.cell_tile(0, 0, true)));

  let far = mesh.tile(mesh.cell_tile(1, 1, true)).neighbours();
  assert_eq!(far.top, None);
  assert_eq!(far.left, None);

  let inner = mesh.tile(mesh.cell_tile(0, 0, true)).neighbours();
  assert_eq!(inner.top, Some(mesh.cell_tile(1, 0, false)));
  assert_eq!(inner.left, Some(mesh.cell_tile(0, 1, false)));
}

/// Neighbours across tiles are mutual and share the hypotenuse in space.
#[test]
fn test_neighbours_are_mutual_across_tiles() {
  let mesh = plane_mesh(3);
  let space = mesh.index_space();
  for tile in mesh.tiles() {
    for i in 1..space.tri_count() {
      let Some((nt, n)) = tile.neighbour(i) else {
        continue;
      };
      let other = mesh.tile(nt);
      assert_eq!(other.neighbour(n), Some((tile.id(), i)), "{:?}/{i}", tile.id());
      assert_eq!(other.vertex(n), tile.vertex(i));

      let ends = |t: &BinTreeTile, j| {
        let mut ends = [t.vertex(t.space().v0(j)), t.vertex(t.space().v1(j))].map(|v| (v.x as u32, v.z as u32));
        ends.sort();
        ends
      };
      assert_eq!(ends(tile, i), ends(other, n));
    }
  }
}

// =========================================================================
// Heights
// =========================================================================

#[test]
fn test_height_interpolates_across_both_halves() {
  let mesh = plane_mesh(2);
  for &(x, z) in &[(0.0, 0.0), (3.3, 2.1), (7.5, 6.0), (8.0, 8.0), (12.25, 3.5), (16.0, 16.0), (15.9, 0.1)] {
    let expected = 0.5 * x + 0.25 * z;
    let h = mesh.height(x, z);
    assert!((h - expected).abs() < 1e-4, "({x}, {z}): {h} vs {expected}");
  }
}

#[test]
fn test_height_outside_is_zero() {
  let mesh = plane_mesh(2);
  assert_eq!(mesh.height(-0.1, 4.0), 0.0);
  assert_eq!(mesh.height(4.0, 16.5), 0.0);
  assert_eq!(mesh.height(100.0, 100.0), 0.0);
  assert_eq!(mesh.height(f32::NAN, 1.0), 0.0);
}

#[test]
fn test_locate_finds_owning_tile() {
  let mesh = plane_mesh(2);
  for row in 0..=16 {
    for col in 0..=16 {
      let (t, i) = mesh.locate(row, col).unwrap();
      let tile = mesh.tile(t);
      assert_eq!((tile.global_row(i), tile.global_col(i)), (row, col));
    }
  }
  assert_eq!(mesh.locate(17, 0), None);
}

#[test]
fn test_set_height_updates_shared_points() {
  let mut mesh = plane_mesh(2);
  // (8, 8) is a corner of all four cells' tiles.
  assert!(mesh.set_height(8, 8, 50.0));
  assert_eq!(mesh.height(8.0, 8.0), 50.0);
  for tile in mesh.tiles() {
    let (ro, co) = tile.offset();
    let local = if tile.is_mirror() {
      ro.checked_sub(8).zip(co.checked_sub(8))
    } else {
      8u32.checked_sub(ro).zip(8u32.checked_sub(co))
    };
    if let Some(h) = local.and_then(|(r, c)| tile.height(r, c)) {
      assert_eq!(h, 50.0, "{:?}", tile.id());
    }
  }
  assert_eq!(mesh.height_range().1, 50.0);
  assert!(!mesh.set_height(40, 0, 1.0));
}

// =========================================================================
// Ray test
// =========================================================================

#[test]
fn test_ray_test_hits_surface() {
  let mesh = plane_mesh(2);
  let hit = mesh
    .ray_test(Vec3::new(11.3, 50.0, 5.2), Vec3::new(11.3, -50.0, 5.2))
    .unwrap();
  assert!((hit.point.y - mesh.height(11.3, 5.2)).abs() < 1e-3, "{hit:?}");
  assert!(mesh.index_space().is_leaf(hit.index));
  // x + z > 8 inside cell (1, 0): the mirror half.
  assert_eq!(hit.tile, mesh.cell_tile(1, 0, true));
}

#[test]
fn test_ray_test_keeps_nearest_hit() {
  let mesh = plane_mesh(2);
  let (p1, p2) = (Vec3::new(-2.0, 20.0, -2.0), Vec3::new(18.0, -4.0, 14.0));
  let hit = mesh.ray_test(p1, p2).unwrap();
  let expected = mesh.height(hit.point.x, hit.point.z);
  assert!((hit.point.y - expected).abs() < 1e-3, "{hit:?}");
  // Above the surface until the hit.
  for step in 0..20 {
    let p = p1.lerp(p2, hit.t * step as f32 / 20.0);
    if p.x >= 0.0 && p.z >= 0.0 {
      assert!(p.y > mesh.height(p.x, p.z));
    }
  }
}

#[test]
fn test_ray_test_misses() {
  let mesh = plane_mesh(2);
  // Beside the mesh.
  assert_eq!(mesh.ray_test(Vec3::new(-3.0, 50.0, 4.0), Vec3::new(-3.0, -50.0, 4.0)), None);
  // Over the mesh, stopping short of the surface.
  assert_eq!(mesh.ray_test(Vec3::new(4.0, 50.0, 4.0), Vec3::new(4.0, 3.5, 4.0)), None);
}
