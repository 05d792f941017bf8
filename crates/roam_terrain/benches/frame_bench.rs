//! Terrain frame update benchmarks.
//!
//! - **build**: tile initialisation (parallel) and neighbour wiring
//! - **first_frame**: split-only refinement from the roots into the band
//! - **flyover**: steady-state balancing while the camera moves

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec3;
use roam_terrain::{BinTreeMesh, Camera, DetailBand, GridHeightField, TerrainConfig, TerrainStats};

fn field(size: u32) -> GridHeightField {
  GridHeightField::sine(size + 1, size + 1, 12.0, 24.0).expect("height field")
}

fn config() -> TerrainConfig {
  TerrainConfig::default().with_clip(1.0, 400.0)
}

fn camera_at(t: f32, extent: f32) -> Camera {
  let position = Vec3::new(extent * t, 40.0, extent * 0.5);
  Camera::perspective(position, Vec3::new(1.0, -0.3, 0.2), Vec3::Y, 1.0, 16.0 / 9.0)
}

fn bench_build(c: &mut Criterion) {
  let mut group = c.benchmark_group("build");
  for size in [128u32, 256, 512] {
    let field = field(size);
    group.bench_with_input(BenchmarkId::from_parameter(size), &field, |b, field| {
      b.iter(|| BinTreeMesh::build(black_box(field), config()).expect("mesh"))
    });
  }
  group.finish();
}

fn bench_first_frame(c: &mut Criterion) {
  let mut group = c.benchmark_group("first_frame");
  for band in [DetailBand::SMALL, DetailBand::DEFAULT] {
    let field = field(256);
    let camera = camera_at(0.1, 256.0);
    group.bench_with_input(BenchmarkId::from_parameter(band.min_detail), &band, |b, &band| {
      b.iter_batched(
        || BinTreeMesh::build(&field, config().with_detail(band)).expect("mesh"),
        |mut mesh| {
          let mut stats = TerrainStats::default();
          mesh.update_frame(black_box(&camera), 1, &mut stats);
          mesh
        },
        criterion::BatchSize::LargeInput,
      )
    });
  }
  group.finish();
}

fn bench_flyover(c: &mut Criterion) {
  let field = field(256);
  let mut mesh = BinTreeMesh::build(&field, config()).expect("mesh");
  let mut stats = TerrainStats::default();
  mesh.update_frame(&camera_at(0.0, 256.0), 1, &mut stats);

  let mut step = 0u32;
  c.bench_function("flyover (256², default band)", |b| {
    b.iter(|| {
      // Back and forth so the camera never jumps.
      step = (step + 1) % 1200;
      let t = if step < 600 { step } else { 1200 - step };
      let camera = camera_at(t as f32 / 600.0, 256.0);
      mesh.update_frame(black_box(&camera), 1, &mut stats)
    })
  });
}

criterion_group!(benches, bench_build, bench_first_frame, bench_flyover);
criterion_main!(benches);
