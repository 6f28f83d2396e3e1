use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use offline_bgremove::{
    remove_background,
    stages::{self, morphology},
    AlphaMask, PipelineOptions, Precision, RasterBuffer, SubjectModel,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Soft gradient background with a noisy ellipse in the middle
fn synthetic_image(width: u32, height: u32) -> RasterBuffer {
    let mut rng = StdRng::seed_from_u64(width as u64 * 31 + height as u64);
    let mut buffer = RasterBuffer::filled(width, height, [0, 0, 0, 255]).unwrap();
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let (rx, ry) = (width as f32 / 3.5, height as f32 / 3.0);

    for y in 0..height {
        for x in 0..width {
            let dx = (x as f32 - cx) / rx;
            let dy = (y as f32 - cy) / ry;
            let pixel = if dx * dx + dy * dy <= 1.0 {
                [
                    140 + rng.gen_range(0..40),
                    60 + rng.gen_range(0..30),
                    30 + rng.gen_range(0..20),
                    255,
                ]
            } else {
                let shade = 200 + (40 * y / height) as u8;
                [shade, shade, shade.saturating_add(10), 255]
            };
            buffer.set_pixel(x, y, pixel);
        }
    }
    buffer
}

fn bench_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_pipeline");
    group.sample_size(10);

    for (width, height) in [(128, 128), (320, 240), (640, 480)] {
        let image = synthetic_image(width, height);
        group.throughput(Throughput::Elements(u64::from(width * height)));

        for precision in [Precision::Fast, Precision::Balanced, Precision::Precise] {
            let options = PipelineOptions::builder()
                .model(SubjectModel::Product)
                .precision(precision)
                .seed(1)
                .build()
                .unwrap();
            group.bench_with_input(
                BenchmarkId::new(precision.to_string(), format!("{width}x{height}")),
                &image,
                |b, image| b.iter(|| remove_background(black_box(image), &options).unwrap()),
            );
        }
    }
    group.finish();
}

fn bench_kmeans(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmeans");
    group.sample_size(20);

    for (width, height) in [(128, 128), (320, 240)] {
        let lab = stages::convert_buffer(&synthetic_image(width, height));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}")),
            &lab,
            |b, lab| {
                b.iter(|| {
                    let mut rng = StdRng::seed_from_u64(7);
                    stages::segment(black_box(lab), &mut rng).unwrap()
                });
            },
        );
    }
    group.finish();
}

fn bench_morphology(c: &mut Criterion) {
    let mut group = c.benchmark_group("morphology");
    let mut rng = StdRng::seed_from_u64(3);
    let (width, height) = (320u32, 240u32);
    let data: Vec<u8> = (0..width * height)
        .map(|_| if rng.gen_bool(0.5) { 255 } else { 0 })
        .collect();
    let mask = AlphaMask::new(data, (width, height));
    let likelihood = vec![0.5f32; (width * height) as usize];

    for iterations in 1..=3 {
        group.bench_with_input(
            BenchmarkId::new("clean", iterations),
            &iterations,
            |b, &iterations| {
                b.iter(|| morphology::clean(black_box(&mask), &likelihood, iterations));
            },
        );
    }
    group.bench_function("smooth_edges_x5", |b| {
        b.iter(|| stages::smooth_edges(black_box(&mask), 5));
    });
    group.finish();
}

criterion_group!(benches, bench_full_pipeline, bench_kmeans, bench_morphology);
criterion_main!(benches);
