use criterion::{Criterion, black_box, criterion_group, criterion_main};
use cbir::config::ExtractOptions;
use cbir::descriptor::{
    DescriptorExtractor, dominant_colors, edge_histogram, gabor_features, gray_view,
    hog_features, lbp_histogram, to_gray,
};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// 生成带随机噪声的测试图片
fn generate_image(w: u32, h: u32) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(42); // 使用固定种子确保结果可重现
    RgbImage::from_fn(w, h, |x, y| {
        let base = ((x + y) % 256) as u8;
        Rgb([base, rng.random::<u8>() / 4 + base / 2, 255 - base])
    })
}

fn bench_modalities(c: &mut Criterion) {
    let mut group = c.benchmark_group("modalities_256x256");
    let image = black_box(generate_image(256, 256));
    let gray = to_gray(&image).unwrap();

    group.bench_function("dominant_colors", |b| b.iter(|| dominant_colors(&image, 1)));
    group.bench_function("gabor_features", |b| b.iter(|| gabor_features(&gray).unwrap()));
    group.bench_function("lbp_histogram", |b| b.iter(|| lbp_histogram(gray_view(&gray).unwrap())));
    group.bench_function("hog_features", |b| b.iter(|| hog_features(&gray).unwrap()));
    group.bench_function("edge_histogram", |b| b.iter(|| edge_histogram(&gray).unwrap()));

    group.finish();
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");
    group.sample_size(10);

    let extractor = DescriptorExtractor::create(ExtractOptions { seed: Some(1) });
    for (w, h) in [(128, 128), (512, 384)] {
        let image = black_box(generate_image(w, h));
        group.bench_function(format!("extract_{w}x{h}"), |b| {
            b.iter(|| extractor.extract_image(&image).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_modalities, bench_extract);
criterion_main!(benches);
