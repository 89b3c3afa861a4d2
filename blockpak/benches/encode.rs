use blockpak::{encode_bitmap, Bitmap, EncodeOptions, Format};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// Reproducible noise so runs stay comparable.
fn noise_bitmap(width: u32, height: u32) -> Bitmap {
    let mut bitmap = Bitmap::new(width, height);
    let mut state = 0x1234_5678u32;
    for y in 0..height {
        for x in 0..width {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            bitmap.set_pixel(x, y, state | 0xFF00_0000);
        }
    }
    bitmap
}

fn encode_formats(c: &mut Criterion) {
    let bitmap = noise_bitmap(256, 256);
    for format in [
        Format::Etc1,
        Format::Etc2Rgb,
        Format::Etc2Rgba,
        Format::Dxt1,
        Format::Dxt5,
    ] {
        c.bench_function(&format!("encode 256x256 {format}"), |b| {
            b.iter(|| {
                encode_bitmap(
                    black_box(&bitmap),
                    black_box(format),
                    black_box(EncodeOptions::default()),
                )
                .unwrap()
            });
        });
    }
}

fn decode_formats(c: &mut Criterion) {
    let bitmap = noise_bitmap(256, 256);
    for format in [Format::Etc2Rgb, Format::Dxt1] {
        let encoded = encode_bitmap(&bitmap, format, EncodeOptions::default()).unwrap();
        c.bench_function(&format!("decode 256x256 {format}"), |b| {
            b.iter(|| black_box(&encoded).decode());
        });
    }
}

criterion_group!(benches, encode_formats, decode_formats);
criterion_main!(benches);
