use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use jpeg_encoder::{ColorType, Encoder, SamplingFactor};
use jpegdec::Decoder;

const WIDTH: u16 = 256;
const HEIGHT: u16 = 256;

fn encode(sampling: SamplingFactor) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(usize::from(WIDTH) * usize::from(HEIGHT) * 3);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            rgb.extend([x as u8, y as u8, (x ^ y) as u8]);
        }
    }

    let mut jpeg = Vec::new();
    let mut enc = Encoder::new(&mut jpeg, 90);
    enc.set_sampling_factor(sampling);
    enc.encode(&rgb, WIDTH, HEIGHT, ColorType::Rgb).unwrap();
    jpeg
}

fn decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for (name, sampling) in [
        ("4:4:4", SamplingFactor::R_4_4_4),
        ("4:2:0", SamplingFactor::R_4_2_0),
    ] {
        let jpeg = encode(sampling);
        group.throughput(Throughput::Bytes(jpeg.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| Decoder::from_bytes(black_box(&jpeg)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, decode);
criterion_main!(benches);
