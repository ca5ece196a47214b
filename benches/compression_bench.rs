#![allow(clippy::unwrap_used, clippy::uninlined_format_args)]

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use game_sync_protocol::core::payload::{Payload, Position, PositionUpdate};
use game_sync_protocol::utils::compression::{CompressionKind, CompressionPipeline, Compressor};

fn bench_codecs(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression");
    let sizes = [16usize, 256, 4096, 65536];

    for kind in [CompressionKind::Lz4, CompressionKind::Zstd] {
        let codec = kind.build(1024 * 1024);
        for &size in &sizes {
            let data: Vec<u8> = (0..size).map(|i| (i % 31) as u8).collect();
            group.throughput(Throughput::Bytes(size as u64));
            group.bench_function(format!("{}_compress_{}b", codec.name(), size), |b| {
                b.iter_batched(
                    || data.clone(),
                    |d| {
                        let _ = codec.compress(&d).unwrap();
                    },
                    BatchSize::SmallInput,
                )
            });
            group.bench_function(format!("{}_decompress_{}b", codec.name(), size), |b| {
                let compressed = codec.compress(&data).unwrap();
                b.iter(|| {
                    let out = codec.decompress(&compressed).unwrap();
                    assert_eq!(out.len(), data.len());
                })
            });
        }
    }

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let pipeline = CompressionPipeline::new(CompressionKind::Lz4.build(1024 * 1024));
    pipeline.set_outbound(true);
    let envelope = PositionUpdate(Position::new(1.0, 2.0, 3.0, 4.0)).to_envelope();

    c.bench_function("pipeline_encode_position_lz4", |b| {
        b.iter_batched(
            || envelope.clone(),
            |e| pipeline.encode_outbound(e).unwrap(),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_codecs, bench_pipeline);
criterion_main!(benches);
