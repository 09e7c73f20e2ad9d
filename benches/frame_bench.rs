use std::sync::Arc;

use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use qortal_lite_protocol::core::{frame, Frame, FrameCodec, MessageType};
use qortal_lite_protocol::pow::{memory_pow, PowEngine, ScratchArena};
use tokio_util::codec::{Decoder, Encoder};

#[allow(clippy::unwrap_used)]
fn bench_frame_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode_decode");
    let payload_sizes = [64usize, 512, 4096, 65536, 1024 * 1024];

    for &size in &payload_sizes {
        let payload = vec![0u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter_batched(
                || Frame::new(MessageType::ACCOUNT.code(), Some(7), vec![0u8; size]),
                |frame| {
                    let mut buf = BytesMut::with_capacity(size + 32);
                    let mut codec = FrameCodec::new();
                    codec.encode(frame, &mut buf).unwrap();
                },
                BatchSize::SmallInput,
            )
        });
        group.bench_function(format!("parse_{size}b"), |b| {
            let encoded = frame::encode(MessageType::ACCOUNT.code(), &payload, 7);
            b.iter(|| {
                let parsed = frame::parse(&encoded);
                assert!(matches!(parsed, Ok(frame::Parsed::Frame { .. })));
            })
        });
    }

    group.finish();
}

/// A read carrying many small frames behind a run of line noise
#[allow(clippy::unwrap_used)]
fn bench_codec_stream(c: &mut Criterion) {
    let mut stream = vec![0xAAu8; 1024];
    for id in 0..256 {
        stream.extend_from_slice(&frame::encode(MessageType::PING.code(), &[0], id));
    }

    let mut group = c.benchmark_group("codec_stream");
    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("resync_and_drain_256_frames", |b| {
        b.iter_batched(
            || BytesMut::from(&stream[..]),
            |mut buf| {
                let mut codec = FrameCodec::new();
                let mut frames = 0;
                while codec.decode(&mut buf).unwrap().is_some() {
                    frames += 1;
                }
                assert_eq!(frames, 256);
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_pow(c: &mut Criterion) {
    let mut group = c.benchmark_group("pow");
    group.sample_size(10);

    let hash = [0x5Au8; 32];
    let mut work = vec![0u8; 2 * 1024 * 1024];
    group.bench_function("search_difficulty_2", |b| {
        b.iter(|| memory_pow::compute(&hash, &mut work, 2))
    });

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let arena = ScratchArena::new(8 * 1024 * 1024, 512 * 1024).unwrap();
    let engine = Arc::new(PowEngine::new(Arc::new(arena), 2 * 1024 * 1024));
    group.bench_function("engine_cycle", |b| {
        b.iter(|| runtime.block_on(engine.compute(b"bench-challenge", 2)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_frame_encode_decode, bench_codec_stream, bench_pow);
criterion_main!(benches);
