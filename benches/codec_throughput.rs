//! Codec throughput benchmark suite.
//!
//! Benchmarks frame encoding and decoding for both protocol generations:
//! - Payload sizes: 16 B, 1 KiB, 16 KiB
//! - Full session pipeline: handshake then a burst of frames
//!
//! Run with: cargo bench --bench codec_throughput
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use websocket_server::protocol::{legacy, modern};
use websocket_server::{
    Connection, Frame, Opcode, ProtocolVariant, RouteRegistry, Session, SessionId,
    SessionSettings, Upstream,
};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const PAYLOAD_SIZES: &[usize] = &[16, 1024, 16 * 1024];
const MAX_PACKET: usize = 1 << 20;
const MASK: [u8; 4] = [0x11, 0x22, 0x33, 0x44];
const BURST: usize = 256;

const HANDSHAKE: &[u8] = b"GET /sink HTTP/1.1\r\n\
    Host: localhost\r\n\
    Upgrade: websocket\r\n\
    Connection: Upgrade\r\n\
    Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
    Sec-WebSocket-Version: 13\r\n\r\n";

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for &size in PAYLOAD_SIZES {
        let payload = vec![b'x'; size];
        group.throughput(Throughput::Bytes(size as u64));

        for variant in [ProtocolVariant::Legacy, ProtocolVariant::Modern] {
            group.bench_with_input(
                BenchmarkId::new(variant.to_string(), size),
                &payload,
                |b, payload| {
                    b.iter(|| variant.encode(black_box(payload), Opcode::Binary));
                },
            );
        }
    }

    group.finish();
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for &size in PAYLOAD_SIZES {
        let payload = vec![b'x'; size];
        group.throughput(Throughput::Bytes(size as u64));

        let Ok(legacy_bytes) = legacy::encode(&payload, Opcode::Binary) else {
            continue;
        };
        group.bench_with_input(BenchmarkId::new("legacy", size), &legacy_bytes, |b, bytes| {
            b.iter(|| legacy::decode(black_box(bytes), MAX_PACKET));
        });

        // Modern lengths above u16 are not encodable.
        let Ok(modern_bytes) = modern::encode_masked(&payload, Opcode::Binary, MASK) else {
            continue;
        };
        group.bench_with_input(BenchmarkId::new("rfc6455", size), &modern_bytes, |b, bytes| {
            b.iter(|| modern::decode(black_box(bytes), MAX_PACKET));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Session Pipeline
// ============================================================================

struct Sink;

impl Upstream for Sink {
    fn on_frame(&mut self, _conn: &mut Connection, frame: Frame) -> bool {
        black_box(frame);
        true
    }
}

fn bench_session(c: &mut Criterion) {
    let routes = Arc::new(RouteRegistry::new());
    routes.set(
        "sink",
        Arc::new(|_: &Connection| Some(Box::new(Sink) as Box<dyn Upstream>)),
    );
    let settings = SessionSettings::new(MAX_PACKET, routes);

    let frame = modern::encode_masked(&[b'x'; 1024], Opcode::Text, MASK)
        .expect("1 KiB frame encodes");
    let burst: Vec<u8> = frame.repeat(BURST);

    let mut group = c.benchmark_group("session");
    group.throughput(Throughput::Bytes(burst.len() as u64));
    group.bench_function("handshake_and_burst", |b| {
        b.iter(|| {
            let mut session = Session::new(SessionId::next(), None, settings.clone());
            session.on_data(HANDSHAKE).expect("handshake");
            session.on_data(black_box(&burst)).expect("burst");
            session.take_output()
        });
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_session);
criterion_main!(benches);
