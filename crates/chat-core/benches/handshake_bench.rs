//! Criterion benchmarks for the chat handshake.
//!
//! Measures proof computation, frame encoding/decoding, and a full
//! in-memory handshake, so that connection setup cost stays negligible next
//! to a TCP round trip.
//!
//! Run with:
//! ```bash
//! cargo bench --package chat-core --bench handshake_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use chat_core::connection::loopback::authenticated_pair;
use chat_core::protocol::handshake::{
    decode_frame_len, decode_frame_payload, encode_frame, new_nonce, Credentials,
    HandshakeFrame, HANDSHAKE_VERSION, LEN_PREFIX_SIZE,
};
use chat_core::protocol::message::Inbound;

fn bench_proofs(c: &mut Criterion) {
    let creds = Credentials::new("bench-secret").unwrap();
    let client_nonce = new_nonce();
    let server_nonce = new_nonce();

    c.bench_function("server_proof", |b| {
        b.iter(|| creds.server_proof(black_box(&client_nonce), black_box(&server_nonce)))
    });

    let proof = creds.client_proof(&server_nonce, &client_nonce);
    c.bench_function("verify_client_proof", |b| {
        b.iter(|| {
            creds.verify_client_proof(
                black_box(&server_nonce),
                black_box(&client_nonce),
                black_box(&proof),
            )
        })
    });
}

fn bench_frames(c: &mut Criterion) {
    let frame = HandshakeFrame::Hello {
        version: HANDSHAKE_VERSION,
        client_nonce: new_nonce(),
    };

    c.bench_function("encode_hello", |b| {
        b.iter(|| encode_frame(black_box(&frame)).unwrap())
    });

    let bytes = encode_frame(&frame).unwrap();
    c.bench_function("decode_hello", |b| {
        b.iter(|| {
            let mut prefix = [0u8; LEN_PREFIX_SIZE];
            prefix.copy_from_slice(&bytes[..LEN_PREFIX_SIZE]);
            let len = decode_frame_len(black_box(prefix)).unwrap();
            decode_frame_payload(black_box(&bytes[LEN_PREFIX_SIZE..LEN_PREFIX_SIZE + len]))
                .unwrap()
        })
    });
}

fn bench_classify(c: &mut Criterion) {
    let chunk = "Client: ".to_string() + &"x".repeat(500);
    c.bench_function("classify_512_byte_chunk", |b| {
        b.iter(|| Inbound::from_chunk(black_box(chunk.as_bytes())))
    });
}

fn bench_full_handshake(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let creds = Credentials::new("bench-secret").unwrap();

    c.bench_function("loopback_handshake", |b| {
        b.iter(|| runtime.block_on(authenticated_pair(&creds)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_proofs,
    bench_frames,
    bench_classify,
    bench_full_handshake
);
criterion_main!(benches);
