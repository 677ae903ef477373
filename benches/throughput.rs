//! Throughput Benchmark for muxecho
//!
//! This benchmark measures the per-event cost of the connection handlers
//! and of the echo matcher, without any sockets or poll involved.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use mio::Token;
use muxecho::connection::{
    Accounting, ClientConnection, ConnectionStats, EchoTracker, EventHandler, ServerConnection,
};
use muxecho::reactor::Readiness;
use muxecho::ECHO_SUFFIX;
use std::io::{self, Read, Write};

/// Hands out the same payload on every read and swallows every write.
struct LoopSocket {
    payload: Vec<u8>,
}

impl Read for LoopSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.payload.len().min(buf.len());
        buf[..n].copy_from_slice(&self.payload[..n]);
        Ok(n)
    }
}

impl Write for LoopSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(black_box(buf).len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Benchmark a read + write event on a server connection
fn bench_server_echo(c: &mut Criterion) {
    let stats = ConnectionStats::new();
    let ready = Readiness::new(Token(1), true, true);

    let mut group = c.benchmark_group("server_echo");

    for size in [16usize, 512, 1024] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("chunk_{size}"), |b| {
            let mut conn = ServerConnection::new("127.0.0.1:9000".parse().unwrap());
            let mut socket = LoopSocket {
                payload: vec![b'x'; size],
            };
            b.iter(|| {
                black_box(conn.dispatch(ready, &mut socket, &stats).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark the client's send path over the fixed messages
fn bench_client_send(c: &mut Criterion) {
    let stats = ConnectionStats::new();
    let ready = Readiness::new(Token(1), false, true);
    let messages = [
        Bytes::from_static(b"Message 1 from client."),
        Bytes::from_static(b"Message 2 from client."),
    ];

    let mut group = c.benchmark_group("client_send");
    group.throughput(Throughput::Elements(1));

    group.bench_function("two_messages", |b| {
        let mut socket = LoopSocket {
            payload: Vec::new(),
        };
        b.iter(|| {
            let mut conn = ClientConnection::new(1, &messages, Accounting::Echo);
            conn.dispatch(ready, &mut socket, &stats).unwrap();
            conn.dispatch(ready, &mut socket, &stats).unwrap();
            black_box(conn.messages_sent());
        });
    });

    group.finish();
}

/// Benchmark the echo matcher with different server chunkings
fn bench_echo_tracker(c: &mut Criterion) {
    let sent = Bytes::from("Message 1 from client.".repeat(64));

    let mut group = c.benchmark_group("echo_tracker");
    group.throughput(Throughput::Bytes(sent.len() as u64));

    for chunk in [8usize, 64, 1024] {
        let mut reply = Vec::new();
        for piece in sent.chunks(chunk) {
            reply.extend_from_slice(piece);
            reply.extend_from_slice(ECHO_SUFFIX);
        }

        group.bench_function(format!("server_chunk_{chunk}"), |b| {
            b.iter(|| {
                let mut tracker = EchoTracker::new(sent.clone(), ECHO_SUFFIX);
                tracker.feed(&reply).unwrap();
                black_box(tracker.is_complete());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_server_echo,
    bench_client_send,
    bench_echo_tracker
);
criterion_main!(benches);
