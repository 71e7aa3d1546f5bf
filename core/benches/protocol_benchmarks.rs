//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use mudlink_core::telnet::{TelnetParser, escape_iac};
use mudlink_core::{Catch, CatcherPipeline, Direction, FnCatcher, LineBuffer};
use std::hint::black_box;
use std::sync::Arc;

/// A screenful of MUD output with a trailing prompt
fn sample_output(lines: usize) -> Vec<u8> {
    let mut output = Vec::new();
    for index in 0..lines {
        output.extend_from_slice(
            format!("A goblin swings at you and misses. ({})\r\n", index).as_bytes(),
        );
    }
    output.extend_from_slice(b"<100hp 50m> ");
    output
}

/// Benchmark line splitting for different chunk sizes
fn bench_line_buffer(c: &mut Criterion) {
    let output = sample_output(200);
    let mut group = c.benchmark_group("line_buffer");

    for chunk_size in [16usize, 512, 4096] {
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                b.iter(|| {
                    let mut buffer = LineBuffer::new();
                    let mut count = 0;
                    for chunk in output.chunks(chunk_size) {
                        count += buffer.add(black_box(chunk)).count();
                    }
                    count
                });
            },
        );
    }

    group.finish();
}

/// Benchmark telnet parsing of data interleaved with negotiation
fn bench_telnet_parser(c: &mut Criterion) {
    let mut stream = Vec::new();
    for _ in 0..100 {
        stream.extend_from_slice(b"You are standing in a field.\r\n");
        stream.extend_from_slice(&[255, 251, 1, 255, 249]);
    }

    c.bench_function("telnet_parse", |b| {
        b.iter(|| {
            let mut parser = TelnetParser::new();
            let mut offset = 0;
            let mut events = 0;
            while offset < stream.len() {
                let parsed = parser.feed(black_box(&stream[offset..]));
                offset += parsed.consumed;
                events += parsed.events.len();
            }
            events
        });
    });
}

/// Benchmark IAC escaping with and without IAC bytes present
fn bench_escape_iac(c: &mut Criterion) {
    let plain = vec![b'x'; 1024];
    let mut binary = vec![b'x'; 1024];
    for byte in binary.iter_mut().step_by(16) {
        *byte = 255;
    }

    let mut group = c.benchmark_group("escape_iac");
    group.bench_function("plain", |b| b.iter(|| escape_iac(black_box(&plain)).len()));
    group.bench_function("binary", |b| b.iter(|| escape_iac(black_box(&binary)).len()));
    group.finish();
}

/// Benchmark a pass through a pipeline of typical catchers
fn bench_catcher_pipeline(c: &mut Criterion) {
    let pipeline = CatcherPipeline::new(Direction::Input);
    for index in 0..10 {
        pipeline.add(
            Arc::new(FnCatcher::listen(format!("logger-{}", index), |line| {
                black_box(line.len());
            })),
            false,
        );
    }
    pipeline.add(
        Arc::new(FnCatcher::muffle("gag", |line| {
            if line.contains("spam") {
                Catch::Suppress
            } else {
                Catch::Pass
            }
        })),
        false,
    );

    c.bench_function("catcher_pipeline_apply", |b| {
        b.iter(|| pipeline.apply(black_box("A goblin swings at you and misses.")));
    });
}

criterion_group!(
    benches,
    bench_line_buffer,
    bench_telnet_parser,
    bench_escape_iac,
    bench_catcher_pipeline,
);
criterion_main!(benches);
