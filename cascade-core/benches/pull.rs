//! # Pull Benchmark
//!
//! Measures pulls over a linear chain of increment nodes: a cached pull, and
//! a pull after writing the chain's head literal.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use cascade_core::error::CalcError;
use cascade_core::graph::{Args, Graph, InputRef, Node, NodeSchema, OutputRef, Outputs, PortSpec};
use cascade_core::value::{Value, ValueKind};

struct Increment;

impl Node for Increment {
    fn schema(&self) -> NodeSchema {
        NodeSchema::new("Increment")
            .input(PortSpec::new("x").kind(ValueKind::Int).default_value(0))
            .output(PortSpec::new("y").kind(ValueKind::Int))
    }

    fn calculate(&mut self, args: &Args<'_>) -> Result<Outputs, CalcError> {
        Ok(Value::Int(args.int(0)? + 1).into())
    }
}

/// Builds a chain of `len` nodes; returns the head input and the tail output.
fn chain(len: usize) -> (Graph, InputRef, OutputRef) {
    let mut graph = Graph::new();
    let head = graph.add_node(Increment);
    let head_input = graph.input(head, "x").unwrap();
    let mut tail = graph.output(head, "y").unwrap();
    for _ in 1..len {
        let id = graph.add_node(Increment);
        let x = graph.input(id, "x").unwrap();
        graph.connect(tail, x).unwrap();
        tail = graph.output(id, "y").unwrap();
    }
    (graph, head_input, tail)
}

fn pull_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("pull_chain");

    for size in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("cached", size), size, |b, &size| {
            let (mut graph, _, tail) = chain(size);
            graph.pull(tail);
            b.iter(|| black_box(graph.pull(tail)));
        });

        group.bench_with_input(BenchmarkId::new("after_write", size), size, |b, &size| {
            let (mut graph, head, tail) = chain(size);
            let mut seed = 0i64;
            b.iter(|| {
                seed += 1;
                graph.assign(head, seed).unwrap();
                black_box(graph.pull(tail))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, pull_benchmark);
criterion_main!(benches);
