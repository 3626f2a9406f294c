//! Benchmarks for expression resolution and pipeline execution.

use brickflow::bricks::{ids, BrickRegistry};
use brickflow::context::BrickContext;
use brickflow::expression::{resolve, ConfigValue};
use brickflow::pipeline::{BrickInvocation, Pipeline, PipelineExecutor, RunOptions};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};
use std::sync::Arc;

fn resolver_benchmark(c: &mut Criterion) {
    let context = BrickContext::from_value(json!({
        "@input": {"user": {"name": "Ada", "tags": ["a", "b", "c"]}},
        "@mod": {"count": 3},
    }));
    let template = ConfigValue::template("Hello {{ @input.user.name }} ({{ @mod.count }})");
    let var = ConfigValue::var("@input.user.tags.1");

    c.bench_function("resolve_template", |b| {
        b.iter(|| resolve(black_box(&template), &context));
    });
    c.bench_function("resolve_var", |b| {
        b.iter(|| resolve(black_box(&var), &context));
    });
}

fn executor_benchmark(c: &mut Criterion) {
    let Ok(runtime) = tokio::runtime::Runtime::new() else {
        return;
    };
    let executor = PipelineExecutor::new(Arc::new(BrickRegistry::with_builtins()));
    let pipeline = Pipeline::new(vec![
        BrickInvocation::new(ids::ECHO).with_config("message", "start"),
        BrickInvocation::new(ids::IF_ELSE)
            .with_config("condition", json!(true))
            .with_config(
                "if",
                ConfigValue::pipeline(vec![BrickInvocation::new(ids::ECHO)
                    .with_config("message", ConfigValue::template("{{ @input }}!"))]),
            ),
        BrickInvocation::new(ids::ASSIGN)
            .with_config("variableName", "last")
            .with_config("value", ConfigValue::var("@input")),
    ]);

    c.bench_function("run_pipeline", |b| {
        b.iter(|| {
            runtime.block_on(executor.run(
                black_box(&pipeline),
                Value::Null,
                RunOptions::new().with_mod_id("bench"),
            ))
        });
    });
}

criterion_group!(benches, resolver_benchmark, executor_benchmark);
criterion_main!(benches);
