//! Stabilization benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use modelgraph_core::{Data, FieldDefinition, FieldInput, LocalId, ModelDecl, ModelManager};
use serde_json::json;

fn forum() -> ModelManager {
    let mut manager = ModelManager::default();
    manager
        .declare(
            ModelDecl::new("Topic")
                .with_field(FieldDefinition::attr("id"))
                .with_field(FieldDefinition::attr("title"))
                .with_field(
                    FieldDefinition::one2many("posts", "Post")
                        .inverse("topic")
                        .causal(),
                )
                .with_field(FieldDefinition::attr("postCount").compute("computePostCount", ["posts"]))
                .with_method("computePostCount", |topic| {
                    FieldInput::value(json!(topic.many("posts").len()))
                })
                .with_natural_key(["id"]),
        )
        .unwrap();
    manager
        .declare(
            ModelDecl::new("Post")
                .with_field(FieldDefinition::attr("body"))
                .with_field(FieldDefinition::many2one("topic", "Topic").inverse("posts"))
                .with_field(FieldDefinition::attr("topicTitle").related("topic.title")),
        )
        .unwrap();
    manager.start().unwrap();
    manager
}

fn populated(posts: usize) -> (ModelManager, LocalId) {
    let mut manager = forum();
    let topic = manager
        .create("Topic", Data::new().set("id", 1).set("title", "t"))
        .unwrap();
    let data: Vec<Data> = (0..posts)
        .map(|i| Data::new().set("body", format!("post {}", i)))
        .collect();
    manager
        .update(&topic, Data::new().create("posts", data))
        .unwrap();
    (manager, topic)
}

fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("stabilize/create");

    for count in [100, 1000] {
        group.bench_with_input(BenchmarkId::new("posts", count), &count, |b, &count| {
            b.iter(|| black_box(populated(count)));
        });
    }

    group.finish();
}

fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("stabilize/related_fanout");

    for count in [100, 1000] {
        group.bench_with_input(BenchmarkId::new("posts", count), &count, |b, &count| {
            let (mut manager, topic) = populated(count);
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                manager
                    .update(&topic, Data::new().set("title", format!("title {}", i)))
                    .unwrap();
            });
        });
    }

    group.finish();
}

fn bench_cascade(c: &mut Criterion) {
    let mut group = c.benchmark_group("stabilize/cascade_delete");

    for count in [100, 1000] {
        group.bench_with_input(BenchmarkId::new("posts", count), &count, |b, &count| {
            b.iter_with_setup(
                || populated(count),
                |(mut manager, topic)| {
                    manager.delete(&topic).unwrap();
                    black_box(manager.stats())
                },
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_create, bench_fanout, bench_cascade);
criterion_main!(benches);
