use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use tempfile::TempDir;
use watchpost_index::{build_index, BuildOptions, HashingEmbedder, Retriever};

fn bench_query_200_docs(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("source");
    std::fs::create_dir_all(&source).unwrap();
    for i in 0..200 {
        let text = format!(
            "# Case {i}\n\nPerson {i} entered zone {} without a badge near door {}.",
            i % 7,
            i % 13
        );
        std::fs::write(source.join(format!("case_{i:04}.md")), text).unwrap();
    }

    let index_path = temp_dir.path().join("knowledge.db");
    let embedder = Arc::new(HashingEmbedder::new(384));
    build_index(&source, &index_path, embedder.as_ref(), BuildOptions::default()).unwrap();
    let retriever = Retriever::with_embedder(&index_path, "", embedder);

    c.bench_function("retriever_query_200_docs", |b| {
        b.iter(|| retriever.query(black_box("person without badge in zone 3"), 3, 0.3));
    });
}

criterion_group!(benches, bench_query_200_docs);
criterion_main!(benches);
