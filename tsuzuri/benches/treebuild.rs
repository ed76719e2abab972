//! 単語木の構築と圧縮のベンチマーク
//!
//! 合成した単語リストに対して、挿入・圧縮・検索の各速度を計測します。

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use tsuzuri::{CancelToken, TreeKind, WordTree};

/// 決定的に単語リストを合成します。
fn make_words(count: usize) -> Vec<String> {
    // A small alphabet with common suffixes gives the tree plenty of
    // shared tails to compress.
    const STEMS: [&str; 8] = ["walk", "talk", "jump", "read", "play", "work", "cook", "look"];
    const TAILS: [&str; 6] = ["", "s", "ed", "ing", "er", "ers"];

    let mut out = Vec::with_capacity(count);
    let mut n = 1usize;
    while out.len() < count {
        let stem = STEMS[n % STEMS.len()];
        let tail = TAILS[(n / STEMS.len()) % TAILS.len()];
        out.push(format!("{stem}{n}{tail}"));
        n = n.wrapping_mul(31).wrapping_add(7);
    }
    out
}

fn bench_tree_build(c: &mut Criterion) {
    let words = make_words(20_000);
    let cancel = CancelToken::new();

    let mut group = c.benchmark_group("TreeBuild");
    group.throughput(Throughput::Elements(words.len() as u64));
    group.sample_size(10);

    group.bench_function("insert", |b| {
        b.iter(|| {
            let mut tree = WordTree::new(TreeKind::Fold);
            for w in &words {
                tree.insert(w.as_bytes(), 0, 1, 0);
            }
            std::hint::black_box(tree);
        })
    });

    group.bench_function("insert_and_compress", |b| {
        b.iter(|| {
            let mut tree = WordTree::new(TreeKind::Fold);
            for w in &words {
                tree.insert(w.as_bytes(), 0, 1, 0);
            }
            let stats = tree.compress(&cancel).unwrap();
            std::hint::black_box((tree, stats));
        })
    });

    let mut tree = WordTree::new(TreeKind::Fold);
    for w in &words {
        tree.insert(w.as_bytes(), 0, 1, 0);
    }
    tree.compress(&cancel).unwrap();

    group.bench_function("lookup", |b| {
        b.iter(|| {
            for w in &words {
                std::hint::black_box(tree.lookup(w.as_bytes()));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_tree_build);
criterion_main!(benches);
