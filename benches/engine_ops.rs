use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use framewise::hasher::{hash_short_string, hash_values};
use framewise::model::artifact::DataplaneArtifact;
use framewise::{Context, Frame, Model, ModelArtifact, PredictionEngine, ResultAggregator};

const WORDS: [&str; 12] = [
    "the", "cat", "sat", "on", "a", "mat", "and", "dog", "ran", "to", "it", "quickly",
];

fn corpus(len: usize) -> Vec<&'static str> {
    (0..len).map(|i| WORDS[(i * 7 + i / 3) % WORDS.len()]).collect()
}

/// Window 5 model trained on the bench corpus itself
fn model() -> Model {
    let mut dp = DataplaneArtifact::token("pos", "text", 5, 2);
    let full = dp.add_number_set(&[0, 1, 2, 3, 4]);
    let identity = dp.add_number_set(&[2]);
    let left = dp.add_number_set(&[1, 2]);
    let right = dp.add_number_set(&[2, 3]);
    let outer = dp.add_number_set(&[0, 4]);
    dp.full_set = Some(full);
    dp.identity_set = Some(identity);

    let f = |t: &str| hash_short_string(t, 0);
    let train = corpus(256);
    for w in train.windows(5) {
        let value = (f(w[2]).unsigned_abs() % 8) as i64 + 1;
        let g = dp.add_group(&[(value, 0.7), (value + 1, 0.3)]);
        dp.observe(identity, i64::from(f(w[2])), g);
        dp.observe(left, hash_values(2, &[f(w[1]), f(w[2])]), g);
        dp.observe(right, hash_values(2, &[f(w[2]), f(w[3])]), g);
        dp.observe(outer, hash_values(2, &[f(w[0]), f(w[4])]), g);
        let ids: Vec<i32> = w.iter().map(|t| f(*t)).collect();
        dp.observe(full, hash_values(5, &ids), g);
    }
    dp.defaults = vec![(0.5, 1), (0.3, 2), (0.2, 3)];
    ModelArtifact::new("bench", dp)
        .into_model()
        .unwrap_or_else(|e| panic!("bench model: {e}"))
}

fn bench_hashing(c: &mut Criterion) {
    let mut group = c.benchmark_group("hashing");

    group.bench_function("short_string", |bencher| {
        bencher.iter(|| hash_short_string(black_box("quickly"), 0))
    });

    group.bench_function("short_string_pair", |bencher| {
        bencher.iter(|| hash_short_string(black_box("on"), 0))
    });

    for wc in [1usize, 2, 5] {
        let values: Vec<i32> = (0..wc as i32).map(|v| v * 1_000_003 - 7).collect();
        group.bench_with_input(BenchmarkId::new("hash_values", wc), &values, |bencher, v| {
            bencher.iter(|| hash_values(wc, black_box(v)))
        });
    }

    group.finish();
}

fn bench_framing(c: &mut Criterion) {
    let model = model();
    let engine = PredictionEngine::new(&model);
    let dp = model.default_dataplane();
    let seq = corpus(128);

    let mut group = c.benchmark_group("framing");

    group.bench_function("sequential_shift", |bencher| {
        bencher.iter(|| {
            let mut ctx = Context::new();
            let mut frame = Frame::new(dp);
            for position in 0..seq.len() {
                black_box(frame.build(&mut ctx, &engine, dp, &seq, position));
            }
        })
    });

    group.bench_function("full_rebuild", |bencher| {
        bencher.iter(|| {
            let mut ctx = Context::new();
            let mut frame = Frame::new(dp);
            for position in 0..seq.len() {
                frame.reset();
                black_box(frame.build(&mut ctx, &engine, dp, &seq, position));
            }
        })
    });

    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let model = model();
    let aggregator = ResultAggregator::new(&model);

    let mut group = c.benchmark_group("predict_batch");
    for len in [16usize, 128, 1024] {
        let batch = vec![corpus(len); 4];
        group.bench_with_input(BenchmarkId::from_parameter(len), &batch, |bencher, batch| {
            bencher.iter(|| black_box(aggregator.predict_batch(black_box(batch))))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_hashing, bench_framing, bench_batch);
criterion_main!(benches);
