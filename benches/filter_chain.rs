use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use genepi::select::encoder::{InteractionEncoder, PairwiseEncoder};
use genepi::select::features::FeatureMatrix;
use genepi::select::screen::{chi_square_screen, remove_redundant};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const N_SUBJECTS: usize = 2_000;

/// Random dosages in 0..=2, with the first column copied into the outcome.
fn cohort(n_features: usize) -> (FeatureMatrix, Array1<u8>) {
    let mut rng = StdRng::seed_from_u64(42);
    let genotype = Array2::from_shape_fn((N_SUBJECTS, n_features), |_| rng.gen_range(0..=2i8));
    let labels = genotype.column(0).mapv(|g| u8::from(g > 0));
    let ids = (0..n_features).map(|j| format!("rs{j}")).collect();
    (FeatureMatrix::new(genotype, ids).unwrap(), labels)
}

fn benchmark_filter_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_chain");
    for n_features in [50usize, 200, 800] {
        let (features, labels) = cohort(n_features);
        group.throughput(Throughput::Elements((N_SUBJECTS * n_features) as u64));

        group.bench_with_input(BenchmarkId::new("chi_square", n_features), &features, |b, input| {
            b.iter(|| chi_square_screen(black_box(input), labels.view(), 5.0).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("redundancy", n_features), &features, |b, input| {
            b.iter(|| remove_redundant(black_box(input)).unwrap())
        });

        if n_features <= 200 {
            group.bench_with_input(BenchmarkId::new("pairwise", n_features), &features, |b, input| {
                b.iter(|| PairwiseEncoder.encode(black_box(input), labels.view(), 1).unwrap())
            });
        }
    }
    group.finish();
}

criterion_group!(filter_chain, benchmark_filter_chain);
criterion_main!(filter_chain);
