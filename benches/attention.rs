use animegan::model::{Generator, SelfAttention};
use burn::backend::NdArray;
use burn::tensor::{Distribution, Tensor};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

type BenchBackend = NdArray<f32>;

fn bench_attention(c: &mut Criterion) {
    let device = Default::default();
    let mut group = c.benchmark_group("self_attention");
    for (channels, side) in [(64usize, 16usize), (32, 32)] {
        let block = SelfAttention::<BenchBackend>::new(channels, &device);
        let input = Tensor::<BenchBackend, 4>::random(
            [4, channels, side, side],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        group.bench_with_input(
            BenchmarkId::new("forward", format!("{channels}x{side}")),
            &input,
            |b, input| b.iter(|| black_box(block.forward(input.clone()))),
        );
    }
    group.finish();
}

fn bench_generator(c: &mut Criterion) {
    let device = Default::default();
    let generator = Generator::<BenchBackend>::new(64, 128, 32, &device);
    let z = Tensor::<BenchBackend, 2>::random([8, 128], Distribution::Normal(0.0, 1.0), &device);
    c.bench_function("generator_forward_64px", |b| {
        b.iter(|| black_box(generator.forward(z.clone())))
    });
}

criterion_group!(benches, bench_attention, bench_generator);
criterion_main!(benches);
