use bempp_maxwell::assembly::{assemble, AcaOptions, AssemblyContext};
use bempp_maxwell::function::RaviartThomasSpace;
use bempp_maxwell::grid::shapes::regular_sphere;
use bempp_maxwell::operator::BoundaryOperator;
use bempp_maxwell::traits::FunctionSpace;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

pub fn assembly_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("assembly");
    group.sample_size(10);

    for i in 2..4 {
        let space = Arc::new(RaviartThomasSpace::new(Arc::new(regular_sphere(i))));
        let operator =
            BoundaryOperator::single_layer(space.clone(), space.clone(), space.clone(), 2.0);
        let dense = AssemblyContext::dense();
        let aca = AssemblyContext::aca(AcaOptions::default());

        group.bench_function(
            format!(
                "Dense assembly of {}x{} single layer matrix",
                space.global_size(),
                space.global_size()
            ),
            |b| b.iter(|| black_box(assemble(&operator, &dense))),
        );
        group.bench_function(
            format!(
                "ACA assembly of {}x{} single layer matrix",
                space.global_size(),
                space.global_size()
            ),
            |b| b.iter(|| black_box(assemble(&operator, &aca))),
        );
    }
    group.finish();
}

criterion_group!(benches, assembly_benchmark);
criterion_main!(benches);
