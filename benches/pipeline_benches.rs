use criterion::{Criterion, criterion_group, criterion_main};
use dae_reduce::Examples::thermodynamics_examples::{BASIC_VOLUME_ENERGY_CONSERVATION, BASIC_VOLUME_TEST};
use dae_reduce::dae::dependents::OutputRequest;
use dae_reduce::dae::model::Model;
use dae_reduce::dae::pipeline::{reduce, simulate};
use dae_reduce::numerical::NonStiff_api::IntegratorOptions;
use dae_reduce::symbolic::utils::linspace;
use std::collections::HashMap;
use std::hint::black_box;

fn bench_reduce(c: &mut Criterion) {
    let model = Model::parse(BASIC_VOLUME_TEST).unwrap();
    c.bench_function("reduce BasicVolumeTest", |b| {
        b.iter(|| reduce(black_box(&model)).unwrap())
    });
}

/// nonlinear algebraic chain, resolved by topological substitution
fn bench_reduce_chain(c: &mut Criterion) {
    let n = 50;
    let mut text = String::from("state x start 1\n");
    for i in 0..n {
        text.push_str(&format!("algebraic z{}\n", i));
    }
    text.push_str("equation z0 = x\n");
    for i in 1..n {
        text.push_str(&format!("equation z{} = sin(z{}) + x\n", i, i - 1));
    }
    text.push_str(&format!("equation der(x) = -z{}\n", n - 1));
    let model = Model::parse(&text).unwrap();
    c.bench_function("reduce chain of 50", |b| {
        b.iter(|| reduce(black_box(&model)).unwrap())
    });
}

fn bench_simulate(c: &mut Criterion) {
    let model = Model::parse(BASIC_VOLUME_ENERGY_CONSERVATION).unwrap();
    let outputs = vec![OutputRequest::named("T"), OutputRequest::named("P")];
    c.bench_function("simulate BasicVolumeEnergyConservation", |b| {
        b.iter(|| {
            simulate(
                black_box(&model),
                &outputs,
                linspace(0.0, 10.0, 100),
                &HashMap::new(),
                IntegratorOptions::default(),
            )
            .unwrap()
        })
    });
}

criterion_group!(benches, bench_reduce, bench_reduce_chain, bench_simulate);
criterion_main!(benches);
