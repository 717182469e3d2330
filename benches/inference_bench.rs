//! Inference and settlement benchmarks.
//!
//! Benchmarks:
//! - Joint table computation for each of the 32 evidence vectors
//! - Posterior rounding over a precomputed joint table
//! - A full create/submit/settle cycle through the engine
//!
//! Run:
//!   cargo bench --bench inference_bench

#![allow(missing_docs)]
#![allow(clippy::semicolon_if_nothing_returned)]

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use coldchain::{
    Amount, Cpt, EscrowEngine, EvidenceVector, JointTable, Principal, Priors, Role, infer,
};

// =============================================================================
// HELPERS
// =============================================================================

const TABLES: [[u8; 4]; 5] = [
    [5, 5, 98, 98],
    [1, 99, 1, 99],
    [70, 10, 70, 10],
    [95, 2, 95, 2],
    [20, 80, 80, 99],
];

fn reference_model() -> (Priors, [Cpt; 5]) {
    let priors = Priors::new(90, 90).unwrap();
    let cpts = TABLES.map(|table| Cpt::from_table(table).unwrap());
    (priors, cpts)
}

const ADMIN: Principal = Principal::from_raw(1);
const SENDER: Principal = Principal::from_raw(2);
const CARRIER: Principal = Principal::from_raw(3);
const SENSOR: Principal = Principal::from_raw(4);

fn funded_engine(funding: u64) -> EscrowEngine {
    let mut engine = EscrowEngine::new(ADMIN);
    engine.grant_role(ADMIN, Role::Sender, SENDER).unwrap();
    engine.grant_role(ADMIN, Role::Sensor, SENSOR).unwrap();
    engine.credit(SENDER, Amount::new(funding)).unwrap();
    engine.set_priors(ADMIN, 90, 90).unwrap();
    for (node, table) in (1..=5).zip(TABLES) {
        engine.set_cpt(ADMIN, node, table).unwrap();
    }
    engine
}

// =============================================================================
// INFERENCE
// =============================================================================

fn bench_joint_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("inference/joint_table");
    let (priors, cpts) = reference_model();

    for evidence in ["TTFFT", "TTFTT", "FFFFF"] {
        let evidence: EvidenceVector = evidence.parse().unwrap();
        group.bench_with_input(
            BenchmarkId::from_parameter(evidence),
            &evidence,
            |b, evidence| b.iter(|| JointTable::compute(black_box(priors), &cpts, *evidence)),
        );
    }
    group.finish();
}

fn bench_all_evidence(c: &mut Criterion) {
    let mut group = c.benchmark_group("inference/all_evidence");
    let (priors, cpts) = reference_model();
    let vectors: Vec<EvidenceVector> = EvidenceVector::all().collect();
    group.throughput(Throughput::Elements(vectors.len() as u64));

    group.bench_function("infer", |b| {
        b.iter(|| {
            for evidence in &vectors {
                let _ = black_box(infer(priors, &cpts, *evidence));
            }
        })
    });

    let tables: Vec<(EvidenceVector, JointTable)> = vectors
        .iter()
        .map(|e| (*e, JointTable::compute(priors, &cpts, *e)))
        .collect();
    group.bench_function("posteriors_only", |b| {
        b.iter(|| {
            for (evidence, table) in &tables {
                let _ = black_box(table.posteriors(*evidence));
            }
        })
    });
    group.finish();
}

// =============================================================================
// ENGINE
// =============================================================================

fn bench_settlement_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/settlement_cycle");
    let readings: EvidenceVector = "TTFFT".parse().unwrap();

    group.bench_function("create_submit_settle", |b| {
        b.iter_batched(
            || funded_engine(1_000),
            |mut engine| {
                let id = engine
                    .create_shipment(SENDER, CARRIER, Amount::new(1_000))
                    .unwrap();
                for (node, value) in (1..=5).zip(readings.values()) {
                    engine.submit_evidence(SENSOR, id, node, value).unwrap();
                }
                black_box(engine.validate_and_pay(CARRIER, id).unwrap())
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_joint_table,
    bench_all_evidence,
    bench_settlement_cycle
);
criterion_main!(benches);
