use bencher::{TestCase, TestLoad};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use micro_curl::testing::{ScriptedEngine, Step};
use micro_curl::{Curl, Easy, Multi};
use std::hint::black_box;

static FEW_SMALL: TestLoad = TestLoad::new(4, 4, 256);
static MANY_SMALL: TestLoad = TestLoad::new(64, 4, 256);
static FEW_LARGE: TestLoad = TestLoad::new(4, 16, 16 * 1024);

fn create_test_cases() -> Vec<TestCase> {
    vec![
        TestCase::small("few_small_transfers", FEW_SMALL),
        TestCase::normal("many_small_transfers", MANY_SMALL),
        TestCase::large("few_large_transfers", FEW_LARGE),
    ]
}

fn prepare(curl: &Curl<ScriptedEngine>, load: &TestLoad) -> (Vec<Easy<ScriptedEngine>>, Multi<ScriptedEngine>) {
    let chunk = vec![b'x'; load.chunk_size()];
    let mut multi = curl.multi().expect("multi handle should be created");
    let transfers: Vec<_> = (0..load.transfers()).map(|_| curl.easy().expect("easy handle should be created")).collect();

    for easy in &transfers {
        let steps = (0..load.chunks()).map(|_| Step::data(chunk.clone())).chain([Step::done()]);
        curl.engine().script(easy.id(), steps);
        multi.add(easy).expect("transfer should be added");
    }

    (transfers, multi)
}

fn benchmark_multi_perform(criterion: &mut Criterion) {
    let test_cases = create_test_cases();
    let mut group = criterion.benchmark_group("multi_perform");

    for case in test_cases {
        group.throughput(Throughput::Bytes(case.load().total_bytes()));
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &case, |b, case| {
            let curl = Curl::new(ScriptedEngine::new());
            b.iter_batched_ref(
                || prepare(&curl, case.load()),
                |(_, multi)| {
                    let mut events = 0u64;
                    for event in multi.perform() {
                        black_box(event.expect("scripted transfers should not fail"));
                        events += 1;
                    }
                    assert_eq!(events, case.load().total_events());
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(transfers, benchmark_multi_perform);
criterion_main!(transfers);
