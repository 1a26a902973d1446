use pullsim_engine::{Aggregator, Execution, ExperimentBatch, Preset};

const EXPERIMENTS: u64 = 10_000;
const SEED: u64 = 0x5EED_2024;

fn run(preset: Preset, execution: Execution) -> ExperimentBatch {
    let mut plan = preset.plan().expect("preset loads");
    plan.experiments_count = EXPERIMENTS;
    plan.seed = Some(SEED);
    Aggregator::new(plan, execution)
        .expect("valid plan")
        .run()
        .expect("no runaway trials")
}

#[test]
fn repeated_runs_are_bit_identical() {
    let first = run(Preset::HoyoCharacter, Execution::Sequential);
    let second = run(Preset::HoyoCharacter, Execution::Sequential);
    assert_eq!(first, second);
    assert_eq!(
        first.statistics.total_pulls.mean.to_bits(),
        second.statistics.total_pulls.mean.to_bits()
    );
}

#[test]
fn sequential_and_parallel_agree_for_any_worker_count() {
    for preset in [Preset::HoyoCharacter, Preset::EndfieldWeapon] {
        let sequential = run(preset, Execution::Sequential);
        for threads in [Some(1), Some(3), None] {
            let parallel = run(preset, Execution::Parallel { threads });
            assert_eq!(sequential.total_pulls, parallel.total_pulls, "{preset}");
            assert_eq!(
                sequential.first_rate_up_pulls, parallel.first_rate_up_pulls,
                "{preset}"
            );
            assert_eq!(sequential.statistics, parallel.statistics, "{preset}");
        }
    }
}

#[test]
fn different_seeds_diverge() {
    let mut plan = Preset::GenshinWeapon.plan().unwrap();
    plan.experiments_count = 500;
    plan.seed = Some(1);
    let a = Aggregator::new(plan.clone(), Execution::Sequential)
        .unwrap()
        .run()
        .unwrap();
    plan.seed = Some(2);
    let b = Aggregator::new(plan, Execution::Sequential)
        .unwrap()
        .run()
        .unwrap();
    assert_ne!(a.total_pulls, b.total_pulls);
}

#[test]
fn unseeded_runs_report_their_master_seed() {
    let mut plan = Preset::WuwaCharacter.plan().unwrap();
    plan.experiments_count = 200;
    plan.seed = None;
    let batch = Aggregator::new(plan.clone(), Execution::Sequential)
        .unwrap()
        .run()
        .unwrap();
    plan.seed = Some(batch.statistics.master_seed);
    let replay = Aggregator::new(plan, Execution::Sequential)
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(batch, replay);
}
