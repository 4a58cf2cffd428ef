use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use history_store::SequenceNo;
use orchestration::{
    ActivityId, FnOrchestration, HistoryEvent, HistoryRecord, InstanceId, Interpreter,
    WorkflowContext, WorkflowResult,
};
use serde_json::{Value, json};

/// Calls `Step` once per element of its input array and sums the results.
fn chain(ctx: &mut WorkflowContext<'_>) -> WorkflowResult<Value> {
    let steps: Vec<i64> = ctx.get_input()?;
    let mut total = 0;
    for step in steps {
        total += ctx.call_activity::<i64>("Step", &step)?;
    }
    Ok(json!(total))
}

/// History in which the first `completed` of `steps` activities have results.
fn history(instance_id: &InstanceId, steps: u64, completed: u64) -> Vec<HistoryRecord> {
    let input: Vec<u64> = (0..steps).collect();
    let mut events = vec![
        HistoryEvent::instance_created("Chain", json!(input)),
        HistoryEvent::OrchestratorStarted,
    ];
    for n in 0..completed {
        events.push(HistoryEvent::activity_scheduled(
            ActivityId::new(n),
            "Step",
            json!(n),
        ));
        events.push(HistoryEvent::activity_completed(ActivityId::new(n), json!(n)));
    }

    let mut sequence = SequenceNo::initial();
    events
        .into_iter()
        .map(|event| {
            sequence = sequence.next();
            HistoryRecord::new(instance_id.clone(), sequence, event)
        })
        .collect()
}

fn bench_replay(c: &mut Criterion) {
    let instance_id = InstanceId::new();
    let program = FnOrchestration(chain);
    let mut group = c.benchmark_group("interpreter/replay");

    for steps in [10u64, 100, 1000] {
        let records = history(&instance_id, steps, steps - 1);
        group.bench_with_input(BenchmarkId::from_parameter(steps), &records, |b, records| {
            b.iter(|| Interpreter::replay(&program, &instance_id, records).unwrap());
        });
    }

    group.finish();
}

fn bench_replay_to_completion(c: &mut Criterion) {
    let instance_id = InstanceId::new();
    let program = FnOrchestration(chain);
    let records = history(&instance_id, 100, 100);

    c.bench_function("interpreter/replay_to_completion_100", |b| {
        b.iter(|| Interpreter::replay(&program, &instance_id, &records).unwrap());
    });
}

criterion_group!(benches, bench_replay, bench_replay_to_completion);
criterion_main!(benches);
