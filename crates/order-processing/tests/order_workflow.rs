//! End-to-end tests for the ProcessOrder workflow on the in-memory store.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use domain::{Money, Order, OrderItem, Rate};
use history_store::{
    AppendOptions, HistoryEvent, HistoryStore, HistoryStoreExt, InMemoryHistoryStore,
};
use order_processing::activities::{
    CALCULATE_DISCOUNT, CALCULATE_SHIPPING, CALCULATE_TAXES, FULFILL_SHIPPING, PROCESS_PAYMENT,
    UPDATE_INVENTORY,
};
use order_processing::{
    ALL_ACTIVITIES, InMemoryServices, ORCHESTRATION_NAME, SUCCESS_OUTPUT, build_scheduler,
    process_order,
};
use orchestration::{
    ActivityId, FailureKind, FnOrchestration, HistoryRecord, InstanceId, InstanceStatus,
    Interpreter, OrchestrationClient, RetryPolicy, Scheduler, SchedulerOptions,
};
use serde_json::{Value, json};

struct TestHarness {
    store: InMemoryHistoryStore,
    services: InMemoryServices,
    scheduler: Scheduler<InMemoryHistoryStore>,
    client: OrchestrationClient<InMemoryHistoryStore>,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_store(InMemoryHistoryStore::new(), InMemoryServices::new())
    }

    fn with_store(store: InMemoryHistoryStore, services: InMemoryServices) -> Self {
        let scheduler = build_scheduler(
            store.clone(),
            &services.services(),
            SchedulerOptions {
                worker_count: 4,
                poll_interval: Duration::from_millis(10),
                max_append_attempts: 5,
            },
            RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                multiplier: 2.0,
            },
        );
        let client = scheduler.client();

        Self {
            store,
            services,
            scheduler,
            client,
        }
    }

    async fn submit(&self, order: &Order) -> InstanceId {
        self.client
            .start_instance(ORCHESTRATION_NAME, order, None)
            .await
            .unwrap()
    }

    async fn history(&self, id: &InstanceId) -> Vec<HistoryRecord> {
        self.store.read_all(id).await.unwrap()
    }

    /// Number of events of `kind` for the activity called `name`.
    async fn count_for(&self, id: &InstanceId, name: &str, kind: &str) -> usize {
        let history = self.history(id).await;
        let ids: Vec<ActivityId> = history
            .iter()
            .filter_map(|record| match &record.payload {
                HistoryEvent::ActivityScheduled(data) if data.activity_name == name => {
                    Some(data.activity_id)
                }
                _ => None,
            })
            .collect();

        history
            .iter()
            .filter(|record| record.kind == kind)
            .filter(|record| {
                record
                    .payload
                    .outcome_activity_id()
                    .is_some_and(|activity_id| ids.contains(&activity_id))
            })
            .count()
    }

    async fn scheduled_count(&self, id: &InstanceId) -> usize {
        self.history(id)
            .await
            .iter()
            .filter(|record| record.kind == "ActivityScheduled")
            .count()
    }
}

/// O1: total 600.00, 8% tax, weight 10 at 2.00 per unit.
fn reference_order() -> Order {
    Order::new(
        "O1",
        "Ada Lovelace",
        vec![
            OrderItem::new("Analytical Engine", Money::from_dollars(500), 1),
            OrderItem::new("Punch cards", Money::from_dollars(25), 4),
        ],
        Money::from_dollars(600),
        Rate::from_basis_points(800),
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    )
    .with_shipping(10.0, Money::from_cents(200))
}

fn result_of(history: &[HistoryRecord], name: &str) -> Option<Value> {
    let activity_id = history.iter().find_map(|record| match &record.payload {
        HistoryEvent::ActivityScheduled(data) if data.activity_name == name => {
            Some(data.activity_id)
        }
        _ => None,
    })?;
    history.iter().find_map(|record| match &record.payload {
        HistoryEvent::ActivityCompleted(data) if data.activity_id == activity_id => {
            Some(data.result.clone())
        }
        _ => None,
    })
}

mod happy_path {
    use super::*;

    #[tokio::test]
    async fn reference_order_completes() {
        let h = TestHarness::new();
        let id = h.submit(&reference_order()).await;

        h.scheduler.run_until_idle().await.unwrap();

        let status = h.client.get_status(&id).await.unwrap().unwrap();
        assert_eq!(status.status, InstanceStatus::Completed);
        assert_eq!(status.output, Some(json!(SUCCESS_OUTPUT)));

        let history = h.history(&id).await;
        assert_eq!(result_of(&history, CALCULATE_TAXES), Some(json!(4800)));
        assert_eq!(result_of(&history, CALCULATE_SHIPPING), Some(json!(2000)));
        assert_eq!(result_of(&history, CALCULATE_DISCOUNT), Some(json!(6000)));
    }

    #[tokio::test]
    async fn every_activity_completes_exactly_once() {
        let h = TestHarness::new();
        let id = h.submit(&reference_order()).await;

        h.scheduler.run_until_idle().await.unwrap();

        assert_eq!(h.scheduled_count(&id).await, ALL_ACTIVITIES.len());
        for name in ALL_ACTIVITIES {
            assert_eq!(
                h.count_for(&id, name, "ActivityCompleted").await,
                1,
                "{name} should complete once"
            );
        }
        assert_eq!(h.services.payment.call_count(), 1);
        assert_eq!(h.services.inventory.call_count(), 1);
        assert_eq!(h.services.shipping.call_count(), 1);
        assert_eq!(h.services.notification.call_count(), 1);
        assert_eq!(h.services.records.call_count(), 1);
    }

    #[tokio::test]
    async fn side_effects_reach_services() {
        let h = TestHarness::new();
        h.submit(&reference_order()).await;

        h.scheduler.run_until_idle().await.unwrap();

        // 600.00 + 48.00 taxes + 20.00 shipping - 60.00 discount
        assert_eq!(
            h.services.payment.payment_for("O1").unwrap().amount,
            Money::from_dollars(608)
        );
        assert_eq!(h.services.inventory.units_shipped("Punch cards"), 4);
        assert!(h.services.shipping.shipment_for("O1").is_some());
        assert!(h.services.notification.message_for("O1").is_some());

        let record = h.services.records.record_for("O1").unwrap();
        assert_eq!(record.prices.discount, Money::from_dollars(60));
        assert!(record.order.date_processed.is_some());
    }

    #[tokio::test]
    async fn transient_outages_are_retried() {
        let h = TestHarness::new();
        h.services.payment.set_unavailable_for(2);
        h.services.records.set_unavailable_for(1);
        let id = h.submit(&reference_order()).await;

        h.scheduler.run_until_idle().await.unwrap();

        let status = h.client.get_status(&id).await.unwrap().unwrap();
        assert_eq!(status.status, InstanceStatus::Completed);
        assert_eq!(h.services.payment.call_count(), 3);
        assert_eq!(h.services.payment.payment_count(), 1);
        assert_eq!(h.count_for(&id, PROCESS_PAYMENT, "ActivityCompleted").await, 1);
    }

    #[tokio::test]
    async fn orders_run_concurrently() {
        let h = TestHarness::new();
        let mut ids = Vec::new();
        for n in 0..10 {
            let mut order = reference_order();
            order.order_id = format!("O{n}");
            ids.push(h.submit(&order).await);
        }

        h.scheduler.run_until_idle().await.unwrap();

        for id in &ids {
            let status = h.client.get_status(id).await.unwrap().unwrap();
            assert_eq!(status.status, InstanceStatus::Completed);
        }
        assert_eq!(h.services.payment.payment_count(), 10);
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn invalid_order_schedules_nothing() {
        let h = TestHarness::new();
        let mut order = reference_order();
        order.total_price = Money::zero();
        let id = h.submit(&order).await;

        h.scheduler.run_until_idle().await.unwrap();

        let instance = h.client.get_instance(&id).await.unwrap().unwrap();
        assert_eq!(instance.status, InstanceStatus::Failed);
        let failure = instance.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::Validation);
        assert!(failure.message.starts_with("Order is invalid"));
        assert_eq!(h.scheduled_count(&id).await, 0);
    }

    #[tokio::test]
    async fn each_validation_rule_fails_the_order() {
        let h = TestHarness::new();
        let mut orders = Vec::new();

        let mut order = reference_order();
        order.order_id = String::new();
        orders.push(order);
        let mut order = reference_order();
        order.customer_name = String::new();
        orders.push(order);
        let mut order = reference_order();
        order.items.clear();
        orders.push(order);
        let mut order = reference_order();
        order.date_created = None;
        orders.push(order);
        let mut order = reference_order();
        order.date_created = Some(Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap());
        orders.push(order);

        let mut ids = Vec::new();
        for order in &orders {
            ids.push(h.submit(order).await);
        }
        h.scheduler.run_until_idle().await.unwrap();

        for id in &ids {
            let status = h.client.get_status(id).await.unwrap().unwrap();
            assert_eq!(status.status, InstanceStatus::Failed);
            assert_eq!(h.scheduled_count(id).await, 0);
        }
        assert_eq!(h.services.records.call_count(), 0);
    }

    #[tokio::test]
    async fn amount_due_out_of_range_fails_before_any_side_effect() {
        let h = TestHarness::new();
        let total = Money::from_cents(9_000_000_000_000_000_000);
        let mut order = reference_order();
        order.items = vec![OrderItem::new("Yacht", total, 1)];
        order.total_price = total;
        order.tax_rate = Rate::from_basis_points(5_000);
        let id = h.submit(&order).await;

        h.scheduler.run_until_idle().await.unwrap();

        let instance = h.client.get_instance(&id).await.unwrap().unwrap();
        assert_eq!(instance.status, InstanceStatus::Failed);
        let failure = instance.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::Validation);
        assert_eq!(failure.message, "Order is invalid: amount due is out of range");

        assert_eq!(h.scheduled_count(&id).await, 3);
        assert_eq!(h.services.records.call_count(), 0);
        assert_eq!(h.services.payment.call_count(), 0);
    }

    #[tokio::test]
    async fn declined_payment_fails_after_siblings_finish() {
        let h = TestHarness::new();
        h.services.payment.set_fail_on_charge(true);
        let id = h.submit(&reference_order()).await;

        h.scheduler.run_until_idle().await.unwrap();

        let instance = h.client.get_instance(&id).await.unwrap().unwrap();
        assert_eq!(instance.status, InstanceStatus::Failed);
        let failure = instance.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::Activity);
        assert!(failure.message.contains(PROCESS_PAYMENT));
        assert!(failure.message.contains("Payment declined"));

        assert_eq!(h.count_for(&id, UPDATE_INVENTORY, "ActivityCompleted").await, 1);
        assert_eq!(h.count_for(&id, FULFILL_SHIPPING, "ActivityCompleted").await, 1);
        assert_eq!(h.count_for(&id, PROCESS_PAYMENT, "ActivityFailed").await, 1);
        assert_eq!(h.services.inventory.call_count(), 1);
        assert_eq!(h.services.shipping.call_count(), 1);
    }

    #[tokio::test]
    async fn failed_record_stops_before_fan_out() {
        let h = TestHarness::new();
        h.services.records.set_fail_on_create(true);
        let id = h.submit(&reference_order()).await;

        h.scheduler.run_until_idle().await.unwrap();

        let status = h.client.get_status(&id).await.unwrap().unwrap();
        assert_eq!(status.status, InstanceStatus::Failed);
        assert_eq!(h.scheduled_count(&id).await, 4);
        assert_eq!(h.services.payment.call_count(), 0);
    }
}

mod durability {
    use super::*;

    #[tokio::test]
    async fn crash_between_persist_and_dispatch_recovers_once() {
        let store = InMemoryHistoryStore::new();
        let id = InstanceId::parse("order-O1").unwrap();
        store
            .create_instance(
                &id,
                ORCHESTRATION_NAME,
                serde_json::to_value(reference_order()).unwrap(),
            )
            .await
            .unwrap();

        // Persist the first pass without dispatching it.
        let history = store.read_all(&id).await.unwrap();
        let pass = Interpreter::replay(&FnOrchestration(process_order), &id, &history).unwrap();
        assert_eq!(pass.commands.len(), 1);
        let sequence = store
            .append(
                &id,
                pass.new_events,
                AppendOptions::expect_sequence(history[0].sequence_no),
            )
            .await
            .unwrap();
        store.mark_consumed(&id, sequence).await.unwrap();

        let h = TestHarness::with_store(store, InMemoryServices::new());
        assert_eq!(h.scheduler.recover().await.unwrap(), 1);
        h.scheduler.run_until_idle().await.unwrap();

        let status = h.client.get_status(&id).await.unwrap().unwrap();
        assert_eq!(status.status, InstanceStatus::Completed);
        assert_eq!(h.count_for(&id, CALCULATE_TAXES, "ActivityCompleted").await, 1);
        assert_eq!(h.scheduled_count(&id).await, ALL_ACTIVITIES.len());
    }

    #[tokio::test]
    async fn restart_mid_workflow_does_not_repeat_side_effects() {
        let store = InMemoryHistoryStore::new();
        let services = InMemoryServices::new();

        let first = TestHarness::with_store(store.clone(), services.clone());
        let id = first.submit(&reference_order()).await;
        // Run passes until the record exists, then drop the process.
        for _ in 0..50 {
            first.scheduler.process_instance(&id).await.unwrap();
            if services.records.record_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(services.records.record_count(), 1);
        drop(first);
        // Let any activity still running on the old dispatcher finish.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = TestHarness::with_store(store, services.clone());
        second.scheduler.recover().await.unwrap();
        second.scheduler.run_until_idle().await.unwrap();

        let status = second.client.get_status(&id).await.unwrap().unwrap();
        assert_eq!(status.status, InstanceStatus::Completed);
        for name in ALL_ACTIVITIES {
            assert_eq!(
                second.count_for(&id, name, "ActivityCompleted").await,
                1,
                "{name} should complete once"
            );
        }
        assert_eq!(services.records.record_count(), 1);
        assert_eq!(services.payment.payment_count(), 1);
    }

    #[tokio::test]
    async fn replaying_the_same_history_is_deterministic() {
        let h = TestHarness::new();
        let id = h.submit(&reference_order()).await;
        h.scheduler.run_until_idle().await.unwrap();
        let full = h.history(&id).await;

        let program = FnOrchestration(process_order);
        for end in 1..full.len() {
            let prefix = &full[..end];
            let a = Interpreter::replay(&program, &id, prefix).unwrap();
            let b = Interpreter::replay(&program, &id, prefix).unwrap();
            assert_eq!(a, b, "replay of the first {end} events differs");
        }
    }

    #[tokio::test]
    async fn reordered_program_is_non_deterministic() {
        let h = TestHarness::new();
        let id = InstanceId::new();
        let order = serde_json::to_value(reference_order()).unwrap();
        h.store
            .create_instance(&id, ORCHESTRATION_NAME, order.clone())
            .await
            .unwrap();
        // History from a build that priced shipping first.
        h.store
            .append(
                &id,
                vec![
                    HistoryEvent::OrchestratorStarted,
                    HistoryEvent::activity_scheduled(ActivityId::new(0), CALCULATE_SHIPPING, order),
                    HistoryEvent::activity_completed(ActivityId::new(0), json!(2000)),
                ],
                AppendOptions::new(),
            )
            .await
            .unwrap();

        h.scheduler.run_until_idle().await.unwrap();

        let instance = h.client.get_instance(&id).await.unwrap().unwrap();
        assert_eq!(instance.status, InstanceStatus::Failed);
        assert_eq!(instance.failure.unwrap().kind, FailureKind::NonDeterminism);
    }

    #[tokio::test]
    async fn terminated_before_first_pass_runs_nothing() {
        let h = TestHarness::new();
        let id = h.submit(&reference_order()).await;
        h.client.terminate(&id, "customer cancelled").await.unwrap();

        h.scheduler.run_until_idle().await.unwrap();

        let instance = h.client.get_instance(&id).await.unwrap().unwrap();
        assert_eq!(instance.status, InstanceStatus::Terminated);
        assert_eq!(instance.termination_reason.as_deref(), Some("customer cancelled"));
        assert_eq!(h.scheduled_count(&id).await, 0);

        let late = h
            .store
            .append_event(
                &id,
                HistoryEvent::termination_requested("again"),
                AppendOptions::new(),
            )
            .await;
        assert!(late.is_err());
    }
}
