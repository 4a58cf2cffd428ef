//! The `ProcessOrder` workflow program.

use domain::{Money, Order, OrderValidationError, PriceBreakdown};
use orchestration::{ActivityCall, WorkflowContext, WorkflowError, WorkflowResult};
use serde_json::{Value, json};

use crate::activities::{
    CALCULATE_DISCOUNT, CALCULATE_SHIPPING, CALCULATE_TAXES, CREATE_ORDER_RECORD,
    FULFILL_SHIPPING, PROCESS_PAYMENT, PaymentRequest, SEND_ORDER_NOTIFICATION, UPDATE_INVENTORY,
};
use crate::services::{NotificationResult, OrderRecord, RecordResult};

pub const ORCHESTRATION_NAME: &str = "ProcessOrder";

/// Output of a successfully processed order.
pub const SUCCESS_OUTPUT: &str = "Order processed successfully";

/// Validates the order, prices it, records it, notifies the customer and
/// then updates inventory, takes payment and ships in parallel.
///
/// An invalid order fails before any activity is scheduled. An order whose
/// amount due is out of range fails after pricing, before anything is
/// recorded or charged. A failure in the final group fails the order once all
/// three have finished; siblings that succeeded are not undone.
pub fn process_order(ctx: &mut WorkflowContext<'_>) -> WorkflowResult<Value> {
    let order: Order = ctx.get_input()?;
    order.validate().map_err(invalid_order)?;

    let taxes: Money = ctx.call_activity(CALCULATE_TAXES, &order)?;
    let shipping: Money = ctx.call_activity(CALCULATE_SHIPPING, &order)?;
    let discount: Money = ctx.call_activity(CALCULATE_DISCOUNT, &order)?;

    let record = OrderRecord::new(
        order.clone(),
        PriceBreakdown {
            taxes,
            shipping,
            discount,
        },
    )
    .map_err(invalid_order)?;
    let payment = PaymentRequest::new(&order, record.amount_due);

    let _: RecordResult = ctx.call_activity(CREATE_ORDER_RECORD, &record)?;
    let _: NotificationResult = ctx.call_activity(SEND_ORDER_NOTIFICATION, &order)?;

    ctx.call_activity_group(vec![
        ActivityCall::new(UPDATE_INVENTORY, &order)?,
        ActivityCall::new(PROCESS_PAYMENT, &payment)?,
        ActivityCall::new(FULFILL_SHIPPING, &order)?,
    ])?;

    Ok(json!(SUCCESS_OUTPUT))
}

fn invalid_order(reason: OrderValidationError) -> WorkflowError {
    WorkflowError::Validation(format!("Order is invalid: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use domain::{OrderItem, Rate};
    use history_store::{FailureKind, HistoryEvent, HistoryRecord, InstanceStatus, SequenceNo};
    use orchestration::{ActivityId, FnOrchestration, InstanceId, Interpreter};

    fn order() -> Order {
        Order::new(
            "O1",
            "Ada",
            vec![OrderItem::new("Widget", Money::from_dollars(300), 2)],
            Money::from_dollars(600),
            Rate::from_basis_points(800),
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        )
        .with_shipping(10.0, Money::from_cents(200))
    }

    fn records(instance_id: &InstanceId, events: Vec<HistoryEvent>) -> Vec<HistoryRecord> {
        let mut sequence = SequenceNo::initial();
        events
            .into_iter()
            .map(|event| {
                sequence = sequence.next();
                HistoryRecord::new(instance_id.clone(), sequence, event)
            })
            .collect()
    }

    fn created(order: &Order) -> HistoryEvent {
        HistoryEvent::instance_created(ORCHESTRATION_NAME, serde_json::to_value(order).unwrap())
    }

    #[test]
    fn test_first_pass_schedules_taxes_only() {
        let id = InstanceId::new();
        let history = records(&id, vec![created(&order())]);

        let result = Interpreter::replay(&FnOrchestration(process_order), &id, &history).unwrap();

        assert_eq!(result.status, InstanceStatus::Running);
        assert_eq!(result.commands.len(), 1);
        assert_eq!(result.commands[0].name, CALCULATE_TAXES);
        assert_eq!(result.commands[0].activity_id, ActivityId::new(0));
    }

    #[test]
    fn test_invalid_order_fails_without_commands() {
        let id = InstanceId::new();
        let mut invalid = order();
        invalid.items.clear();
        let history = records(&id, vec![created(&invalid)]);

        let result = Interpreter::replay(&FnOrchestration(process_order), &id, &history).unwrap();

        assert_eq!(result.status, InstanceStatus::Failed);
        assert!(result.commands.is_empty());
        match result.new_events.last() {
            Some(HistoryEvent::OrchestratorFailed(data)) => {
                assert_eq!(data.error.message, "Order is invalid: order has no items");
            }
            other => panic!("expected OrchestratorFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_final_group_is_scheduled_in_one_pass() {
        let id = InstanceId::new();
        let order = order();
        let mut events = vec![created(&order), HistoryEvent::OrchestratorStarted];
        let outcomes = [
            (CALCULATE_TAXES, json!(4800)),
            (CALCULATE_SHIPPING, json!(2000)),
            (CALCULATE_DISCOUNT, json!(6000)),
        ];
        for (n, (name, result)) in outcomes.into_iter().enumerate() {
            let activity_id = ActivityId::new(n as u64);
            events.push(HistoryEvent::activity_scheduled(
                activity_id,
                name,
                serde_json::to_value(&order).unwrap(),
            ));
            events.push(HistoryEvent::activity_completed(activity_id, result));
        }

        let prices = PriceBreakdown {
            taxes: Money::from_cents(4800),
            shipping: Money::from_cents(2000),
            discount: Money::from_cents(6000),
        };
        let record = OrderRecord::new(order.clone(), prices).unwrap();
        events.push(HistoryEvent::activity_scheduled(
            ActivityId::new(3),
            CREATE_ORDER_RECORD,
            serde_json::to_value(&record).unwrap(),
        ));
        events.push(HistoryEvent::activity_completed(
            ActivityId::new(3),
            json!({"record_id": "REC-0001"}),
        ));
        events.push(HistoryEvent::activity_scheduled(
            ActivityId::new(4),
            SEND_ORDER_NOTIFICATION,
            serde_json::to_value(&order).unwrap(),
        ));
        events.push(HistoryEvent::activity_completed(
            ActivityId::new(4),
            json!({"notification_id": "MSG-0001"}),
        ));

        let history = records(&id, events);
        let result = Interpreter::replay(&FnOrchestration(process_order), &id, &history).unwrap();

        let names: Vec<&str> = result.commands.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec![UPDATE_INVENTORY, PROCESS_PAYMENT, FULFILL_SHIPPING]);

        let payment: PaymentRequest =
            serde_json::from_value(result.commands[1].input.clone()).unwrap();
        assert_eq!(payment.amount, Money::from_dollars(608));
    }

    fn priced_history(id: &InstanceId, order: &Order) -> Vec<HistoryRecord> {
        let prices = PriceBreakdown::for_order(order);
        let mut events = vec![created(order), HistoryEvent::OrchestratorStarted];
        let outcomes = [
            (CALCULATE_TAXES, prices.taxes),
            (CALCULATE_SHIPPING, prices.shipping),
            (CALCULATE_DISCOUNT, prices.discount),
        ];
        for (n, (name, result)) in outcomes.into_iter().enumerate() {
            let activity_id = ActivityId::new(n as u64);
            events.push(HistoryEvent::activity_scheduled(
                activity_id,
                name,
                serde_json::to_value(order).unwrap(),
            ));
            events.push(HistoryEvent::activity_completed(
                activity_id,
                serde_json::to_value(result).unwrap(),
            ));
        }
        records(id, events)
    }

    fn huge_order(tax_basis_points: u32) -> Order {
        let total = Money::from_cents(9_000_000_000_000_000_000);
        let mut order = order();
        order.items = vec![OrderItem::new("Yacht", total, 1)];
        order.total_price = total;
        order.tax_rate = Rate::from_basis_points(tax_basis_points);
        order.shipping_rate = Money::zero();
        order
    }

    #[test]
    fn test_amount_due_out_of_range_fails_as_invalid() {
        let id = InstanceId::new();
        let order = huge_order(5_000);
        assert_eq!(order.validate(), Ok(()));

        let history = priced_history(&id, &order);
        let result = Interpreter::replay(&FnOrchestration(process_order), &id, &history).unwrap();

        assert_eq!(result.status, InstanceStatus::Failed);
        assert!(result.commands.is_empty());
        match result.new_events.last() {
            Some(HistoryEvent::OrchestratorFailed(data)) => {
                assert_eq!(data.error.kind, FailureKind::Validation);
                assert_eq!(
                    data.error.message,
                    "Order is invalid: amount due is out of range"
                );
            }
            other => panic!("expected OrchestratorFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_large_amount_due_within_range_is_recorded() {
        let id = InstanceId::new();
        let order = huge_order(800);

        let history = priced_history(&id, &order);
        let result = Interpreter::replay(&FnOrchestration(process_order), &id, &history).unwrap();

        assert_eq!(result.status, InstanceStatus::Running);
        assert_eq!(result.commands.len(), 1);
        assert_eq!(result.commands[0].name, CREATE_ORDER_RECORD);
        let record: OrderRecord =
            serde_json::from_value(result.commands[0].input.clone()).unwrap();
        assert_eq!(
            record.amount_due,
            Money::from_cents(8_820_000_000_000_000_000)
        );
    }
}
