//! The eight order activities and their registration.

use domain::{Money, Order, calculate_discount, calculate_shipping, calculate_taxes};
use orchestration::{ActivityError, ActivityRegistry};
use serde::{Deserialize, Serialize};

use crate::services::{OrderRecord, OrderServices};

pub const CALCULATE_TAXES: &str = "CalculateTaxes";
pub const CALCULATE_SHIPPING: &str = "CalculateShipping";
pub const CALCULATE_DISCOUNT: &str = "CalculateDiscount";
pub const CREATE_ORDER_RECORD: &str = "CreateOrderRecord";
pub const SEND_ORDER_NOTIFICATION: &str = "SendOrderNotification";
pub const UPDATE_INVENTORY: &str = "UpdateInventory";
pub const PROCESS_PAYMENT: &str = "ProcessPayment";
pub const FULFILL_SHIPPING: &str = "FulfillShipping";

/// Every activity name, in workflow order.
pub const ALL_ACTIVITIES: [&str; 8] = [
    CALCULATE_TAXES,
    CALCULATE_SHIPPING,
    CALCULATE_DISCOUNT,
    CREATE_ORDER_RECORD,
    SEND_ORDER_NOTIFICATION,
    UPDATE_INVENTORY,
    PROCESS_PAYMENT,
    FULFILL_SHIPPING,
];

/// Input of [`PROCESS_PAYMENT`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub order_id: String,
    pub customer_name: String,
    pub amount: Money,
}

impl PaymentRequest {
    pub fn new(order: &Order, amount: Money) -> Self {
        Self {
            order_id: order.order_id.clone(),
            customer_name: order.customer_name.clone(),
            amount,
        }
    }
}

/// Registers all order activities against `services`.
pub fn register_activities(registry: &mut ActivityRegistry, services: &OrderServices) {
    registry.register(CALCULATE_TAXES, |order: Order| async move {
        let taxes = calculate_taxes(&order);
        tracing::info!(order_id = %order.order_id, %taxes, "calculated taxes");
        Ok::<_, ActivityError>(taxes)
    });

    registry.register(CALCULATE_SHIPPING, |order: Order| async move {
        let shipping = calculate_shipping(&order);
        tracing::info!(order_id = %order.order_id, %shipping, "calculated shipping");
        Ok::<_, ActivityError>(shipping)
    });

    registry.register(CALCULATE_DISCOUNT, |order: Order| async move {
        let discount = calculate_discount(&order);
        tracing::info!(order_id = %order.order_id, %discount, "calculated discount");
        Ok::<_, ActivityError>(discount)
    });

    let records = services.records.clone();
    registry.register(CREATE_ORDER_RECORD, move |record: OrderRecord| {
        let records = records.clone();
        async move {
            tracing::info!(order_id = %record.order.order_id, "creating order record");
            let result = records.create(record).await?;
            metrics::counter!("orders_recorded_total").increment(1);
            Ok::<_, ActivityError>(result)
        }
    });

    let notification = services.notification.clone();
    registry.register(SEND_ORDER_NOTIFICATION, move |order: Order| {
        let notification = notification.clone();
        async move {
            tracing::info!(order_id = %order.order_id, "sending notification to customer");
            let result = notification
                .order_received(&order.order_id, &order.customer_name)
                .await?;
            Ok::<_, ActivityError>(result)
        }
    });

    let inventory = services.inventory.clone();
    registry.register(UPDATE_INVENTORY, move |order: Order| {
        let inventory = inventory.clone();
        async move {
            tracing::info!(order_id = %order.order_id, "updating inventory");
            let result = inventory.update(&order.order_id, &order.items).await?;
            Ok::<_, ActivityError>(result)
        }
    });

    let payment = services.payment.clone();
    registry.register(PROCESS_PAYMENT, move |request: PaymentRequest| {
        let payment = payment.clone();
        async move {
            tracing::info!(order_id = %request.order_id, amount = %request.amount, "processing payment");
            let result = payment
                .charge(&request.order_id, &request.customer_name, request.amount)
                .await?;
            Ok::<_, ActivityError>(result)
        }
    });

    let shipping = services.shipping.clone();
    registry.register(FULFILL_SHIPPING, move |order: Order| {
        let shipping = shipping.clone();
        async move {
            tracing::info!(order_id = %order.order_id, "fulfilling shipping");
            let result = shipping
                .fulfill(&order.order_id, &order.customer_name, order.weight)
                .await?;
            Ok::<_, ActivityError>(result)
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryServices;
    use chrono::Utc;
    use domain::{OrderItem, Rate};
    use serde_json::json;

    fn order() -> Order {
        Order::new(
            "O1",
            "Ada",
            vec![OrderItem::new("Widget", Money::from_dollars(300), 2)],
            Money::from_dollars(600),
            Rate::from_basis_points(800),
            Utc::now(),
        )
        .with_shipping(10.0, Money::from_cents(200))
    }

    fn registry(services: &InMemoryServices) -> ActivityRegistry {
        let mut registry = ActivityRegistry::new();
        register_activities(&mut registry, &services.services());
        registry
    }

    #[test]
    fn test_all_activities_registered() {
        let registry = registry(&InMemoryServices::new());
        assert_eq!(registry.len(), ALL_ACTIVITIES.len());
        for name in ALL_ACTIVITIES {
            assert!(registry.contains(name), "{name} is not registered");
        }
    }

    #[tokio::test]
    async fn test_calculations() {
        let registry = registry(&InMemoryServices::new());
        let input = serde_json::to_value(order()).unwrap();

        let taxes = registry.get(CALCULATE_TAXES).unwrap();
        let shipping = registry.get(CALCULATE_SHIPPING).unwrap();
        let discount = registry.get(CALCULATE_DISCOUNT).unwrap();

        assert_eq!(taxes.invoke(input.clone()).await.unwrap(), json!(4800));
        assert_eq!(shipping.invoke(input.clone()).await.unwrap(), json!(2000));
        assert_eq!(discount.invoke(input).await.unwrap(), json!(6000));
    }

    #[tokio::test]
    async fn test_declined_payment_is_a_permanent_failure() {
        let services = InMemoryServices::new();
        services.payment.set_fail_on_charge(true);
        let registry = registry(&services);

        let request = PaymentRequest::new(&order(), Money::from_dollars(608));
        let result = registry
            .get(PROCESS_PAYMENT)
            .unwrap()
            .invoke(serde_json::to_value(request).unwrap())
            .await;

        assert_eq!(
            result,
            Err(ActivityError::failed(
                "Payment service error: Payment declined"
            ))
        );
    }

    #[tokio::test]
    async fn test_unavailable_service_is_transient() {
        let services = InMemoryServices::new();
        services.shipping.set_unavailable_for(1);
        let registry = registry(&services);

        let result = registry
            .get(FULFILL_SHIPPING)
            .unwrap()
            .invoke(serde_json::to_value(order()).unwrap())
            .await;

        assert!(result.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_payment_charges_requested_amount() {
        let services = InMemoryServices::new();
        let registry = registry(&services);

        let request = PaymentRequest::new(&order(), Money::from_dollars(608));
        registry
            .get(PROCESS_PAYMENT)
            .unwrap()
            .invoke(serde_json::to_value(request).unwrap())
            .await
            .unwrap();

        assert_eq!(
            services.payment.payment_for("O1").unwrap().amount,
            Money::from_dollars(608)
        );
    }
}
