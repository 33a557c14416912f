use kameo::Actor;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use order_choreography::actors::OutboxDispatcher;
use order_choreography::config::EmissionConfig;
use order_choreography::domain::order::{
    AddressInput, CreateOrderInput, OrderItemInput, OrderRepository, OrderStatus, OutboxStatus,
    ORDER_CREATED, ORDER_DELIVERED, ORDER_PAID, PAYMENT_SUCCEEDED,
};
use order_choreography::messaging::{
    AckPolicy, ConnectionSupervisor, ConsumerHandle, EventChannel, EventConsumer, EventProducer,
    InMemoryBroker, OrderEventHandler, ORDER_SERVICE_QUEUE,
};
use order_choreography::persistence::InMemoryOrderRepository;
use order_choreography::simulator::{DeliveryReaction, PaymentReaction, Simulator};
use order_choreography::usecases::{EmissionMode, OrderSettings, OrderUseCases};
use order_choreography::utils::RetryConfig;

// ============================================================================
// End-to-end order lifecycle over the in-memory broker and repository
// ============================================================================

struct Harness {
    broker: InMemoryBroker,
    repo: InMemoryOrderRepository,
    channel: Arc<dyn EventChannel>,
    producer: Arc<EventProducer>,
    use_cases: OrderUseCases,
}

impl Harness {
    fn new(emission: EmissionMode) -> Self {
        let broker = InMemoryBroker::new();
        let repo = InMemoryOrderRepository::new();
        let channel: Arc<dyn EventChannel> = Arc::new(broker.clone());
        let producer = Arc::new(EventProducer::new(channel.clone(), None));
        let use_cases = OrderUseCases::new(
            Arc::new(repo.clone()),
            producer.clone(),
            OrderSettings {
                emission,
                ..OrderSettings::default()
            },
            None,
        );
        Self {
            broker,
            repo,
            channel,
            producer,
            use_cases,
        }
    }

    fn order_consumer(&self, policy: AckPolicy) -> ConsumerHandle {
        EventConsumer::for_subscription(
            self.channel.clone(),
            OrderEventHandler::subscription(ORDER_SERVICE_QUEUE, policy),
            policy,
            Arc::new(OrderEventHandler::new(self.use_cases.update_order_status.clone())),
        )
        .with_resubscribe_delay(Duration::from_millis(20))
        .spawn()
    }

    fn simulators(&self) -> (ConsumerHandle, ConsumerHandle) {
        let delay = Duration::from_millis(20);
        (
            Simulator::new(PaymentReaction, self.producer.clone(), delay).spawn(self.channel.clone()),
            Simulator::new(DeliveryReaction, self.producer.clone(), delay).spawn(self.channel.clone()),
        )
    }

    async fn status(&self, order_id: Uuid) -> Option<OrderStatus> {
        self.repo.get_order_by_id(order_id).await.ok().map(|order| order.status)
    }

    async fn wait_for_status(&self, order_id: Uuid, status: OrderStatus) -> bool {
        for _ in 0..200 {
            if self.status(order_id).await == Some(status) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    async fn pay(&self, order_id: Uuid) {
        self.broker
            .publish(PAYMENT_SUCCEEDED, payment_body(order_id).as_bytes())
            .await
            .unwrap();
    }
}

fn order_input() -> CreateOrderInput {
    CreateOrderInput {
        user_id: Uuid::new_v4(),
        items: vec![OrderItemInput {
            product_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            product_name: "Coffee beans 1kg".to_string(),
            unit_price: 350.0,
            quantity: 2,
        }],
        shipping_address: AddressInput {
            full_name: "Abebe Kebede".to_string(),
            city: "Addis Ababa".to_string(),
            ..AddressInput::default()
        },
        total_amount: 700.0,
    }
}

fn payment_body(order_id: Uuid) -> String {
    format!(
        r#"{{"payment_id":"{}","order_id":"{}","amount":700.0,"timestamp":"2024-01-01T00:00:00Z"}}"#,
        Uuid::new_v4(),
        order_id
    )
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_order_travels_created_paid_delivered() {
    let h = Harness::new(EmissionMode::Detached);
    let consumer = h.order_consumer(AckPolicy::OnDelivery);
    let (payment, delivery) = h.simulators();
    settle().await;

    let order = h.use_cases.create_order.execute(order_input()).await.unwrap();
    assert_eq!(order.status, OrderStatus::Created);

    assert!(h.wait_for_status(order.id, OrderStatus::Delivered).await);

    assert_eq!(h.broker.published(ORDER_CREATED).len(), 1);
    assert_eq!(h.broker.published(PAYMENT_SUCCEEDED).len(), 1);
    assert_eq!(h.broker.published(ORDER_PAID).len(), 1);
    assert_eq!(h.broker.published(ORDER_DELIVERED).len(), 1);

    let paid: serde_json::Value = serde_json::from_slice(&h.broker.published(ORDER_PAID)[0]).unwrap();
    assert_eq!(paid["order_id"], order.id.to_string());
    assert_eq!(paid["amount"], 700.0);

    let history: Vec<OrderStatus> = h.repo.history(order.id).await.iter().map(|e| e.status).collect();
    assert_eq!(history, vec![OrderStatus::Paid, OrderStatus::Delivered]);

    for handle in [consumer, payment, delivery] {
        handle.abort();
    }
}

#[tokio::test]
async fn test_payment_for_unknown_order_changes_nothing() {
    let h = Harness::new(EmissionMode::Detached);
    let consumer = h.order_consumer(AckPolicy::OnDelivery);
    settle().await;

    h.pay(Uuid::new_v4()).await;
    settle().await;

    assert_eq!(h.repo.total_orders().await, 0);
    assert!(h.broker.published(ORDER_PAID).is_empty());
    consumer.abort();
}

#[tokio::test]
async fn test_duplicate_payment_is_applied_twice() {
    let h = Harness::new(EmissionMode::Detached);
    let consumer = h.order_consumer(AckPolicy::OnDelivery);
    settle().await;

    let order = h.use_cases.create_order.execute(order_input()).await.unwrap();
    h.pay(order.id).await;
    h.pay(order.id).await;
    settle().await;

    assert_eq!(h.status(order.id).await, Some(OrderStatus::Paid));
    assert_eq!(h.repo.history(order.id).await.len(), 2);
    assert_eq!(h.broker.published(ORDER_PAID).len(), 2);
    consumer.abort();
}

#[tokio::test]
async fn test_crash_after_ack_on_delivery_loses_event() {
    let h = Harness::new(EmissionMode::Detached);
    let order = h.use_cases.create_order.execute(order_input()).await.unwrap();
    h.repo.delay_updates(Some(Duration::from_millis(300))).await;

    let consumer = h.order_consumer(AckPolicy::OnDelivery);
    settle().await;
    h.pay(order.id).await;
    settle().await;

    // Delivered and settled, handler still inside the status write
    consumer.abort();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(h.status(order.id).await, Some(OrderStatus::Created));
    assert_eq!(h.broker.queue_depth(ORDER_SERVICE_QUEUE), 0);
    assert_eq!(h.broker.unacked_count(ORDER_SERVICE_QUEUE), 0);

    // A restarted consumer has nothing left to process
    h.repo.delay_updates(None).await;
    let restarted = h.order_consumer(AckPolicy::OnDelivery);
    settle().await;
    assert_eq!(h.status(order.id).await, Some(OrderStatus::Created));
    assert!(h.broker.published(ORDER_PAID).is_empty());
    restarted.abort();
}

#[tokio::test]
async fn test_crash_before_ack_after_processing_redelivers() {
    let h = Harness::new(EmissionMode::Detached);
    let order = h.use_cases.create_order.execute(order_input()).await.unwrap();
    h.repo.delay_updates(Some(Duration::from_millis(300))).await;

    let consumer = h.order_consumer(AckPolicy::AfterProcessing);
    settle().await;
    h.pay(order.id).await;
    settle().await;

    consumer.abort();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.status(order.id).await, Some(OrderStatus::Created));
    assert_eq!(h.broker.queue_depth(ORDER_SERVICE_QUEUE), 1);

    h.repo.delay_updates(None).await;
    let restarted = h.order_consumer(AckPolicy::AfterProcessing);

    assert!(h.wait_for_status(order.id, OrderStatus::Paid).await);
    settle().await;
    assert_eq!(h.broker.unacked_count(ORDER_SERVICE_QUEUE), 0);
    restarted.abort();
}

#[tokio::test]
async fn test_outbox_mode_completes_lifecycle() {
    let h = Harness::new(EmissionMode::Outbox);
    let consumer = h.order_consumer(AckPolicy::AfterProcessing);
    let (payment, delivery) = h.simulators();

    let config = EmissionConfig {
        mode: EmissionMode::Outbox,
        outbox_poll_interval_ms: 10,
        ..EmissionConfig::default()
    };
    let _dispatcher = OutboxDispatcher::spawn(OutboxDispatcher::new(
        Arc::new(h.repo.clone()),
        h.producer.clone(),
        &config,
    ));
    settle().await;

    let order = h.use_cases.create_order.execute(order_input()).await.unwrap();
    assert!(h.wait_for_status(order.id, OrderStatus::Delivered).await);

    settle().await;
    let outbox = h.repo.outbox_messages().await;
    let keys: Vec<&str> = outbox.iter().map(|(m, _)| m.routing_key.as_str()).collect();
    assert_eq!(keys, vec![ORDER_CREATED, ORDER_PAID]);
    assert!(outbox.iter().all(|(_, status)| *status == OutboxStatus::Sent));
    assert_eq!(h.broker.published(ORDER_PAID).len(), 1);

    for handle in [consumer, payment, delivery] {
        handle.abort();
    }
}

#[tokio::test]
async fn test_consumer_recovers_after_broker_outage() {
    let h = Harness::new(EmissionMode::Detached);
    let consumer = h.order_consumer(AckPolicy::OnDelivery);
    let supervisor = ConnectionSupervisor::new(
        h.channel.clone(),
        Duration::from_millis(20),
        RetryConfig::exponential(5, Duration::from_millis(5), Duration::from_millis(20)),
    )
    .spawn();
    settle().await;

    let order = h.use_cases.create_order.execute(order_input()).await.unwrap();

    h.broker.refuse_reconnects(2);
    h.broker.disconnect();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(h.broker.is_connected().await);

    h.pay(order.id).await;
    assert!(h.wait_for_status(order.id, OrderStatus::Paid).await);

    consumer.abort();
    supervisor.abort();
}
