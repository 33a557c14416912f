use async_trait::async_trait;
use futures_util::Stream;
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use super::topic::topic_matches;
use super::{
    AckMode, Acknowledger, Delivery, DeliveryStream, EventChannel, MessagingError, Subscription,
};

// ============================================================================
// In-Memory Broker - a single topic exchange inside the process
// ============================================================================
//
// Mirrors the broker behaviour the services depend on:
// - queues are durable: messages routed while nobody consumes wait in the
//   queue backlog
// - several consumers on one queue share it round-robin
// - auto-ack deliveries are settled when handed over; a consumer that dies
//   before processing loses them
// - manual-ack deliveries stay unacked until settled; if the consumer goes
//   away they return to the queue marked `redelivered`
// - `disconnect` ends every consumer stream and fails publishes until
//   `reconnect` succeeds
//
// ============================================================================

#[derive(Debug, Clone)]
struct Message {
    routing_key: String,
    body: Vec<u8>,
    redelivered: bool,
}

type DeliverySender = mpsc::UnboundedSender<Result<Delivery, MessagingError>>;

struct ConsumerSlot {
    id: u64,
    mode: AckMode,
    tx: DeliverySender,
}

#[derive(Default)]
struct QueueState {
    backlog: VecDeque<Message>,
    consumers: Vec<ConsumerSlot>,
    next_consumer: usize,
    /// delivery tag -> (consumer id, message)
    unacked: HashMap<u64, (u64, Message)>,
}

#[derive(Default)]
struct BrokerState {
    connected: bool,
    refuse_reconnects: u32,
    fail_publishes: u32,
    bindings: Vec<(String, String)>,
    queues: HashMap<String, QueueState>,
    published: Vec<(String, Vec<u8>)>,
    next_id: u64,
}

type Shared = Arc<Mutex<BrokerState>>;

fn lock(state: &Shared) -> MutexGuard<'_, BrokerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BrokerState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn bind(&mut self, queue: &str, pattern: &str) {
        let binding = (pattern.to_string(), queue.to_string());
        if !self.bindings.contains(&binding) {
            self.bindings.push(binding);
        }
        self.queues.entry(queue.to_string()).or_default();
    }

    /// Hand backlog messages to consumers until one side runs out.
    fn pump(&mut self, shared: &Shared, queue_name: &str) {
        loop {
            let tag = self.next_id();
            let Some(queue) = self.queues.get_mut(queue_name) else {
                return;
            };
            if queue.consumers.is_empty() {
                return;
            }
            let Some(message) = queue.backlog.pop_front() else {
                return;
            };

            let index = queue.next_consumer % queue.consumers.len();
            queue.next_consumer = index + 1;
            let slot = &queue.consumers[index];

            let acker: Option<Box<dyn Acknowledger>> = match slot.mode {
                AckMode::Auto => None,
                AckMode::Manual => Some(Box::new(MemoryAcker {
                    shared: shared.clone(),
                    queue: queue_name.to_string(),
                    tag,
                })),
            };
            let delivery = Delivery::new(
                message.routing_key.clone(),
                message.body.clone(),
                message.redelivered,
                acker,
            );

            if slot.tx.send(Ok(delivery)).is_err() {
                // Receiver already gone; forget the consumer and retry the message
                let id = slot.id;
                queue.consumers.retain(|c| c.id != id);
                queue.backlog.push_front(message);
                continue;
            }
            if slot.mode == AckMode::Manual {
                queue.unacked.insert(tag, (slot.id, message));
            }
        }
    }

    /// Put a consumer's unsettled deliveries back at the head of the queue.
    fn requeue_consumer(&mut self, queue_name: &str, consumer_id: u64) {
        let Some(queue) = self.queues.get_mut(queue_name) else {
            return;
        };
        let mut tags: Vec<u64> = queue
            .unacked
            .iter()
            .filter(|(_, (owner, _))| *owner == consumer_id)
            .map(|(tag, _)| *tag)
            .collect();
        tags.sort_unstable();
        for tag in tags.into_iter().rev() {
            if let Some((_, mut message)) = queue.unacked.remove(&tag) {
                message.redelivered = true;
                queue.backlog.push_front(message);
            }
        }
    }
}

struct MemoryAcker {
    shared: Shared,
    queue: String,
    tag: u64,
}

impl MemoryAcker {
    fn settle(&self, requeue: bool) -> Result<(), MessagingError> {
        let mut state = lock(&self.shared);
        let queue = state
            .queues
            .get_mut(&self.queue)
            .ok_or_else(|| MessagingError::Ack(format!("unknown queue {}", self.queue)))?;
        let (_, mut message) = queue
            .unacked
            .remove(&self.tag)
            .ok_or_else(|| MessagingError::Ack(format!("unknown delivery tag {}", self.tag)))?;

        if requeue {
            message.redelivered = true;
            queue.backlog.push_front(message);
            let queue_name = self.queue.clone();
            state.pump(&self.shared, &queue_name);
        }
        Ok(())
    }
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> Result<(), MessagingError> {
        self.settle(false)
    }

    async fn nack(&self, requeue: bool) -> Result<(), MessagingError> {
        self.settle(requeue)
    }
}

struct MemoryDeliveryStream {
    rx: mpsc::UnboundedReceiver<Result<Delivery, MessagingError>>,
    shared: Shared,
    queue: String,
    consumer_id: u64,
}

impl Stream for MemoryDeliveryStream {
    type Item = Result<Delivery, MessagingError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for MemoryDeliveryStream {
    fn drop(&mut self) {
        let mut state = lock(&self.shared);
        if let Some(queue) = state.queues.get_mut(&self.queue) {
            queue.consumers.retain(|c| c.id != self.consumer_id);
        }
        state.requeue_consumer(&self.queue, self.consumer_id);
        state.pump(&self.shared, &self.queue);
    }
}

#[derive(Clone)]
pub struct InMemoryBroker {
    shared: Shared,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(BrokerState {
                connected: true,
                ..BrokerState::default()
            })),
        }
    }

    /// Declare a durable queue and bind it without consuming, so messages
    /// accumulate for later inspection.
    pub fn declare_queue(&self, queue: &str, routing_keys: &[&str]) {
        let mut state = lock(&self.shared);
        for key in routing_keys {
            state.bind(queue, key);
        }
    }

    /// Remove and return everything waiting in `queue`.
    pub fn drain(&self, queue: &str) -> Vec<(String, Vec<u8>)> {
        lock(&self.shared)
            .queues
            .get_mut(queue)
            .map(|q| q.backlog.drain(..).map(|m| (m.routing_key, m.body)).collect())
            .unwrap_or_default()
    }

    pub fn queue_depth(&self, queue: &str) -> usize {
        lock(&self.shared).queues.get(queue).map_or(0, |q| q.backlog.len())
    }

    pub fn unacked_count(&self, queue: &str) -> usize {
        lock(&self.shared).queues.get(queue).map_or(0, |q| q.unacked.len())
    }

    /// Every message the exchange accepted for `routing_key`, in order.
    pub fn published(&self, routing_key: &str) -> Vec<Vec<u8>> {
        lock(&self.shared)
            .published
            .iter()
            .filter(|(key, _)| key == routing_key)
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Drop the connection: streams end, unacked messages return to their
    /// queues, publishes fail.
    pub fn disconnect(&self) {
        let mut state = lock(&self.shared);
        state.connected = false;

        let mut orphaned = Vec::new();
        for (name, queue) in state.queues.iter_mut() {
            for slot in queue.consumers.drain(..) {
                orphaned.push((name.clone(), slot.id));
            }
        }
        for (queue, consumer_id) in orphaned {
            state.requeue_consumer(&queue, consumer_id);
        }
    }

    /// Make the next `n` reconnect attempts fail.
    pub fn refuse_reconnects(&self, n: u32) {
        lock(&self.shared).refuse_reconnects = n;
    }

    /// Make the next `n` publishes fail.
    pub fn fail_publishes(&self, n: u32) {
        lock(&self.shared).fail_publishes = n;
    }
}

#[async_trait]
impl EventChannel for InMemoryBroker {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<(), MessagingError> {
        let mut state = lock(&self.shared);
        if !state.connected {
            return Err(MessagingError::Disconnected);
        }
        if state.fail_publishes > 0 {
            state.fail_publishes -= 1;
            return Err(MessagingError::Publish("injected publish failure".to_string()));
        }

        state.published.push((routing_key.to_string(), payload.to_vec()));

        let mut targets: Vec<String> = state
            .bindings
            .iter()
            .filter(|(pattern, _)| topic_matches(pattern, routing_key))
            .map(|(_, queue)| queue.clone())
            .collect();
        targets.sort();
        targets.dedup();

        for queue in targets {
            if let Some(q) = state.queues.get_mut(&queue) {
                q.backlog.push_back(Message {
                    routing_key: routing_key.to_string(),
                    body: payload.to_vec(),
                    redelivered: false,
                });
            }
            state.pump(&self.shared, &queue);
        }
        Ok(())
    }

    async fn subscribe(&self, subscription: &Subscription) -> Result<DeliveryStream, MessagingError> {
        let mut state = lock(&self.shared);
        if !state.connected {
            return Err(MessagingError::Disconnected);
        }

        for key in &subscription.routing_keys {
            state.bind(&subscription.queue, key);
        }
        state.queues.entry(subscription.queue.clone()).or_default();

        let consumer_id = state.next_id();
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(queue) = state.queues.get_mut(&subscription.queue) {
            queue.consumers.push(ConsumerSlot {
                id: consumer_id,
                mode: subscription.ack_mode,
                tx,
            });
        }
        state.pump(&self.shared, &subscription.queue);

        Ok(Box::pin(MemoryDeliveryStream {
            rx,
            shared: self.shared.clone(),
            queue: subscription.queue.clone(),
            consumer_id,
        }))
    }

    async fn is_connected(&self) -> bool {
        lock(&self.shared).connected
    }

    async fn reconnect(&self) -> Result<(), MessagingError> {
        let mut state = lock(&self.shared);
        if state.refuse_reconnects > 0 {
            state.refuse_reconnects -= 1;
            return Err(MessagingError::Connection("connection refused".to_string()));
        }
        state.connected = true;
        Ok(())
    }
}
