/*
    Copyright 2025 MydriaTech AB

    Licensed under the Apache License 2.0 with Free world makers exception
    1.0.0 (the "License"); you may not use this file except in compliance with
    the License. You should have obtained a copy of the License with the source
    or binary distribution in file named

        LICENSE-Apache-2.0-with-FWM-Exception-1.0.0

    Unless required by applicable law or agreed to in writing, software
    distributed under the License is distributed on an "AS IS" BASIS,
    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
    See the License for the specific language governing permissions and
    limitations under the License.
*/

//! Ephemeral in-memory [MessageBroker] implementation, for tests only.
//!
//! Publishing is modeled as immediate, unconditional confirmation: every
//! payload handed to [InMemoryBroker::send_event_payload_stream] is recorded
//! and forwarded straight to the confirmation channel. Inbound delivery is
//! driven explicitly by tests via [InMemoryBroker::deliver].

use async_trait::async_trait;
use outbox_router_core::Message;
use outbox_router_core::MessageBroker;
use outbox_router_model::EventPayload;
use outbox_router_model::RouterError;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;

/// A delivered [EventPayload] plus an idempotent in-memory acknowledgement
/// flag.
pub struct InMemoryMessage {
    payload: EventPayload,
    acknowledged: Arc<AtomicBool>,
}

impl InMemoryMessage {
    /// Wrap `payload` as an unacknowledged delivery.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            acknowledged: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether [Message::acknowledge] has been called.
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Message for InMemoryMessage {
    fn event_payload(&self) -> &EventPayload {
        &self.payload
    }

    async fn acknowledge(&self) {
        self.acknowledged.store(true, Ordering::SeqCst);
    }
}

/// An in-memory [MessageBroker], suitable for unit and integration tests.
pub struct InMemoryBroker {
    delivery_send: mpsc::Sender<InMemoryMessage>,
    delivery_recv: Mutex<Option<mpsc::Receiver<InMemoryMessage>>>,
    sent: Mutex<Vec<EventPayload>>,
}

impl InMemoryBroker {
    /// Build a broker whose inbound delivery channel has the given
    /// capacity.
    pub fn new(delivery_channel_capacity: usize) -> Self {
        let (delivery_send, delivery_recv) = mpsc::channel(delivery_channel_capacity);
        Self {
            delivery_send,
            delivery_recv: Mutex::new(Some(delivery_recv)),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Simulate an inbound broker delivery of `payload`.
    pub async fn deliver(&self, payload: EventPayload) {
        self.delivery_send
            .send(InMemoryMessage::new(payload))
            .await
            .expect("delivery channel closed");
    }

    /// Every payload handed to [InMemoryBroker::send_event_payload_stream]
    /// so far, in the order it was sent.
    pub fn sent_payloads(&self) -> Vec<EventPayload> {
        self.sent.lock().expect("sent mutex poisoned").clone()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    type Msg = InMemoryMessage;

    async fn send_event_payload_stream(
        &self,
        mut payload_recv: mpsc::Receiver<EventPayload>,
        confirmation_send: mpsc::Sender<EventPayload>,
    ) -> Result<(), RouterError> {
        while let Some(payload) = payload_recv.recv().await {
            self.sent.lock().expect("sent mutex poisoned").push(payload.clone());
            if confirmation_send.send(payload).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn message_receive_stream(&self) -> mpsc::Receiver<Self::Msg> {
        self.delivery_recv
            .lock()
            .expect("delivery receiver mutex poisoned")
            .take()
            .unwrap_or_else(|| {
                panic!("message_receive_stream called more than once");
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::Map;
    use uuid::Uuid;

    fn sample_payload() -> EventPayload {
        let mut body = Map::new();
        body.insert("_subject".to_string(), "something-happened".into());
        EventPayload {
            id: Uuid::new_v4(),
            occurred_on: Utc::now(),
            subject: "something-happened".to_string(),
            body,
        }
    }

    #[tokio::test]
    async fn send_stream_forwards_every_payload_to_confirmation() {
        let broker = InMemoryBroker::new(4);
        let (payload_send, payload_recv) = mpsc::channel(4);
        let (confirmation_send, mut confirmation_recv) = mpsc::channel(4);
        let payload = sample_payload();
        payload_send.send(payload.clone()).await.unwrap();
        drop(payload_send);
        broker
            .send_event_payload_stream(payload_recv, confirmation_send)
            .await
            .unwrap();
        assert_eq!(confirmation_recv.recv().await.unwrap().id, payload.id);
        assert_eq!(broker.sent_payloads().len(), 1);
    }

    #[tokio::test]
    async fn deliver_is_observable_on_the_receive_stream() {
        let broker = InMemoryBroker::new(4);
        let payload = sample_payload();
        broker.deliver(payload.clone()).await;
        let mut messages = broker.message_receive_stream().await;
        let message = messages.recv().await.unwrap();
        assert_eq!(message.event_payload().id, payload.id);
        assert!(!message.is_acknowledged());
    }
}
