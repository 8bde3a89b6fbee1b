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

//! Turns Event Schedule entries into in-memory deliveries to the broker
//! adapter, honoring delays and reacting to confirmations.

use crate::store::Store;
use crate::task_group::TaskGroup;
use chrono::Utc;
use outbox_router_model::Entity;
use outbox_router_model::EventPayload;
use outbox_router_model::RouterError;
use outbox_router_model::RouterErrorKind;
use outbox_router_model::work_unit::run_scoped;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// Schedules outbound events and reconciles confirmations against the
/// persistent [Store].
pub struct Scheduler<S: Store> {
    store: Arc<S>,
    payload_send: mpsc::Sender<EventPayload>,
    confirmation_send: mpsc::Sender<EventPayload>,
    confirmation_recv: Mutex<Option<mpsc::Receiver<EventPayload>>>,
    task_group: Mutex<TaskGroup>,
}

impl<S: Store + 'static> Scheduler<S> {
    /// Build a scheduler backed by `store`, sending payloads to the broker
    /// adapter on `payload_send`.
    ///
    /// The confirmation channel is owned internally; hand
    /// [Scheduler::confirmation_send_stream] to the broker adapter and drive
    /// [Scheduler::receive_confirmation_stream] in a background task.
    pub fn new(
        store: Arc<S>,
        payload_send: mpsc::Sender<EventPayload>,
        confirmation_channel_capacity: usize,
    ) -> Self {
        let (confirmation_send, confirmation_recv) =
            mpsc::channel(confirmation_channel_capacity);
        Self {
            store,
            payload_send,
            confirmation_send,
            confirmation_recv: Mutex::new(Some(confirmation_recv)),
            task_group: Mutex::new(TaskGroup::new("scheduler")),
        }
    }

    /// Clone of the sender side of the confirmation channel, to be handed to
    /// the broker adapter's `send_event_payload_stream`.
    pub fn confirmation_send_stream(&self) -> mpsc::Sender<EventPayload> {
        self.confirmation_send.clone()
    }

    /// Record a claimed entry with `due_after = now + delay`, spawn a
    /// sub-task that waits `delay` then sends `payload` on the payload
    /// stream, and kick off a recovery sweep.
    ///
    /// Duplication between this fast path and the recovery sweep is
    /// deliberate: broker confirmation, not submission, is what closes the
    /// schedule entry, so submitting twice is harmless.
    pub async fn schedule_event(
        &self,
        payload: EventPayload,
        delay: Duration,
        unit: Option<&mut S::Unit>,
    ) -> Result<(), RouterError> {
        let due_after = (!delay.is_zero()).then(|| Utc::now() + delay);
        self.store
            .add_claimed_event_entry(&payload, due_after, unit)
            .await?;
        let payload_send = self.payload_send.clone();
        let payload_for_task = payload.clone();
        self.task_group.lock().expect("task group poisoned").spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            payload_send
                .send(payload_for_task)
                .await
                .map_err(|_| RouterErrorKind::Broker.error_with_msg("payload stream closed"))
        });
        self.schedule_every_open_unclaimed_event_entry_due_now().await
    }

    /// For each entity, atomically drain its outbox and schedule each event
    /// in emission order. Timestamps, not insertion order, define logical
    /// order across entities.
    pub async fn schedule_outbox<Id: Clone>(
        &self,
        entities: &[&Entity<Id>],
        unit: Option<&mut S::Unit>,
    ) -> Result<(), RouterError> {
        let mut unit = unit;
        for entity in entities {
            let events = entity.clear_outbox();
            if entity.outbox_len() != 0 {
                return Err(RouterErrorKind::OutboxLeak.error_with_msg(
                    "entity outbox received a write after being cleared inside this scope",
                ));
            }
            for payload in events {
                let reborrowed = unit.as_mut().map(|u| &mut **u);
                self.schedule_event(payload, Duration::ZERO, reborrowed).await?;
            }
        }
        Ok(())
    }

    /// Open a work unit over the store, run `body` against it for business
    /// writes, then schedule the outbox of `entities` inside the same
    /// transaction before committing.
    ///
    /// On rollback (explicit, or via an `Err` from `body`), neither the
    /// business writes nor the outbox writes persist.
    pub async fn schedule_outbox_in_work_unit<Id, F, Fut, T>(
        &self,
        entities: Vec<&Entity<Id>>,
        body: F,
    ) -> Result<T, RouterError>
    where
        Id: Clone,
        F: FnOnce(&mut S::Unit) -> Fut,
        Fut: Future<Output = Result<T, RouterError>>,
    {
        let unit = self.store.create_work_unit().await?;
        run_scoped(unit, move |u| async move {
            let value = body(u).await?;
            self.schedule_outbox(&entities, Some(u)).await?;
            Ok(value)
        })
        .await
    }

    /// Recovery sweep: submit every due, unclaimed-or-claim-expired entry to
    /// the payload stream without re-adding it to the schedule.
    pub async fn schedule_every_open_unclaimed_event_entry_due_now(
        &self,
    ) -> Result<(), RouterError> {
        let due = self.store.every_open_unclaimed_event_entry_due_now().await?;
        for payload in due {
            self.payload_send
                .send(payload)
                .await
                .map_err(|_| RouterErrorKind::Broker.error_with_msg("payload stream closed"))?;
        }
        Ok(())
    }

    /// Loop forever, closing the corresponding schedule entry for every
    /// payload observed on the confirmation stream.
    ///
    /// Must only be called once per scheduler instance; subsequent calls
    /// fail because the receiver half is taken on first use.
    pub async fn receive_confirmation_stream(&self) -> Result<(), RouterError> {
        let mut recv = self
            .confirmation_recv
            .lock()
            .expect("confirmation receiver mutex poisoned")
            .take()
            .ok_or_else(|| {
                RouterErrorKind::Broker
                    .error_with_msg("receive_confirmation_stream called more than once")
            })?;
        while let Some(payload) = recv.recv().await {
            self.store.close_event_entry(payload.id).await?;
        }
        Ok(())
    }

    /// Wait for every fire-and-forget sub-task spawned by
    /// [Scheduler::schedule_event] to finish. Used during graceful shutdown.
    pub async fn join_background_tasks(&self) {
        self.task_group
            .lock()
            .expect("task group poisoned")
            .join_all()
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbox_router_model::DomainEvent;
    use outbox_router_model::RouterErrorKind;
    use outbox_router_testkit::InMemoryStore;
    use serde::Serialize;
    use serde_json::Map;
    use uuid::Uuid;

    #[derive(Serialize)]
    struct TestEvent {
        id: Uuid,
        occurred_on: chrono::DateTime<Utc>,
        seq: usize,
    }

    impl DomainEvent for TestEvent {
        fn event_id(&self) -> Uuid {
            self.id
        }
        fn occurred_on(&self) -> chrono::DateTime<Utc> {
            self.occurred_on
        }
    }

    fn sample_entity_with_events(id: &str, count: usize) -> Entity<String> {
        let entity = Entity::new(id.to_string());
        for i in 0..count {
            entity
                .record_event(&TestEvent {
                    id: Uuid::new_v4(),
                    occurred_on: Utc::now(),
                    seq: i,
                })
                .unwrap();
        }
        entity
    }

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
    async fn rollback_inside_outbox_work_unit_persists_nothing() {
        let store = Arc::new(InMemoryStore::new(Duration::from_secs(60)));
        let (payload_send, mut payload_recv) = mpsc::channel(16);
        let scheduler = Scheduler::new(Arc::clone(&store), payload_send, 16);
        let entity = sample_entity_with_events("acct-1", 2);

        let result: Result<(), RouterError> = scheduler
            .schedule_outbox_in_work_unit(vec![&entity], |_unit| async {
                Err(RouterErrorKind::HandlerFailure.error())
            })
            .await;
        assert!(result.is_err());

        assert!(store.every_open_unclaimed_event_entry_due_now().await.unwrap().is_empty());
        assert!(payload_recv.try_recv().is_err());
    }

    #[tokio::test]
    async fn commit_inside_outbox_work_unit_schedules_every_event() {
        let store = Arc::new(InMemoryStore::new(Duration::from_secs(60)));
        let (payload_send, mut payload_recv) = mpsc::channel(16);
        let scheduler = Scheduler::new(Arc::clone(&store), payload_send, 16);
        let entity = sample_entity_with_events("acct-2", 2);

        scheduler
            .schedule_outbox_in_work_unit(vec![&entity], |_unit| async { Ok(()) })
            .await
            .unwrap();

        let mut received = 0;
        for _ in 0..2 {
            payload_recv.recv().await.expect("expected scheduled payload");
            received += 1;
        }
        assert_eq!(received, 2);
    }

    #[tokio::test]
    async fn recovery_sweep_submits_due_entries_in_claimed_at_order() {
        // A claim duration short enough that both entries below read as
        // expired-and-due once the sweep runs, simulating a fresh process
        // picking up rows claimed by a predecessor that crashed.
        let store = Arc::new(InMemoryStore::new(Duration::from_millis(1)));
        let (payload_send, mut payload_recv) = mpsc::channel(16);
        let scheduler = Scheduler::new(Arc::clone(&store), payload_send, 16);

        let first = sample_payload();
        store.add_claimed_event_entry(&first, None, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = sample_payload();
        store.add_claimed_event_entry(&second, None, None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        scheduler
            .schedule_every_open_unclaimed_event_entry_due_now()
            .await
            .unwrap();

        let received_first = payload_recv.recv().await.expect("expected first payload");
        let received_second = payload_recv.recv().await.expect("expected second payload");
        assert_eq!(received_first.id, first.id);
        assert_eq!(received_second.id, second.id);
    }
}
