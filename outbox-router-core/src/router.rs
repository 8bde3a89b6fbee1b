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

//! Drains incoming broker deliveries, deduplicates, dispatches per
//! guarantee and retries on failure.

use crate::guard::run_guarded;
use crate::message::Message;
use crate::message::MessageBroker;
use crate::registry::HandlerRegistry;
use crate::registry::HandlerSpecification;
use crate::scheduler::Scheduler;
use crate::store::Store;
use crate::task_group::TaskGroup;
use outbox_router_model::EventPayload;
use outbox_router_model::RouterError;
use std::sync::Arc;
use std::sync::Mutex;

/// Consumes broker deliveries and dispatches them to registered handlers.
pub struct Router<S: Store + 'static> {
    store: Arc<S>,
    scheduler: Arc<Scheduler<S>>,
    registry: Arc<HandlerRegistry<S>>,
    task_group: Mutex<TaskGroup>,
}

impl<S: Store + 'static> Router<S> {
    /// Build a router over `store`, scheduling retries through `scheduler`
    /// and dispatching to handlers registered in `registry`.
    pub fn new(store: Arc<S>, scheduler: Arc<Scheduler<S>>, registry: Arc<HandlerRegistry<S>>) -> Self {
        Self {
            store,
            scheduler,
            registry,
            task_group: Mutex::new(TaskGroup::new("router")),
        }
    }

    /// Drain `broker`'s delivery stream forever, dispatching each message.
    ///
    /// Snapshots the registry mapping once at the start of the loop; new
    /// registrations after this call starts are not picked up until it is
    /// called again.
    pub async fn dispatch_from_broker<B: MessageBroker>(&self, broker: &B) -> Result<(), RouterError> {
        let mapping = self.registry.mapping();
        let mut messages = broker.message_receive_stream().await;
        while let Some(message) = messages.recv().await {
            let message: Arc<dyn Message> = Arc::new(message);
            let payload = message.event_payload().clone();
            if self.store.is_dispatch_forbidden(payload.id).await? {
                message.acknowledge().await;
                continue;
            }
            let Some(spec) = mapping.get(&payload.subject).cloned() else {
                log::warn!("no handler registered for subject '{}'; leaving unacknowledged", payload.subject);
                continue;
            };
            self.store.record_dispatch_attempt(&payload).await?;
            let store = Arc::clone(&self.store);
            let scheduler = Arc::clone(&self.scheduler);
            self.task_group
                .lock()
                .expect("task group poisoned")
                .spawn(async move { handle_with_retry(store, scheduler, spec, message, payload).await });
        }
        Ok(())
    }

    /// Wait for every in-flight handler task to finish. Used during graceful
    /// shutdown, after the background group has been cancelled.
    pub async fn join_handler_tasks(&self) {
        self.task_group.lock().expect("task group poisoned").join_all().await;
    }
}

/// Run `spec`'s handler under its guarantee; on failure, reschedule through
/// the outbox, then acknowledge, then propagate the error for supervision.
///
/// The reschedule-then-ack ordering is the retry invariant: the event is
/// durably re-queued before the broker releases the original delivery.
async fn handle_with_retry<S: Store + 'static>(
    store: Arc<S>,
    scheduler: Arc<Scheduler<S>>,
    spec: Arc<HandlerSpecification<S>>,
    message: Arc<dyn Message>,
    payload: EventPayload,
) -> Result<(), RouterError> {
    let handler = Arc::clone(&spec.handler);
    let message_for_handler = Arc::clone(&message);
    let scheduler_for_handler = Arc::clone(&scheduler);
    let result = run_guarded(
        store.as_ref(),
        message.as_ref(),
        &payload,
        spec.guarantee,
        move |_unit| {
            let handler = Arc::clone(&handler);
            let message = Arc::clone(&message_for_handler);
            let scheduler = Arc::clone(&scheduler_for_handler);
            async move { handler(message, scheduler).await }
        },
    )
    .await;
    if let Err(e) = result {
        scheduler
            .schedule_event(payload, spec.delay_on_exc, None)
            .await?;
        message.acknowledge().await;
        return Err(e);
    }
    Ok(())
}
