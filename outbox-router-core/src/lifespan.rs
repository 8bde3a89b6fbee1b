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

//! Wires the envelope/work-unit, integrity guard, schedule, registry,
//! broker and router into one cooperatively scheduled task graph.
//!
//! Mirrors the source's `default_lifespan`: a background group runs the
//! router's delivery loop, the scheduler's confirmation loop and the
//! broker's send loop; a foreground group (owned by [crate::scheduler::Scheduler]
//! and [crate::router::Router] themselves) hosts handler tasks and timed
//! re-enqueues. Shutdown cancels the background group and drains the
//! foreground one.

use crate::message::MessageBroker;
use crate::registry::HandlerRegistry;
use crate::router::Router;
use crate::scheduler::Scheduler;
use crate::store::Store;
use crate::task_group::TaskGroup;
use outbox_router_model::RouterError;
use outbox_router_model::RouterErrorKind;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Owns the background task graph connecting [Router], [Scheduler] and a
/// [MessageBroker] implementation.
pub struct Lifespan<S: Store + 'static, B: MessageBroker + 'static> {
    scheduler: Arc<Scheduler<S>>,
    router: Arc<Router<S>>,
    broker: Arc<B>,
    payload_recv: Mutex<Option<mpsc::Receiver<outbox_router_model::EventPayload>>>,
    background: Mutex<TaskGroup>,
}

impl<S: Store + 'static, B: MessageBroker + 'static> Lifespan<S, B> {
    /// Compose a router and scheduler over `store`, `registry` and `broker`.
    ///
    /// `payload_channel_capacity` and `confirmation_channel_capacity` bound
    /// the respective memory channels; once full, [Scheduler::schedule_event]
    /// blocks its caller.
    pub fn new(
        store: Arc<S>,
        registry: Arc<HandlerRegistry<S>>,
        broker: Arc<B>,
        payload_channel_capacity: usize,
        confirmation_channel_capacity: usize,
    ) -> Self {
        let (payload_send, payload_recv) = mpsc::channel(payload_channel_capacity);
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&store),
            payload_send,
            confirmation_channel_capacity,
        ));
        let router = Arc::new(Router::new(store, Arc::clone(&scheduler), registry));
        Self {
            scheduler,
            router,
            broker,
            payload_recv: Mutex::new(Some(payload_recv)),
            background: Mutex::new(TaskGroup::new("lifespan-background")),
        }
    }

    /// A shared handle to the scheduler, for business code to call
    /// `schedule_outbox_in_work_unit` from inside its own request handling.
    pub fn scheduler(&self) -> Arc<Scheduler<S>> {
        Arc::clone(&self.scheduler)
    }

    /// Start the background task graph and run the startup recovery sweep.
    ///
    /// May only be called once; a second call fails because the payload
    /// receiver half is taken on first use.
    pub async fn start(&self) -> Result<(), RouterError> {
        let payload_recv = self
            .payload_recv
            .lock()
            .expect("payload receiver mutex poisoned")
            .take()
            .ok_or_else(|| {
                RouterErrorKind::Broker.error_with_msg("lifespan already started")
            })?;
        let confirmation_send = self.scheduler.confirmation_send_stream();
        let mut background = self.background.lock().expect("task group poisoned");

        let broker = Arc::clone(&self.broker);
        background.spawn(async move {
            broker
                .send_event_payload_stream(payload_recv, confirmation_send)
                .await
        });

        let scheduler = Arc::clone(&self.scheduler);
        background.spawn(async move { scheduler.receive_confirmation_stream().await });

        let router = Arc::clone(&self.router);
        let broker = Arc::clone(&self.broker);
        background.spawn(async move { router.dispatch_from_broker(broker.as_ref()).await });

        drop(background);
        self.scheduler
            .schedule_every_open_unclaimed_event_entry_due_now()
            .await
    }

    /// Cancel the background group, then wait for in-flight handler tasks
    /// and scheduler sub-tasks to drain.
    pub async fn shutdown(&self) {
        self.background
            .lock()
            .expect("task group poisoned")
            .shutdown();
        self.router.join_handler_tasks().await;
        self.scheduler.join_background_tasks().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandlerRegistry;
    use outbox_router_model::Guarantee;
    use outbox_router_testkit::InMemoryBroker;
    use outbox_router_testkit::InMemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn start_runs_recovery_sweep_without_error() {
        let store = Arc::new(InMemoryStore::new(Duration::from_secs(60)));
        let registry = Arc::new(HandlerRegistry::new());
        registry
            .subscribe(vec!["noop".to_string()], Guarantee::AtLeastOnce, Duration::from_secs(1))
            .handle(|_message, _scheduler| async { Ok(()) })
            .unwrap();
        let broker = Arc::new(InMemoryBroker::new(16));
        let lifespan = Lifespan::new(store, registry, broker, 16, 16);
        lifespan.start().await.unwrap();
        lifespan.shutdown().await;
    }
}
