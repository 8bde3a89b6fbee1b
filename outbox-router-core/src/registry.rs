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

//! Maps a subject to the handler, guarantee and retry delay registered for
//! it.
//!
//! The source exposes a `@subscribe` decorator. This crate replaces it with
//! an explicit builder, `registry.on(subjects, guarantee, delay).handle(fn)`,
//! per the redesign notes: startup wiring stays visible at the call site.

use crate::message::Message;
use crate::scheduler::Scheduler;
use crate::store::Store;
use futures::future::BoxFuture;
use outbox_router_model::Guarantee;
use outbox_router_model::RouterError;
use outbox_router_model::RouterErrorKind;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

/// A boxed, reference-counted message handler.
///
/// Handlers receive their own `Arc` of the delivered message and of the
/// scheduler, rather than borrowed references, so they can be dispatched
/// into detached tasks without fighting lifetimes.
pub type MessageHandler<S> = Arc<
    dyn Fn(Arc<dyn Message>, Arc<Scheduler<S>>) -> BoxFuture<'static, Result<(), RouterError>>
        + Send
        + Sync,
>;

/// Everything needed to dispatch a delivery for one subject.
pub struct HandlerSpecification<S: Store> {
    /// Delivery guarantee this handler was registered under.
    pub guarantee: Guarantee,
    /// Retry delay applied when the handler fails.
    pub delay_on_exc: Duration,
    /// The handler itself.
    pub handler: MessageHandler<S>,
}

/// Subject → [HandlerSpecification] registry.
pub struct HandlerRegistry<S: Store> {
    entries: RwLock<HashMap<String, Arc<HandlerSpecification<S>>>>,
}

impl<S: Store> Default for HandlerRegistry<S> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<S: Store> HandlerRegistry<S> {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every subject in `subjects` under `guarantee`
    /// with retry delay `delay_on_exc`.
    ///
    /// `delay_on_exc` must be strictly positive and no subject may already
    /// be registered.
    pub fn register(
        &self,
        subjects: &[impl AsRef<str>],
        handler: MessageHandler<S>,
        guarantee: Guarantee,
        delay_on_exc: Duration,
    ) -> Result<(), RouterError> {
        if delay_on_exc.is_zero() {
            return Err(RouterErrorKind::InvalidDelay
                .error_with_msg("delay_on_exc must be > 0"));
        }
        let spec = Arc::new(HandlerSpecification {
            guarantee,
            delay_on_exc,
            handler,
        });
        let mut entries = self.entries.write().expect("registry lock poisoned");
        for subject in subjects {
            let subject = subject.as_ref().to_string();
            if entries.contains_key(&subject) {
                return Err(RouterErrorKind::DuplicateRegistration.error_with_msg(format!(
                    "subject '{subject}' is already registered"
                )));
            }
            entries.insert(subject, Arc::clone(&spec));
        }
        Ok(())
    }

    /// Snapshot of the current subject → specification mapping.
    pub fn mapping(&self) -> HashMap<String, Arc<HandlerSpecification<S>>> {
        self.entries.read().expect("registry lock poisoned").clone()
    }

    /// Begin a declarative registration for `subjects` under `guarantee`,
    /// retrying after `delay_on_exc` on failure. Finish with
    /// [Subscription::handle].
    pub fn subscribe(
        &self,
        subjects: Vec<String>,
        guarantee: Guarantee,
        delay_on_exc: Duration,
    ) -> Subscription<'_, S> {
        Subscription {
            registry: self,
            subjects,
            guarantee,
            delay_on_exc,
        }
    }
}

/// The in-progress half of a `registry.subscribe(...).handle(...)` call.
pub struct Subscription<'r, S: Store> {
    registry: &'r HandlerRegistry<S>,
    subjects: Vec<String>,
    guarantee: Guarantee,
    delay_on_exc: Duration,
}

impl<'r, S: Store + 'static> Subscription<'r, S> {
    /// Finish the registration with `handler`.
    pub fn handle<F, Fut>(self, handler: F) -> Result<(), RouterError>
    where
        F: Fn(Arc<dyn Message>, Arc<Scheduler<S>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RouterError>> + Send + 'static,
    {
        let boxed: MessageHandler<S> = Arc::new(move |message, scheduler| {
            Box::pin(handler(message, scheduler))
        });
        self.registry
            .register(&self.subjects, boxed, self.guarantee, self.delay_on_exc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbox_router_testkit::InMemoryStore;

    #[test]
    fn register_rejects_non_positive_delay() {
        let registry: HandlerRegistry<InMemoryStore> = HandlerRegistry::new();
        let err = registry
            .subscribe(vec!["something-happened".to_string()], Guarantee::AtLeastOnce, Duration::ZERO)
            .handle(|_m, _s| async { Ok(()) })
            .unwrap_err();
        assert!(matches!(err.kind(), RouterErrorKind::InvalidDelay));
    }

    #[test]
    fn register_rejects_duplicate_subject() {
        let registry: HandlerRegistry<InMemoryStore> = HandlerRegistry::new();
        registry
            .subscribe(
                vec!["something-happened".to_string()],
                Guarantee::AtLeastOnce,
                Duration::from_secs(1),
            )
            .handle(|_m, _s| async { Ok(()) })
            .unwrap();
        let err = registry
            .subscribe(
                vec!["something-happened".to_string()],
                Guarantee::AtLeastOnce,
                Duration::from_secs(1),
            )
            .handle(|_m, _s| async { Ok(()) })
            .unwrap_err();
        assert!(matches!(err.kind(), RouterErrorKind::DuplicateRegistration));
    }

    #[test]
    fn mapping_reflects_registered_subjects() {
        let registry: HandlerRegistry<InMemoryStore> = HandlerRegistry::new();
        registry
            .subscribe(
                vec!["a".to_string(), "b".to_string()],
                Guarantee::NoMoreThanOnce,
                Duration::from_millis(500),
            )
            .handle(|_m, _s| async { Ok(()) })
            .unwrap();
        let mapping = registry.mapping();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping["a"].guarantee, Guarantee::NoMoreThanOnce);
    }
}
