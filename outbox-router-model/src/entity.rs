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

//! A domain entity with an append-only event outbox.

use crate::event::DomainEvent;
use crate::event::EventPayload;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A domain object with identity `id` and a pending-event outbox.
///
/// The outbox is single-owner for the lifetime of the scheduling scope that
/// clears it (see `outbox_router_core::scheduler::Scheduler::schedule_outbox`):
/// [Entity::record_event] may be called freely by business code up to the
/// point [Entity::clear_outbox] is taken for scheduling, after which further
/// writes before the scope closes are a bug the scheduler detects via
/// [Entity::outbox_len].
pub struct Entity<Id> {
    id: Id,
    outbox: Mutex<VecDeque<EventPayload>>,
}

impl<Id: Clone> Entity<Id> {
    /// Construct a new entity with an empty outbox.
    pub fn new(id: Id) -> Self {
        Self {
            id,
            outbox: Mutex::new(VecDeque::new()),
        }
    }

    /// This entity's identity.
    pub fn id(&self) -> Id {
        self.id.clone()
    }

    /// Append a domain event to the outbox, converting it to an
    /// [EventPayload] immediately so the outbox only ever holds the
    /// wire-shaped envelope.
    pub fn record_event<E: DomainEvent>(
        &self,
        event: &E,
    ) -> Result<(), crate::error::RouterError> {
        let payload = EventPayload::from_event(event)?;
        self.outbox
            .lock()
            .expect("entity outbox mutex poisoned")
            .push_back(payload);
        Ok(())
    }

    /// Atomically drain and return every pending event, in emission order.
    pub fn clear_outbox(&self) -> Vec<EventPayload> {
        let mut guard = self.outbox.lock().expect("entity outbox mutex poisoned");
        guard.drain(..).collect()
    }

    /// Number of events currently pending in the outbox.
    ///
    /// Used by the scheduler to detect writes that raced a
    /// [Entity::clear_outbox] within the same scheduling scope.
    pub fn outbox_len(&self) -> usize {
        self.outbox.lock().expect("entity outbox mutex poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde::Serialize;
    use uuid::Uuid;

    #[derive(Serialize)]
    struct Deposited {
        id: Uuid,
        occurred_on: chrono::DateTime<Utc>,
        amount_cents: u64,
    }

    impl DomainEvent for Deposited {
        fn event_id(&self) -> Uuid {
            self.id
        }
        fn occurred_on(&self) -> chrono::DateTime<Utc> {
            self.occurred_on
        }
    }

    #[test]
    fn clear_outbox_drains_in_emission_order() {
        let account = Entity::new("acct-1".to_string());
        for amount in [100u64, 200, 300] {
            account
                .record_event(&Deposited {
                    id: Uuid::new_v4(),
                    occurred_on: Utc::now(),
                    amount_cents: amount,
                })
                .unwrap();
        }
        let drained = account.clear_outbox();
        assert_eq!(drained.len(), 3);
        assert_eq!(account.outbox_len(), 0);
    }

    #[test]
    fn writes_after_clear_are_observable_via_outbox_len() {
        let account = Entity::new("acct-2".to_string());
        account
            .record_event(&Deposited {
                id: Uuid::new_v4(),
                occurred_on: Utc::now(),
                amount_cents: 50,
            })
            .unwrap();
        account.clear_outbox();
        account
            .record_event(&Deposited {
                id: Uuid::new_v4(),
                occurred_on: Utc::now(),
                amount_cents: 75,
            })
            .unwrap();
        // A scheduling scope that clears once and then sees a non-zero
        // length is the "writing to outbox after clearing loses events" bug.
        assert_eq!(account.outbox_len(), 1);
    }
}
