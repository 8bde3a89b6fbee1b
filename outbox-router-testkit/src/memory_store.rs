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

//! Ephemeral in-memory [Store] implementation, for tests only.
//!
//! Lock-free maps follow the same `crossbeam_skiplist::SkipMap` approach as
//! `fragtale-dbp-mem`'s `InMemTopic`. Unlike that adapter, writes issued
//! through a work unit are staged and only applied to the shared maps on
//! commit, so this store can exercise the outbox-atomicity and
//! exactly-once-crash scenarios without a real transactional backend.

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use crossbeam_skiplist::SkipMap;
use outbox_router_core::Store;
use outbox_router_model::EventPayload;
use outbox_router_model::Guarantee;
use outbox_router_model::RouterError;
use outbox_router_model::RouterErrorKind;
use outbox_router_model::WorkUnit;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone)]
struct ScheduleRow {
    payload: EventPayload,
    claimed_at: DateTime<Utc>,
    due_after: Option<DateTime<Utc>>,
    closed: bool,
}

struct State {
    claim_duration: Duration,
    dispatched: SkipMap<Uuid, u64>,
    handled: SkipMap<Uuid, Guarantee>,
    schedule: SkipMap<Uuid, ScheduleRow>,
}

impl State {
    fn apply_add_claimed_event_entry(&self, payload: &EventPayload, due_after: Option<DateTime<Utc>>) {
        self.schedule.insert(
            payload.id,
            ScheduleRow {
                payload: payload.clone(),
                claimed_at: Utc::now(),
                due_after,
                closed: false,
            },
        );
    }

    fn apply_record_completion(
        &self,
        payload: &EventPayload,
        guarantee: Guarantee,
    ) -> Result<(), RouterError> {
        if self.handled.get(&payload.id).is_some() {
            return Err(RouterErrorKind::DuplicateCompletion
                .error_with_msg(format!("event {} already handled", payload.id)));
        }
        self.handled.insert(payload.id, guarantee);
        Ok(())
    }
}

/// An in-memory [Store], suitable for unit and integration tests.
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<State>,
}

impl InMemoryStore {
    /// Build an empty store. `claim_duration` governs how long a scheduled
    /// entry is considered claimed before recovery may re-emit it.
    pub fn new(claim_duration: Duration) -> Self {
        Self {
            state: Arc::new(State {
                claim_duration,
                dispatched: SkipMap::new(),
                handled: SkipMap::new(),
                schedule: SkipMap::new(),
            }),
        }
    }
}

/// A write deferred until [InMemoryWorkUnit::commit].
enum StagedOp {
    AddClaimedEventEntry {
        payload: EventPayload,
        due_after: Option<DateTime<Utc>>,
    },
    RecordCompletion {
        payload: EventPayload,
        guarantee: Guarantee,
    },
}

/// Scoped transaction over an [InMemoryStore].
///
/// Writes made with `unit: Some(..)` are buffered in `ops` and only become
/// visible to other readers when [InMemoryWorkUnit::commit] runs; a
/// rollback simply discards them.
pub struct InMemoryWorkUnit {
    state: Arc<State>,
    ops: Vec<StagedOp>,
    committed: bool,
    rolled_back: bool,
}

#[async_trait]
impl WorkUnit for InMemoryWorkUnit {
    async fn commit(&mut self) -> Result<(), RouterError> {
        for op in self.ops.drain(..) {
            match op {
                StagedOp::AddClaimedEventEntry { payload, due_after } => {
                    self.state.apply_add_claimed_event_entry(&payload, due_after);
                }
                StagedOp::RecordCompletion { payload, guarantee } => {
                    self.state.apply_record_completion(&payload, guarantee)?;
                }
            }
        }
        self.committed = true;
        Ok(())
    }

    fn rollback(&mut self) {
        self.ops.clear();
        self.rolled_back = true;
    }

    fn rolled_back(&self) -> bool {
        self.rolled_back
    }

    fn committed(&self) -> bool {
        self.committed
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Unit = InMemoryWorkUnit;

    async fn create_work_unit(&self) -> Result<Self::Unit, RouterError> {
        Ok(InMemoryWorkUnit {
            state: Arc::clone(&self.state),
            ops: Vec::new(),
            committed: false,
            rolled_back: false,
        })
    }

    async fn is_dispatch_forbidden(&self, event_id: Uuid) -> Result<bool, RouterError> {
        Ok(self.state.handled.get(&event_id).is_some())
    }

    async fn record_dispatch_attempt(&self, payload: &EventPayload) -> Result<(), RouterError> {
        let count = self
            .state
            .dispatched
            .get(&payload.id)
            .map(|entry| *entry.value())
            .unwrap_or(0);
        self.state.dispatched.insert(payload.id, count + 1);
        Ok(())
    }

    async fn record_completion_with_guarantee(
        &self,
        payload: &EventPayload,
        guarantee: Guarantee,
        unit: Option<&mut Self::Unit>,
    ) -> Result<(), RouterError> {
        if self.state.handled.get(&payload.id).is_some() {
            return Err(RouterErrorKind::DuplicateCompletion
                .error_with_msg(format!("event {} already handled", payload.id)));
        }
        match unit {
            Some(unit) => {
                unit.ops.push(StagedOp::RecordCompletion {
                    payload: payload.clone(),
                    guarantee,
                });
                Ok(())
            }
            None => self.state.apply_record_completion(payload, guarantee),
        }
    }

    async fn add_claimed_event_entry(
        &self,
        payload: &EventPayload,
        due_after: Option<DateTime<Utc>>,
        unit: Option<&mut Self::Unit>,
    ) -> Result<(), RouterError> {
        match unit {
            Some(unit) => {
                unit.ops.push(StagedOp::AddClaimedEventEntry {
                    payload: payload.clone(),
                    due_after,
                });
            }
            None => self.state.apply_add_claimed_event_entry(payload, due_after),
        }
        Ok(())
    }

    async fn is_event_entry_claimed(&self, event_id: Uuid) -> Result<bool, RouterError> {
        Ok(self
            .state
            .schedule
            .get(&event_id)
            .map(|entry| entry.value().claimed_at + self.state.claim_duration > Utc::now())
            .unwrap_or(false))
    }

    async fn every_open_unclaimed_event_entry_due_now(
        &self,
    ) -> Result<Vec<EventPayload>, RouterError> {
        let now = Utc::now();
        let mut due: Vec<(DateTime<Utc>, EventPayload)> = self
            .state
            .schedule
            .iter()
            .filter_map(|entry| {
                let row = entry.value();
                let unclaimed_or_expired = row.claimed_at + self.state.claim_duration <= now;
                let is_due = row.due_after.is_none_or(|due_after| due_after <= now);
                (!row.closed && unclaimed_or_expired && is_due)
                    .then(|| (row.claimed_at, row.payload.clone()))
            })
            .collect();
        due.sort_by_key(|(claimed_at, _)| *claimed_at);
        Ok(due.into_iter().map(|(_, payload)| payload).collect())
    }

    async fn is_event_entry_closed(&self, event_id: Uuid) -> Result<bool, RouterError> {
        Ok(self
            .state
            .schedule
            .get(&event_id)
            .map(|entry| entry.value().closed)
            .unwrap_or(false))
    }

    async fn close_event_entry(&self, event_id: Uuid) -> Result<(), RouterError> {
        if let Some(entry) = self.state.schedule.get(&event_id) {
            let mut row = entry.value().clone();
            row.closed = true;
            self.state.schedule.insert(event_id, row);
        }
        Ok(())
    }
}
