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

//! The persistence capability the router needs: inbox (Integrity Guard) and
//! outbox (Event Schedule) bundled behind one interface.
//!
//! The source splits these into two abstract base classes sharing a generic
//! `WorkUnit` type parameter. Per the redesign notes this crate prefers one
//! cohesive capability-set interface over a deep abstract hierarchy, since in
//! every real deployment inbox and outbox share the same transactional store.

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use outbox_router_model::EventPayload;
use outbox_router_model::Guarantee;
use outbox_router_model::RouterError;
use outbox_router_model::WorkUnit;
use uuid::Uuid;

/// Inbox + outbox persistence, scoped over a single [WorkUnit] implementation.
///
/// Implementors back both the *Dispatched*/*Handled* integrity log and the
/// claimed-entry event schedule with whatever storage engine they choose;
/// the router only depends on this trait.
#[async_trait]
pub trait Store: Send + Sync {
    /// The scoped transaction type this store hands out.
    type Unit: WorkUnit;

    /// Open a new scoped transaction over this store.
    async fn create_work_unit(&self) -> Result<Self::Unit, RouterError>;

    /// True iff `event_id` is already present in the *Handled* log.
    async fn is_dispatch_forbidden(&self, event_id: Uuid) -> Result<bool, RouterError>;

    /// Upsert an attempt counter for `payload.id` in the *Dispatched* log.
    async fn record_dispatch_attempt(&self, payload: &EventPayload) -> Result<(), RouterError>;

    /// Insert `payload.id` into the *Handled* log under `guarantee`.
    ///
    /// Fails with [outbox_router_model::RouterErrorKind::DuplicateCompletion]
    /// if the id is already present. When `unit` is provided, the write must
    /// participate in that transaction rather than auto-committing; this is
    /// how `EXACTLY_ONCE` shares a transaction with the handler's own writes.
    async fn record_completion_with_guarantee(
        &self,
        payload: &EventPayload,
        guarantee: Guarantee,
        unit: Option<&mut Self::Unit>,
    ) -> Result<(), RouterError>;

    /// Insert a claimed, open entry for `payload`, idempotent on `payload.id`.
    ///
    /// When `unit` is provided, the write participates in that transaction so
    /// it can be made atomic with a co-located business write.
    async fn add_claimed_event_entry(
        &self,
        payload: &EventPayload,
        due_after: Option<DateTime<Utc>>,
        unit: Option<&mut Self::Unit>,
    ) -> Result<(), RouterError>;

    /// True if an entry for `event_id` exists and its claim has not expired.
    async fn is_event_entry_claimed(&self, event_id: Uuid) -> Result<bool, RouterError>;

    /// Every open entry that is unclaimed (or claim-expired) and due now,
    /// ordered by `claimed_at` ascending.
    async fn every_open_unclaimed_event_entry_due_now(
        &self,
    ) -> Result<Vec<EventPayload>, RouterError>;

    /// True if the entry for `event_id` has been closed.
    async fn is_event_entry_closed(&self, event_id: Uuid) -> Result<bool, RouterError>;

    /// Close the entry for `event_id`. Idempotent.
    async fn close_event_entry(&self, event_id: Uuid) -> Result<(), RouterError>;
}
