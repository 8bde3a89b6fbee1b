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

//! The per-guarantee ordering of handler invocation, completion recording
//! and acknowledgement.
//!
//! The source models each guarantee as its own async scoped resource. Per
//! the redesign notes this crate instead uses one dispatcher function keyed
//! by the [Guarantee] tag: simpler, and the three orderings are sufficiently
//! different that a single `match` reads more plainly than three contexts.

use crate::message::Message;
use crate::store::Store;
use outbox_router_model::EventPayload;
use outbox_router_model::Guarantee;
use outbox_router_model::RouterError;
use outbox_router_model::work_unit::run_scoped;
use std::future::Future;

/// Run `body` under `guarantee`'s ordering of record-completion / acknowledge
/// / handler invocation, against `store` and `message`.
///
/// `body` performs the caller-supplied handler logic and is given a second
/// chance to participate in the `EXACTLY_ONCE` work unit via its argument.
pub async fn run_guarded<S, M, F, Fut>(
    store: &S,
    message: &M,
    payload: &EventPayload,
    guarantee: Guarantee,
    body: F,
) -> Result<(), RouterError>
where
    S: Store,
    M: Message + ?Sized,
    F: FnOnce(Option<&mut S::Unit>) -> Fut,
    Fut: Future<Output = Result<(), RouterError>>,
{
    match guarantee {
        Guarantee::AtLeastOnce => {
            body(None).await?;
            store
                .record_completion_with_guarantee(payload, guarantee, None)
                .await?;
            message.acknowledge().await;
            Ok(())
        }
        Guarantee::ExactlyOnce => {
            let unit = store.create_work_unit().await?;
            let result = run_scoped(unit, |u| async {
                body(Some(u)).await?;
                store
                    .record_completion_with_guarantee(payload, guarantee, Some(u))
                    .await
            })
            .await;
            match result {
                Ok(()) => {
                    message.acknowledge().await;
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        Guarantee::NoMoreThanOnce => {
            store
                .record_completion_with_guarantee(payload, guarantee, None)
                .await?;
            message.acknowledge().await;
            body(None).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use outbox_router_testkit::InMemoryMessage;
    use outbox_router_testkit::InMemoryStore;
    use serde_json::Map;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
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
    async fn at_least_once_runs_body_before_recording_and_acking() {
        let store = InMemoryStore::new(std::time::Duration::from_secs(60));
        let payload = sample_payload();
        let message = InMemoryMessage::new(payload.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        run_guarded(&store, &message, &payload, Guarantee::AtLeastOnce, |_u| async move {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(message.is_acknowledged());
        assert!(store.is_dispatch_forbidden(payload.id).await.unwrap());
    }

    #[tokio::test]
    async fn at_least_once_failure_leaves_unhandled_and_unacked() {
        let store = InMemoryStore::new(std::time::Duration::from_secs(60));
        let payload = sample_payload();
        let message = InMemoryMessage::new(payload.clone());
        let err = run_guarded(&store, &message, &payload, Guarantee::AtLeastOnce, |_u| async {
            Err(outbox_router_model::RouterErrorKind::HandlerFailure.error())
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err.kind(),
            outbox_router_model::RouterErrorKind::HandlerFailure
        ));
        assert!(!message.is_acknowledged());
        assert!(!store.is_dispatch_forbidden(payload.id).await.unwrap());
    }

    #[tokio::test]
    async fn no_more_than_once_acks_before_body_and_tolerates_body_failure() {
        let store = InMemoryStore::new(std::time::Duration::from_secs(60));
        let payload = sample_payload();
        let message = InMemoryMessage::new(payload.clone());
        let err = run_guarded(&store, &message, &payload, Guarantee::NoMoreThanOnce, |_u| async {
            Err(outbox_router_model::RouterErrorKind::HandlerFailure.error())
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err.kind(),
            outbox_router_model::RouterErrorKind::HandlerFailure
        ));
        // Body failing does not undo the completion record or the ack: this
        // is the guarantee's "failure does not re-deliver" contract.
        assert!(message.is_acknowledged());
        assert!(store.is_dispatch_forbidden(payload.id).await.unwrap());
    }

    #[tokio::test]
    async fn exactly_once_failure_rolls_back_and_suppresses_ack() {
        let store = InMemoryStore::new(std::time::Duration::from_secs(60));
        let payload = sample_payload();
        let message = InMemoryMessage::new(payload.clone());
        let err = run_guarded(&store, &message, &payload, Guarantee::ExactlyOnce, |_u| async {
            Err(outbox_router_model::RouterErrorKind::HandlerFailure.error())
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err.kind(),
            outbox_router_model::RouterErrorKind::HandlerFailure
        ));
        assert!(!message.is_acknowledged());
        assert!(!store.is_dispatch_forbidden(payload.id).await.unwrap());
    }
}
