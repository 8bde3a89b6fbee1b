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

//! Scoped transactional token tied to a backing store.

use crate::error::RouterError;
use async_trait::async_trait;
use std::future::Future;

/// A scoped, single-use transaction over a store.
///
/// A `WorkUnit` is created already open. It is driven to a terminal state by
/// [run_scoped]: normal completion of the scoped body commits it, an
/// explicit [WorkUnit::rollback] call or an `Err` returned from the body
/// rolls it back. Every write issued through the same store within the scope
/// must be atomic with respect to external observers.
#[async_trait]
pub trait WorkUnit: Send + Sync {
    /// Commit the work performed in this scope. Only called when the scope
    /// exits normally and [WorkUnit::rolled_back] is false.
    async fn commit(&mut self) -> Result<(), RouterError>;

    /// Signal that this work unit must not be committed. Idempotent.
    fn rollback(&mut self);

    /// Whether [WorkUnit::rollback] was called during this scope.
    fn rolled_back(&self) -> bool;

    /// Whether [WorkUnit::commit] has completed successfully.
    fn committed(&self) -> bool;
}

/// Drive `unit` through `body`, committing on normal, non-rolled-back
/// completion and rolling back on rollback or error.
///
/// This collapses the "async scoped resource per outcome" pattern of the
/// source implementation into a single explicit function, per the REDESIGN
/// FLAGS guidance: normal return commits, `unit.rollback()` inside `body`
/// aborts, and a returned `Err` aborts and propagates.
pub async fn run_scoped<U, F, Fut, T>(mut unit: U, body: F) -> Result<T, RouterError>
where
    U: WorkUnit,
    F: FnOnce(&mut U) -> Fut,
    Fut: Future<Output = Result<T, RouterError>>,
{
    match body(&mut unit).await {
        Ok(value) => {
            if !unit.rolled_back() {
                unit.commit().await?;
            }
            Ok(value)
        }
        Err(e) => {
            unit.rollback();
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RouterErrorKind;

    #[derive(Default)]
    struct RecordingWorkUnit {
        committed: bool,
        rolled_back: bool,
    }

    #[async_trait]
    impl WorkUnit for RecordingWorkUnit {
        async fn commit(&mut self) -> Result<(), RouterError> {
            self.committed = true;
            Ok(())
        }

        fn rollback(&mut self) {
            self.rolled_back = true;
        }

        fn rolled_back(&self) -> bool {
            self.rolled_back
        }

        fn committed(&self) -> bool {
            self.committed
        }
    }

    #[tokio::test]
    async fn normal_return_commits() {
        let unit = RecordingWorkUnit::default();
        let committed = std::sync::Arc::new(std::sync::Mutex::new(false));
        let committed_clone = committed.clone();
        run_scoped(unit, move |u| async move {
            u.commit().await?;
            *committed_clone.lock().unwrap() = u.committed();
            Ok::<_, RouterError>(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn explicit_rollback_prevents_commit() {
        let unit = RecordingWorkUnit::default();
        run_scoped(unit, |u| async {
            u.rollback();
            Ok::<_, RouterError>(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn error_rolls_back_and_propagates() {
        let unit = RecordingWorkUnit::default();
        let result = run_scoped(unit, |_u| async {
            Err::<(), _>(RouterErrorKind::HandlerFailure.error())
        })
        .await;
        assert!(result.is_err());
    }
}
