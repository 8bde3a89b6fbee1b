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

//! Structured concurrency over [tokio::task::JoinSet].
//!
//! The source groups cooperative tasks with `anyio` task groups: cancelling
//! the group cancels every task spawned into it. [tokio::task::JoinSet]
//! gives the closest match in this runtime: dropping it aborts every
//! outstanding task.

use std::future::Future;
use tokio::task::JoinSet;

/// A named group of fire-and-forget tasks, logged to completion.
///
/// Errors returned by a spawned task are logged at `error` level and do not
/// propagate anywhere else; this mirrors the "re-raised to the spawning task
/// group for logging/supervision" behavior described for the router's retry
/// path, without a supervisor to re-raise to in a library.
pub struct TaskGroup {
    label: &'static str,
    tasks: JoinSet<()>,
}

impl TaskGroup {
    /// Create an empty group. `label` is used in log lines for spawned tasks.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            tasks: JoinSet::new(),
        }
    }

    /// Spawn `fut` into this group.
    pub fn spawn<F>(&mut self, fut: F)
    where
        F: Future<Output = Result<(), outbox_router_model::RouterError>> + Send + 'static,
    {
        let label = self.label;
        self.tasks.spawn(async move {
            if let Err(e) = fut.await {
                log::error!("task in group '{label}' failed: {e}");
            }
        });
    }

    /// Number of tasks still running or queued.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True if no tasks are running or queued.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every spawned task to finish.
    pub async fn join_all(&mut self) {
        while self.tasks.join_next().await.is_some() {}
    }

    /// Abort every outstanding task, cancelling the group immediately.
    pub fn shutdown(&mut self) {
        self.tasks.abort_all();
    }
}
