// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Task identity, status, and the contract between a work queue and the
//! code it executes.

use std::fmt;

/// An opaque, comparable identity for one unit of background work.
///
/// The producer chooses the value; the queue only compares and hashes it.
/// Resubmitting the same id before the previous submission was collected
/// continues the existing submission instead of starting a second one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(
    /// The raw identity value.
    pub u64,
);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Observable state of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Queued or currently executing; poll again later.
    Pending,
    /// Finished and the runner reported success.
    Complete,
    /// Finished and the runner reported failure.
    Error,
}

impl TaskStatus {
    /// `true` for [`TaskStatus::Complete`] and [`TaskStatus::Error`].
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

/// Executes tasks on behalf of a work queue.
///
/// One runner instance is shared by every worker thread of a queue, hence
/// the `Send + Sync` bound. `P` is the per-task payload the producer
/// attached at submission; the queue hands it back here so the runner
/// never needs its own id-to-payload bookkeeping.
pub trait TaskRunner<P>: Send + Sync + 'static {
    /// Runs one task to completion on a worker thread.
    ///
    /// ## Arguments
    /// * `worker` - Index of the worker thread executing the task.
    /// * `task` - The identity the producer submitted.
    /// * `payload` - The payload attached to that submission.
    ///
    /// ## Returns
    /// `true` on success (the task becomes [`TaskStatus::Complete`]),
    /// `false` on failure ([`TaskStatus::Error`]). The queue carries the
    /// outcome verbatim; it never retries.
    fn run(&self, worker: usize, task: TaskId, payload: &P) -> bool;
}
