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

//! Error types for the scheduler.

use thiserror::Error;

/// Failures raised while constructing a [`WorkQueue`](crate::WorkQueue).
///
/// Construction is all-or-nothing: on failure every worker that was
/// already spawned is stopped and joined before the error is returned.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue was asked for a pool of zero workers.
    #[error("work queue requires at least one worker thread")]
    NoWorkers,

    /// The operating system refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
