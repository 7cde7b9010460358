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

//! # Quarry Sched
//!
//! A fixed-pool worker-thread scheduler with identity-deduplicated,
//! cancellable, reprioritizable, and purgeable task scheduling.
//!
//! The central type is [`WorkQueue`]. Producers submit tasks by
//! [`TaskId`](quarry_core::TaskId) and poll for completion with the same
//! non-blocking call; at most one submission per identity is ever live, so
//! at most one execution per identity is ever in flight. A generational
//! [`purge`](WorkQueue::purge) sweeps out tasks the producer has stopped
//! asking about, which is how the resource cache above this crate discards
//! loads for entries that fell out of the working set.

#![warn(missing_docs)]

mod error;
mod queue;

pub use error::QueueError;
pub use queue::{PurgedTask, WorkQueue};
