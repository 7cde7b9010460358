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

//! Error types for the resource cache.

use quarry_sched::QueueError;
use thiserror::Error;

/// Failures raised while constructing a
/// [`ResourceCache`](crate::ResourceCache).
///
/// Load and store failures are *not* errors at this level; they surface
/// as [`EntryStatus::Error`](quarry_core::EntryStatus::Error) on the
/// affected entry.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The private worker pool could not be started.
    #[error("failed to start load worker pool: {0}")]
    Queue(#[from] QueueError),
}
