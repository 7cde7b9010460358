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

//! # Quarry Core
//!
//! Foundational crate containing the containers, core types, and interface
//! contracts shared by the scheduler and the resource cache.
//!
//! This crate defines the "common language" of the workspace: the
//! handle-stable [`seq::OrderedSeq`] container both higher-level crates use
//! for their internal ordering, the [`task`] identifiers and contracts
//! consumed by the work queue, and the [`resource`] contracts consumed by
//! the cache. It has no knowledge of threads, eviction policy, or any
//! concrete payload type.

#![warn(missing_docs)]

pub mod resource;
pub mod seq;
pub mod task;

pub use resource::{EntryStatus, ResourceLoader};
pub use seq::{OrderedSeq, SeqToken};
pub use task::{TaskId, TaskRunner, TaskStatus};
