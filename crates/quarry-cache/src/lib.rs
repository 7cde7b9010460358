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

//! # Quarry Cache
//!
//! A bounded-capacity resource cache that loads entries asynchronously on
//! a background worker pool and reconciles results on a single owning
//! thread (typically a render or main loop).
//!
//! [`ResourceCache`] is deliberately a single-threaded facade over a
//! multi-threaded engine: every method takes `&mut self` and must be
//! called from the owning thread, while the slow
//! [`load`](quarry_core::ResourceLoader::load) phase of each entry runs on
//! the workers of a private [`WorkQueue`](quarry_sched::WorkQueue).
//! Finalization ([`store`](quarry_core::ResourceLoader::store)) and
//! release ([`evict`](quarry_core::ResourceLoader::evict)) always happen
//! on the owning thread.

#![warn(missing_docs)]

mod cache;
mod error;
mod stats;

pub use cache::{CacheHandle, ResourceCache};
pub use error::CacheError;
pub use stats::CacheStats;
