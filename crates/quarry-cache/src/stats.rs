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

//! Plain-counter cache statistics.
//!
//! The cache is single-owner, so these are ordinary integers rather than
//! atomics; read them through
//! [`ResourceCache::stats`](crate::ResourceCache::stats).

/// Lifetime counters for one [`ResourceCache`](crate::ResourceCache).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests answered from a resident entry.
    pub hits: u64,
    /// Requests that found the entry not yet resident.
    pub misses: u64,
    /// Loads finalized into resident entries.
    pub completed_loads: u64,
    /// Loads or stores that failed, pinning their entry at Error.
    pub failed_loads: u64,
    /// Eviction callbacks issued (trim, unregister, and teardown alike).
    pub evictions: u64,
    /// Purge passes forwarded to the work queue.
    pub purges: u64,
}
