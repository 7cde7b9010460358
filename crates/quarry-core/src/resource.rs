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

//! The three-phase contract between the resource cache and a payload
//! decoder.
//!
//! The cache itself is payload-agnostic: everything it knows about the
//! entries it manages goes through [`ResourceLoader`]. The three phases
//! split along the thread boundary — [`load`](ResourceLoader::load) runs on
//! a worker thread and may be arbitrarily slow, while
//! [`store`](ResourceLoader::store) and [`evict`](ResourceLoader::evict)
//! run on the cache's owning thread, where it is safe to touch
//! single-threaded engine state (GPU upload queues, handle tables, ...).

use std::error::Error;

/// Observable state of a cache entry, as returned by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Not resident; a load may be queued or in flight. Poll again.
    Miss,
    /// Resident; the entry counts against the cache budget.
    Hit,
    /// Loading or storing failed. Terminal until the entry is
    /// unregistered and registered anew.
    Error,
}

/// Loads, finalizes, and releases cached resources of payload type `T`.
///
/// Implementors own all payload-specific knowledge. The error type at this
/// seam is a boxed dynamic error so decoders can surface whatever failure
/// they hit; the cache logs it and pins the entry at
/// [`EntryStatus::Error`].
pub trait ResourceLoader<T>: Send + Sync + 'static {
    /// Performs the slow part of a load. Runs on a worker thread.
    ///
    /// Typically this reads and decodes bytes into staging state inside
    /// `T` (behind interior mutability), leaving finalization to
    /// [`store`](Self::store).
    fn load(&self, data: &T) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Finalizes a successful load into a resident resource. Runs on the
    /// owning thread.
    ///
    /// ## Returns
    /// The resident size of the resource in the cache's units (usually
    /// bytes); it is added to the cache total and drives eviction.
    fn store(&self, data: &T) -> Result<u64, Box<dyn Error + Send + Sync>>;

    /// Releases whatever [`store`](Self::store) created. Runs on the
    /// owning thread.
    ///
    /// Called exactly once per registered entry, including entries whose
    /// load or store never succeeded, so it must tolerate a `T` that holds
    /// no resource.
    fn evict(&self, data: &T);
}
