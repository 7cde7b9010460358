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

//! The LRU resource cache.
//!
//! Entries live in an [`OrderedSeq`] kept in least-recently-used order
//! (front = coldest). Requests touch their entry to the back; trimming
//! walks from the front. Loads run on a private
//! [`WorkQueue`](quarry_sched::WorkQueue) whose task identities are the
//! entries' ids, so the queue's per-identity deduplication directly gives
//! the at-most-one-concurrent-load-per-entry guarantee.

use ahash::AHashMap;
use quarry_core::{
    EntryStatus, OrderedSeq, ResourceLoader, SeqToken, TaskId, TaskRunner, TaskStatus,
};
use quarry_sched::WorkQueue;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::{CacheError, CacheStats};

/// Stable identity of one registered cache entry.
///
/// Valid from [`ResourceCache::register`] until the entry is destroyed by
/// [`ResourceCache::unregister`], by trim eviction, or by cache teardown.
/// Using a handle past that point is a contract violation and panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheHandle {
    token: SeqToken,
}

#[derive(Debug)]
struct Entry<T> {
    id: TaskId,
    status: EntryStatus,
    /// Contribution to the cache total; 0 until stored.
    size: u64,
    priority: i32,
    data: Arc<T>,
}

/// Adapter running [`ResourceLoader::load`] on the queue's workers.
struct LoadRunner<T, L> {
    loader: Arc<L>,
    _payload: PhantomData<fn(&T)>,
}

impl<T, L> TaskRunner<Arc<T>> for LoadRunner<T, L>
where
    T: Send + Sync + 'static,
    L: ResourceLoader<T>,
{
    fn run(&self, worker: usize, task: TaskId, payload: &Arc<T>) -> bool {
        match self.loader.load(payload) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("load failed for {task} on worker {worker}: {e}");
                false
            }
        }
    }
}

/// A bounded LRU cache of asynchronously loaded resources.
///
/// The cache's own state is not synchronized: every method takes
/// `&mut self` and belongs to the owning thread. Only the private work
/// queue is shared with the load workers.
///
/// The caller keeps ownership of each entry's payload; the cache holds an
/// `Arc<T>` from [`register`](Self::register) until exactly one
/// [`evict`](ResourceLoader::evict) call releases the entry.
pub struct ResourceCache<T, L>
where
    T: Send + Sync + 'static,
    L: ResourceLoader<T>,
{
    /// LRU order, front = least recently used.
    lru: OrderedSeq<Entry<T>>,
    /// Task id to LRU token, for mapping purge results back to entries.
    index: AHashMap<TaskId, SeqToken>,
    total: u64,
    max: u64,
    next_id: u64,
    queue: WorkQueue<Arc<T>, LoadRunner<T, L>>,
    loader: Arc<L>,
    stats: CacheStats,
    closed: bool,
}

impl<T, L> ResourceCache<T, L>
where
    T: Send + Sync + 'static,
    L: ResourceLoader<T>,
{
    /// Creates an empty cache bounded at `max_size`, with `threads` load
    /// workers.
    ///
    /// ## Arguments
    /// * `max_size` - Budget for the summed sizes reported by
    ///   [`ResourceLoader::store`].
    /// * `threads` - Worker-pool size for the slow load phase.
    /// * `loader` - The payload-specific load/store/evict implementation.
    pub fn new(max_size: u64, threads: usize, loader: Arc<L>) -> Result<Self, CacheError> {
        let runner = LoadRunner {
            loader: Arc::clone(&loader),
            _payload: PhantomData,
        };
        let queue = WorkQueue::new(threads, runner)?;
        log::info!("resource cache ready: budget {max_size}, {threads} load worker(s)");
        Ok(Self {
            lru: OrderedSeq::new(),
            index: AHashMap::new(),
            total: 0,
            max: max_size,
            next_id: 0,
            queue,
            loader,
            stats: CacheStats::default(),
            closed: false,
        })
    }

    /// Registers a payload and returns its handle.
    ///
    /// The entry starts as a size-0 [`EntryStatus::Miss`] at the
    /// most-recently-used end; no load is queued until the first
    /// [`request`](Self::request).
    pub fn register(&mut self, data: Arc<T>, priority: i32) -> CacheHandle {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        let token = self.lru.push_back(Entry {
            id,
            status: EntryStatus::Miss,
            size: 0,
            priority,
            data,
        });
        self.index.insert(id, token);
        log::trace!("registered {id}");
        CacheHandle { token }
    }

    /// Destroys the entry behind `handle`.
    ///
    /// Cancels any outstanding load (blocking until the worker finishes
    /// if it is mid-flight), issues the entry's single eviction callback,
    /// and invalidates the handle.
    pub fn unregister(&mut self, handle: CacheHandle) {
        assert!(
            self.lru.contains(handle.token),
            "unregister on a stale cache handle"
        );
        self.evict_entry(handle.token);
    }

    /// Polls the entry behind `handle`, driving its load forward.
    ///
    /// Called repeatedly (typically once per frame) until it stops
    /// returning [`EntryStatus::Miss`]:
    /// - **Hit**: the entry is resident; it is touched to the
    ///   most-recently-used end.
    /// - **Miss**: the entry is touched (protecting it from eviction
    ///   while its load is outstanding) and the queue is driven. A
    ///   finished load is finalized on this thread via
    ///   [`ResourceLoader::store`]; success makes the entry resident and
    ///   trims the cache, failure pins it at Error.
    /// - **Error**: terminal; only [`unregister`](Self::unregister)
    ///   followed by a fresh [`register`](Self::register) retries.
    ///
    /// Never blocks.
    pub fn request(&mut self, handle: CacheHandle) -> EntryStatus {
        let token = handle.token;
        let (status, id, priority, data) = {
            let entry = self.lru.get(token).expect("request on a stale cache handle");
            (entry.status, entry.id, entry.priority, Arc::clone(&entry.data))
        };
        match status {
            EntryStatus::Hit => {
                self.lru.move_to_back(token);
                self.stats.hits += 1;
                EntryStatus::Hit
            }
            EntryStatus::Error => EntryStatus::Error,
            EntryStatus::Miss => {
                self.lru.move_to_back(token);
                match self.queue.run(id, priority, &data) {
                    TaskStatus::Pending => {
                        self.stats.misses += 1;
                        EntryStatus::Miss
                    }
                    TaskStatus::Complete => self.finalize(token, id, &data),
                    TaskStatus::Error => {
                        self.fail_entry(token);
                        EntryStatus::Error
                    }
                }
            }
        }
    }

    /// Updates the priority forwarded to the work queue on subsequent
    /// [`request`](Self::request) calls. A queued load is repositioned
    /// on the next request.
    pub fn set_priority(&mut self, handle: CacheHandle, priority: i32) {
        if let Some(entry) = self.lru.get_mut(handle.token) {
            entry.priority = priority;
        }
    }

    /// Discards in-flight loads for entries that have not been requested
    /// since the previous purge.
    ///
    /// Swept entries are demoted to the least-recently-used end — they
    /// stopped being asked for, so they become the first eviction
    /// candidates — but the entries themselves survive; only
    /// [`unregister`](Self::unregister), trimming, and teardown destroy
    /// entries.
    pub fn purge(&mut self) {
        let swept = self.queue.purge();
        self.stats.purges += 1;
        for purged in swept {
            if let Some(&token) = self.index.get(&purged.task) {
                self.lru.move_to_front(token);
                log::trace!("demoted {} after purge", purged.task);
            }
        }
    }

    /// Updates the size budget and immediately trims down to it.
    pub fn resize(&mut self, max_size: u64) {
        log::debug!("cache budget {} -> {max_size}", self.max);
        self.max = max_size;
        self.trim(None);
    }

    /// Tears the cache down: stops the worker pool (letting in-flight
    /// loads finish), flushes every queued task, then evicts every
    /// remaining entry in least-recently-used-first order.
    ///
    /// Also run by `Drop`. After `clear` the cache is inert; registering
    /// into a cleared cache is a contract violation.
    pub fn clear(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let flushed = self.queue.close();
        if !flushed.is_empty() {
            log::debug!("cache teardown flushed {} outstanding load(s)", flushed.len());
        }
        while let Some(front) = self.lru.front() {
            if let Some(entry) = self.lru.remove(front) {
                self.loader.evict(&entry.data);
                self.stats.evictions += 1;
            }
        }
        self.index.clear();
        self.total = 0;
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.lru.len()
    }

    /// `true` if no entries are registered.
    pub fn is_empty(&self) -> bool {
        self.lru.is_empty()
    }

    /// Summed size of all resident entries.
    pub fn total_size(&self) -> u64 {
        self.total
    }

    /// Current size budget.
    pub fn max_size(&self) -> u64 {
        self.max
    }

    /// Loads currently queued or executing on the worker pool.
    pub fn pending_loads(&self) -> usize {
        self.queue.pending()
    }

    /// Lifetime counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Status of the entry behind `handle` without touching it, or `None`
    /// for a stale handle.
    pub fn status(&self, handle: CacheHandle) -> Option<EntryStatus> {
        self.lru.get(handle.token).map(|entry| entry.status)
    }

    /// Handles of all entries, least recently used first.
    pub fn handles(&self) -> impl Iterator<Item = CacheHandle> + '_ {
        self.lru.iter().map(|(token, _)| CacheHandle { token })
    }

    /// Finalizes a finished load on the owning thread.
    fn finalize(&mut self, token: SeqToken, id: TaskId, data: &Arc<T>) -> EntryStatus {
        match self.loader.store(data) {
            Ok(size) => {
                if let Some(entry) = self.lru.get_mut(token) {
                    entry.status = EntryStatus::Hit;
                    entry.size = size;
                }
                self.total += size;
                self.stats.completed_loads += 1;
                log::debug!("stored {id} ({size}), total {}/{}", self.total, self.max);
                self.trim(Some(token));
                EntryStatus::Hit
            }
            Err(e) => {
                log::warn!("store failed for {id}: {e}");
                self.fail_entry(token);
                EntryStatus::Error
            }
        }
    }

    fn fail_entry(&mut self, token: SeqToken) {
        if let Some(entry) = self.lru.get_mut(token) {
            entry.status = EntryStatus::Error;
            entry.size = 0;
        }
        self.stats.failed_loads += 1;
    }

    /// Evicts from the cold end until the total fits the budget.
    ///
    /// The entry that triggered the trim is never evicted, no matter its
    /// size; since a touch moved it to the back, hitting it means every
    /// other entry is already gone.
    fn trim(&mut self, just_touched: Option<SeqToken>) {
        while self.total > self.max {
            let Some(front) = self.lru.front() else {
                break;
            };
            if Some(front) == just_touched {
                break;
            }
            self.evict_entry(front);
        }
    }

    /// Destroys one entry: cancel its load if any, evict, unlink.
    fn evict_entry(&mut self, token: SeqToken) {
        let id = match self.lru.get(token) {
            Some(entry) => entry.id,
            None => return,
        };
        // Blocks until the worker finishes if the load is mid-flight.
        let _ = self.queue.cancel(id);
        if let Some(entry) = self.lru.remove(token) {
            self.index.remove(&entry.id);
            self.loader.evict(&entry.data);
            self.total -= entry.size;
            self.stats.evictions += 1;
            log::debug!("evicted {id} ({}), total {}/{}", entry.size, self.total, self.max);
        }
    }
}

impl<T, L> Drop for ResourceCache<T, L>
where
    T: Send + Sync + 'static,
    L: ResourceLoader<T>,
{
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{unbounded, Receiver, Sender};
    use std::collections::HashSet;
    use std::error::Error;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    struct Blob {
        id: u32,
        bytes: u64,
    }

    struct TestLoader {
        fail_load: Mutex<HashSet<u32>>,
        fail_store: Mutex<HashSet<u32>>,
        gated: Mutex<HashSet<u32>>,
        started_tx: Sender<u32>,
        release_rx: Receiver<()>,
        loaded: Mutex<Vec<u32>>,
        evicted: Mutex<Vec<u32>>,
    }

    impl ResourceLoader<Blob> for TestLoader {
        fn load(&self, data: &Blob) -> Result<(), Box<dyn Error + Send + Sync>> {
            let _ = self.started_tx.send(data.id);
            if self.gated.lock().unwrap().contains(&data.id) {
                let _ = self.release_rx.recv();
            }
            self.loaded.lock().unwrap().push(data.id);
            if self.fail_load.lock().unwrap().contains(&data.id) {
                return Err("decode failed".into());
            }
            Ok(())
        }

        fn store(&self, data: &Blob) -> Result<u64, Box<dyn Error + Send + Sync>> {
            if self.fail_store.lock().unwrap().contains(&data.id) {
                return Err("upload failed".into());
            }
            Ok(data.bytes)
        }

        fn evict(&self, data: &Blob) {
            self.evicted.lock().unwrap().push(data.id);
        }
    }

    struct Harness {
        loader: Arc<TestLoader>,
        started: Receiver<u32>,
        release: Sender<()>,
    }

    fn harness() -> Harness {
        let (started_tx, started) = unbounded();
        let (release, release_rx) = unbounded();
        Harness {
            loader: Arc::new(TestLoader {
                fail_load: Mutex::new(HashSet::new()),
                fail_store: Mutex::new(HashSet::new()),
                gated: Mutex::new(HashSet::new()),
                started_tx,
                release_rx,
                loaded: Mutex::new(Vec::new()),
                evicted: Mutex::new(Vec::new()),
            }),
            started,
            release,
        }
    }

    fn cache(max: u64, threads: usize, h: &Harness) -> ResourceCache<Blob, TestLoader> {
        ResourceCache::new(max, threads, Arc::clone(&h.loader)).unwrap()
    }

    fn blob(id: u32, bytes: u64) -> Arc<Blob> {
        Arc::new(Blob { id, bytes })
    }

    /// Polls until the entry leaves Miss.
    fn settle(cache: &mut ResourceCache<Blob, TestLoader>, handle: CacheHandle) -> EntryStatus {
        for _ in 0..2000 {
            let status = cache.request(handle);
            if status != EntryStatus::Miss {
                return status;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("entry never settled");
    }

    #[test]
    fn test_three_entries_fill_budget() {
        let h = harness();
        let mut cache = cache(3, 2, &h);

        let handles: Vec<_> = (1..=3).map(|i| cache.register(blob(i, 1), 0)).collect();
        for &handle in &handles {
            assert_eq!(settle(&mut cache, handle), EntryStatus::Hit);
        }
        for &handle in &handles {
            assert_eq!(cache.request(handle), EntryStatus::Hit);
        }
        assert_eq!(cache.total_size(), 3);
        assert_eq!(cache.len(), 3);
        assert!(h.loader.evicted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_overflow_evicts_least_recently_touched() {
        let h = harness();
        let mut cache = cache(3, 2, &h);

        let handles: Vec<_> = (1..=3).map(|i| cache.register(blob(i, 1), 0)).collect();
        for &handle in &handles {
            assert_eq!(settle(&mut cache, handle), EntryStatus::Hit);
        }

        let fourth = cache.register(blob(4, 1), 0);
        assert_eq!(settle(&mut cache, fourth), EntryStatus::Hit);

        assert!(cache.total_size() <= 3);
        // Entry 1 was the least recently touched.
        assert_eq!(h.loader.evicted.lock().unwrap().clone(), vec![1]);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_load_failure_is_terminal_until_reregister() {
        let h = harness();
        h.loader.fail_load.lock().unwrap().insert(9);
        let mut cache = cache(10, 1, &h);

        let handle = cache.register(blob(9, 1), 0);
        assert_eq!(settle(&mut cache, handle), EntryStatus::Error);
        for _ in 0..4 {
            assert_eq!(cache.request(handle), EntryStatus::Error);
        }
        // One execution, no retry.
        assert_eq!(h.loader.loaded.lock().unwrap().len(), 1);
        assert_eq!(cache.total_size(), 0);

        // The only retry path is unregister + fresh register.
        cache.unregister(handle);
        assert_eq!(h.loader.evicted.lock().unwrap().clone(), vec![9]);
        h.loader.fail_load.lock().unwrap().remove(&9);
        let handle = cache.register(blob(9, 1), 0);
        assert_eq!(settle(&mut cache, handle), EntryStatus::Hit);
    }

    #[test]
    fn test_store_failure_is_terminal() {
        let h = harness();
        h.loader.fail_store.lock().unwrap().insert(5);
        let mut cache = cache(10, 1, &h);

        let handle = cache.register(blob(5, 4), 0);
        assert_eq!(settle(&mut cache, handle), EntryStatus::Error);
        assert_eq!(cache.request(handle), EntryStatus::Error);
        assert_eq!(cache.total_size(), 0);
        assert_eq!(cache.stats().failed_loads, 1);
    }

    #[test]
    fn test_trim_never_evicts_the_trigger() {
        let h = harness();
        let mut cache = cache(3, 1, &h);

        let a = cache.register(blob(1, 1), 0);
        let b = cache.register(blob(2, 1), 0);
        assert_eq!(settle(&mut cache, a), EntryStatus::Hit);
        assert_eq!(settle(&mut cache, b), EntryStatus::Hit);

        // Oversized entry: everything else goes, but never the trigger.
        let big = cache.register(blob(3, 10), 0);
        assert_eq!(settle(&mut cache, big), EntryStatus::Hit);

        assert_eq!(cache.status(big), Some(EntryStatus::Hit));
        assert_eq!(cache.total_size(), 10);
        assert_eq!(h.loader.evicted.lock().unwrap().clone(), vec![1, 2]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_unregister_blocks_on_inflight_load_and_evicts_once() {
        let h = harness();
        h.loader.gated.lock().unwrap().insert(7);
        let mut cache = cache(10, 1, &h);

        let handle = cache.register(blob(7, 1), 0);
        assert_eq!(cache.request(handle), EntryStatus::Miss);
        assert_eq!(h.started.recv_timeout(Duration::from_secs(5)), Ok(7));

        let release = h.release.clone();
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            release.send(()).unwrap();
        });

        // Blocks until the gated load finishes, then evicts.
        cache.unregister(handle);
        releaser.join().unwrap();

        assert_eq!(h.loader.loaded.lock().unwrap().clone(), vec![7]);
        assert_eq!(h.loader.evicted.lock().unwrap().clone(), vec![7]);
        assert!(cache.is_empty());
        assert_eq!(cache.total_size(), 0);
    }

    #[test]
    fn test_purge_demotes_stale_entries_to_cold_end() {
        let h = harness();
        h.loader.gated.lock().unwrap().insert(1);
        let mut cache = cache(10, 1, &h);

        let gated = cache.register(blob(1, 1), 0);
        let stale = cache.register(blob(2, 1), 0);

        // The gated load occupies the only worker; the second load stays
        // queued.
        assert_eq!(cache.request(gated), EntryStatus::Miss);
        assert_eq!(h.started.recv_timeout(Duration::from_secs(5)), Ok(1));
        assert_eq!(cache.request(stale), EntryStatus::Miss);

        let order: Vec<_> = cache.handles().collect();
        assert_eq!(order, vec![gated, stale]);

        // Two purges with no intervening requests sweep the queued load;
        // its entry drops to the cold end without being destroyed.
        cache.purge();
        cache.purge();

        let order: Vec<_> = cache.handles().collect();
        assert_eq!(order, vec![stale, gated]);
        assert_eq!(cache.status(stale), Some(EntryStatus::Miss));
        assert_eq!(cache.len(), 2);
        // The swept load never ran.
        assert_eq!(h.loader.loaded.lock().unwrap().clone(), Vec::<u32>::new());

        h.release.send(()).unwrap();
        cache.clear();
        // Teardown still evicts both entries exactly once.
        let mut evicted = h.loader.evicted.lock().unwrap().clone();
        evicted.sort_unstable();
        assert_eq!(evicted, vec![1, 2]);
    }

    #[test]
    fn test_resize_trims_immediately() {
        let h = harness();
        let mut cache = cache(10, 2, &h);

        let handles: Vec<_> = (1..=3).map(|i| cache.register(blob(i, 1), 0)).collect();
        for &handle in &handles {
            assert_eq!(settle(&mut cache, handle), EntryStatus::Hit);
        }
        assert_eq!(cache.total_size(), 3);

        cache.resize(2);
        assert_eq!(cache.total_size(), 2);
        assert_eq!(h.loader.evicted.lock().unwrap().clone(), vec![1]);
        assert_eq!(cache.max_size(), 2);
    }

    #[test]
    fn test_clear_evicts_lru_first() {
        let h = harness();
        let mut cache = cache(10, 2, &h);

        let a = cache.register(blob(1, 1), 0);
        let b = cache.register(blob(2, 1), 0);
        let c = cache.register(blob(3, 1), 0);
        for &handle in &[a, b, c] {
            assert_eq!(settle(&mut cache, handle), EntryStatus::Hit);
        }
        // Touch b so the LRU order becomes a, c, b.
        assert_eq!(cache.request(b), EntryStatus::Hit);

        cache.clear();
        assert_eq!(h.loader.evicted.lock().unwrap().clone(), vec![1, 3, 2]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_register_evict_balance() {
        let h = harness();
        let mut cache = cache(2, 2, &h);

        let mut registered = Vec::new();
        let h1 = cache.register(blob(1, 1), 0);
        let h2 = cache.register(blob(2, 1), 0);
        let h3 = cache.register(blob(3, 1), 0);
        let _h4 = cache.register(blob(4, 1), 0); // never requested
        h.loader.fail_load.lock().unwrap().insert(3);
        registered.extend([1, 2, 3, 4]);

        assert_eq!(settle(&mut cache, h1), EntryStatus::Hit);
        assert_eq!(settle(&mut cache, h2), EntryStatus::Hit);
        assert_eq!(settle(&mut cache, h3), EntryStatus::Error);
        cache.unregister(h2);

        cache.clear();

        let mut evicted = h.loader.evicted.lock().unwrap().clone();
        evicted.sort_unstable();
        assert_eq!(evicted, registered);
    }

    #[test]
    fn test_stats_accounting() {
        let h = harness();
        let mut cache = cache(10, 1, &h);

        let handle = cache.register(blob(1, 2), 0);
        assert_eq!(settle(&mut cache, handle), EntryStatus::Hit);
        assert_eq!(cache.request(handle), EntryStatus::Hit);
        assert_eq!(cache.request(handle), EntryStatus::Hit);
        cache.purge();

        let stats = cache.stats();
        assert_eq!(stats.completed_loads, 1);
        assert_eq!(stats.hits, 2);
        assert!(stats.misses >= 1);
        assert_eq!(stats.purges, 1);
        assert_eq!(stats.failed_loads, 0);

        cache.unregister(handle);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_set_priority_applies_to_next_request() {
        let h = harness();
        let mut cache = cache(10, 1, &h);

        let handle = cache.register(blob(1, 1), 3);
        cache.set_priority(handle, 8);
        assert_eq!(settle(&mut cache, handle), EntryStatus::Hit);
    }
}
