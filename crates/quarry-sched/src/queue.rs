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

//! The worker-pool task queue.
//!
//! One mutex guards all queue state; two condition variables signal
//! "pending work available" (to idle workers) and "an active task
//! finished" (to a blocked [`WorkQueue::cancel`]). Every live task has
//! exactly one [`TaskNode`] in the id-indexed map; pending dispatch order
//! lives in an [`OrderedSeq`] so reprioritization is an O(1) reposition.

use ahash::AHashMap;
use quarry_core::{OrderedSeq, SeqToken, TaskId, TaskRunner, TaskStatus};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::QueueError;

/// A task removed by [`WorkQueue::purge`] or [`WorkQueue::close`].
///
/// `status` is [`TaskStatus::Pending`] if the task never ran, otherwise
/// the terminal status its execution produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgedTask {
    /// Identity of the swept task.
    pub task: TaskId,
    /// Status at the moment it was swept.
    pub status: TaskStatus,
}

/// Where a task node currently sits.
#[derive(Debug, Clone, Copy)]
enum TaskState {
    /// Waiting for a worker; `seq` is its slot in the dispatch order.
    Pending { seq: SeqToken },
    /// A worker is executing it right now.
    Active,
    /// Finished; waiting to be collected by `run` (or swept).
    Complete { status: TaskStatus },
}

#[derive(Debug)]
struct TaskNode<P> {
    state: TaskState,
    priority: i32,
    /// Generation of the last `run` call for this identity.
    touched: u64,
    /// Set on an active node that went stale during a purge: its result
    /// must never reach `run` and is swept by the next purge regardless
    /// of generation.
    discard: bool,
    payload: P,
}

struct QueueState<P> {
    tasks: AHashMap<TaskId, TaskNode<P>>,
    /// Pending dispatch order, front = next to run. Highest priority
    /// first, FIFO among equals.
    order: OrderedSeq<TaskId>,
    /// Monotonic purge generation.
    generation: u64,
    /// Number of tasks currently executing on workers.
    active: usize,
    stopping: bool,
}

impl<P> QueueState<P> {
    fn new() -> Self {
        Self {
            tasks: AHashMap::new(),
            order: OrderedSeq::new(),
            generation: 0,
            active: 0,
            stopping: false,
        }
    }

    /// Inserts `task` into the dispatch order at its priority position:
    /// after the last queued task whose priority is greater than or equal
    /// to `priority`, which keeps equal priorities FIFO.
    ///
    /// The task's node need not be in the map yet; only *other* pending
    /// nodes are consulted.
    fn insert_pending(&mut self, task: TaskId, priority: i32) -> SeqToken {
        let mut anchor = None;
        for (token, id) in self.order.iter_rev() {
            let queued = self
                .tasks
                .get(id)
                .map(|node| node.priority)
                .unwrap_or(i32::MIN);
            if queued >= priority {
                anchor = Some(token);
                break;
            }
        }
        let token = self.order.push_back(task);
        match anchor {
            Some(anchor) => self.order.move_after(token, anchor),
            None => self.order.move_to_front(token),
        };
        token
    }
}

struct Shared<P, R> {
    state: Mutex<QueueState<P>>,
    /// Signals idle workers that the dispatch order is non-empty (or that
    /// the queue is stopping).
    work: Condvar,
    /// Signals `cancel` waiters that an active task finished.
    done: Condvar,
    runner: R,
}

/// A fixed pool of worker threads executing identity-deduplicated tasks.
///
/// Producers drive the queue with a single non-blocking call,
/// [`run`](Self::run), which submits, polls, reprioritizes, and collects
/// depending on the task's current state. At most one node exists per
/// [`TaskId`], so at most one execution per identity is ever in flight.
///
/// `P` is the payload cloned out to the worker for each execution
/// (typically an `Arc` around the producer's data); `R` executes tasks on
/// the workers.
pub struct WorkQueue<P, R> {
    shared: Arc<Shared<P, R>>,
    workers: Vec<JoinHandle<()>>,
}

impl<P, R> WorkQueue<P, R>
where
    P: Clone + Send + 'static,
    R: TaskRunner<P>,
{
    /// Spawns `threads` worker threads around `runner`.
    ///
    /// Fails with [`QueueError::NoWorkers`] for an empty pool and
    /// [`QueueError::Spawn`] if the OS refuses a thread; in the latter
    /// case every already-spawned worker is stopped and joined first, so
    /// no partial pool outlives the error.
    pub fn new(threads: usize, runner: R) -> Result<Self, QueueError> {
        if threads == 0 {
            return Err(QueueError::NoWorkers);
        }
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::new()),
            work: Condvar::new(),
            done: Condvar::new(),
            runner,
        });
        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("quarry-worker-{index}"))
                .spawn(move || worker_loop(worker_shared, index));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    shared.state.lock().unwrap().stopping = true;
                    shared.work.notify_all();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(QueueError::Spawn(e));
                }
            }
        }
        log::debug!("work queue started with {threads} worker thread(s)");
        Ok(Self { shared, workers })
    }

    /// Submits, polls, or collects the task identified by `task`.
    ///
    /// This is the queue's sole deduplication point:
    /// - a finished task is removed and its terminal status returned —
    ///   a one-time collection; the identity is free for resubmission
    ///   afterwards;
    /// - an executing task is touched (protecting it from an in-flight
    ///   purge) and reported [`TaskStatus::Pending`];
    /// - a queued task is touched, repositioned if `priority` changed,
    ///   and reported Pending;
    /// - an unknown identity becomes a fresh pending node carrying a
    ///   clone of `payload`, and one idle worker is woken.
    ///
    /// A finished task whose result was condemned by a purge mid-flight
    /// is never handed out: the stale result is dropped and the call is
    /// treated as a fresh submission.
    ///
    /// Never blocks.
    pub fn run(&self, task: TaskId, priority: i32, payload: &P) -> TaskStatus {
        let mut state = self.shared.state.lock().unwrap();
        let generation = state.generation;

        let Some(node) = state.tasks.get_mut(&task) else {
            let seq = state.insert_pending(task, priority);
            state.tasks.insert(
                task,
                TaskNode {
                    state: TaskState::Pending { seq },
                    priority,
                    touched: generation,
                    discard: false,
                    payload: payload.clone(),
                },
            );
            self.shared.work.notify_one();
            log::trace!("submitted {task} at priority {priority}");
            return TaskStatus::Pending;
        };

        match node.state {
            TaskState::Complete { status } => {
                if !node.discard {
                    state.tasks.remove(&task);
                    log::trace!("collected {task}: {status:?}");
                    return status;
                }
                // The previous execution was condemned while in flight.
                // Reclaim the identity with a fresh submission.
                node.priority = priority;
                node.touched = generation;
                node.discard = false;
                node.payload = payload.clone();
                let seq = state.insert_pending(task, priority);
                if let Some(node) = state.tasks.get_mut(&task) {
                    node.state = TaskState::Pending { seq };
                }
                self.shared.work.notify_one();
                log::trace!("resubmitted {task} after discarded result");
                TaskStatus::Pending
            }
            TaskState::Active => {
                node.touched = generation;
                TaskStatus::Pending
            }
            TaskState::Pending { seq } => {
                node.touched = generation;
                if node.priority != priority {
                    node.priority = priority;
                    state.order.remove(seq);
                    let seq = state.insert_pending(task, priority);
                    if let Some(node) = state.tasks.get_mut(&task) {
                        node.state = TaskState::Pending { seq };
                    }
                    log::trace!("repositioned {task} to priority {priority}");
                }
                TaskStatus::Pending
            }
        }
    }

    /// Removes the task identified by `task` from the queue.
    ///
    /// A pending task is removed immediately and never runs
    /// (returns `Some(Pending)`). An active task blocks the caller until
    /// its execution finishes, then returns its terminal status. An
    /// unknown identity (never submitted, or already collected) returns
    /// `None`.
    pub fn cancel(&self, task: TaskId) -> Option<TaskStatus> {
        let mut state = self.shared.state.lock().unwrap();
        loop {
            let node = state.tasks.get(&task)?;
            match node.state {
                TaskState::Pending { seq } => {
                    state.order.remove(seq);
                    state.tasks.remove(&task);
                    log::trace!("cancelled pending {task}");
                    return Some(TaskStatus::Pending);
                }
                TaskState::Active => {
                    state = self.shared.done.wait(state).unwrap();
                }
                TaskState::Complete { status } => {
                    state.tasks.remove(&task);
                    log::trace!("cancelled finished {task}: {status:?}");
                    return Some(status);
                }
            }
        }
    }

    /// Sweeps out every task not touched by [`run`](Self::run) since the
    /// previous purge, returning the swept set.
    ///
    /// Two-generation mark and sweep: a task must be touched in every
    /// purge interval to survive. Stale pending tasks are removed before
    /// they ever run; stale finished tasks are removed along with their
    /// results; a stale *active* task cannot be interrupted, so it is
    /// condemned instead — its result is withheld from `run` and swept by
    /// the next purge regardless of generation.
    pub fn purge(&self) -> Vec<PurgedTask> {
        let mut state = self.shared.state.lock().unwrap();
        state.generation += 1;
        let generation = state.generation;

        let ids: Vec<TaskId> = state.tasks.keys().copied().collect();
        let mut swept = Vec::new();
        for task in ids {
            let Some(node) = state.tasks.get(&task) else {
                continue;
            };
            let (node_state, stale, discard) =
                (node.state, node.touched + 1 < generation, node.discard);
            match node_state {
                TaskState::Pending { seq } if stale => {
                    state.order.remove(seq);
                    state.tasks.remove(&task);
                    swept.push(PurgedTask {
                        task,
                        status: TaskStatus::Pending,
                    });
                }
                TaskState::Complete { status } if stale || discard => {
                    state.tasks.remove(&task);
                    swept.push(PurgedTask { task, status });
                }
                TaskState::Active if stale => {
                    if let Some(node) = state.tasks.get_mut(&task) {
                        node.discard = true;
                    }
                }
                _ => {}
            }
        }
        if !swept.is_empty() {
            log::debug!("purge generation {generation} swept {} task(s)", swept.len());
        }
        swept
    }

    /// Number of tasks currently queued or executing.
    pub fn pending(&self) -> usize {
        let state = self.shared.state.lock().unwrap();
        state.order.len() + state.active
    }

    /// Stops the pool and flushes every remaining task.
    ///
    /// Workers exit after their current task (if any) completes; queued
    /// tasks are not dispatched. Once every worker has been joined, all
    /// remaining nodes are swept and returned, pending ones with
    /// [`TaskStatus::Pending`] and finished ones with their terminal
    /// status. Nothing is dropped silently.
    ///
    /// Idempotent. `Drop` stops and joins the workers too, but only
    /// `close` reports the flushed tasks.
    pub fn close(&mut self) -> Vec<PurgedTask> {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.stopping = true;
        }
        self.shared.work.notify_all();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::warn!("worker thread panicked during shutdown");
            }
        }

        let mut state = self.shared.state.lock().unwrap();
        let ids: Vec<TaskId> = state.tasks.keys().copied().collect();
        let mut swept = Vec::with_capacity(ids.len());
        for task in ids {
            if let Some(node) = state.tasks.remove(&task) {
                let status = match node.state {
                    TaskState::Pending { seq } => {
                        state.order.remove(seq);
                        TaskStatus::Pending
                    }
                    // Workers are joined; nothing can still be active.
                    TaskState::Active => TaskStatus::Pending,
                    TaskState::Complete { status } => status,
                };
                swept.push(PurgedTask { task, status });
            }
        }
        state.active = 0;
        if !swept.is_empty() {
            log::debug!("work queue closed, flushed {} task(s)", swept.len());
        }
        swept
    }
}

impl<P, R> Drop for WorkQueue<P, R> {
    fn drop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        {
            let mut state = self.shared.state.lock().unwrap();
            state.stopping = true;
        }
        self.shared.work.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop<P, R>(shared: Arc<Shared<P, R>>, worker: usize)
where
    P: Clone + Send + 'static,
    R: TaskRunner<P>,
{
    let mut state = shared.state.lock().unwrap();
    loop {
        while !state.stopping && state.order.is_empty() {
            state = shared.work.wait(state).unwrap();
        }
        if state.stopping {
            break;
        }

        let front = state.order.front().expect("dispatch order is non-empty");
        let task = *state.order.get(front).expect("front token is live");
        state.order.remove(front);
        let payload = {
            let node = state.tasks.get_mut(&task).expect("queued task has a node");
            node.state = TaskState::Active;
            node.payload.clone()
        };
        state.active += 1;
        drop(state);

        log::trace!("worker {worker} running {task}");
        let ok = shared.runner.run(worker, task, &payload);

        state = shared.state.lock().unwrap();
        state.active -= 1;
        if let Some(node) = state.tasks.get_mut(&task) {
            node.state = TaskState::Complete {
                status: if ok {
                    TaskStatus::Complete
                } else {
                    TaskStatus::Error
                },
            };
        }
        shared.done.notify_all();
    }
    log::trace!("worker {worker} stopped");
}
