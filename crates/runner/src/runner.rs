// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Runner (`spec.md` §4.E), ported from `afk/runner.py`'s `Runner`:
//! dispatcher and reaper fibers cooperating over two unbounded channels.
//!
//! Workers run on `spawn_blocking` rather than in a separate OS process —
//! the spec's "separate address space preferred" is a preference, not a
//! requirement, and process-per-task isolation is a larger redesign this
//! port does not take on (see `DESIGN.md`). `graceful_kill` therefore
//! *aborts* the worker's `JoinHandle` rather than truly preempting it: a
//! worker mid-syscall keeps running on its OS thread until it returns, at
//! which point its result is discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use afk_core::{Clock, IdGen, LogContext, LogLevel, TaskError};
use afk_storage::{Location, Storage};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::error::RunnerError;
use crate::log_route::{FileLogSink, LogHandle, LogRoute};
use crate::task::Task;
use crate::task_instance::TaskInstance;

const DISPATCH_POLL_INTERVAL: Duration = Duration::from_millis(10);
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(50);
const ADMIN_TASK_TYPE: &str = "admin";

type MutexRegistration = (String, Box<dyn Location>);

struct LiveInstance {
    join: JoinHandle<i32>,
    task_type: String,
    ctx: LogContext,
}

/// Shared mutable state, cloned into the dispatcher and reaper fibers.
#[derive(Clone)]
struct Shared {
    storage: Arc<Storage>,
    host_id: Arc<str>,
    clock: Arc<dyn Clock>,
    mutex_tx: UnboundedSender<MutexRegistration>,
    live_mutexes: Arc<Mutex<HashMap<String, Box<dyn Location>>>>,
    live_instances: Arc<Mutex<HashMap<String, LiveInstance>>>,
    log_routes: Arc<Mutex<HashMap<String, LogRoute>>>,
    running: Arc<AtomicBool>,
    graceful_kill: Arc<AtomicBool>,
}

impl Shared {
    fn route_sender(&self, task_type: &str) -> Option<UnboundedSender<afk_core::LogRecord>> {
        self.log_routes.lock().get(task_type).map(|r| r.sender())
    }

    fn admin_handle(&self) -> Option<LogHandle> {
        let sender = self.route_sender(ADMIN_TASK_TYPE)?;
        let ctx = LogContext {
            host_id: self.host_id.to_string(),
            run_type: "system".to_string(),
            task_type: ADMIN_TASK_TYPE.to_string(),
            task_name: "runner".to_string(),
            uuid: "-".to_string(),
        };
        Some(LogHandle::new(ctx, self.clock.clone(), sender))
    }

    fn or_create_route(&self, task_type: &str) -> std::io::Result<UnboundedSender<afk_core::LogRecord>> {
        let mut routes = self.log_routes.lock();
        if !routes.contains_key(task_type) {
            let sink = FileLogSink::for_task_type(&self.storage, task_type)?;
            routes.insert(task_type.to_string(), LogRoute::spawn(Box::new(sink)));
        }
        Ok(routes.get(task_type).expect("just inserted").sender())
    }
}

/// The pending-submission queue, dispatcher/reaper pair, and per-task-type
/// log routes (`spec.md` §4.E). Holds only `Arc`/interior-mutable state, so
/// `start`/`shutdown`/`add_tasks` all take `&self` and it is typically
/// shared behind an `Arc<Runner>`.
pub struct Runner {
    id_gen: Arc<dyn IdGen>,
    host_id: Arc<str>,
    ready_tx: UnboundedSender<TaskInstance>,
    ready_rx: AsyncMutex<Option<UnboundedReceiver<TaskInstance>>>,
    mutex_rx: AsyncMutex<Option<UnboundedReceiver<MutexRegistration>>>,
    shared: Shared,
    fibers: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

impl Runner {
    pub fn new(
        storage: Arc<Storage>,
        host_id: impl Into<String>,
        id_gen: Arc<dyn IdGen>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let (mutex_tx, mutex_rx) = mpsc::unbounded_channel();
        let host_id: Arc<str> = Arc::from(host_id.into());
        Self {
            id_gen,
            host_id: host_id.clone(),
            ready_tx,
            ready_rx: AsyncMutex::new(Some(ready_rx)),
            mutex_rx: AsyncMutex::new(Some(mutex_rx)),
            shared: Shared {
                storage,
                host_id,
                clock,
                mutex_tx,
                live_mutexes: Arc::new(Mutex::new(HashMap::new())),
                live_instances: Arc::new(Mutex::new(HashMap::new())),
                log_routes: Arc::new(Mutex::new(HashMap::new())),
                running: Arc::new(AtomicBool::new(false)),
                graceful_kill: Arc::new(AtomicBool::new(false)),
            },
            fibers: Mutex::new(None),
        }
    }

    pub fn generate_task_instance(
        &self,
        task: Box<dyn Task>,
        task_type: impl Into<String>,
        run_type: impl Into<String>,
    ) -> TaskInstance {
        TaskInstance::for_task(task, task_type, run_type, self.id_gen.as_ref())
    }

    pub fn generate_callable_instance(
        &self,
        callable: Box<dyn FnOnce() -> Result<(), TaskError> + Send>,
        task_type: impl Into<String>,
        task_name: impl Into<String>,
        run_type: impl Into<String>,
    ) -> TaskInstance {
        TaskInstance::for_callable(callable, task_type, task_name, run_type, self.id_gen.as_ref())
    }

    pub fn add_tasks(&self, instances: impl IntoIterator<Item = TaskInstance>) {
        for instance in instances {
            // Only fails if every receiver (including the dispatcher fiber)
            // has been dropped, i.e. the Runner has already fully shut down.
            let _ = self.ready_tx.send(instance);
        }
    }

    /// Idempotent: a second call while fibers are already running is a no-op.
    pub fn start(&self) -> Result<(), RunnerError> {
        if self.fibers.lock().is_some() {
            return Ok(());
        }
        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.graceful_kill.store(false, Ordering::SeqCst);
        self.shared.or_create_route(ADMIN_TASK_TYPE)?;

        let ready_rx = self
            .ready_rx
            .try_lock()
            .expect("start is not called concurrently")
            .take()
            .expect("start already consumed ready_rx");
        let mutex_rx = self
            .mutex_rx
            .try_lock()
            .expect("start is not called concurrently")
            .take()
            .expect("start already consumed mutex_rx");

        let dispatcher = tokio::spawn(dispatcher_loop(self.shared.clone(), ready_rx));
        let reaper = tokio::spawn(reaper_loop(self.shared.clone(), mutex_rx));
        *self.fibers.lock() = Some((dispatcher, reaper));
        Ok(())
    }

    /// Clears `running` (and, if `force`, `graceful_kill`), waits for the
    /// dispatcher and reaper fibers to exit, then stops log-route consumers
    /// in reverse registration order — non-admin routes first, `admin` last,
    /// so the Runner's own shutdown messages still land on disk
    /// (`spec.md` §4.G).
    pub async fn shutdown(&self, force: bool) {
        self.shared.running.store(false, Ordering::SeqCst);
        if force {
            self.shared.graceful_kill.store(true, Ordering::SeqCst);
        }

        let fibers = self.fibers.lock().take();
        if let Some((dispatcher, reaper)) = fibers {
            let _ = dispatcher.await;
            let _ = reaper.await;
        }

        let mut routes = std::mem::take(&mut *self.shared.log_routes.lock());
        let admin = routes.remove(ADMIN_TASK_TYPE);
        for (_, route) in routes {
            route.shutdown().await;
        }
        if let Some(admin) = admin {
            admin.shutdown().await;
        }
    }
}

async fn dispatcher_loop(shared: Shared, mut ready_rx: UnboundedReceiver<TaskInstance>) {
    loop {
        match ready_rx.try_recv() {
            Ok(instance) => {
                if let Err(e) = dispatch_one(&shared, instance) {
                    if let Some(admin) = shared.admin_handle() {
                        admin.emit(LogLevel::Error, format!("dispatch failed: {e}"));
                    }
                }
            }
            Err(mpsc::error::TryRecvError::Empty) => {
                if !shared.running.load(Ordering::SeqCst) {
                    break;
                }
                sleep(DISPATCH_POLL_INTERVAL).await;
            }
            Err(mpsc::error::TryRecvError::Disconnected) => break,
        }
    }
}

fn dispatch_one(shared: &Shared, mut instance: TaskInstance) -> Result<(), RunnerError> {
    let sender = shared.or_create_route(&instance.task_type)?;
    let ctx = instance.log_context(&shared.host_id);
    let handle = LogHandle::new(ctx.clone(), shared.clock.clone(), sender);
    let is_bare = instance.is_bare_callable();
    let composite_key = instance.composite_key();
    let task_type = instance.task_type.clone();

    instance.attach_log(handle.clone());
    handle.emit(LogLevel::Info, "JOB_START");
    if is_bare {
        handle.emit(LogLevel::Info, "CONDITIONS_PASSED");
    }

    let join = instance.start(shared.storage.clone(), shared.mutex_tx.clone())?;
    shared.live_instances.lock().insert(
        composite_key,
        LiveInstance {
            join,
            task_type,
            ctx,
        },
    );
    Ok(())
}

async fn reaper_loop(shared: Shared, mut mutex_rx: UnboundedReceiver<MutexRegistration>) {
    loop {
        drain_mutex_registrations(&shared, &mut mutex_rx);
        reap_finished(&shared).await;
        if shared.graceful_kill.load(Ordering::SeqCst) {
            terminate_remaining(&shared).await;
        }

        if !shared.running.load(Ordering::SeqCst) && shared.live_instances.lock().is_empty() {
            break;
        }
        sleep(REAP_POLL_INTERVAL).await;
    }
}

fn drain_mutex_registrations(shared: &Shared, mutex_rx: &mut UnboundedReceiver<MutexRegistration>) {
    while let Ok((key, location)) = mutex_rx.try_recv() {
        let mut live_mutexes = shared.live_mutexes.lock();
        if live_mutexes.contains_key(&key) {
            // Fatal invariant violation (`spec.md` §4.E step 1): two
            // instances registered the same composite key. RunnerError's
            // own doc comment spells out the contract — this is expected to
            // crash the reaper and the process is restarted around it, not
            // swallowed.
            panic!("{}", RunnerError::DuplicateCompositeKey(key));
        }
        live_mutexes.insert(key, location);
    }
}

async fn reap_finished(shared: &Shared) {
    let finished: Vec<String> = {
        let live = shared.live_instances.lock();
        live.iter()
            .filter(|(_, v)| v.join.is_finished())
            .map(|(k, _)| k.clone())
            .collect()
    };

    for key in finished {
        let live = { shared.live_instances.lock().remove(&key) };
        let Some(live) = live else { continue };
        let result = live.join.await;
        let Some(sender) = shared.route_sender(&live.task_type) else {
            continue;
        };
        let handle = LogHandle::new(live.ctx, shared.clock.clone(), sender);

        match result {
            Ok(0) => {
                release_mutex(shared, &key);
                handle.emit(LogLevel::Info, "JOB_COMPLETED");
            }
            Ok(_) => {
                // Deliberate (`spec.md` §4.E step 2): the mutex is retained
                // on failure so operators can investigate before a re-run.
                handle.emit(LogLevel::Error, "JOB_FAILED");
            }
            Err(join_err) if join_err.is_cancelled() => {
                release_mutex(shared, &key);
                handle.emit(LogLevel::Warning, "JOB_TERMINATED");
            }
            Err(_) => {
                handle.emit(LogLevel::Error, "JOB_FAILED");
            }
        }
    }
}

async fn terminate_remaining(shared: &Shared) {
    let remaining: Vec<String> = { shared.live_instances.lock().keys().cloned().collect() };
    for key in remaining {
        let live = { shared.live_instances.lock().remove(&key) };
        let Some(live) = live else { continue };
        live.join.abort();
        let _ = live.join.await;
        if let Some(sender) = shared.route_sender(&live.task_type) {
            release_mutex(shared, &key);
            LogHandle::new(live.ctx, shared.clock.clone(), sender).emit(LogLevel::Warning, "JOB_TERMINATED");
        }
    }
}

fn release_mutex(shared: &Shared, key: &str) {
    if let Some(mutex_loc) = shared.live_mutexes.lock().remove(key) {
        let _ = mutex_loc.delete(true, false);
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
