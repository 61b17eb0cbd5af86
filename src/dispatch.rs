//! Main-thread dispatcher.
//!
//! Any thread may enqueue work. Only the thread that constructed the
//! dispatcher drains it, once per host tick. The queue and the execution
//! context handle live behind a single guard; a drain holds that guard for
//! its whole pass, so producers block until the pass finishes.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::host::Engine;
use crate::model::{CleanupReport, ContextHandle, Dispatch, DrainReport, ItemOutcome, WorkItem};
use crate::spawn;
use crate::telemetry::dispatch::{
    record_drain_totals, record_item_status, start_drain_span, start_item_span,
};
use crate::telemetry::metrics;

#[derive(Debug, Default)]
struct DispatcherState {
    queue: VecDeque<WorkItem>,
    context: Option<ContextHandle>,
}

/// The main-thread work queue.
///
/// Constructed by the host on its main thread and shared as
/// `Arc<Dispatcher>` with producers and with the per-tick driver.
pub struct Dispatcher {
    engine: Arc<dyn Engine>,
    state: Mutex<DispatcherState>,
    /// Items enqueued by a work item while the main thread is draining.
    /// Spliced onto `state.queue` after every item of the drain.
    reentrant: Mutex<VecDeque<WorkItem>>,
    pending: AtomicUsize,
    main_thread: ThreadId,
    draining: AtomicBool,
    teardown_requested: AtomicBool,
}

impl Dispatcher {
    /// Create a dispatcher bound to the calling thread.
    ///
    /// No execution context is created until the first enqueue.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            state: Mutex::new(DispatcherState::default()),
            reentrant: Mutex::new(VecDeque::new()),
            pending: AtomicUsize::new(0),
            main_thread: thread::current().id(),
            draining: AtomicBool::new(false),
            teardown_requested: AtomicBool::new(false),
        }
    }

    /// Number of items waiting for the next drain. Never blocks.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// The live execution context, if one has been created.
    ///
    /// Takes the guard, so it blocks while a drain is running. From inside a
    /// work item it reports `None` instead of deadlocking.
    pub fn context(&self) -> Option<ContextHandle> {
        if self.is_draining_thread() {
            return None;
        }
        self.lock_state().context
    }

    pub fn is_main_thread(&self) -> bool {
        thread::current().id() == self.main_thread
    }

    /// Queue a work item for the main thread. Fire-and-forget.
    ///
    /// Creates the execution context on first use. If the host cannot
    /// provide one, the item runs right here on the calling thread instead
    /// of being dropped.
    pub fn enqueue(&self, item: impl Into<WorkItem>) -> Dispatch {
        let item = item.into();
        let kind = item.kind();

        if self.is_draining_thread() {
            lock(&self.reentrant).push_back(item);
            self.pending.fetch_add(1, Ordering::AcqRel);
            metrics::items_enqueued().add(1, &[KeyValue::new("kind", kind)]);
            debug!(kind, "work item enqueued from inside a drain");
            return Dispatch::Queued;
        }

        let mut state = self.lock_state();
        if state.context.is_none() {
            match self.create_context() {
                Ok(handle) => {
                    info!(context = %handle, "execution context created");
                    state.context = Some(handle);
                }
                Err(e) => {
                    drop(state);
                    error!(error = %e, kind, "dispatcher creation failed, running work item inline");
                    metrics::inline_fallbacks().add(1, &[KeyValue::new("kind", kind)]);
                    return Dispatch::Inline(self.run_item(item, "inline"));
                }
            }
        }

        state.queue.push_back(item);
        self.pending.fetch_add(1, Ordering::AcqRel);
        metrics::items_enqueued().add(1, &[KeyValue::new("kind", kind)]);
        Dispatch::Queued
    }

    /// Run every queued item in FIFO order.
    ///
    /// Must be called from the main thread. Item failures are logged and
    /// collected in the report; they never stop the pass.
    pub fn drain(&self) -> Result<DrainReport> {
        if !self.is_main_thread() {
            warn!("drain called off the main thread, ignoring");
            return Err(Error::NotMainThread);
        }
        if self.draining.load(Ordering::Acquire) {
            warn!("drain called from inside a work item, ignoring");
            return Ok(DrainReport::new());
        }

        let started = Instant::now();
        let span = start_drain_span(self.pending());
        let _enter = span.enter();
        let mut report = DrainReport::new();

        let mut state = self.lock_state();
        self.draining.store(true, Ordering::Release);

        loop {
            self.splice_reentrant(&mut state);
            let Some(item) = state.queue.pop_front() else {
                break;
            };
            self.pending.fetch_sub(1, Ordering::AcqRel);
            report.record(self.run_item(item, "queued"));

            if self.teardown_requested.swap(false, Ordering::AcqRel) {
                let cleanup = self.teardown(&mut state);
                info!(discarded = cleanup.discarded, "deferred cleanup applied");
            }
        }

        self.draining.store(false, Ordering::Release);
        drop(state);

        record_drain_totals(&span, report.executed, report.failed);
        metrics::drain_duration_ms().record(started.elapsed().as_secs_f64() * 1000.0, &[]);
        if !report.is_empty() {
            debug!(
                executed = report.executed,
                failed = report.failed,
                "drain complete"
            );
        }
        Ok(report)
    }

    /// Per-frame hook for the host. Drains and never fails.
    pub fn tick(&self) -> Option<DrainReport> {
        match self.drain() {
            Ok(report) => {
                if report.failed > 0 {
                    warn!(
                        failed = report.failed,
                        executed = report.executed,
                        "tick finished with failed work items"
                    );
                }
                Some(report)
            }
            Err(e) => {
                error!(error = %e, "tick skipped");
                None
            }
        }
    }

    /// Discard pending work and release the execution context. Idempotent.
    ///
    /// Called from inside a work item, already-queued work is discarded
    /// and the context is released once that item returns. The report has
    /// `deferred` set. Work the item enqueues after the call still runs in
    /// the same drain, on a freshly created context.
    pub fn cleanup(&self) -> CleanupReport {
        info!("dispatcher cleanup requested");

        if self.is_draining_thread() {
            // Work parked before this request goes now. Anything the item
            // enqueues afterwards survives the deferred teardown.
            let discarded = lock(&self.reentrant).drain(..).count();
            self.discard(discarded);
            self.teardown_requested.store(true, Ordering::Release);
            return CleanupReport {
                discarded,
                deferred: true,
                ..CleanupReport::default()
            };
        }

        let mut state = self.lock_state();
        let report = self.teardown(&mut state);
        info!(
            discarded = report.discarded,
            released = report.released.is_some(),
            success = report.is_success(),
            "dispatcher cleanup finished"
        );
        report
    }

    /// Clear the main queue and release the context through a held guard.
    ///
    /// The re-entrant side queue is left alone: outside a drain it is empty,
    /// and inside one it only holds work enqueued after the cleanup request.
    fn teardown(&self, state: &mut DispatcherState) -> CleanupReport {
        let discarded = state.queue.len();
        state.queue.clear();
        self.discard(discarded);

        let mut report = CleanupReport {
            discarded,
            ..CleanupReport::default()
        };

        if let Some(handle) = state.context.take() {
            match self.release_context(handle) {
                Ok(()) => {
                    debug!(context = %handle, "execution context released");
                    report.released = Some(handle);
                }
                Err(e) => {
                    error!(context = %handle, error = %e, "failed to release execution context");
                    report.failure = Some(e.to_string());
                }
            }
        }

        report
    }

    fn discard(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.pending.fetch_sub(count, Ordering::AcqRel);
        info!(discarded = count, "cleared pending work items");
        metrics::items_discarded().add(count as u64, &[]);
    }

    fn release_context(&self, handle: ContextHandle) -> Result<()> {
        let engine = &self.engine;
        panic::catch_unwind(AssertUnwindSafe(|| engine.destroy_context(handle)))
            .unwrap_or_else(|payload| Err(Error::Teardown(panic_message(&*payload))))
    }

    fn create_context(&self) -> Result<ContextHandle> {
        let engine = &self.engine;
        panic::catch_unwind(AssertUnwindSafe(|| engine.create_context()))
            .unwrap_or_else(|payload| Err(Error::ContextUnavailable(panic_message(&*payload))))
    }

    fn run_item(&self, item: WorkItem, mode: &str) -> ItemOutcome {
        let kind = item.kind();
        let span = start_item_span(kind, mode);
        let _enter = span.enter();

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.execute(item)))
            .unwrap_or_else(|payload| Err(Error::Panicked(panic_message(&*payload))));

        match &result {
            Ok(_) => {
                record_item_status(&span, "ok");
                metrics::items_executed().add(1, &[KeyValue::new("kind", kind)]);
            }
            Err(e) => {
                record_item_status(&span, e.kind());
                error!(kind, error = %e, "work item failed");
                metrics::items_failed().add(
                    1,
                    &[KeyValue::new("kind", kind), KeyValue::new("error", e.kind())],
                );
            }
        }

        ItemOutcome::from_result(result)
    }

    fn execute(&self, item: WorkItem) -> Result<ItemOutcome> {
        match item {
            WorkItem::Spawn(command) => spawn::execute(self.engine.as_ref(), &command),
            WorkItem::Task(task) => task.run().map(|()| ItemOutcome::Completed),
        }
    }

    fn splice_reentrant(&self, state: &mut DispatcherState) {
        let mut parked = lock(&self.reentrant);
        if parked.is_empty() {
            return;
        }
        state.queue.extend(parked.drain(..));
        drop(parked);

        // A deferred cleanup may have released the context mid-drain.
        if state.context.is_none() {
            match self.create_context() {
                Ok(handle) => {
                    info!(context = %handle, "execution context re-created during drain");
                    state.context = Some(handle);
                }
                Err(e) => {
                    warn!(error = %e, "no execution context, running re-entrant work in this drain anyway");
                }
            }
        }
    }

    fn is_draining_thread(&self) -> bool {
        self.draining.load(Ordering::Acquire) && self.is_main_thread()
    }

    fn lock_state(&self) -> MutexGuard<'_, DispatcherState> {
        lock(&self.state)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        let handle = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .context
            .take();
        if let Some(handle) = handle {
            if let Err(e) = self.release_context(handle) {
                warn!(context = %handle, error = %e, "failed to release execution context on drop");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryEngine;

    fn panics_with_str() {
        panic!("boom");
    }

    fn panics_with_string() {
        panic!("{} {}", "formatted", 1);
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let caught = panic::catch_unwind(panics_with_str).unwrap_err();
        assert_eq!(panic_message(&*caught), "boom");

        let caught = panic::catch_unwind(panics_with_string).unwrap_err();
        assert_eq!(panic_message(&*caught), "formatted 1");
    }

    #[test]
    fn pending_tracks_enqueue_and_drain() {
        let dispatcher = Dispatcher::new(Arc::new(MemoryEngine::new()));
        dispatcher.enqueue(WorkItem::task(|| Ok(())));
        dispatcher.enqueue(WorkItem::task(|| Ok(())));
        assert_eq!(dispatcher.pending(), 2);

        dispatcher.drain().unwrap();
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn drop_releases_the_context() {
        let engine = Arc::new(MemoryEngine::new());
        let dispatcher = Dispatcher::new(engine.clone());
        dispatcher.enqueue(WorkItem::task(|| Ok(())));
        assert!(engine.live_context().is_some());

        drop(dispatcher);
        assert!(engine.live_context().is_none());
    }
}
