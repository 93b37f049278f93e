// SPDX-License-Identifier: GPL-3.0-only
//! Deferred work items on the tokio runtime
//!
//! A [`Work`] is single-flight and coalescing: scheduling it while it is
//! already queued does nothing, scheduling it while it runs queues exactly one
//! more run. [`DelayedWork`] adds a re-armable timer in front of a `Work`.
//!
//! Scheduling never blocks and works from any thread, so it can be called from
//! the interrupt-side producer.

use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type WorkFn = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Default)]
struct WorkState {
    queued: bool,
    running: bool,
}

struct WorkInner {
    name: &'static str,
    state: Mutex<WorkState>,
    /// Signalled whenever the runner goes idle
    idle: Notify,
    func: WorkFn,
}

/// Coalescing deferred work item
pub struct Work {
    runtime: Handle,
    inner: Arc<WorkInner>,
}

impl Work {
    pub fn new<F, Fut>(name: &'static str, runtime: Handle, func: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            runtime,
            inner: Arc::new(WorkInner {
                name,
                state: Mutex::new(WorkState::default()),
                idle: Notify::new(),
                func: Box::new(move || -> BoxFuture<'static, ()> { Box::pin(func()) }),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Queue a run. Returns false if one was already queued.
    pub fn schedule(&self) -> bool {
        let spawn = {
            let mut state = self.inner.state.lock();
            if state.queued {
                return false;
            }
            state.queued = true;
            let spawn = !state.running;
            state.running = true;
            spawn
        };

        if spawn {
            let inner = Arc::clone(&self.inner);
            self.runtime.spawn(run(inner));
        }
        true
    }

    pub fn is_pending(&self) -> bool {
        self.inner.state.lock().queued
    }

    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock();
        !state.queued && !state.running
    }

    /// Drop a queued run and wait for an in-flight one to finish
    pub async fn cancel(&self) {
        self.inner.state.lock().queued = false;
        self.wait_idle().await;
    }

    /// Wait until nothing is queued or running
    pub async fn flush(&self) {
        self.wait_idle().await;
    }

    async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.inner.idle.notified());
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

async fn run(inner: Arc<WorkInner>) {
    loop {
        {
            let mut state = inner.state.lock();
            if !state.queued {
                state.running = false;
                break;
            }
            state.queued = false;
        }

        trace!("running {} work", inner.name);
        (inner.func)().await;
    }
    inner.idle.notify_waiters();
}

/// [`Work`] behind a timer that can be re-armed
pub struct DelayedWork {
    work: Arc<Work>,
    timer: Mutex<Timer>,
}

#[derive(Default)]
struct Timer {
    armed_until: Option<Instant>,
    handle: Option<JoinHandle<()>>,
}

impl DelayedWork {
    pub fn new(work: Work) -> Self {
        Self {
            work: Arc::new(work),
            timer: Mutex::new(Timer::default()),
        }
    }

    /// Arm the timer to fire `delay` from now, replacing any pending deadline
    pub fn schedule_in(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        let mut timer = self.timer.lock();

        if let Some(old) = timer.handle.take() {
            old.abort();
        }

        let work = Arc::clone(&self.work);
        timer.armed_until = Some(deadline);
        timer.handle = Some(self.work.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            work.schedule();
        }));
        debug!("{} work armed for {:?}", self.work.name(), delay);
    }

    /// Deadline of the pending timer, if one is armed and has not fired
    pub fn armed_until(&self) -> Option<Instant> {
        let timer = self.timer.lock();
        match &timer.handle {
            Some(handle) if !handle.is_finished() => timer.armed_until,
            _ => None,
        }
    }

    /// Disarm the timer, drop a queued run and wait for an in-flight one
    pub async fn cancel(&self) {
        {
            let mut timer = self.timer.lock();
            timer.armed_until = None;
            if let Some(handle) = timer.handle.take() {
                handle.abort();
            }
        }
        self.work.cancel().await;
    }

    pub async fn flush(&self) {
        self.work.flush().await;
    }

    pub fn is_idle(&self) -> bool {
        self.work.is_idle()
    }
}
