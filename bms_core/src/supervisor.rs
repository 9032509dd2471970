//! Engine thread supervision.
//!
//! The supervisor owns a factory that builds a fresh `Engine` from persisted
//! configuration, runs it on a dedicated thread and watches its liveness
//! counter. When the counter passes the watchdog bound the hung engine is told
//! to stop and abandoned (its thread may be stuck in a hardware call), and a
//! new engine is started on the same status board and request queue.
//!
//! Shutdown: Each `Worker` is joined when the supervisor stops; a thread that
//! does not finish within the grace period is detached.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::Timing;
use crate::engine::Engine;
use crate::error::{BmsError, Result};
use crate::shared::{EngineHandle, EngineLink};
use crate::util::watchdog_bound;

/// How long a stopping engine thread gets to finish its cycle.
const JOIN_GRACE: Duration = Duration::from_secs(2);

struct Worker {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl Worker {
    /// Ask the engine to stop and forget about its thread.
    fn abandon(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        drop(self.join.take());
    }

    fn shutdown(mut self, grace: Duration) {
        self.stop.store(true, Ordering::Relaxed);
        let Some(handle) = self.join.take() else {
            return;
        };
        let deadline = Instant::now() + grace;
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        if !handle.is_finished() {
            tracing::warn!("engine thread did not stop in time; detaching");
            return;
        }
        match handle.join() {
            Ok(()) => tracing::trace!("engine thread joined"),
            Err(e) => tracing::warn!(?e, "engine thread panicked during shutdown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorStats {
    /// Control cycles completed while supervised.
    pub cycles: u64,
    pub restarts: u32,
}

pub struct Supervisor<F> {
    factory: Arc<F>,
    link: EngineLink,
    watchdog: Duration,
    bound: u32,
    restarts: Arc<AtomicU32>,
}

impl<F> core::fmt::Debug for Supervisor<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Supervisor")
            .field("watchdog", &self.watchdog)
            .field("bound", &self.bound)
            .field("restarts", &self.restarts.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<F> Supervisor<F>
where
    F: Fn(EngineLink) -> Result<Engine> + Send + Sync + 'static,
{
    /// `factory` is called on the engine thread, once per (re)start, with
    /// the shared link the engine must be built on.
    pub fn new(link: EngineLink, timing: &Timing, factory: F) -> Self {
        Self {
            factory: Arc::new(factory),
            link,
            watchdog: Duration::from_millis(timing.watchdog_ms.max(1)),
            bound: watchdog_bound(timing.monitor_ms, timing.watchdog_ms),
            restarts: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn handle(&self) -> EngineHandle {
        self.link.handle()
    }

    /// Engine restarts forced by the watchdog so far.
    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::Relaxed)
    }

    fn spawn(&self) -> Result<Worker> {
        let stop = Arc::new(AtomicBool::new(false));
        let factory = Arc::clone(&self.factory);
        let link = self.link.clone();
        let thread_stop = Arc::clone(&stop);
        let join = std::thread::Builder::new()
            .name("bms-engine".into())
            .spawn(move || {
                let result = factory(link).and_then(|mut engine| engine.run(&thread_stop));
                if let Err(e) = result {
                    tracing::warn!(error = %e, "engine exited with error");
                }
            })
            .map_err(|e| eyre::Report::new(BmsError::Io(e.to_string())))?;
        Ok(Worker {
            stop,
            join: Some(join),
        })
    }

    /// Run the engine under the watchdog until `stop` is raised or, when
    /// given, `max_cycles` further control cycles have completed.
    pub fn run_until(&self, stop: &AtomicBool, max_cycles: Option<u64>) -> Result<SupervisorStats> {
        let handle = self.handle();
        let start_cycles = handle.cycles();
        let liveness = self.link.liveness();
        liveness.pet();
        let mut worker = self.spawn()?;
        tracing::info!(bound = self.bound, watchdog_ms = self.watchdog.as_millis() as u64, "engine supervised");

        loop {
            std::thread::sleep(self.watchdog);
            let done = handle.cycles().saturating_sub(start_cycles);
            if stop.load(Ordering::Relaxed) || max_cycles.is_some_and(|max| done >= max) {
                break;
            }
            if liveness.tick() > self.bound {
                let restarts = self.restarts.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(restarts, "engine watchdog expired; restarting engine");
                worker.abandon();
                liveness.pet();
                worker = self.spawn()?;
            }
        }

        worker.shutdown(JOIN_GRACE);
        let stats = SupervisorStats {
            cycles: handle.cycles().saturating_sub(start_cycles),
            restarts: self.restarts(),
        };
        tracing::info!(cycles = stats.cycles, restarts = stats.restarts, "supervisor stopped");
        Ok(stats)
    }
}
