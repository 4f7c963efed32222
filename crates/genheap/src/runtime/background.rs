//! Background Collection Coordinator
//!
//! Gen2 marking can run on a dedicated worker thread while mutators keep
//! running. The worker is driven by messages:
//!
//! ```text
//! mutator ──Start/Pause/Resume/Shutdown──► worker
//! mutator ◄──Started/Paused/Resumed/Completed── worker
//! ```
//!
//! The worker marks in bounded quanta. Each quantum takes the heap lock, so
//! mutators interleave between quanta; the write barrier records stores into
//! already-marked objects for re-scanning. When the mark stack drains, the
//! worker runs the short stop-the-world completion (root re-scan, dirty-set
//! drain, segregation and compaction) and reports `Completed`.

use crate::error::{GcError, Result};
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;
use std::thread::JoinHandle;

/// Message to the background worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundCommand {
    /// Begin marking cycle `epoch`
    Start(u64),
    /// Stop running quanta until resumed
    Pause,
    /// Continue after a pause
    Resume,
    /// Stop the worker thread
    Shutdown,
}

/// Progress report from the background worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundEvent {
    /// Marking cycle started
    Started { epoch: u64 },
    /// Marking paused
    Paused { epoch: u64 },
    /// Marking resumed
    Resumed { epoch: u64 },
    /// Cycle finished, on the worker or by a mutator
    Completed { epoch: u64 },
}

/// Result of one marking quantum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkProgress {
    /// Grey objects remain
    Working,
    /// Marking drained and the cycle was completed
    Completed,
    /// The cycle is gone, finished synchronously by a mutator
    Abandoned,
}

/// Work the background thread performs on the heap
pub(crate) trait MarkingTarget: Send + Sync + 'static {
    /// Run one bounded marking quantum of cycle `epoch`
    fn mark_quantum(&self, epoch: u64) -> MarkProgress;
}

/// BackgroundCoordinator - owns the background marking thread
pub struct BackgroundCoordinator {
    commands: Sender<BackgroundCommand>,
    events_tx: Sender<BackgroundEvent>,
    events: Receiver<BackgroundEvent>,
    quanta: std::sync::Arc<AtomicU64>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundCoordinator {
    /// Spawn the worker thread for `target`
    pub(crate) fn spawn<T: MarkingTarget>(target: Weak<T>) -> Result<Self> {
        let (commands, command_rx) = channel::unbounded();
        let (events_tx, events) = channel::unbounded();
        let quanta = std::sync::Arc::new(AtomicU64::new(0));

        let worker_events = events_tx.clone();
        let worker_quanta = quanta.clone();
        let handle = std::thread::Builder::new()
            .name("genheap-background".to_string())
            .spawn(move || worker_loop(target, command_rx, worker_events, worker_quanta))
            .map_err(|e| GcError::Thread(format!("failed to spawn background marker: {}", e)))?;

        Ok(Self {
            commands,
            events_tx,
            events,
            quanta,
            thread_handle: Mutex::new(Some(handle)),
        })
    }

    /// Send a command; false if the worker has stopped
    pub fn send(&self, command: BackgroundCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Start marking cycle `epoch`
    pub fn start(&self, epoch: u64) -> bool {
        self.send(BackgroundCommand::Start(epoch))
    }

    /// Pause marking
    pub fn pause(&self) -> bool {
        self.send(BackgroundCommand::Pause)
    }

    /// Resume marking
    pub fn resume(&self) -> bool {
        self.send(BackgroundCommand::Resume)
    }

    /// Report an event on behalf of a mutator
    pub(crate) fn notify(&self, event: BackgroundEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Events reported since the last call
    pub fn events(&self) -> Vec<BackgroundEvent> {
        self.events.try_iter().collect()
    }

    /// Quanta run so far
    pub fn quanta(&self) -> u64 {
        self.quanta.load(Ordering::Relaxed)
    }

    /// Stop the worker and wait for it
    pub fn shutdown(&self) {
        let _ = self.commands.send(BackgroundCommand::Shutdown);
        if let Some(handle) = self.thread_handle.lock().take() {
            if handle.join().is_err() {
                log::error!("background marker thread panicked");
            }
        }
    }
}

impl Drop for BackgroundCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for BackgroundCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundCoordinator")
            .field("quanta", &self.quanta())
            .finish()
    }
}

fn worker_loop<T: MarkingTarget>(
    target: Weak<T>,
    commands: Receiver<BackgroundCommand>,
    events: Sender<BackgroundEvent>,
    quanta: std::sync::Arc<AtomicU64>,
) {
    let mut active: Option<u64> = None;
    let mut paused = false;

    loop {
        let command = if active.is_some() && !paused {
            match commands.try_recv() {
                Ok(command) => Some(command),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        } else {
            match commands.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            }
        };

        match command {
            Some(BackgroundCommand::Start(epoch)) => {
                active = Some(epoch);
                paused = false;
                log::debug!("background marking {} started", epoch);
                let _ = events.send(BackgroundEvent::Started { epoch });
            }
            Some(BackgroundCommand::Pause) => {
                if let (Some(epoch), false) = (active, paused) {
                    paused = true;
                    let _ = events.send(BackgroundEvent::Paused { epoch });
                }
            }
            Some(BackgroundCommand::Resume) => {
                if let (Some(epoch), true) = (active, paused) {
                    paused = false;
                    let _ = events.send(BackgroundEvent::Resumed { epoch });
                }
            }
            Some(BackgroundCommand::Shutdown) => break,
            None => {}
        }

        let Some(epoch) = active else {
            continue;
        };
        if paused {
            continue;
        }
        let Some(target) = target.upgrade() else {
            break;
        };

        quanta.fetch_add(1, Ordering::Relaxed);
        match target.mark_quantum(epoch) {
            MarkProgress::Working => std::thread::yield_now(),
            MarkProgress::Completed => {
                active = None;
                log::debug!("background marking {} completed", epoch);
                let _ = events.send(BackgroundEvent::Completed { epoch });
            }
            MarkProgress::Abandoned => {
                active = None;
            }
        }
    }

    log::debug!("background marker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    struct CountingTarget {
        remaining: AtomicUsize,
    }

    impl MarkingTarget for CountingTarget {
        fn mark_quantum(&self, _epoch: u64) -> MarkProgress {
            match self.remaining.fetch_sub(1, Ordering::SeqCst) {
                0 => MarkProgress::Abandoned,
                1 => MarkProgress::Completed,
                _ => MarkProgress::Working,
            }
        }
    }

    fn wait_for(coordinator: &BackgroundCoordinator, wanted: BackgroundEvent) -> Vec<BackgroundEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = Vec::new();
        while Instant::now() < deadline {
            seen.extend(coordinator.events());
            if seen.contains(&wanted) {
                return seen;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("event {:?} not seen, got {:?}", wanted, seen);
    }

    #[test]
    fn test_runs_until_completed() {
        let target = Arc::new(CountingTarget {
            remaining: AtomicUsize::new(3),
        });
        let coordinator = BackgroundCoordinator::spawn(Arc::downgrade(&target)).unwrap();

        assert!(coordinator.start(7));
        let events = wait_for(&coordinator, BackgroundEvent::Completed { epoch: 7 });
        assert_eq!(events[0], BackgroundEvent::Started { epoch: 7 });
        assert_eq!(coordinator.quanta(), 3);

        coordinator.shutdown();
        assert!(!coordinator.start(8));
    }

    #[test]
    fn test_pause_and_resume() {
        let target = Arc::new(CountingTarget {
            remaining: AtomicUsize::new(usize::MAX),
        });
        let coordinator = BackgroundCoordinator::spawn(Arc::downgrade(&target)).unwrap();

        coordinator.start(1);
        coordinator.pause();
        wait_for(&coordinator, BackgroundEvent::Paused { epoch: 1 });
        let quanta = coordinator.quanta();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(coordinator.quanta(), quanta);

        coordinator.resume();
        wait_for(&coordinator, BackgroundEvent::Resumed { epoch: 1 });
        coordinator.shutdown();
    }

    #[test]
    fn test_worker_stops_when_target_dropped() {
        let target = Arc::new(CountingTarget {
            remaining: AtomicUsize::new(usize::MAX),
        });
        let coordinator = BackgroundCoordinator::spawn(Arc::downgrade(&target)).unwrap();
        drop(target);
        coordinator.start(1);
        coordinator.shutdown();
    }
}
