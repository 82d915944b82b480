//! Background computation thread and the single computation slot

use super::{Outcome, RankError, RankResult};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread;
use tracing::{debug, error, warn};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where the slot stands
#[derive(Debug, Clone, PartialEq)]
pub enum SlotState {
    /// Nothing has run yet
    Idle,
    Running,
    /// Last computation finished
    Done(Outcome),
    /// Last computation was interrupted
    Canceled,
    /// Last computation failed with this message
    Failed(String),
}

/// At most one computation at a time; later requests are rejected, not queued
#[derive(Debug)]
pub(crate) struct Slot {
    state: Mutex<SlotState>,
    finished: Condvar,
}

impl Slot {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Idle),
            finished: Condvar::new(),
        }
    }

    pub(crate) fn acquire(&self) -> RankResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == SlotState::Running {
            warn!("Rank computation already in progress, request rejected");
            return Err(RankError::Busy);
        }
        *state = SlotState::Running;
        Ok(())
    }

    pub(crate) fn finish(&self, result: &RankResult<Outcome>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = match result {
            Ok(Outcome::Interrupted) => SlotState::Canceled,
            Ok(outcome) => SlotState::Done(*outcome),
            Err(e) => {
                error!("Rank computation failed: {}", e);
                SlotState::Failed(e.to_string())
            }
        };
        self.finished.notify_all();
    }

    pub(crate) fn state(&self) -> SlotState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Block until no computation is running
    pub(crate) fn wait(&self) -> SlotState {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = self
            .finished
            .wait_while(state, |s| *s == SlotState::Running)
            .unwrap_or_else(PoisonError::into_inner);
        state.clone()
    }
}

/// Long-lived thread running submitted jobs one after another
pub(crate) struct Worker {
    sender: Option<SyncSender<Job>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn() -> RankResult<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Job>(1);
        let handle = thread::Builder::new()
            .name("graphrank-worker".to_string())
            .spawn(move || Self::run(receiver))?;
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    fn run(receiver: Receiver<Job>) {
        while let Ok(job) = receiver.recv() {
            debug!("Worker picked up a computation");
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                error!("Rank job panicked: {}", panic_message(payload.as_ref()));
            }
        }
        debug!("Worker shutting down");
    }

    pub(crate) fn submit(&self, job: Job) -> RankResult<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| RankError::Worker("worker is shut down".to_string()))?;
        sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => RankError::Busy,
            TrySendError::Disconnected(_) => RankError::Worker("worker thread exited".to_string()),
        })
    }
}

/// Run `job`, turning a panic into [`RankError::Worker`]
pub(crate) fn guarded<T>(job: impl FnOnce() -> RankResult<T>) -> RankResult<T> {
    panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|payload| {
        Err(RankError::Worker(format!(
            "computation panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Closing the channel ends the loop once the current job is done
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Rank worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_slot_rejects_second_acquire() {
        let slot = Slot::new();
        slot.acquire().unwrap();
        assert!(matches!(slot.acquire(), Err(RankError::Busy)));

        slot.finish(&Ok(Outcome::NothingToDo));
        assert_eq!(slot.state(), SlotState::Done(Outcome::NothingToDo));
        assert!(slot.acquire().is_ok());
    }

    #[test]
    fn test_slot_records_outcome() {
        let slot = Slot::new();
        slot.acquire().unwrap();
        slot.finish(&Ok(Outcome::Interrupted));
        assert_eq!(slot.wait(), SlotState::Canceled);

        slot.acquire().unwrap();
        slot.finish(&Err(RankError::EmptyGraph));
        assert!(matches!(slot.wait(), SlotState::Failed(msg) if msg.contains("no edges")));
    }

    #[test]
    fn test_worker_runs_jobs_on_named_thread() {
        let worker = Worker::spawn().unwrap();
        let name = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&name);
        let slot = Arc::new(Slot::new());
        slot.acquire().unwrap();
        let done = Arc::clone(&slot);

        worker
            .submit(Box::new(move || {
                *seen.lock().unwrap() = thread::current().name().map(str::to_string);
                done.finish(&Ok(Outcome::NothingToDo));
            }))
            .unwrap();

        assert_eq!(slot.wait(), SlotState::Done(Outcome::NothingToDo));
        assert_eq!(name.lock().unwrap().as_deref(), Some("graphrank-worker"));
    }

    #[test]
    fn test_guarded_reports_panic_as_error() {
        let result: RankResult<()> = guarded(|| panic!("source went away"));
        assert!(matches!(result, Err(RankError::Worker(msg)) if msg.contains("source went away")));
        assert!(matches!(guarded(|| Ok(7)), Ok(7)));
    }

    #[test]
    fn test_worker_survives_panicking_job() {
        let worker = Worker::spawn().unwrap();
        worker.submit(Box::new(|| panic!("bad job"))).unwrap();

        let slot = Arc::new(Slot::new());
        slot.acquire().unwrap();
        let done = Arc::clone(&slot);
        // The channel holds one job, so retry while the panicking one drains
        let mut job: Option<Job> = Some(Box::new(move || done.finish(&Ok(Outcome::NothingToDo))));
        while let Some(next) = job.take() {
            match worker.sender.as_ref().unwrap().try_send(next) {
                Ok(()) => {}
                Err(TrySendError::Full(next)) => {
                    thread::yield_now();
                    job = Some(next);
                }
                Err(TrySendError::Disconnected(_)) => panic!("worker thread exited"),
            }
        }
        assert_eq!(slot.wait(), SlotState::Done(Outcome::NothingToDo));
    }
}
