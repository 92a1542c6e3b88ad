//! Background threads for long-running svn calls.
//!
//! Each task runs one blocking call on its own thread. Results come back
//! either through a `TaskHandle` or as a completion callback that is queued
//! and only run when the interactive thread calls `drain`. Workers never run
//! callbacks themselves.

mod progress;

pub use progress::{Progress, TICK_INTERVAL};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc as oneshot;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use crate::error::SvnError;

type Completion = Box<dyn FnOnce() + Send>;

/// Shared "still running" flag of a task.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn finished(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Result side of a task started with `TaskRunner::spawn`.
pub struct TaskHandle<T> {
    label: String,
    receiver: oneshot::Receiver<Result<T, SvnError>>,
    liveness: Liveness,
}

impl<T> TaskHandle<T> {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    pub fn is_finished(&self) -> bool {
        !self.liveness.is_alive()
    }

    /// Block until the task is done.
    pub fn wait(self) -> Result<T, SvnError> {
        self.receiver.recv().map_err(|_| {
            SvnError::TaskFailed(format!("{} ended without a result", self.label))
        })?
    }

    /// The result, if the task has finished. Returns `Some` at most once.
    pub fn try_wait(&self) -> Option<Result<T, SvnError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::TryRecvError::Empty) => None,
            Err(oneshot::TryRecvError::Disconnected) => None,
        }
    }
}

/// Spawns task threads and holds the completion queue.
pub struct TaskRunner {
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
    pending: Arc<AtomicUsize>,
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRunner {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Run `work` on a new thread and return a handle to its result.
    pub fn spawn<T, F>(&self, label: &str, work: F) -> Result<TaskHandle<T>, SvnError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, SvnError> + Send + 'static,
    {
        let (reply, receiver) = oneshot::channel();
        let liveness = Liveness::new();
        let flag = liveness.clone();
        let task = label.to_string();

        spawn_thread(label, move || {
            let result = run_guarded(&task, work);
            let _ = reply.send(result);
            flag.finished();
        })?;

        Ok(TaskHandle {
            label: label.to_string(),
            receiver,
            liveness,
        })
    }

    /// Run `work` on a new thread; `on_complete` runs later, inside `drain`.
    pub fn spawn_with<T, F, C>(
        &self,
        label: &str,
        work: F,
        on_complete: C,
    ) -> Result<Liveness, SvnError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, SvnError> + Send + 'static,
        C: FnOnce(Result<T, SvnError>) + Send + 'static,
    {
        let liveness = Liveness::new();
        let flag = liveness.clone();
        let sender = self.sender.clone();
        let task = label.to_string();

        self.pending.fetch_add(1, Ordering::SeqCst);
        let spawned = spawn_thread(label, move || {
            let result = run_guarded(&task, work);
            if sender.send(Box::new(move || on_complete(result))).is_err() {
                log::warn!("Task {} finished after its runner was dropped", task);
            }
            flag.finished();
        });
        if let Err(e) = spawned {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(e);
        }

        Ok(liveness)
    }

    /// Completions queued or still running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Run every completion that is ready now. Returns how many ran.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        while let Ok(completion) = self.receiver.try_recv() {
            self.complete(completion);
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for a completion, then run everything that is ready.
    pub fn drain_timeout(&self, timeout: Duration) -> usize {
        match self.receiver.recv_timeout(timeout) {
            Ok(completion) => {
                self.complete(completion);
                1 + self.drain()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    fn complete(&self, completion: Completion) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
        completion();
    }
}

fn spawn_thread<F>(label: &str, body: F) -> Result<(), SvnError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(format!("svnp-{}", label))
        .spawn(body)
        .map(|_| ())
        .map_err(|e| SvnError::TaskFailed(format!("failed to start {}: {}", label, e)))
}

/// Run `work`, turning a panic into `TaskFailed`.
fn run_guarded<T, F>(label: &str, work: F) -> Result<T, SvnError>
where
    F: FnOnce() -> Result<T, SvnError>,
{
    log::debug!("Task {} started", label);
    let result = match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(result) => result,
        Err(payload) => Err(SvnError::TaskFailed(format!(
            "{} panicked: {}",
            label,
            panic_message(payload.as_ref())
        ))),
    };
    if let Err(e) = &result {
        log::debug!("Task {} failed: {}", label, e);
    }
    result
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread::ThreadId;
    use std::time::Instant;

    #[test]
    fn spawn_returns_result() {
        let runner = TaskRunner::new();
        let handle = runner.spawn("answer", || Ok(42)).unwrap();
        assert_eq!(handle.label(), "answer");
        assert_eq!(handle.wait().unwrap(), 42);
    }

    #[test]
    fn errors_cross_back_unchanged() {
        let runner = TaskRunner::new();
        let handle = runner
            .spawn::<(), _>("fail", || Err(SvnError::subprocess(1, "boom")))
            .unwrap();
        assert!(matches!(
            handle.wait(),
            Err(SvnError::Subprocess { code: 1, .. })
        ));
    }

    #[test]
    fn panics_become_task_failed() {
        let runner = TaskRunner::new();
        let handle = runner
            .spawn::<(), _>("explode", || panic!("kaboom"))
            .unwrap();
        match handle.wait() {
            Err(SvnError::TaskFailed(message)) => {
                assert!(message.contains("explode"));
                assert!(message.contains("kaboom"));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn liveness_flips_when_done() {
        let runner = TaskRunner::new();
        let (go, wait_for_go) = oneshot::channel::<()>();
        let handle = runner
            .spawn("gated", move || {
                let _ = wait_for_go.recv();
                Ok(())
            })
            .unwrap();

        assert!(!handle.is_finished());
        assert!(handle.try_wait().is_none());
        go.send(()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(handle.is_finished());
        assert!(handle.try_wait().unwrap().is_ok());
    }

    #[test]
    fn completions_run_on_the_draining_thread() {
        let runner = TaskRunner::new();
        let seen: Arc<Mutex<Vec<(i32, ThreadId)>>> = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let seen = Arc::clone(&seen);
            runner
                .spawn_with(
                    "item",
                    move || Ok(i),
                    move |result| {
                        seen.lock()
                            .unwrap()
                            .push((result.unwrap(), thread::current().id()));
                    },
                )
                .unwrap();
        }
        assert_eq!(runner.pending(), 3);

        let deadline = Instant::now() + Duration::from_secs(5);
        while runner.pending() > 0 && Instant::now() < deadline {
            runner.drain_timeout(Duration::from_millis(50));
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        let here = thread::current().id();
        assert!(seen.iter().all(|(_, id)| *id == here));
        let mut values: Vec<i32> = seen.iter().map(|(v, _)| *v).collect();
        values.sort();
        assert_eq!(values, vec![0, 1, 2]);
    }

    #[test]
    fn completion_waits_for_drain() {
        let runner = TaskRunner::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let liveness = runner
            .spawn_with("quick", || Ok(()), move |_| flag.store(true, Ordering::SeqCst))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while liveness.is_alive() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!ran.load(Ordering::SeqCst));

        assert_eq!(runner.drain(), 1);
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(runner.pending(), 0);
    }

    #[test]
    fn drain_timeout_returns_zero_when_idle() {
        let runner = TaskRunner::new();
        assert_eq!(runner.drain_timeout(Duration::from_millis(10)), 0);
    }
}
