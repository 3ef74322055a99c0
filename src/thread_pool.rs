use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crossbeam::channel::{unbounded, Receiver, Sender};

/// How a task group ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOutcome {
    Finished,
    Aborted,
    Failed(String),
}

type Task = Box<dyn Fn(u32, u32, u32) + Send + Sync>;
type CompletionCallback = Box<dyn FnOnce(GroupOutcome) + Send>;

/// A batch of `count` indexed invocations of one task. Indices are handed to
/// workers FIFO from the pool queue; per-worker processing order across
/// groups is unspecified.
pub struct TaskGroup {
    id: u32,
    count: u32,
    task: Task,
    drained: AtomicU32,
    aborted: AtomicBool,
    state: Mutex<GroupState>,
    finished_cv: Condvar,
}

struct GroupState {
    done: bool,
    error: Option<String>,
    on_complete: Option<CompletionCallback>,
}

impl TaskGroup {
    fn new(id: u32, count: u32, task: Task, on_complete: CompletionCallback) -> Self {
        Self {
            id,
            count,
            task,
            drained: AtomicU32::new(0),
            aborted: AtomicBool::new(false),
            state: Mutex::new(GroupState {
                done: false,
                error: None,
                on_complete: Some(on_complete),
            }),
            finished_cv: Condvar::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Marks the group cancelled; queued indices drain without running.
    /// Idempotent.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Blocks until every index has drained (run or skipped).
    pub fn wait(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.done {
            state = self.finished_cv.wait(state).unwrap();
        }
    }

    fn run_index(self: &Arc<Self>, index: u32, worker_id: u32) {
        if !self.is_aborted() {
            let result = catch_unwind(AssertUnwindSafe(|| (self.task)(self.id, index, worker_id)));
            if let Err(payload) = result {
                let message = panic_message(&payload);
                let mut state = self.state.lock().unwrap();
                if state.error.is_none() {
                    state.error = Some(message);
                }
                drop(state);
                // Drain whatever is still queued.
                self.abort();
            }
        }

        let drained = self.drained.fetch_add(1, Ordering::AcqRel) + 1;
        if drained == self.count {
            self.finish();
        }
    }

    fn finish(&self) {
        let (callback, outcome) = {
            let mut state = self.state.lock().unwrap();
            let outcome = if let Some(error) = state.error.take() {
                GroupOutcome::Failed(error)
            } else if self.is_aborted() {
                GroupOutcome::Aborted
            } else {
                GroupOutcome::Finished
            };
            (state.on_complete.take(), outcome)
        };
        // The callback runs before waiters unblock, so anything observing
        // `wait()` sees its side effects.
        if let Some(callback) = callback {
            callback(outcome);
        }
        self.state.lock().unwrap().done = true;
        self.finished_cv.notify_all();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Fixed set of OS-thread workers pulling indexed tasks from one FIFO queue.
pub struct ThreadPool {
    sender: Option<Sender<(Arc<TaskGroup>, u32)>>,
    workers: Vec<JoinHandle<()>>,
    next_group_id: AtomicU32,
    thread_count: usize,
}

impl ThreadPool {
    pub fn new(thread_count: usize) -> Self {
        let thread_count = thread_count.max(1);
        let (sender, receiver): (Sender<(Arc<TaskGroup>, u32)>, Receiver<(Arc<TaskGroup>, u32)>) =
            unbounded();

        let workers = (0..thread_count)
            .map(|worker_id| {
                let receiver = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("render-worker-{}", worker_id))
                    .spawn(move || {
                        while let Ok((group, index)) = receiver.recv() {
                            group.run_index(index, worker_id as u32);
                        }
                    })
                    .expect("failed to spawn render worker")
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
            next_group_id: AtomicU32::new(0),
            thread_count,
        }
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Schedules `count` invocations of `task(group_id, index, worker_id)`.
    /// `on_complete` runs on the worker that observes the group drain (or
    /// inline for empty groups).
    pub fn enqueue(
        &self,
        task: impl Fn(u32, u32, u32) + Send + Sync + 'static,
        count: u32,
        on_complete: impl FnOnce(GroupOutcome) + Send + 'static,
    ) -> Arc<TaskGroup> {
        let id = self.next_group_id.fetch_add(1, Ordering::Relaxed);
        let group = Arc::new(TaskGroup::new(
            id,
            count,
            Box::new(task),
            Box::new(on_complete),
        ));

        if count == 0 {
            group.finish();
            return group;
        }

        let sender = self.sender.as_ref().expect("pool already shut down");
        for index in 0..count {
            sender
                .send((Arc::clone(&group), index))
                .expect("worker queue closed");
        }
        group
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Closing the channel lets workers drain the queue and exit.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
