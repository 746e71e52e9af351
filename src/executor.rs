use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::Result;

type Task = Box<dyn FnOnce() -> Result<()> + Send>;

enum ExecutorState {
    Buffering(VecDeque<Task>),
    Ready,
}

/// Single-writer serialised task queue with a pre-load buffer.
///
/// Tasks submitted before [`Executor::process_buffer`] is called are queued
/// rather than run; once released, every future task runs immediately and in
/// submission order. Holding the lock across task execution, rather than
/// only around enqueueing, is what makes "exactly one task runs at a time"
/// fall out of `std::sync::Mutex` without spawning a worker thread.
pub struct Executor {
    state: Mutex<ExecutorState>,
}

impl Executor {
    /// A fresh executor, buffering until [`Executor::process_buffer`] is called.
    pub fn new() -> Self {
        Executor {
            state: Mutex::new(ExecutorState::Buffering(VecDeque::new())),
        }
    }

    /// Submits `task`. If the executor is ready, it runs immediately under
    /// the serialising lock; otherwise it is appended to the pre-load buffer.
    pub fn push(&self, task: Task) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match &mut *state {
            ExecutorState::Ready => task(),
            ExecutorState::Buffering(buffer) => {
                buffer.push_back(task);
                Ok(())
            }
        }
    }

    /// Marks the executor ready and runs every buffered task in submission
    /// order. Subsequent [`Executor::push`] calls run immediately.
    pub fn process_buffer(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let buffered = match std::mem::replace(&mut *state, ExecutorState::Ready) {
            ExecutorState::Buffering(buffer) => buffer,
            ExecutorState::Ready => VecDeque::new(),
        };
        for task in buffered {
            task()?;
        }
        Ok(())
    }

    /// True once [`Executor::process_buffer`] has run.
    pub fn is_ready(&self) -> bool {
        matches!(&*self.state.lock().unwrap(), ExecutorState::Ready)
    }
}

impl Default for Executor {
    fn default() -> Self {
        Executor::new()
    }
}
