//! Process handles: suspendable units of work with completion and interrupt.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::env::WeakSimEnv;
use crate::error::SimResult;
use crate::event::{Event, EventCore};
use crate::value::Value;

/// The wait a process is currently suspended on.
pub(crate) struct Wait {
    pub(crate) event: Weak<RefCell<EventCore>>,
}

pub(crate) struct ProcessState {
    pub(crate) id: u64,
    pub(crate) label: String,
    /// Incremented on every suspension and on interrupt; a resume carrying
    /// an older epoch is stale and dropped by the executor.
    pub(crate) epoch: u64,
    /// Cause to be surfaced as an interrupt fault at the next resume.
    pub(crate) pending_interrupt: Option<Value>,
    pub(crate) current_wait: Option<Wait>,
    pub(crate) done: bool,
    pub(crate) completion: Event,
}

/// Handle to a suspendable process created by
/// [`SimEnv::create_task`](crate::SimEnv::create_task).
///
/// A process is a coroutine that suspends only at awaits on engine events.
/// It never starts on its own: enqueue it once with
/// [`SimEnv::schedule_process`](crate::SimEnv::schedule_process). When the
/// body returns `Ok(())`, the completion event fires with
/// [`Value::Finish`], releasing every process awaiting it.
#[derive(Clone)]
pub struct Process {
    pub(crate) env: WeakSimEnv,
    pub(crate) state: Rc<RefCell<ProcessState>>,
}

impl Process {
    /// The event that fires when this process completes normally.
    pub fn completion_event(&self) -> Event {
        self.state.borrow().completion.clone()
    }

    /// Returns `true` once the body has returned or faulted.
    pub fn is_done(&self) -> bool {
        self.state.borrow().done
    }

    /// The label assigned at scheduling time (for traces).
    pub fn label(&self) -> String {
        self.state.borrow().label.clone()
    }

    /// Cancels the process's current wait and raises a recoverable
    /// interrupt fault carrying `cause` at the await site.
    ///
    /// The process resumes immediately at the current time; the wait's
    /// original event keeps its identity and may still fire harmlessly
    /// later. An interrupted resource waiter is removed from its queue, but
    /// an admission that completed before the interrupt stands. If the
    /// process is not suspended (running, finished, or never started), the
    /// interrupt is a no-op.
    pub fn interrupt(&self, cause: Value) -> SimResult<()> {
        let env = self.env.upgrade()?;
        let (id, epoch, wait) = {
            let mut state = self.state.borrow_mut();
            if state.done {
                return Ok(());
            }
            let Some(wait) = state.current_wait.take() else {
                return Ok(());
            };
            state.epoch += 1;
            state.pending_interrupt = Some(cause);
            (state.id, state.epoch, wait)
        };
        if let Some(core) = wait.event.upgrade() {
            let hook = core.borrow_mut().take_abort_hook();
            if let Some(hook) = hook {
                hook();
            }
        }
        debug!(process = id, at = %env.now(), "interrupting current wait");
        env.schedule_resume(id, epoch, env.now());
        Ok(())
    }
}
