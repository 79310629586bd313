//! Core simulation environment: clock, event heap, and the executor loop.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

use tracing::{debug, trace};

use crate::error::{SimError, SimResult};
use crate::event::Event;
use crate::events::{Action, EventQueue, ScheduledEvent};
use crate::process::{Process, ProcessState};
use crate::time::SimTime;
use crate::value::Value;

pub(crate) type ProcessBody = Pin<Box<dyn Future<Output = SimResult<()>>>>;

struct EnvInner {
    now: SimTime,
    next_seq: u64,
    queue: EventQueue,
    next_process_id: u64,
    processes: HashMap<u64, Rc<RefCell<ProcessState>>>,
    bodies: HashMap<u64, ProcessBody>,
    /// Process currently being polled; engine futures read their context
    /// from here.
    current: Option<Rc<RefCell<ProcessState>>>,
}

/// The central coordinator that owns the virtual clock, the pending-event
/// heap, and every live process.
///
/// All scheduling flows through this handle, which keeps sequence numbers
/// monotonic and runs reproducible: two runs that schedule the same work in
/// the same order dispatch it identically. Handles are cheap clones of one
/// shared environment; [`SimEnv::downgrade`] produces a weak handle that
/// does not keep the environment alive.
#[derive(Clone)]
pub struct SimEnv {
    inner: Rc<RefCell<EnvInner>>,
}

impl SimEnv {
    /// Creates an empty environment with the clock at zero.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(EnvInner {
                now: SimTime::ZERO,
                next_seq: 0,
                queue: EventQueue::new(),
                next_process_id: 0,
                processes: HashMap::new(),
                bodies: HashMap::new(),
                current: None,
            })),
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> SimTime {
        self.inner.borrow().now
    }

    /// Creates a weak handle to this environment.
    pub fn downgrade(&self) -> WeakSimEnv {
        WeakSimEnv {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Returns `true` if entries are waiting to be processed.
    pub fn has_pending_events(&self) -> bool {
        !self.inner.borrow().queue.is_empty()
    }

    /// Number of entries waiting to be processed.
    pub fn pending_event_count(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Wraps `body` in a new process and registers it.
    ///
    /// The process is created suspended and never starts on its own; enqueue
    /// it with [`SimEnv::schedule_process`]. Its completion event fires when
    /// the body returns `Ok(())`.
    pub fn create_task<F>(&self, body: F) -> Process
    where
        F: Future<Output = SimResult<()>> + 'static,
    {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_process_id;
            inner.next_process_id += 1;
            id
        };
        let completion = Event::new(self);
        let state = Rc::new(RefCell::new(ProcessState {
            id,
            label: format!("task-{id}"),
            epoch: 0,
            pending_interrupt: None,
            current_wait: None,
            done: false,
            completion,
        }));
        {
            let mut inner = self.inner.borrow_mut();
            inner.processes.insert(id, state.clone());
            inner.bodies.insert(id, Box::pin(body));
        }
        trace!(process = id, "task created");
        Process {
            env: self.downgrade(),
            state,
        }
    }

    /// Enqueues a resume for `process` at the current time, labelling it for
    /// traces. Rejects processes that have already finished.
    pub fn schedule_process(&self, process: &Process, label: &str) -> SimResult<()> {
        let (id, epoch) = {
            let mut state = process.state.borrow_mut();
            if state.done {
                return Err(SimError::ProcessFinished {
                    label: state.label.clone(),
                });
            }
            state.label = label.to_string();
            (state.id, state.epoch)
        };
        let now = self.now();
        self.push_entry(now, Action::Resume { process: id, epoch }, label.to_string());
        Ok(())
    }

    /// Enqueues a raw fire for `event` at the event's recorded fire time.
    ///
    /// A fire time in the past is legal: the entry pops next, and the clock
    /// never rewinds.
    pub fn schedule_event(&self, event: &Event) {
        self.schedule_fire(event.clone(), event.fire_time(), "event");
    }

    pub(crate) fn schedule_fire(&self, event: Event, at: SimTime, label: &str) {
        self.push_entry(at, Action::Fire { event }, label.to_string());
    }

    pub(crate) fn schedule_resume(&self, process: u64, epoch: u64, at: SimTime) {
        let label = self
            .inner
            .borrow()
            .processes
            .get(&process)
            .map(|state| state.borrow().label.clone())
            .unwrap_or_default();
        self.push_entry(at, Action::Resume { process, epoch }, label);
    }

    fn push_entry(&self, at: SimTime, action: Action, label: String) {
        let mut inner = self.inner.borrow_mut();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        trace!(at = %at, seq, label = %label, "entry scheduled");
        inner.queue.schedule(ScheduledEvent::new(at, seq, action, label));
    }

    pub(crate) fn current_process(&self) -> Option<Rc<RefCell<ProcessState>>> {
        self.inner.borrow().current.clone()
    }

    /// Processes the earliest entry and advances the clock to it.
    ///
    /// Returns `Ok(true)` while entries remain afterwards. An unhandled
    /// process fault stops the run and is returned.
    pub fn step(&self) -> SimResult<bool> {
        let entry = { self.inner.borrow_mut().queue.pop_earliest() };
        let Some(entry) = entry else {
            return Ok(false);
        };
        let now = {
            let mut inner = self.inner.borrow_mut();
            // A backdated entry fires immediately but never rewinds the clock.
            inner.now = inner.now.max(entry.at);
            inner.now
        };
        trace!(at = %now, seq = entry.seq, label = %entry.label, "dispatching");
        match entry.action {
            Action::Fire { event } => event.fire(self, now),
            Action::Resume { process, epoch } => self.resume_process(process, epoch)?,
        }
        Ok(self.has_pending_events())
    }

    /// Drains the heap, dispatching entries in `(fire_time, sequence)` order.
    pub fn run(&self) -> SimResult<()> {
        debug!("simulation run started");
        while self.step()? {}
        debug!(now = %self.now(), "simulation run finished");
        Ok(())
    }

    /// Processes entries up to and including `until`, then clamps the clock
    /// up to `until`.
    pub fn run_until(&self, until: SimTime) -> SimResult<()> {
        loop {
            let next = self.inner.borrow().queue.peek_time();
            match next {
                Some(at) if at <= until => {
                    self.step()?;
                }
                _ => break,
            }
        }
        let mut inner = self.inner.borrow_mut();
        inner.now = inner.now.max(until);
        Ok(())
    }

    fn resume_process(&self, id: u64, epoch: u64) -> SimResult<()> {
        let taken = {
            let mut inner = self.inner.borrow_mut();
            let Some(state) = inner.processes.get(&id).cloned() else {
                return Ok(());
            };
            {
                let state = state.borrow();
                if state.done || state.epoch != epoch {
                    trace!(process = id, epoch, "stale resume dropped");
                    return Ok(());
                }
            }
            inner.bodies.remove(&id).map(|body| (state, body))
        };
        let Some((state, mut body)) = taken else {
            return Ok(());
        };

        self.inner.borrow_mut().current = Some(state.clone());
        let mut cx = Context::from_waker(Waker::noop());
        let polled = body.as_mut().poll(&mut cx);
        self.inner.borrow_mut().current = None;

        match polled {
            Poll::Pending => {
                self.inner.borrow_mut().bodies.insert(id, body);
                Ok(())
            }
            Poll::Ready(Ok(())) => {
                let (label, completion) = {
                    let mut state = state.borrow_mut();
                    state.done = true;
                    state.current_wait = None;
                    (state.label.clone(), state.completion.clone())
                };
                debug!(process = id, label = %label, at = %self.now(), "process finished");
                completion.succeed_with(self, Value::Finish);
                Ok(())
            }
            Poll::Ready(Err(fault)) => {
                let label = {
                    let mut state = state.borrow_mut();
                    state.done = true;
                    state.label.clone()
                };
                debug!(process = id, label = %label, %fault, "unhandled process fault");
                Err(SimError::ProcessFault {
                    label,
                    source: Box::new(fault),
                })
            }
        }
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// A weak handle to a [`SimEnv`].
///
/// Weak handles let long-lived components reference the environment without
/// keeping it alive. Operations fail with [`SimError::Shutdown`] once the
/// environment is dropped.
#[derive(Clone)]
pub struct WeakSimEnv {
    inner: Weak<RefCell<EnvInner>>,
}

impl WeakSimEnv {
    /// Attempts to upgrade to a strong handle.
    pub fn upgrade(&self) -> SimResult<SimEnv> {
        self.inner
            .upgrade()
            .map(|inner| SimEnv { inner })
            .ok_or(SimError::Shutdown)
    }

    /// Current virtual time, if the environment is still alive.
    pub fn now(&self) -> SimResult<SimTime> {
        Ok(self.upgrade()?.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_environment_is_idle_at_zero() {
        let env = SimEnv::new();
        assert_eq!(env.now(), SimTime::ZERO);
        assert!(!env.has_pending_events());
        assert_eq!(env.pending_event_count(), 0);
        assert!(!env.step().expect("step"));
        assert_eq!(env.now(), SimTime::ZERO);
    }

    #[test]
    fn step_advances_clock_per_entry() {
        let env = SimEnv::new();
        env.delay(100);
        env.delay(50);
        env.delay(200);
        assert_eq!(env.pending_event_count(), 3);

        assert!(env.step().expect("step"));
        assert_eq!(env.now(), SimTime::new(50));
        assert!(env.step().expect("step"));
        assert_eq!(env.now(), SimTime::new(100));
        assert!(!env.step().expect("step"));
        assert_eq!(env.now(), SimTime::new(200));
        assert!(!env.has_pending_events());
    }

    #[test]
    fn run_until_leaves_later_entries_pending() {
        let env = SimEnv::new();
        env.delay(10);
        env.delay(30);

        env.run_until(SimTime::new(20)).expect("run_until");
        assert_eq!(env.now(), SimTime::new(20));
        assert_eq!(env.pending_event_count(), 1);

        env.run().expect("run");
        assert_eq!(env.now(), SimTime::new(30));
    }

    #[test]
    fn backdated_event_fires_without_rewinding_clock() {
        let env = SimEnv::new();
        let stale = Event::new(&env); // fire time 0
        env.delay(10);
        env.run().expect("run");
        assert_eq!(env.now(), SimTime::new(10));

        env.schedule_event(&stale);
        env.run().expect("run");
        assert!(stale.is_done());
        assert_eq!(env.now(), SimTime::new(10));
    }

    #[test]
    fn weak_handle_fails_after_drop() {
        let env = SimEnv::new();
        let weak = env.downgrade();
        assert_eq!(weak.now().expect("alive"), SimTime::ZERO);

        drop(env);
        assert_eq!(weak.upgrade().err(), Some(SimError::Shutdown));
    }

    #[test]
    fn unhandled_fault_stops_the_run() {
        let env = SimEnv::new();
        let task = env.create_task(async move {
            Err(SimError::InvalidAmount { amount: -1 })
        });
        env.schedule_process(&task, "broken").expect("schedule");

        let err = env.run().expect_err("fault escalates");
        match err {
            SimError::ProcessFault { label, source } => {
                assert_eq!(label, "broken");
                assert_eq!(*source, SimError::InvalidAmount { amount: -1 });
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn finished_process_cannot_be_rescheduled() {
        let env = SimEnv::new();
        let task = env.create_task(async move { Ok(()) });
        env.schedule_process(&task, "oneshot").expect("schedule");
        env.run().expect("run");

        assert!(task.is_done());
        assert_eq!(
            env.schedule_process(&task, "again").err(),
            Some(SimError::ProcessFinished {
                label: "oneshot".to_string()
            })
        );
    }
}
