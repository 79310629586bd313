//! Completion events, timed delays, and the suspension future.

use std::any::Any;
use std::cell::RefCell;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use tracing::trace;

use crate::env::{SimEnv, WeakSimEnv};
use crate::error::{SimError, SimResult};
use crate::process::Wait;
use crate::time::SimTime;
use crate::value::Value;

/// Callback invoked when an event fires, with the fire time and a borrow of
/// the payload. Callbacks run in registration order.
pub(crate) type Callback = Box<dyn FnOnce(&SimEnv, SimTime, &Value)>;

pub(crate) struct EventCore {
    /// Fire time: creation time for plain events, `now + d` for delays,
    /// restamped to `now` by `succeed`.
    at: SimTime,
    done: bool,
    fired: bool,
    value: Value,
    callbacks: Vec<Callback>,
    /// Dequeues the waiter from its resource queue on interrupt.
    abort_hook: Option<Box<dyn FnOnce()>>,
    /// Owns combinator state so child callbacks can hold weak back-references.
    keepalive: Option<Rc<dyn Any>>,
}

impl EventCore {
    pub(crate) fn take_abort_hook(&mut self) -> Option<Box<dyn FnOnce()>> {
        self.abort_hook.take()
    }
}

/// A latching, multi-waiter signal carrying a [`Value`] payload.
///
/// An event starts pending. [`Event::succeed`] latches it `done` and
/// schedules its callbacks through the environment at the current time;
/// firing happens at most once. Awaiting a pending event suspends the
/// running process until the event fires; awaiting a done event returns the
/// stored payload immediately without touching the scheduler.
///
/// Handles are cheap clones sharing one underlying event.
#[derive(Clone)]
pub struct Event {
    pub(crate) env: WeakSimEnv,
    pub(crate) core: Rc<RefCell<EventCore>>,
}

impl Event {
    /// Creates a pending completion event in `env`.
    pub fn new(env: &SimEnv) -> Event {
        Self::new_at(env, env.now())
    }

    pub(crate) fn new_at(env: &SimEnv, at: SimTime) -> Event {
        Event {
            env: env.downgrade(),
            core: Rc::new(RefCell::new(EventCore {
                at,
                done: false,
                fired: false,
                value: Value::None,
                callbacks: Vec::new(),
                abort_hook: None,
                keepalive: None,
            })),
        }
    }

    /// Returns `true` once the event has been succeeded or has fired.
    pub fn is_done(&self) -> bool {
        self.core.borrow().done
    }

    /// Snapshot of the stored payload.
    pub fn value(&self) -> Value {
        self.core.borrow().value.clone()
    }

    /// The virtual time this event fires (or fired) at.
    pub fn fire_time(&self) -> SimTime {
        self.core.borrow().at
    }

    /// Latches the event done with `value` and schedules its callbacks at
    /// the current time. Succeeding an already-done event is a no-op.
    pub fn succeed(&self, value: Value) -> SimResult<()> {
        let env = self.env.upgrade()?;
        self.succeed_with(&env, value);
        Ok(())
    }

    pub(crate) fn succeed_with(&self, env: &SimEnv, value: Value) {
        {
            let mut core = self.core.borrow_mut();
            if core.done {
                return;
            }
            core.done = true;
            core.value = value;
            core.at = env.now();
            core.abort_hook = None;
        }
        env.schedule_fire(self.clone(), env.now(), "succeed");
    }

    /// Stamps the payload and schedules the fire at the current time without
    /// latching `done`; the event completes only when the fire is
    /// dispatched. Resource admissions resolve this way: the admitted
    /// process resumes through the scheduler, after the event's cross-side
    /// callback has run.
    pub(crate) fn admit(&self, env: &SimEnv, value: Value) {
        {
            let mut core = self.core.borrow_mut();
            if core.done {
                return;
            }
            core.value = value;
            core.at = env.now();
            core.abort_hook = None;
        }
        env.schedule_fire(self.clone(), env.now(), "admit");
    }

    /// Drains and runs the callbacks. Fires at most once; a second fire of
    /// the same event is a no-op.
    pub(crate) fn fire(&self, env: &SimEnv, at: SimTime) {
        let (callbacks, value) = {
            let mut core = self.core.borrow_mut();
            if core.fired {
                return;
            }
            core.fired = true;
            core.done = true;
            core.abort_hook = None;
            core.keepalive = None;
            (std::mem::take(&mut core.callbacks), core.value.clone())
        };
        trace!(at = %at, waiters = callbacks.len(), "event fired");
        for callback in callbacks {
            callback(env, at, &value);
        }
    }

    /// Registers a callback for the fire. The caller is responsible for
    /// handling already-done events before registering.
    pub(crate) fn add_callback(&self, callback: Callback) {
        self.core.borrow_mut().callbacks.push(callback);
    }

    pub(crate) fn set_abort_hook(&self, hook: Box<dyn FnOnce()>) {
        self.core.borrow_mut().abort_hook = Some(hook);
    }

    pub(crate) fn set_keepalive(&self, state: Rc<dyn Any>) {
        self.core.borrow_mut().keepalive = Some(state);
    }

    /// Future that suspends the running process until the event fires.
    pub fn wait(&self) -> EventWait {
        EventWait {
            event: self.clone(),
            registered: false,
        }
    }
}

impl IntoFuture for Event {
    type Output = SimResult<Value>;
    type IntoFuture = EventWait;

    fn into_future(self) -> EventWait {
        self.wait()
    }
}

impl IntoFuture for &Event {
    type Output = SimResult<Value>;
    type IntoFuture = EventWait;

    fn into_future(self) -> EventWait {
        self.wait()
    }
}

/// Suspension future returned by [`Event::wait`].
///
/// The first poll short-circuits on a done event; otherwise it registers a
/// resume callback, records the process's current wait, and suspends. The
/// resumed poll reports a pending interrupt as
/// [`SimError::Interrupted`], or yields the event payload.
pub struct EventWait {
    event: Event,
    registered: bool,
}

impl Future for EventWait {
    type Output = SimResult<Value>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let env = match this.event.env.upgrade() {
            Ok(env) => env,
            Err(err) => return Poll::Ready(Err(err)),
        };
        let Some(process) = env.current_process() else {
            return Poll::Ready(Err(SimError::OutsideProcess));
        };

        if this.registered {
            let mut state = process.borrow_mut();
            state.current_wait = None;
            if let Some(cause) = state.pending_interrupt.take() {
                return Poll::Ready(Err(SimError::Interrupted { cause }));
            }
        }

        if this.event.is_done() {
            return Poll::Ready(Ok(this.event.value()));
        }

        let (id, epoch) = {
            let mut state = process.borrow_mut();
            state.epoch += 1;
            state.current_wait = Some(Wait {
                event: Rc::downgrade(&this.event.core),
            });
            (state.id, state.epoch)
        };
        this.event.add_callback(Box::new(move |env, at, _value| {
            env.schedule_resume(id, epoch, at);
        }));
        this.registered = true;
        Poll::Pending
    }
}

impl SimEnv {
    /// Creates an event that fires `delay` ticks from now with no payload.
    ///
    /// A zero delay still passes through the scheduler, so it yields to
    /// other entries already queued at the current time.
    pub fn delay(&self, delay: u64) -> Event {
        let at = self.now() + delay;
        let event = Event::new_at(self, at);
        self.schedule_fire(event.clone(), at, "delay");
        event
    }
}
