//! Event combinators: all-of and any-of composition.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::env::{SimEnv, WeakSimEnv};
use crate::event::{Event, EventCore};
use crate::value::Value;

struct AllOfState {
    env: WeakSimEnv,
    event: Weak<RefCell<EventCore>>,
    remaining: usize,
    values: BTreeMap<usize, Value>,
}

/// Composes `children` into an event that fires once all of them have fired.
///
/// The composite fires at the last child's fire time with a
/// [`Value::Map`] from child index to that child's payload. Children that
/// are already done are counted immediately; passing the same event twice
/// counts it once per occurrence. With no children the composite fires
/// immediately at the current time.
///
/// Child callbacks hold only a weak reference back to the composite, so
/// dropping it (or interrupting a process that waits on it) leaves the
/// children untouched and makes their later firings harmless.
pub fn all_of(env: &SimEnv, children: &[Event]) -> Event {
    let event = Event::new(env);
    if children.is_empty() {
        event.succeed_with(env, Value::Map(BTreeMap::new()));
        return event;
    }
    let state = Rc::new(RefCell::new(AllOfState {
        env: env.downgrade(),
        event: Rc::downgrade(&event.core),
        remaining: children.len(),
        values: BTreeMap::new(),
    }));
    event.set_keepalive(state.clone());
    for (index, child) in children.iter().enumerate() {
        if child.is_done() {
            count_child(&state, index, child.value(), env);
        } else {
            let weak = Rc::downgrade(&state);
            child.add_callback(Box::new(move |env, _at, value| {
                if let Some(state) = weak.upgrade() {
                    count_child(&state, index, value.clone(), env);
                }
            }));
        }
    }
    event
}

fn count_child(state: &Rc<RefCell<AllOfState>>, index: usize, value: Value, env: &SimEnv) {
    let finished = {
        let mut state = state.borrow_mut();
        state.values.insert(index, value);
        state.remaining -= 1;
        state.remaining == 0
    };
    if !finished {
        return;
    }
    let (weak_env, core) = {
        let state = state.borrow();
        (state.env.clone(), state.event.clone())
    };
    if let Some(core) = core.upgrade() {
        let values = std::mem::take(&mut state.borrow_mut().values);
        let event = Event {
            env: weak_env,
            core,
        };
        event.succeed_with(env, Value::Map(values));
    }
}

struct AnyOfState {
    env: WeakSimEnv,
    event: Weak<RefCell<EventCore>>,
    triggered: bool,
}

/// Composes `children` into an event that fires as soon as any one of them
/// fires.
///
/// The composite fires at the earliest child's fire time with a single-entry
/// [`Value::Map`] identifying the winning child by index. A `triggered`
/// latch makes the remaining children's callbacks no-ops, so a late firing
/// cannot re-fire the composite. With no children the composite fires
/// immediately at the current time.
pub fn any_of(env: &SimEnv, children: &[Event]) -> Event {
    let event = Event::new(env);
    if children.is_empty() {
        event.succeed_with(env, Value::Map(BTreeMap::new()));
        return event;
    }
    let state = Rc::new(RefCell::new(AnyOfState {
        env: env.downgrade(),
        event: Rc::downgrade(&event.core),
        triggered: false,
    }));
    event.set_keepalive(state.clone());
    for (index, child) in children.iter().enumerate() {
        if child.is_done() {
            trigger_winner(&state, index, child.value(), env);
            break;
        }
        let weak = Rc::downgrade(&state);
        child.add_callback(Box::new(move |env, _at, value| {
            if let Some(state) = weak.upgrade() {
                trigger_winner(&state, index, value.clone(), env);
            }
        }));
    }
    event
}

fn trigger_winner(state: &Rc<RefCell<AnyOfState>>, index: usize, value: Value, env: &SimEnv) {
    {
        let mut state = state.borrow_mut();
        if state.triggered {
            return;
        }
        state.triggered = true;
    }
    let (weak_env, core) = {
        let state = state.borrow();
        (state.env.clone(), state.event.clone())
    };
    if let Some(core) = core.upgrade() {
        let event = Event {
            env: weak_env,
            core,
        };
        event.succeed_with(env, Value::Map(BTreeMap::from([(index, value)])));
    }
}
