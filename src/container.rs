//! Fungible container resource: a capacity-bounded integer level with
//! FIFO put/get waiter queues.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::debug;

use crate::env::{SimEnv, WeakSimEnv};
use crate::error::{SimError, SimResult};
use crate::event::Event;
use crate::value::Value;

struct ContainerCore {
    name: String,
    capacity: i64,
    level: i64,
    put_waiters: VecDeque<(Event, i64)>,
    get_waiters: VecDeque<(Event, i64)>,
}

/// A fungible resource holding an integer level between zero and a fixed
/// capacity.
///
/// [`Container::put`] and [`Container::get`] return events that fire once
/// the operation has been admitted; the level is adjusted before the event
/// fires. Admission is greedy from the front of each FIFO queue and stops at
/// the first waiter that cannot be satisfied, so an oversized request at the
/// head blocks the requests behind it. When an admitted operation fires, it
/// first re-triggers the opposite side — the side whose precondition just
/// improved — before the admitted process resumes.
#[derive(Clone)]
pub struct Container {
    env: WeakSimEnv,
    core: Rc<RefCell<ContainerCore>>,
}

impl Container {
    /// Creates an empty container with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not positive.
    pub fn new(env: &SimEnv, capacity: i64) -> Self {
        Self::new_named(env, capacity, "container")
    }

    /// Creates an empty named container; the name appears in traces.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not positive.
    pub fn new_named(env: &SimEnv, capacity: i64, name: &str) -> Self {
        assert!(capacity > 0, "container capacity must be positive");
        Self {
            env: env.downgrade(),
            core: Rc::new(RefCell::new(ContainerCore {
                name: name.to_string(),
                capacity,
                level: 0,
                put_waiters: VecDeque::new(),
                get_waiters: VecDeque::new(),
            })),
        }
    }

    /// Current level snapshot.
    pub fn level(&self) -> i64 {
        self.core.borrow().level
    }

    /// Capacity this container was created with.
    pub fn capacity(&self) -> i64 {
        self.core.borrow().capacity
    }

    /// Name used in traces.
    pub fn name(&self) -> String {
        self.core.borrow().name.clone()
    }

    /// Requests to add `amount` to the level; the returned event fires once
    /// the put has been admitted, with the amount as payload.
    ///
    /// Non-positive amounts and puts larger than the capacity (which could
    /// never be admitted) are rejected at submission.
    pub fn put(&self, amount: i64) -> SimResult<Event> {
        if amount <= 0 {
            return Err(SimError::InvalidAmount { amount });
        }
        let capacity = self.core.borrow().capacity;
        if amount > capacity {
            return Err(SimError::NeverAdmissible { amount, capacity });
        }
        let env = self.env.upgrade()?;
        let event = Event::new(&env);
        // Cross-side wake: a fulfilled put raises the level, so gets are the
        // side to retry when this event fires, ahead of the putter's resume.
        {
            let core = Rc::downgrade(&self.core);
            event.add_callback(Box::new(move |env, _at, _value| {
                if let Some(core) = core.upgrade() {
                    trigger_gets(&core, env);
                }
            }));
        }
        self.install_abort_hook(&event, true);
        self.core
            .borrow_mut()
            .put_waiters
            .push_back((event.clone(), amount));
        trigger_puts(&self.core, &env);
        Ok(event)
    }

    /// Requests to remove `amount` from the level; the returned event fires
    /// once the get has been admitted, with the amount as payload.
    ///
    /// Non-positive amounts are rejected at submission.
    pub fn get(&self, amount: i64) -> SimResult<Event> {
        if amount <= 0 {
            return Err(SimError::InvalidAmount { amount });
        }
        let env = self.env.upgrade()?;
        let event = Event::new(&env);
        {
            let core = Rc::downgrade(&self.core);
            event.add_callback(Box::new(move |env, _at, _value| {
                if let Some(core) = core.upgrade() {
                    trigger_puts(&core, env);
                }
            }));
        }
        self.install_abort_hook(&event, false);
        self.core
            .borrow_mut()
            .get_waiters
            .push_back((event.clone(), amount));
        trigger_gets(&self.core, &env);
        Ok(event)
    }

    /// Interrupted waiters must vanish from their queue so that later
    /// admissions skip them.
    fn install_abort_hook(&self, event: &Event, is_put: bool) {
        let weak_core = Rc::downgrade(&self.core);
        let weak_event = Rc::downgrade(&event.core);
        event.set_abort_hook(Box::new(move || {
            let (Some(core), Some(target)) = (weak_core.upgrade(), weak_event.upgrade()) else {
                return;
            };
            let mut core = core.borrow_mut();
            let queue = if is_put {
                &mut core.put_waiters
            } else {
                &mut core.get_waiters
            };
            queue.retain(|(event, _)| !Rc::ptr_eq(&event.core, &target));
        }));
    }
}

fn trigger_puts(core: &Rc<RefCell<ContainerCore>>, env: &SimEnv) {
    // Greedy from the front: stop at the first waiter that does not fit.
    loop {
        let admitted = {
            let mut state = core.borrow_mut();
            let can = matches!(
                state.put_waiters.front(),
                Some((_, amount)) if state.level + *amount <= state.capacity
            );
            if !can {
                None
            } else if let Some((event, amount)) = state.put_waiters.pop_front() {
                state.level += amount;
                Some((event, amount, state.level))
            } else {
                None
            }
        };
        let Some((event, amount, level)) = admitted else {
            break;
        };
        debug!(container = %core.borrow().name, amount, level, "put admitted");
        event.admit(env, Value::Int(amount));
    }
}

fn trigger_gets(core: &Rc<RefCell<ContainerCore>>, env: &SimEnv) {
    loop {
        let admitted = {
            let mut state = core.borrow_mut();
            let can = matches!(
                state.get_waiters.front(),
                Some((_, amount)) if *amount <= state.level
            );
            if !can {
                None
            } else if let Some((event, amount)) = state.get_waiters.pop_front() {
                state.level -= amount;
                Some((event, amount, state.level))
            } else {
                None
            }
        };
        let Some((event, amount, level)) = admitted else {
            break;
        };
        debug!(container = %core.borrow().name, amount, level, "get admitted");
        event.admit(env, Value::Int(amount));
    }
}
