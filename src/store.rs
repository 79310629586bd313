//! Typed store resource: a bounded item buffer with filtered gets and
//! two-level waiter priority.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::env::{SimEnv, WeakSimEnv};
use crate::error::SimResult;
use crate::event::Event;
use crate::value::{Item, Value};

/// Waiter priority class; `High` waiters are served before `Low` waiters,
/// with insertion order preserved inside each class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Default class.
    Low,
    /// Served ahead of every `Low` waiter eligible at the same instant.
    High,
}

/// Predicate a get-waiter applies to candidate items. The filter lives as
/// long as the waiter entry that owns it.
pub type ItemFilter = Box<dyn Fn(&Rc<dyn Item>) -> bool>;

struct GetWaiter {
    event: Event,
    filter: Option<ItemFilter>,
    priority: Priority,
}

struct PutWaiter {
    event: Event,
    item: Rc<dyn Item>,
    priority: Priority,
}

struct StoreCore {
    name: String,
    capacity: usize,
    items: Vec<Rc<dyn Item>>,
    get_waiters: Vec<GetWaiter>,
    put_waiters: Vec<PutWaiter>,
}

/// A bounded buffer of [`Item`]s with filtered, priority-ordered retrieval.
///
/// Puts block while the buffer is full; gets block until an item matching
/// the waiter's filter (or any item, without one) is available. Matching
/// walks waiters High before Low, preserving insertion order inside each
/// class, and scans the buffer in insertion order for the first acceptable
/// item. As with [`Container`](crate::Container), a fulfilled operation
/// wakes the opposite side first when its event fires.
#[derive(Clone)]
pub struct Store {
    env: WeakSimEnv,
    core: Rc<RefCell<StoreCore>>,
}

impl Store {
    /// Creates an empty store with room for `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(env: &SimEnv, capacity: usize) -> Self {
        Self::new_named(env, capacity, "store")
    }

    /// Creates an empty named store; the name appears in traces.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new_named(env: &SimEnv, capacity: usize, name: &str) -> Self {
        assert!(capacity > 0, "store capacity must be positive");
        Self {
            env: env.downgrade(),
            core: Rc::new(RefCell::new(StoreCore {
                name: name.to_string(),
                capacity,
                items: Vec::new(),
                get_waiters: Vec::new(),
                put_waiters: Vec::new(),
            })),
        }
    }

    /// Number of items currently buffered.
    pub fn items_len(&self) -> usize {
        self.core.borrow().items.len()
    }

    /// Capacity this store was created with.
    pub fn capacity(&self) -> usize {
        self.core.borrow().capacity
    }

    /// Name used in traces.
    pub fn name(&self) -> String {
        self.core.borrow().name.clone()
    }

    /// Stores `item`, taking ownership. The returned event fires with the
    /// item once it has been placed into the buffer.
    pub fn put(&self, item: Rc<dyn Item>) -> SimResult<Event> {
        self.put_with(item, Priority::Low)
    }

    /// Stores a deep copy of a borrowed item.
    pub fn put_cloned(&self, item: &dyn Item) -> SimResult<Event> {
        self.put_with(item.clone_item(), Priority::Low)
    }

    /// [`Store::put`] with an explicit waiter priority.
    pub fn put_with(&self, item: Rc<dyn Item>, priority: Priority) -> SimResult<Event> {
        let env = self.env.upgrade()?;
        let event = Event::new(&env);
        {
            let core = Rc::downgrade(&self.core);
            event.add_callback(Box::new(move |env, _at, _value| {
                if let Some(core) = core.upgrade() {
                    trigger_gets(&core, env);
                }
            }));
        }
        self.install_abort_hook(&event, true);
        self.core.borrow_mut().put_waiters.push(PutWaiter {
            event: event.clone(),
            item,
            priority,
        });
        trigger_puts(&self.core, &env);
        Ok(event)
    }

    /// Retrieves the oldest buffered item. The returned event fires with the
    /// removed item, transferring ownership out of the store.
    pub fn get(&self) -> SimResult<Event> {
        self.get_with(None, Priority::Low)
    }

    /// Retrieves the oldest buffered item accepted by `filter`.
    pub fn get_filtered(&self, filter: ItemFilter) -> SimResult<Event> {
        self.get_with(Some(filter), Priority::Low)
    }

    /// [`Store::get`] with an explicit filter and waiter priority.
    pub fn get_with(&self, filter: Option<ItemFilter>, priority: Priority) -> SimResult<Event> {
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
        self.core.borrow_mut().get_waiters.push(GetWaiter {
            event: event.clone(),
            filter,
            priority,
        });
        trigger_gets(&self.core, &env);
        Ok(event)
    }

    fn install_abort_hook(&self, event: &Event, is_put: bool) {
        let weak_core = Rc::downgrade(&self.core);
        let weak_event = Rc::downgrade(&event.core);
        event.set_abort_hook(Box::new(move || {
            let (Some(core), Some(target)) = (weak_core.upgrade(), weak_event.upgrade()) else {
                return;
            };
            let mut core = core.borrow_mut();
            if is_put {
                core.put_waiters
                    .retain(|waiter| !Rc::ptr_eq(&waiter.event.core, &target));
            } else {
                core.get_waiters
                    .retain(|waiter| !Rc::ptr_eq(&waiter.event.core, &target));
            }
        }));
    }
}

fn trigger_puts(core: &Rc<RefCell<StoreCore>>, env: &SimEnv) {
    // High before Low, insertion order inside each class.
    for priority in [Priority::High, Priority::Low] {
        loop {
            let admitted = {
                let mut state = core.borrow_mut();
                if state.items.len() >= state.capacity {
                    None
                } else {
                    let found = state
                        .put_waiters
                        .iter()
                        .position(|waiter| waiter.priority == priority);
                    found.map(|index| {
                        let waiter = state.put_waiters.remove(index);
                        state.items.push(waiter.item.clone());
                        (waiter.event, waiter.item, state.items.len())
                    })
                }
            };
            let Some((event, item, stored)) = admitted else {
                break;
            };
            debug!(store = %core.borrow().name, item = %item.describe(), stored, "put admitted");
            event.admit(env, Value::Item(item));
        }
    }
}

fn trigger_gets(core: &Rc<RefCell<StoreCore>>, env: &SimEnv) {
    for priority in [Priority::High, Priority::Low] {
        loop {
            let admitted = {
                let mut state = core.borrow_mut();
                let mut matched = None;
                for (waiter_index, waiter) in state.get_waiters.iter().enumerate() {
                    if waiter.priority != priority {
                        continue;
                    }
                    // First buffered item the waiter's filter accepts, in
                    // insertion order.
                    let item_index = state.items.iter().position(|item| match &waiter.filter {
                        Some(filter) => filter(item),
                        None => true,
                    });
                    if let Some(item_index) = item_index {
                        matched = Some((waiter_index, item_index));
                        break;
                    }
                }
                matched.map(|(waiter_index, item_index)| {
                    let item = state.items.remove(item_index);
                    let waiter = state.get_waiters.remove(waiter_index);
                    (waiter.event, item)
                })
            };
            let Some((event, item)) = admitted else {
                break;
            };
            debug!(store = %core.borrow().name, item = %item.describe(), "get admitted");
            event.admit(env, Value::Item(item));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    #[derive(Debug, Clone, PartialEq)]
    struct Part {
        name: &'static str,
        id: u32,
    }

    impl Item for Part {
        fn describe(&self) -> String {
            format!("Part({}, id={})", self.name, self.id)
        }

        fn clone_item(&self) -> Rc<dyn Item> {
            Rc::new(self.clone())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn part(name: &'static str, id: u32) -> Rc<dyn Item> {
        Rc::new(Part { name, id })
    }

    fn id_of(value: &Value) -> u32 {
        match value {
            Value::Item(item) => {
                item.as_any().downcast_ref::<Part>().map(|p| p.id).expect("a Part")
            }
            other => panic!("expected an item, got {other:?}"),
        }
    }

    #[test]
    #[should_panic(expected = "capacity must be positive")]
    fn zero_capacity_is_rejected() {
        let env = SimEnv::new();
        let _ = Store::new(&env, 0);
    }

    #[test]
    fn get_returns_oldest_item() {
        let env = SimEnv::new();
        let shelf = Store::new(&env, 4);
        let got = Rc::new(RefCell::new(Vec::new()));

        let task = env.create_task({
            let shelf = shelf.clone();
            let got = got.clone();
            async move {
                shelf.put(part("bolt", 1))?.await?;
                shelf.put(part("nut", 2))?.await?;
                let first = shelf.get()?.await?;
                let second = shelf.get()?.await?;
                got.borrow_mut().push(id_of(&first));
                got.borrow_mut().push(id_of(&second));
                Ok(())
            }
        });
        env.schedule_process(&task, "mover").expect("schedule");
        env.run().expect("run");

        assert_eq!(*got.borrow(), vec![1, 2]);
        assert_eq!(shelf.items_len(), 0);
    }

    #[test]
    fn filter_selects_matching_item() {
        let env = SimEnv::new();
        let shelf = Store::new(&env, 4);
        let got = Rc::new(RefCell::new(Vec::new()));

        let task = env.create_task({
            let shelf = shelf.clone();
            let got = got.clone();
            async move {
                shelf.put(part("bolt", 1))?.await?;
                shelf.put(part("nut", 2))?.await?;
                let matched = shelf
                    .get_filtered(Box::new(|item| {
                        item.as_any()
                            .downcast_ref::<Part>()
                            .is_some_and(|p| p.id == 2)
                    }))?
                    .await?;
                let leftover = shelf.get()?.await?;
                got.borrow_mut().push(id_of(&matched));
                got.borrow_mut().push(id_of(&leftover));
                Ok(())
            }
        });
        env.schedule_process(&task, "picker").expect("schedule");
        env.run().expect("run");

        assert_eq!(*got.borrow(), vec![2, 1]);
    }

    #[test]
    fn filtered_get_waits_for_acceptable_item() {
        let env = SimEnv::new();
        let shelf = Store::new(&env, 4);
        let got_at = Rc::new(RefCell::new(0));

        let picker = env.create_task({
            let env = env.clone();
            let shelf = shelf.clone();
            let got_at = got_at.clone();
            async move {
                let matched = shelf
                    .get_filtered(Box::new(|item| {
                        item.as_any()
                            .downcast_ref::<Part>()
                            .is_some_and(|p| p.name == "gear")
                    }))?
                    .await?;
                assert_eq!(id_of(&matched), 7);
                *got_at.borrow_mut() = env.now().ticks();
                Ok(())
            }
        });
        env.schedule_process(&picker, "picker").expect("schedule");

        let producer = env.create_task({
            let env = env.clone();
            let shelf = shelf.clone();
            async move {
                env.delay(3).await?;
                shelf.put(part("bolt", 1))?.await?;
                env.delay(3).await?;
                shelf.put(part("gear", 7))?.await?;
                Ok(())
            }
        });
        env.schedule_process(&producer, "producer").expect("schedule");
        env.run().expect("run");

        // The bolt at t=3 does not match; the gear at t=6 does.
        assert_eq!(*got_at.borrow(), 6);
        assert_eq!(shelf.items_len(), 1);
    }

    #[test]
    fn high_priority_waiters_are_served_first() {
        let env = SimEnv::new();
        let shelf = Store::new(&env, 2);
        let served = Rc::new(RefCell::new(Vec::new()));

        for (name, priority, start) in [
            ("low", Priority::Low, 0u64),
            ("high", Priority::High, 5),
        ] {
            let task = env.create_task({
                let env = env.clone();
                let shelf = shelf.clone();
                let served = served.clone();
                async move {
                    env.delay(start).await?;
                    let item = shelf.get_with(None, priority)?.await?;
                    served
                        .borrow_mut()
                        .push((env.now().ticks(), name, id_of(&item)));
                    Ok(())
                }
            });
            env.schedule_process(&task, name).expect("schedule");
        }

        let producer = env.create_task({
            let env = env.clone();
            let shelf = shelf.clone();
            async move {
                env.delay(10).await?;
                shelf.put(part("first", 1))?.await?;
                shelf.put(part("second", 2))?.await?;
                Ok(())
            }
        });
        env.schedule_process(&producer, "producer").expect("schedule");
        env.run().expect("run");

        // Despite waiting five ticks less, the high-priority getter receives
        // the first item.
        assert_eq!(
            *served.borrow(),
            vec![(10, "high", 1), (10, "low", 2)]
        );
    }

    #[test]
    fn equal_priority_waiters_keep_insertion_order() {
        let env = SimEnv::new();
        let shelf = Store::new(&env, 4);
        let served = Rc::new(RefCell::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let task = env.create_task({
                let shelf = shelf.clone();
                let served = served.clone();
                async move {
                    let item = shelf.get()?.await?;
                    served.borrow_mut().push((name, id_of(&item)));
                    Ok(())
                }
            });
            env.schedule_process(&task, name).expect("schedule");
        }

        let producer = env.create_task({
            let env = env.clone();
            let shelf = shelf.clone();
            async move {
                env.delay(2).await?;
                for id in 1..=3 {
                    shelf.put(part("part", id))?.await?;
                }
                Ok(())
            }
        });
        env.schedule_process(&producer, "producer").expect("schedule");
        env.run().expect("run");

        assert_eq!(*served.borrow(), vec![("a", 1), ("b", 2), ("c", 3)]);
    }

    #[test]
    fn put_blocks_while_full() {
        let env = SimEnv::new();
        let shelf = Store::new(&env, 1);
        let put_done_at = Rc::new(RefCell::new(0));

        let producer = env.create_task({
            let env = env.clone();
            let shelf = shelf.clone();
            let put_done_at = put_done_at.clone();
            async move {
                shelf.put(part("bolt", 1))?.await?;
                shelf.put(part("nut", 2))?.await?; // full: waits for the get
                *put_done_at.borrow_mut() = env.now().ticks();
                Ok(())
            }
        });
        env.schedule_process(&producer, "producer").expect("schedule");

        let consumer = env.create_task({
            let env = env.clone();
            let shelf = shelf.clone();
            async move {
                env.delay(8).await?;
                shelf.get()?.await?;
                Ok(())
            }
        });
        env.schedule_process(&consumer, "consumer").expect("schedule");
        env.run().expect("run");

        assert_eq!(*put_done_at.borrow(), 8);
        assert_eq!(shelf.items_len(), 1);
    }

    #[test]
    fn put_cloned_stores_a_copy() {
        let env = SimEnv::new();
        let shelf = Store::new(&env, 2);
        let original = Part {
            name: "bolt",
            id: 1,
        };

        let task = env.create_task({
            let shelf = shelf.clone();
            async move {
                shelf.put_cloned(&original)?.await?;
                let out = shelf.get()?.await?;
                // The store hands back an equal copy, not the original.
                match out {
                    Value::Item(item) => {
                        let copy = item.as_any().downcast_ref::<Part>().expect("a Part");
                        assert_eq!(*copy, original);
                    }
                    other => panic!("expected an item, got {other:?}"),
                }
                Ok(())
            }
        });
        env.schedule_process(&task, "cloner").expect("schedule");
        env.run().expect("run");
    }

    #[test]
    fn interrupted_getter_leaves_items_for_others() {
        let env = SimEnv::new();
        let shelf = Store::new(&env, 2);
        let outcome = Rc::new(RefCell::new(Vec::new()));

        let first = env.create_task({
            let shelf = shelf.clone();
            let outcome = outcome.clone();
            async move {
                match shelf.get()?.await {
                    Err(crate::SimError::Interrupted { .. }) => {
                        outcome.borrow_mut().push("interrupted".to_string());
                    }
                    other => panic!("expected interrupt, got {other:?}"),
                }
                Ok(())
            }
        });
        env.schedule_process(&first, "first").expect("schedule");

        let second = env.create_task({
            let shelf = shelf.clone();
            let outcome = outcome.clone();
            async move {
                let item = shelf.get()?.await?;
                outcome.borrow_mut().push(format!("got {}", id_of(&item)));
                Ok(())
            }
        });
        env.schedule_process(&second, "second").expect("schedule");

        let controller = env.create_task({
            let env = env.clone();
            let shelf = shelf.clone();
            let first = first.clone();
            async move {
                env.delay(1).await?;
                first.interrupt(Value::None)?;
                env.delay(1).await?;
                shelf.put(part("bolt", 9))?.await?;
                Ok(())
            }
        });
        env.schedule_process(&controller, "controller")
            .expect("schedule");
        env.run().expect("run");

        // The first getter was dequeued by the interrupt, so the item goes
        // to the second getter even though it queued later.
        assert_eq!(
            *outcome.borrow(),
            vec!["interrupted".to_string(), "got 9".to_string()]
        );
        assert_eq!(shelf.items_len(), 0);
    }
}
