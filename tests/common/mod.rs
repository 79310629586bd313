//! Shared helpers for integration tests: a timestamped transcript recorder
//! and a small staff item type for store scenarios.

#![allow(dead_code)]

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use tidepool::{Item, SimEnv};

/// Collects `(time, message)` pairs from processes so tests can assert full
/// transcripts.
#[derive(Clone, Default)]
pub struct Recorder {
    entries: Rc<RefCell<Vec<(u64, String)>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self, env: &SimEnv, message: impl Into<String>) {
        self.entries
            .borrow_mut()
            .push((env.now().ticks(), message.into()));
    }

    pub fn entries(&self) -> Vec<(u64, String)> {
        self.entries.borrow().clone()
    }

    pub fn times(&self) -> Vec<u64> {
        self.entries.borrow().iter().map(|(at, _)| *at).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaffItem {
    pub name: String,
    pub id: u32,
    pub role: String,
}

impl StaffItem {
    pub fn new(name: &str, id: u32, role: &str) -> Rc<dyn Item> {
        Rc::new(Self {
            name: name.to_string(),
            id,
            role: role.to_string(),
        })
    }
}

impl Item for StaffItem {
    fn describe(&self) -> String {
        format!("StaffItem({}, id={}, role={})", self.name, self.id, self.role)
    }

    fn clone_item(&self) -> Rc<dyn Item> {
        Rc::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Downcasts an item payload to a [`StaffItem`] reference.
pub fn as_staff(value: &tidepool::Value) -> &StaffItem {
    match value {
        tidepool::Value::Item(item) => item
            .as_any()
            .downcast_ref::<StaffItem>()
            .expect("a StaffItem"),
        other => panic!("expected an item payload, got {other:?}"),
    }
}
