//! Event payloads and the item capability trait.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Capability set for domain objects held by a [`Store`](crate::Store).
///
/// Items are reference-counted trait objects; `clone_item` produces a deep
/// copy for by-value puts, `describe` renders the item for traces, and
/// `as_any` lets store filters downcast to the concrete type.
pub trait Item: fmt::Debug {
    /// Human-readable rendering of the item.
    fn describe(&self) -> String;

    /// Deep copy of the item.
    fn clone_item(&self) -> Rc<dyn Item>;

    /// Typed access for downcasting in store filters.
    fn as_any(&self) -> &dyn Any;
}

/// The payload carried by a fired event.
///
/// Delays fire with [`Value::None`]; a process completion event fires with
/// [`Value::Finish`]; container operations fire with the admitted amount;
/// store gets fire with the removed item; combinators fire with a map from
/// child index to that child's payload.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// No payload.
    #[default]
    None,
    /// Sentinel payload of a completed process.
    Finish,
    /// Integer payload.
    Int(i64),
    /// String payload.
    Str(String),
    /// Map from combinator child index to the child's payload.
    Map(BTreeMap<usize, Value>),
    /// A store item.
    Item(Rc<dyn Item>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Finish, Value::Finish) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            // Items compare by identity: a get hands out the exact item the
            // producer stored.
            (Value::Item(a), Value::Item(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Finish => write!(f, "finish"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (index, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{index}: {value}")?;
                }
                write!(f, "}}")
            }
            Value::Item(item) => write!(f, "{}", item.describe()),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Rc<dyn Item>> for Value {
    fn from(item: Rc<dyn Item>) -> Self {
        Value::Item(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Widget {
        name: String,
    }

    impl Item for Widget {
        fn describe(&self) -> String {
            format!("Widget({})", self.name)
        }

        fn clone_item(&self) -> Rc<dyn Item> {
            Rc::new(self.clone())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn items_compare_by_identity() {
        let widget: Rc<dyn Item> = Rc::new(Widget {
            name: "bolt".into(),
        });
        let same = Value::Item(widget.clone());
        let copy = Value::Item(widget.clone_item());

        assert_eq!(same, Value::Item(widget));
        assert_ne!(same, copy);
    }

    #[test]
    fn display_renders_maps_and_items() {
        let mut entries = BTreeMap::new();
        entries.insert(0, Value::Finish);
        entries.insert(1, Value::Int(7));
        assert_eq!(Value::Map(entries).to_string(), "{0: finish, 1: 7}");

        let widget: Rc<dyn Item> = Rc::new(Widget {
            name: "nut".into(),
        });
        assert_eq!(Value::from(widget).to_string(), "Widget(nut)");
        assert_eq!(Value::from("done").to_string(), "done");
    }
}
