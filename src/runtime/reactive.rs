//! Observable value wrappers.
//!
//! A `Reactive` is a shared handle over one dynamic value. Scalars are boxed
//! with their previous value; arrays and objects deep-wrap any contained
//! arrays and objects first, then the container. Writes notify consumers on
//! the next frame tick, with multiple synchronous mutations of one wrapper
//! coalescing into a single flush. Primitives suppress the notification when
//! the stored value did not actually change; containers notify on every write
//! or insert.

use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::scheduler::FrameScheduler;

/// Runs on flush; returns false to detach itself.
pub type Consumer = Box<dyn FnMut() -> bool>;

enum Slot {
    Plain(Value),
    Wrapped(Reactive),
}

enum ReactiveData {
    Primitive { value: Value, prev: Value },
    List(Vec<Slot>),
    Map(HashMap<String, Slot>),
}

struct ReactiveInner {
    key: Option<String>,
    data: RefCell<ReactiveData>,
    consumers: RefCell<Vec<Consumer>>,
    /// Names this wrapper has been forwarded under; guards double adoption.
    bound_names: RefCell<HashSet<String>>,
    scheduler: Rc<FrameScheduler>,
    scheduled: Cell<bool>,
}

#[derive(Clone)]
pub struct Reactive {
    inner: Rc<ReactiveInner>,
}

impl Reactive {
    pub fn wrap(value: Value, key: Option<&str>, scheduler: &Rc<FrameScheduler>) -> Reactive {
        Reactive {
            inner: Rc::new(ReactiveInner {
                key: key.map(str::to_string),
                data: RefCell::new(build_data(value, scheduler)),
                consumers: RefCell::new(Vec::new()),
                bound_names: RefCell::new(HashSet::new()),
                scheduler: scheduler.clone(),
                scheduled: Cell::new(false),
            }),
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.inner.key.as_deref()
    }

    pub fn same_wrapper(&self, other: &Reactive) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // reads
    // ───────────────────────────────────────────────────────────────────────────

    /// Deep copy of the current value, nested wrappers unwrapped.
    pub fn snapshot(&self) -> Value {
        match &*self.inner.data.borrow() {
            ReactiveData::Primitive { value, .. } => value.clone(),
            ReactiveData::List(slots) => Value::Array(slots.iter().map(slot_value).collect()),
            ReactiveData::Map(entries) => {
                let mut map = serde_json::Map::new();
                for (name, slot) in entries {
                    map.insert(name.clone(), slot_value(slot));
                }
                Value::Object(map)
            }
        }
    }

    /// Previous scalar value; None for containers.
    pub fn prev(&self) -> Option<Value> {
        match &*self.inner.data.borrow() {
            ReactiveData::Primitive { prev, .. } => Some(prev.clone()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match &*self.inner.data.borrow() {
            ReactiveData::Primitive { .. } => 1,
            ReactiveData::List(slots) => slots.len(),
            ReactiveData::Map(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index(&self, i: usize) -> Option<Value> {
        match &*self.inner.data.borrow() {
            ReactiveData::List(slots) => slots.get(i).map(slot_value),
            _ => None,
        }
    }

    /// Nested wrapper stored at a list index, when the element is a container.
    pub fn wrapped_index(&self, i: usize) -> Option<Reactive> {
        match &*self.inner.data.borrow() {
            ReactiveData::List(slots) => match slots.get(i) {
                Some(Slot::Wrapped(nested)) => Some(nested.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn entry(&self, name: &str) -> Option<Value> {
        match &*self.inner.data.borrow() {
            ReactiveData::Map(entries) => entries.get(name).map(slot_value),
            _ => None,
        }
    }

    pub fn wrapped_entry(&self, name: &str) -> Option<Reactive> {
        match &*self.inner.data.borrow() {
            ReactiveData::Map(entries) => match entries.get(name) {
                Some(Slot::Wrapped(nested)) => Some(nested.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // writes
    // ───────────────────────────────────────────────────────────────────────────

    /// Replace the whole value. Incoming containers are re-wrapped before
    /// storing; a scalar write equal to the stored scalar is a silent no-op.
    pub fn set(&self, incoming: Value) {
        let notify = {
            let mut data = self.inner.data.borrow_mut();
            let incoming_is_container = incoming.is_array() || incoming.is_object();
            match &mut *data {
                ReactiveData::Primitive { value, prev } if !incoming_is_container => {
                    if *value == incoming {
                        false
                    } else {
                        *prev = std::mem::replace(value, incoming);
                        true
                    }
                }
                _ => {
                    *data = build_data(incoming, &self.inner.scheduler);
                    true
                }
            }
        };
        if notify {
            self.notify();
        }
    }

    pub fn push(&self, value: Value) {
        {
            let mut data = self.inner.data.borrow_mut();
            match &mut *data {
                ReactiveData::List(slots) => {
                    slots.push(build_slot(value, &self.inner.scheduler));
                }
                _ => {
                    eprintln!("[rwc] push on a non-list wrapper ignored");
                    return;
                }
            }
        }
        self.notify();
    }

    pub fn set_index(&self, i: usize, value: Value) {
        {
            let mut data = self.inner.data.borrow_mut();
            match &mut *data {
                ReactiveData::List(slots) => {
                    if i >= slots.len() {
                        eprintln!("[rwc] list write out of range: {}", i);
                        return;
                    }
                    slots[i] = build_slot(value, &self.inner.scheduler);
                }
                _ => {
                    eprintln!("[rwc] indexed write on a non-list wrapper ignored");
                    return;
                }
            }
        }
        self.notify();
    }

    pub fn insert(&self, name: &str, value: Value) {
        {
            let mut data = self.inner.data.borrow_mut();
            match &mut *data {
                ReactiveData::Map(entries) => {
                    entries.insert(name.to_string(), build_slot(value, &self.inner.scheduler));
                }
                _ => {
                    eprintln!("[rwc] keyed write on a non-object wrapper ignored");
                    return;
                }
            }
        }
        self.notify();
    }

    // ───────────────────────────────────────────────────────────────────────────
    // consumers and forwarding
    // ───────────────────────────────────────────────────────────────────────────

    pub fn add_consumer(&self, consumer: Consumer) {
        self.inner.consumers.borrow_mut().push(consumer);
    }

    pub fn consumer_count(&self) -> usize {
        self.inner.consumers.borrow().len()
    }

    /// Record a forwarding name; false when the wrapper already carries it.
    pub fn bind_name(&self, name: &str) -> bool {
        self.inner.bound_names.borrow_mut().insert(name.to_string())
    }

    /// Queue a flush unless one is already pending for this wrapper.
    fn notify(&self) {
        if self.inner.scheduled.get() {
            return;
        }
        self.inner.scheduled.set(true);
        let inner = self.inner.clone();
        self.inner.scheduler.schedule(Box::new(move || {
            inner.scheduled.set(false);
            let batch: Vec<Consumer> = inner.consumers.borrow_mut().drain(..).collect();
            let mut kept = Vec::new();
            for mut consumer in batch {
                if consumer() {
                    kept.push(consumer);
                }
            }
            let mut consumers = inner.consumers.borrow_mut();
            let added = std::mem::take(&mut *consumers);
            *consumers = kept;
            consumers.extend(added);
        }));
    }
}

fn build_data(value: Value, scheduler: &Rc<FrameScheduler>) -> ReactiveData {
    match value {
        Value::Array(items) => ReactiveData::List(
            items
                .into_iter()
                .map(|item| build_slot(item, scheduler))
                .collect(),
        ),
        Value::Object(map) => ReactiveData::Map(
            map.into_iter()
                .map(|(name, item)| (name, build_slot(item, scheduler)))
                .collect(),
        ),
        scalar => ReactiveData::Primitive {
            prev: scalar.clone(),
            value: scalar,
        },
    }
}

fn build_slot(value: Value, scheduler: &Rc<FrameScheduler>) -> Slot {
    if value.is_array() || value.is_object() {
        Slot::Wrapped(Reactive::wrap(value, None, scheduler))
    } else {
        Slot::Plain(value)
    }
}

fn slot_value(slot: &Slot) -> Value {
    match slot {
        Slot::Plain(value) => value.clone(),
        Slot::Wrapped(nested) => nested.snapshot(),
    }
}
