//! Per-instance update registry.
//!
//! One ordered entry list per dependency key; list order is registration
//! order, which the compiler arranges to match document order. Entries are
//! never eagerly removed: a dispatch or a filter pass drops the ones whose
//! validity predicate has gone false.

use std::cell::RefCell;
use std::collections::HashMap;

pub struct UpdateEntry {
    pub is_valid: Box<dyn Fn() -> bool>,
    pub update: Box<dyn FnMut()>,
}

#[derive(Default)]
pub struct UpdateRegistry {
    lists: RefCell<HashMap<String, Vec<UpdateEntry>>>,
}

impl UpdateRegistry {
    pub fn new() -> Self {
        UpdateRegistry::default()
    }

    pub fn push(&self, key: &str, entry: UpdateEntry) {
        self.lists
            .borrow_mut()
            .entry(key.to_string())
            .or_default()
            .push(entry);
    }

    pub fn len(&self, key: &str) -> usize {
        self.lists.borrow().get(key).map(Vec::len).unwrap_or(0)
    }

    /// Drop invalid entries for a key, then run the survivors in order.
    ///
    /// The list is taken out for the duration of the run, so an update that
    /// registers further entries (a loop rebuild does) appends them after the
    /// running batch instead of mutating it underfoot.
    pub fn dispatch(&self, key: &str) {
        let batch = match self.lists.borrow_mut().get_mut(key) {
            Some(list) => std::mem::take(list),
            None => return,
        };
        let mut survivors: Vec<UpdateEntry> = batch
            .into_iter()
            .filter(|entry| (entry.is_valid)())
            .collect();
        for entry in survivors.iter_mut() {
            (entry.update)();
        }
        let mut lists = self.lists.borrow_mut();
        let list = lists.entry(key.to_string()).or_default();
        let registered_during_run = std::mem::take(list);
        *list = survivors;
        list.extend(registered_during_run);
    }

    /// Predicate-filter every list without running any update.
    pub fn filter_all(&self) {
        let mut lists = self.lists.borrow_mut();
        for list in lists.values_mut() {
            list.retain(|entry| (entry.is_valid)());
        }
    }
}
