//! Per-build record of compiled stylesheets
//!
//! Records are kept in the order their modules *started* compiling, so the
//! aggregate CSS follows import order even when compiles finish out of order.
//! A module holds an empty slot while it compiles; only filled slots are
//! visible through [`StyleRegistry::records`].

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Last known CSS of one module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleRecord {
    pub id: String,
    pub content: String,
}

/// Shared, ordered map from module id to compiled CSS
///
/// Cloning shares the underlying state; each plugin instance owns its own.
#[derive(Debug, Clone, Default)]
pub struct StyleRegistry {
    slots: Arc<Mutex<IndexMap<String, Option<String>>>>,
}

impl StyleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a position for `id` if it has none yet.
    ///
    /// Returns `true` when a new slot was created.
    pub fn reserve(&self, id: &str) -> bool {
        let mut slots = self.slots.lock();
        if slots.contains_key(id) {
            return false;
        }
        slots.insert(id.to_string(), None);
        true
    }

    /// Store CSS for `id`, keeping its position if it already has one
    pub fn fill(&self, id: &str, content: String) {
        let mut slots = self.slots.lock();
        match slots.get_mut(id) {
            Some(slot) => *slot = Some(content),
            None => {
                slots.insert(id.to_string(), Some(content));
            }
        }
    }

    /// Drop the slot of `id` if it was never filled
    pub fn release(&self, id: &str) {
        let mut slots = self.slots.lock();
        if matches!(slots.get(id), Some(None)) {
            slots.shift_remove(id);
        }
    }

    /// Drop `id` entirely
    pub fn remove(&self, id: &str) {
        self.slots.lock().shift_remove(id);
    }

    pub fn records(&self) -> Vec<StyleRecord> {
        self.slots
            .lock()
            .iter()
            .filter_map(|(id, content)| {
                content.as_ref().map(|content| StyleRecord {
                    id: id.clone(),
                    content: content.clone(),
                })
            })
            .collect()
    }

    /// Concatenation of every filled record, in order, without separators
    pub fn css(&self) -> String {
        self.slots
            .lock()
            .values()
            .flatten()
            .map(String::as_str)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().values().filter(|c| c.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
