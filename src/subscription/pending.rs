//! Decrements that could not be applied yet.
//!
//! An un-applied decrement keeps a namespace (and a counter) alive forever,
//! so failed decrements are queued here and re-applied by the retry loop
//! until the store accepts them.

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct PendingDecrements {
    topics: Mutex<Vec<String>>,
}

impl PendingDecrements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, topic: &str) {
        self.topics.lock().push(topic.to_string());
    }

    /// Takes every queued decrement, one entry per decrement owed.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.topics.lock())
    }

    pub fn len(&self) -> usize {
        self.topics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.lock().is_empty()
    }
}
