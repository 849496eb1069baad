use std::collections::VecDeque;

use crate::models::TrafficEvent;

/// Default number of events retained by the log
pub const DEFAULT_LOG_CAPACITY: usize = 50;

/// Bounded newest-first window of traffic events
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<TrafficEvent>,
    capacity: usize,
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    /// The buffer grows on demand; only the default window is reserved up front
    pub fn with_capacity(capacity: usize) -> Self {
        EventLog {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
            capacity,
        }
    }

    /// Prepend an event, evicting the oldest entries beyond capacity
    pub fn append(&mut self, event: TrafficEvent) {
        self.entries.push_front(event);
        self.entries.truncate(self.capacity);
    }

    /// Events from newest (index 0) to oldest
    pub fn iter(&self) -> impl Iterator<Item = &TrafficEvent> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&TrafficEvent> {
        self.entries.front()
    }

    pub fn snapshot(&self) -> Vec<TrafficEvent> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
