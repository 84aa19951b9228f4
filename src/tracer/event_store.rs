//! Event storage with callbacks and filtering
//!
//! Storing never fails from the caller's point of view: a panicking callback is
//! logged and skipped, and a poisoned lock is recovered.

use super::tracer_events::{EventFilterFn, TracerEvent};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// Callback invoked for every stored event
pub type EventCallback = Arc<dyn Fn(&dyn TracerEvent) + Send + Sync>;

/// Thread-safe store for tracer events
pub struct EventStore {
    events: Mutex<Vec<Box<dyn TracerEvent>>>,
    on_store_callback: Option<EventCallback>,
}

impl EventStore {
    /// Create a new event store with an optional on-store callback
    pub fn new(on_store_callback: Option<EventCallback>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            on_store_callback,
        }
    }

    fn events(&self) -> MutexGuard<'_, Vec<Box<dyn TracerEvent>>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store an event, notifying the callback first
    pub fn store(&self, event: Box<dyn TracerEvent>) {
        if let Some(callback) = &self.on_store_callback {
            if catch_unwind(AssertUnwindSafe(|| callback(event.as_ref()))).is_err() {
                warn!(
                    correlation_id = event.correlation_id(),
                    "Tracer callback panicked, event stored anyway"
                );
            }
        }

        self.events().push(event);
    }

    /// Count events matching the time range and filter
    pub fn count_events(
        &self,
        start_time: Option<f64>,
        end_time: Option<f64>,
        filter_func: Option<&dyn EventFilterFn>,
    ) -> usize {
        self.events()
            .iter()
            .filter(|e| passes(e.as_ref(), start_time, end_time, filter_func))
            .count()
    }

    /// Summaries of events matching the time range and filter, oldest first
    pub fn get_event_summaries(
        &self,
        start_time: Option<f64>,
        end_time: Option<f64>,
        filter_func: Option<&dyn EventFilterFn>,
    ) -> Vec<String> {
        self.events()
            .iter()
            .filter(|e| passes(e.as_ref(), start_time, end_time, filter_func))
            .map(|e| e.printable_summary())
            .collect()
    }

    /// Summaries of the last `n` events matching the filter, oldest first
    pub fn get_last_n_summaries(
        &self,
        n: usize,
        filter_func: Option<&dyn EventFilterFn>,
    ) -> Vec<String> {
        let events = self.events();
        let matching: Vec<&Box<dyn TracerEvent>> =
            events.iter().filter(|e| passes(e.as_ref(), None, None, filter_func)).collect();

        let skip = matching.len().saturating_sub(n);
        matching.into_iter().skip(skip).map(|e| e.printable_summary()).collect()
    }

    pub fn clear(&self) {
        self.events().clear();
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events().is_empty()
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new(None)
    }
}

fn passes(
    event: &dyn TracerEvent,
    start_time: Option<f64>,
    end_time: Option<f64>,
    filter_func: Option<&dyn EventFilterFn>,
) -> bool {
    if start_time.is_some_and(|start| event.timestamp() < start) {
        return false;
    }
    if end_time.is_some_and(|end| event.timestamp() > end) {
        return false;
    }
    filter_func.map_or(true, |filter| filter.matches(event))
}
