use parking_lot::Mutex;
use serde_json::Value;

pub const ELEMENTS_CREATED: &str = "elements-created";
pub const ELEMENTS_UPDATED: &str = "elements-updated";
pub const ELEMENTS_DELETED: &str = "elements-deleted";

/// Fire-and-forget domain event sink. Injected into the engine so deployments
/// can fan events out to webhooks and tests can capture them.
pub trait EventBus: Send + Sync {
    fn emit(&self, event: &str, payload: Value);
}

/// Default bus: one log line per event.
#[derive(Debug, Default)]
pub struct LogBus;

impl EventBus for LogBus {
    fn emit(&self, event: &str, payload: Value) {
        let count = payload.as_array().map(|a| a.len()).unwrap_or(1);
        log::info!("event '{}' emitted ({} records)", event, count);
    }
}

/// Test bus that records every emitted event in order.
#[derive(Debug, Default)]
pub struct CapturingBus {
    events: Mutex<Vec<(String, Value)>>,
}

impl CapturingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<(String, Value)> {
        std::mem::take(&mut self.events.lock())
    }

    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl EventBus for CapturingBus {
    fn emit(&self, event: &str, payload: Value) {
        self.events.lock().push((event.to_string(), payload));
    }
}
