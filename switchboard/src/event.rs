use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

/// Universally unique token identifying an `Event` across its lifetime.
/// Fan-out delivery preserves this across the copies it makes for every
/// recipient but one (see `Event::copy_preserving_id`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct EventId(Uuid);

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An addressable message carrying an immutable identifier, a mutable
/// `data` payload of arbitrary shape, a `service` tag used for routing, and
/// a string-keyed header map.
///
/// `data` is `serde_json::Value` rather than a generic payload type:
/// restricting to a serializable schema lets `copy()` be a plain structural
/// clone with no trait bound on callers, instead of requiring every payload
/// type to supply its own clone operation.
#[derive(Clone, Debug)]
pub struct Event {
    id: EventId,
    pub data: Value,
    pub service: Option<String>,
    headers: HashMap<String, String>,
}

impl Event {
    pub fn new(data: Value, service: Option<String>, headers: HashMap<String, String>) -> Self {
        Self {
            id: EventId::new(),
            data,
            service,
            headers,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.headers.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Deep copy producing an independent `Event` with a fresh identifier.
    /// This is the public clone operation; `deepcopy(e).data == e.data` and
    /// `deepcopy(e).data` is not the same allocation as `e.data`.
    pub fn copy(&self) -> Event {
        Event {
            id: EventId::new(),
            data: self.data.clone(),
            service: self.service.clone(),
            headers: self.headers.clone(),
        }
    }

    /// Deep copy preserving the identifier. Used only by fan-out delivery
    /// (`Actor::send_event`) so that every recipient but one sees the same
    /// `EventId`, per the copy-on-fan-out contract: exactly one recipient
    /// holds the original.
    pub(crate) fn copy_preserving_id(&self) -> Event {
        Event {
            id: self.id,
            data: self.data.clone(),
            service: self.service.clone(),
            headers: self.headers.clone(),
        }
    }

    /// Snapshot of `data` taken before a consume call, so a failed delivery
    /// can restore it before `rescue`ing the event (guards against a
    /// partially-mutated payload being re-enqueued).
    pub(crate) fn snapshot_data(&self) -> Value {
        self.data.clone()
    }

    pub(crate) fn restore_data(&mut self, snapshot: Value) {
        self.data = snapshot;
    }
}
