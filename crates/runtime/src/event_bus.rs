use crate::frame::Frame;

/// Category of a status event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Markers,
    Camera,
    Popup,
    Failover,
    Fetch,
    Geocode,
    Style,
}

/// Non-modal status line produced by the map session.
///
/// Hosts render these as inline status text ("using fallback map",
/// "failed to load businesses", ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub frame_index: u64,
    pub kind: EventKind,
    pub message: String,
}

/// Events retained by default before the oldest are dropped.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Bounded log of status events. Once full, each new event evicts the
/// oldest one; hosts that need every event should `drain` regularly.
#[derive(Debug)]
pub struct EventBus {
    events: Vec<Event>,
    capacity: usize,
    dropped: u64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    pub fn emit(&mut self, frame: Frame, kind: EventKind, message: impl Into<String>) {
        if self.events.len() >= self.capacity {
            let excess = self.events.len() + 1 - self.capacity;
            self.events.drain(..excess);
            self.dropped += excess as u64;
        }
        self.events.push(Event {
            frame_index: frame.index,
            kind,
            message: message.into(),
        });
    }

    /// Events evicted because the bus was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Most recent event of `kind`, if any.
    pub fn latest(&self, kind: EventKind) -> Option<&Event> {
        self.events.iter().rev().find(|e| e.kind == kind)
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}
