use foundation::bounds::LngLat;
use foundation::ids::EntityId;

/// Identifier of one mounted popup content instance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentId(pub u64);

/// Rendered popup body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupContent {
    pub instance: ContentId,
    pub html: String,
}

/// The popup currently shown by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupView {
    pub entity_id: EntityId,
    pub anchor: LngLat,
    pub content: PopupContent,
}
