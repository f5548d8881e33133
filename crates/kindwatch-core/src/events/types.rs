//! Watch event types.
//!
//! - `WatchEventType` - the raw tag a watch source attaches to an event
//! - `EventClass` - the handler table an event is routed to
//! - `WatchEvent` - a tagged event paired with its resource

use serde::{Deserialize, Serialize};

use crate::resource::{DynResource, Resource, ResourceKind};

// ============================================================================
// Event Class
// ============================================================================

/// Classification of a lifecycle event, one handler table per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventClass {
    /// Resource was created
    Created,
    /// Resource was modified
    Modified,
    /// Resource was deleted
    Deleted,
}

impl EventClass {
    pub const ALL: [EventClass; 3] = [EventClass::Created, EventClass::Modified, EventClass::Deleted];

    /// Returns the string representation of the event class.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventClass::Created => "created",
            EventClass::Modified => "modified",
            EventClass::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for EventClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Watch Event Type
// ============================================================================

/// Tag attached to a watch event by its source.
///
/// Tags other than `ADDED`, `MODIFIED` and `DELETED` are preserved verbatim in
/// [`WatchEventType::Unknown`] so they can be reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
    Unknown(String),
}

impl WatchEventType {
    /// Parses a raw tag; matching is case-insensitive.
    pub fn from_raw(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("ADDED") {
            WatchEventType::Added
        } else if raw.eq_ignore_ascii_case("MODIFIED") {
            WatchEventType::Modified
        } else if raw.eq_ignore_ascii_case("DELETED") {
            WatchEventType::Deleted
        } else {
            WatchEventType::Unknown(raw.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WatchEventType::Added => "ADDED",
            WatchEventType::Modified => "MODIFIED",
            WatchEventType::Deleted => "DELETED",
            WatchEventType::Unknown(raw) => raw,
        }
    }

    /// Handler table for this tag, or `None` for unrecognized tags.
    pub fn class(&self) -> Option<EventClass> {
        match self {
            WatchEventType::Added => Some(EventClass::Created),
            WatchEventType::Modified => Some(EventClass::Modified),
            WatchEventType::Deleted => Some(EventClass::Deleted),
            WatchEventType::Unknown(_) => None,
        }
    }
}

impl std::fmt::Display for WatchEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for WatchEventType {
    fn from(raw: String) -> Self {
        match WatchEventType::from_raw(&raw) {
            WatchEventType::Unknown(_) => WatchEventType::Unknown(raw),
            known => known,
        }
    }
}

impl From<WatchEventType> for String {
    fn from(event_type: WatchEventType) -> Self {
        match event_type {
            WatchEventType::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

// ============================================================================
// Watch Event
// ============================================================================

/// One event delivered by a watch source.
///
/// `resource` is optional only so that a misbehaving source can be detected;
/// the dispatcher rejects events without one.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub event_type: WatchEventType,
    pub resource: Option<DynResource>,
}

impl WatchEvent {
    pub fn new(event_type: WatchEventType, resource: Option<DynResource>) -> Self {
        Self {
            event_type,
            resource,
        }
    }

    /// Create an "added" event.
    pub fn added<R: Resource>(resource: R) -> Self {
        Self::new(WatchEventType::Added, Some(DynResource::new(resource)))
    }

    /// Create a "modified" event.
    pub fn modified<R: Resource>(resource: R) -> Self {
        Self::new(WatchEventType::Modified, Some(DynResource::new(resource)))
    }

    /// Create a "deleted" event.
    pub fn deleted<R: Resource>(resource: R) -> Self {
        Self::new(WatchEventType::Deleted, Some(DynResource::new(resource)))
    }

    /// Create an event from a raw source tag.
    pub fn raw<R: Resource>(tag: &str, resource: R) -> Self {
        Self::new(WatchEventType::from_raw(tag), Some(DynResource::new(resource)))
    }

    /// Kind of the carried resource, if any.
    pub fn kind(&self) -> Option<&ResourceKind> {
        self.resource.as_ref().map(DynResource::kind)
    }
}
