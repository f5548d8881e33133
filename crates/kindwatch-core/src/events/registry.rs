//! Handler registry for resource lifecycle events.
//!
//! The registry maps each resource kind to three handler slots, one per
//! [`EventClass`]. It is read on every event and written rarely, so it is
//! backed by a sharded concurrent map: lookups clone the entry out and never
//! hold a shard lock while a handler runs.

use dashmap::DashMap;
use tracing::debug;

use crate::error::ControllerError;
use crate::resource::{Resource, ResourceKind};

use super::handlers::{HandlerEntry, ResourceHandler};
use super::types::EventClass;

/// Handlers bound to one kind.
#[derive(Default)]
struct KindHandlers {
    created: Option<HandlerEntry>,
    modified: Option<HandlerEntry>,
    deleted: Option<HandlerEntry>,
}

impl KindHandlers {
    fn slot(&self, class: EventClass) -> &Option<HandlerEntry> {
        match class {
            EventClass::Created => &self.created,
            EventClass::Modified => &self.modified,
            EventClass::Deleted => &self.deleted,
        }
    }

    fn slot_mut(&mut self, class: EventClass) -> &mut Option<HandlerEntry> {
        match class {
            EventClass::Created => &mut self.created,
            EventClass::Modified => &mut self.modified,
            EventClass::Deleted => &mut self.deleted,
        }
    }

    fn len(&self) -> usize {
        EventClass::ALL
            .iter()
            .filter(|class| self.slot(**class).is_some())
            .count()
    }
}

// ============================================================================
// Handler Registry
// ============================================================================

/// Registry of (kind, event class) → handler bindings.
///
/// At most one handler is bound per pair; a later registration replaces the
/// earlier one. Registration is allowed at any time, including while the
/// owning controller runs.
#[derive(Default)]
pub struct HandlerRegistry {
    kinds: DashMap<ResourceKind, KindHandlers>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to (`kind`, `class`).
    ///
    /// `kind` must be non-empty and must be the kind of schema `R`; the
    /// dispatcher relies on this to downcast payloads.
    pub fn register<R, H>(
        &self,
        kind: ResourceKind,
        class: EventClass,
        handler: H,
    ) -> Result<(), ControllerError>
    where
        R: Resource,
        H: ResourceHandler<R>,
    {
        if kind.is_empty() {
            return Err(ControllerError::EmptyKind);
        }
        if kind.as_str() != R::KIND {
            return Err(ControllerError::KindMismatch {
                kind,
                schema: std::any::type_name::<R>(),
                schema_kind: R::KIND,
            });
        }

        let entry = HandlerEntry::new::<R, H>(kind.clone(), class, handler);
        let name = entry.name().to_string();
        let replaced = self
            .kinds
            .entry(kind.clone())
            .or_default()
            .slot_mut(class)
            .replace(entry)
            .is_some();

        if replaced {
            debug!(kind = %kind, event_class = %class, handler = %name, "Replaced handler");
        } else {
            debug!(kind = %kind, event_class = %class, handler = %name, "Registered handler");
        }
        Ok(())
    }

    /// Bind `handler` to (`R::KIND`, `class`).
    pub fn register_for<R, H>(&self, class: EventClass, handler: H) -> Result<(), ControllerError>
    where
        R: Resource,
        H: ResourceHandler<R>,
    {
        self.register::<R, H>(R::kind(), class, handler)
    }

    /// Look up the handler bound to (`kind`, `class`).
    ///
    /// Returns `None` when nothing is bound; that is an expected condition.
    pub fn resolve(&self, kind: &ResourceKind, class: EventClass) -> Option<HandlerEntry> {
        self.kinds
            .get(kind)
            .and_then(|handlers| handlers.slot(class).clone())
    }

    /// Remove the binding for (`kind`, `class`), returning whether one existed.
    pub fn unregister(&self, kind: &ResourceKind, class: EventClass) -> bool {
        let removed = self
            .kinds
            .get_mut(kind)
            .and_then(|mut handlers| handlers.slot_mut(class).take())
            .is_some();
        if removed {
            debug!(kind = %kind, event_class = %class, "Unregistered handler");
        }
        removed
    }

    /// Get the number of bindings.
    pub fn len(&self) -> usize {
        self.kinds.iter().map(|handlers| handlers.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kinds with at least one binding, sorted.
    pub fn kinds(&self) -> Vec<ResourceKind> {
        let mut kinds: Vec<ResourceKind> = self
            .kinds
            .iter()
            .filter(|handlers| handlers.len() > 0)
            .map(|handlers| handlers.key().clone())
            .collect();
        kinds.sort_unstable();
        kinds
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("bindings", &self.len())
            .finish_non_exhaustive()
    }
}
