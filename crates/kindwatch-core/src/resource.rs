//! Resource identity and the type-erased payload carried by watch events.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::error::ControllerError;

/// Identity of a resource schema, e.g. `"ConfigMap"` or `"Widget"`.
///
/// Used as the key of every handler table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKind(Cow<'static, str>);

impl ResourceKind {
    /// Wraps a static kind name without validation.
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Creates a kind, rejecting blank names.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Result<Self, ControllerError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ControllerError::EmptyKind);
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for ResourceKind {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A concrete resource schema a handler can be registered for.
///
/// # Example
///
/// ```
/// use kindwatch_core::Resource;
///
/// struct Widget {
///     name: String,
/// }
///
/// impl Resource for Widget {
///     const KIND: &'static str = "Widget";
///
///     fn name(&self) -> Option<&str> {
///         Some(&self.name)
///     }
/// }
///
/// assert_eq!(Widget::kind().as_str(), "Widget");
/// ```
pub trait Resource: Send + Sync + 'static {
    /// Kind shared by every value of this schema.
    const KIND: &'static str;

    /// Object name, if the source supplied one.
    fn name(&self) -> Option<&str>;

    /// Object namespace, if any.
    fn namespace(&self) -> Option<&str> {
        None
    }

    fn kind() -> ResourceKind
    where
        Self: Sized,
    {
        ResourceKind::from_static(Self::KIND)
    }
}

/// A resource whose concrete schema has been erased.
///
/// Name and namespace are captured at construction so diagnostics never need
/// the concrete type.
#[derive(Clone)]
pub struct DynResource {
    kind: ResourceKind,
    name: Option<String>,
    namespace: Option<String>,
    type_name: &'static str,
    payload: Arc<dyn Any + Send + Sync>,
}

impl DynResource {
    pub fn new<R: Resource>(resource: R) -> Self {
        Self::from_arc(Arc::new(resource))
    }

    pub fn from_arc<R: Resource>(resource: Arc<R>) -> Self {
        Self::tagged(R::kind(), resource)
    }

    /// Erases `resource` under a kind chosen by the source rather than the schema.
    ///
    /// Dispatch still checks the payload type against the registered handler.
    pub fn tagged<R: Resource>(kind: ResourceKind, resource: Arc<R>) -> Self {
        Self {
            kind,
            name: resource.name().map(str::to_owned),
            namespace: resource.namespace().map(str::to_owned),
            type_name: std::any::type_name::<R>(),
            payload: resource,
        }
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Rust type name of the erased payload.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<R: Resource>(&self) -> bool {
        self.payload.is::<R>()
    }

    /// Recovers the concrete resource, or `None` if the payload is another type.
    pub fn downcast<R: Resource>(&self) -> Option<Arc<R>> {
        Arc::clone(&self.payload).downcast::<R>().ok()
    }
}

impl fmt::Debug for DynResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynResource")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

impl<R: Resource> From<R> for DynResource {
    fn from(resource: R) -> Self {
        DynResource::new(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget {
        name: String,
    }

    impl Resource for Widget {
        const KIND: &'static str = "Widget";

        fn name(&self) -> Option<&str> {
            Some(&self.name)
        }

        fn namespace(&self) -> Option<&str> {
            Some("default")
        }
    }

    struct Gadget;

    impl Resource for Gadget {
        const KIND: &'static str = "Gadget";

        fn name(&self) -> Option<&str> {
            None
        }
    }

    #[test]
    fn kind_rejects_blank_names() {
        assert!(ResourceKind::new("Widget").is_ok());
        assert!(matches!(ResourceKind::new(""), Err(ControllerError::EmptyKind)));
        assert!(matches!(ResourceKind::new("   "), Err(ControllerError::EmptyKind)));
    }

    #[test]
    fn owned_and_static_kinds_compare_equal() {
        let owned = ResourceKind::new(String::from("Widget")).unwrap();
        assert_eq!(owned, Widget::kind());
    }

    #[test]
    fn dyn_resource_keeps_metadata_and_type() {
        let res = DynResource::new(Widget { name: "w1".into() });
        assert_eq!(res.kind().as_str(), "Widget");
        assert_eq!(res.name(), Some("w1"));
        assert_eq!(res.namespace(), Some("default"));
        assert!(res.is::<Widget>());
        assert!(!res.is::<Gadget>());

        let widget = res.downcast::<Widget>().expect("widget payload");
        assert_eq!(widget.name, "w1");
        assert!(res.downcast::<Gadget>().is_none());
    }

    #[test]
    fn tagged_resource_keeps_source_kind() {
        let res = DynResource::tagged(Widget::kind(), Arc::new(Gadget));
        assert_eq!(res.kind().as_str(), "Widget");
        assert!(res.is::<Gadget>());
        assert_eq!(res.name(), None);
        assert_eq!(res.namespace(), None);
    }
}
