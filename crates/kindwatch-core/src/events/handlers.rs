//! Handler traits for resource lifecycle events.
//!
//! A handler is bound to one (kind, event class) pair and receives the
//! resource already downcast to its concrete schema. Handlers are:
//! - **Async**: awaited by the subscription that delivered the event
//! - **Isolated**: errors, panics and timeouts are logged, never propagated
//! - **Replaceable**: registering again for the same pair overwrites the entry

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::borrow::Cow;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::DispatchError;
use crate::resource::{DynResource, Resource, ResourceKind};

use super::types::EventClass;

/// Error type for handler operations.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Handler execution failed with a message.
    #[error("Handler execution failed: {0}")]
    Execution(String),

    /// Generic error with source.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    /// Create an execution error from a string.
    pub fn execution(msg: impl Into<String>) -> Self {
        HandlerError::Execution(msg.into())
    }
}

// ============================================================================
// Handler Traits
// ============================================================================

/// Typed handler for events on resources of schema `R`.
///
/// # Example
///
/// ```ignore
/// struct WidgetCreated {
///     created: AtomicUsize,
/// }
///
/// #[async_trait]
/// impl ResourceHandler<Widget> for WidgetCreated {
///     async fn handle(&self, widget: Arc<Widget>) -> Result<(), HandlerError> {
///         self.created.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ResourceHandler<R: Resource>: Send + Sync + 'static {
    /// Handle one event for `resource`.
    ///
    /// Further events from the same watch source wait until this returns.
    async fn handle(&self, resource: Arc<R>) -> Result<(), HandlerError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Function-backed handler.
///
/// Wraps a closure that creates a new future per event.
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HandlerFn<F> {
    pub fn new(f: F) -> Self {
        Self::named("handler_fn", f)
    }

    pub fn named(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<R, F, Fut> ResourceHandler<R> for HandlerFn<F>
where
    R: Resource,
    F: Fn(Arc<R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, resource: Arc<R>) -> Result<(), HandlerError> {
        (self.f)(resource).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Type erasure
// ============================================================================

/// Object-safe view of a typed handler.
trait ErasedHandler: Send + Sync {
    fn name(&self) -> &str;

    fn schema(&self) -> &'static str;

    fn call(
        &self,
        resource: &DynResource,
    ) -> Result<BoxFuture<'static, Result<(), HandlerError>>, DispatchError>;
}

struct Typed<R, H> {
    handler: Arc<H>,
    _schema: PhantomData<fn() -> R>,
}

impl<R, H> ErasedHandler for Typed<R, H>
where
    R: Resource,
    H: ResourceHandler<R>,
{
    fn name(&self) -> &str {
        self.handler.name()
    }

    fn schema(&self) -> &'static str {
        std::any::type_name::<R>()
    }

    fn call(
        &self,
        resource: &DynResource,
    ) -> Result<BoxFuture<'static, Result<(), HandlerError>>, DispatchError> {
        let typed = resource
            .downcast::<R>()
            .ok_or_else(|| DispatchError::TypeMismatch {
                kind: resource.kind().clone(),
                expected: std::any::type_name::<R>(),
                actual: resource.type_name(),
            })?;
        let handler = Arc::clone(&self.handler);
        Ok(Box::pin(async move { handler.handle(typed).await }))
    }
}

/// A registered (kind, event class) binding.
///
/// Cheap to clone; the registry hands out clones so no lock is held while the
/// handler runs.
#[derive(Clone)]
pub struct HandlerEntry {
    kind: ResourceKind,
    class: EventClass,
    inner: Arc<dyn ErasedHandler>,
}

impl HandlerEntry {
    pub(crate) fn new<R, H>(kind: ResourceKind, class: EventClass, handler: H) -> Self
    where
        R: Resource,
        H: ResourceHandler<R>,
    {
        Self {
            kind,
            class,
            inner: Arc::new(Typed {
                handler: Arc::new(handler),
                _schema: PhantomData::<fn() -> R>,
            }),
        }
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn class(&self) -> EventClass {
        self.class
    }

    /// Handler name used in logs.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Rust type name of the schema the handler was registered for.
    pub fn schema(&self) -> &'static str {
        self.inner.schema()
    }

    /// Downcasts `resource` and prepares the handler future.
    pub(crate) fn invoke(
        &self,
        resource: &DynResource,
    ) -> Result<BoxFuture<'static, Result<(), HandlerError>>, DispatchError> {
        self.inner.call(resource)
    }
}

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("kind", &self.kind)
            .field("class", &self.class)
            .field("name", &self.name())
            .field("schema", &self.schema())
            .finish()
    }
}
