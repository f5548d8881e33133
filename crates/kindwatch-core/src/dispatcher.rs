//! Event dispatch: classify, resolve, and run one handler in isolation.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::{error, trace, warn};

use crate::error::{DispatchError, WatchError};
use crate::events::{HandlerError, HandlerRegistry, WatchEvent};
use crate::resource::ResourceKind;

/// Outcome of delivering one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The bound handler ran to completion.
    Handled,
    /// The bound handler failed, panicked or timed out. The fault was logged.
    Faulted,
    /// No handler is bound for the event's (kind, class).
    Unhandled,
    /// The event tag was not recognized.
    Ignored,
}

/// Ways a handler invocation can fault.
#[derive(Debug, thiserror::Error)]
enum HandlerFault {
    #[error(transparent)]
    Failed(HandlerError),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("handler timed out after {0:?}")]
    TimedOut(Duration),
}

impl HandlerFault {
    fn as_label(&self) -> &'static str {
        match self {
            HandlerFault::Failed(_) => "handler_failed",
            HandlerFault::Panicked(_) => "handler_panicked",
            HandlerFault::TimedOut(_) => "handler_timeout",
        }
    }
}

/// Routes watch events to the handlers in a [`HandlerRegistry`].
///
/// Safe to call from many subscriptions at once. Handler faults are logged
/// and swallowed; only contract violations are returned to the caller.
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    handler_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self::with_timeout(registry, None)
    }

    /// Dispatcher that faults any handler running longer than `timeout`.
    pub fn with_timeout(registry: Arc<HandlerRegistry>, timeout: Option<Duration>) -> Self {
        Self {
            registry,
            handler_timeout: timeout,
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout
    }

    /// Deliver one event to the handler bound to its (kind, class).
    ///
    /// Returns an error only for contract violations: an event without a
    /// resource, or a payload that is not the registered schema.
    pub async fn on_event(&self, event: WatchEvent) -> Result<Delivery, DispatchError> {
        let WatchEvent {
            event_type,
            resource,
        } = event;
        let Some(resource) = resource else {
            return Err(DispatchError::MissingResource { event_type });
        };

        let Some(class) = event_type.class() else {
            warn!(
                raw_event_type = %event_type,
                kind = %resource.kind(),
                name = or_null(resource.name()),
                namespace = or_null(resource.namespace()),
                "Unrecognized watch event type, ignoring"
            );
            return Ok(Delivery::Ignored);
        };

        let Some(entry) = self.registry.resolve(resource.kind(), class) else {
            warn!(
                event_class = %class,
                kind = %resource.kind(),
                "No handler registered for event"
            );
            return Ok(Delivery::Unhandled);
        };

        let invocation = entry.invoke(&resource)?;
        match self.run_isolated(invocation).await {
            Ok(()) => {
                trace!(
                    event_class = %class,
                    kind = %resource.kind(),
                    handler = entry.name(),
                    "Handler completed"
                );
                Ok(Delivery::Handled)
            }
            Err(fault) => {
                error!(
                    event_class = %class,
                    kind = %resource.kind(),
                    handler = entry.name(),
                    name = or_null(resource.name()),
                    namespace = or_null(resource.namespace()),
                    fault = fault.as_label(),
                    error = %fault,
                    "Handler failed"
                );
                Ok(Delivery::Faulted)
            }
        }
    }

    /// Report a fault raised by the watch source for `kind`.
    ///
    /// The subscription is not reopened; recovery belongs to the source.
    pub fn on_error(&self, kind: &ResourceKind, fault: &WatchError) {
        error!(kind = %kind, error = %fault, "Watch source fault");
    }

    async fn run_isolated(
        &self,
        invocation: BoxFuture<'static, Result<(), HandlerError>>,
    ) -> Result<(), HandlerFault> {
        let guarded = AssertUnwindSafe(invocation).catch_unwind();
        let outcome = match self.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(HandlerFault::TimedOut(limit)),
            },
            None => guarded.await,
        };

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(HandlerFault::Failed(err)),
            Err(panic) => Err(HandlerFault::Panicked(panic_message(panic.as_ref()))),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("handler_timeout", &self.handler_timeout)
            .finish()
    }
}

fn or_null(value: Option<&str>) -> &str {
    value.unwrap_or("null")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventClass, HandlerFn, WatchEventType};
    use crate::resource::{DynResource, Resource};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Widget;

    impl Resource for Widget {
        const KIND: &'static str = "Widget";

        fn name(&self) -> Option<&str> {
            Some("w1")
        }
    }

    struct Gadget;

    impl Resource for Gadget {
        const KIND: &'static str = "Gadget";

        fn name(&self) -> Option<&str> {
            None
        }
    }

    fn dispatcher_with(
        class: EventClass,
        handler: impl crate::events::ResourceHandler<Widget>,
    ) -> Dispatcher {
        let registry = Arc::new(HandlerRegistry::new());
        registry.register_for::<Widget, _>(class, handler).unwrap();
        Dispatcher::new(registry)
    }

    #[tokio::test]
    async fn test_routes_by_class() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        let dispatcher = dispatcher_with(
            EventClass::Deleted,
            HandlerFn::new(move |_w: Arc<Widget>| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), HandlerError>(())
                }
            }),
        );

        let delivery = dispatcher.on_event(WatchEvent::deleted(Widget)).await.unwrap();
        assert_eq!(delivery, Delivery::Handled);
        let delivery = dispatcher.on_event(WatchEvent::added(Widget)).await.unwrap();
        assert_eq!(delivery, Delivery::Unhandled);
        let delivery = dispatcher
            .on_event(WatchEvent::raw("BOOKMARK", Widget))
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Ignored);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_faults_are_swallowed() {
        let dispatcher = dispatcher_with(
            EventClass::Created,
            HandlerFn::new(|_w: Arc<Widget>| async {
                Err::<(), _>(HandlerError::execution("boom"))
            }),
        );
        let delivery = dispatcher.on_event(WatchEvent::added(Widget)).await.unwrap();
        assert_eq!(delivery, Delivery::Faulted);

        let dispatcher = dispatcher_with(
            EventClass::Created,
            HandlerFn::new(|_w: Arc<Widget>| async {
                if true {
                    panic!("handler blew up");
                }
                Ok::<(), HandlerError>(())
            }),
        );
        let delivery = dispatcher.on_event(WatchEvent::added(Widget)).await.unwrap();
        assert_eq!(delivery, Delivery::Faulted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_fault() {
        let registry = Arc::new(HandlerRegistry::new());
        registry
            .register_for::<Widget, _>(
                EventClass::Modified,
                HandlerFn::new(|_w: Arc<Widget>| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<(), HandlerError>(())
                }),
            )
            .unwrap();
        let dispatcher = Dispatcher::with_timeout(registry, Some(Duration::from_millis(50)));

        let delivery = dispatcher
            .on_event(WatchEvent::modified(Widget))
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Faulted);
    }

    #[tokio::test]
    async fn test_contract_violations_are_returned() {
        let dispatcher = dispatcher_with(
            EventClass::Created,
            HandlerFn::new(|_w: Arc<Widget>| async { Ok::<(), HandlerError>(()) }),
        );

        let err = dispatcher
            .on_event(WatchEvent::new(WatchEventType::Added, None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::MissingResource {
                event_type: WatchEventType::Added
            }
        ));

        let mislabeled = DynResource::tagged(Widget::kind(), Arc::new(Gadget));
        let err = dispatcher
            .on_event(WatchEvent::new(WatchEventType::Added, Some(mislabeled)))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::TypeMismatch { .. }));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");
        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
