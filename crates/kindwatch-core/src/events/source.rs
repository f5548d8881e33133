//! Watch sources: the per-kind event streams a controller subscribes to.
//!
//! A [`WatchSource`] opens a new stream each time [`WatchSource::watch`] is
//! called. Items are either events or faults; a fault is reported and the
//! stream keeps going. The stream ending means the source has nothing more
//! to deliver.

use std::sync::Arc;

use futures_util::stream::{self, BoxStream};
use tokio::sync::broadcast;

use crate::error::WatchError;
use crate::resource::{DynResource, Resource, ResourceKind};

use super::types::{WatchEvent, WatchEventType};

/// Default channel capacity for [`ChannelWatchSource`].
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Stream of events and faults produced by one subscription.
pub type WatchStream = BoxStream<'static, Result<WatchEvent, WatchError>>;

/// A source of watch events for one resource kind.
pub trait WatchSource: Send + Sync + 'static {
    /// Kind whose events this source delivers.
    fn kind(&self) -> &ResourceKind;

    /// Open a new subscription.
    ///
    /// Fails when the source cannot be reached; the caller decides whether
    /// to retry.
    fn watch(&self) -> Result<WatchStream, WatchError>;
}

/// Declares the watch sources a controller subscribes to on start.
///
/// Called once per start, so a provider may hand out fresh sources each time.
pub trait WatchSourceProvider: Send + Sync + 'static {
    fn watch_sources(&self) -> Result<Vec<Arc<dyn WatchSource>>, WatchError>;
}

impl WatchSourceProvider for Vec<Arc<dyn WatchSource>> {
    fn watch_sources(&self) -> Result<Vec<Arc<dyn WatchSource>>, WatchError> {
        Ok(self.clone())
    }
}

// ============================================================================
// Channel Watch Source
// ============================================================================

#[derive(Debug, Clone)]
enum Message {
    Event(WatchEvent),
    Fault(String),
}

/// In-process watch source backed by a broadcast channel.
///
/// Every call to [`watch`](WatchSource::watch) opens its own receiver, so
/// events sent before a subscription opens are not seen by it. A receiver
/// that falls behind reports [`WatchError::Lagged`] and continues from the
/// oldest retained event.
///
/// # Example
///
/// ```ignore
/// let widgets = ChannelWatchSource::for_resource::<Widget>();
/// let controller = ResourceController::builder()
///     .with_sources(vec![Arc::new(widgets.clone()) as Arc<dyn WatchSource>])
///     .build()?;
///
/// controller.start().await?;
/// widgets.send_added(Widget::new("w1"));
/// ```
#[derive(Debug, Clone)]
pub struct ChannelWatchSource {
    kind: ResourceKind,
    sender: broadcast::Sender<Message>,
}

impl ChannelWatchSource {
    pub fn new(kind: ResourceKind) -> Self {
        Self::with_capacity(kind, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(kind: ResourceKind, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { kind, sender }
    }

    /// Source for the kind of schema `R`.
    pub fn for_resource<R: Resource>() -> Self {
        Self::new(R::kind())
    }

    /// Send an event to every open subscription.
    ///
    /// Returns the number of subscriptions that received it.
    pub fn send(&self, event: WatchEvent) -> usize {
        self.sender.send(Message::Event(event)).unwrap_or_default()
    }

    pub fn send_added<R: Resource>(&self, resource: R) -> usize {
        self.send_typed(WatchEventType::Added, resource)
    }

    pub fn send_modified<R: Resource>(&self, resource: R) -> usize {
        self.send_typed(WatchEventType::Modified, resource)
    }

    pub fn send_deleted<R: Resource>(&self, resource: R) -> usize {
        self.send_typed(WatchEventType::Deleted, resource)
    }

    /// Send an event under a raw tag, recognized or not.
    pub fn send_raw<R: Resource>(&self, tag: &str, resource: R) -> usize {
        self.send_typed(WatchEventType::from_raw(tag), resource)
    }

    /// Report a fault on every open subscription.
    pub fn send_fault(&self, message: impl Into<String>) -> usize {
        self.sender
            .send(Message::Fault(message.into()))
            .unwrap_or_default()
    }

    /// Number of open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn send_typed<R: Resource>(&self, event_type: WatchEventType, resource: R) -> usize {
        let resource = DynResource::tagged(self.kind.clone(), Arc::new(resource));
        self.send(WatchEvent::new(event_type, Some(resource)))
    }
}

impl WatchSource for ChannelWatchSource {
    fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    fn watch(&self) -> Result<WatchStream, WatchError> {
        let rx = self.sender.subscribe();
        let events = stream::unfold(rx, |mut rx| async move {
            let item = match rx.recv().await {
                Ok(Message::Event(event)) => Ok(event),
                Ok(Message::Fault(message)) => Err(WatchError::Connection(message)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    Err(WatchError::Lagged(skipped))
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            };
            Some((item, rx))
        });
        Ok(Box::pin(events))
    }
}
