//! Event-dispatch core for resource-watching controllers.
//!
//! A [`ResourceController`] subscribes to one [`WatchSource`] per resource
//! kind and routes each `ADDED`, `MODIFIED` or `DELETED` event to the handler
//! registered for that kind and event class. Handlers receive the resource
//! already downcast to its concrete schema.
//!
//! Handler faults are logged and never stop delivery. Events with no handler,
//! or with an unrecognized tag, are logged as warnings and dropped.

pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod resource;
pub mod subscription;

pub use controller::{ControllerBuilder, ResourceController, RunState};
pub use dispatcher::{Delivery, Dispatcher};
pub use error::{ControllerError, DispatchError, WatchError};
pub use events::{
    ChannelWatchSource, EventClass, HandlerEntry, HandlerError, HandlerFn, HandlerRegistry,
    ResourceHandler, WatchEvent, WatchEventType, WatchSource, WatchSourceProvider, WatchStream,
};
pub use resource::{DynResource, Resource, ResourceKind};
pub use subscription::{Subscription, SubscriptionSet};

pub use kindwatch_config as config;
