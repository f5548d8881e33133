//! Watch events and their handlers.
//!
//! # Architecture
//!
//! ```text
//! WatchSource ──► Subscription ──► Dispatcher ──► HandlerRegistry
//!  (per kind)      (one task)      (classify)     (kind, class) → handler
//! ```
//!
//! Each watch source yields tagged events for one resource kind. The
//! dispatcher maps the tag to an [`EventClass`], looks up the handler bound
//! to (kind, class) and runs it with the resource downcast to its schema.

pub mod handlers;
pub mod registry;
pub mod source;
pub mod types;

pub use handlers::{HandlerEntry, HandlerError, HandlerFn, ResourceHandler};
pub use registry::HandlerRegistry;
pub use source::{ChannelWatchSource, WatchSource, WatchSourceProvider, WatchStream};
pub use types::{EventClass, WatchEvent, WatchEventType};
