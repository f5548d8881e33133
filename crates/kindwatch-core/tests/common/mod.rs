//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kindwatch_core::{ChannelWatchSource, Resource, ResourceController, WatchSource};
use parking_lot::Mutex;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;

// ============================================================================
// Resources
// ============================================================================

#[derive(Debug, Clone)]
pub struct Widget {
    pub name: String,
    pub namespace: Option<String>,
    pub replicas: u32,
}

impl Widget {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: Some("default".to_string()),
            replicas: 1,
        }
    }
}

impl Resource for Widget {
    const KIND: &'static str = "Widget";

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Gadget {
    pub name: Option<String>,
}

impl Gadget {
    pub fn new(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
        }
    }
}

impl Resource for Gadget {
    const KIND: &'static str = "Gadget";

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Controller over the given channel sources.
pub fn controller(sources: &[&ChannelWatchSource]) -> ResourceController {
    let sources: Vec<Arc<dyn WatchSource>> = sources
        .iter()
        .map(|source| Arc::new((*source).clone()) as Arc<dyn WatchSource>)
        .collect();
    ResourceController::builder()
        .with_sources(sources)
        .with_name("test")
        .build()
        .expect("controller builds")
}

// ============================================================================
// Log capture
// ============================================================================

/// One captured tracing event.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: tracing::Level,
    pub message: String,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Events recorded by a [`CaptureLayer`].
#[derive(Debug, Clone, Default)]
pub struct Captured {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl Captured {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().clone()
    }

    pub fn at(&self, level: tracing::Level) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.level == level)
            .cloned()
            .collect()
    }

    pub fn count(&self, level: tracing::Level, pred: impl Fn(&CapturedEvent) -> bool) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.level == level && pred(event))
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

struct CaptureLayer {
    captured: Captured,
}

impl<S> Layer<S> for CaptureLayer
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.captured.events.lock().push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: HashMap<String, String>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let formatted = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(formatted);
        } else {
            self.fields.insert(field.name().to_string(), formatted);
        }
    }
}

/// Install a capturing subscriber for the current thread.
///
/// Tests using this must run on a current-thread runtime so spawned
/// subscription tasks log into the same subscriber.
pub fn capture() -> (DefaultGuard, Captured) {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::registry().with(CaptureLayer {
        captured: captured.clone(),
    });
    let guard = tracing::subscriber::set_default(subscriber);
    (guard, captured)
}

// ============================================================================
// Timing helpers
// ============================================================================

/// Poll `check` until it holds, failing the test after five seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached within 5s");
}

/// Give spawned subscription tasks time to drain their queues.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Run `fut` with a five second ceiling.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("finished within 5s")
}
