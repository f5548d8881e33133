//! The resource controller: handler registration plus the start/stop lifecycle.

use std::future::Future;
use std::sync::Arc;

use kindwatch_config::ControllerConfig;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::dispatcher::Dispatcher;
use crate::error::ControllerError;
use crate::events::{
    EventClass, HandlerError, HandlerFn, HandlerRegistry, ResourceHandler, WatchSourceProvider,
};
use crate::resource::{Resource, ResourceKind};
use crate::subscription::{Subscription, SubscriptionSet};

/// Whether the controller currently holds live subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    NotRunning,
    Running,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::NotRunning => "not_running",
            RunState::Running => "running",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Default)]
struct Lifecycle {
    run_state: RunState,
    subscriptions: SubscriptionSet,
}

/// Routes watch events from a set of sources to typed handlers.
///
/// Handlers may be registered at any time. `start` opens one subscription per
/// declared watch source; `stop` closes them and waits for in-flight handlers.
/// Dropping the controller releases every subscription.
///
/// A subscription whose stream ended, or that was closed after a contract
/// violation, stays tracked until `stop` or `dispose`. The controller keeps
/// reporting `Running` and [`subscription_count`](Self::subscription_count)
/// still counts it; call `stop` and `start` to reopen the feed.
///
/// # Example
///
/// ```ignore
/// let widgets = ChannelWatchSource::for_resource::<Widget>();
/// let controller = ResourceController::builder()
///     .with_sources(vec![Arc::new(widgets.clone()) as Arc<dyn WatchSource>])
///     .build()?;
///
/// controller.on_created(|w: Arc<Widget>| async move {
///     tracing::info!(name = ?w.name(), "widget created");
///     Ok(())
/// })?;
///
/// controller.start().await?;
/// ```
pub struct ResourceController {
    name: String,
    registry: Arc<HandlerRegistry>,
    dispatcher: Arc<Dispatcher>,
    provider: Arc<dyn WatchSourceProvider>,
    /// Serializes start and stop.
    transition: tokio::sync::Mutex<()>,
    lifecycle: Mutex<Lifecycle>,
}

impl ResourceController {
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::default()
    }

    /// Controller with default settings over `provider`.
    pub fn new(provider: impl WatchSourceProvider) -> Self {
        Self::assemble(
            Arc::new(provider),
            Arc::new(HandlerRegistry::new()),
            ControllerConfig::default(),
        )
    }

    fn assemble(
        provider: Arc<dyn WatchSourceProvider>,
        registry: Arc<HandlerRegistry>,
        settings: ControllerConfig,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::with_timeout(
            Arc::clone(&registry),
            settings.handler_timeout(),
        ));
        Self {
            name: settings.name,
            registry,
            dispatcher,
            provider,
            transition: tokio::sync::Mutex::new(()),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    pub fn register_created_handler<R, H>(
        &self,
        kind: ResourceKind,
        handler: H,
    ) -> Result<(), ControllerError>
    where
        R: Resource,
        H: ResourceHandler<R>,
    {
        self.registry
            .register::<R, H>(kind, EventClass::Created, handler)
    }

    pub fn register_modified_handler<R, H>(
        &self,
        kind: ResourceKind,
        handler: H,
    ) -> Result<(), ControllerError>
    where
        R: Resource,
        H: ResourceHandler<R>,
    {
        self.registry
            .register::<R, H>(kind, EventClass::Modified, handler)
    }

    pub fn register_deleted_handler<R, H>(
        &self,
        kind: ResourceKind,
        handler: H,
    ) -> Result<(), ControllerError>
    where
        R: Resource,
        H: ResourceHandler<R>,
    {
        self.registry
            .register::<R, H>(kind, EventClass::Deleted, handler)
    }

    /// Run `f` for every created resource of schema `R`.
    pub fn on_created<R, F, Fut>(&self, f: F) -> Result<(), ControllerError>
    where
        R: Resource,
        F: Fn(Arc<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.registry
            .register_for::<R, HandlerFn<F>>(EventClass::Created, HandlerFn::new(f))
    }

    /// Run `f` for every modified resource of schema `R`.
    pub fn on_modified<R, F, Fut>(&self, f: F) -> Result<(), ControllerError>
    where
        R: Resource,
        F: Fn(Arc<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.registry
            .register_for::<R, HandlerFn<F>>(EventClass::Modified, HandlerFn::new(f))
    }

    /// Run `f` for every deleted resource of schema `R`.
    pub fn on_deleted<R, F, Fut>(&self, f: F) -> Result<(), ControllerError>
    where
        R: Resource,
        F: Fn(Arc<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.registry
            .register_for::<R, HandlerFn<F>>(EventClass::Deleted, HandlerFn::new(f))
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Open one subscription per declared watch source.
    ///
    /// Either every source is subscribed and the controller is running, or
    /// none is and the error is returned.
    pub async fn start(&self) -> Result<(), ControllerError> {
        let _transition = self.transition.lock().await;
        let running = self.lifecycle.lock().run_state == RunState::Running;
        if running {
            return Err(ControllerError::AlreadyRunning);
        }

        let sources = self
            .provider
            .watch_sources()
            .map_err(ControllerError::Sources)?;
        if sources.is_empty() {
            return Err(ControllerError::NoWatchSources);
        }

        let mut opened = SubscriptionSet::new();
        for source in &sources {
            let kind = source.kind().clone();
            match source.watch() {
                Ok(stream) => opened.insert(Subscription::spawn(
                    kind,
                    stream,
                    Arc::clone(&self.dispatcher),
                    &self.name,
                )),
                Err(err) => {
                    error!(
                        controller = %self.name,
                        kind = %kind,
                        error = %err,
                        opened = opened.len(),
                        "Failed to subscribe to watch source, rolling back start"
                    );
                    opened.shutdown().await;
                    return Err(ControllerError::Subscribe { kind, source: err });
                }
            }
        }

        let count = opened.len();
        {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.subscriptions = opened;
            lifecycle.run_state = RunState::Running;
        }
        info!(controller = %self.name, subscriptions = count, "Controller started");
        Ok(())
    }

    /// Close every subscription and wait for in-flight handlers.
    ///
    /// The controller reports `NotRunning` as soon as the subscriptions are
    /// detached; the call returns once their tasks have exited.
    pub async fn stop(&self) -> Result<(), ControllerError> {
        let _transition = self.transition.lock().await;
        let subscriptions = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.run_state != RunState::Running {
                return Err(ControllerError::NotRunning);
            }
            lifecycle.run_state = RunState::NotRunning;
            std::mem::take(&mut lifecycle.subscriptions)
        };

        let count = subscriptions.len();
        subscriptions.shutdown().await;
        info!(controller = %self.name, subscriptions = count, "Controller stopped");
        Ok(())
    }

    /// Release every subscription without waiting, whatever the run state.
    ///
    /// A handler already running may finish; no new one starts. Safe to call
    /// more than once. The controller may be started again afterwards.
    pub fn dispose(&self) {
        let mut subscriptions = {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.run_state = RunState::NotRunning;
            std::mem::take(&mut lifecycle.subscriptions)
        };
        if !subscriptions.is_empty() {
            debug!(
                controller = %self.name,
                subscriptions = subscriptions.len(),
                "Disposing subscriptions"
            );
        }
        subscriptions.dispose();
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.run_state() == RunState::Running
    }

    pub fn run_state(&self) -> RunState {
        self.lifecycle.lock().run_state
    }

    pub fn subscription_count(&self) -> usize {
        self.lifecycle.lock().subscriptions.len()
    }

    /// Number of (kind, event class) bindings.
    pub fn registered_handlers(&self) -> usize {
        self.registry.len()
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ResourceController {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for ResourceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceController")
            .field("name", &self.name)
            .field("run_state", &self.run_state())
            .field("subscriptions", &self.subscription_count())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`ResourceController`].
#[derive(Default)]
pub struct ControllerBuilder {
    provider: Option<Arc<dyn WatchSourceProvider>>,
    registry: Option<Arc<HandlerRegistry>>,
    settings: ControllerConfig,
}

impl ControllerBuilder {
    /// Declare the watch sources subscribed to on every start.
    pub fn with_sources(mut self, provider: impl WatchSourceProvider) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    pub fn with_source_provider(mut self, provider: Arc<dyn WatchSourceProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Share an existing registry instead of creating an empty one.
    pub fn with_registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_settings(mut self, settings: ControllerConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.settings.name = name.into();
        self
    }

    pub fn build(self) -> Result<ResourceController, ControllerError> {
        let provider = self
            .provider
            .ok_or(ControllerError::MissingCollaborator("watch source provider"))?;
        let registry = self.registry.unwrap_or_default();
        Ok(ResourceController::assemble(
            provider,
            registry,
            self.settings,
        ))
    }
}
