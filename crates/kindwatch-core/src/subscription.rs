//! Subscriptions: one task per watch source, pumping events into the dispatcher.
//!
//! Each [`Subscription`] owns a cancellation token and the join handle of its
//! pump task. Cancelling is idempotent. [`Subscription::shutdown`] waits for
//! the in-flight handler to finish; dropping a subscription cancels and aborts
//! the task without waiting.
//!
//! The pump also exits on its own when the stream ends or delivers an event
//! that violates the dispatch contract. The subscription then stays in its
//! set, with [`Subscription::is_finished`] returning `true`, until the set is
//! shut down or disposed. Nothing reopens it.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::dispatcher::Dispatcher;
use crate::events::WatchStream;
use crate::resource::ResourceKind;

/// Feed from one watch source into a [`Dispatcher`].
///
/// A feed whose pump has exited is still tracked; check
/// [`is_finished`](Self::is_finished) to tell it apart from a live one.
pub struct Subscription {
    kind: ResourceKind,
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Spawn the pump task for `stream` on the current runtime.
    pub(crate) fn spawn(
        kind: ResourceKind,
        stream: WatchStream,
        dispatcher: Arc<Dispatcher>,
        controller: &str,
    ) -> Self {
        let token = CancellationToken::new();
        let span = info_span!("subscription", controller = %controller, kind = %kind);
        let join = tokio::spawn(
            pump(kind.clone(), stream, dispatcher, token.clone()).instrument(span),
        );
        Self {
            kind,
            token,
            join: Some(join),
        }
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    /// Request the pump to stop. No new handler invocation starts afterwards.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the pump task has exited.
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancel and wait for the pump task to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(join) = self.join.take() {
            wait(&self.kind, join).await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

async fn wait(kind: &ResourceKind, join: JoinHandle<()>) {
    match join.await {
        Err(err) if err.is_panic() => error!(kind = %kind, "Subscription task panicked"),
        _ => {}
    }
}

async fn pump(
    kind: ResourceKind,
    mut stream: WatchStream,
    dispatcher: Arc<Dispatcher>,
    token: CancellationToken,
) {
    debug!("Subscription opened");
    loop {
        let item = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            item = stream.next() => item,
        };
        let Some(item) = item else {
            warn!("Watch stream ended");
            break;
        };
        if token.is_cancelled() {
            break;
        }

        match item {
            Ok(event) => {
                if let Err(violation) = dispatcher.on_event(event).await {
                    error!(error = %violation, "Watch source contract violated, closing subscription");
                    break;
                }
            }
            Err(fault) => dispatcher.on_error(&kind, &fault),
        }
    }
    debug!("Subscription closed");
}

// ============================================================================
// Subscription Set
// ============================================================================

/// The subscriptions opened by one controller start.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn kinds(&self) -> Vec<ResourceKind> {
        self.subscriptions
            .iter()
            .map(|sub| sub.kind().clone())
            .collect()
    }

    /// Cancel every subscription, then wait for all of them.
    ///
    /// Cancellation is signalled to all tasks before the first join so they
    /// wind down concurrently.
    pub async fn shutdown(mut self) {
        for sub in &self.subscriptions {
            sub.cancel();
        }
        for sub in self.subscriptions.drain(..) {
            sub.shutdown().await;
        }
    }

    /// Cancel and abort every subscription without waiting.
    pub fn dispose(&mut self) {
        for sub in &self.subscriptions {
            sub.cancel();
        }
        self.subscriptions.clear();
    }
}
