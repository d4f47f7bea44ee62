use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use edutrack_events::{EventEnvelope, Subscription};

use crate::dispatcher::{Dispatcher, Outcome};
use crate::document_store::DocumentStore;

/// Redeliveries the worker performs for a redeliverable outcome before
/// dropping the envelope.
pub const DEFAULT_MAX_REDELIVERIES: u32 = 3;

/// Outcome counters of a running worker.
#[derive(Debug, Default)]
pub struct WorkerStats {
    completed: AtomicU64,
    unbound: AtomicU64,
    failed: AtomicU64,
    redelivered: AtomicU64,
}

impl WorkerStats {
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn unbound(&self) -> u64 {
        self.unbound.load(Ordering::SeqCst)
    }

    /// Envelopes given up on (terminal failure or redeliveries exhausted).
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn redelivered(&self) -> u64 {
        self.redelivered.load(Ordering::SeqCst)
    }

    /// Envelopes that reached a final outcome.
    pub fn settled(&self) -> u64 {
        self.completed() + self.unbound() + self.failed()
    }
}

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
    stats: Arc<WorkerStats>,
}

impl WorkerHandle {
    pub fn stats(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }

    /// Stop taking new envelopes, wait for in-flight dispatches, then return.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(err) = self.join.await {
            error!(error = %err, "propagation worker task panicked");
        }
    }
}

/// Background consumer of the change feed.
///
/// - Subscribes to envelopes (at-least-once, unordered)
/// - Dispatches each envelope as its own task, so one slow cleanup never
///   holds up unrelated events
/// - Redelivers envelopes whose outcome is redeliverable, up to a bound
/// - Supports graceful shutdown
#[derive(Debug)]
pub struct PropagationWorker;

impl PropagationWorker {
    pub fn spawn<S>(dispatcher: Arc<Dispatcher<S>>, subscription: Subscription<EventEnvelope>) -> WorkerHandle
    where
        S: DocumentStore + Clone + 'static,
    {
        Self::spawn_with(dispatcher, subscription, DEFAULT_MAX_REDELIVERIES)
    }

    pub fn spawn_with<S>(
        dispatcher: Arc<Dispatcher<S>>,
        subscription: Subscription<EventEnvelope>,
        max_redeliveries: u32,
    ) -> WorkerHandle
    where
        S: DocumentStore + Clone + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stats = Arc::new(WorkerStats::default());

        let join = tokio::spawn(worker_loop(
            dispatcher,
            subscription,
            shutdown_rx,
            stats.clone(),
            max_redeliveries,
        ));

        WorkerHandle {
            shutdown: Some(shutdown_tx),
            join,
            stats,
        }
    }
}

async fn worker_loop<S>(
    dispatcher: Arc<Dispatcher<S>>,
    mut subscription: Subscription<EventEnvelope>,
    mut shutdown_rx: oneshot::Receiver<()>,
    stats: Arc<WorkerStats>,
    max_redeliveries: u32,
) where
    S: DocumentStore + Clone + 'static,
{
    let mut in_flight = JoinSet::new();
    info!(bindings = dispatcher.registry().len(), "propagation worker started");

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            next = subscription.recv() => {
                let Some(envelope) = next else { break };
                in_flight.spawn(deliver(
                    dispatcher.clone(),
                    envelope,
                    stats.clone(),
                    max_redeliveries,
                ));
            }
            Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(err) = done {
                    error!(error = %err, "dispatch task panicked");
                }
            }
        }
    }

    while let Some(done) = in_flight.join_next().await {
        if let Err(err) = done {
            error!(error = %err, "dispatch task panicked");
        }
    }
    info!(
        completed = stats.completed(),
        failed = stats.failed(),
        "propagation worker stopped"
    );
}

async fn deliver<S>(
    dispatcher: Arc<Dispatcher<S>>,
    mut envelope: EventEnvelope,
    stats: Arc<WorkerStats>,
    max_redeliveries: u32,
) where
    S: DocumentStore + Clone,
{
    loop {
        let outcome = dispatcher.dispatch(&envelope).await;
        match outcome {
            Outcome::Completed { .. } => {
                stats.completed.fetch_add(1, Ordering::SeqCst);
                return;
            }
            Outcome::Unbound => {
                stats.unbound.fetch_add(1, Ordering::SeqCst);
                return;
            }
            ref o if o.is_redeliverable() && envelope.delivery().attempt <= max_redeliveries => {
                stats.redelivered.fetch_add(1, Ordering::SeqCst);
                envelope = envelope.redelivered();
                debug!(
                    event_id = %envelope.event_id(),
                    attempt = envelope.delivery().attempt,
                    "redelivering envelope"
                );
            }
            _ => {
                stats.failed.fetch_add(1, Ordering::SeqCst);
                warn!(
                    event_id = %envelope.event_id(),
                    collection = %envelope.collection(),
                    entity_id = %envelope.entity_id(),
                    kind = %envelope.kind(),
                    attempt = envelope.delivery().attempt,
                    "envelope dropped after failed propagation"
                );
                return;
            }
        }
    }
}
