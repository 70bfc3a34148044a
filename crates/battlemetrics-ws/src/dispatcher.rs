//! Fire-and-forget delivery of envelopes to the application handler
//!
//! Every envelope is handed to the handler on tokio's blocking pool, so a
//! slow or blocking handler never occupies a runtime worker and never stalls
//! the receive pump. Invocations may run in any order relative to each
//! other. A panicking handler is logged and counted; the panic never reaches
//! the pump.

use battlemetrics_types::Envelope;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, trace};

/// Application callback for decoded, non-ack envelopes
pub trait Handler: Send + Sync + 'static {
    /// Handle one envelope
    fn handle(&self, envelope: Envelope);
}

impl<F> Handler for F
where
    F: Fn(Envelope) + Send + Sync + 'static,
{
    fn handle(&self, envelope: Envelope) {
        self(envelope)
    }
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    failed: AtomicU64,
}

/// Hands envelopes to a [`Handler`] without blocking the caller
#[derive(Clone)]
pub struct Dispatcher {
    handler: Arc<dyn Handler>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("dispatched", &self.dispatched())
            .field("failed", &self.failed())
            .finish()
    }
}

impl Dispatcher {
    /// Wrap a handler
    pub fn new(handler: impl Handler) -> Self {
        Self {
            handler: Arc::new(handler),
            counters: Arc::default(),
        }
    }

    /// Spawn the handler for one envelope and return immediately
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, envelope: Envelope) {
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        let handler = Arc::clone(&self.handler);
        let counters = Arc::clone(&self.counters);

        tokio::task::spawn_blocking(move || {
            let id = envelope.id.clone();
            trace!(%id, "Dispatching envelope");
            if catch_unwind(AssertUnwindSafe(|| handler.handle(envelope))).is_err() {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(%id, "Message handler panicked; envelope dropped");
            }
        });
    }

    /// Number of envelopes handed out so far
    pub fn dispatched(&self) -> u64 {
        self.counters.dispatched.load(Ordering::Relaxed)
    }

    /// Number of handler invocations that panicked
    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }
}
