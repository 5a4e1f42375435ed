//! Dispatch observability hooks

use crate::config::BusConfig;
use crate::envelope::MessageEnvelope;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Which bus a message went through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Command,
    Query,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Command => "command",
            MessageKind::Query => "query",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a dispatch ended
#[derive(Debug)]
pub enum DispatchOutcome<'a> {
    /// Handler returned a value
    Success,
    /// No handler registered for the tag
    HandlerNotFound,
    /// Handler or pairing failure
    Failed(&'a (dyn std::error::Error + Send + Sync)),
}

impl DispatchOutcome<'_> {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success)
    }
}

/// Observer notified around every dispatch.
///
/// Hooks are synchronous and cannot change the dispatch result. A panic
/// inside a hook is caught and logged.
pub trait DispatchObserver: Send + Sync {
    /// Called before the handler is resolved
    fn on_dispatch(&self, _kind: MessageKind, _envelope: &MessageEnvelope) {}

    /// Called once the dispatch has a result
    fn on_complete(
        &self,
        _kind: MessageKind,
        _envelope: &MessageEnvelope,
        _outcome: &DispatchOutcome<'_>,
        _elapsed: Duration,
    ) {
    }
}

/// Observer that writes dispatches to `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingObserver {
    slow_threshold: Option<Duration>,
}

impl TracingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log dispatches slower than `threshold` at warn level
    pub fn with_slow_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.slow_threshold = threshold;
        self
    }
}

impl DispatchObserver for TracingObserver {
    fn on_dispatch(&self, kind: MessageKind, envelope: &MessageEnvelope) {
        debug!(
            kind = %kind,
            type_tag = %envelope.type_tag,
            message_id = %envelope.id,
            tenant_id = %envelope.tenant_id,
            correlation_id = ?envelope.correlation_id,
            "Dispatching message"
        );
    }

    fn on_complete(
        &self,
        kind: MessageKind,
        envelope: &MessageEnvelope,
        outcome: &DispatchOutcome<'_>,
        elapsed: Duration,
    ) {
        let elapsed_ms = elapsed.as_millis() as u64;

        match outcome {
            DispatchOutcome::Success => {
                debug!(
                    kind = %kind,
                    type_tag = %envelope.type_tag,
                    message_id = %envelope.id,
                    elapsed_ms,
                    "Message handled"
                );
            }
            DispatchOutcome::HandlerNotFound => {
                warn!(
                    kind = %kind,
                    type_tag = %envelope.type_tag,
                    message_id = %envelope.id,
                    "No handler registered"
                );
            }
            DispatchOutcome::Failed(err) => {
                error!(
                    kind = %kind,
                    type_tag = %envelope.type_tag,
                    message_id = %envelope.id,
                    tenant_id = %envelope.tenant_id,
                    elapsed_ms,
                    error = %err,
                    "Handler failed"
                );
            }
        }

        if let Some(threshold) = self.slow_threshold {
            if elapsed > threshold {
                warn!(
                    kind = %kind,
                    type_tag = %envelope.type_tag,
                    message_id = %envelope.id,
                    elapsed_ms,
                    threshold_ms = threshold.as_millis() as u64,
                    "Slow dispatch"
                );
            }
        }
    }
}

/// Observer list shared by clones of a bus
#[derive(Clone, Default)]
pub(crate) struct Observers(Arc<Vec<Arc<dyn DispatchObserver>>>);

impl Observers {
    pub(crate) fn from_config(config: &BusConfig) -> Self {
        let mut observers = Self::default();
        if config.enable_logging {
            observers.push(Arc::new(
                TracingObserver::new().with_slow_threshold(config.slow_dispatch_threshold()),
            ));
        }
        observers
    }

    pub(crate) fn push(&mut self, observer: Arc<dyn DispatchObserver>) {
        Arc::make_mut(&mut self.0).push(observer);
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn dispatching(&self, kind: MessageKind, envelope: &MessageEnvelope) {
        self.each(|observer| observer.on_dispatch(kind, envelope));
    }

    pub(crate) fn completed(
        &self,
        kind: MessageKind,
        envelope: &MessageEnvelope,
        outcome: &DispatchOutcome<'_>,
        elapsed: Duration,
    ) {
        self.each(|observer| observer.on_complete(kind, envelope, outcome, elapsed));
    }

    fn each(&self, f: impl Fn(&dyn DispatchObserver)) {
        for observer in self.0.iter() {
            if catch_unwind(AssertUnwindSafe(|| f(observer.as_ref()))).is_err() {
                error!("Dispatch observer panicked");
            }
        }
    }
}
