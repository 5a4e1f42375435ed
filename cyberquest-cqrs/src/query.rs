//! Query handling for CQRS

use crate::config::BusConfig;
use crate::envelope::{Message, MessageEnvelope};
use crate::observer::{DispatchObserver, DispatchOutcome, MessageKind, Observers};
use crate::registry::{HandlerRegistry, Registration, RegistrationError};
use async_trait::async_trait;
use std::any::{Any, type_name};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

/// Query trait
///
/// Queries represent read operations in CQRS. Handlers are expected not to
/// change state; the bus does not enforce it.
pub trait Query: Message {
    /// Query result type
    type Result: Send + 'static;
}

/// Query handler trait
#[async_trait]
pub trait QueryHandler<Q: Query>: Send + Sync {
    /// Handle the query
    async fn handle(&self, query: Q) -> Result<Q::Result, QueryError>;
}

#[async_trait]
impl<Q: Query, H: QueryHandler<Q> + ?Sized> QueryHandler<Q> for Arc<H> {
    async fn handle(&self, query: Q) -> Result<Q::Result, QueryError> {
        (**self).handle(query).await
    }
}

/// Query error
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Query execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Handler not found for query: {0}")]
    HandlerNotFound(String),

    #[error("Handler for query '{type_tag}' expects {expected}, got {actual}")]
    TypeMismatch {
        type_tag: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Data not found: {0}")]
    NotFound(String),

    #[error("Invalid query parameters: {0}")]
    InvalidParameters(String),

    #[error(transparent)]
    Handler(Box<dyn std::error::Error + Send + Sync>),
}

impl QueryError {
    /// Wrap a handler's own error type
    pub fn handler(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        QueryError::Handler(Box::new(err))
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            QueryError::HandlerNotFound(_) | QueryError::TypeMismatch { .. }
        )
    }
}

/// Adapter turning an async closure into a [`QueryHandler`]
pub struct FnQueryHandler<F>(F);

/// Build a query handler from an async closure
pub fn query_handler<F>(f: F) -> FnQueryHandler<F> {
    FnQueryHandler(f)
}

#[async_trait]
impl<Q, F, Fut> QueryHandler<Q> for FnQueryHandler<F>
where
    Q: Query,
    F: Fn(Q) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Q::Result, QueryError>> + Send,
{
    async fn handle(&self, query: Q) -> Result<Q::Result, QueryError> {
        (self.0)(query).await
    }
}

/// Type-erased query handler
#[async_trait]
trait DynQueryHandler: Send + Sync {
    /// Downcast to the registered query type and run the handler.
    ///
    /// A query of any other type fails with `TypeMismatch` before the
    /// handler is invoked.
    async fn handle_dyn(
        &self,
        type_tag: &str,
        query: Box<dyn Any + Send>,
        query_type: &'static str,
    ) -> Result<Box<dyn Any + Send>, QueryError>;
}

/// Wrapper for typed query handlers
struct TypedQueryHandler<Q: Query, H: QueryHandler<Q>> {
    handler: H,
    _phantom: std::marker::PhantomData<Q>,
}

impl<Q: Query, H: QueryHandler<Q>> TypedQueryHandler<Q, H> {
    fn new(handler: H) -> Self {
        Self {
            handler,
            _phantom: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<Q: Query, H: QueryHandler<Q>> DynQueryHandler for TypedQueryHandler<Q, H> {
    async fn handle_dyn(
        &self,
        type_tag: &str,
        query: Box<dyn Any + Send>,
        query_type: &'static str,
    ) -> Result<Box<dyn Any + Send>, QueryError> {
        let query = query
            .downcast::<Q>()
            .map_err(|_| QueryError::TypeMismatch {
                type_tag: type_tag.to_string(),
                expected: type_name::<Q>(),
                actual: query_type,
            })?;

        let result = self.handler.handle(*query).await?;
        Ok(Box::new(result))
    }
}

/// Query bus
///
/// Holds its own registry; a tag registered here is invisible to the
/// command bus.
#[derive(Clone)]
pub struct QueryBus {
    handlers: Arc<HandlerRegistry<dyn DynQueryHandler>>,
    observers: Observers,
}

impl QueryBus {
    /// Create new query bus
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create query bus with custom config
    pub fn with_config(config: BusConfig) -> Self {
        Self {
            handlers: Arc::new(HandlerRegistry::new(config.allow_replace)),
            observers: Observers::from_config(&config),
        }
    }

    /// Add a dispatch observer
    pub fn with_observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Register a query handler under `type_tag`
    pub fn register<Q, H>(
        &self,
        type_tag: impl Into<String>,
        handler: H,
    ) -> Result<(), RegistrationError>
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
    {
        let type_tag = type_tag.into();
        let handler: Arc<dyn DynQueryHandler> = Arc::new(TypedQueryHandler::new(handler));

        match self.handlers.register(&type_tag, handler)? {
            Registration::Inserted => {
                debug!(
                    type_tag = %type_tag,
                    query = type_name::<Q>(),
                    "Registered query handler"
                );
            }
            Registration::Replaced => {
                warn!(type_tag = %type_tag, query = type_name::<Q>(), "Replaced query handler");
            }
        }
        Ok(())
    }

    /// Execute a query
    pub async fn execute<Q>(&self, query: Q) -> Result<Q::Result, QueryError>
    where
        Q: Query,
    {
        let envelope = query.envelope().clone();
        let started = Instant::now();
        self.observers.dispatching(MessageKind::Query, &envelope);

        let result = self.dispatch(&envelope, query).await;

        let outcome = match &result {
            Ok(_) => DispatchOutcome::Success,
            Err(QueryError::HandlerNotFound(_)) => DispatchOutcome::HandlerNotFound,
            Err(err) => DispatchOutcome::Failed(err),
        };
        self.observers
            .completed(MessageKind::Query, &envelope, &outcome, started.elapsed());

        result
    }

    async fn dispatch<Q>(
        &self,
        envelope: &MessageEnvelope,
        query: Q,
    ) -> Result<Q::Result, QueryError>
    where
        Q: Query,
    {
        let handler = self
            .handlers
            .get(&envelope.type_tag)
            .ok_or_else(|| QueryError::HandlerNotFound(envelope.type_tag.clone()))?;

        let result = handler
            .handle_dyn(&envelope.type_tag, Box::new(query), type_name::<Q>())
            .await?;

        // The query type matched, so the result type does too.
        match result.downcast::<Q::Result>() {
            Ok(result) => Ok(*result),
            Err(_) => Err(QueryError::ExecutionFailed("Result type mismatch".to_string())),
        }
    }

    pub fn is_registered(&self, type_tag: &str) -> bool {
        self.handlers.is_registered(type_tag)
    }

    /// Snapshot of registered query tags
    pub fn list_registered(&self) -> Vec<String> {
        self.handlers.list_registered()
    }

    pub fn unregister(&self, type_tag: &str) -> bool {
        self.handlers.unregister(type_tag)
    }

    /// Remove every handler; meant for test teardown
    pub fn clear(&self) {
        self.handlers.clear();
        debug!("Cleared query handlers");
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for QueryBus {
    fn default() -> Self {
        Self::new()
    }
}
