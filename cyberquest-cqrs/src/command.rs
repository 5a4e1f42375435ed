//! Command handling for CQRS

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

/// Command trait
///
/// Commands represent write operations in CQRS. The envelope's type tag
/// decides which handler runs.
pub trait Command: Message {
    /// Command result type
    type Result: Send + 'static;
}

/// Command handler trait
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    /// Handle the command
    async fn handle(&self, command: C) -> Result<C::Result, CommandError>;
}

#[async_trait]
impl<C: Command, H: CommandHandler<C> + ?Sized> CommandHandler<C> for Arc<H> {
    async fn handle(&self, command: C) -> Result<C::Result, CommandError> {
        (**self).handle(command).await
    }
}

/// Command error
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Handler not found for command: {0}")]
    HandlerNotFound(String),

    #[error("Handler for command '{type_tag}' expects {expected}, got {actual}")]
    TypeMismatch {
        type_tag: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Business rule violation: {0}")]
    BusinessRuleViolation(String),

    #[error(transparent)]
    Handler(Box<dyn std::error::Error + Send + Sync>),
}

impl CommandError {
    /// Wrap a handler's own error type
    pub fn handler(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        CommandError::Handler(Box::new(err))
    }

    /// Wiring defects are never worth retrying
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            CommandError::HandlerNotFound(_) | CommandError::TypeMismatch { .. }
        )
    }
}

/// Adapter turning an async closure into a [`CommandHandler`]
pub struct FnCommandHandler<F>(F);

/// Build a command handler from an async closure
///
/// # Examples
///
/// ```
/// use cyberquest_cqrs::{
///     Command, CommandBus, CommandError, Message, MessageEnvelope, command_handler,
/// };
///
/// struct Ping(MessageEnvelope);
///
/// impl Message for Ping {
///     fn envelope(&self) -> &MessageEnvelope {
///         &self.0
///     }
/// }
///
/// impl Command for Ping {
///     type Result = &'static str;
/// }
///
/// let bus = CommandBus::new();
/// let handler = command_handler(|_cmd: Ping| async { Ok::<_, CommandError>("pong") });
/// bus.register::<Ping, _>("Ping", handler).unwrap();
/// assert!(bus.is_registered("Ping"));
/// ```
pub fn command_handler<F>(f: F) -> FnCommandHandler<F> {
    FnCommandHandler(f)
}

#[async_trait]
impl<C, F, Fut> CommandHandler<C> for FnCommandHandler<F>
where
    C: Command,
    F: Fn(C) -> Fut + Send + Sync,
    Fut: Future<Output = Result<C::Result, CommandError>> + Send,
{
    async fn handle(&self, command: C) -> Result<C::Result, CommandError> {
        (self.0)(command).await
    }
}

/// Type-erased command handler
#[async_trait]
trait DynCommandHandler: Send + Sync {
    /// Downcast to the registered command type and run the handler.
    ///
    /// A command of any other type fails with `TypeMismatch` before the
    /// handler is invoked.
    async fn handle_dyn(
        &self,
        type_tag: &str,
        command: Box<dyn Any + Send>,
        command_type: &'static str,
    ) -> Result<Box<dyn Any + Send>, CommandError>;
}

/// Wrapper for typed command handlers
struct TypedCommandHandler<C: Command, H: CommandHandler<C>> {
    handler: H,
    _phantom: std::marker::PhantomData<C>,
}

impl<C: Command, H: CommandHandler<C>> TypedCommandHandler<C, H> {
    fn new(handler: H) -> Self {
        Self {
            handler,
            _phantom: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<C: Command, H: CommandHandler<C>> DynCommandHandler for TypedCommandHandler<C, H> {
    async fn handle_dyn(
        &self,
        type_tag: &str,
        command: Box<dyn Any + Send>,
        command_type: &'static str,
    ) -> Result<Box<dyn Any + Send>, CommandError> {
        let command = command
            .downcast::<C>()
            .map_err(|_| CommandError::TypeMismatch {
                type_tag: type_tag.to_string(),
                expected: type_name::<C>(),
                actual: command_type,
            })?;

        let result = self.handler.handle(*command).await?;
        Ok(Box::new(result))
    }
}

/// Command bus
///
/// Cloning is cheap; clones share one registry.
#[derive(Clone)]
pub struct CommandBus {
    handlers: Arc<HandlerRegistry<dyn DynCommandHandler>>,
    observers: Observers,
}

impl CommandBus {
    /// Create new command bus
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create command bus with custom config
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

    /// Register a command handler under `type_tag`
    pub fn register<C, H>(
        &self,
        type_tag: impl Into<String>,
        handler: H,
    ) -> Result<(), RegistrationError>
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        let type_tag = type_tag.into();
        let handler: Arc<dyn DynCommandHandler> = Arc::new(TypedCommandHandler::new(handler));

        match self.handlers.register(&type_tag, handler)? {
            Registration::Inserted => {
                debug!(
                    type_tag = %type_tag,
                    command = type_name::<C>(),
                    "Registered command handler"
                );
            }
            Registration::Replaced => {
                warn!(type_tag = %type_tag, command = type_name::<C>(), "Replaced command handler");
            }
        }
        Ok(())
    }

    /// Execute a command
    pub async fn execute<C>(&self, command: C) -> Result<C::Result, CommandError>
    where
        C: Command,
    {
        let envelope = command.envelope().clone();
        let started = Instant::now();
        self.observers.dispatching(MessageKind::Command, &envelope);

        let result = self.dispatch(&envelope, command).await;

        let outcome = match &result {
            Ok(_) => DispatchOutcome::Success,
            Err(CommandError::HandlerNotFound(_)) => DispatchOutcome::HandlerNotFound,
            Err(err) => DispatchOutcome::Failed(err),
        };
        self.observers
            .completed(MessageKind::Command, &envelope, &outcome, started.elapsed());

        result
    }

    async fn dispatch<C>(
        &self,
        envelope: &MessageEnvelope,
        command: C,
    ) -> Result<C::Result, CommandError>
    where
        C: Command,
    {
        let handler = self
            .handlers
            .get(&envelope.type_tag)
            .ok_or_else(|| CommandError::HandlerNotFound(envelope.type_tag.clone()))?;

        let result = handler
            .handle_dyn(&envelope.type_tag, Box::new(command), type_name::<C>())
            .await?;

        // The command type matched, so the result type does too.
        match result.downcast::<C::Result>() {
            Ok(result) => Ok(*result),
            Err(_) => Err(CommandError::ExecutionFailed(
                "Result type mismatch".to_string(),
            )),
        }
    }

    pub fn is_registered(&self, type_tag: &str) -> bool {
        self.handlers.is_registered(type_tag)
    }

    /// Snapshot of registered command tags
    pub fn list_registered(&self) -> Vec<String> {
        self.handlers.list_registered()
    }

    /// Remove the handler for one tag
    pub fn unregister(&self, type_tag: &str) -> bool {
        self.handlers.unregister(type_tag)
    }

    /// Remove every handler; meant for test teardown
    pub fn clear(&self) {
        self.handlers.clear();
        debug!("Cleared command handlers");
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}
