//! CQRS (Command Query Responsibility Segregation) for CyberQuest
//!
//! This crate provides the in-process command and query buses that sit
//! between request handling code and the domain handlers.
//!
//! ## Features
//!
//! - **Command Bus** - Route writes to exactly one handler per type tag
//! - **Query Bus** - Route reads to exactly one handler per type tag
//! - **Explicit routing** - Messages carry their type tag in an envelope
//! - **Typed registration** - Handlers are paired with a message type at compile time
//! - **Observability** - `tracing` output and pluggable dispatch observers
//!
//! ## Quick Start
//!
//! ```rust
//! use cyberquest_cqrs::*;
//! use async_trait::async_trait;
//!
//! // Define a command
//! struct CreateSubmission {
//!     envelope: MessageEnvelope,
//!     project_id: String,
//! }
//!
//! impl Message for CreateSubmission {
//!     fn envelope(&self) -> &MessageEnvelope {
//!         &self.envelope
//!     }
//! }
//!
//! impl Command for CreateSubmission {
//!     type Result = String; // Submission ID
//! }
//!
//! // Define command handler
//! struct CreateSubmissionHandler;
//!
//! #[async_trait]
//! impl CommandHandler<CreateSubmission> for CreateSubmissionHandler {
//!     async fn handle(&self, command: CreateSubmission) -> Result<String, CommandError> {
//!         Ok(format!("submission-for-{}", command.project_id))
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let module = CqrsModule::default();
//! module
//!     .commands()
//!     .register::<CreateSubmission, _>("CreateSubmission", CreateSubmissionHandler)
//!     .unwrap();
//!
//! let id = module
//!     .commands()
//!     .execute(CreateSubmission {
//!         envelope: MessageEnvelope::new("CreateSubmission", "tenant-1"),
//!         project_id: "p1".to_string(),
//!     })
//!     .await
//!     .unwrap();
//! assert_eq!(id, "submission-for-p1");
//! # });
//! ```
//!
//! ## Replacement Policy
//!
//! Registering a second handler for a tag replaces the first unless the
//! bus was built with `allow_replace = false`:
//!
//! ```rust,ignore
//! let bus = CommandBus::with_config(BusConfig::default().with_allow_replace(false));
//! bus.register::<CreateSubmission, _>("CreateSubmission", HandlerA)?;
//! assert!(bus.register::<CreateSubmission, _>("CreateSubmission", HandlerB).is_err());
//! ```

pub mod command;
pub mod config;
pub mod envelope;
pub mod module;
pub mod observer;
pub mod query;
pub mod registry;

pub use command::{
    Command, CommandBus, CommandError, CommandHandler, FnCommandHandler, command_handler,
};
pub use config::BusConfig;
pub use envelope::{Message, MessageEnvelope};
pub use module::CqrsModule;
pub use observer::{DispatchObserver, DispatchOutcome, MessageKind, TracingObserver};
pub use query::{FnQueryHandler, Query, QueryBus, QueryError, QueryHandler, query_handler};
pub use registry::{HandlerRegistry, Registration, RegistrationError};
