//! Composition root for the command and query buses

use crate::command::CommandBus;
use crate::config::BusConfig;
use crate::observer::DispatchObserver;
use crate::query::QueryBus;
use cyberquest_config::ConfigManager;
use std::sync::Arc;
use tracing::info;

/// One command bus and one query bus built from the same configuration.
///
/// Bootstrap code constructs a module once and hands clones of the buses
/// to whatever needs them. The two registries stay separate.
#[derive(Clone)]
pub struct CqrsModule {
    commands: CommandBus,
    queries: QueryBus,
    config: BusConfig,
}

impl CqrsModule {
    pub fn new(config: BusConfig) -> Self {
        info!(
            allow_replace = config.allow_replace,
            enable_logging = config.enable_logging,
            slow_dispatch_ms = config.slow_dispatch_ms,
            "Creating CQRS module"
        );
        Self {
            commands: CommandBus::with_config(config.clone()),
            queries: QueryBus::with_config(config.clone()),
            config,
        }
    }

    /// Build from a loaded configuration manager
    pub fn from_config(manager: &ConfigManager) -> cyberquest_config::Result<Self> {
        Ok(Self::new(BusConfig::from_config(manager)?))
    }

    /// Attach an observer to both buses
    pub fn with_observer(self, observer: Arc<dyn DispatchObserver>) -> Self {
        Self {
            commands: self.commands.with_observer(observer.clone()),
            queries: self.queries.with_observer(observer),
            config: self.config,
        }
    }

    pub fn commands(&self) -> &CommandBus {
        &self.commands
    }

    pub fn queries(&self) -> &QueryBus {
        &self.queries
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Clear both registries
    pub fn clear(&self) {
        self.commands.clear();
        self.queries.clear();
    }
}

impl std::fmt::Debug for CqrsModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CqrsModule")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for CqrsModule {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}
