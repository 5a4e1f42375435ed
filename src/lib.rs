// CyberQuest - command and query dispatch core
//
// This crate wires configuration, logging and the CQRS buses together for
// services that want a single entry point.

// Re-export member crates
pub use cyberquest_config;
pub use cyberquest_cqrs;

#[cfg(feature = "log")]
pub use cyberquest_log;

pub use cyberquest_config::{ConfigError, ConfigService, FileFormat};
pub use cyberquest_cqrs::*;

use cyberquest_config::DEFAULT_PREFIX;
use std::path::PathBuf;
use tracing::info;

/// Sources consulted by [`bootstrap`].
///
/// Order of precedence, lowest first: `.env` file, process environment,
/// config file.
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub env_prefix: String,
    pub load_dotenv: bool,
    pub dotenv_path: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub config_format: Option<FileFormat>,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            env_prefix: DEFAULT_PREFIX.to_string(),
            load_dotenv: true,
            dotenv_path: None,
            config_file: None,
            config_format: None,
        }
    }
}

impl BootstrapOptions {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip reading a `.env` file
    pub fn without_dotenv(mut self) -> Self {
        self.load_dotenv = false;
        self.dotenv_path = None;
        self
    }

    pub fn with_dotenv(mut self, path: impl Into<PathBuf>) -> Self {
        self.load_dotenv = true;
        self.dotenv_path = Some(path.into());
        self
    }

    /// Config file; the format is detected from the extension unless given
    pub fn with_config_file(
        mut self,
        path: impl Into<PathBuf>,
        format: Option<FileFormat>,
    ) -> Self {
        self.config_file = Some(path.into());
        self.config_format = format;
        self
    }

    /// Load configuration from the configured sources
    pub fn load(&self) -> Result<ConfigService, ConfigError> {
        let mut builder = ConfigService::builder()
            .with_prefix(self.env_prefix.clone())
            .load_env();

        if self.load_dotenv {
            builder = builder.load_dotenv(self.dotenv_path.clone());
        }

        if let Some(ref path) = self.config_file {
            builder = match self.config_format {
                Some(format) => builder.add_file(path.clone(), format),
                None => builder.add_auto_file(path.clone()),
            };
        }

        builder.build()
    }
}

/// Load configuration, install logging and build the buses.
///
/// ```rust,no_run
/// let module = cyberquest::bootstrap(cyberquest::BootstrapOptions::default())?;
/// assert!(module.commands().list_registered().is_empty());
/// # Ok::<(), cyberquest::ConfigError>(())
/// ```
pub fn bootstrap(options: BootstrapOptions) -> Result<CqrsModule, ConfigError> {
    let service = options.load()?;

    #[cfg(feature = "log")]
    cyberquest_log::init();

    let module = CqrsModule::from_config(service.manager())?;
    info!(
        env_prefix = %options.env_prefix,
        config_keys = service.manager().keys().len(),
        "CyberQuest bootstrap complete"
    );
    Ok(module)
}

// Prelude for common imports
pub mod prelude {
    pub use crate::{BootstrapOptions, bootstrap};
    pub use async_trait::async_trait;
    pub use cyberquest_cqrs::{
        BusConfig, Command, CommandBus, CommandError, CommandHandler, CqrsModule,
        DispatchObserver, Message, MessageEnvelope, Query, QueryBus, QueryError, QueryHandler,
        command_handler, query_handler,
    };
}
