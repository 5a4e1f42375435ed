//! Handler registry keyed by type tag

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use thiserror::Error;

/// Registration error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("Type tag must not be empty")]
    EmptyTypeTag,

    #[error("Handler already registered for type tag: {0}")]
    AlreadyRegistered(String),
}

/// What a successful registration did to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// No handler existed for the tag
    Inserted,
    /// A previous handler for the tag was replaced
    Replaced,
}

/// Concurrent map from type tag to exactly one handler.
///
/// Lookups hand out a cloned `Arc`, so no shard lock is held while a
/// handler runs and `register`/`clear` never wait on in-flight dispatches.
pub struct HandlerRegistry<H: ?Sized> {
    handlers: DashMap<String, Arc<H>>,
    allow_replace: bool,
}

impl<H: ?Sized> HandlerRegistry<H> {
    /// Create an empty registry
    pub fn new(allow_replace: bool) -> Self {
        Self {
            handlers: DashMap::new(),
            allow_replace,
        }
    }

    /// Whether re-registering a tag replaces the existing handler
    pub fn allow_replace(&self) -> bool {
        self.allow_replace
    }

    /// Insert or replace the handler for `type_tag`
    pub fn register(
        &self,
        type_tag: &str,
        handler: Arc<H>,
    ) -> Result<Registration, RegistrationError> {
        if type_tag.is_empty() {
            return Err(RegistrationError::EmptyTypeTag);
        }

        match self.handlers.entry(type_tag.to_string()) {
            Entry::Occupied(mut entry) => {
                if !self.allow_replace {
                    return Err(RegistrationError::AlreadyRegistered(type_tag.to_string()));
                }
                entry.insert(handler);
                Ok(Registration::Replaced)
            }
            Entry::Vacant(entry) => {
                entry.insert(handler);
                Ok(Registration::Inserted)
            }
        }
    }

    /// Resolve the handler for `type_tag`
    pub fn get(&self, type_tag: &str) -> Option<Arc<H>> {
        self.handlers
            .get(type_tag)
            .map(|handler| Arc::clone(handler.value()))
    }

    /// Remove the handler for `type_tag`, returning whether one existed
    pub fn unregister(&self, type_tag: &str) -> bool {
        self.handlers.remove(type_tag).is_some()
    }

    pub fn is_registered(&self, type_tag: &str) -> bool {
        self.handlers.contains_key(type_tag)
    }

    /// Snapshot of the registered tags, in no particular order
    pub fn list_registered(&self) -> Vec<String> {
        self.handlers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Remove every handler
    pub fn clear(&self) {
        self.handlers.clear();
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<H: ?Sized> Default for HandlerRegistry<H> {
    fn default() -> Self {
        Self::new(true)
    }
}
