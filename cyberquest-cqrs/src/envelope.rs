//! Message envelope shared by commands and queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope carried by every command and query.
///
/// The bus only reads `type_tag`. The other fields travel with the message
/// for handlers and for log correlation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Caller-assigned message ID
    pub id: String,

    /// Owning tenant
    pub tenant_id: String,

    /// Creation time
    pub timestamp: DateTime<Utc>,

    /// Routing discriminant
    pub type_tag: String,

    /// Optional correlation ID for tracing
    pub correlation_id: Option<String>,
}

impl MessageEnvelope {
    /// Create a new envelope with a random ID and the current time
    ///
    /// # Examples
    ///
    /// ```
    /// use cyberquest_cqrs::MessageEnvelope;
    ///
    /// let envelope = MessageEnvelope::new("CreateSubmission", "tenant-1");
    /// assert_eq!(envelope.type_tag, "CreateSubmission");
    /// assert_eq!(envelope.tenant_id, "tenant-1");
    /// ```
    pub fn new(type_tag: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            timestamp: Utc::now(),
            type_tag: type_tag.into(),
            correlation_id: None,
        }
    }

    /// Set the message ID
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the creation time
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set correlation ID
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Access to the envelope of a message.
pub trait Message: Send + Sync + 'static {
    /// Get the message envelope
    fn envelope(&self) -> &MessageEnvelope;

    /// Get the routing tag
    fn type_tag(&self) -> &str {
        &self.envelope().type_tag
    }
}
