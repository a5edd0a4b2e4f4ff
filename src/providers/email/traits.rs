//! Mail provider trait definition.
//!
//! This module defines the [`MailProvider`] trait which abstracts the mail
//! backend behind the triage pipeline. Production code uses the Gmail REST
//! implementation; tests substitute an in-memory mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Address, AttachmentId, Email, EmailId};

/// Result type alias for mail provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur during mail provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Authentication failed or credentials expired.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network or connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        /// Seconds to wait before retrying, if known.
        retry_after_secs: Option<u64>,
    },

    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid request or parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// The authenticated mailbox owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Address of the authenticated account.
    pub email_address: String,
}

/// An email to be sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingEmail {
    /// Recipient addresses.
    pub to: Vec<Address>,
    /// Email subject.
    pub subject: String,
    /// Plain text body.
    pub body_text: String,
    /// Attachment data.
    pub attachments: Vec<OutgoingAttachment>,
}

impl OutgoingEmail {
    /// Creates a plain-text email to a single recipient.
    pub fn plain(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: vec![Address::new(to)],
            subject: subject.into(),
            body_text: body.into(),
            attachments: Vec::new(),
        }
    }
}

/// An attachment to be sent with an outgoing email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingAttachment {
    /// Filename for the attachment.
    pub filename: String,
    /// MIME content type.
    pub content_type: String,
    /// Raw attachment data.
    #[serde(with = "base64_serde")]
    pub data: Vec<u8>,
}

mod base64_serde {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD
            .decode(&s)
            .map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

/// Trait for mail backend implementations.
///
/// Covers exactly the operations the triage pipeline needs: enumerate the
/// unread queue, fetch messages and attachments, forward, and flip state
/// (read / label / important).
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Returns the authenticated account profile.
    async fn profile(&self) -> Result<Profile>;

    /// Lists unread message ids, newest first, capped at `max`.
    async fn list_unread(&self, max: u32) -> Result<Vec<EmailId>>;

    /// Fetches a full message.
    async fn fetch(&self, id: &EmailId) -> Result<Email>;

    /// Downloads attachment bytes for a message.
    async fn download_attachment(
        &self,
        email_id: &EmailId,
        attachment_id: &AttachmentId,
    ) -> Result<Vec<u8>>;

    /// Sends an email from the authenticated account. Returns the id the
    /// provider assigned to the sent message.
    async fn send(&self, email: &OutgoingEmail) -> Result<EmailId>;

    /// Removes the unread marker from a message.
    async fn mark_read(&self, id: &EmailId) -> Result<()>;

    /// Applies a named label, creating it on first use.
    async fn add_label(&self, id: &EmailId, name: &str) -> Result<()>;

    /// Marks a message as important.
    async fn mark_important(&self, id: &EmailId) -> Result<()>;
}
