//! Email domain types.
//!
//! Represents a fetched email message and related structures. Instances
//! live only for the duration of a triage run; Gmail owns the durable copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AttachmentId, EmailId, LabelId};

/// An email address with optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Email address.
    pub email: String,
    /// Display name (e.g., "John Doe").
    pub name: Option<String>,
}

impl Address {
    /// Creates a new address with just an email.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    /// Creates a new address with email and display name.
    pub fn with_name(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: Some(name.into()),
        }
    }

    /// Parses an address from a header value like `Name <email@example.com>`.
    ///
    /// Bare addresses without angle brackets are accepted as-is.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if let Some(start) = value.find('<') {
            if let Some(end) = value.find('>') {
                let email = value[start + 1..end].trim().to_string();
                let name = value[..start].trim().trim_matches('"').to_string();
                return Self {
                    email,
                    name: if name.is_empty() { None } else { Some(name) },
                };
            }
        }
        Self {
            email: value.to_string(),
            name: None,
        }
    }

    /// Returns the display representation of this address.
    ///
    /// If a name is present, returns "Name <email>", otherwise just the email.
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }

    /// Returns the domain part of the address, if any.
    pub fn domain(&self) -> Option<&str> {
        self.email.split_once('@').map(|(_, d)| d)
    }
}

/// An individual email message as fetched from the mail provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    /// Provider-assigned identifier.
    pub id: EmailId,
    /// Email subject line.
    pub subject: Option<String>,
    /// Sender address.
    pub from: Address,
    /// Primary recipient addresses.
    pub to: Vec<Address>,
    /// Date and time the email was sent.
    pub date: DateTime<Utc>,
    /// Short preview of the email content.
    pub snippet: String,
    /// Plain text body content.
    pub body_text: Option<String>,
    /// HTML body content.
    pub body_html: Option<String>,
    /// Labels applied to this email.
    pub labels: Vec<LabelId>,
    /// File attachments.
    pub attachments: Vec<Attachment>,
    /// Whether the email has been read.
    pub is_read: bool,
}

impl Email {
    /// Returns the subject, or a placeholder for subjectless mail.
    pub fn subject_or_default(&self) -> &str {
        self.subject.as_deref().unwrap_or("(no subject)")
    }

    /// Returns the text used for classification: plain body if present,
    /// falling back to the snippet.
    pub fn classification_text(&self) -> &str {
        self.body_text.as_deref().unwrap_or(&self.snippet)
    }
}

/// A file attachment on a fetched email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Provider-assigned attachment identifier.
    pub id: AttachmentId,
    /// Original filename.
    pub filename: String,
    /// MIME content type.
    pub mime_type: String,
    /// Size in bytes.
    pub size_bytes: u64,
}

impl Attachment {
    /// Whether this attachment may be carried along on a forward.
    ///
    /// Checks the filename extension against an allow-list and the size
    /// against a maximum, both taken from configuration.
    pub fn is_forwardable(&self, allowed_extensions: &[String], max_size_bytes: u64) -> bool {
        if self.size_bytes > max_size_bytes {
            return false;
        }
        let lower = self.filename.to_lowercase();
        allowed_extensions
            .iter()
            .any(|ext| lower.ends_with(&format!(".{}", ext.trim_start_matches('.'))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        vec!["pdf".into(), "csv".into(), ".xlsx".into()]
    }

    #[test]
    fn address_parse_with_name() {
        let addr = Address::parse("Jane Doe <jane@example.com>");
        assert_eq!(addr.email, "jane@example.com");
        assert_eq!(addr.name, Some("Jane Doe".to_string()));
    }

    #[test]
    fn address_parse_quoted_name() {
        let addr = Address::parse("\"Billing, Acme\" <billing@acme.com>");
        assert_eq!(addr.email, "billing@acme.com");
        assert_eq!(addr.name, Some("Billing, Acme".to_string()));
    }

    #[test]
    fn address_parse_bare() {
        let addr = Address::parse("  alerts@bank.example  ");
        assert_eq!(addr.email, "alerts@bank.example");
        assert_eq!(addr.name, None);
    }

    #[test]
    fn address_display_roundtrip() {
        let addr = Address::with_name("test@example.com", "Test User");
        assert_eq!(addr.display(), "Test User <test@example.com>");
        assert_eq!(Address::new("test@example.com").display(), "test@example.com");
    }

    #[test]
    fn address_domain() {
        assert_eq!(Address::new("a@b.example").domain(), Some("b.example"));
        assert_eq!(Address::new("not-an-address").domain(), None);
    }

    #[test]
    fn attachment_forwardable_by_extension() {
        let att = Attachment {
            id: AttachmentId::from("att-1"),
            filename: "Invoice-2024.PDF".to_string(),
            mime_type: "application/pdf".to_string(),
            size_bytes: 1024,
        };
        assert!(att.is_forwardable(&allowed(), 10 * 1024 * 1024));
    }

    #[test]
    fn attachment_rejected_by_extension() {
        let att = Attachment {
            id: AttachmentId::from("att-2"),
            filename: "payload.exe".to_string(),
            mime_type: "application/octet-stream".to_string(),
            size_bytes: 1024,
        };
        assert!(!att.is_forwardable(&allowed(), 10 * 1024 * 1024));
    }

    #[test]
    fn attachment_rejected_by_size() {
        let att = Attachment {
            id: AttachmentId::from("att-3"),
            filename: "big.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            size_bytes: 20 * 1024 * 1024,
        };
        assert!(!att.is_forwardable(&allowed(), 10 * 1024 * 1024));
    }

    #[test]
    fn classification_text_falls_back_to_snippet() {
        let email = Email {
            id: EmailId::from("msg-1"),
            subject: None,
            from: Address::new("a@example.com"),
            to: vec![],
            date: Utc::now(),
            snippet: "preview text".to_string(),
            body_text: None,
            body_html: Some("<p>hi</p>".to_string()),
            labels: vec![LabelId::from("UNREAD")],
            attachments: vec![],
            is_read: false,
        };
        assert_eq!(email.classification_text(), "preview text");
        assert_eq!(email.subject_or_default(), "(no subject)");
    }
}
