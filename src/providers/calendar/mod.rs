//! Calendar provider implementations.
//!
//! Reminder events for emails with action items are created through the
//! [`CalendarProvider`] trait; [`GoogleCalendarClient`] is the only
//! production implementation.

mod google;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use google::GoogleCalendarClient;

use crate::domain::EventId;
use crate::providers::email::ProviderError;

/// A calendar event to be created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRequest {
    /// Event title.
    pub summary: String,
    /// Event body text.
    pub description: String,
    /// Start time.
    pub start: DateTime<Utc>,
    /// End time.
    pub end: DateTime<Utc>,
    /// IANA timezone name for display.
    pub timezone: String,
    /// Color name (red, orange, yellow, green, blue, purple).
    pub color: Option<String>,
    /// Popup reminder lead time in minutes.
    pub reminder_minutes: i64,
}

/// Trait for calendar backends.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Creates an event and returns its id.
    async fn create_event(&self, request: &EventRequest) -> Result<EventId, ProviderError>;
}
