//! Google Calendar API provider implementation.
//!
//! Creates reminder events on the user's calendar via
//! `calendars/{id}/events`. Shares the auth flow (and therefore the token
//! file) with the Gmail client; the `calendar.events` scope is requested
//! during authorization.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{CalendarProvider, EventRequest};
use crate::auth::OAuthFlow;
use crate::domain::EventId;
use crate::providers::email::ProviderError;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Google Calendar event insert request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertEventRequest {
    summary: String,
    description: String,
    start: EventTime,
    end: EventTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    color_id: Option<String>,
    reminders: Reminders,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: DateTime<Utc>,
    time_zone: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Reminders {
    use_default: bool,
    overrides: Vec<ReminderOverride>,
}

#[derive(Debug, Serialize)]
struct ReminderOverride {
    method: &'static str,
    minutes: i64,
}

/// Google Calendar event insert response.
#[derive(Debug, Deserialize)]
struct InsertEventResponse {
    id: String,
}

/// Maps a color name to a Google Calendar color id.
///
/// Unknown names fall back to lavender ("1").
fn color_id(color: &str) -> &'static str {
    match color.to_lowercase().as_str() {
        "red" => "11",
        "orange" => "6",
        "yellow" => "5",
        "green" => "10",
        "blue" => "1",
        "purple" => "3",
        _ => "1",
    }
}

/// Google Calendar REST client.
pub struct GoogleCalendarClient {
    client: reqwest::Client,
    flow: Arc<OAuthFlow>,
    calendar_id: String,
}

impl GoogleCalendarClient {
    /// Creates a client targeting the given calendar ("primary" for the
    /// authenticated user's default calendar).
    pub fn new(flow: Arc<OAuthFlow>, calendar_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            flow,
            calendar_id: calendar_id.into(),
        }
    }

    /// Browser link for a created event.
    pub fn event_link(event_id: &EventId) -> String {
        format!("https://www.google.com/calendar/event?eid={}", event_id)
    }

    async fn auth_headers(&self) -> Result<HeaderMap, ProviderError> {
        let token = self
            .flow
            .access_token()
            .await
            .map_err(|e| ProviderError::Authentication(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ProviderError::Internal(format!("invalid header: {}", e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn build_insert_request(request: &EventRequest) -> InsertEventRequest {
        InsertEventRequest {
            summary: request.summary.clone(),
            description: request.description.clone(),
            start: EventTime {
                date_time: request.start,
                time_zone: request.timezone.clone(),
            },
            end: EventTime {
                date_time: request.end,
                time_zone: request.timezone.clone(),
            },
            color_id: request.color.as_deref().map(|c| color_id(c).to_string()),
            reminders: Reminders {
                use_default: false,
                overrides: vec![ReminderOverride {
                    method: "popup",
                    minutes: request.reminder_minutes,
                }],
            },
        }
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendarClient {
    async fn create_event(&self, request: &EventRequest) -> Result<EventId, ProviderError> {
        let url = format!(
            "{}/calendars/{}/events",
            CALENDAR_API_BASE, self.calendar_id
        );
        let headers = self.auth_headers().await?;
        let body = Self::build_insert_request(request);

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => ProviderError::Authentication(text),
                429 => ProviderError::RateLimited {
                    retry_after_secs: None,
                },
                _ => ProviderError::Internal(format!("calendar API error ({}): {}", status, text)),
            });
        }

        let created: InsertEventResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("parse event response: {}", e)))?;

        let event_id = EventId::from(created.id);
        tracing::info!(event = %event_id, link = %Self::event_link(&event_id), "created calendar event");
        Ok(event_id)
    }
}
