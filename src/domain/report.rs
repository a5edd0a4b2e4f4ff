//! Per-run report aggregation.
//!
//! A [`RunReport`] is built incrementally while the triage pipeline walks
//! the unread queue, then rendered and discarded. Nothing here persists
//! beyond the HTML file written at the end of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Address, EmailId, EventId, Priority};

/// The outcome of triaging one email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageOutcome {
    /// Which email this outcome describes.
    pub email_id: EmailId,
    /// Subject line (or placeholder).
    pub subject: String,
    /// Original sender.
    pub from: Address,
    /// When the email was sent.
    pub date: DateTime<Utc>,
    /// Final category set after routing.
    pub categories: Vec<String>,
    /// Effective priority after resolution.
    pub priority: Priority,
    /// Addresses the email was forwarded to.
    pub forwarded_to: Vec<String>,
    /// Action items extracted by the model.
    pub action_items: Vec<String>,
    /// Key points extracted by the model.
    pub key_points: Vec<String>,
    /// Calendar event created for this email, if any.
    pub event_id: Option<EventId>,
    /// Spam flag from classification.
    pub spam: bool,
    /// Sales-pitch flag from classification.
    pub sales_pitch: bool,
    /// Alert flag from classification.
    pub alert: bool,
}

/// An email's action items grouped for the consolidated report section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItemGroup {
    pub subject: String,
    pub from: String,
    pub priority: Priority,
    pub items: Vec<String>,
}

/// Aggregated results of a single triage run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id for this run.
    pub run_id: uuid::Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished; set by [`finish`](Self::finish).
    pub finished_at: Option<DateTime<Utc>>,
    /// Emails examined (fetched from the unread queue).
    pub processed: u32,
    /// Forward operations that succeeded.
    pub forwarded: u32,
    /// Emails skipped by the spam gate.
    pub skipped_spam: u32,
    /// Emails abandoned because of per-email errors.
    pub errors: u32,
    /// Emails per category, including the default category.
    pub category_counts: BTreeMap<String, u32>,
    /// Per-email detail, in processing order.
    pub outcomes: Vec<TriageOutcome>,
}

impl RunReport {
    /// Starts an empty report stamped with the current time.
    pub fn start() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            processed: 0,
            forwarded: 0,
            skipped_spam: 0,
            errors: 0,
            category_counts: BTreeMap::new(),
            outcomes: Vec::new(),
        }
    }

    /// Records a completed outcome, updating counters.
    pub fn record(&mut self, outcome: TriageOutcome) {
        self.processed += 1;
        self.forwarded += outcome.forwarded_to.len() as u32;
        for category in &outcome.categories {
            *self.category_counts.entry(category.clone()).or_insert(0) += 1;
        }
        self.outcomes.push(outcome);
    }

    /// Records an email skipped by the spam gate.
    pub fn record_spam_skip(&mut self) {
        self.processed += 1;
        self.skipped_spam += 1;
        *self.category_counts.entry("spam".to_string()).or_insert(0) += 1;
    }

    /// Records an email abandoned due to an error.
    pub fn record_error(&mut self) {
        self.processed += 1;
        self.errors += 1;
    }

    /// Stamps the end of the run.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Consolidated action items across all outcomes, most urgent first.
    /// Outcomes without action items are omitted.
    pub fn action_items(&self) -> Vec<ActionItemGroup> {
        let mut groups: Vec<ActionItemGroup> = self
            .outcomes
            .iter()
            .filter(|o| !o.action_items.is_empty())
            .map(|o| ActionItemGroup {
                subject: o.subject.clone(),
                from: o.from.display(),
                priority: o.priority,
                items: o.action_items.clone(),
            })
            .collect();
        groups.sort_by(|a, b| b.priority.cmp(&a.priority));
        groups
    }
}
