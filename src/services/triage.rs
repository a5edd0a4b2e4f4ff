//! The per-run triage pipeline.
//!
//! Strictly sequential: list the unread queue, then for each message fetch,
//! classify, route, forward, create reminders, relabel, and mark read.
//! Every per-email failure is logged and counted, never fatal; only being
//! unable to list the queue aborts a run.

use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::domain::{
    Classification, Email, EventId, RuleSet, RunReport, TriageOutcome,
};
use crate::providers::calendar::{CalendarProvider, EventRequest};
use crate::providers::email::{
    MailProvider, OutgoingAttachment, OutgoingEmail, ProviderError,
};
use crate::services::classifier::Classifier;
use crate::services::router::{route, RoutingDecision};

/// Errors that abort an entire run.
#[derive(Debug, Error)]
pub enum TriageError {
    /// The unread queue could not be listed at all.
    #[error("cannot list unread messages: {0}")]
    List(#[from] ProviderError),
}

/// Orchestrates one triage run over the unread queue.
pub struct TriagePipeline<M: MailProvider> {
    mail: M,
    classifier: Classifier,
    calendar: Option<Box<dyn CalendarProvider>>,
    settings: Settings,
    rules: RuleSet,
    dry_run: bool,
}

impl<M: MailProvider> TriagePipeline<M> {
    pub fn new(
        mail: M,
        classifier: Classifier,
        calendar: Option<Box<dyn CalendarProvider>>,
        settings: Settings,
    ) -> Self {
        let rules = settings.ruleset();
        Self {
            mail,
            classifier,
            calendar,
            settings,
            rules,
            dry_run: false,
        }
    }

    /// Classify and route only; skip every mutation (no forwards, labels,
    /// reminders, or read-state changes).
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Access to the underlying mail provider (for report delivery).
    pub fn mail(&self) -> &M {
        &self.mail
    }

    /// Runs the pipeline over at most `max_emails` unread messages.
    pub async fn run(&self, max_emails: u32) -> Result<RunReport, TriageError> {
        let mut report = RunReport::start();
        let ids = self.mail.list_unread(max_emails).await?;
        info!(
            count = ids.len(),
            model = %self.classifier.model_label(),
            dry_run = self.dry_run,
            "starting triage run"
        );

        let pacing = pacing_delay(self.settings.gmail.requests_per_minute);

        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(pacing).await;
            }

            let email = match self.mail.fetch(id).await {
                Ok(email) => email,
                Err(e) => {
                    error!(email = %id, error = %e, "failed to fetch message, skipping");
                    report.record_error();
                    continue;
                }
            };

            self.triage_one(email, &mut report).await;
        }

        report.finish();
        info!(
            processed = report.processed,
            forwarded = report.forwarded,
            spam = report.skipped_spam,
            errors = report.errors,
            "triage run complete"
        );
        Ok(report)
    }

    /// Triages a single fetched email. Never fails the run.
    async fn triage_one(&self, email: Email, report: &mut RunReport) {
        info!(email = %email.id, subject = %email.subject_or_default(), "processing email");

        // A failed model call downgrades to the default classification so
        // the keyword/sender heuristics can still route the email.
        let classification = match self.classifier.classify(&email, &self.rules).await {
            Ok(c) => c,
            Err(e) => {
                warn!(email = %email.id, error = %e, "classification failed, using default");
                Classification::default()
            }
        };

        let decision = route(&email, &classification, &self.rules);

        // Spam gate: flagged spam is dropped unless a rule named "spam"
        // is enabled to handle it.
        if classification.spam && !self.rules.has_enabled("spam") {
            info!(email = %email.id, "skipping spam email");
            if !self.dry_run {
                if let Err(e) = self.mail.mark_read(&email.id).await {
                    warn!(email = %email.id, error = %e, "failed to mark spam as read");
                }
            }
            report.record_spam_skip();
            return;
        }

        let forwarded_to = self.forward(&email, &classification, &decision).await;
        let event_id = self.create_reminders(&email, &classification, &decision).await;
        self.apply_markers(&email, &decision).await;

        report.record(TriageOutcome {
            email_id: email.id.clone(),
            subject: email.subject_or_default().to_string(),
            from: email.from.clone(),
            date: email.date,
            categories: decision.categories,
            priority: decision.priority,
            forwarded_to,
            action_items: classification.action_items,
            key_points: classification.key_points,
            event_id,
            spam: classification.spam,
            sales_pitch: classification.sales_pitch,
            alert: classification.alert,
        });
    }

    /// Forwards the email to each resolved target, carrying eligible
    /// attachments. Returns the targets that succeeded.
    async fn forward(
        &self,
        email: &Email,
        classification: &Classification,
        decision: &RoutingDecision,
    ) -> Vec<String> {
        if decision.forward_to.is_empty() || self.dry_run {
            return Vec::new();
        }

        let attachments = self.collect_attachments(email).await;
        let body = forward_body(email, classification);
        let subject = format!("Fwd: {}", email.subject_or_default());

        let mut delivered = Vec::new();
        for target in &decision.forward_to {
            let outgoing = OutgoingEmail {
                to: vec![crate::domain::Address::new(target.clone())],
                subject: subject.clone(),
                body_text: body.clone(),
                attachments: attachments.clone(),
            };
            match self.mail.send(&outgoing).await {
                Ok(_) => {
                    info!(email = %email.id, target = %target, "forwarded email");
                    delivered.push(target.clone());
                }
                Err(e) => {
                    error!(email = %email.id, target = %target, error = %e, "failed to forward");
                }
            }
        }
        delivered
    }

    /// Downloads attachments that pass the forwardability check.
    async fn collect_attachments(&self, email: &Email) -> Vec<OutgoingAttachment> {
        let limits = &self.settings.attachments;
        let mut out = Vec::new();
        for attachment in &email.attachments {
            if !attachment.is_forwardable(&limits.allowed_extensions, limits.max_size_bytes) {
                warn!(
                    email = %email.id,
                    filename = %attachment.filename,
                    "skipping ineligible attachment"
                );
                continue;
            }
            match self.mail.download_attachment(&email.id, &attachment.id).await {
                Ok(data) => out.push(OutgoingAttachment {
                    filename: attachment.filename.clone(),
                    content_type: attachment.mime_type.clone(),
                    data,
                }),
                Err(e) => {
                    warn!(
                        email = %email.id,
                        filename = %attachment.filename,
                        error = %e,
                        "failed to download attachment"
                    );
                }
            }
        }
        out
    }

    /// Creates calendar reminders for matched rules that want one. Only
    /// emails with extracted action items get events. Returns the first
    /// created event id.
    async fn create_reminders(
        &self,
        email: &Email,
        classification: &Classification,
        decision: &RoutingDecision,
    ) -> Option<EventId> {
        let calendar = self.calendar.as_ref()?;
        if self.dry_run || decision.calendar.is_empty() || classification.action_items.is_empty() {
            return None;
        }

        let defaults = &self.settings.calendar;
        let mut first_event = None;

        for (rule_name, cal) in &decision.calendar {
            let start = Utc::now() + Duration::minutes(cal.reminder_advance_minutes);
            let request = EventRequest {
                summary: format!(
                    "[{}] {} - Action Required",
                    rule_name.to_uppercase(),
                    email.subject_or_default()
                ),
                description: reminder_description(email, classification, decision),
                start,
                end: start + Duration::minutes(cal.duration_minutes),
                timezone: cal
                    .timezone
                    .clone()
                    .unwrap_or_else(|| defaults.timezone.clone()),
                color: cal.color.clone(),
                reminder_minutes: cal.reminder_advance_minutes.min(60),
            };

            match calendar.create_event(&request).await {
                Ok(event_id) => {
                    info!(email = %email.id, rule = %rule_name, event = %event_id, "created reminder");
                    first_event.get_or_insert(event_id);
                }
                Err(e) => {
                    error!(email = %email.id, rule = %rule_name, error = %e, "failed to create reminder");
                }
            }
        }
        first_event
    }

    /// Applies labels, importance, and read state.
    async fn apply_markers(&self, email: &Email, decision: &RoutingDecision) {
        if self.dry_run {
            return;
        }

        for label in &decision.labels {
            if let Err(e) = self.mail.add_label(&email.id, label).await {
                warn!(email = %email.id, label = %label, error = %e, "failed to apply label");
            }
        }

        if decision.mark_important {
            if let Err(e) = self.mail.mark_important(&email.id).await {
                warn!(email = %email.id, error = %e, "failed to mark important");
            }
        }

        if let Err(e) = self.mail.mark_read(&email.id).await {
            warn!(email = %email.id, error = %e, "failed to mark as read");
        }
    }
}

/// Inter-email pause derived from the configured request budget.
fn pacing_delay(requests_per_minute: u32) -> std::time::Duration {
    std::time::Duration::from_secs_f64(60.0 / requests_per_minute.max(1) as f64)
}

/// Body text for a forwarded email.
fn forward_body(email: &Email, classification: &Classification) -> String {
    let mut body = String::new();
    body.push_str(&format!("Original email from: {}\n", email.from.display()));
    body.push_str(&format!(
        "Received: {}\n",
        email.date.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    if let Some(summary) = &classification.summary {
        body.push_str(&format!("\nSummary:\n{}\n", summary));
    }

    if !classification.action_items.is_empty() {
        body.push_str("\nAction items:\n");
        for item in &classification.action_items {
            body.push_str(&format!("- {}\n", item));
        }
    }

    body.push_str("\nOriginal message:\n");
    body.push_str(email.classification_text());
    body
}

/// Description for a reminder event.
fn reminder_description(
    email: &Email,
    classification: &Classification,
    decision: &RoutingDecision,
) -> String {
    let mut description = format!(
        "Email details:\nFrom: {}\nSubject: {}\n\nPriority: {}\n",
        email.from.display(),
        email.subject_or_default(),
        decision.priority.to_string().to_uppercase()
    );

    description.push_str("\nAction items required:\n");
    for item in &classification.action_items {
        description.push_str(&format!("\u{2022} {}\n", item));
    }

    if !classification.key_points.is_empty() {
        description.push_str("\nKey points:\n");
        for point in &classification.key_points {
            description.push_str(&format!("\u{2022} {}\n", point));
        }
    }

    let preview: String = email.classification_text().chars().take(500).collect();
    description.push_str(&format!("\nOriginal email preview:\n{}", preview));
    description
}
