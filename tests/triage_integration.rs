//! Integration tests for the triage pipeline.
//!
//! These drive the full fetch -> classify -> route -> forward -> report
//! sequence over in-memory mail and LLM providers, checking the pipeline's
//! observable effects: what got forwarded where, what was labeled and
//! marked read, and what the report counts say.

use async_trait::async_trait;
use chrono::Utc;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Mutex;

use sift::config::Settings;
use sift::domain::{
    Address, AttachmentId, CalendarRule, CategoryRule, Email, EmailId, EventId, Priority,
};
use sift::providers::ai::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, LlmResult, TokenUsage,
};
use sift::providers::calendar::{CalendarProvider, EventRequest};
use sift::providers::email::{
    MailProvider, OutgoingEmail, Profile, ProviderError, Result as MailResult,
};
use sift::services::{Classifier, TriagePipeline};

// ============================================================================
// Mock providers
// ============================================================================

#[derive(Default)]
struct MockMail {
    emails: Vec<Email>,
    attachments: HashMap<String, Vec<u8>>,
    sent: Mutex<Vec<OutgoingEmail>>,
    labeled: Mutex<Vec<(EmailId, String)>>,
    read: Mutex<Vec<EmailId>>,
    important: Mutex<Vec<EmailId>>,
}

impl MockMail {
    fn with_emails(emails: Vec<Email>) -> Self {
        Self {
            emails,
            ..Self::default()
        }
    }
}

#[async_trait]
impl MailProvider for MockMail {
    async fn profile(&self) -> MailResult<Profile> {
        Ok(Profile {
            email_address: "owner@example.com".to_string(),
        })
    }

    async fn list_unread(&self, max: u32) -> MailResult<Vec<EmailId>> {
        Ok(self
            .emails
            .iter()
            .filter(|e| !e.is_read)
            .take(max as usize)
            .map(|e| e.id.clone())
            .collect())
    }

    async fn fetch(&self, id: &EmailId) -> MailResult<Email> {
        self.emails
            .iter()
            .find(|e| &e.id == id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }

    async fn download_attachment(
        &self,
        _email_id: &EmailId,
        attachment_id: &AttachmentId,
    ) -> MailResult<Vec<u8>> {
        self.attachments
            .get(&attachment_id.0)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(attachment_id.to_string()))
    }

    async fn send(&self, email: &OutgoingEmail) -> MailResult<EmailId> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(EmailId::from("sent-1"))
    }

    async fn mark_read(&self, id: &EmailId) -> MailResult<()> {
        self.read.lock().unwrap().push(id.clone());
        Ok(())
    }

    async fn add_label(&self, id: &EmailId, name: &str) -> MailResult<()> {
        self.labeled
            .lock()
            .unwrap()
            .push((id.clone(), name.to_string()));
        Ok(())
    }

    async fn mark_important(&self, id: &EmailId) -> MailResult<()> {
        self.important.lock().unwrap().push(id.clone());
        Ok(())
    }
}

/// LLM stub keyed on the email subject embedded in the request content.
struct ScriptedLlm {
    by_subject: Vec<(&'static str, &'static str)>,
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "test-model"
    }

    async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse> {
        let content = &request.messages[0].content;
        let text = self
            .by_subject
            .iter()
            .find(|(subject, _)| content.contains(subject))
            .map(|(_, response)| response.to_string())
            .unwrap_or_else(|| "{}".to_string());

        Ok(CompletionResponse {
            text,
            tokens_used: TokenUsage::default(),
            finish_reason: FinishReason::Stop,
        })
    }
}

#[derive(Default)]
struct MockCalendar {
    created: std::sync::Arc<Mutex<Vec<EventRequest>>>,
}

#[async_trait]
impl CalendarProvider for MockCalendar {
    async fn create_event(&self, request: &EventRequest) -> Result<EventId, ProviderError> {
        let mut created = self.created.lock().unwrap();
        created.push(request.clone());
        Ok(EventId::from(format!("evt-{}", created.len())))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn email(id: &str, subject: &str, body: &str, from: &str) -> Email {
    Email {
        id: EmailId::from(id),
        subject: Some(subject.to_string()),
        from: Address::parse(from),
        to: vec![Address::new("owner@example.com")],
        date: Utc::now(),
        snippet: body.chars().take(80).collect(),
        body_text: Some(body.to_string()),
        body_html: None,
        labels: vec![sift::domain::LabelId::from("UNREAD")],
        attachments: vec![],
        is_read: false,
    }
}

fn settings() -> Settings {
    let invoices = CategoryRule {
        keywords: vec!["invoice".into()],
        targets: vec!["finance@corp.example".into()],
        priority: Priority::High,
        calendar: Some(CalendarRule {
            create_reminder: true,
            reminder_advance_minutes: 60,
            duration_minutes: 15,
            color: Some("orange".into()),
            timezone: None,
            priorities: vec![],
        }),
        ..CategoryRule::named("invoices")
    };
    let travel = CategoryRule {
        keywords: vec!["flight".into()],
        targets: vec!["me@personal.example".into()],
        direct_forward: false,
        ..CategoryRule::named("travel")
    };

    let mut settings = Settings::default();
    settings.rules = vec![invoices, travel];
    settings.calendar.enabled = true;
    // Keep pacing sleeps negligible in tests.
    settings.gmail.requests_per_minute = 60_000;
    settings
}

fn pipeline(
    mail: MockMail,
    scripted: Vec<(&'static str, &'static str)>,
    calendar: Option<Box<dyn CalendarProvider>>,
) -> TriagePipeline<MockMail> {
    let settings = settings();
    let classifier = Classifier::new(
        Box::new(ScriptedLlm {
            by_subject: scripted,
        }),
        &settings.ruleset(),
        0.1,
        Some(512),
    );
    TriagePipeline::new(mail, classifier, calendar, settings)
}

// ============================================================================
// Pipeline behavior
// ============================================================================

#[tokio::test]
async fn invoice_email_is_forwarded_labeled_and_reported() {
    let mail = MockMail::with_emails(vec![email(
        "m1",
        "Invoice INV-9 due",
        "please arrange payment of invoice INV-9",
        "Billing <billing@vendor.example>",
    )]);
    let p = pipeline(
        mail,
        vec![(
            "Invoice INV-9",
            r#"{"categories": ["invoices"], "priority": "high",
                "action_items": ["pay INV-9"], "summary": "Invoice due"}"#,
        )],
        None,
    );

    let report = p.run(10).await.unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.forwarded, 1);
    assert_eq!(report.errors, 0);
    assert_eq!(report.category_counts.get("invoices"), Some(&1));

    let sent = p.mail().sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to[0].email, "finance@corp.example");
    assert_eq!(sent[0].subject, "Fwd: Invoice INV-9 due");
    assert!(sent[0].body_text.contains("pay INV-9"));
    assert!(sent[0]
        .body_text
        .contains("Billing <billing@vendor.example>"));

    let labeled = p.mail().labeled.lock().unwrap();
    assert!(labeled.iter().any(|(_, l)| l == "invoices"));

    // High priority -> important marker; always marked read.
    assert_eq!(p.mail().important.lock().unwrap().len(), 1);
    assert_eq!(p.mail().read.lock().unwrap().len(), 1);

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.priority, Priority::High);
    assert_eq!(outcome.forwarded_to, vec!["finance@corp.example"]);
}

#[tokio::test]
async fn heuristic_match_routes_when_model_says_nothing() {
    // Model returns an empty object; the keyword heuristic still matches.
    let mail = MockMail::with_emails(vec![email(
        "m1",
        "Invoice from your vendor",
        "see invoice attached",
        "someone@anywhere.example",
    )]);
    let p = pipeline(mail, vec![], None);

    let report = p.run(10).await.unwrap();

    assert_eq!(report.category_counts.get("invoices"), Some(&1));
    assert_eq!(p.mail().sent.lock().unwrap().len(), 1);
    // Rule priority floor applies even with a silent model.
    assert_eq!(report.outcomes[0].priority, Priority::High);
}

#[tokio::test]
async fn unmatched_email_gets_default_category_and_no_forward() {
    let mail = MockMail::with_emails(vec![email(
        "m1",
        "lunch tomorrow?",
        "see you at noon",
        "friend@example.com",
    )]);
    let p = pipeline(mail, vec![], None);

    let report = p.run(10).await.unwrap();

    assert_eq!(report.category_counts.get("uncategorized"), Some(&1));
    assert_eq!(report.forwarded, 0);
    assert!(p.mail().sent.lock().unwrap().is_empty());
    // Still marked read so the next run does not reprocess it.
    assert_eq!(p.mail().read.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn spam_is_skipped_and_marked_read() {
    let mail = MockMail::with_emails(vec![email(
        "m1",
        "You WON a prize",
        "click here to claim now",
        "winner@spam.example",
    )]);
    let p = pipeline(
        mail,
        vec![("You WON a prize", r#"{"spam": true, "categories": []}"#)],
        None,
    );

    let report = p.run(10).await.unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped_spam, 1);
    assert_eq!(report.category_counts.get("spam"), Some(&1));
    assert!(p.mail().sent.lock().unwrap().is_empty());
    assert!(p.mail().labeled.lock().unwrap().is_empty());
    assert_eq!(p.mail().read.lock().unwrap().len(), 1);
    assert!(report.outcomes.is_empty());
}

#[tokio::test]
async fn non_direct_forward_rule_labels_without_forwarding() {
    let mail = MockMail::with_emails(vec![email(
        "m1",
        "Your flight is confirmed",
        "boarding at 10:00",
        "airline@travel.example",
    )]);
    let p = pipeline(mail, vec![], None);

    let report = p.run(10).await.unwrap();

    assert_eq!(report.category_counts.get("travel"), Some(&1));
    assert!(p.mail().sent.lock().unwrap().is_empty());
    assert!(p
        .mail()
        .labeled
        .lock()
        .unwrap()
        .iter()
        .any(|(_, l)| l == "travel"));
}

#[tokio::test]
async fn calendar_event_created_for_action_items() {
    let mail = MockMail::with_emails(vec![email(
        "m1",
        "Invoice INV-1",
        "pay invoice INV-1 by friday",
        "billing@vendor.example",
    )]);
    let calendar = MockCalendar::default();
    let created_log = calendar.created.clone();
    let p = pipeline(
        mail,
        vec![(
            "Invoice INV-1",
            r#"{"categories": ["invoices"], "priority": "high",
                "action_items": ["pay INV-1 by friday"]}"#,
        )],
        Some(Box::new(calendar)),
    );

    let report = p.run(10).await.unwrap();

    let created = created_log.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert!(created[0].summary.contains("[INVOICES]"));
    assert!(created[0].description.contains("pay INV-1 by friday"));
    assert_eq!(created[0].color.as_deref(), Some("orange"));

    assert_eq!(report.outcomes[0].event_id, Some(EventId::from("evt-1")));
}

#[tokio::test]
async fn no_calendar_event_without_action_items() {
    let mail = MockMail::with_emails(vec![email(
        "m1",
        "Invoice INV-2",
        "for your records",
        "billing@vendor.example",
    )]);
    let calendar = MockCalendar::default();
    let created_log = calendar.created.clone();
    let p = pipeline(
        mail,
        vec![(
            "Invoice INV-2",
            r#"{"categories": ["invoices"], "priority": "high", "action_items": []}"#,
        )],
        Some(Box::new(calendar)),
    );

    let report = p.run(10).await.unwrap();

    let created = created_log.lock().unwrap();
    assert!(created.is_empty());
    assert_eq!(report.outcomes[0].event_id, None);
}

#[tokio::test]
async fn malformed_model_output_falls_back_to_heuristics() {
    let mail = MockMail::with_emails(vec![email(
        "m1",
        "Invoice INV-3",
        "invoice enclosed",
        "billing@vendor.example",
    )]);
    let p = pipeline(
        mail,
        vec![("Invoice INV-3", "I'm sorry, I can't help with that.")],
        None,
    );

    let report = p.run(10).await.unwrap();

    // Classification failed, but the keyword heuristic still routes.
    assert_eq!(report.errors, 0);
    assert_eq!(report.category_counts.get("invoices"), Some(&1));
    assert_eq!(p.mail().sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn fetch_failure_is_counted_and_run_continues() {
    // Listing returns an id the fetch step cannot find.
    struct HalfBrokenMail {
        inner: MockMail,
    }

    #[async_trait]
    impl MailProvider for HalfBrokenMail {
        async fn profile(&self) -> MailResult<Profile> {
            self.inner.profile().await
        }
        async fn list_unread(&self, max: u32) -> MailResult<Vec<EmailId>> {
            let mut ids = vec![EmailId::from("ghost")];
            ids.extend(self.inner.list_unread(max).await?);
            Ok(ids)
        }
        async fn fetch(&self, id: &EmailId) -> MailResult<Email> {
            self.inner.fetch(id).await
        }
        async fn download_attachment(
            &self,
            email_id: &EmailId,
            attachment_id: &AttachmentId,
        ) -> MailResult<Vec<u8>> {
            self.inner.download_attachment(email_id, attachment_id).await
        }
        async fn send(&self, email: &OutgoingEmail) -> MailResult<EmailId> {
            self.inner.send(email).await
        }
        async fn mark_read(&self, id: &EmailId) -> MailResult<()> {
            self.inner.mark_read(id).await
        }
        async fn add_label(&self, id: &EmailId, name: &str) -> MailResult<()> {
            self.inner.add_label(id, name).await
        }
        async fn mark_important(&self, id: &EmailId) -> MailResult<()> {
            self.inner.mark_important(id).await
        }
    }

    let mail = HalfBrokenMail {
        inner: MockMail::with_emails(vec![email(
            "m1",
            "Invoice INV-4",
            "invoice enclosed",
            "billing@vendor.example",
        )]),
    };

    let settings = settings();
    let classifier = Classifier::new(
        Box::new(ScriptedLlm { by_subject: vec![] }),
        &settings.ruleset(),
        0.1,
        None,
    );
    let p = TriagePipeline::new(mail, classifier, None, settings);

    let report = p.run(10).await.unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.errors, 1);
    assert_eq!(report.category_counts.get("invoices"), Some(&1));
}

#[tokio::test]
async fn dry_run_touches_nothing() {
    let mail = MockMail::with_emails(vec![email(
        "m1",
        "Invoice INV-5",
        "invoice enclosed",
        "billing@vendor.example",
    )]);
    let p = pipeline(
        mail,
        vec![(
            "Invoice INV-5",
            r#"{"categories": ["invoices"], "priority": "urgent", "action_items": ["pay"]}"#,
        )],
        None,
    )
    .dry_run();

    let report = p.run(10).await.unwrap();

    // Routing is still reported...
    assert_eq!(report.category_counts.get("invoices"), Some(&1));
    assert_eq!(report.outcomes[0].priority, Priority::Urgent);
    // ...but nothing was mutated.
    assert!(p.mail().sent.lock().unwrap().is_empty());
    assert!(p.mail().labeled.lock().unwrap().is_empty());
    assert!(p.mail().read.lock().unwrap().is_empty());
    assert!(p.mail().important.lock().unwrap().is_empty());
    assert_eq!(report.forwarded, 0);
}

#[tokio::test]
async fn max_emails_caps_the_run() {
    let emails: Vec<Email> = (0..5)
        .map(|i| {
            email(
                &format!("m{i}"),
                &format!("note {i}"),
                "hello",
                "a@example.com",
            )
        })
        .collect();
    let p = pipeline(MockMail::with_emails(emails), vec![], None);

    let report = p.run(2).await.unwrap();
    assert_eq!(report.processed, 2);
}

#[tokio::test]
async fn attachments_are_forwarded_when_eligible() {
    let mut invoice = email(
        "m1",
        "Invoice INV-6",
        "invoice attached",
        "billing@vendor.example",
    );
    invoice.attachments = vec![
        sift::domain::Attachment {
            id: AttachmentId::from("att-ok"),
            filename: "INV-6.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            size_bytes: 1024,
        },
        sift::domain::Attachment {
            id: AttachmentId::from("att-bad"),
            filename: "malware.exe".to_string(),
            mime_type: "application/octet-stream".to_string(),
            size_bytes: 1024,
        },
    ];

    let mut mail = MockMail::with_emails(vec![invoice]);
    mail.attachments
        .insert("att-ok".to_string(), b"%PDF-1.4 test".to_vec());

    let p = pipeline(mail, vec![], None);
    let report = p.run(10).await.unwrap();

    assert_eq!(report.forwarded, 1);
    let sent = p.mail().sent.lock().unwrap();
    assert_eq!(sent[0].attachments.len(), 1);
    assert_eq!(sent[0].attachments[0].filename, "INV-6.pdf");
    assert_eq!(sent[0].attachments[0].data, b"%PDF-1.4 test");
}
