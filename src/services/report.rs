//! Report rendering and delivery.
//!
//! A finished [`RunReport`] is rendered twice: plain text for the summary
//! email sent to the mailbox owner, and a small static HTML file written to
//! disk for later inspection.

use std::path::Path;

use crate::domain::RunReport;
use crate::providers::email::OutgoingEmail;

/// Renders run reports in text and HTML.
pub struct ReportRenderer<'a> {
    report: &'a RunReport,
}

impl<'a> ReportRenderer<'a> {
    pub fn new(report: &'a RunReport) -> Self {
        Self { report }
    }

    /// Plain-text rendering, used as the report email body.
    pub fn render_text(&self) -> String {
        let mut out = Vec::new();

        out.push("Email Triage Report".to_string());
        out.push("===================".to_string());
        out.push(format!(
            "Generated on {}",
            self.report
                .finished_at
                .unwrap_or(self.report.started_at)
                .format("%Y-%m-%d %H:%M:%S")
        ));
        out.push(String::new());

        out.push("Summary Statistics".to_string());
        out.push("------------------".to_string());
        out.push(format!("Total emails processed: {}", self.report.processed));
        out.push(format!("Forwards delivered: {}", self.report.forwarded));
        out.push(format!("Spam skipped: {}", self.report.skipped_spam));
        out.push(format!("Errors: {}", self.report.errors));
        out.push(String::new());

        if !self.report.category_counts.is_empty() {
            out.push("Category Statistics".to_string());
            out.push("-------------------".to_string());
            for (category, count) in &self.report.category_counts {
                out.push(format!("{}: {} emails", category, count));
            }
            out.push(String::new());
        }

        if !self.report.outcomes.is_empty() {
            out.push("Email Summary".to_string());
            out.push("-------------".to_string());
            for outcome in &self.report.outcomes {
                out.push(String::new());
                out.push(format!("From: {}", outcome.from.display()));
                out.push(format!("Subject: {}", outcome.subject));
                out.push(format!(
                    "Priority: {}",
                    outcome.priority.to_string().to_uppercase()
                ));
                out.push(format!("Categories: {}", outcome.categories.join(", ")));
                if !outcome.forwarded_to.is_empty() {
                    out.push(format!("Forwarded to: {}", outcome.forwarded_to.join(", ")));
                }
                if let Some(event_id) = &outcome.event_id {
                    out.push(format!("Reminder event: {}", event_id));
                }
                if !outcome.action_items.is_empty() {
                    out.push("Action items:".to_string());
                    for item in &outcome.action_items {
                        out.push(format!("  - {}", item));
                    }
                }
                out.push("-".repeat(50));
            }
            out.push(String::new());
        }

        let action_items = self.report.action_items();
        if !action_items.is_empty() {
            out.push("Consolidated Action Items".to_string());
            out.push("-------------------------".to_string());
            out.push("All action items across emails that require attention:".to_string());
            out.push(String::new());
            for group in action_items {
                out.push(format!(
                    "Priority: {}",
                    group.priority.to_string().to_uppercase()
                ));
                out.push(format!("From: {}", group.from));
                out.push(format!("Subject: {}", group.subject));
                out.push("Action items:".to_string());
                for item in &group.items {
                    out.push(format!("  - {}", item));
                }
                out.push(String::new());
            }
        }

        out.join("\n")
    }

    /// Minimal static HTML rendering for the on-disk report file.
    pub fn render_html(&self) -> String {
        let mut rows = String::new();
        for outcome in &self.report.outcomes {
            rows.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape(&outcome.from.display()),
                escape(&outcome.subject),
                outcome.priority,
                escape(&outcome.categories.join(", ")),
                escape(&outcome.forwarded_to.join(", ")),
            ));
        }

        let mut categories = String::new();
        for (category, count) in &self.report.category_counts {
            categories.push_str(&format!(
                "<li>{}: {} emails</li>\n",
                escape(category),
                count
            ));
        }

        let mut actions = String::new();
        for group in self.report.action_items() {
            actions.push_str(&format!(
                "<li><strong>[{}]</strong> {} — {}<ul>\n",
                group.priority.to_string().to_uppercase(),
                escape(&group.subject),
                escape(&group.from),
            ));
            for item in &group.items {
                actions.push_str(&format!("<li>{}</li>\n", escape(item)));
            }
            actions.push_str("</ul></li>\n");
        }

        format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Email Triage Report</title></head>
<body>
<h1>Email Triage Report</h1>
<p>Generated on {generated}</p>
<h2>Summary</h2>
<ul>
<li>Total emails processed: {processed}</li>
<li>Forwards delivered: {forwarded}</li>
<li>Spam skipped: {spam}</li>
<li>Errors: {errors}</li>
</ul>
<h2>Categories</h2>
<ul>
{categories}</ul>
<h2>Emails</h2>
<table border="1" cellpadding="4">
<tr><th>From</th><th>Subject</th><th>Priority</th><th>Categories</th><th>Forwarded to</th></tr>
{rows}</table>
<h2>Action Items</h2>
<ul>
{actions}</ul>
</body>
</html>
"#,
            generated = self
                .report
                .finished_at
                .unwrap_or(self.report.started_at)
                .format("%Y-%m-%d %H:%M:%S"),
            processed = self.report.processed,
            forwarded = self.report.forwarded,
            spam = self.report.skipped_spam,
            errors = self.report.errors,
            categories = categories,
            rows = rows,
            actions = actions,
        )
    }

    /// Writes the HTML rendering to `path`, creating parent directories.
    pub fn write_html(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.render_html())
    }

    /// Builds the report email addressed to the mailbox owner.
    pub fn email(&self, to: &str) -> OutgoingEmail {
        OutgoingEmail::plain(
            to,
            format!(
                "Email Triage Report - {}",
                self.report
                    .finished_at
                    .unwrap_or(self.report.started_at)
                    .format("%Y-%m-%d")
            ),
            self.render_text(),
        )
    }
}

/// Minimal HTML escaping for text interpolated into the report.
fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
