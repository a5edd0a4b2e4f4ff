//! LLM-backed email classification.
//!
//! Builds a system prompt from the enabled category rules, sends the email
//! to the configured model, and parses the JSON answer into a
//! [`Classification`]. The model is treated as untrusted input: fenced
//! output is unwrapped, unknown categories are dropped, and a malformed
//! answer surfaces as an error the pipeline downgrades to "log and use the
//! default classification".

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{Classification, Email, RuleSet};
use crate::providers::ai::{CompletionRequest, LlmError, LlmProvider, Message};

/// Errors that can occur during classification.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The model call itself failed.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// The model answered with something that is not the expected JSON.
    #[error("unparseable model output: {0}")]
    BadOutput(String),
}

/// Classifies emails with a language model against the configured rules.
pub struct Classifier {
    llm: Box<dyn LlmProvider>,
    system_prompt: String,
    temperature: f32,
    max_tokens: Option<usize>,
}

impl Classifier {
    /// Creates a classifier for the given rule set.
    pub fn new(
        llm: Box<dyn LlmProvider>,
        rules: &RuleSet,
        temperature: f32,
        max_tokens: Option<usize>,
    ) -> Self {
        Self {
            llm,
            system_prompt: system_prompt(rules),
            temperature,
            max_tokens,
        }
    }

    /// Returns the provider name and model, for logs and reports.
    pub fn model_label(&self) -> String {
        format!("{}/{}", self.llm.name(), self.llm.model())
    }

    /// Classifies one email, validating the result against `rules`.
    pub async fn classify(
        &self,
        email: &Email,
        rules: &RuleSet,
    ) -> Result<Classification, ClassifierError> {
        let content = format!(
            "Subject: {}\n\nBody: {}",
            email.subject_or_default(),
            email.classification_text()
        );

        let request = CompletionRequest::new(vec![Message::user(content)])
            .with_system_prompt(self.system_prompt.clone())
            .with_temperature(self.temperature)
            .with_json_output();
        let request = match self.max_tokens {
            Some(max) => request.with_max_tokens(max),
            None => request,
        };

        let response = self.llm.complete(&request).await?;
        debug!(
            model = %self.model_label(),
            tokens = response.tokens_used.total_tokens,
            "classification response received"
        );

        let mut classification = parse_classification(&response.text)?;
        let before = classification.categories.len();
        classification.retain_known(rules);
        if classification.categories.len() < before {
            warn!(
                email = %email.id,
                "model returned categories not present in configuration; dropped"
            );
        }

        Ok(classification)
    }
}

/// Builds the classifier system prompt from enabled rules.
fn system_prompt(rules: &RuleSet) -> String {
    let mut category_lines = String::new();
    for rule in rules.enabled() {
        category_lines.push_str(&format!(
            "- {}: keywords [{}]. Default priority: {}\n",
            rule.name.to_lowercase(),
            rule.keywords.join(", "),
            rule.priority
        ));
    }
    if category_lines.is_empty() {
        category_lines.push_str("(no categories configured)\n");
    }

    format!(
        r#"You are an expert email classifier. Your task is to:
1. Identify which configured categories apply to the email, if any
2. Determine the priority level from content urgency and importance
3. Extract key points, required actions, and any project names mentioned
4. Decide whether the email is spam, a sales pitch, or an alert requiring attention

Configured categories:
{category_lines}
Priority levels:
- low: no action expected
- normal: regular communication, no immediate action needed
- high: important matters requiring attention within 24 hours
- urgent: critical issues requiring immediate attention

Alerts require attention or action; notifications are informational only.
For spam, look for unsolicited offers, urgency to act, requests for
sensitive information, and suspicious senders. For sales pitches, look for
product offerings, promotional language, and discounts.

IMPORTANT: Always return category names in lowercase. Only use configured
category names.

Respond with a JSON object in exactly this shape:
{{
  "categories": ["string"],
  "priority": "low|normal|high|urgent",
  "summary": "string",
  "key_points": ["string"],
  "action_items": ["string"],
  "project_names": ["string"],
  "spam": false,
  "sales_pitch": false,
  "alert": false
}}"#
    )
}

/// Parses model output into a [`Classification`], tolerating markdown
/// code fences around the JSON object.
fn parse_classification(text: &str) -> Result<Classification, ClassifierError> {
    let stripped = strip_code_fences(text);
    serde_json::from_str(stripped).map_err(|e| {
        ClassifierError::BadOutput(format!("{e}: {}", truncate(stripped, 200)))
    })
}

/// Removes a surrounding markdown code fence, if present.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the fence line.
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    rest.strip_suffix("```").map(str::trim).unwrap_or(trimmed)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
