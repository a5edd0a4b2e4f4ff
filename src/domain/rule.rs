//! Category rule domain types.
//!
//! A category rule pairs a predicate (keywords, known senders) with a
//! routing action (forward targets, labels, calendar reminders). Rules are
//! user-edited JSON; everything here must tolerate sloppy input.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Email;

/// Category name assigned when no rule matches an email.
pub const DEFAULT_CATEGORY: &str = "uncategorized";

/// Email priority level.
///
/// Ordering is by urgency: `Low < Normal < High < Urgent`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Can wait.
    Low,
    /// Regular communication, no immediate action needed.
    #[default]
    Normal,
    /// Needs attention within a day.
    High,
    /// Needs immediate attention.
    Urgent,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// Calendar reminder settings attached to a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarRule {
    /// Whether matched emails should create a calendar reminder.
    pub create_reminder: bool,
    /// Minutes from now until the reminder starts.
    pub reminder_advance_minutes: i64,
    /// Event duration in minutes.
    pub duration_minutes: i64,
    /// Event color name (red, orange, yellow, green, blue, purple).
    pub color: Option<String>,
    /// IANA timezone for the event; falls back to the global default.
    pub timezone: Option<String>,
    /// Priorities that qualify for a reminder. Empty means any priority.
    #[serde(default)]
    pub priorities: Vec<Priority>,
}

impl CalendarRule {
    /// Whether an email at `priority` should get a reminder under this rule.
    pub fn admits(&self, priority: Priority) -> bool {
        self.create_reminder && (self.priorities.is_empty() || self.priorities.contains(&priority))
    }
}

impl Default for CalendarRule {
    fn default() -> Self {
        Self {
            create_reminder: false,
            reminder_advance_minutes: 30,
            duration_minutes: 30,
            color: None,
            timezone: None,
            priorities: Vec::new(),
        }
    }
}

/// A user-defined category rule: predicate plus routing action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Category name, lowercase by convention.
    pub name: String,
    /// Disabled rules never match and never route.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Keywords matched case-insensitively against subject and body.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Sender addresses (or bare domains) that match this rule directly.
    #[serde(default)]
    pub senders: Vec<String>,
    /// Addresses to forward matched emails to.
    #[serde(default)]
    pub targets: Vec<String>,
    /// Whether matched emails are actually forwarded to `targets`.
    /// When false the rule still contributes labels and reminders.
    #[serde(default = "default_true")]
    pub direct_forward: bool,
    /// Default priority this rule confers on matched emails.
    #[serde(default)]
    pub priority: Priority,
    /// Optional calendar reminder settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar: Option<CalendarRule>,
}

fn default_true() -> bool {
    true
}

impl CategoryRule {
    /// Creates a minimal enabled rule with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            keywords: Vec::new(),
            senders: Vec::new(),
            targets: Vec::new(),
            direct_forward: true,
            priority: Priority::Normal,
            calendar: None,
        }
    }

    /// Tests the heuristic predicate against an email.
    ///
    /// A disabled rule never matches. An enabled rule matches when any
    /// keyword occurs in the subject or body (case-insensitive), or when
    /// the sender matches an entry in `senders` (full address, or domain
    /// suffix for bare-domain entries).
    pub fn matches(&self, email: &Email) -> bool {
        if !self.enabled {
            return false;
        }

        let sender = email.from.email.to_lowercase();
        for entry in &self.senders {
            let entry = entry.to_lowercase();
            if entry.contains('@') {
                if sender == entry {
                    return true;
                }
            } else if email
                .from
                .domain()
                .map(|d| {
                    let d = d.to_lowercase();
                    d == entry || d.ends_with(&format!(".{}", entry))
                })
                .unwrap_or(false)
            {
                return true;
            }
        }

        if self.keywords.is_empty() {
            return false;
        }

        let subject = email.subject.as_deref().unwrap_or("").to_lowercase();
        let body = email.classification_text().to_lowercase();
        self.keywords.iter().any(|kw| {
            let kw = kw.to_lowercase();
            !kw.is_empty() && (subject.contains(&kw) || body.contains(&kw))
        })
    }
}

/// Errors produced by rule-set validation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RuleError {
    /// A rule has an empty name.
    #[error("rule has an empty name")]
    EmptyName,

    /// Two rules share a name.
    #[error("duplicate rule name: {0}")]
    DuplicateName(String),

    /// A forward target is not a plausible email address.
    #[error("rule {rule}: invalid target address: {target}")]
    InvalidTarget { rule: String, target: String },
}

/// The full ordered collection of category rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    pub rules: Vec<CategoryRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        Self { rules }
    }

    /// Iterates over enabled rules only.
    pub fn enabled(&self) -> impl Iterator<Item = &CategoryRule> {
        self.rules.iter().filter(|r| r.enabled)
    }

    /// Looks up a rule by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&CategoryRule> {
        self.rules.iter().find(|r| r.name.eq_ignore_ascii_case(name))
    }

    /// Whether an enabled rule with the given name exists.
    pub fn has_enabled(&self, name: &str) -> bool {
        self.get(name).map(|r| r.enabled).unwrap_or(false)
    }

    /// Validates names and target addresses.
    pub fn validate(&self) -> Result<(), RuleError> {
        let mut seen = std::collections::HashSet::new();
        for rule in &self.rules {
            if rule.name.trim().is_empty() {
                return Err(RuleError::EmptyName);
            }
            if !seen.insert(rule.name.to_lowercase()) {
                return Err(RuleError::DuplicateName(rule.name.clone()));
            }
            for target in &rule.targets {
                if !looks_like_address(target) {
                    return Err(RuleError::InvalidTarget {
                        rule: rule.name.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Cheap structural check for an email address. Full RFC 5321 validation
/// is not worth carrying for a config sanity check.
fn looks_like_address(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, EmailId};
    use chrono::Utc;

    fn email(subject: &str, body: &str, from: &str) -> Email {
        Email {
            id: EmailId::from("msg-1"),
            subject: Some(subject.to_string()),
            from: Address::parse(from),
            to: vec![],
            date: Utc::now(),
            snippet: String::new(),
            body_text: Some(body.to_string()),
            body_html: None,
            labels: vec![],
            attachments: vec![],
            is_read: false,
        }
    }

    fn invoice_rule() -> CategoryRule {
        CategoryRule {
            keywords: vec!["invoice".into(), "payment due".into()],
            senders: vec!["billing@vendor.example".into()],
            targets: vec!["finance@corp.example".into()],
            priority: Priority::High,
            ..CategoryRule::named("invoices")
        }
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn priority_parse_and_display() {
        assert_eq!("URGENT".parse::<Priority>().unwrap(), Priority::Urgent);
        assert_eq!(Priority::High.to_string(), "high");
        assert!("critical".parse::<Priority>().is_err());
    }

    #[test]
    fn priority_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Priority::Urgent).unwrap(), "\"urgent\"");
        let p: Priority = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(p, Priority::Low);
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let rule = invoice_rule();
        assert!(rule.matches(&email("Your INVOICE is ready", "", "x@y.example")));
        assert!(rule.matches(&email("hello", "final payment DUE friday", "x@y.example")));
        assert!(!rule.matches(&email("lunch?", "see you at noon", "x@y.example")));
    }

    #[test]
    fn sender_match_full_address() {
        let rule = invoice_rule();
        assert!(rule.matches(&email("hi", "", "Billing <billing@vendor.example>")));
    }

    #[test]
    fn sender_match_bare_domain_covers_subdomains() {
        let mut rule = invoice_rule();
        rule.senders = vec!["vendor.example".into()];
        assert!(rule.matches(&email("hi", "", "a@vendor.example")));
        assert!(rule.matches(&email("hi", "", "a@mail.vendor.example")));
        assert!(!rule.matches(&email("hi", "", "a@notvendor.example")));
    }

    #[test]
    fn disabled_rule_never_matches() {
        let mut rule = invoice_rule();
        rule.enabled = false;
        assert!(!rule.matches(&email("invoice attached", "", "billing@vendor.example")));
    }

    #[test]
    fn calendar_rule_priority_gate() {
        let rule = CalendarRule {
            create_reminder: true,
            priorities: vec![Priority::High, Priority::Urgent],
            ..CalendarRule::default()
        };
        assert!(rule.admits(Priority::Urgent));
        assert!(!rule.admits(Priority::Normal));

        let any = CalendarRule {
            create_reminder: true,
            ..CalendarRule::default()
        };
        assert!(any.admits(Priority::Low));

        let off = CalendarRule::default();
        assert!(!off.admits(Priority::Urgent));
    }

    #[test]
    fn ruleset_validation_rejects_duplicates() {
        let set = RuleSet::new(vec![invoice_rule(), invoice_rule()]);
        assert_eq!(
            set.validate(),
            Err(RuleError::DuplicateName("invoices".to_string()))
        );
    }

    #[test]
    fn ruleset_validation_rejects_bad_target() {
        let mut rule = invoice_rule();
        rule.targets = vec!["not-an-address".into()];
        let set = RuleSet::new(vec![rule]);
        assert!(matches!(
            set.validate(),
            Err(RuleError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn ruleset_enabled_filters() {
        let mut off = invoice_rule();
        off.name = "other".into();
        off.enabled = false;
        let set = RuleSet::new(vec![invoice_rule(), off]);
        assert_eq!(set.enabled().count(), 1);
        assert!(set.has_enabled("invoices"));
        assert!(!set.has_enabled("other"));
        assert!(set.get("INVOICES").is_some());
    }

    #[test]
    fn rule_defaults_from_sparse_json() {
        let rule: CategoryRule =
            serde_json::from_str(r#"{"name": "travel", "keywords": ["flight"]}"#).unwrap();
        assert!(rule.enabled);
        assert!(rule.direct_forward);
        assert_eq!(rule.priority, Priority::Normal);
        assert!(rule.calendar.is_none());
    }
}
