//! Routing resolution for classified emails.
//!
//! Takes an email, its model classification, and the rule set, and decides
//! what actually happens: which categories stick, the effective priority,
//! where the email is forwarded, which labels go on, and which rules get a
//! calendar reminder.
//!
//! The match set is the union of the model's (validated) categories and
//! the rules' own keyword/sender heuristics, so an email matches a rule
//! when either signal fires.

use tracing::debug;

use crate::domain::{
    CalendarRule, CategoryRule, Classification, Email, Priority, RuleSet, DEFAULT_CATEGORY,
};

/// The resolved routing for one email.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    /// Final category set. Never empty: an unmatched email gets
    /// [`DEFAULT_CATEGORY`].
    pub categories: Vec<String>,
    /// Effective priority after conflict resolution.
    pub priority: Priority,
    /// Forward targets, deduplicated in rule order.
    pub forward_to: Vec<String>,
    /// Labels to apply (matched rule names plus flag labels).
    pub labels: Vec<String>,
    /// Rules that want a calendar reminder: (rule name, calendar settings).
    pub calendar: Vec<(String, CalendarRule)>,
    /// Whether the email gets the provider's important marker.
    pub mark_important: bool,
}

/// Resolves the routing decision for a classified email.
pub fn route(email: &Email, classification: &Classification, rules: &RuleSet) -> RoutingDecision {
    // Union of model-assigned categories and heuristic matches, in rule
    // order so downstream lists are deterministic.
    let matched: Vec<&CategoryRule> = rules
        .enabled()
        .filter(|rule| {
            classification
                .categories
                .iter()
                .any(|c| rule.name.eq_ignore_ascii_case(c))
                || rule.matches(email)
        })
        .collect();

    if matched.is_empty() {
        debug!(email = %email.id, "no rule matched, using default category");
        return RoutingDecision {
            categories: vec![DEFAULT_CATEGORY.to_string()],
            priority: classification.priority,
            forward_to: Vec::new(),
            labels: flag_labels(classification),
            calendar: Vec::new(),
            mark_important: classification.is_important(),
        };
    }

    // Highest configured priority among matches wins; the model can only
    // escalate, never downgrade below a matched rule's floor.
    let priority = matched
        .iter()
        .map(|r| r.priority)
        .chain(std::iter::once(classification.priority))
        .max()
        .unwrap_or_default();

    let categories: Vec<String> = matched.iter().map(|r| r.name.to_lowercase()).collect();

    let mut forward_to: Vec<String> = Vec::new();
    for rule in matched.iter().filter(|r| r.direct_forward) {
        for target in &rule.targets {
            if !forward_to.iter().any(|t| t.eq_ignore_ascii_case(target)) {
                forward_to.push(target.clone());
            }
        }
    }

    let mut labels: Vec<String> = matched.iter().map(|r| r.name.clone()).collect();
    labels.extend(flag_labels(classification));

    let calendar: Vec<(String, CalendarRule)> = matched
        .iter()
        .filter_map(|rule| {
            let settings = rule.calendar.as_ref()?;
            settings
                .admits(priority)
                .then(|| (rule.name.clone(), settings.clone()))
        })
        .collect();

    let mark_important = priority >= Priority::High || classification.alert;

    debug!(
        email = %email.id,
        categories = ?categories,
        %priority,
        targets = forward_to.len(),
        "routing resolved"
    );

    RoutingDecision {
        categories,
        priority,
        forward_to,
        labels,
        calendar,
        mark_important,
    }
}

/// Labels derived from classification flags.
fn flag_labels(classification: &Classification) -> Vec<String> {
    let mut labels = Vec::new();
    if classification.spam {
        labels.push("Spam".to_string());
    }
    if classification.sales_pitch {
        labels.push("Sales Pitch".to_string());
    }
    if classification.alert {
        labels.push("Alert".to_string());
    }
    labels
}
