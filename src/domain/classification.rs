//! Model-produced classification of a single email.
//!
//! This struct is the JSON contract with the language model: the classifier
//! prompt instructs the model to answer with exactly this shape, and the
//! response is deserialized straight into it. All fields default so a
//! partial answer still parses.

use serde::{Deserialize, Serialize};

use super::{Priority, RuleSet};

/// Classification result for one email.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Classification {
    /// Matched category names, lowercase.
    pub categories: Vec<String>,
    /// Priority assessed from content urgency.
    pub priority: Priority,
    /// One-or-two sentence summary of the email.
    pub summary: Option<String>,
    /// Important points worth surfacing in the report.
    pub key_points: Vec<String>,
    /// Concrete actions the email asks for.
    pub action_items: Vec<String>,
    /// Project names or codes mentioned in the email.
    pub project_names: Vec<String>,
    /// Whether the email looks like unsolicited spam.
    pub spam: bool,
    /// Whether the email is a sales pitch.
    pub sales_pitch: bool,
    /// Whether the email is an alert requiring attention (vs. a notification).
    pub alert: bool,
}

impl Classification {
    /// Drops category names that do not correspond to an enabled rule,
    /// normalizing to lowercase. The model occasionally invents categories;
    /// only configured ones may drive routing.
    pub fn retain_known(&mut self, rules: &RuleSet) {
        self.categories = self
            .categories
            .iter()
            .map(|c| c.to_lowercase())
            .filter(|c| rules.has_enabled(c))
            .collect();
    }

    /// Whether the email warrants the provider's "important" marker.
    pub fn is_important(&self) -> bool {
        self.priority >= Priority::High || self.alert
    }
}
