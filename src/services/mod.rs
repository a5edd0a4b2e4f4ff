//! Business services layer.
//!
//! This module contains the services that orchestrate the triage run,
//! coordinating between providers, configuration, and domain types.
//!
//! # Architecture
//!
//! ```text
//! CLI / HTTP surface
//!        |
//!        v
//!  Services layer   <-- you are here
//!        |
//!        v
//!  Providers (Gmail, LLM, Calendar)
//! ```
//!
//! # Services overview
//!
//! - [`Classifier`]: prompts the LLM and validates its JSON answer
//! - [`route`]: resolves categories, priority, targets, labels, reminders
//! - [`TriagePipeline`]: the sequential per-run loop
//! - [`ReportRenderer`]: text/HTML report output
//! - [`BackupManager`]: timestamped config backups and verified restore

mod backup;
mod classifier;
mod report;
mod router;
mod triage;

pub use backup::{BackupError, BackupInfo, BackupManager};
pub use classifier::{Classifier, ClassifierError};
pub use report::ReportRenderer;
pub use router::{route, RoutingDecision};
pub use triage::{TriageError, TriagePipeline};
