//! Mail provider implementations.
//!
//! This module contains the [`MailProvider`] trait and its Gmail REST
//! implementation. The trait is the seam the triage pipeline is tested
//! through; only [`GmailClient`] talks to the network.

mod gmail;
mod traits;

pub use gmail::GmailClient;
pub use traits::{
    MailProvider, OutgoingAttachment, OutgoingEmail, Profile, ProviderError, Result,
};
