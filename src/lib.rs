//! sift - LLM-assisted triage for a single Gmail inbox
//!
//! This crate provides the core functionality for the sift triage tool:
//! fetching unread mail, classifying it with a language model against
//! user-defined category rules, routing (forward / label / calendar
//! reminder), and per-run reporting.

pub mod auth;
pub mod config;
pub mod domain;
pub mod providers;
pub mod server;
pub mod services;
