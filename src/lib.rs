//! Contract Assist - document chat sessions and contract notification emails
//!
//! This library provides the core functionality behind the `ai-client` and
//! `email-client` services.

pub mod api;
pub mod config;
pub mod models;
pub mod services;
