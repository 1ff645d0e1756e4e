//! Organization-scoped feature flags with an append-only revision history.
//!
//! [`store::OrganizationStore`] and [`store::FeatureFlagStore`] persist
//! records through an injected [`db::DocumentStore`]; [`access::AccessGate`]
//! decides what an authenticated [`identity::Identity`] may do; [`api`]
//! exposes both over HTTP.

pub mod access;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod models;
pub mod store;

pub use error::{Error, Result};
