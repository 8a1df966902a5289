//! Consent, identifier protection and compliance checks for outgoing metrics.

pub mod consent;
pub mod sanitize;
pub mod security;

pub use consent::{ConsentManager, ConsentStatus};
pub use security::{ComplianceViolation, SecurityModule};
