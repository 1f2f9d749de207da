//! Built-in downstream integrations.

pub mod badge;
pub mod payroll;

pub use badge::{BadgeRecord, MockBadgeAdapter};
pub use payroll::{PayrollAdapter, PayrollConfig};
