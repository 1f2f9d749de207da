//! Test fixtures for staffsync.
//!
//! Kept out of the production crates so scripted failures and panics never
//! ship in a release build.

#![forbid(unsafe_code)]

pub mod adapter;

pub use adapter::{ScriptedAdapter, Step};
