//! Persistence for gateway routing rules.
//!
//! This crate provides:
//! - `RoutingRule`: a named record with an opaque YAML payload
//! - A YAML document-stream codec for rule files
//! - `RuleStore`: listing and update-by-name over one shared file, with
//!   in-process and cross-process (advisory lock) serialization of writers
//! - The `rules-admin` binary for operators

pub mod rule;
pub mod store;

pub use rule::RoutingRule;
pub use store::{RuleStore, StoreError};
