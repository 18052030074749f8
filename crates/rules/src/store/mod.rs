//! File-backed routing rule store.
//!
//! Reads the rules file as a YAML document stream and rewrites it in full
//! under an exclusive advisory lock when a rule is updated by name.

mod codec;
mod core;
mod error;
mod lock;

#[cfg(test)]
mod tests;

pub use self::codec::{decode_rules, encode_rules, DecodeError};
pub use self::core::RuleStore;
pub use self::error::{Result, StoreError};
