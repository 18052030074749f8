//! YAML document-stream codec for rule files.
//!
//! A rules file is zero or more YAML documents back to back, one rule per
//! document, with no surrounding sequence.

use serde::Deserialize;
use serde_yaml::Value;

use crate::rule::RoutingRule;

/// YAML document start marker written ahead of every rule.
const DOCUMENT_MARKER: &str = "---\n";

/// A document in the stream failed to decode.
#[derive(Debug, thiserror::Error)]
#[error("document {document}: {source}")]
pub struct DecodeError {
    /// Zero-based position of the failing document in the stream.
    pub document: usize,
    pub source: serde_yaml::Error,
}

/// Decode every rule in `content`, in document order.
///
/// Blank input is an empty rule set. Empty documents (a bare `---`) are
/// skipped. Any other document must deserialize into a [`RoutingRule`];
/// the first one that does not aborts the whole decode.
pub fn decode_rules(content: &[u8]) -> Result<Vec<RoutingRule>, DecodeError> {
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let mut rules = Vec::new();
    for (document, doc) in serde_yaml::Deserializer::from_slice(content).enumerate() {
        let value = Value::deserialize(doc).map_err(|source| DecodeError { document, source })?;
        if value.is_null() {
            continue;
        }
        let rule = serde_yaml::from_value(value).map_err(|source| DecodeError { document, source })?;
        rules.push(rule);
    }
    Ok(rules)
}

/// Encode `rules` as a document stream, each rule serialized on its own.
pub fn encode_rules(rules: &[RoutingRule]) -> Result<String, serde_yaml::Error> {
    let mut out = String::new();
    for rule in rules {
        out.push_str(DOCUMENT_MARKER);
        out.push_str(&serde_yaml::to_string(rule)?);
    }
    Ok(out)
}
