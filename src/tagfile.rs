//! Tag file codec for `bag-info.txt` style metadata
//!
//! Tag files are ordered sequences of `label: value` lines. Order is
//! significant and duplicate labels are allowed, so the model is a list of
//! fields rather than a map. Long values may be folded across physical
//! lines by indenting the continuation lines; the folded text is one
//! logical value.
//!
//! Parsing is a single forward scan over the input text. A line starting
//! with a non-whitespace character must open a new field (label, optional
//! spaces or tabs, a colon, optional spaces or tabs); every line starting
//! with whitespace extends the value of the field above it.

use crate::error::{BagError, Result};
use crate::utils;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// One `label: value` pair from a tag file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagInfoField {
    /// Field label; must not contain a colon
    pub label: String,
    /// Field value, with continuation folding already applied
    pub value: String,
}

impl BagInfoField {
    /// Create a new field
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Ordered bag metadata, as stored in `bag-info.txt`
///
/// Insertion order is preserved verbatim across parse and serialize;
/// human-edited bags rely on their metadata not being reordered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagInfo {
    fields: Vec<BagInfoField>,
}

impl BagInfo {
    /// Create empty metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse tag-file text into an ordered field sequence
    ///
    /// `source` is only used for error messages.
    ///
    /// The value of a field is everything after the colon (and any spaces
    /// or tabs that follow it) up to the next line that starts with a
    /// non-whitespace character, with trailing line terminators stripped.
    /// If no further label line exists, the remainder of the text is the
    /// final value.
    ///
    /// # Errors
    ///
    /// Returns [`BagError::Parse`] when a non-continuation line does not
    /// form a `label: value` head, or when the text opens with a
    /// continuation line.
    pub fn parse(text: &str, source: &Path) -> Result<Self> {
        let mut fields: Vec<BagInfoField> = Vec::new();
        let mut current: Option<(String, String)> = None;

        for line in text.split_inclusive('\n') {
            let first = match line.chars().next() {
                Some(c) => c,
                None => continue,
            };

            if first.is_whitespace() {
                match current.as_mut() {
                    Some((_, value)) => value.push_str(line),
                    None => {
                        return Err(BagError::parse(
                            source,
                            "continuation line before any label",
                        ));
                    }
                }
                continue;
            }

            if let Some((label, value)) = current.take() {
                fields.push(BagInfoField::new(label, trim_terminators(&value)));
            }

            let (label, head) = split_label(line)
                .ok_or_else(|| BagError::parse(source, format!("malformed tag line: {line:?}")))?;
            current = Some((label.to_string(), head.to_string()));
        }

        if let Some((label, value)) = current.take() {
            fields.push(BagInfoField::new(label, trim_terminators(&value)));
        }

        debug!("Parsed {} fields from {:?}", fields.len(), source);
        Ok(Self { fields })
    }

    /// Serialize the fields back to tag-file text
    ///
    /// Writes one `label: value` line per field in list order. A label
    /// containing a colon cannot round-trip; it is still written, but a
    /// warning describing the field is returned to the caller.
    pub fn serialize(&self) -> (String, Vec<String>) {
        let mut out = String::new();
        let mut warnings = Vec::new();

        for field in &self.fields {
            if field.label.contains(':') {
                let msg = format!(
                    "label {:?} contains a colon; readers will split it at the wrong place",
                    field.label
                );
                warn!("{msg}");
                warnings.push(msg);
            }
            out.push_str(&field.label);
            out.push_str(": ");
            out.push_str(&field.value);
            out.push('\n');
        }

        (out, warnings)
    }

    /// Read and parse a tag file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, path)
    }

    /// Serialize and atomically write the tag file to disk
    ///
    /// Returns the serialization warnings, if any.
    pub fn save(&self, path: &Path) -> Result<Vec<String>> {
        let (text, warnings) = self.serialize();
        utils::atomic_write(path, text.as_bytes())?;
        Ok(warnings)
    }

    /// The ordered field sequence
    pub fn fields(&self) -> &[BagInfoField] {
        &self.fields
    }

    /// Append a field, keeping any existing fields with the same label
    pub fn push(&mut self, label: impl Into<String>, value: impl Into<String>) {
        self.fields.push(BagInfoField::new(label, value));
    }

    /// Replace the value of `label` in place, or append a new field
    ///
    /// If one or more fields already carry the label, the first keeps its
    /// position and receives the new value; later duplicates are left
    /// untouched. Otherwise the field is appended at the end.
    pub fn insert_or_replace(&mut self, label: &str, value: impl Into<String>) {
        match self.fields.iter_mut().find(|f| f.label == label) {
            Some(field) => field.value = value.into(),
            None => self.push(label, value),
        }
    }

    /// All values recorded under `label`, in order
    pub fn values<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a str> {
        self.fields
            .iter()
            .filter(move |f| f.label == label)
            .map(|f| f.value.as_str())
    }

    /// The first value recorded under `label`
    pub fn first<'a>(&'a self, label: &'a str) -> Option<&'a str> {
        self.values(label).next()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Split a label head line into (label, first value chunk)
///
/// The label is the maximal run of non-colon, non-whitespace characters.
/// Only spaces and tabs may sit between the label and its colon.
fn split_label(line: &str) -> Option<(&str, &str)> {
    let label_end = line.find(|c: char| c == ':' || c.is_whitespace())?;
    if label_end == 0 {
        return None;
    }
    let label = &line[..label_end];
    let after = line[label_end..].trim_start_matches([' ', '\t']);
    let rest = after.strip_prefix(':')?;
    Some((label, rest.trim_start_matches([' ', '\t'])))
}

/// Strip trailing line terminators from a collected value
fn trim_terminators(value: &str) -> String {
    value.trim_end_matches(['\n', '\r']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse(text: &str) -> BagInfo {
        BagInfo::parse(text, Path::new("bag-info.txt")).unwrap()
    }

    #[test]
    fn test_parse_basic() {
        let info = parse("Source-Organization: Example Org\nContact-Name: A. Archivist\n");
        assert_eq!(info.len(), 2);
        assert_eq!(info.first("Source-Organization"), Some("Example Org"));
        assert_eq!(info.first("Contact-Name"), Some("A. Archivist"));
    }

    #[test]
    fn test_parse_preserves_order_and_duplicates() {
        let info = parse("B: two\nA: one\nB: three\n");
        let labels: Vec<_> = info.fields().iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["B", "A", "B"]);
        let values: Vec<_> = info.values("B").collect();
        assert_eq!(values, vec!["two", "three"]);
    }

    #[test]
    fn test_parse_continuation_lines() {
        let info = parse("External-Description: a rather long\n   description that wraps\nDone: yes\n");
        assert_eq!(
            info.first("External-Description"),
            Some("a rather long\n   description that wraps")
        );
        assert_eq!(info.first("Done"), Some("yes"));
    }

    #[test]
    fn test_parse_final_value_runs_to_end() {
        let info = parse("Note: last field\n  continues to the very end");
        assert_eq!(info.first("Note"), Some("last field\n  continues to the very end"));
    }

    #[test]
    fn test_parse_tolerates_flexible_head_whitespace() {
        let info = parse("Label\t : \t spaced value\n");
        assert_eq!(info.first("Label"), Some("spaced value"));
    }

    #[test]
    fn test_parse_empty_value() {
        let info = parse("Empty:\n");
        assert_eq!(info.first("Empty"), Some(""));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(BagInfo::parse("no colon here\n", Path::new("t")).is_err());
        assert!(BagInfo::parse("  : starts indented\n", Path::new("t")).is_err());
        assert!(BagInfo::parse(": empty label\n", Path::new("t")).is_err());
    }

    #[test]
    fn test_serialize_round_trip() {
        let text = "Source-Organization: Example Org\nBag-Count: 1 of 2\nBag-Count: 2 of 2\n";
        let info = parse(text);
        let (out, warnings) = info.serialize();
        assert_eq!(out, text);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_serialize_warns_on_colon_label() {
        let mut info = BagInfo::new();
        info.push("Weird:Label", "v");
        let (out, warnings) = info.serialize();
        assert_eq!(out, "Weird:Label: v\n");
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_insert_or_replace_keeps_position() {
        let mut info = parse("A: 1\nB: 2\nA: 3\n");
        info.insert_or_replace("A", "changed");
        info.insert_or_replace("C", "new");

        let pairs: Vec<_> = info
            .fields()
            .iter()
            .map(|f| (f.label.as_str(), f.value.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("A", "changed"), ("B", "2"), ("A", "3"), ("C", "new")]
        );
    }

    proptest! {
        #[test]
        fn prop_unfolded_fields_round_trip(
            entries in proptest::collection::vec(
                ("[A-Za-z][A-Za-z0-9-]{0,12}", "[!-~]([ -~]{0,30}[!-~])?"),
                1..8,
            )
        ) {
            let mut info = BagInfo::new();
            for (label, value) in &entries {
                info.push(label.clone(), value.clone());
            }

            let (text, _) = info.serialize();
            let reparsed = BagInfo::parse(&text, Path::new("prop")).unwrap();
            prop_assert_eq!(reparsed, info);
        }
    }
}
