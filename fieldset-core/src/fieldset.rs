//! Hierarchical field sets
//!
//! A field set is a small key/value record used for node configuration,
//! handshakes and message metadata. In multi-level mode a `.` in a key
//! addresses a nested field set:
//!
//! ```text
//! key1=value1
//! key2.sub1=value2
//! key2.sub2=value3
//! End
//! ```
//!
//! Repeated puts of the same leaf key accumulate as `value;value;...`.
//! There is no escaping, so a value containing `;` splits into several
//! entries in [`FieldSet::get_all`], and a value cannot contain a newline.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::io;

use crate::error::{EntryKind, FieldSetError};
use crate::line_reader::DEFAULT_MAX_LINE_LENGTH;

/// Path separator for multi-level field sets
pub const MULTI_LEVEL_CHAR: char = '.';

/// Separator between accumulated values of one key
pub const VALUE_SEPARATOR: char = ';';

/// Terminator written when none was captured during parsing
pub const DEFAULT_END_MARKER: &str = "End";

/// Deepest subset nesting a field set may hold
///
/// Large enough for any key that fits in a default-length line.
pub const MAX_NESTING_DEPTH: usize = DEFAULT_MAX_LINE_LENGTH / 2;

/// A single entry of a field set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Entry {
    Value(String),
    Subset(FieldSet),
}

impl Entry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::Value(_) => EntryKind::Value,
            Entry::Subset(_) => EntryKind::Subset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSet {
    entries: BTreeMap<String, Entry>,
    multi_level: bool,
    end_marker: Option<String>,
}

impl FieldSet {
    /// Create an empty field set
    pub fn new(multi_level: bool) -> Self {
        Self {
            entries: BTreeMap::new(),
            multi_level,
            end_marker: None,
        }
    }

    pub fn is_multi_level(&self) -> bool {
        self.multi_level
    }

    /// Number of top-level entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top-level entries in map order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn entries_map(&self) -> &BTreeMap<String, Entry> {
        &self.entries
    }

    /// The terminator line captured while parsing, if any
    pub fn end_marker(&self) -> Option<&str> {
        self.end_marker.as_deref()
    }

    /// Set the terminator written by [`FieldSet::write_to`]
    ///
    /// There is no escaping: a marker containing `=` or a newline cannot be
    /// parsed back as a terminator.
    pub fn set_end_marker(&mut self, marker: impl Into<String>) {
        let marker = marker.into();
        debug_assert!(
            !marker.contains('=') && !marker.contains('\n'),
            "end marker {marker:?} would not parse back as a terminator"
        );
        self.end_marker = Some(marker);
    }

    /// Split a key at its first separator, if this set treats `.` as one
    fn split_key<'k>(&self, key: &'k str) -> Option<(&'k str, &'k str)> {
        if self.multi_level {
            key.split_once(MULTI_LEVEL_CHAR)
        } else {
            None
        }
    }

    /// Deepest subset nesting below this set; 0 when it holds only values
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(0usize, self)];
        while let Some((level, fs)) = stack.pop() {
            deepest = deepest.max(level);
            for entry in fs.entries.values() {
                if let Entry::Subset(child) = entry {
                    stack.push((level + 1, child));
                }
            }
        }
        deepest
    }

    /// Store a value, appending to any value already under `key`
    ///
    /// In multi-level mode intermediate subsets are created as needed.
    /// Fails with `TypeConflict` if a path segment (or the final key)
    /// already holds the other kind of entry, and with `CorruptStructure`
    /// if the key nests deeper than [`MAX_NESTING_DEPTH`]. Nothing is
    /// modified on failure.
    pub fn put(&mut self, key: &str, value: &str) -> Result<(), FieldSetError> {
        if self.multi_level {
            let depth = key.matches(MULTI_LEVEL_CHAR).count();
            if depth > MAX_NESTING_DEPTH {
                return Err(FieldSetError::CorruptStructure {
                    depth,
                    limit: MAX_NESTING_DEPTH,
                });
            }
        }

        let mut fs = self;
        let mut rest = key;
        while let Some((before, after)) = fs.split_key(rest) {
            let child = fs
                .entries
                .entry(before.to_string())
                .or_insert_with(|| Entry::Subset(FieldSet::new(true)));
            match child {
                Entry::Subset(next) => {
                    fs = next;
                    rest = after;
                }
                Entry::Value(_) => {
                    return Err(FieldSetError::TypeConflict {
                        key: before.to_string(),
                        expected: EntryKind::Subset,
                    })
                }
            }
        }

        match fs.entries.get_mut(rest) {
            None => {
                fs.entries
                    .insert(rest.to_string(), Entry::Value(value.to_string()));
                Ok(())
            }
            Some(Entry::Value(existing)) => {
                existing.push(VALUE_SEPARATOR);
                existing.push_str(value);
                Ok(())
            }
            Some(Entry::Subset(_)) => Err(FieldSetError::TypeConflict {
                key: rest.to_string(),
                expected: EntryKind::Value,
            }),
        }
    }

    /// Attach a whole field set under `key`
    ///
    /// Both sets must be multi-level and `key` must not exist yet. The key
    /// is stored literally, without path resolution.
    pub fn put_subset(&mut self, key: &str, subset: FieldSet) -> Result<(), FieldSetError> {
        if !self.multi_level {
            return Err(FieldSetError::NotMultiLevel(key.to_string()));
        }
        if !subset.multi_level {
            return Err(FieldSetError::NotMultiLevel(format!(
                "subset for {key:?} is not multi-level"
            )));
        }
        if self.entries.contains_key(key) {
            return Err(FieldSetError::DuplicateKey(key.to_string()));
        }
        let depth = subset.depth() + 1;
        if depth > MAX_NESTING_DEPTH {
            return Err(FieldSetError::CorruptStructure {
                depth,
                limit: MAX_NESTING_DEPTH,
            });
        }
        self.entries.insert(key.to_string(), Entry::Subset(subset));
        Ok(())
    }

    /// Resolve a key path to its entry, one segment at a time
    fn resolve(&self, key: &str) -> Option<&Entry> {
        let mut fs = self;
        let mut rest = key;
        loop {
            match fs.split_key(rest) {
                None => return fs.entries.get(rest),
                Some((before, after)) => match fs.entries.get(before)? {
                    Entry::Subset(child) => {
                        fs = child;
                        rest = after;
                    }
                    Entry::Value(_) => return None,
                },
            }
        }
    }

    /// Raw value for `key`, possibly a `;`-joined list
    pub fn get(&self, key: &str) -> Option<&str> {
        match self.resolve(key)? {
            Entry::Value(v) => Some(v.as_str()),
            Entry::Subset(_) => None,
        }
    }

    /// All values stored under `key`, split on `;`
    ///
    /// Empty segments are kept, so `"x;"` yields `["x", ""]`.
    pub fn get_all(&self, key: &str) -> Option<Vec<&str>> {
        self.get(key).map(|v| v.split(VALUE_SEPARATOR).collect())
    }

    /// Nested field set at `key`
    ///
    /// Returns `Ok(None)` when a segment is missing or resolves to a value.
    pub fn subset(&self, key: &str) -> Result<Option<&FieldSet>, FieldSetError> {
        if !self.multi_level {
            return Err(FieldSetError::NotMultiLevel(key.to_string()));
        }
        Ok(match self.resolve(key) {
            Some(Entry::Subset(fs)) => Some(fs),
            _ => None,
        })
    }

    /// Visit every leaf as `(prefix, key, value)`, depth first
    fn walk_leaves<E>(
        &self,
        mut visit: impl FnMut(&str, &str, &str) -> Result<(), E>,
    ) -> Result<(), E> {
        // One shared prefix buffer; each frame records the prefix length it owns
        let mut prefix = String::new();
        let mut stack = vec![(0usize, self.entries.iter())];
        while let Some((_, iter)) = stack.last_mut() {
            match iter.next() {
                Some((key, Entry::Value(v))) => visit(&prefix, key, v)?,
                Some((key, Entry::Subset(fs))) => {
                    prefix.push_str(key);
                    prefix.push(MULTI_LEVEL_CHAR);
                    stack.push((prefix.len(), fs.entries.iter()));
                }
                None => {
                    stack.pop();
                    if let Some((len, _)) = stack.last() {
                        prefix.truncate(*len);
                    }
                }
            }
        }
        Ok(())
    }

    /// Fully qualified `(key, value)` pairs of every leaf, depth first
    pub fn flatten(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let _: Result<(), Infallible> = self.walk_leaves(|prefix, key, value| {
            out.push((format!("{prefix}{key}"), value.to_string()));
            Ok(())
        });
        out
    }

    /// Serialize the field set, followed by its terminator line
    pub fn write_to<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        write!(w, "{self}")
    }
}

impl fmt::Display for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.walk_leaves(|prefix, key, value| writeln!(f, "{prefix}{key}={value}"))?;
        writeln!(f, "{}", self.end_marker().unwrap_or(DEFAULT_END_MARKER))
    }
}

// Nesting is bounded by MAX_NESTING_DEPTH, which keeps this recursion shallow
impl Serialize for FieldSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(&self.entries)
    }
}

impl Drop for FieldSet {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        // Detach children before they drop so teardown never recurses
        let mut pending = vec![std::mem::take(&mut self.entries)];
        while let Some(entries) = pending.pop() {
            for entry in entries.into_values() {
                if let Entry::Subset(mut child) = entry {
                    pending.push(std::mem::take(&mut child.entries));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get_flat() {
        let mut fs = FieldSet::new(false);
        fs.put("name", "node1").unwrap();

        assert_eq!(fs.get("name"), Some("node1"));
        assert_eq!(fs.get("missing"), None);
        assert_eq!(fs.len(), 1);
    }

    #[test]
    fn test_repeated_put_appends() {
        let mut fs = FieldSet::new(true);
        fs.put("a", "x").unwrap();
        fs.put("a", "y").unwrap();

        assert_eq!(fs.get("a"), Some("x;y"));
        assert_eq!(fs.get_all("a"), Some(vec!["x", "y"]));
    }

    #[test]
    fn test_get_all_missing_key() {
        let fs = FieldSet::new(true);
        assert_eq!(fs.get_all("nope"), None);
    }

    #[test]
    fn test_empty_value_is_stored() {
        let mut fs = FieldSet::new(true);
        fs.put("empty", "").unwrap();
        assert_eq!(fs.get("empty"), Some(""));
        assert_eq!(fs.get_all("empty"), Some(vec![""]));
    }

    #[test]
    fn test_nested_resolution() {
        let mut fs = FieldSet::new(true);
        fs.put("a.b.c", "v").unwrap();

        assert_eq!(fs.get("a.b.c"), Some("v"));
        let sub = fs.subset("a.b").unwrap().expect("subset a.b");
        assert_eq!(sub.get("c"), Some("v"));
        assert!(sub.is_multi_level());

        // Intermediate segments are subsets, not values
        assert_eq!(fs.get("a"), None);
        assert_eq!(fs.get("a.b"), None);
    }

    #[test]
    fn test_flat_mode_keeps_dots_literal() {
        let mut fs = FieldSet::new(false);
        fs.put("a.b", "v").unwrap();

        assert_eq!(fs.get("a.b"), Some("v"));
        assert_eq!(fs.get("a"), None);
        assert_eq!(fs.len(), 1);
        assert!(matches!(
            fs.subset("a"),
            Err(FieldSetError::NotMultiLevel(_))
        ));
    }

    #[test]
    fn test_put_value_over_subset_conflicts() {
        let mut fs = FieldSet::new(true);
        fs.put("a.b", "1").unwrap();

        let err = fs.put("a", "2").unwrap_err();
        assert!(matches!(
            err,
            FieldSetError::TypeConflict { ref key, expected: EntryKind::Value } if key == "a"
        ));
        // Nothing was modified
        assert_eq!(fs.get("a.b"), Some("1"));
    }

    #[test]
    fn test_put_path_through_value_conflicts() {
        let mut fs = FieldSet::new(true);
        fs.put("a", "1").unwrap();

        let err = fs.put("a.b", "2").unwrap_err();
        assert!(matches!(
            err,
            FieldSetError::TypeConflict { ref key, expected: EntryKind::Subset } if key == "a"
        ));
        assert_eq!(fs.get("a"), Some("1"));
    }

    #[test]
    fn test_get_through_value_is_absent() {
        let mut fs = FieldSet::new(true);
        fs.put("a", "1").unwrap();

        assert_eq!(fs.get("a.b"), None);
        assert!(fs.subset("a").unwrap().is_none());
        assert!(fs.subset("a.b").unwrap().is_none());
    }

    #[test]
    fn test_put_subset() {
        let mut child = FieldSet::new(true);
        child.put("port", "8070").unwrap();

        let mut fs = FieldSet::new(true);
        fs.put_subset("net", child).unwrap();
        assert_eq!(fs.get("net.port"), Some("8070"));

        // Further puts merge into the attached subset
        fs.put("net.host", "localhost").unwrap();
        assert_eq!(fs.subset("net").unwrap().unwrap().len(), 2);
    }

    #[test]
    fn test_put_subset_duplicate_key() {
        let mut fs = FieldSet::new(true);
        fs.put("net", "x").unwrap();

        let err = fs.put_subset("net", FieldSet::new(true)).unwrap_err();
        assert!(matches!(err, FieldSetError::DuplicateKey(ref k) if k == "net"));
    }

    #[test]
    fn test_put_subset_requires_multi_level() {
        let mut flat = FieldSet::new(false);
        assert!(matches!(
            flat.put_subset("x", FieldSet::new(true)),
            Err(FieldSetError::NotMultiLevel(_))
        ));

        let mut fs = FieldSet::new(true);
        assert!(matches!(
            fs.put_subset("x", FieldSet::new(false)),
            Err(FieldSetError::NotMultiLevel(_))
        ));
        assert!(fs.is_empty());
    }

    #[test]
    fn test_key_nesting_beyond_limit_rejected() {
        let key = vec!["a"; 200_000].join(".");
        let mut fs = FieldSet::new(true);

        let err = fs.put(&key, "v").unwrap_err();
        assert!(matches!(
            err,
            FieldSetError::CorruptStructure { depth: 199_999, limit: MAX_NESTING_DEPTH }
        ));
        // Rejected before anything was created
        assert!(fs.is_empty());
    }

    #[test]
    fn test_key_nesting_at_limit_accepted() {
        let key = vec!["a"; MAX_NESTING_DEPTH + 1].join(".");
        let mut fs = FieldSet::new(true);
        fs.put(&key, "v").unwrap();

        assert_eq!(fs.depth(), MAX_NESTING_DEPTH);
        assert_eq!(fs.get(&key), Some("v"));
        assert!(fs.to_string().ends_with("a=v\nEnd\n"));
    }

    #[test]
    fn test_flat_mode_has_no_nesting_limit() {
        let key = vec!["a"; MAX_NESTING_DEPTH + 10].join(".");
        let mut fs = FieldSet::new(false);
        fs.put(&key, "v").unwrap();
        assert_eq!(fs.depth(), 0);
    }

    #[test]
    fn test_put_subset_beyond_limit_rejected() {
        let key = vec!["a"; MAX_NESTING_DEPTH + 1].join(".");
        let mut deep = FieldSet::new(true);
        deep.put(&key, "v").unwrap();

        let mut fs = FieldSet::new(true);
        let err = fs.put_subset("root", deep).unwrap_err();
        assert!(matches!(
            err,
            FieldSetError::CorruptStructure { depth, .. } if depth == MAX_NESTING_DEPTH + 1
        ));
        assert!(fs.is_empty());
    }

    #[test]
    fn test_get_all_keeps_trailing_empty_segment() {
        let mut fs = FieldSet::new(true);
        fs.put("k", "x").unwrap();
        fs.put("k", "").unwrap();

        assert_eq!(fs.get("k"), Some("x;"));
        assert_eq!(fs.get_all("k"), Some(vec!["x", ""]));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "would not parse back")]
    fn test_end_marker_with_equals_rejected() {
        let mut fs = FieldSet::new(true);
        fs.set_end_marker("End=1");
    }

    #[test]
    fn test_serialize_default_terminator() {
        let mut fs = FieldSet::new(true);
        fs.put("b.y", "2").unwrap();
        fs.put("a", "1").unwrap();
        fs.put("b.x", "3").unwrap();

        assert_eq!(fs.to_string(), "a=1\nb.x=3\nb.y=2\nEnd\n");
    }

    #[test]
    fn test_serialize_custom_terminator() {
        let mut fs = FieldSet::new(true);
        fs.put("k", "v").unwrap();
        fs.set_end_marker("EndMessage");

        assert_eq!(fs.end_marker(), Some("EndMessage"));
        assert_eq!(fs.to_string(), "k=v\nEndMessage\n");
    }

    #[test]
    fn test_nested_subset_terminator_is_suppressed() {
        let mut child = FieldSet::new(true);
        child.put("c", "v").unwrap();
        child.set_end_marker("ChildEnd");

        let mut fs = FieldSet::new(true);
        fs.put_subset("p", child).unwrap();
        assert_eq!(fs.to_string(), "p.c=v\nEnd\n");
    }

    #[test]
    fn test_empty_field_set_serializes_to_terminator() {
        assert_eq!(FieldSet::new(true).to_string(), "End\n");
    }

    #[test]
    fn test_write_to_matches_display() {
        let mut fs = FieldSet::new(true);
        fs.put("x.y", "1").unwrap();

        let mut buf = Vec::new();
        fs.write_to(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), fs.to_string());
    }

    #[test]
    fn test_flatten() {
        let mut fs = FieldSet::new(true);
        fs.put("a.b.c", "1").unwrap();
        fs.put("a.d", "2").unwrap();
        fs.put("e", "3").unwrap();
        fs.put("e", "4").unwrap();

        assert_eq!(
            fs.flatten(),
            vec![
                ("a.b.c".to_string(), "1".to_string()),
                ("a.d".to_string(), "2".to_string()),
                ("e".to_string(), "3;4".to_string()),
            ]
        );
    }

    #[test]
    fn test_serde_json_nested_map() {
        let mut fs = FieldSet::new(true);
        fs.put("node.name", "alpha").unwrap();
        fs.put("version", "1").unwrap();

        let json = serde_json::to_value(&fs).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "node": { "name": "alpha" }, "version": "1" })
        );
    }
}
