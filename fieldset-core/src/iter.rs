//! Depth-first iteration over leaf values

use std::collections::btree_map;

use crate::error::FieldSetError;
use crate::fieldset::{Entry, FieldSet, MAX_NESTING_DEPTH};

/// Deepest nesting the iterator follows before reporting a corrupt structure
///
/// Matches the limit enforced by [`FieldSet::put`], so any set built
/// through the public API iterates to completion by default.
pub const DEFAULT_MAX_DEPTH: usize = MAX_NESTING_DEPTH;

/// Lazy depth-first iterator over every leaf value of a [`FieldSet`]
///
/// Yields values, not keys. Uses an explicit stack, so deep nesting costs
/// heap rather than call stack. If subsets nest deeper than the limit the
/// iterator yields a single `CorruptStructure` error and then ends.
pub struct LeafValues<'a> {
    stack: Vec<btree_map::Iter<'a, String, Entry>>,
    max_depth: usize,
}

impl<'a> LeafValues<'a> {
    pub(crate) fn new(fs: &'a FieldSet) -> Self {
        Self {
            stack: vec![fs.entries_map().iter()],
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Override the nesting limit
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl<'a> Iterator for LeafValues<'a> {
    type Item = Result<&'a str, FieldSetError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                Some((_, Entry::Value(v))) => return Some(Ok(v.as_str())),
                Some((_, Entry::Subset(fs))) => {
                    // Entering this subset puts it stack.len() levels below the root
                    let depth = self.stack.len();
                    if depth > self.max_depth {
                        self.stack.clear();
                        return Some(Err(FieldSetError::CorruptStructure {
                            depth,
                            limit: self.max_depth,
                        }));
                    }
                    self.stack.push(fs.entries_map().iter());
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

impl std::iter::FusedIterator for LeafValues<'_> {}

impl FieldSet {
    /// Iterate over all leaf values, depth first
    pub fn leaf_values(&self) -> LeafValues<'_> {
        LeafValues::new(self)
    }
}
