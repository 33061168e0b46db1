//! Placeholder numbering shared by every part of a statement.

use crate::value::SqlValue;

/// Parameters of one statement, numbered from `offset + 1`.
///
/// Payload parameters (INSERT values, UPDATE `SET`) are pushed first, then filter
/// parameters continue the same sequence.
#[derive(Clone, Debug, Default)]
pub struct ParamList {
    offset: usize,
    params: Vec<SqlValue>,
}

impl ParamList {
    /// Create a new empty parameter list starting at `$1`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty list whose first placeholder is `$start`.
    pub fn starting_at(start: usize) -> Self {
        Self {
            offset: start.saturating_sub(1),
            params: Vec::new(),
        }
    }

    /// Add a parameter and return its 1-based placeholder index.
    pub fn push(&mut self, value: SqlValue) -> usize {
        self.params.push(value);
        self.offset + self.params.len()
    }

    /// Index the next pushed parameter will get.
    pub fn next_index(&self) -> usize {
        self.offset + self.params.len() + 1
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn into_vec(self) -> Vec<SqlValue> {
        self.params
    }

    /// Append another list built to continue this one.
    pub fn extend(&mut self, other: ParamList) {
        debug_assert_eq!(other.offset + 1, self.next_index());
        self.params.extend(other.params);
    }
}
