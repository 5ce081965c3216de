//! Source positions attached to graph nodes.
//!
//! Every public node constructor is `#[track_caller]`, so the position of the
//! user code that built a node is recorded without any macro. The record is
//! treated as an opaque, comparable tuple: nothing in the crate parses it.

use std::fmt;
use std::panic::Location;

use serde::{Deserialize, Serialize};

/// Where a node was constructed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// File name as reported by the compiler.
    pub file: String,
    /// One-based line number.
    pub line: u32,
    /// Byte offset of the start of the line.
    pub line_start: u32,
    /// Byte offset of the position itself.
    pub offset: u32,
}

impl SourceLocation {
    /// Creates a location from its four raw fields.
    pub fn new(file: impl Into<String>, line: u32, line_start: u32, offset: u32) -> Self {
        SourceLocation {
            file: file.into(),
            line,
            line_start,
            offset,
        }
    }

    /// Captures the location of the caller.
    ///
    /// The compiler only reports a column, so the line start is recorded as
    /// zero and the offset is the zero-based column.
    #[track_caller]
    pub fn caller() -> Self {
        let loc = Location::caller();
        SourceLocation {
            file: loc.file().to_string(),
            line: loc.line(),
            line_start: 0,
            offset: loc.column().saturating_sub(1),
        }
    }

    /// Zero-based column of this location.
    pub fn column(&self) -> u32 {
        self.offset.saturating_sub(self.line_start)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_points_at_this_file() {
        let here = SourceLocation::caller();
        assert!(here.file.ends_with("location.rs"));
        assert!(here.line > 0);
    }

    #[test]
    fn display_uses_column_relative_to_line_start() {
        let loc = SourceLocation::new("app.rs", 12, 100, 104);
        assert_eq!(loc.to_string(), "app.rs:12:4");
    }

    #[test]
    fn locations_order_by_file_then_line() {
        let a = SourceLocation::new("a.rs", 9, 0, 0);
        let b = SourceLocation::new("a.rs", 10, 0, 0);
        let c = SourceLocation::new("b.rs", 1, 0, 0);
        assert!(a < b);
        assert!(b < c);
    }
}
