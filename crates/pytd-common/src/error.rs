//! The structured parse error shared by every pipeline stage.
//!
//! All stages -- lexer, grammar, conditional evaluator, merger, validator --
//! report failure through a single [`ParseError`] value. The display format
//! is part of the external contract and is reproduced exactly:
//!
//! ```text
//!   File: "foo.py", line 123
//!     this is a test
//!          ^
//! ParseError: my message
//! ```

use std::fmt;

use serde::Serialize;

/// A structured parse failure.
///
/// `message` is always present. `filename` and `line` control the header
/// line; `text` (the raw source line) and `column` (1-based byte column into
/// `text`) control the excerpt-with-caret block. Either half may be absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseError {
    pub message: String,
    pub filename: Option<String>,
    pub line: Option<u32>,
    pub text: Option<String>,
    pub column: Option<usize>,
}

impl ParseError {
    /// An error with no location information.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            filename: None,
            line: None,
            text: None,
            column: None,
        }
    }

    /// An error pinned to a source line.
    pub fn at_line(message: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            filename: None,
            line: Some(line),
            text: None,
            column: None,
        }
    }

    /// An error with a full excerpt: line, raw line text, and 1-based column.
    pub fn with_excerpt(message: impl Into<String>, line: u32, text: impl Into<String>, column: usize) -> Self {
        Self {
            message: message.into(),
            filename: None,
            line: Some(line),
            text: Some(text.into()),
            column: Some(column),
        }
    }

    /// Attach a filename for display, if one was supplied to the parser.
    pub fn with_filename(mut self, filename: Option<&str>) -> Self {
        self.filename = filename.map(str::to_owned);
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines: Vec<String> = Vec::new();
        if self.filename.is_some() || self.line.is_some() {
            let filename = self.filename.as_deref().unwrap_or("None");
            let line = match self.line {
                Some(n) => n.to_string(),
                None => "None".to_string(),
            };
            lines.push(format!("  File: \"{filename}\", line {line}"));
        }
        // The excerpt is shown only when both the text and a nonzero column
        // are known. The caret points at `column` within the raw line,
        // shifted left by however much indentation was stripped.
        if let (Some(text), Some(column)) = (&self.text, self.column) {
            if column > 0 {
                let stripped = text.trim_start();
                lines.push(format!("    {stripped}"));
                let pos = (4 + column - 1).saturating_sub(text.len() - stripped.len());
                lines.push(format!("{:pos$}^", ""));
            }
        }
        lines.push(format!("ParseError: {}", self.message));
        write!(f, "{}", lines.join("\n"))
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(expected: &str, err: ParseError) {
        assert_eq!(err.to_string(), expected);
    }

    #[test]
    fn plain_error() {
        check("ParseError: my message", ParseError::new("my message"));
    }

    #[test]
    fn full_error() {
        check(
            "  File: \"foo.py\", line 123\n    this is a test\n         ^\nParseError: my message",
            ParseError::with_excerpt("my message", 123, "this is a test", 6).with_filename(Some("foo.py")),
        );
    }

    #[test]
    fn indented_text() {
        // Leading whitespace in the excerpt is stripped and the caret
        // position is adjusted by the stripped amount.
        check(
            "  File: \"foo.py\", line 123\n    this is a test\n         ^\nParseError: my message",
            ParseError::with_excerpt("my message", 123, "          this is a test", 16).with_filename(Some("foo.py")),
        );
    }

    #[test]
    fn line_without_filename() {
        check(
            "  File: \"None\", line 1\nParseError: my message",
            ParseError::at_line("my message", 1),
        );
    }

    #[test]
    fn filename_without_line() {
        check(
            "  File: \"foo.py\", line None\nParseError: my message",
            ParseError::new("my message").with_filename(Some("foo.py")),
        );
    }

    #[test]
    fn text_without_column() {
        let mut err = ParseError::new("my message");
        err.text = Some("this is  a test".to_string());
        check("ParseError: my message", err);
    }

    #[test]
    fn column_without_text() {
        let mut err = ParseError::new("my message");
        err.column = Some(5);
        check("ParseError: my message", err);
    }
}
