//! Permissive dotenv parsing for dotlab
//!
//! Reads `.env` formatted files into typed records while keeping track of
//! every line that was intentionally left out (blanks, comments, placeholder
//! values, shell interpolation). Supported syntax:
//!
//! - `KEY=VALUE` (unquoted, raw to end of line)
//! - `KEY="value"` (double-quoted, escape sequences, may span lines)
//! - `KEY='value'` (single-quoted, literal)
//! - `export KEY=VALUE` (prefix stripped)
//! - `# comment` and blank lines (skipped)

mod parser;

pub use parser::{
    parse_file, parse_reader, EnvVar, ParseError, ParseOutcome, QuoteKind, SkipReason, SkippedLine,
};
