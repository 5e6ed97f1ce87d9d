//! Line-oriented dotenv lexer.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a line was left out of the parsed entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Empty or whitespace-only line.
    Blank,
    /// Line starting with `#`.
    Comment,
    /// Value matches a "please fill this in" pattern.
    Placeholder,
    /// Value contains an unescaped `${...}` reference.
    Interpolation,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Blank => "blank",
            Self::Comment => "comment",
            Self::Placeholder => "placeholder",
            Self::Interpolation => "interpolation",
        };
        f.write_str(s)
    }
}

/// Which quote style an unterminated value used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteKind {
    Single,
    Double,
}

impl std::fmt::Display for QuoteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => f.write_str("single quote"),
            Self::Double => f.write_str("double quote"),
        }
    }
}

/// A parsed environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    pub key: String,
    /// Decoded value: quotes removed, escape sequences applied.
    pub value: String,
    /// 1-indexed line the key appears on.
    pub line: usize,
}

/// A line that was intentionally not surfaced as an [`EnvVar`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    pub line: usize,
    /// Present for placeholder/interpolation skips where a key was parsed.
    pub key: Option<String>,
    pub reason: SkipReason,
}

/// Outcome of parsing a dotenv stream.
#[derive(Debug, Default, Clone)]
pub struct ParseOutcome {
    pub entries: Vec<EnvVar>,
    pub skipped: Vec<SkippedLine>,
}

/// Errors that abort parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read env file: {0}")]
    Read(#[source] io::Error),

    #[error("unterminated {kind} in value for {key} opened on line {line}")]
    UnterminatedQuote {
        kind: QuoteKind,
        line: usize,
        key: String,
    },
}

/// Case-insensitive substrings that mark a value as a placeholder.
const PLACEHOLDER_PATTERNS: &[&str] = &["your_", "change_me", "replace_with_"];

/// Open `path` and parse it as a dotenv file.
pub fn parse_file(path: impl AsRef<Path>) -> Result<ParseOutcome, ParseError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ParseError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse_reader(file)
}

/// Parse a dotenv formatted stream.
///
/// Lines may be arbitrarily long; multi-line double-quoted values are
/// accumulated until the closing quote. Lines without `=` or with an empty
/// key are skipped silently, so partially written files still parse.
pub fn parse_reader<R: Read>(reader: R) -> Result<ParseOutcome, ParseError> {
    let mut lines = LineSource::new(BufReader::new(reader));
    let mut entries: Vec<EnvVar> = Vec::new();
    let mut skipped: Vec<SkippedLine> = Vec::new();

    while let Some(raw) = lines.next_line()? {
        let line_no = lines.current();

        let mut trimmed = raw.trim();
        if let Some(rest) = trimmed.strip_prefix("export ") {
            trimmed = rest.trim();
        }

        if trimmed.is_empty() {
            skipped.push(SkippedLine {
                line: line_no,
                key: None,
                reason: SkipReason::Blank,
            });
            continue;
        }
        if trimmed.starts_with('#') {
            skipped.push(SkippedLine {
                line: line_no,
                key: None,
                reason: SkipReason::Comment,
            });
            continue;
        }

        // Not a key=value line; tolerate and move on.
        let Some(eq) = trimmed.find('=') else {
            continue;
        };
        let key = trimmed[..eq].trim_end_matches([' ', '\t']);
        if key.is_empty() {
            continue;
        }
        let rest = &trimmed[eq + 1..];

        // The interpolation check must see double-quoted content *before*
        // unescaping so that `\${LITERAL}` survives as a literal.
        let (check_target, decoded) = match rest.as_bytes().first().copied() {
            Some(b'"') => {
                let content = read_double_quoted(&mut lines, &rest[1..], line_no, key)?;
                let decoded = unescape(&content);
                (content, decoded)
            }
            Some(b'\'') => {
                let inner = &rest[1..];
                let Some(close) = inner.find('\'') else {
                    return Err(ParseError::UnterminatedQuote {
                        kind: QuoteKind::Single,
                        line: line_no,
                        key: key.to_string(),
                    });
                };
                let literal = inner[..close].to_string();
                (literal.clone(), literal)
            }
            _ => (rest.to_string(), rest.to_string()),
        };

        if contains_unescaped_interpolation(&check_target) {
            skipped.push(SkippedLine {
                line: line_no,
                key: Some(key.to_string()),
                reason: SkipReason::Interpolation,
            });
            continue;
        }

        if is_placeholder(&decoded) {
            skipped.push(SkippedLine {
                line: line_no,
                key: Some(key.to_string()),
                reason: SkipReason::Placeholder,
            });
            continue;
        }

        entries.push(EnvVar {
            key: key.to_string(),
            value: decoded,
            line: line_no,
        });
    }

    Ok(ParseOutcome {
        entries: dedup_last_wins(entries),
        skipped,
    })
}

/// Pulls physical lines, tracking the 1-indexed position.
struct LineSource<R: BufRead> {
    inner: R,
    line: usize,
}

impl<R: BufRead> LineSource<R> {
    fn new(inner: R) -> Self {
        Self { inner, line: 0 }
    }

    fn current(&self) -> usize {
        self.line
    }

    /// Next physical line with the terminator (`\n` or `\r\n`) removed.
    fn next_line(&mut self) -> Result<Option<String>, ParseError> {
        let mut buf = String::new();
        let n = self.inner.read_line(&mut buf).map_err(ParseError::Read)?;
        if n == 0 {
            return Ok(None);
        }
        if buf.ends_with('\n') {
            buf.pop();
            if buf.ends_with('\r') {
                buf.pop();
            }
        }
        self.line += 1;
        Ok(Some(buf))
    }
}

/// Accumulate a double-quoted value until an unescaped `"`.
///
/// Returns the raw content (escape sequences intact). Physical lines are
/// joined with `\n`. A quote is escaped iff an odd number of backslashes
/// immediately precede it; runs of backslashes never cross the inserted
/// `\n`, so each appended segment can be scanned independently.
fn read_double_quoted<R: BufRead>(
    lines: &mut LineSource<R>,
    first_segment: &str,
    opening_line: usize,
    key: &str,
) -> Result<String, ParseError> {
    if let Some(close) = find_unescaped(first_segment, b'"') {
        return Ok(first_segment[..close].to_string());
    }

    let mut acc = String::from(first_segment);
    loop {
        let Some(next) = lines.next_line()? else {
            return Err(ParseError::UnterminatedQuote {
                kind: QuoteKind::Double,
                line: opening_line,
                key: key.to_string(),
            });
        };
        acc.push('\n');
        let base = acc.len();
        acc.push_str(&next);
        if let Some(close) = find_unescaped(&acc[base..], b'"') {
            acc.truncate(base + close);
            return Ok(acc);
        }
    }
}

/// Byte offset of the first `target` preceded by an even number of backslashes.
fn find_unescaped(s: &str, target: u8) -> Option<usize> {
    let mut backslashes = 0usize;
    for (i, &b) in s.as_bytes().iter().enumerate() {
        if b == target && backslashes % 2 == 0 {
            return Some(i);
        }
        if b == b'\\' {
            backslashes += 1;
        } else {
            backslashes = 0;
        }
    }
    None
}

/// True if the value contains `${` not escaped by a backslash.
fn contains_unescaped_interpolation(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut backslashes = 0usize;
    for i in 0..bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') && backslashes % 2 == 0 {
            return true;
        }
        if bytes[i] == b'\\' {
            backslashes += 1;
        } else {
            backslashes = 0;
        }
    }
    false
}

/// Apply double-quote escape sequences. Unknown sequences keep the backslash.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('$') => out.push('$'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn is_placeholder(value: &str) -> bool {
    let lower = value.to_lowercase();
    PLACEHOLDER_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Last occurrence of a key wins; earlier duplicates are dropped.
fn dedup_last_wins(entries: Vec<EnvVar>) -> Vec<EnvVar> {
    let mut seen = std::collections::HashSet::new();
    let mut kept: Vec<EnvVar> = entries
        .into_iter()
        .rev()
        .filter(|e| seen.insert(e.key.clone()))
        .collect();
    kept.reverse();
    kept
}
