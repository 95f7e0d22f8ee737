//! Failure classification of environment output.

use std::fmt;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of failure an output line reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Import,
    Syntax,
    Type,
    Runtime,
    Build,
    Test,
    Lint,
    /// Not classified; used for manually reported failures
    Unknown,
}

impl FailureKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Syntax => "syntax",
            Self::Type => "type",
            Self::Runtime => "runtime",
            Self::Build => "build",
            Self::Test => "test",
            Self::Lint => "lint",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Patterns per kind, in match priority order.
const PATTERNS: &[(FailureKind, &[&str])] = &[
    (
        FailureKind::Import,
        &[
            r"ModuleNotFoundError: No module named '(\w+)'",
            r"Cannot resolve module '(\w+)'",
            r"import.*not found",
            r"require.*not found",
        ],
    ),
    (
        FailureKind::Syntax,
        &[
            r"SyntaxError: (.+)",
            r"Unexpected token",
            r"Expected (.+) but found (.+)",
            r"Unterminated string literal",
        ],
    ),
    (
        FailureKind::Type,
        &[
            r"TypeError: (.+)",
            r"Cannot read property '(\w+)' of undefined",
            r"undefined is not a function",
            r"Property '(\w+)' does not exist",
        ],
    ),
    (
        FailureKind::Runtime,
        &[
            r"RuntimeError: (.+)",
            r"ReferenceError: (.+)",
            r"RangeError: (.+)",
            r"URIError: (.+)",
        ],
    ),
    (
        FailureKind::Build,
        &[
            r"Build failed",
            r"Compilation error",
            r"Webpack error",
            r"Vite error",
            r"TypeScript error",
        ],
    ),
    (
        FailureKind::Test,
        &[
            r"Test failed",
            r"AssertionError",
            r"Expect (.+) to be (.+)",
            r"Timeout",
        ],
    ),
    (
        FailureKind::Lint,
        &[
            r"ESLint error",
            r"Prettier error",
            r"Style error",
            r"Formatting error",
        ],
    ),
];

/// A classified line of output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub line: String,
    /// Deduplication key derived from the line text
    pub line_hash: String,
    /// Capture groups of the matching pattern
    pub captures: Vec<String>,
    pub observed_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(kind: FailureKind, line: impl Into<String>) -> Self {
        let line = line.into();
        Self {
            kind,
            line_hash: line_hash(&line),
            line,
            captures: Vec::new(),
            observed_at: Utc::now(),
        }
    }
}

/// SHA-256 of a line, hex encoded.
pub fn line_hash(line: &str) -> String {
    hex::encode(Sha256::digest(line.as_bytes()))
}

/// Matches output lines against the failure pattern table.
pub struct Classifier {
    patterns: Vec<(FailureKind, Regex)>,
}

impl Default for Classifier {
    fn default() -> Self {
        let patterns = PATTERNS
            .iter()
            .flat_map(|(kind, sources)| sources.iter().map(move |source| (*kind, *source)))
            .filter_map(|(kind, source)| {
                RegexBuilder::new(source)
                    .case_insensitive(true)
                    .build()
                    .ok()
                    .map(|regex| (kind, regex))
            })
            .collect();
        Self { patterns }
    }
}

impl Classifier {
    /// Classify one line. The first matching pattern wins; blank and
    /// unmatched lines yield `None`.
    pub fn classify(&self, line: &str) -> Option<FailureRecord> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        self.patterns.iter().find_map(|(kind, regex)| {
            regex.captures(line).map(|caps| {
                let mut record = FailureRecord::new(*kind, line);
                record.captures = caps
                    .iter()
                    .skip(1)
                    .flatten()
                    .map(|m| m.as_str().to_string())
                    .collect();
                record
            })
        })
    }

    pub fn classify_lines<I, S>(&self, lines: I) -> Vec<FailureRecord>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        lines
            .into_iter()
            .filter_map(|line| self.classify(line.as_ref()))
            .collect()
    }
}
