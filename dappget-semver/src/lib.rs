use semver::VersionReq;
use std::error::Error as StdError;
use std::fmt;

pub use semver::Version;

const COMPARATOR_OPS: [&str; 7] = ["=", ">", ">=", "<", "<=", "~", "^"];

/// A parsed `||`-separated range, matched with npm semantics: a bare version
/// such as `1.2.3` means exactly that version rather than `^1.2.3`.
#[derive(Debug, Clone)]
pub struct RangeSet {
    original: String,
    ranges: Vec<VersionReq>,
}

#[derive(Debug, Clone)]
pub struct Error {
    input: String,
    message: String,
}

impl Error {
    pub fn new(input: String, message: String) -> Self {
        Self { input, message }
    }

    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.input)
    }
}

impl StdError for Error {}

impl RangeSet {
    pub fn parse(original: &str) -> Result<Self, Error> {
        let mut s = original.trim();

        if s.is_empty() || s == "latest" {
            s = "*";
        }

        let mut ranges = Vec::new();

        for part in s.split("||") {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let normalized = normalize_and_part(part);

            let req = VersionReq::parse(&normalized)
                .map_err(|err| Error::new(original.to_string(), err.to_string()))?;

            ranges.push(req);
        }

        if ranges.is_empty() {
            ranges.push(VersionReq::STAR);
        }

        Ok(RangeSet {
            original: original.to_string(),
            ranges,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.ranges.iter().any(|r| r.matches(version))
    }

    /// True when the set accepts every release version.
    pub fn is_any(&self) -> bool {
        self.ranges.iter().any(|r| r.comparators.is_empty())
    }

    pub fn original(&self) -> &str {
        &self.original
    }
}

/// Parses a concrete version, tolerating a leading `v` or `=`.
pub fn parse_version(input: &str) -> Option<Version> {
    let trimmed = input.trim();
    let stripped = trimmed
        .strip_prefix('=')
        .unwrap_or(trimmed)
        .trim_start()
        .trim_start_matches(['v', 'V']);

    Version::parse(stripped).ok()
}

fn normalize_and_part(part: &str) -> String {
    let tokens: Vec<&str> = part.split_whitespace().collect();

    if tokens.len() == 3 && tokens[1] == "-" {
        let lower = normalize_comparator("", tokens[0]);
        let upper = normalize_comparator("", tokens[2]);
        return match (lower, upper) {
            (Some(lower), Some(upper)) => format!(
                ">={}, <={}",
                lower.trim_start_matches('='),
                upper.trim_start_matches('=')
            ),
            (Some(lower), None) => format!(">={}", lower.trim_start_matches('=')),
            (None, Some(upper)) => format!("<={}", upper.trim_start_matches('=')),
            (None, None) => "*".to_string(),
        };
    }

    let mut comparators = Vec::new();
    let mut pending_op: Option<&str> = None;

    for token in tokens {
        if COMPARATOR_OPS.contains(&token) {
            pending_op = Some(token);
            continue;
        }

        let (op, body) = match pending_op.take() {
            Some(op) => (op, token),
            None => split_operator(token),
        };

        if let Some(comparator) = normalize_comparator(op, body) {
            comparators.push(comparator);
        }
    }

    if comparators.is_empty() {
        "*".to_string()
    } else {
        comparators.join(", ")
    }
}

fn split_operator(token: &str) -> (&str, &str) {
    for op in [">=", "<=", ">", "<", "=", "~", "^"] {
        if let Some(rest) = token.strip_prefix(op) {
            return (op, rest);
        }
    }
    ("", token)
}

/// Returns `None` for a pure wildcard, which matches everything and must not
/// be combined with other comparators.
fn normalize_comparator(op: &str, body: &str) -> Option<String> {
    let body = body.trim().trim_start_matches(['v', 'V']);
    let (core, suffix) = match body.find(['-', '+']) {
        Some(idx) => body.split_at(idx),
        None => (body, ""),
    };

    let mut parts = Vec::new();
    for component in core.split('.') {
        if matches!(component, "x" | "X" | "*" | "") {
            break;
        }
        parts.push(component);
    }

    if parts.is_empty() {
        return None;
    }

    let truncated = parts.len() < 3;
    let version = if truncated {
        parts.join(".")
    } else {
        format!("{}{}", parts.join("."), suffix)
    };

    let op = if op.is_empty() { "=" } else { op };
    Some(format!("{op}{version}"))
}
