//! Input sanitization and malicious-pattern detection.
//!
//! # Responsibilities
//! - Clean request paths of traversal sequences (literal and encoded)
//! - Reject parameters with null/control bytes or malformed encoding
//! - Detect SQL-injection, XSS, command-injection and traversal signatures
//!
//! # Design Decisions
//! - Path sanitization cleans; parameter sanitization rejects
//! - Detection never rejects by itself; callers decide per field class
//! - Rejections carry a category, never the payload
//! - Plain alphanumeric input is passed through borrowed

use std::borrow::Cow;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Upper bound on decode passes for nested encodings.
const MAX_DECODE_PASSES: usize = 4;

/// Why a value was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCategory {
    NullOrControl,
    InvalidEncoding,
}

impl RejectionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionCategory::NullOrControl => "null_or_control",
            RejectionCategory::InvalidEncoding => "invalid_encoding",
        }
    }
}

impl fmt::Display for RejectionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Families of malicious input recognized by detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    SqlInjection,
    #[serde(rename = "xss")]
    CrossSiteScripting,
    CommandInjection,
    PathTraversal,
}

impl ThreatCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatCategory::SqlInjection => "sql_injection",
            ThreatCategory::CrossSiteScripting => "xss",
            ThreatCategory::CommandInjection => "command_injection",
            ThreatCategory::PathTraversal => "path_traversal",
        }
    }

    /// The injection families fatal for path and identifier fields.
    pub fn is_injection(&self) -> bool {
        !matches!(self, ThreatCategory::PathTraversal)
    }
}

impl fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of cleaning a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedPath {
    pub path: String,
    /// True when traversal sequences or doubled separators were removed.
    pub modified: bool,
}

static SQL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)'\s*;\s*(drop|delete|insert|update|alter|create|truncate|exec)\b",
        r"(?i)\bunion\b(\s+all)?\s+\bselect\b",
        r"(?i)'\s*or\s+'?\w+'?\s*=\s*'?\w+",
        r"(?i)'\s*(--|#)",
        r";\s*--",
        r"/\*.*?\*/",
        r"(?i)\b(sleep|benchmark|waitfor\s+delay)\s*\(",
    ])
});

static XSS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)<\s*/?\s*script\b",
        r"(?i)javascript\s*:",
        r"(?i)vbscript\s*:",
        r"(?i)\bon[a-z]+\s*=",
        r"(?i)<\s*(iframe|object|embed|svg|img|link|style)\b",
        r"(?i)data\s*:\s*text/html",
    ])
});

static COMMAND_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"`[^`]*`",
        r"\$\([^)]*\)",
        r"\$\{[^}]*\}",
        r"&&",
        r"\|\|",
        r"\|\s*[A-Za-z/]",
        r"(?i);\s*(rm|cat|curl|wget|sh|bash|nc|python|perl|chmod|chown|ls|id|whoami)\b",
    ])
});

static TRAVERSAL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.\.[/\\]").expect("traversal pattern is valid"));

static ENCODED_TRAVERSAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\.|%2e){2}(/|\\|%2f|%5c)").expect("encoded traversal pattern is valid")
});

static DOUBLED_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[/\\]{2,}").expect("separator pattern is valid"));

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("detection pattern is valid"))
        .collect()
}

/// Sanitization contract used by the pipeline.
pub trait Sanitizer: Send + Sync {
    /// Clean traversal out of a raw (possibly encoded) path.
    fn sanitize_path(&self, raw: &str) -> Result<CleanedPath, RejectionCategory>;

    /// Decode a parameter, rejecting control bytes and malformed encoding.
    fn sanitize_param<'a>(&self, raw: &'a str) -> Result<Cow<'a, str>, RejectionCategory>;

    /// Detect malicious signatures in an already-decoded value.
    fn detect(&self, value: &str) -> Vec<ThreatCategory>;
}

/// Regex-backed sanitizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternSanitizer;

impl PatternSanitizer {
    pub fn new() -> Self {
        Self
    }
}

impl Sanitizer for PatternSanitizer {
    fn sanitize_path(&self, raw: &str) -> Result<CleanedPath, RejectionCategory> {
        let mut current = raw.to_string();

        for _ in 0..MAX_DECODE_PASSES {
            let decoded = lenient_decode(&current);
            let stripped = strip_traversal(&decoded);
            if stripped == current {
                break;
            }
            current = stripped;
        }

        if has_forbidden_control(&current) {
            return Err(RejectionCategory::NullOrControl);
        }

        let collapsed = DOUBLED_SEPARATORS.replace_all(&current, "/").into_owned();
        let modified = collapsed != lenient_decode(raw);

        Ok(CleanedPath {
            path: collapsed,
            modified,
        })
    }

    fn sanitize_param<'a>(&self, raw: &'a str) -> Result<Cow<'a, str>, RejectionCategory> {
        if raw.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Ok(Cow::Borrowed(raw));
        }
        if has_forbidden_control(raw) {
            return Err(RejectionCategory::NullOrControl);
        }
        let decoded = decode(raw)?;
        if has_forbidden_control(&decoded) {
            return Err(RejectionCategory::NullOrControl);
        }
        Ok(decoded)
    }

    fn detect(&self, value: &str) -> Vec<ThreatCategory> {
        if value.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Vec::new();
        }

        let families: [(ThreatCategory, &[Regex]); 3] = [
            (ThreatCategory::SqlInjection, SQL_PATTERNS.as_slice()),
            (ThreatCategory::CrossSiteScripting, XSS_PATTERNS.as_slice()),
            (ThreatCategory::CommandInjection, COMMAND_PATTERNS.as_slice()),
        ];

        let mut found: Vec<ThreatCategory> = families
            .iter()
            .filter(|(_, patterns)| patterns.iter().any(|p| p.is_match(value)))
            .map(|(category, _)| *category)
            .collect();

        if TRAVERSAL_PATTERN.is_match(value) || ENCODED_TRAVERSAL.is_match(value) {
            found.push(ThreatCategory::PathTraversal);
        }
        found
    }
}

/// Null, or a C0 control other than tab, newline and carriage return.
pub fn has_forbidden_control(value: &str) -> bool {
    value
        .bytes()
        .any(|b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r'))
}

/// Percent-decode, rejecting stray `%` and invalid UTF-8.
fn decode(raw: &str) -> Result<Cow<'_, str>, RejectionCategory> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return Err(RejectionCategory::InvalidEncoding);
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    urlencoding::decode(raw).map_err(|_| RejectionCategory::InvalidEncoding)
}

/// Percent-decode without failing; stray `%` stays literal.
fn lenient_decode(raw: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned()
}

fn strip_traversal(value: &str) -> String {
    let mut current = value.to_string();
    loop {
        let next = ENCODED_TRAVERSAL.replace_all(&current, "");
        let next = TRAVERSAL_PATTERN.replace_all(&next, "").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn s() -> PatternSanitizer {
        PatternSanitizer::new()
    }

    #[test]
    fn test_path_traversal_stripped() {
        let cases = [
            ("/videos/../../etc/passwd", "/videos/etc/passwd"),
            ("/videos/..\\..\\windows", "/videos/windows"),
            ("/videos/%2e%2e%2fsecret", "/videos/secret"),
            ("/videos/%2E%2E%5Csecret", "/videos/secret"),
            ("/videos/%252e%252e%252fsecret", "/videos/secret"),
            ("/a/....//b", "/a/b"),
        ];
        for (input, expected) in cases {
            let cleaned = s().sanitize_path(input).unwrap();
            assert_eq!(cleaned.path, expected, "input {}", input);
            assert!(cleaned.modified);
        }
    }

    #[test]
    fn test_clean_path_untouched() {
        let cleaned = s().sanitize_path("/videos/youtube/dQw4w9WgXcQ").unwrap();
        assert_eq!(cleaned.path, "/videos/youtube/dQw4w9WgXcQ");
        assert!(!cleaned.modified);
    }

    #[test]
    fn test_path_with_encoded_null_rejected() {
        assert_eq!(
            s().sanitize_path("/videos/abc%00.mp4"),
            Err(RejectionCategory::NullOrControl)
        );
    }

    #[test]
    fn test_param_rejections() {
        assert_eq!(s().sanitize_param("a%00b"), Err(RejectionCategory::NullOrControl));
        assert_eq!(s().sanitize_param("a\u{7}b"), Err(RejectionCategory::NullOrControl));
        assert_eq!(s().sanitize_param("100%"), Err(RejectionCategory::InvalidEncoding));
        assert_eq!(s().sanitize_param("%zz"), Err(RejectionCategory::InvalidEncoding));
        assert_eq!(s().sanitize_param("%ff%fe"), Err(RejectionCategory::InvalidEncoding));
    }

    #[test]
    fn test_param_allows_whitespace_controls() {
        assert_eq!(s().sanitize_param("a%09b%0Ac%0D").unwrap(), "a\tb\nc\r");
        assert_eq!(s().sanitize_param("hello%20world").unwrap(), "hello world");
    }

    #[test]
    fn test_alphanumeric_is_borrowed() {
        assert!(matches!(s().sanitize_param("dQw4w9WgXcQ"), Ok(Cow::Borrowed(_))));
        assert!(s().detect("dQw4w9WgXcQ").is_empty());
    }

    #[test]
    fn test_detection_families() {
        assert_eq!(s().detect("x'; DROP TABLE users"), vec![ThreatCategory::SqlInjection]);
        assert_eq!(s().detect("1 UNION SELECT password"), vec![ThreatCategory::SqlInjection]);
        assert_eq!(
            s().detect("<script>alert(1)</script>"),
            vec![ThreatCategory::CrossSiteScripting]
        );
        assert_eq!(s().detect("javascript:alert(1)"), vec![ThreatCategory::CrossSiteScripting]);
        assert_eq!(s().detect("<img src=x onerror=alert(1)>"), vec![ThreatCategory::CrossSiteScripting]);
        assert_eq!(s().detect("`id`"), vec![ThreatCategory::CommandInjection]);
        assert_eq!(s().detect("$(whoami)"), vec![ThreatCategory::CommandInjection]);
        assert_eq!(s().detect("a && rm -rf /"), vec![ThreatCategory::CommandInjection]);
        assert_eq!(s().detect("a || b"), vec![ThreatCategory::CommandInjection]);
        assert_eq!(s().detect("x | sh"), vec![ThreatCategory::CommandInjection]);
        assert_eq!(s().detect("../../etc/passwd"), vec![ThreatCategory::PathTraversal]);
    }

    #[test]
    fn test_benign_values_not_flagged() {
        for value in ["dQw4w9WgXcQ", "a--b", "best", "720p", "hello world", "PL_x-y", "US"] {
            assert!(s().detect(value).is_empty(), "flagged {}", value);
        }
    }

    proptest! {
        #[test]
        fn prop_cleaned_path_has_no_traversal(input in r"[a-z/\\.%25ef2c]{0,40}") {
            if let Ok(cleaned) = s().sanitize_path(&input) {
                let lower = cleaned.path.to_lowercase();
                prop_assert!(!lower.contains("../"));
                prop_assert!(!lower.contains("..\\"));
                prop_assert!(!lower.contains("%2e%2e%2f"));
                prop_assert!(!lower.contains("%2e%2e%5c"));
            }
        }

        #[test]
        fn prop_forbidden_controls_rejected(
            prefix in "[a-z]{0,10}",
            byte in (0u8..0x20).prop_filter("allowed whitespace", |b| !matches!(b, 0x09 | 0x0a | 0x0d)),
            suffix in "[a-z]{0,10}",
        ) {
            let value = format!("{}{}{}", prefix, byte as char, suffix);
            prop_assert_eq!(s().sanitize_param(&value), Err(RejectionCategory::NullOrControl));
        }

        #[test]
        fn prop_printable_not_rejected_for_controls(value in "[ -$&-~\t\n\r]{0,40}") {
            // '%' excluded: encoding errors are a separate rejection reason.
            prop_assert!(s().sanitize_param(&value).is_ok());
        }
    }
}
