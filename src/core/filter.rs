//! Question and tag normalisation
//!
//! Everything a user types passes through here before it reaches the model
//! or the store.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

pub const MAX_TAGS: usize = 10;
pub const MAX_TAG_LENGTH: usize = 32;

static CONTROL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("valid regex"));

static EXCESS_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid regex"));

static BLOCKED_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"(?i)<\s*script\b").expect("valid regex"),
            "script tags are not allowed",
        ),
        (
            Regex::new(r"(?i)javascript\s*:").expect("valid regex"),
            "javascript: URIs are not allowed",
        ),
        (
            Regex::new(r#"(?i)<[^>]*\bon[a-z]+\s*="#).expect("valid regex"),
            "inline event handlers are not allowed",
        ),
    ]
});

#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("Question cannot be empty")]
    Empty,

    #[error("Question is too long ({actual} characters, maximum is {max})")]
    TooLong { max: usize, actual: usize },

    #[error("Question contains disallowed content: {0}")]
    Blocked(&'static str),
}

/// Clean up a question and check it against the length limit and blocked patterns.
pub fn normalize_question(raw: &str, max_len: usize) -> Result<String, FilterError> {
    let unix_newlines = raw.replace("\r\n", "\n").replace('\r', "\n");
    let without_control = CONTROL_CHARS.replace_all(&unix_newlines, "");
    let collapsed = EXCESS_BLANK_LINES.replace_all(&without_control, "\n\n");
    let question = collapsed.trim();

    if question.is_empty() {
        return Err(FilterError::Empty);
    }

    let actual = question.chars().count();
    if actual > max_len {
        return Err(FilterError::TooLong {
            max: max_len,
            actual,
        });
    }

    if let Some((_, reason)) = BLOCKED_PATTERNS.iter().find(|(re, _)| re.is_match(question)) {
        return Err(FilterError::Blocked(*reason));
    }

    Ok(question.to_string())
}

/// Trim, lowercase and de-duplicate tags, keeping the first `MAX_TAGS`.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim().to_lowercase();
        if tag.is_empty() || tag.chars().count() > MAX_TAG_LENGTH || out.contains(&tag) {
            continue;
        }
        out.push(tag);
        if out.len() == MAX_TAGS {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_and_strips_control_characters() {
        let question = normalize_question("  \u{0007}What is\tRust?\u{0000}  \n", 100).unwrap();
        assert_eq!(question, "What is\tRust?");
    }

    #[test]
    fn test_collapses_blank_line_runs() {
        let question = normalize_question("first\n\n\n\n\nsecond", 100).unwrap();
        assert_eq!(question, "first\n\nsecond");
    }

    #[test]
    fn test_crlf_input_is_normalized() {
        let question = normalize_question("first\r\n\r\n\r\n\r\nsecond\rthird", 100).unwrap();
        assert_eq!(question, "first\n\nsecond\nthird");
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(normalize_question("   \n\t ", 100), Err(FilterError::Empty));
        assert_eq!(normalize_question("", 100), Err(FilterError::Empty));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        assert!(normalize_question(&"é".repeat(10), 10).is_ok());
        assert_eq!(
            normalize_question(&"é".repeat(11), 10),
            Err(FilterError::TooLong { max: 10, actual: 11 })
        );
    }

    #[test]
    fn test_blocks_script_content() {
        assert!(matches!(
            normalize_question("explain <script>alert(1)</script>", 100),
            Err(FilterError::Blocked(_))
        ));
        assert!(matches!(
            normalize_question("<img src=x onerror=alert(1)>", 100),
            Err(FilterError::Blocked(_))
        ));
        assert!(normalize_question("How do onclick handlers work in React?", 100).is_ok());
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(vec![" Rust ", "rust", "", "Async", "x".repeat(40).as_str()]);
        assert_eq!(tags, vec!["rust".to_string(), "async".to_string()]);

        let many: Vec<String> = (0..20).map(|i| format!("tag{}", i)).collect();
        assert_eq!(normalize_tags(&many).len(), MAX_TAGS);
    }
}
