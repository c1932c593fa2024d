//! Model output parsing.
//!
//! Pure functions turning raw model text into candidate records. Lines that
//! do not match the expected prefixes are skipped silently; nothing here
//! touches the graph.
//!
//! ```text
//! 1.1 position: Adopt a four-day week        → PositionCandidate
//! // only for the engineering team            → note of the open record
//!
//! 1.2 position: Hire contractors             → IssueCandidate
//! - 1 sub_issue: Which budget line pays?      → sub issue
//! - 2 How long is the contract?               → sub issue
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static POSITION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+\.\d+)\s*position\s*[:：]?\s*(.*)").expect("valid position regex")
});

static NOTE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//\s*(.*)").expect("valid note regex"));

static SPLIT_POSITION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+\.\d+)\s+position\s*[:：]?\s*(.*)").expect("valid split regex")
});

static SUB_ISSUE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?\s*\d+(?:\.\d+)*\s+(?:sub_issue)?\s*[:：]?\s*(.*)")
        .expect("valid sub issue regex")
});

/// A position proposed by the model for the focus issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionCandidate {
    /// Dotted id as written by the model, e.g. `"1.3"`.
    pub full_id: String,
    pub content: String,
    pub note: Option<String>,
}

/// Sub-issues the model wants to split out of one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueCandidate {
    pub position_id: String,
    /// The model's echo of the position text; informational only.
    pub position_content: String,
    pub sub_issues: Vec<String>,
}

/// Parse the output of the position phase.
pub fn parse_positions(raw: &str) -> Vec<PositionCandidate> {
    let mut result = Vec::new();
    let mut current: Option<PositionCandidate> = None;

    for line in raw.trim().lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(caps) = POSITION_LINE.captures(line) {
            if let Some(done) = current.take() {
                result.push(done);
            }
            current = Some(PositionCandidate {
                full_id: caps[1].trim().to_string(),
                content: caps[2].trim().to_string(),
                note: None,
            });
        } else if let Some(caps) = NOTE_LINE.captures(line) {
            if let Some(open) = current.as_mut() {
                open.note = Some(caps[1].to_string());
            }
        }
    }
    if let Some(done) = current {
        result.push(done);
    }
    result
}

/// Parse the output of the issue phase.
pub fn parse_issues(raw: &str) -> Vec<IssueCandidate> {
    let mut result: Vec<IssueCandidate> = Vec::new();

    for line in raw.trim().lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(caps) = SPLIT_POSITION_LINE.captures(line) {
            result.push(IssueCandidate {
                position_id: caps[1].trim().to_string(),
                position_content: caps[2].trim().to_string(),
                sub_issues: Vec::new(),
            });
        } else if let Some(caps) = SUB_ISSUE_LINE.captures(line) {
            if let Some(open) = result.last_mut() {
                let content = caps[1].trim();
                if !content.is_empty() {
                    open.sub_issues.push(content.to_string());
                }
            }
        }
    }
    result
}

/// Text between `<tag>` and `</tag>`.
///
/// An unclosed tag runs to the end of the input; a missing opening tag
/// yields an empty string.
pub fn extract_tagged<'a>(text: &'a str, tag: &str) -> &'a str {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let Some(start) = text.find(&open).map(|s| s + open.len()) else {
        return "";
    };
    let end = text[start..]
        .find(&close)
        .map(|e| start + e)
        .unwrap_or(text.len());
    &text[start..end]
}

/// Whether an issue-phase output means "nothing to split".
pub fn is_no_issue_output(raw: &str, min_len: usize) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty()
        || trimmed == "无"
        || trimmed.to_lowercase().contains("none")
        || trimmed.chars().count() < min_len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positions_with_notes() {
        let raw = "1.1 position: first idea\n// keep it short\n1.3 position second idea\n";
        let parsed = parse_positions(raw);
        assert_eq!(
            parsed,
            vec![
                PositionCandidate {
                    full_id: "1.1".into(),
                    content: "first idea".into(),
                    note: Some("keep it short".into()),
                },
                PositionCandidate {
                    full_id: "1.3".into(),
                    content: "second idea".into(),
                    note: None,
                },
            ]
        );
    }

    #[test]
    fn test_parse_positions_fullwidth_colon() {
        let parsed = parse_positions("2.4 position：采用方案");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].full_id, "2.4");
        assert_eq!(parsed[0].content, "采用方案");
    }

    #[test]
    fn test_parse_positions_skips_noise() {
        let raw = "Here are my positions:\n// orphan note\n\n1.2 position: real one\nrandom trailing text";
        let parsed = parse_positions(raw);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].full_id, "1.2");
        assert_eq!(parsed[0].note, None);
    }

    #[test]
    fn test_parse_positions_empty_input() {
        assert!(parse_positions("").is_empty());
        assert!(parse_positions("None").is_empty());
    }

    #[test]
    fn test_parse_issues_groups_sub_issues() {
        let raw = "1.1 position: hire contractors\n- 1 sub_issue: which budget?\n- 2 how long?\n1.2 position: train staff\n1.2.1 sub_issue: who trains?";
        let parsed = parse_issues(raw);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].position_id, "1.1");
        assert_eq!(parsed[0].position_content, "hire contractors");
        assert_eq!(parsed[0].sub_issues, vec!["which budget?", "how long?"]);
        assert_eq!(parsed[1].sub_issues, vec!["who trains?"]);
    }

    #[test]
    fn test_parse_issues_ignores_leading_sub_issues() {
        let parsed = parse_issues("- 1 dangling\n1.4 position: x");
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].sub_issues.is_empty());
    }

    #[test]
    fn test_extract_tagged() {
        let text = "noise <position_and_note>\n1.1 position: a\n</position_and_note> tail";
        assert_eq!(extract_tagged(text, "position_and_note").trim(), "1.1 position: a");
        assert_eq!(extract_tagged("<t>open ended", "t"), "open ended");
        assert_eq!(extract_tagged("no tag here", "t"), "");
    }

    #[test]
    fn test_no_issue_markers() {
        assert!(is_no_issue_output("", 5));
        assert!(is_no_issue_output("  NONE ", 5));
        assert!(is_no_issue_output("无", 5));
        assert!(is_no_issue_output("1.1", 5));
        assert!(!is_no_issue_output("1.1 position: x\n- 1 y", 5));
    }
}
