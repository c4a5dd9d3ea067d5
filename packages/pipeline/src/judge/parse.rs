//! Reading judge answers.
//!
//! The model reasons in prose and then emits JSON, usually in a fenced block.
//! Candidates are tried from the last fenced block backwards, then the whole
//! text, then its outermost bracketed span. A verdict list whose length does
//! not match the batch is rejected.

use std::str::FromStr;

use serde::Deserialize;

use citeguard_engine::Confidence;

use crate::error::{PipelineError, Result};
use crate::judge::JudgeVerdict;

#[derive(Deserialize)]
struct RawVerdict {
    #[serde(default)]
    id: Option<usize>,
    supports: bool,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    confidence: Option<String>,
}

impl RawVerdict {
    fn into_verdict(self) -> JudgeVerdict {
        JudgeVerdict {
            supports: self.supports,
            reasoning: self.reasoning.trim().to_string(),
            // Unknown or missing confidence is treated as the weakest.
            confidence: self
                .confidence
                .as_deref()
                .and_then(|c| Confidence::from_str(c.trim()).ok())
                .unwrap_or(Confidence::Low),
        }
    }
}

#[derive(Deserialize)]
struct RawRewrite {
    claim: String,
    #[serde(default)]
    reasoning: String,
}

/// Extract all fenced code blocks from text.
pub fn extract_fenced_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut remaining = text;

    while let Some(start) = remaining.find("```") {
        let after_fence = &remaining[start + 3..];
        // Skip optional language identifier on the same line
        let content_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let content = &after_fence[content_start..];
        if let Some(end) = content.find("```") {
            blocks.push(content[..end].to_string());
            remaining = &content[end + 3..];
        } else {
            break;
        }
    }

    blocks
}

/// JSON candidates in order of preference: fenced blocks (last first), the
/// whole response, then the outermost `open`..`close` span.
fn json_candidates(content: &str, open: char, close: char) -> Vec<String> {
    let trimmed = content.trim();
    let mut candidates: Vec<String> = extract_fenced_blocks(trimmed).into_iter().rev().collect();
    candidates.push(trimmed.to_string());
    if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
        if start < end {
            candidates.push(trimmed[start..=end].to_string());
        }
    }
    candidates
}

/// Parse a judge response into exactly `expected` verdicts, in item order.
///
/// Verdicts are reordered by `id` when every verdict carries a distinct id
/// in `1..=expected`; otherwise their order is taken as given.
pub fn parse_verdicts(content: &str, expected: usize) -> Result<Vec<JudgeVerdict>> {
    let mut parsed: Option<Vec<RawVerdict>> = json_candidates(content, '[', ']')
        .iter()
        .find_map(|c| serde_json::from_str::<Vec<RawVerdict>>(c.trim()).ok());

    if parsed.is_none() && expected == 1 {
        parsed = json_candidates(content, '{', '}')
            .iter()
            .find_map(|c| serde_json::from_str::<RawVerdict>(c.trim()).ok())
            .map(|v| vec![v]);
    }

    let Some(mut raw) = parsed else {
        return Err(PipelineError::LlmResponseParse(
            "no JSON verdict array found".into(),
        ));
    };

    if raw.len() != expected {
        return Err(PipelineError::LlmResponseParse(format!(
            "expected {expected} verdicts, got {}",
            raw.len()
        )));
    }

    let mut ids: Vec<usize> = raw.iter().filter_map(|v| v.id).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.len() == expected && ids.first() == Some(&1) && ids.last() == Some(&expected) {
        raw.sort_by_key(|v| v.id);
    }

    Ok(raw.into_iter().map(RawVerdict::into_verdict).collect())
}

/// Parse a rewrite response into `(claim, reasoning)`.
pub fn parse_rewrite(content: &str) -> Result<(String, String)> {
    let rewrite = json_candidates(content, '{', '}')
        .iter()
        .find_map(|c| serde_json::from_str::<RawRewrite>(c.trim()).ok())
        .ok_or_else(|| PipelineError::LlmResponseParse("no JSON rewrite object found".into()))?;

    let claim = rewrite.claim.trim().to_string();
    if claim.is_empty() {
        return Err(PipelineError::LlmResponseParse("rewrite is empty".into()));
    }
    Ok((claim, rewrite.reasoning.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_fenced_blocks() {
        let input = "Thinking...\n```json\n[1]\n```\nmore\n```\n[2]\n```";
        assert_eq!(extract_fenced_blocks(input), vec!["[1]\n", "[2]\n"]);
    }

    #[test]
    fn test_parse_verdicts_after_reasoning() {
        let content = "Item 1 clearly matches. Item 2 does not.\n\n```json\n[\n  \
            {\"id\": 1, \"supports\": true, \"reasoning\": \"matches\", \"confidence\": \"high\"},\n  \
            {\"id\": 2, \"supports\": false, \"reasoning\": \"no OAuth\", \"confidence\": \"MEDIUM\"}\n]\n```";
        let verdicts = parse_verdicts(content, 2).expect("parse");
        assert_eq!(
            verdicts,
            vec![
                JudgeVerdict {
                    supports: true,
                    reasoning: "matches".into(),
                    confidence: Confidence::High,
                },
                JudgeVerdict {
                    supports: false,
                    reasoning: "no OAuth".into(),
                    confidence: Confidence::Medium,
                },
            ]
        );
    }

    #[test]
    fn test_parse_verdicts_reorders_by_id() {
        let content = r#"[{"id": 2, "supports": false}, {"id": 1, "supports": true}]"#;
        let verdicts = parse_verdicts(content, 2).expect("parse");
        assert!(verdicts[0].supports);
        assert!(!verdicts[1].supports);
        assert_eq!(verdicts[1].confidence, Confidence::Low);
    }

    #[test]
    fn test_parse_verdicts_unfenced_with_prose() {
        let content = r#"Here you go: [{"supports": true, "reasoning": "ok", "confidence": "high"}] done"#;
        assert_eq!(parse_verdicts(content, 1).expect("parse").len(), 1);
    }

    #[test]
    fn test_parse_single_object() {
        let content = "```json\n{\"supports\": true, \"reasoning\": \"ok\", \"confidence\": \"high\"}\n```";
        let verdicts = parse_verdicts(content, 1).expect("parse");
        assert_eq!(verdicts[0].confidence, Confidence::High);
    }

    #[test]
    fn test_parse_verdicts_rejects_wrong_count_and_garbage() {
        assert!(parse_verdicts(r#"[{"supports": true}]"#, 2).is_err());
        assert!(parse_verdicts("I am not sure.", 1).is_err());
    }

    #[test]
    fn test_parse_rewrite() {
        let content = "```json\n{\"claim\": \"Checks the password hash.\", \"reasoning\": \"no OAuth\"}\n```";
        let (claim, reasoning) = parse_rewrite(content).expect("parse");
        assert_eq!(claim, "Checks the password hash.");
        assert_eq!(reasoning, "no OAuth");
        assert!(parse_rewrite(r#"{"claim": "  "}"#).is_err());
    }
}
