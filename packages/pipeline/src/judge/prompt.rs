use citeguard_engine::{detect_language, FailedCitation};

use crate::judge::JudgeItem;

const SYSTEM_JUDGE: &str = include_str!("../../prompts/system_judge.txt");
const SYSTEM_REWRITE: &str = include_str!("../../prompts/system_rewrite.txt");

/// System prompt for judging claims.
pub fn judge_system_prompt() -> &'static str {
    SYSTEM_JUDGE
}

/// System prompt for rewriting unsupported claims.
pub fn rewrite_system_prompt() -> &'static str {
    SYSTEM_REWRITE
}

fn push_code(prompt: &mut String, citation: &str, code: &str) {
    let path = citation
        .trim_start_matches('[')
        .rsplit_once(':')
        .map(|(path, _)| path)
        .unwrap_or_default();
    let lang = detect_language(path).unwrap_or("");
    prompt.push_str(&format!("```{lang}\n{code}\n```\n\n"));
}

/// Build the user prompt for a batch of claims, numbered from 1.
pub fn build_judge_prompt(items: &[JudgeItem]) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("Judge the following {} item(s).\n\n", items.len()));

    for (i, item) in items.iter().enumerate() {
        prompt.push_str(&format!("## Item {}\n\n", i + 1));
        prompt.push_str(&format!("Claim: {}\n", item.claim));
        if item.context.trim() != item.claim.trim() {
            prompt.push_str(&format!("Paragraph: {}\n", item.context));
        }
        prompt.push_str(&format!("Cited code {}:\n", item.citation));
        push_code(&mut prompt, &item.citation, &item.cited_content);
    }

    prompt.push_str(&format!(
        "Return one verdict per item, ids 1 to {}, in the JSON block.",
        items.len()
    ));
    prompt
}

/// Build the user prompt for rewriting one claim.
pub fn build_rewrite_prompt(failed: &FailedCitation) -> String {
    let mut prompt = String::new();
    let citation = failed.citation().to_string();

    prompt.push_str(&format!("Claim: {}\n\n", failed.extracted.claim_text));
    prompt.push_str(&format!("Cited code {citation}:\n"));
    push_code(
        &mut prompt,
        &citation,
        failed.cited_content.as_deref().unwrap_or(""),
    );
    prompt.push_str("Reviewer explanation:\n");
    prompt.push_str(
        failed
            .llm_reasoning
            .as_deref()
            .unwrap_or(&failed.failure_reason),
    );
    prompt.push_str("\n\nRewrite the claim.");
    prompt
}
