//! Human-readable summaries of evaluation and correction runs.

use console::style;

use citeguard_engine::{CitationStats, CorrectionAction, EvalResult};
use citeguard_pipeline::{CorrectionRun, CorrectionState};

fn percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

/// Validity counts followed by one line per invalid citation.
pub fn citation_stats(stats: &CitationStats) -> String {
    let mut out = format!(
        "  Citations: {} total, {} valid, {} invalid\n",
        stats.total,
        style(stats.valid).green(),
        if stats.invalid > 0 {
            style(stats.invalid).red().bold()
        } else {
            style(stats.invalid)
        }
    );
    if !stats.invalid_citations.is_empty() {
        out.push_str("  Invalid citations:\n");
        for invalid in &stats.invalid_citations {
            out.push_str(&format!(
                "    {} {}\n",
                style(&invalid.citation).red(),
                invalid.error
            ));
        }
    }
    out
}

pub fn evaluation(result: &EvalResult) -> String {
    let mut out = citation_stats(&result.citation_stats);

    out.push_str(&format!(
        "  Validity: {}\n",
        percent(result.validity_rate)
    ));
    out.push_str(&format!(
        "  Precision: {} overall ({} extractive of {}, {} abstractive of {})\n",
        percent(result.overall_precision),
        percent(result.extractive_precision),
        result.extractive_checked,
        percent(result.abstractive_precision),
        result.abstractive_checked,
    ));
    out.push_str(&format!(
        "  Coverage: {} ({} of {} claims cited)\n",
        percent(result.coverage),
        result.cited_claims,
        result.total_claims
    ));
    if result.llm_calls > 0 || result.judge_unavailable {
        out.push_str(&format!(
            "  Judge: {} call(s), {} token(s), {} escalation(s)\n",
            result.llm_calls, result.llm_tokens, result.escalations
        ));
    }
    if result.judge_unavailable {
        out.push_str(&format!(
            "  {} {} claim(s) could not be verified\n",
            style("Judge unavailable:").yellow().bold(),
            result.unverified
        ));
    }

    if !result.failed_citations.is_empty() {
        out.push_str(&format!(
            "  {}\n",
            style(format!("Failures ({}):", result.failed_citations.len())).yellow()
        ));
        for failed in &result.failed_citations {
            out.push_str(&format!(
                "    {} {} -> {}: {}\n",
                style(&failed.extracted.raw).cyan(),
                failed.failure_type,
                failed.suggested_action,
                failed.failure_reason
            ));
        }
    }
    out
}

pub fn correction(run: &CorrectionRun) -> String {
    let state = match run.state {
        CorrectionState::Converged => style(run.state.to_string()).green().bold(),
        _ => style(run.state.to_string()).yellow().bold(),
    };
    let mut out = format!(
        "  State: {} after {} iteration(s)\n",
        state, run.result.iterations
    );
    if run.llm_calls > 0 {
        out.push_str(&format!(
            "  Run cost: {} call(s), {} token(s)\n",
            run.llm_calls, run.llm_tokens
        ));
    }

    let changes: Vec<_> = run
        .result
        .corrections
        .iter()
        .filter(|c| c.action_taken != CorrectionAction::NoChange)
        .collect();
    if !changes.is_empty() {
        out.push_str("  Corrections:\n");
        for change in changes {
            let target = change
                .new_citation
                .as_ref()
                .map(|c| format!(" -> {}", style(c).green()))
                .unwrap_or_default();
            out.push_str(&format!(
                "    {} {}{}: {}\n",
                change.action_taken,
                style(&change.failed.extracted.raw).cyan(),
                target,
                change.correction_reasoning
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use citeguard_engine::{InvalidCitation, JudgeUsage, VerificationPolicy};

    #[test]
    fn test_citation_stats_lists_invalid() {
        console::set_colors_enabled(false);
        let stats = CitationStats {
            total: 3,
            valid: 2,
            invalid: 1,
            invalid_citations: vec![InvalidCitation {
                citation: "[src/missing.py:1-5]".into(),
                error: "File not found in cache: src/missing.py".into(),
            }],
        };
        let out = citation_stats(&stats);
        assert!(out.contains("3 total, 2 valid, 1 invalid"));
        assert!(out.contains("[src/missing.py:1-5] File not found in cache: src/missing.py"));
    }

    #[test]
    fn test_evaluation_of_empty_report() {
        console::set_colors_enabled(false);
        let result = citeguard_engine::aggregate(
            "",
            Vec::new(),
            Vec::new(),
            JudgeUsage::default(),
            &VerificationPolicy::default(),
        );
        let out = evaluation(&result);
        assert!(out.contains("Validity: 100.0%"));
        assert!(!out.contains("Failures"));
        assert!(!out.contains("Judge:"));
    }
}
