use citeguard_engine::{
    Classification, ClaimClassifier, Confidence, CorrectionAction, FailureType, InMemoryFileCache,
    SuggestedAction, VerificationMethod,
};
use citeguard_pipeline::judge::scripted::verdict;
use citeguard_pipeline::judge::{MockLlmClient, ScriptedJudge};
use citeguard_pipeline::{
    CorrectionConfig, CorrectionEngine, CorrectionState, Evaluator, JudgeConfig, LlmJudge,
};
use pretty_assertions::assert_eq;

const AUTH_PY: &str = "def login(username, password):\n    user = find_user(username)\n    return check_password(user, password)\n";

/// (function, callee) pairs; each becomes a two-line function.
const STORE_FNS: [(&str, &str); 7] = [
    ("open_store", "mount_volume"),
    ("fetch_entry", "probe_bucket"),
    ("write_entry", "append_journal"),
    ("drop_entry", "mark_tombstone"),
    ("compact_log", "merge_segments"),
    ("flush_cache", "sync_pages"),
    ("close_store", "release_lock"),
];

const INDEX_FNS: [(&str, &str); 3] = [
    ("build_index", "scan_keys"),
    ("query_index", "binary_search"),
    ("vacuum_index", "truncate_tree"),
];

/// Functions separated by blank lines: function `k` sits on lines `3k+1..=3k+2`.
fn source(fns: &[(&str, &str)]) -> String {
    fns.iter()
        .map(|(name, callee)| format!("def {name}(store):\n    return {callee}(store)"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn claims(path: &str, fns: &[(&str, &str)], shift_last: bool) -> Vec<String> {
    fns.iter()
        .enumerate()
        .map(|(k, (name, callee))| {
            let mut start = 3 * k + 1;
            if shift_last && k == fns.len() - 1 {
                start += 1;
            }
            format!(
                "The `{name}` function calls `{callee}` [{path}:{start}-{}].",
                start + 1
            )
        })
        .collect()
}

fn store_cache() -> InMemoryFileCache {
    InMemoryFileCache::new()
        .with_text("src/store.py", &source(&STORE_FNS))
        .with_text("src/index.py", &source(&INDEX_FNS))
}

#[tokio::test]
async fn test_scenario_b_unsupported_abstractive_claim() {
    let cache = InMemoryFileCache::new().with_text("src/auth.py", AUTH_PY);
    let judge = ScriptedJudge::new(|item| {
        let oauth = item.claim.contains("OAuth");
        Some(verdict(!oauth, Confidence::High, "only a username/password check"))
    });
    let report = "The API uses OAuth 2.0 for authentication [src/auth.py:1-3].";

    let result = Evaluator::new(&cache).with_judge(&judge).evaluate(report).await;

    let classification = ClaimClassifier::default().classify(&result.validations[0].extracted);
    assert_eq!(classification.classification, Classification::Abstractive);

    assert_eq!(result.abstractive_checked, 1);
    assert_eq!(result.abstractive_supported, 0);
    let failed = &result.failed_citations[0];
    assert_eq!(failed.failure_type, FailureType::NotSupporting);
    assert_eq!(failed.suggested_action, SuggestedAction::RewriteClaim);
    assert_eq!(
        failed.llm_reasoning.as_deref(),
        Some("only a username/password check")
    );
}

#[tokio::test]
async fn test_scenario_b_through_llm_judge() {
    let cache = InMemoryFileCache::new().with_text("src/auth.py", AUTH_PY);
    let client = MockLlmClient::with_response(
        "The code compares a password; nothing about OAuth.\n\n```json\n\
         [{\"id\": 1, \"supports\": false, \"reasoning\": \"no OAuth\", \"confidence\": \"high\"}]\n```",
    );
    let config = JudgeConfig::builder("test-key").build();
    let judge = LlmJudge::new(&client, &config);

    let result = Evaluator::new(&cache)
        .with_judge(&judge)
        .evaluate("The API uses OAuth 2.0 for authentication [src/auth.py:1-3].")
        .await;

    assert_eq!(result.results[0].method, VerificationMethod::Abstractive);
    assert!(!result.results[0].supports);
    assert_eq!(result.results[0].confidence, Confidence::High);
    assert_eq!(result.llm_calls, 1);
    assert_eq!(result.llm_tokens, 300);
}

#[tokio::test]
async fn test_scenario_d_off_by_one_citations_are_fixed() {
    let cache = store_cache();
    let mut lines = claims("src/store.py", &STORE_FNS, true);
    lines.extend(claims("src/index.py", &INDEX_FNS, true));
    let report = lines.join("\n\n");

    let evaluator = Evaluator::new(&cache);
    let before = evaluator.evaluate(&report).await;
    assert_eq!(before.total_citations, 10);
    assert_eq!(before.invalid_citations, 2);
    assert!(before
        .failed_citations
        .iter()
        .all(|f| f.failure_type == FailureType::InvalidRange));

    let run = CorrectionEngine::new(evaluator, CorrectionConfig::default())
        .run(&report)
        .await;

    assert_eq!(run.state, CorrectionState::Converged);
    assert_eq!(run.result.iterations, 1);
    assert!(run.evaluation.is_perfect());

    let fixed: Vec<String> = run
        .result
        .corrections
        .iter()
        .filter(|c| c.action_taken == CorrectionAction::FixedReference)
        .filter_map(|c| c.new_citation.as_ref().map(ToString::to_string))
        .collect();
    assert_eq!(fixed, vec!["[src/store.py:19-20]", "[src/index.py:7-8]"]);
    assert!(run.report.contains("`close_store` function calls `release_lock` [src/store.py:19-20]."));
}

#[tokio::test]
async fn test_extreme_line_range_is_repaired() {
    let cache = InMemoryFileCache::new().with_text("src/auth.py", AUTH_PY);
    let report = "The login function calls check_password [src/auth.py:0-4294967295].";

    let run = CorrectionEngine::new(Evaluator::new(&cache), CorrectionConfig::default())
        .run(report)
        .await;

    assert_eq!(run.failures_per_pass[0], 1);
    let first = &run.result.corrections[0];
    assert_eq!(first.failed.failure_type, FailureType::InvalidRange);
    assert_eq!(first.action_taken, CorrectionAction::FixedReference);
    assert_eq!(
        run.report,
        "The login function calls check_password [src/auth.py:1-3]."
    );
}

#[tokio::test]
async fn test_mixed_report_metrics() {
    let cache = store_cache();
    let judge = ScriptedJudge::supporting();
    let report = "# Storage\n\n\
        The `open_store` function calls `mount_volume` [src/store.py:1-2]. \
        The storage layer manages durable writes [src/store.py:7-8]. \
        Entries are never lost.\n\n\
        Lookups are described in [src/missing.py:1-4].";

    let result = Evaluator::new(&cache).with_judge(&judge).evaluate(report).await;

    assert_eq!(result.total_citations, 3);
    assert_eq!(result.valid_citations, 2);
    assert_eq!(result.extractive_checked, 1);
    assert_eq!(result.abstractive_checked, 1);
    assert_eq!(result.citation_stats.invalid, 1);
    assert_eq!(
        result.citation_stats.invalid_citations[0].error,
        "File not found in cache: src/missing.py"
    );
    assert_eq!(result.failed_citations.len(), 1);
    assert_eq!(result.failed_citations[0].failure_type, FailureType::InvalidFile);
}

#[tokio::test]
async fn test_evaluation_is_deterministic() {
    let cache = store_cache();
    let judge = ScriptedJudge::supporting();
    let report = claims("src/store.py", &STORE_FNS, false).join(" ");

    let evaluator = Evaluator::new(&cache).with_judge(&judge);
    let first = evaluator.evaluate(&report).await;
    let second = evaluator.evaluate(&report).await;

    assert_eq!(first, second);
    assert!(first.is_perfect());
}
