//! One evaluation pass over a report.
//!
//! Extraction, validation, classification and extractive verification are
//! synchronous; only the abstractive stage awaits the judge.

use tracing::{debug, info};

use citeguard_engine::{
    aggregate, extract_citations, validate_all, ClaimClassifier, EvalResult, ExtractiveVerifier,
    FileCache, VerificationMethod, VerificationPolicy,
};

use crate::abstractive::{AbstractiveOutcome, AbstractiveVerifier, JudgeSettings, PendingClaim};
use crate::judge::Judge;

/// Runs the verification stages against a shared file cache.
pub struct Evaluator<'a> {
    cache: &'a dyn FileCache,
    judge: Option<&'a dyn Judge>,
    policy: VerificationPolicy,
    settings: JudgeSettings,
}

impl<'a> Evaluator<'a> {
    /// An evaluator without a judge; abstractive claims come back unverified.
    pub fn new(cache: &'a dyn FileCache) -> Self {
        Self {
            cache,
            judge: None,
            policy: VerificationPolicy::default(),
            settings: JudgeSettings::default(),
        }
    }

    pub fn with_judge(mut self, judge: &'a dyn Judge) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn with_policy(mut self, policy: VerificationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_settings(mut self, settings: JudgeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn cache(&self) -> &'a dyn FileCache {
        self.cache
    }

    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    pub async fn evaluate(&self, report: &str) -> EvalResult {
        let extracted = extract_citations(report);
        let validations = validate_all(&extracted, self.cache);

        let classifier = ClaimClassifier::new(self.policy.unknown_routing);
        let extractive = ExtractiveVerifier::new(self.policy.partial_policy);

        let mut results = Vec::new();
        let mut pending = Vec::new();
        for validation in &validations {
            let Some(content) = validation.cited_content.as_deref() else {
                continue;
            };
            let classified = classifier.classify(&validation.extracted);
            debug!(
                citation = %validation.extracted.citation,
                classification = %classified.classification,
                route = %classified.route,
                "claim classified"
            );
            match classified.route {
                VerificationMethod::Extractive => {
                    results.push(extractive.verify(&validation.extracted, content));
                }
                VerificationMethod::Abstractive => pending.push(PendingClaim {
                    extracted: validation.extracted.clone(),
                    cited_content: content.to_string(),
                }),
            }
        }

        let outcome = match self.judge {
            Some(judge) => {
                AbstractiveVerifier::new(judge, self.settings)
                    .verify_all(&pending)
                    .await
            }
            None => AbstractiveOutcome::unverified(&pending),
        };
        results.extend(outcome.results);
        results.sort_by_key(|r| r.extracted.position);

        let evaluation = aggregate(report, validations, results, outcome.usage, &self.policy);
        info!(
            citations = evaluation.total_citations,
            valid = evaluation.valid_citations,
            failures = evaluation.failed_citations.len(),
            overall_precision = evaluation.overall_precision,
            coverage = evaluation.coverage,
            "evaluation complete"
        );
        evaluation
    }
}
