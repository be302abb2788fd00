//! Post-validation refinement loop.
//!
//! Each pass asks the model to revise the report against the validator's
//! feedback. A revision shorter than 80% of the current report is rejected
//! and ends the loop with the last good report.

use super::depth::DepthProfile;
use super::sources::{SourceRecord, format_source_list};
use super::validation::{ReportValidator, ValidationResult};
use crate::brain::{CompletionRequest, LlmProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Scores at or above this never trigger refinement.
pub const REFINEMENT_TRIGGER_SCORE: f64 = 0.75;
/// Minimum revised/current length ratio for a revision to be accepted.
pub const MIN_REVISION_LENGTH_RATIO: f64 = 0.8;
/// Sources included in a refinement prompt.
const PROMPT_SOURCE_LIMIT: usize = 10;

/// Kind of improvement iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationKind {
    GapAnalysis,
    Refinement,
}

/// One logged improvement pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementIteration {
    pub pass_number: usize,
    pub kind: IterationKind,
    pub gap_analysis_text: String,
    pub recommended_queries: Vec<String>,
    pub sources_added: usize,
    pub resulting_score: Option<f64>,
    pub accepted: bool,
}

/// Result of the refinement loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementOutcome {
    pub report: String,
    pub validation: ValidationResult,
    pub log: Vec<RefinementIteration>,
}

/// Whether a validation result warrants refinement given a pass budget.
pub fn needs_refinement(validation: &ValidationResult, max_passes: usize) -> bool {
    max_passes > 0 && !validation.passed && validation.score < REFINEMENT_TRIGGER_SCORE
}

const REFINER_SYSTEM_PROMPT: &str = "You are a research editor revising a report to address \
quality feedback. Return the complete revised report in markdown, never a partial excerpt.";

pub struct RefinementController {
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
    model_override: Option<String>,
}

impl RefinementController {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            temperature: 0.3,
            model_override: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_model_override(mut self, model: Option<String>) -> Self {
        self.model_override = model;
        self
    }

    /// Run refinement passes until the report passes, a revision is rejected,
    /// or the depth's pass budget is spent.
    pub async fn refine(
        &self,
        report: String,
        validation: ValidationResult,
        profile: &DepthProfile,
        sources: &[SourceRecord],
        validator: &dyn ReportValidator,
    ) -> RefinementOutcome {
        let max_passes = profile.max_refinement_passes();
        let mut outcome = RefinementOutcome {
            report,
            validation,
            log: Vec::new(),
        };
        if !needs_refinement(&outcome.validation, max_passes) {
            return outcome;
        }
        info!(
            score = outcome.validation.score,
            max_passes, "Starting refinement"
        );

        for pass_number in 1..=max_passes {
            let feedback = feedback_text(&outcome.validation);
            let prompt = self.prompt(&outcome.report, &feedback, sources);
            let request = CompletionRequest::new(REFINER_SYSTEM_PROMPT, prompt)
                .with_temperature(self.temperature)
                .with_max_output_tokens(profile.word_count_range.max * 2)
                .with_model(self.model_override.clone());

            let revised = match self.llm.complete(request).await {
                Ok(response) => response.text.trim().to_string(),
                Err(e) => {
                    warn!(pass = pass_number, error = %e, "Refinement call failed, keeping report");
                    outcome.log.push(rejected(pass_number, feedback));
                    break;
                }
            };

            let current_len = outcome.report.chars().count() as f64;
            let revised_len = revised.chars().count() as f64;
            if revised.is_empty() || revised_len < MIN_REVISION_LENGTH_RATIO * current_len {
                warn!(
                    pass = pass_number,
                    current_len, revised_len, "Revision too short, rejected"
                );
                outcome.log.push(rejected(pass_number, feedback));
                break;
            }

            let validation = validator.validate(&revised, profile.depth, sources);
            info!(
                pass = pass_number,
                score = validation.score,
                passed = validation.passed,
                "Refinement pass revalidated"
            );
            outcome.log.push(RefinementIteration {
                pass_number,
                kind: IterationKind::Refinement,
                gap_analysis_text: feedback,
                recommended_queries: Vec::new(),
                sources_added: 0,
                resulting_score: Some(validation.score),
                accepted: true,
            });
            outcome.report = revised;
            outcome.validation = validation;
            if outcome.validation.passed {
                break;
            }
        }
        outcome
    }

    fn prompt(&self, report: &str, feedback: &str, sources: &[SourceRecord]) -> String {
        let shown = &sources[..sources.len().min(PROMPT_SOURCE_LIMIT)];
        format!(
            "The report below failed quality validation.\n\n{feedback}\n\n\
             Available sources:\n{}\n\n\
             Revise the report to resolve the issues and warnings. Keep all existing citations \
             and the References section.\n\nReport:\n\n{report}",
            format_source_list(shown)
        )
    }
}

fn rejected(pass_number: usize, feedback: String) -> RefinementIteration {
    RefinementIteration {
        pass_number,
        kind: IterationKind::Refinement,
        gap_analysis_text: feedback,
        recommended_queries: Vec::new(),
        sources_added: 0,
        resulting_score: None,
        accepted: false,
    }
}

fn feedback_text(validation: &ValidationResult) -> String {
    let mut text = format!("Quality score: {:.2}\n", validation.score);
    if !validation.issues.is_empty() {
        text.push_str("Issues:\n");
        for issue in &validation.issues {
            text.push_str(&format!("- {issue}\n"));
        }
    }
    if !validation.warnings.is_empty() {
        text.push_str("Warnings:\n");
        for warning in &validation.warnings {
            text.push_str(&format!("- {warning}\n"));
        }
    }
    if let Ok(metrics) = serde_json::to_string_pretty(&validation.metrics) {
        text.push_str("Metrics:\n");
        text.push_str(&metrics);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::research::depth::ResearchDepth;
    use crate::research::validation::QualityValidator;
    use std::collections::BTreeMap;

    fn result(score: f64, passed: bool) -> ValidationResult {
        ValidationResult {
            passed,
            score,
            issues: vec!["too short".into()],
            warnings: Vec::new(),
            metrics: BTreeMap::new(),
        }
    }

    struct FixedValidator(f64);

    impl ReportValidator for FixedValidator {
        fn validate(&self, _: &str, _: ResearchDepth, _: &[SourceRecord]) -> ValidationResult {
            result(self.0, false)
        }
    }

    #[test]
    fn test_needs_refinement() {
        assert!(needs_refinement(&result(0.5, false), 3));
        assert!(!needs_refinement(&result(0.5, false), 0));
        assert!(!needs_refinement(&result(0.75, false), 3));
        assert!(!needs_refinement(&result(0.5, true), 3));
    }

    #[tokio::test]
    async fn test_disabled_for_standard() {
        let llm = Arc::new(MockLlmProvider::with_response("x"));
        let controller = RefinementController::new(llm.clone());
        let out = controller
            .refine(
                "report".into(),
                result(0.3, false),
                &ResearchDepth::Standard.profile(),
                &[],
                &QualityValidator::new(),
            )
            .await;
        assert!(out.log.is_empty());
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_short_revision_rejected_keeps_report() {
        let original = "a".repeat(100);
        let llm = Arc::new(MockLlmProvider::with_response(&"b".repeat(79)));
        let controller = RefinementController::new(llm);
        let out = controller
            .refine(
                original.clone(),
                result(0.5, false),
                &ResearchDepth::Comprehensive.profile(),
                &[],
                &FixedValidator(0.9),
            )
            .await;
        assert_eq!(out.report, original);
        assert_eq!(out.log.len(), 1);
        assert!(!out.log[0].accepted);
        assert_eq!(out.validation.score, 0.5);
    }

    #[tokio::test]
    async fn test_revision_at_eighty_percent_accepted() {
        let llm = Arc::new(MockLlmProvider::with_response(&"b".repeat(80)));
        let controller = RefinementController::new(llm);
        let out = controller
            .refine(
                "a".repeat(100),
                result(0.5, false),
                &ResearchDepth::Comprehensive.profile(),
                &[],
                &FixedValidator(0.6),
            )
            .await;
        // Never passes, so the full budget is used
        assert_eq!(out.log.len(), 3);
        assert!(out.log.iter().all(|i| i.accepted));
        assert_eq!(out.report, "b".repeat(80));
    }

    #[tokio::test]
    async fn test_llm_failure_treated_as_rejection() {
        let llm = Arc::new(MockLlmProvider::new());
        llm.queue_error(crate::error::LlmError::Timeout { timeout_secs: 5 });
        let controller = RefinementController::new(llm);
        let out = controller
            .refine(
                "report".into(),
                result(0.4, false),
                &ResearchDepth::Exhaustive.profile(),
                &[],
                &FixedValidator(0.9),
            )
            .await;
        assert_eq!(out.report, "report");
        assert_eq!(out.log.len(), 1);
        assert!(!out.log[0].accepted);
        assert_eq!(out.log[0].resulting_score, None);
    }

    #[tokio::test]
    async fn test_prompt_limits_sources() {
        let llm = Arc::new(MockLlmProvider::with_response("r"));
        let controller = RefinementController::new(llm.clone());
        let sources: Vec<SourceRecord> = (0..15)
            .map(|i| SourceRecord::new(format!("S{i}"), format!("https://s{i}.com"), ""))
            .collect();
        controller
            .refine(
                "r".into(),
                result(0.4, false),
                &ResearchDepth::Comprehensive.profile(),
                &sources,
                &FixedValidator(0.9),
            )
            .await;
        let prompt = &llm.requests()[0].user_prompt;
        assert!(prompt.contains("[10] S9"));
        assert!(!prompt.contains("[11]"));
        assert!(prompt.contains("Quality score: 0.40"));
        assert!(prompt.contains("- too short"));
    }
}
