//! Research engine: orchestrates the depth-tiered pipeline.
//!
//! plan → synthesize → dedupe → [gap analysis] → compose → validate → [refine]

use super::aspects::{AspectPlanner, PlannedAspect};
use super::composer::ReportComposer;
use super::depth::DepthProfile;
use super::gaps::GapAnalyzer;
use super::progress::{NoOpProgressSink, ProgressSink, ProgressStore, ProgressUpdate};
use super::refinement::{RefinementController, RefinementIteration};
use super::sources::{SourceDeduplicator, SourceQualitySummary, SourceRecord};
use super::synthesis::{AspectFindings, SearchSynthesizer};
use super::validation::{QualityValidator, ReportValidator, ValidationResult};
use crate::brain::LlmProvider;
use crate::config::{ResearchConfig, StrataConfig};
use crate::error::{Result, StrataError};
use crate::providers::create_provider;
use crate::search::{SearchProvider, create_search_provider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Input to a research run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub topic: String,
    /// Depth name; `None` uses the configured default.
    #[serde(default)]
    pub depth: Option<String>,
    #[serde(default)]
    pub document_context: Option<String>,
    #[serde(default)]
    pub model_override: Option<String>,
}

impl ResearchRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }

    pub fn with_depth(mut self, depth: impl Into<String>) -> Self {
        self.depth = Some(depth.into());
        self
    }

    pub fn with_document_context(mut self, context: impl Into<String>) -> Self {
        self.document_context = Some(context.into());
        self
    }

    pub fn with_model_override(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }
}

/// Everything a research run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutput {
    pub execution_id: Uuid,
    pub topic: String,
    pub profile: DepthProfile,
    pub aspects: Vec<PlannedAspect>,
    pub findings: Vec<AspectFindings>,
    pub final_report: String,
    pub executive_summary: String,
    pub draft_report: String,
    pub validation: ValidationResult,
    pub sources: Vec<SourceRecord>,
    pub source_quality: SourceQualitySummary,
    pub refinement_log: Vec<RefinementIteration>,
    pub gap_analysis_log: Vec<RefinementIteration>,
}

/// Orchestrates a research run over injected providers.
pub struct ResearchEngine {
    llm: Arc<dyn LlmProvider>,
    search: Arc<dyn SearchProvider>,
    config: ResearchConfig,
    search_depth: String,
    store: Arc<ProgressStore>,
    sink: Arc<dyn ProgressSink>,
    validator: Arc<dyn ReportValidator>,
    auto_evict: bool,
}

impl ResearchEngine {
    pub fn new(llm: Arc<dyn LlmProvider>, search: Arc<dyn SearchProvider>) -> Self {
        Self {
            llm,
            search,
            config: ResearchConfig::default(),
            search_depth: "advanced".to_string(),
            store: Arc::new(ProgressStore::new()),
            sink: Arc::new(NoOpProgressSink),
            validator: Arc::new(QualityValidator::new()),
            auto_evict: false,
        }
    }

    /// Build the engine and its providers from configuration.
    ///
    /// Missing credentials or unsupported providers fail here, before any work starts.
    pub fn from_config(config: &StrataConfig) -> Result<Self> {
        config.validate()?;
        let llm = create_provider(&config.llm)?;
        let search = create_search_provider(&config.search)?;
        Ok(Self::new(llm, search)
            .with_config(config.research.clone())
            .with_search_depth(config.search.search_depth.clone()))
    }

    pub fn with_config(mut self, config: ResearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_search_depth(mut self, depth: impl Into<String>) -> Self {
        self.search_depth = depth.into();
        self
    }

    pub fn with_progress_store(mut self, store: Arc<ProgressStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn ReportValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Drop each execution record from the store once its run finishes.
    pub fn with_auto_evict(mut self, auto_evict: bool) -> Self {
        self.auto_evict = auto_evict;
        self
    }

    pub fn store(&self) -> &Arc<ProgressStore> {
        &self.store
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Resolve the execution profile for a request.
    pub fn resolve_profile(&self, request: &ResearchRequest) -> DepthProfile {
        let name = request
            .depth
            .as_deref()
            .unwrap_or(self.config.default_depth.as_str());
        DepthProfile::resolve(Some(name))
    }

    /// Run the full pipeline without a time budget.
    ///
    /// The execution record stays in the progress store until the caller
    /// evicts it, unless the engine was built `with_auto_evict(true)`.
    pub async fn run(&self, request: ResearchRequest) -> ResearchOutput {
        let profile = self.resolve_profile(&request);
        let execution_id = self.store.create(&request.topic, profile.depth);
        let output = self.execute(execution_id, &request, profile).await;
        self.release(execution_id);
        output
    }

    /// Run the full pipeline inside the depth's wall-clock budget.
    ///
    /// On expiry the execution is marked failed and a timeout error is returned.
    /// Store eviction follows the same rule as [`ResearchEngine::run`].
    pub async fn run_with_budget(&self, request: ResearchRequest) -> Result<ResearchOutput> {
        let profile = self.resolve_profile(&request);
        let execution_id = self.store.create(&request.topic, profile.depth);
        if !self.config.enforce_timeout {
            let output = self.execute(execution_id, &request, profile).await;
            self.release(execution_id);
            return Ok(output);
        }

        let budget = profile.timeout();
        let depth = profile.depth;
        let timeout_secs = profile.timeout_seconds;
        let result =
            match tokio::time::timeout(budget, self.execute(execution_id, &request, profile)).await {
                Ok(output) => Ok(output),
                Err(_) => {
                    warn!(execution_id = %execution_id, depth = %depth, timeout_secs, "Research budget exhausted");
                    self.emit(
                        self.store
                            .fail(execution_id, format!("exceeded {timeout_secs}s budget")),
                    );
                    Err(StrataError::Timeout {
                        depth: depth.to_string(),
                        timeout_secs,
                    })
                }
            };
        self.release(execution_id);
        result
    }

    fn release(&self, execution_id: Uuid) {
        if self.auto_evict {
            self.store.evict(execution_id);
        }
    }

    fn report_progress(&self, execution_id: Uuid, percent: u8, task: &str) {
        self.emit(self.store.update(execution_id, percent, task));
    }

    fn emit(&self, update: Option<ProgressUpdate>) {
        if let Some(update) = update {
            self.sink.on_progress(&update);
        }
    }

    async fn execute(
        &self,
        execution_id: Uuid,
        request: &ResearchRequest,
        profile: DepthProfile,
    ) -> ResearchOutput {
        let topic = request.topic.trim();
        let document_context = request.document_context.as_deref();
        let model = request.model_override.clone();
        info!(
            execution_id = %execution_id,
            topic,
            depth = %profile.depth,
            max_sources = profile.max_sources,
            "Starting research run"
        );

        // Plan
        self.report_progress(execution_id, 5, "planning aspects");
        let planner = AspectPlanner::new(self.llm.clone())
            .with_temperature(self.config.planner_temperature)
            .with_model_override(model.clone());
        let aspects = planner.plan(topic, &profile).await;

        // Search and synthesize
        self.report_progress(execution_id, 10, "searching and synthesizing");
        let synthesizer = SearchSynthesizer::new(self.llm.clone(), self.search.clone())
            .with_search_depth(self.search_depth.clone())
            .with_temperature(self.config.writer_temperature)
            .with_model_override(model.clone());
        let synthesis = synthesizer
            .synthesize(
                topic,
                &aspects,
                &profile,
                document_context,
                |findings, done, total| {
                    let percent = 10 + (50 * done / total.max(1)) as u8;
                    self.report_progress(
                        execution_id,
                        percent,
                        &format!("synthesized {}", findings.aspect.title),
                    );
                },
            )
            .await;
        let findings = synthesis.combined_findings();

        // Synthesis stays within its budget, so every source it numbered fits.
        let mut pool = SourceDeduplicator::with_limit(profile.max_sources);
        for source in synthesis.sources.iter().cloned() {
            pool.insert(source);
        }

        // Gap analysis
        let gap_analysis_log = if profile.gap_analysis_passes() > 0 {
            self.report_progress(execution_id, 62, "gap analysis");
            GapAnalyzer::new(self.llm.clone())
                .with_temperature(self.config.planner_temperature)
                .with_model_override(model.clone())
                .run(topic, &profile, &findings, &synthesizer, &mut pool)
                .await
        } else {
            Vec::new()
        };

        if pool.is_full() {
            info!(max_sources = profile.max_sources, "Source pool reached max_sources");
        }
        let sources = pool.into_sources();

        // Compose
        self.report_progress(execution_id, 70, "composing report");
        let composed = ReportComposer::new(self.llm.clone())
            .with_temperature(self.config.writer_temperature)
            .with_max_context_chars(self.config.max_context_chars)
            .with_model_override(model.clone())
            .compose(topic, &profile, &findings, &sources, document_context)
            .await;

        // Validate
        self.report_progress(execution_id, 85, "validating report");
        let validation = self
            .validator
            .validate(&composed.final_report, profile.depth, &sources);
        info!(
            execution_id = %execution_id,
            score = validation.score,
            passed = validation.passed,
            issues = validation.issues.len(),
            warnings = validation.warnings.len(),
            "Report validated"
        );

        // Refine
        if profile.max_refinement_passes() > 0 {
            self.report_progress(execution_id, 90, "refining report");
        }
        let refined = RefinementController::new(self.llm.clone())
            .with_temperature(self.config.writer_temperature)
            .with_model_override(model)
            .refine(
                composed.final_report,
                validation,
                &profile,
                &sources,
                self.validator.as_ref(),
            )
            .await;

        self.emit(self.store.complete(execution_id));
        info!(
            execution_id = %execution_id,
            sources = sources.len(),
            refinement_passes = refined.log.len(),
            gap_passes = gap_analysis_log.len(),
            score = refined.validation.score,
            "Research run complete"
        );

        ResearchOutput {
            execution_id,
            topic: topic.to_string(),
            source_quality: SourceQualitySummary::from_sources(&sources),
            findings: synthesis.aspects,
            aspects,
            final_report: refined.report,
            executive_summary: composed.executive_summary,
            draft_report: composed.draft_report,
            validation: refined.validation,
            sources,
            refinement_log: refined.log,
            gap_analysis_log,
            profile,
        }
    }
}
