//! Report composition: writer, editor, and summarizer stages.

use super::depth::DepthProfile;
use super::sources::{SourceRecord, format_source_list};
use super::validation::required_sections;
use crate::brain::{CompletionRequest, LlmProvider};
use crate::search::truncate_chars;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Output of the composition stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedReport {
    pub draft_report: String,
    pub final_report: String,
    pub executive_summary: String,
    pub writer_fallback: bool,
    pub editor_fallback: bool,
    pub summary_fallback: bool,
    pub context_truncated: bool,
}

const WRITER_SYSTEM_PROMPT: &str = "You are an expert research writer. Write well-structured \
markdown reports grounded strictly in the supplied findings. Keep every bracketed citation \
marker such as [4] attached to the claim it supports.";

const EDITOR_SYSTEM_PROMPT: &str = "You are a senior editor. Improve clarity, flow, and \
structure without removing content. Reproduce the References section exactly as given.";

const SUMMARY_SYSTEM_PROMPT: &str = "You write concise executive summaries for research reports.";

/// Rough characters per token when sizing prompt text against a context window.
const CHARS_PER_TOKEN: usize = 4;

/// Runs writer, editor, and summarizer in sequence.
pub struct ReportComposer {
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
    max_context_chars: usize,
    model_override: Option<String>,
}

impl ReportComposer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            temperature: 0.3,
            max_context_chars: 120_000,
            model_override: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_context_chars(mut self, max: usize) -> Self {
        self.max_context_chars = max;
        self
    }

    pub fn with_model_override(mut self, model: Option<String>) -> Self {
        self.model_override = model;
        self
    }

    /// Compose the final report. Never fails; each stage has a fallback.
    pub async fn compose(
        &self,
        topic: &str,
        profile: &DepthProfile,
        findings: &str,
        sources: &[SourceRecord],
        document_context: Option<&str>,
    ) -> ComposedReport {
        let budget = self.findings_budget();
        let context_truncated = findings.chars().count() > budget;
        let findings = if context_truncated {
            warn!(max_chars = budget, "Findings exceed context budget, truncating");
            truncate_chars(findings, budget)
        } else {
            findings
        };
        let references = references_section(sources);

        let (draft_report, writer_fallback) = match self
            .write_draft(topic, profile, findings, &references, document_context)
            .await
        {
            Some(draft) => (ensure_references(draft, sources, &references), false),
            None => (fallback_draft(topic, findings, &references), true),
        };
        info!(
            words = draft_report.split_whitespace().count(),
            fallback = writer_fallback,
            "Draft written"
        );

        let (final_report, editor_fallback) =
            match self.edit(profile, &draft_report, &references).await {
                Some(edited) => (ensure_references(edited, sources, &references), false),
                None => (draft_report.clone(), true),
            };

        let (executive_summary, summary_fallback) = match self.summarize(topic, &final_report).await
        {
            Some(summary) => (summary, false),
            None => (first_paragraph(&final_report), true),
        };

        ComposedReport {
            draft_report,
            final_report,
            executive_summary,
            writer_fallback,
            editor_fallback,
            summary_fallback,
            context_truncated,
        }
    }

    /// Findings may fill at most half the model's context window, and never
    /// more than the configured `max_context_chars`.
    pub fn findings_budget(&self) -> usize {
        let window_chars = self.llm.context_window() / 2 * CHARS_PER_TOKEN;
        self.max_context_chars.min(window_chars)
    }

    async fn complete(&self, system: &str, user: String, max_tokens: usize) -> Option<String> {
        let request = CompletionRequest::new(system, user)
            .with_temperature(self.temperature)
            .with_max_output_tokens(max_tokens)
            .with_model(self.model_override.clone());
        match self.llm.complete(request).await {
            Ok(response) if !response.text.trim().is_empty() => {
                debug!(tokens = response.usage.total(), model = %response.model, "Composition call complete");
                Some(response.text.trim().to_string())
            }
            Ok(_) => {
                warn!("Model returned empty text");
                None
            }
            Err(e) => {
                warn!(error = %e, "Composition call failed");
                None
            }
        }
    }

    async fn write_draft(
        &self,
        topic: &str,
        profile: &DepthProfile,
        findings: &str,
        references: &str,
        document_context: Option<&str>,
    ) -> Option<String> {
        let sections = required_sections(profile.depth)
            .iter()
            .filter_map(|aliases| aliases.first().copied())
            .collect::<Vec<_>>()
            .join(", ");
        let range = profile.word_count_range;
        let mut prompt = format!(
            "Write a research report at {depth} depth on: {topic}\n\n\
             Length: between {min} and {max} words.\n\
             Use markdown headings for these sections, in order: {sections}.\n\
             End with a References section that lists every source below exactly as given.\n\n\
             Findings:\n{findings}\n\n{references}\n",
            depth = profile.depth,
            min = range.min,
            max = range.max,
        );
        if let Some(context) = document_context {
            prompt.push_str("\nUser-supplied document context:\n");
            prompt.push_str(context);
            prompt.push('\n');
        }
        self.complete(WRITER_SYSTEM_PROMPT, prompt, range.max * 2).await
    }

    async fn edit(&self, profile: &DepthProfile, draft: &str, references: &str) -> Option<String> {
        let mut prompt = format!(
            "Edit the following report. Keep all content, section headings, and citation \
             markers. The References section must remain exactly:\n\n{references}\n\n"
        );
        if profile.features.fact_checking {
            prompt.push_str(
                "Fact-check every claim against its cited source. Mark claims that have no \
                 supporting citation with [unverified].\n\n",
            );
        }
        prompt.push_str("Report:\n\n");
        prompt.push_str(draft);
        self.complete(
            EDITOR_SYSTEM_PROMPT,
            prompt,
            profile.word_count_range.max * 2,
        )
        .await
    }

    async fn summarize(&self, topic: &str, report: &str) -> Option<String> {
        let prompt = format!(
            "Write an executive summary of 150 to 250 words for this report on {topic}. \
             Return only the summary text.\n\n{report}"
        );
        self.complete(SUMMARY_SYSTEM_PROMPT, prompt, 512).await
    }
}

/// The References block listing every source with its citation number.
pub fn references_section(sources: &[SourceRecord]) -> String {
    if sources.is_empty() {
        "## References\n\nNo sources were retrieved.".to_string()
    } else {
        format!("## References\n\n{}", format_source_list(sources))
    }
}

/// Append the references block if the text does not cite every source url.
fn ensure_references(text: String, sources: &[SourceRecord], references: &str) -> String {
    if sources.iter().all(|s| text.contains(s.url())) {
        return text;
    }
    debug!("Report is missing source urls, appending references");
    format!("{}\n\n{references}", text.trim_end())
}

/// Deterministic draft assembled from findings when the writer fails.
pub fn fallback_draft(topic: &str, findings: &str, references: &str) -> String {
    let findings = if findings.trim().is_empty() {
        "No findings were synthesized."
    } else {
        findings.trim()
    };
    format!(
        "# {topic}\n\n## Introduction\n\nThis report compiles the research findings gathered \
         on {topic}.\n\n## Key Findings\n\n{findings}\n\n{references}"
    )
}

/// The first non-heading paragraph of a markdown document.
pub fn first_paragraph(report: &str) -> String {
    report
        .split("\n\n")
        .map(str::trim)
        .find(|block| !block.is_empty() && !block.starts_with('#'))
        .unwrap_or("")
        .to_string()
}
