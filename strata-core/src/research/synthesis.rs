//! Search execution and per-aspect synthesis.
//!
//! Aspects and their queries run strictly in sequence so that load on the
//! providers stays bounded and citation numbers are assigned in a stable
//! first-occurrence order across the whole run.

use super::aspects::{PlannedAspect, ResearchAspect};
use super::depth::DepthProfile;
use super::sources::{SourceDeduplicator, SourceRecord};
use crate::brain::{CompletionRequest, LlmProvider};
use crate::search::{SearchProvider, SearchRequest, truncate_chars};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-source content budget inside a synthesis prompt.
const MAX_SOURCE_CHARS_IN_PROMPT: usize = 4_000;

/// Findings for a single query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFinding {
    pub query: String,
    pub text: String,
    pub sources_found: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryFinding {
    fn failed(query: &str, error: impl Into<String>, sources_found: usize) -> Self {
        Self {
            query: query.to_string(),
            text: String::new(),
            sources_found,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Accumulated findings for one aspect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectFindings {
    pub aspect: ResearchAspect,
    pub queries: Vec<QueryFinding>,
    /// Numbered sources returned for this aspect, in hit order (may repeat across aspects).
    #[serde(skip)]
    pub sources: Vec<SourceRecord>,
}

impl AspectFindings {
    /// Concatenated findings text of all successful queries.
    pub fn findings_text(&self) -> String {
        self.queries
            .iter()
            .filter(|q| !q.is_error() && !q.text.trim().is_empty())
            .map(|q| q.text.trim())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn failed_queries(&self) -> usize {
        self.queries.iter().filter(|q| q.is_error()).count()
    }
}

/// Result of the synthesis stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesisOutput {
    pub aspects: Vec<AspectFindings>,
    /// Deduplicated sources in citation order.
    pub sources: Vec<SourceRecord>,
}

impl SynthesisOutput {
    /// Findings of all aspects as one markdown block.
    pub fn combined_findings(&self) -> String {
        self.aspects
            .iter()
            .map(|a| format!("## {}\n\n{}", a.aspect.title, a.findings_text()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are a meticulous research analyst. Extract the key \
findings from the supplied sources. Attach a bracketed citation marker such as [3] to every \
claim, using only the numbers given in the source list. Do not invent sources.";

/// Executes planned queries and synthesizes per-aspect findings.
pub struct SearchSynthesizer {
    llm: Arc<dyn LlmProvider>,
    search: Arc<dyn SearchProvider>,
    search_depth: String,
    temperature: f32,
    model_override: Option<String>,
}

impl SearchSynthesizer {
    pub fn new(llm: Arc<dyn LlmProvider>, search: Arc<dyn SearchProvider>) -> Self {
        Self {
            llm,
            search,
            search_depth: "advanced".to_string(),
            temperature: 0.3,
            model_override: None,
        }
    }

    pub fn with_search_depth(mut self, depth: impl Into<String>) -> Self {
        self.search_depth = depth.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_model_override(mut self, model: Option<String>) -> Self {
        self.model_override = model;
        self
    }

    /// Run a single search, truncating the query to the provider limit.
    pub async fn search_sources(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SourceRecord>, crate::error::SearchError> {
        let query = truncate_chars(query.trim(), self.search.max_query_chars());
        let hits = self
            .search
            .search(SearchRequest {
                query: query.to_string(),
                max_results,
                depth: self.search_depth.clone(),
            })
            .await?;
        Ok(hits.into_iter().map(SourceRecord::from).collect())
    }

    /// Execute every planned query and synthesize findings, aspect by aspect.
    ///
    /// At most `profile.synthesis_source_budget()` distinct sources are numbered;
    /// hits past that budget are neither cited nor shown to the model.
    /// `on_aspect_done` is called after each aspect with (completed, total).
    pub async fn synthesize<F>(
        &self,
        topic: &str,
        planned: &[PlannedAspect],
        profile: &DepthProfile,
        document_context: Option<&str>,
        mut on_aspect_done: F,
    ) -> SynthesisOutput
    where
        F: FnMut(&AspectFindings, usize, usize),
    {
        let mut registry = SourceDeduplicator::with_limit(profile.synthesis_source_budget());
        let mut aspects = Vec::with_capacity(planned.len());

        for (i, plan) in planned.iter().enumerate() {
            let findings = self
                .synthesize_aspect(topic, plan, profile, document_context, &mut registry)
                .await;
            info!(
                aspect = %plan.aspect.key,
                queries = findings.queries.len(),
                failed = findings.failed_queries(),
                sources = findings.sources.len(),
                "Aspect synthesized"
            );
            on_aspect_done(&findings, i + 1, planned.len());
            aspects.push(findings);
        }

        if registry.is_full() {
            debug!(limit = ?registry.limit(), "Synthesis source budget reached");
        }
        SynthesisOutput {
            aspects,
            sources: registry.into_sources(),
        }
    }

    async fn synthesize_aspect(
        &self,
        topic: &str,
        plan: &PlannedAspect,
        profile: &DepthProfile,
        document_context: Option<&str>,
        registry: &mut SourceDeduplicator,
    ) -> AspectFindings {
        let mut queries = Vec::with_capacity(plan.queries.len());
        let mut aspect_sources = Vec::new();

        for query in &plan.queries {
            let sources = match self.search_sources(query, profile.results_per_query).await {
                Ok(sources) => sources,
                Err(e) => {
                    warn!(aspect = %plan.aspect.key, query = %query, error = %e, "Search failed");
                    queries.push(QueryFinding::failed(query, e.to_string(), 0));
                    continue;
                }
            };

            let numbered: Vec<(usize, &SourceRecord)> = sources
                .iter()
                .filter_map(|s| registry.insert(s.clone()).map(|(n, _)| (n, s)))
                .collect();

            if numbered.is_empty() && document_context.is_none() {
                debug!(query = %query, hits = sources.len(), "No citable results; skipping synthesis call");
                queries.push(QueryFinding {
                    query: query.clone(),
                    text: String::new(),
                    sources_found: sources.len(),
                    error: None,
                });
                continue;
            }

            let request = CompletionRequest::new(
                SYNTHESIS_SYSTEM_PROMPT,
                self.synthesis_prompt(topic, &plan.aspect, query, &numbered, profile, document_context),
            )
            .with_temperature(self.temperature)
            .with_max_output_tokens(2048)
            .with_model(self.model_override.clone());

            let finding = match self.llm.complete(request).await {
                Ok(response) => QueryFinding {
                    query: query.clone(),
                    text: response.text.trim().to_string(),
                    sources_found: sources.len(),
                    error: None,
                },
                Err(e) => {
                    warn!(aspect = %plan.aspect.key, query = %query, error = %e, "Synthesis failed");
                    QueryFinding::failed(query, e.to_string(), sources.len())
                }
            };
            queries.push(finding);
            aspect_sources.extend(numbered.into_iter().map(|(_, s)| s.clone()));
        }

        AspectFindings {
            aspect: plan.aspect.clone(),
            queries,
            sources: aspect_sources,
        }
    }

    fn synthesis_prompt(
        &self,
        topic: &str,
        aspect: &ResearchAspect,
        query: &str,
        numbered: &[(usize, &SourceRecord)],
        profile: &DepthProfile,
        document_context: Option<&str>,
    ) -> String {
        let mut prompt = format!(
            "Research topic: {topic}\nAspect: {} - {}\nSearch query: {query}\n\nSources:\n",
            aspect.title, aspect.description
        );
        for (n, source) in numbered {
            prompt.push_str(&format!(
                "[{n}] {} ({})\n{}\n\n",
                source.title(),
                source.url(),
                truncate_chars(source.content(), MAX_SOURCE_CHARS_IN_PROMPT)
            ));
        }
        if let Some(context) = document_context {
            prompt.push_str("Additional document context supplied by the user:\n");
            prompt.push_str(context);
            prompt.push_str("\n\n");
        }
        prompt.push_str(
            "Extract the findings relevant to this aspect as concise paragraphs or bullet \
             points with citation markers.",
        );
        if profile.features.multi_perspective {
            prompt.push_str(
                " Where sources disagree, present the competing perspectives side by side.",
            );
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::error::SearchError;
    use crate::research::aspects::select_aspects;
    use crate::research::depth::ResearchDepth;
    use crate::search::{MockSearchProvider, SearchHit};

    fn planned(queries: &[&[&str]]) -> Vec<PlannedAspect> {
        select_aspects(queries.len())
            .into_iter()
            .zip(queries)
            .map(|(aspect, qs)| PlannedAspect {
                aspect,
                queries: qs.iter().map(|q| q.to_string()).collect(),
                used_fallback: false,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_failed_query_recorded_and_run_continues() {
        let llm = Arc::new(MockLlmProvider::with_response("Finding [1]."));
        let search = Arc::new(MockSearchProvider::with_handler(|req| {
            if req.query == "bad query" {
                Err(SearchError::ApiRequest {
                    message: "502".into(),
                })
            } else {
                Ok(vec![SearchHit {
                    title: format!("About {}", req.query),
                    url: format!("https://site.com/{}", req.query.replace(' ', "-")),
                    content: "text".into(),
                    ..Default::default()
                }])
            }
        }));
        let synth = SearchSynthesizer::new(llm, search);
        let plan = planned(&[&["good query", "bad query"], &["other query"]]);
        let out = synth
            .synthesize("topic", &plan, &ResearchDepth::Standard.profile(), None, |_, _, _| {})
            .await;

        assert_eq!(out.aspects.len(), 2);
        assert_eq!(out.aspects[0].queries.len(), 2);
        assert!(out.aspects[0].queries[1].is_error());
        assert_eq!(out.aspects[0].failed_queries(), 1);
        assert_eq!(out.aspects[0].findings_text(), "Finding [1].");
        assert_eq!(out.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_citation_numbers_stable_across_aspects() {
        let llm = Arc::new(MockLlmProvider::with_response("ok"));
        let search = Arc::new(MockSearchProvider::with_handler(|_| {
            Ok(vec![
                SearchHit {
                    title: "Shared".into(),
                    url: "https://shared.org/a".into(),
                    content: "c".into(),
                    ..Default::default()
                },
            ])
        }));
        let synth = SearchSynthesizer::new(llm.clone(), search);
        let plan = planned(&[&["q1"], &["q2"]]);
        let out = synth
            .synthesize("t", &plan, &ResearchDepth::Quick.profile(), None, |_, _, _| {})
            .await;

        // Same url in both aspects keeps citation [1] and is deduplicated
        assert_eq!(out.sources.len(), 1);
        let requests = llm.requests();
        assert!(requests[0].user_prompt.contains("[1] Shared"));
        assert!(requests[1].user_prompt.contains("[1] Shared"));
    }

    #[tokio::test]
    async fn test_hits_past_source_budget_are_not_numbered() {
        let llm = Arc::new(MockLlmProvider::with_response("ok"));
        let search = Arc::new(MockSearchProvider::with_generated_hits(3));
        let synth = SearchSynthesizer::new(llm.clone(), search);
        let plan = planned(&[&["first"], &["second"]]);
        let out = synth
            .synthesize("t", &plan, &ResearchDepth::Quick.profile(), None, |_, _, _| {})
            .await;

        // Quick allows 5 sources; the sixth hit is dropped before prompting
        assert_eq!(out.sources.len(), 5);
        assert_eq!(out.aspects[1].sources.len(), 2);
        assert_eq!(out.aspects[1].queries[0].sources_found, 3);
        let second = &llm.requests()[1].user_prompt;
        assert!(second.contains("[5] "));
        assert!(!second.contains("[6] "));
        assert!(!second.contains("https://example2.com/second"));
    }

    #[tokio::test]
    async fn test_document_context_and_perspectives_in_prompt() {
        let llm = Arc::new(MockLlmProvider::with_response("ok"));
        let search = Arc::new(MockSearchProvider::with_generated_hits(1));
        let synth = SearchSynthesizer::new(llm.clone(), search);
        let plan = planned(&[&["q"]]);
        synth
            .synthesize(
                "t",
                &plan,
                &ResearchDepth::Comprehensive.profile(),
                Some("INTERNAL MEMO TEXT"),
                |_, _, _| {},
            )
            .await;
        let prompt = &llm.requests()[0].user_prompt;
        assert!(prompt.contains("INTERNAL MEMO TEXT"));
        assert!(prompt.contains("competing perspectives"));
    }

    #[tokio::test]
    async fn test_queries_truncated_to_provider_limit() {
        let llm = Arc::new(MockLlmProvider::with_response("ok"));
        let search = Arc::new(MockSearchProvider::with_generated_hits(1).with_max_query_chars(10));
        let synth = SearchSynthesizer::new(llm, search.clone());
        let plan = planned(&[&["a very long query that exceeds the limit"]]);
        synth
            .synthesize("t", &plan, &ResearchDepth::Quick.profile(), None, |_, _, _| {})
            .await;
        assert_eq!(search.requests()[0].query, "a very lon");
        assert_eq!(search.requests()[0].max_results, 3);
    }

    #[tokio::test]
    async fn test_progress_callback_per_aspect() {
        let llm = Arc::new(MockLlmProvider::with_response("ok"));
        let search = Arc::new(MockSearchProvider::with_generated_hits(1));
        let synth = SearchSynthesizer::new(llm, search);
        let plan = planned(&[&["a"], &["b"], &["c"]]);
        let mut seen = Vec::new();
        synth
            .synthesize("t", &plan, &ResearchDepth::Standard.profile(), None, |f, done, total| {
                seen.push((f.aspect.key.clone(), done, total));
            })
            .await;
        assert_eq!(
            seen,
            vec![
                ("core_concepts".to_string(), 1, 3),
                ("current_state".to_string(), 2, 3),
                ("applications".to_string(), 3, 3),
            ]
        );
    }
}
