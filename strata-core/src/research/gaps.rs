//! Gap analysis: coverage critique and follow-up searches before composition.

use super::decode::Decoded;
use super::depth::DepthProfile;
use super::refinement::{IterationKind, RefinementIteration};
use super::sources::{SourceDeduplicator, format_source_list};
use super::synthesis::SearchSynthesizer;
use crate::brain::{CompletionRequest, LlmProvider};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Follow-up queries searched per gap-analysis pass.
pub const MAX_GAP_QUERIES: usize = 3;

const QUERY_BLOCK_MARKER: &str = "RECOMMENDED_QUERIES:";

/// Fallback follow-up queries used when no query block can be parsed.
pub fn fallback_gap_queries(topic: &str) -> Vec<String> {
    vec![
        format!("{topic} latest research"),
        format!("{topic} limitations and criticism"),
        format!("{topic} statistics and data"),
    ]
}

/// Extract the bullet list following a `RECOMMENDED_QUERIES:` marker.
///
/// Bullets may use `-`, `*`, `•` or `1.` numbering; surrounding quotes are
/// stripped. The block ends at the first non-bullet line after a bullet.
/// No marker or an empty block yields `fallback`.
pub fn parse_recommended_queries(text: &str, fallback: Vec<String>) -> Decoded<Vec<String>> {
    let mut in_block = false;
    let mut queries = Vec::new();
    for line in text.lines() {
        if !in_block {
            in_block = line.to_uppercase().contains(QUERY_BLOCK_MARKER);
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            if queries.is_empty() {
                continue;
            }
            break;
        }
        match strip_bullet(line) {
            Some(query) if !query.is_empty() => queries.push(query.to_string()),
            Some(_) => {}
            None if queries.is_empty() => {}
            None => break,
        }
    }

    if !in_block {
        return Decoded::fallback(fallback, "no RECOMMENDED_QUERIES block");
    }
    if queries.is_empty() {
        Decoded::fallback(fallback, "RECOMMENDED_QUERIES block was empty")
    } else {
        Decoded::parsed(queries)
    }
}

fn strip_bullet(line: &str) -> Option<&str> {
    let rest = if let Some(r) = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("• "))
    {
        r
    } else {
        let digits = line.find(|c: char| !c.is_ascii_digit())?;
        if digits == 0 {
            return None;
        }
        line[digits..]
            .strip_prefix(". ")
            .or_else(|| line[digits..].strip_prefix(") "))?
    };
    Some(rest.trim().trim_matches(['"', '\'', '`']).trim())
}

const GAP_SYSTEM_PROMPT: &str = "You are a research reviewer who identifies what a body of \
research is missing.";

/// Runs the gap-analysis passes.
pub struct GapAnalyzer {
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
    model_override: Option<String>,
}

impl GapAnalyzer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            temperature: 0.4,
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

    /// Run `profile.gap_analysis_passes()` passes, merging new sources into `pool`.
    ///
    /// Always completes every pass; failed calls and searches are logged and skipped.
    pub async fn run(
        &self,
        topic: &str,
        profile: &DepthProfile,
        findings: &str,
        synthesizer: &SearchSynthesizer,
        pool: &mut SourceDeduplicator,
    ) -> Vec<RefinementIteration> {
        let passes = profile.gap_analysis_passes();
        let mut log = Vec::with_capacity(passes);

        for pass_number in 1..=passes {
            let analysis = self
                .analyze(topic, findings, pool)
                .await
                .unwrap_or_default();
            let decoded = parse_recommended_queries(&analysis, fallback_gap_queries(topic));
            if let Decoded::Fallback { reason, .. } = &decoded {
                debug!(pass = pass_number, reason = %reason, "Using fallback gap queries");
            }
            let queries: Vec<String> = decoded
                .into_value()
                .into_iter()
                .take(MAX_GAP_QUERIES)
                .collect();

            let before = pool.len();
            for query in &queries {
                match synthesizer
                    .search_sources(query, profile.results_per_query)
                    .await
                {
                    Ok(sources) => {
                        for source in sources {
                            pool.insert(source);
                        }
                    }
                    Err(e) => warn!(pass = pass_number, query = %query, error = %e, "Gap query failed"),
                }
            }
            let sources_added = pool.len() - before;
            info!(pass = pass_number, sources_added, "Gap-analysis pass complete");

            log.push(RefinementIteration {
                pass_number,
                kind: IterationKind::GapAnalysis,
                gap_analysis_text: analysis,
                recommended_queries: queries,
                sources_added,
                resulting_score: None,
                accepted: true,
            });
        }
        log
    }

    async fn analyze(
        &self,
        topic: &str,
        findings: &str,
        pool: &SourceDeduplicator,
    ) -> Option<String> {
        let prompt = format!(
            "Topic: {topic}\n\nCurrent findings:\n{findings}\n\nSources so far:\n{}\n\n\
             Identify the most important gaps in coverage: missing perspectives, data, time \
             periods, or primary sources. Then end with a line `{QUERY_BLOCK_MARKER}` followed \
             by up to {MAX_GAP_QUERIES} search queries as bullet points.",
            format_source_list(pool.sources())
        );
        let request = CompletionRequest::new(GAP_SYSTEM_PROMPT, prompt)
            .with_temperature(self.temperature)
            .with_max_output_tokens(1500)
            .with_model(self.model_override.clone());
        match self.llm.complete(request).await {
            Ok(response) => Some(response.text),
            Err(e) => {
                warn!(error = %e, "Gap analysis call failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::error::{LlmError, SearchError};
    use crate::research::depth::ResearchDepth;
    use crate::research::sources::SourceRecord;
    use crate::search::MockSearchProvider;
    use pretty_assertions::assert_eq;

    fn fb() -> Vec<String> {
        vec!["fallback".into()]
    }

    #[test]
    fn test_parse_bullets() {
        let text = "Gaps: little on policy.\n\nRECOMMENDED_QUERIES:\n- \"EU battery regulation 2023\"\n* recycling cost per kWh\n• black mass pricing\n\nThanks";
        assert_eq!(
            parse_recommended_queries(text, fb()),
            Decoded::parsed(vec![
                "EU battery regulation 2023".to_string(),
                "recycling cost per kWh".to_string(),
                "black mass pricing".to_string(),
            ])
        );
    }

    #[test]
    fn test_parse_numbered_and_case_insensitive_marker() {
        let text = "recommended_queries:\n1. first query\n2) second query\nNot a bullet";
        let d = parse_recommended_queries(text, fb());
        assert_eq!(d.into_value(), vec!["first query", "second query"]);
    }

    #[test]
    fn test_parse_missing_marker_falls_back() {
        let d = parse_recommended_queries("- a query without a marker", fb());
        assert!(d.is_fallback());
        assert_eq!(d.into_value(), fb());
    }

    #[test]
    fn test_parse_empty_block_falls_back() {
        let d = parse_recommended_queries("RECOMMENDED_QUERIES:\n\nnothing here", fb());
        assert!(d.is_fallback());
    }

    #[tokio::test]
    async fn test_run_completes_all_passes_despite_failures() {
        let llm = Arc::new(MockLlmProvider::new());
        llm.queue_error(LlmError::RateLimited {
            retry_after_secs: 1,
        });
        llm.queue_response("RECOMMENDED_QUERIES:\n- new angle\n- failing query\n- x\n- y");
        let search = Arc::new(MockSearchProvider::with_handler(|req| {
            if req.query == "failing query" {
                Err(SearchError::RateLimited {
                    retry_after_secs: 1,
                })
            } else {
                Ok(vec![crate::search::SearchHit {
                    title: req.query.clone(),
                    url: format!("https://gap.org/{}", req.query.replace(' ', "-")),
                    content: "c".into(),
                    ..Default::default()
                }])
            }
        }));
        let synth = SearchSynthesizer::new(llm.clone(), search.clone());
        let analyzer = GapAnalyzer::new(llm);
        let mut pool = SourceDeduplicator::new();
        pool.insert(SourceRecord::new("seed", "https://seed.com", ""));

        let profile = ResearchDepth::Exhaustive.profile();
        let log = analyzer
            .run("batteries", &profile, "findings", &synth, &mut pool)
            .await;

        assert_eq!(log.len(), 2);
        // Pass 1: analysis failed, fallback queries used
        assert_eq!(log[0].recommended_queries, fallback_gap_queries("batteries"));
        assert_eq!(log[0].sources_added, 3);
        // Pass 2: capped at three queries, one search failed
        assert_eq!(log[1].recommended_queries, vec!["new angle", "failing query", "x"]);
        assert_eq!(log[1].sources_added, 2);
        assert!(log.iter().all(|i| i.kind == IterationKind::GapAnalysis));
        assert_eq!(pool.len(), 6);
        assert_eq!(search.requests().len(), 6);
    }

    #[tokio::test]
    async fn test_no_passes_below_exhaustive() {
        let llm = Arc::new(MockLlmProvider::new());
        let search = Arc::new(MockSearchProvider::new());
        let synth = SearchSynthesizer::new(llm.clone(), search);
        let analyzer = GapAnalyzer::new(llm.clone());
        let mut pool = SourceDeduplicator::new();
        let log = analyzer
            .run("t", &ResearchDepth::Comprehensive.profile(), "", &synth, &mut pool)
            .await;
        assert!(log.is_empty());
        assert_eq!(llm.call_count(), 0);
    }
}
