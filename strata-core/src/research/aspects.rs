//! Aspect planning: decompose a topic into aspect lenses and search queries.
//!
//! Query generation fans out across aspects concurrently. A failed or
//! unparseable generation degrades that aspect to a single fallback query.

use super::decode::{Decoded, decode_query_list};
use super::depth::DepthProfile;
use crate::brain::{CompletionRequest, LlmProvider};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Maximum length of a generated search query, in characters.
pub const MAX_QUERY_CHARS: usize = 300;

/// A sub-topic lens used to decompose a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchAspect {
    pub key: String,
    pub title: String,
    pub description: String,
}

const MASTER_ASPECTS: [(&str, &str, &str); 5] = [
    (
        "core_concepts",
        "Core Concepts",
        "Definitions, fundamental principles, and how the subject works",
    ),
    (
        "current_state",
        "Current State",
        "Present-day status, key players, adoption, and recent developments",
    ),
    (
        "applications",
        "Applications",
        "Practical uses, case studies, and real-world implementations",
    ),
    (
        "challenges",
        "Challenges",
        "Limitations, risks, open problems, and points of controversy",
    ),
    (
        "future_trends",
        "Future Trends",
        "Emerging directions, forecasts, and expected developments",
    ),
];

/// The first `count` aspects of the fixed master list, in order.
pub fn select_aspects(count: usize) -> Vec<ResearchAspect> {
    MASTER_ASPECTS
        .iter()
        .take(count)
        .map(|(key, title, description)| ResearchAspect {
            key: (*key).to_string(),
            title: (*title).to_string(),
            description: (*description).to_string(),
        })
        .collect()
}

/// An aspect with its planned queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAspect {
    pub aspect: ResearchAspect,
    pub queries: Vec<String>,
    /// True when the queries came from the fallback rather than the model.
    pub used_fallback: bool,
}

impl PlannedAspect {
    fn from_decoded(aspect: ResearchAspect, decoded: Decoded<Vec<String>>) -> Self {
        let used_fallback = decoded.is_fallback();
        Self {
            aspect,
            queries: decoded.into_value(),
            used_fallback,
        }
    }
}

const PLANNER_SYSTEM_PROMPT: &str = "You are a research planner. You write precise web search \
queries. Respond with a JSON object of the form {\"queries\": [\"...\"]} and nothing else.";

/// Generates search queries for each aspect of a topic.
pub struct AspectPlanner {
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
    model_override: Option<String>,
}

impl AspectPlanner {
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

    /// The query used when generation fails for an aspect.
    pub fn fallback_query(topic: &str, aspect: &ResearchAspect) -> String {
        let query = format!("{topic} {}", aspect.title);
        crate::search::truncate_chars(&query, MAX_QUERY_CHARS).to_string()
    }

    /// Plan queries for every aspect selected by the profile, concurrently.
    ///
    /// Output order matches the master aspect order.
    pub async fn plan(&self, topic: &str, profile: &DepthProfile) -> Vec<PlannedAspect> {
        let aspects = select_aspects(profile.aspect_count);
        let futures = aspects
            .into_iter()
            .map(|aspect| self.plan_aspect(topic, aspect, profile.queries_per_aspect));
        join_all(futures).await
    }

    /// Plan queries for a single aspect. Never fails.
    pub async fn plan_aspect(
        &self,
        topic: &str,
        aspect: ResearchAspect,
        queries_per_aspect: usize,
    ) -> PlannedAspect {
        let fallback = vec![Self::fallback_query(topic, &aspect)];
        let mut user_prompt = format!(
            "Topic: {topic}\nAspect: {title} - {description}\n\n\
             Write up to {n} distinct web search queries that would find authoritative \
             sources on this aspect of the topic. Each query must be under {max} characters.",
            title = aspect.title,
            description = aspect.description,
            n = queries_per_aspect,
            max = MAX_QUERY_CHARS,
        );
        if !self.llm.supports_structured_output() {
            user_prompt.push_str(
                "\n\nReply with the JSON object only: no prose and no code fences.",
            );
        }
        let request = CompletionRequest::new(PLANNER_SYSTEM_PROMPT, user_prompt)
            .with_temperature(self.temperature)
            .with_max_output_tokens(1024)
            .structured()
            .with_model(self.model_override.clone());

        let decoded = match self.llm.complete(request).await {
            Ok(response) => decode_query_list(
                &response.text,
                queries_per_aspect,
                MAX_QUERY_CHARS,
                fallback,
            ),
            Err(e) => {
                warn!(aspect = %aspect.key, error = %e, "Query generation failed, using fallback");
                Decoded::fallback(fallback, e.to_string())
            }
        };

        if let Decoded::Fallback { reason, .. } = &decoded {
            debug!(aspect = %aspect.key, reason = %reason, "Aspect planned with fallback query");
        }
        PlannedAspect::from_decoded(aspect, decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::error::LlmError;
    use crate::research::depth::ResearchDepth;

    #[test]
    fn test_select_aspects_order_and_truncation() {
        let keys: Vec<String> = select_aspects(3).into_iter().map(|a| a.key).collect();
        assert_eq!(keys, vec!["core_concepts", "current_state", "applications"]);
        assert_eq!(select_aspects(10).len(), 5);
    }

    #[tokio::test]
    async fn test_plan_uses_model_queries() {
        let llm = Arc::new(MockLlmProvider::with_response(
            r#"{"queries": ["battery recycling chemistry", "hydrometallurgy basics", "extra"]}"#,
        ));
        let planner = AspectPlanner::new(llm.clone());
        let profile = ResearchDepth::Standard.profile();
        let planned = planner.plan("battery recycling", &profile).await;

        assert_eq!(planned.len(), 3);
        for p in &planned {
            assert!(!p.used_fallback);
            assert_eq!(p.queries.len(), profile.queries_per_aspect);
        }
        assert_eq!(llm.call_count(), 3);
        assert!(llm.requests().iter().all(|r| r.structured_output));
    }

    #[tokio::test]
    async fn test_unparseable_output_falls_back() {
        let llm = Arc::new(MockLlmProvider::with_response("no idea, sorry"));
        let planner = AspectPlanner::new(llm);
        let planned = planner
            .plan("solid state batteries", &ResearchDepth::Quick.profile())
            .await;

        assert_eq!(planned[0].queries, vec!["solid state batteries Core Concepts"]);
        assert_eq!(planned[1].queries, vec!["solid state batteries Current State"]);
        assert!(planned.iter().all(|p| p.used_fallback));
    }

    #[tokio::test]
    async fn test_failed_aspect_does_not_abort_others() {
        let llm = Arc::new(MockLlmProvider::with_handler(|req| {
            if req.user_prompt.contains("Aspect: Current State") {
                Err(LlmError::ApiRequest {
                    message: "boom".into(),
                })
            } else {
                Ok(r#"["good query"]"#.to_string())
            }
        }));
        let planner = AspectPlanner::new(llm);
        let planned = planner.plan("grid storage", &ResearchDepth::Quick.profile()).await;

        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].aspect.key, "core_concepts");
        assert_eq!(planned[0].queries, vec!["good query"]);
        assert!(!planned[0].used_fallback);
        assert_eq!(planned[1].aspect.key, "current_state");
        assert_eq!(planned[1].queries, vec!["grid storage Current State"]);
        assert!(planned[1].used_fallback);
    }

    #[tokio::test]
    async fn test_json_only_instruction_without_native_structured_output() {
        let native = Arc::new(MockLlmProvider::with_response(r#"{"queries": ["q"]}"#));
        AspectPlanner::new(native.clone())
            .plan("x", &ResearchDepth::Quick.profile())
            .await;
        assert!(!native.requests()[0].user_prompt.contains("JSON object only"));

        let plain = Arc::new(
            MockLlmProvider::with_response(r#"{"queries": ["q"]}"#).with_structured_output(false),
        );
        let planned = AspectPlanner::new(plain.clone())
            .plan("x", &ResearchDepth::Quick.profile())
            .await;
        assert!(plain.requests()[0].user_prompt.contains("JSON object only"));
        assert!(!planned[0].used_fallback);
    }

    #[tokio::test]
    async fn test_model_override_forwarded() {
        let llm = Arc::new(MockLlmProvider::with_response(r#"["q"]"#));
        let planner =
            AspectPlanner::new(llm.clone()).with_model_override(Some("gpt-4o-mini".into()));
        planner.plan("x", &ResearchDepth::Quick.profile()).await;
        assert!(
            llm.requests()
                .iter()
                .all(|r| r.model.as_deref() == Some("gpt-4o-mini"))
        );
    }

    #[test]
    fn test_fallback_query_truncated() {
        let topic = "t".repeat(400);
        let aspect = select_aspects(1).remove(0);
        let q = AspectPlanner::fallback_query(&topic, &aspect);
        assert_eq!(q.chars().count(), MAX_QUERY_CHARS);
    }
}
