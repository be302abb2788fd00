//! Depth tiers and the execution parameters each one implies.

use super::gaps::MAX_GAP_QUERIES;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Research depth tier, in increasing order of scale and rigor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchDepth {
    Quick,
    Standard,
    Comprehensive,
    Exhaustive,
}

impl ResearchDepth {
    pub const ALL: [ResearchDepth; 4] = [
        ResearchDepth::Quick,
        ResearchDepth::Standard,
        ResearchDepth::Comprehensive,
        ResearchDepth::Exhaustive,
    ];

    /// Parse a depth name. Unknown or missing names fall back to `Comprehensive`.
    pub fn resolve(name: Option<&str>) -> Self {
        match name.map(|n| n.trim().to_ascii_lowercase()).as_deref() {
            Some("quick") => ResearchDepth::Quick,
            Some("standard") => ResearchDepth::Standard,
            Some("comprehensive") => ResearchDepth::Comprehensive,
            Some("exhaustive") => ResearchDepth::Exhaustive,
            _ => ResearchDepth::Comprehensive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchDepth::Quick => "quick",
            ResearchDepth::Standard => "standard",
            ResearchDepth::Comprehensive => "comprehensive",
            ResearchDepth::Exhaustive => "exhaustive",
        }
    }

    /// The execution profile for this depth.
    pub fn profile(&self) -> DepthProfile {
        DepthProfile::for_depth(*self)
    }

    /// Maximum refinement passes after validation (0 = refinement disabled).
    pub fn max_refinement_passes(&self) -> usize {
        match self {
            ResearchDepth::Quick | ResearchDepth::Standard => 0,
            ResearchDepth::Comprehensive => 3,
            ResearchDepth::Exhaustive => 5,
        }
    }
}

impl fmt::Display for ResearchDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional pipeline stages enabled per depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthFeatures {
    pub fact_checking: bool,
    pub multi_perspective: bool,
    pub refinement: bool,
    pub gap_analysis: bool,
}

/// Inclusive target word range for the final report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordRange {
    pub min: usize,
    pub max: usize,
}

impl WordRange {
    pub fn contains(&self, words: usize) -> bool {
        words >= self.min && words <= self.max
    }
}

/// Execution parameters for one research run. Built from a static table, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthProfile {
    pub depth: ResearchDepth,
    pub max_sources: usize,
    pub aspect_count: usize,
    pub queries_per_aspect: usize,
    pub results_per_query: usize,
    pub synthesis_iterations: usize,
    pub word_count_range: WordRange,
    pub timeout_seconds: u64,
    pub features: DepthFeatures,
}

impl DepthProfile {
    /// Resolve a depth name to its profile; unknown names get the comprehensive profile.
    pub fn resolve(name: Option<&str>) -> Self {
        Self::for_depth(ResearchDepth::resolve(name))
    }

    pub fn for_depth(depth: ResearchDepth) -> Self {
        match depth {
            ResearchDepth::Quick => Self {
                depth,
                max_sources: 5,
                aspect_count: 2,
                queries_per_aspect: 1,
                results_per_query: 3,
                synthesis_iterations: 1,
                word_count_range: WordRange { min: 500, max: 1500 },
                timeout_seconds: 5 * 60,
                features: DepthFeatures {
                    fact_checking: false,
                    multi_perspective: false,
                    refinement: false,
                    gap_analysis: false,
                },
            },
            ResearchDepth::Standard => Self {
                depth,
                max_sources: 15,
                aspect_count: 3,
                queries_per_aspect: 2,
                results_per_query: 5,
                synthesis_iterations: 1,
                word_count_range: WordRange { min: 1500, max: 3000 },
                timeout_seconds: 15 * 60,
                features: DepthFeatures {
                    fact_checking: true,
                    multi_perspective: false,
                    refinement: false,
                    gap_analysis: false,
                },
            },
            ResearchDepth::Comprehensive => Self {
                depth,
                max_sources: 30,
                aspect_count: 4,
                queries_per_aspect: 3,
                results_per_query: 5,
                synthesis_iterations: 2,
                word_count_range: WordRange { min: 3000, max: 6000 },
                timeout_seconds: 40 * 60,
                features: DepthFeatures {
                    fact_checking: true,
                    multi_perspective: true,
                    refinement: true,
                    gap_analysis: false,
                },
            },
            ResearchDepth::Exhaustive => Self {
                depth,
                max_sources: 60,
                aspect_count: 5,
                queries_per_aspect: 4,
                results_per_query: 8,
                synthesis_iterations: 3,
                word_count_range: WordRange { min: 6000, max: 12000 },
                timeout_seconds: 120 * 60,
                features: DepthFeatures {
                    fact_checking: true,
                    multi_perspective: true,
                    refinement: true,
                    gap_analysis: true,
                },
            },
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Gap-analysis passes run before composition.
    pub fn gap_analysis_passes(&self) -> usize {
        if self.features.gap_analysis {
            self.synthesis_iterations.saturating_sub(1)
        } else {
            0
        }
    }

    /// Refinement passes allowed after validation.
    pub fn max_refinement_passes(&self) -> usize {
        if self.features.refinement {
            self.depth.max_refinement_passes()
        } else {
            0
        }
    }

    /// Source slots held back for gap-analysis results.
    ///
    /// Enough for every gap query of every pass, but never more than a quarter
    /// of `max_sources`.
    pub fn gap_source_reserve(&self) -> usize {
        let passes = self.gap_analysis_passes();
        if passes == 0 {
            return 0;
        }
        (MAX_GAP_QUERIES * self.results_per_query * passes).min(self.max_sources / 4)
    }

    /// Distinct sources synthesis may register before it stops numbering new hits.
    pub fn synthesis_source_budget(&self) -> usize {
        self.max_sources - self.gap_source_reserve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_depths() {
        assert_eq!(ResearchDepth::resolve(Some("quick")), ResearchDepth::Quick);
        assert_eq!(ResearchDepth::resolve(Some(" Exhaustive ")), ResearchDepth::Exhaustive);
        assert_eq!(ResearchDepth::resolve(Some("STANDARD")), ResearchDepth::Standard);
    }

    #[test]
    fn test_resolve_falls_back_to_comprehensive() {
        assert_eq!(ResearchDepth::resolve(None), ResearchDepth::Comprehensive);
        assert_eq!(ResearchDepth::resolve(Some("")), ResearchDepth::Comprehensive);
        assert_eq!(ResearchDepth::resolve(Some("deep")), ResearchDepth::Comprehensive);
        assert_eq!(
            DepthProfile::resolve(Some("nonsense")).depth,
            ResearchDepth::Comprehensive
        );
    }

    #[test]
    fn test_profile_invariants() {
        for depth in ResearchDepth::ALL {
            let p = depth.profile();
            assert!(p.word_count_range.min < p.word_count_range.max, "{depth}");
            assert!(p.aspect_count <= 5, "{depth}");
            assert!(p.aspect_count > 0 && p.queries_per_aspect > 0, "{depth}");
        }
    }

    #[test]
    fn test_quick_profile() {
        let p = DepthProfile::resolve(Some("quick"));
        assert_eq!(p.max_sources, 5);
        assert_eq!(p.aspect_count, 2);
        assert_eq!(p.word_count_range, WordRange { min: 500, max: 1500 });
        assert!(!p.features.refinement);
        assert!(!p.features.fact_checking);
        assert_eq!(p.max_refinement_passes(), 0);
        assert_eq!(p.gap_analysis_passes(), 0);
    }

    #[test]
    fn test_refinement_and_gap_budgets() {
        assert_eq!(ResearchDepth::Comprehensive.profile().max_refinement_passes(), 3);
        assert_eq!(ResearchDepth::Exhaustive.profile().max_refinement_passes(), 5);
        assert_eq!(ResearchDepth::Exhaustive.profile().gap_analysis_passes(), 2);
        assert_eq!(ResearchDepth::Comprehensive.profile().gap_analysis_passes(), 0);
    }

    #[test]
    fn test_source_budget_reserves_room_for_gap_analysis() {
        let quick = ResearchDepth::Quick.profile();
        assert_eq!(quick.gap_source_reserve(), 0);
        assert_eq!(quick.synthesis_source_budget(), 5);

        let comprehensive = ResearchDepth::Comprehensive.profile();
        assert_eq!(comprehensive.synthesis_source_budget(), 30);

        let exhaustive = ResearchDepth::Exhaustive.profile();
        assert_eq!(exhaustive.gap_source_reserve(), 15);
        assert_eq!(exhaustive.synthesis_source_budget(), 45);
    }

    #[test]
    fn test_timeouts_escalate() {
        let secs: Vec<u64> = ResearchDepth::ALL
            .iter()
            .map(|d| d.profile().timeout_seconds)
            .collect();
        assert_eq!(secs, vec![300, 900, 2400, 7200]);
    }

    #[test]
    fn test_depth_serde_snake_case() {
        let json = serde_json::to_string(&ResearchDepth::Exhaustive).unwrap();
        assert_eq!(json, "\"exhaustive\"");
    }
}
