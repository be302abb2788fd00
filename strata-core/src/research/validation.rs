//! Report quality validation.
//!
//! The validator is stateless and total: any report text, including an empty
//! one, yields a `ValidationResult` with a score in `[0, 1]`.

use super::depth::{DepthProfile, ResearchDepth};
use super::sources::{SourceRecord, is_academic, is_primary};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap, HashSet};

const WEIGHT_WORD_COUNT: f64 = 0.20;
const WEIGHT_SOURCE_COUNT: f64 = 0.15;
const WEIGHT_STRUCTURE: f64 = 0.15;
const WEIGHT_CITATIONS: f64 = 0.20;
const WEIGHT_SOURCE_QUALITY: f64 = 0.15;
const WEIGHT_ANALYSIS: f64 = 0.15;

const CITATION_PASS: f64 = 0.7;
const ANALYSIS_PASS: f64 = 0.6;

/// Result of validating a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub score: f64,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub metrics: BTreeMap<String, Value>,
}

impl ValidationResult {
    /// Fetch a numeric metric.
    pub fn metric_f64(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).and_then(Value::as_f64)
    }
}

/// Anything that can score a report; the refinement loop depends only on this.
pub trait ReportValidator: Send + Sync {
    fn validate(
        &self,
        report: &str,
        depth: ResearchDepth,
        sources: &[SourceRecord],
    ) -> ValidationResult;
}

/// Fixed per-depth validation requirements.
#[derive(Debug, Clone, Copy)]
struct Requirements {
    min_sources: usize,
    structure_pass: f64,
    quality_threshold: f64,
    analysis_threshold: f64,
    overall_threshold: f64,
    require_dates: bool,
    require_authors: bool,
    min_academic_ratio: Option<f64>,
    min_primary_ratio: Option<f64>,
    min_domain_diversity: Option<f64>,
}

fn requirements(depth: ResearchDepth) -> Requirements {
    match depth {
        ResearchDepth::Quick => Requirements {
            min_sources: 3,
            structure_pass: 0.5,
            quality_threshold: 0.4,
            analysis_threshold: 5.0,
            overall_threshold: 0.6,
            require_dates: false,
            require_authors: false,
            min_academic_ratio: None,
            min_primary_ratio: None,
            min_domain_diversity: None,
        },
        ResearchDepth::Standard => Requirements {
            min_sources: 8,
            structure_pass: 0.5,
            quality_threshold: 0.5,
            analysis_threshold: 10.0,
            overall_threshold: 0.6,
            require_dates: false,
            require_authors: false,
            min_academic_ratio: None,
            min_primary_ratio: None,
            min_domain_diversity: None,
        },
        ResearchDepth::Comprehensive => Requirements {
            min_sources: 15,
            structure_pass: 0.7,
            quality_threshold: 0.6,
            analysis_threshold: 15.0,
            overall_threshold: 0.7,
            require_dates: true,
            require_authors: false,
            min_academic_ratio: Some(0.3),
            min_primary_ratio: None,
            min_domain_diversity: None,
        },
        ResearchDepth::Exhaustive => Requirements {
            min_sources: 25,
            structure_pass: 0.7,
            quality_threshold: 0.7,
            analysis_threshold: 20.0,
            overall_threshold: 0.7,
            require_dates: true,
            require_authors: true,
            min_academic_ratio: Some(0.5),
            min_primary_ratio: Some(0.2),
            min_domain_diversity: Some(0.5),
        },
    }
}

const INTRODUCTION: &[&str] = &["Introduction", "Overview"];
const KEY_FINDINGS: &[&str] = &["Key Findings", "Findings", "Main Findings"];
const REFERENCES: &[&str] = &["References", "Sources", "Bibliography", "Works Cited"];
const EXECUTIVE_SUMMARY: &[&str] = &["Executive Summary", "Summary", "Abstract"];
const ANALYSIS: &[&str] = &["Analysis", "Discussion"];
const CONCLUSION: &[&str] = &["Conclusion", "Conclusions", "Concluding Remarks"];
const BACKGROUND: &[&str] = &["Background", "Context"];
const METHODOLOGY: &[&str] = &["Methodology", "Methods", "Approach"];
const IMPLICATIONS: &[&str] = &["Implications"];
const LIMITATIONS: &[&str] = &["Limitations", "Caveats"];

/// Required report sections per depth. Each entry lists accepted aliases; the first is canonical.
pub fn required_sections(depth: ResearchDepth) -> Vec<&'static [&'static str]> {
    match depth {
        ResearchDepth::Quick => vec![INTRODUCTION, KEY_FINDINGS, REFERENCES],
        ResearchDepth::Standard => vec![
            EXECUTIVE_SUMMARY,
            INTRODUCTION,
            KEY_FINDINGS,
            ANALYSIS,
            CONCLUSION,
            REFERENCES,
        ],
        ResearchDepth::Comprehensive => vec![
            EXECUTIVE_SUMMARY,
            INTRODUCTION,
            BACKGROUND,
            METHODOLOGY,
            KEY_FINDINGS,
            ANALYSIS,
            IMPLICATIONS,
            LIMITATIONS,
            CONCLUSION,
            REFERENCES,
        ],
        ResearchDepth::Exhaustive => vec![
            EXECUTIVE_SUMMARY,
            INTRODUCTION,
            BACKGROUND,
            METHODOLOGY,
            &["Literature Review", "Prior Work", "Related Work"],
            &["Current State", "State of the Art"],
            KEY_FINDINGS,
            ANALYSIS,
            &["Case Studies", "Case Study", "Examples"],
            &["Competing Perspectives", "Perspectives", "Debates"],
            &["Challenges", "Risks"],
            &["Future Directions", "Future Trends", "Outlook"],
            IMPLICATIONS,
            &["Recommendations"],
            CONCLUSION,
            REFERENCES,
        ],
    }
}

const DISCOURSE_MARKERS: &[&str] = &[
    "however",
    "therefore",
    "moreover",
    "furthermore",
    "consequently",
    "nevertheless",
    "nonetheless",
    "in contrast",
    "on the other hand",
    "as a result",
    "for example",
    "for instance",
    "in addition",
    "in particular",
    "specifically",
    "similarly",
    "conversely",
    "although",
    "whereas",
    "because",
    "thus",
    "hence",
    "notably",
    "suggests",
    "indicates",
];

/// A required section and the patterns that detect it.
struct SectionMatcher {
    name: &'static str,
    pattern: Option<Regex>,
}

impl SectionMatcher {
    fn new(aliases: &'static [&'static str]) -> Self {
        let alt = aliases
            .iter()
            .map(|a| regex::escape(a))
            .collect::<Vec<_>>()
            .join("|");
        // heading, bold label, "Label:" prefix, or a standalone line
        let pattern = format!(
            r"(?imR)^[ \t]*(?:#{{1,6}}[ \t]+(?:\d+(?:\.\d+)*[.)]?[ \t]+)?(?:{alt})\b|\*\*[ \t]*(?:{alt})\b[^*\n]*\*\*|(?:{alt})[ \t]*:|(?:{alt})[ \t]*$)"
        );
        Self {
            name: aliases.first().copied().unwrap_or_default(),
            pattern: Regex::new(&pattern).ok(),
        }
    }

    fn is_found(&self, report: &str) -> bool {
        self.pattern.as_ref().is_some_and(|re| re.is_match(report))
    }
}

/// Six-check weighted report validator.
pub struct QualityValidator {
    sections: HashMap<ResearchDepth, Vec<SectionMatcher>>,
    discourse: Option<Regex>,
}

impl Default for QualityValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl QualityValidator {
    pub fn new() -> Self {
        let sections = ResearchDepth::ALL
            .iter()
            .map(|d| {
                let matchers = required_sections(*d)
                    .into_iter()
                    .map(SectionMatcher::new)
                    .collect();
                (*d, matchers)
            })
            .collect();
        let discourse = Regex::new(&format!(
            r"(?i)\b(?:{})\b",
            DISCOURSE_MARKERS
                .iter()
                .map(|m| m.replace(' ', r"\s+"))
                .collect::<Vec<_>>()
                .join("|")
        ))
        .ok();
        Self {
            sections,
            discourse,
        }
    }

    /// Validate a report. `metadata` is echoed into the metrics under `"metadata"`.
    pub fn validate_with_metadata(
        &self,
        report: &str,
        depth: ResearchDepth,
        sources: &[SourceRecord],
        metadata: Option<&Value>,
    ) -> ValidationResult {
        let profile = DepthProfile::for_depth(depth);
        let req = requirements(depth);
        let mut issues = Vec::new();
        let mut warnings = Vec::new();
        let mut metrics = BTreeMap::new();

        // Word count
        let words = report.split_whitespace().count();
        let range = profile.word_count_range;
        let (word_score, word_ok) = if words < range.min {
            issues.push(format!(
                "Report has {words} words, below the minimum of {}",
                range.min
            ));
            (words as f64 / range.min as f64, false)
        } else {
            if words as f64 > range.max as f64 * 1.2 {
                warnings.push(format!(
                    "Report has {words} words, well above the target maximum of {}",
                    range.max
                ));
            }
            (1.0, true)
        };
        metrics.insert("word_count".into(), json!(words));
        metrics.insert("word_count_score".into(), json!(word_score));

        // Source count
        let source_count = sources.len();
        let (source_score, source_ok) = if source_count < req.min_sources {
            issues.push(format!(
                "Only {source_count} sources, below the minimum of {}",
                req.min_sources
            ));
            (source_count as f64 / req.min_sources as f64, false)
        } else {
            (1.0, true)
        };
        metrics.insert("source_count".into(), json!(source_count));
        metrics.insert("source_count_score".into(), json!(source_score));

        // Structure
        let matchers = self.sections.get(&depth).map(Vec::as_slice).unwrap_or(&[]);
        let (found, missing): (Vec<&SectionMatcher>, Vec<&SectionMatcher>) =
            matchers.iter().partition(|m| m.is_found(report));
        let required = matchers.len().max(1);
        let completeness = found.len() as f64 / required as f64;
        if completeness < req.structure_pass {
            warnings.push(format!(
                "Report structure incomplete ({}/{} sections); missing: {}",
                found.len(),
                matchers.len(),
                missing.iter().map(|m| m.name).collect::<Vec<_>>().join(", ")
            ));
        }
        metrics.insert("sections_required".into(), json!(matchers.len()));
        metrics.insert("sections_found".into(), json!(found.len()));
        metrics.insert(
            "sections_missing".into(),
            json!(missing.iter().map(|m| m.name).collect::<Vec<_>>()),
        );
        metrics.insert("structure_score".into(), json!(completeness));

        // Citations
        let citation_score = citation_score(sources, &req, &mut warnings);
        metrics.insert("citation_score".into(), json!(citation_score));

        // Source quality
        let quality = if sources.is_empty() {
            0.0
        } else {
            sources.iter().map(|s| s.tier().score()).sum::<f64>() / sources.len() as f64
        };
        if quality < req.quality_threshold {
            warnings.push(format!(
                "Mean source quality {quality:.2} is below {:.2}",
                req.quality_threshold
            ));
        }
        metrics.insert("source_quality_score".into(), json!(quality));

        // Analysis depth
        let markers = self
            .discourse
            .as_ref()
            .map(|re| re.find_iter(report).count())
            .unwrap_or(0);
        let per_thousand = if words == 0 {
            0.0
        } else {
            markers as f64 * 1000.0 / words as f64
        };
        let analysis_score = (per_thousand / req.analysis_threshold).min(1.0);
        if analysis_score < ANALYSIS_PASS {
            warnings.push(format!(
                "Analytical depth is low ({per_thousand:.1} discourse markers per 1000 words)"
            ));
        }
        metrics.insert("discourse_markers".into(), json!(markers));
        metrics.insert("analysis_score".into(), json!(analysis_score));

        let score = (word_score * WEIGHT_WORD_COUNT
            + source_score * WEIGHT_SOURCE_COUNT
            + completeness * WEIGHT_STRUCTURE
            + citation_score * WEIGHT_CITATIONS
            + quality * WEIGHT_SOURCE_QUALITY
            + analysis_score * WEIGHT_ANALYSIS)
            .clamp(0.0, 1.0);
        let passed = word_ok && source_ok && score >= req.overall_threshold;

        metrics.insert("overall_threshold".into(), json!(req.overall_threshold));
        if let Some(meta) = metadata {
            metrics.insert("metadata".into(), meta.clone());
        }

        ValidationResult {
            passed,
            score,
            issues,
            warnings,
            metrics,
        }
    }
}

impl ReportValidator for QualityValidator {
    fn validate(
        &self,
        report: &str,
        depth: ResearchDepth,
        sources: &[SourceRecord],
    ) -> ValidationResult {
        self.validate_with_metadata(report, depth, sources, None)
    }
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

fn citation_score(sources: &[SourceRecord], req: &Requirements, warnings: &mut Vec<String>) -> f64 {
    let total = sources.len();
    let mut score: f64 = 1.0;

    if req.require_dates {
        let dated = ratio(sources.iter().filter(|s| s.published_date().is_some()).count(), total);
        if dated < 0.7 {
            score -= 0.2;
        }
    }
    if req.require_authors {
        let authored = ratio(sources.iter().filter(|s| s.author().is_some()).count(), total);
        if authored < 0.5 {
            score -= 0.2;
        }
    }
    if let Some(min) = req.min_academic_ratio {
        let academic = ratio(
            sources.iter().filter(|s| is_academic(s.url(), s.title())).count(),
            total,
        );
        if academic < min {
            score -= 0.3;
        }
    }
    if let Some(min) = req.min_primary_ratio {
        let primary = ratio(
            sources.iter().filter(|s| is_primary(s.url(), s.title())).count(),
            total,
        );
        if primary < min {
            score -= 0.2;
        }
    }
    if let Some(min) = req.min_domain_diversity {
        let domains: HashSet<String> = sources.iter().filter_map(|s| s.domain()).collect();
        if ratio(domains.len(), total) < min {
            score -= 0.2;
        }
    }

    let score = score.max(0.0);
    if score < CITATION_PASS {
        warnings.push(format!("Citation quality score {score:.2} is below {CITATION_PASS:.2}"));
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    fn sources(n: usize) -> Vec<SourceRecord> {
        (0..n)
            .map(|i| SourceRecord::new(format!("S{i}"), format!("https://site{i}.com/a"), ""))
            .collect()
    }

    #[test]
    fn test_empty_report_is_total() {
        let v = QualityValidator::new();
        for depth in ResearchDepth::ALL {
            let r = v.validate("", depth, &[]);
            assert!(!r.passed);
            assert!((0.0..=1.0).contains(&r.score));
            assert!(!r.issues.is_empty());
        }
    }

    #[test]
    fn test_word_count_at_minimum_passes() {
        let v = QualityValidator::new();
        let r = v.validate(&words(500), ResearchDepth::Quick, &sources(3));
        assert_eq!(r.metric_f64("word_count_score"), Some(1.0));
        assert!(!r.issues.iter().any(|i| i.contains("words")));
    }

    #[test]
    fn test_word_count_below_minimum_is_issue() {
        let v = QualityValidator::new();
        let r = v.validate(&words(250), ResearchDepth::Quick, &sources(3));
        assert_eq!(r.metric_f64("word_count_score"), Some(0.5));
        assert!(r.issues.iter().any(|i| i.contains("250 words")));
        assert!(!r.passed);
    }

    #[test]
    fn test_overlong_report_only_warns() {
        let v = QualityValidator::new();
        let r = v.validate(&words(1801), ResearchDepth::Quick, &sources(3));
        assert!(r.issues.is_empty());
        assert!(r.warnings.iter().any(|w| w.contains("above the target")));
    }

    #[test]
    fn test_source_count_below_minimum() {
        let v = QualityValidator::new();
        let r = v.validate(&words(1600), ResearchDepth::Standard, &sources(4));
        assert_eq!(r.metric_f64("source_count_score"), Some(0.5));
        assert!(r.issues.iter().any(|i| i.contains("4 sources")));
        assert!(!r.passed);
    }

    #[test]
    fn test_structure_one_of_three_is_warning() {
        let v = QualityValidator::new();
        let report = format!("## Introduction\n\n{}", words(600));
        let r = v.validate(&report, ResearchDepth::Quick, &sources(3));
        let structure = r.metric_f64("structure_score").unwrap();
        assert!((structure - 1.0 / 3.0).abs() < 1e-9);
        assert!(r.warnings.iter().any(|w| w.contains("structure incomplete")));
        assert!(!r.issues.iter().any(|i| i.contains("structure")));
    }

    #[test]
    fn test_section_header_forms() {
        let v = QualityValidator::new();
        let report = "# 1. Overview\n**Key Findings**\nsome text\nBibliography:\n[1] x";
        let r = v.validate(report, ResearchDepth::Quick, &[]);
        assert_eq!(r.metrics["sections_found"], json!(3));

        let standalone = "Introduction\ntext\nFindings\nmore\nSources\n";
        let r = v.validate(standalone, ResearchDepth::Quick, &[]);
        assert_eq!(r.metrics["sections_found"], json!(3));

        // CRLF line endings
        let crlf = "Introduction\r\ntext\r\n## Findings\r\nmore\r\nSources\r\n";
        let r = v.validate(crlf, ResearchDepth::Quick, &[]);
        assert_eq!(r.metrics["sections_found"], json!(3));

        // A sentence starting with a section word is not a header
        let prose = "Introduction of new chemistries is slow.\n";
        let r = v.validate(prose, ResearchDepth::Quick, &[]);
        assert_eq!(r.metrics["sections_found"], json!(0));
    }

    #[test]
    fn test_citation_penalties_exhaustive() {
        let v = QualityValidator::new();
        // Undated, unauthored, non-academic, non-primary, single domain
        let same_domain: Vec<SourceRecord> = (0..30)
            .map(|i| SourceRecord::new("Post", format!("https://example.com/{i}"), ""))
            .collect();
        let r = v.validate("", ResearchDepth::Exhaustive, &same_domain);
        // 1.0 - 0.2 - 0.2 - 0.3 - 0.2 - 0.2 floors at 0
        assert_eq!(r.metric_f64("citation_score"), Some(0.0));
    }

    #[test]
    fn test_citation_quick_has_no_requirements() {
        let v = QualityValidator::new();
        let r = v.validate("", ResearchDepth::Quick, &sources(3));
        assert_eq!(r.metric_f64("citation_score"), Some(1.0));
    }

    #[test]
    fn test_citation_comprehensive_dated_academic() {
        let v = QualityValidator::new();
        let good: Vec<SourceRecord> = (0..10)
            .map(|i| {
                SourceRecord::new("Study", format!("https://arxiv.org/abs/{i}"), "")
                    .with_published_date(Some("2024-05-01".into()))
            })
            .collect();
        let r = v.validate("", ResearchDepth::Comprehensive, &good);
        assert_eq!(r.metric_f64("citation_score"), Some(1.0));
    }

    #[test]
    fn test_analysis_depth_markers() {
        let v = QualityValidator::new();
        let mut report = words(95);
        report.push_str(" however therefore moreover for instance thus");
        let r = v.validate(&report, ResearchDepth::Quick, &[]);
        assert_eq!(r.metrics["discourse_markers"], json!(5));
        // 5 markers in 101 words is ~49.5 per thousand, well above 5
        assert_eq!(r.metric_f64("analysis_score"), Some(1.0));
    }

    #[test]
    fn test_deterministic() {
        let v = QualityValidator::new();
        let report = format!("## Introduction\nHowever {}", words(700));
        let a = v.validate(&report, ResearchDepth::Standard, &sources(9));
        let b = v.validate(&report, ResearchDepth::Standard, &sources(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_metadata_echoed() {
        let v = QualityValidator::new();
        let meta = json!({"topic": "x"});
        let r = v.validate_with_metadata("", ResearchDepth::Quick, &[], Some(&meta));
        assert_eq!(r.metrics["metadata"], meta);
    }

    #[test]
    fn test_required_section_counts() {
        let counts: Vec<usize> = ResearchDepth::ALL
            .iter()
            .map(|d| required_sections(*d).len())
            .collect();
        assert_eq!(counts, vec![3, 6, 10, 16]);
    }
}
