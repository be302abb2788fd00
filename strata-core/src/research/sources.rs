//! Research sources: records, quality tiers, and url-based deduplication.
//!
//! Tier detection is a substring heuristic over the url and title. It is
//! intentionally coarse; the validator thresholds are calibrated against it.

use crate::search::SearchHit;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Quality tier of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    PeerReviewed,
    Government,
    Patents,
    ProfessionalSites,
    News,
    Wikipedia,
    GeneralWeb,
    Blogs,
    Forums,
}

impl SourceTier {
    /// Fixed quality score for this tier.
    pub fn score(&self) -> f64 {
        match self {
            SourceTier::PeerReviewed => 1.0,
            SourceTier::Government => 0.9,
            SourceTier::Patents => 0.85,
            SourceTier::ProfessionalSites => 0.7,
            SourceTier::News => 0.6,
            SourceTier::Wikipedia => 0.5,
            SourceTier::GeneralWeb => 0.4,
            SourceTier::Blogs => 0.3,
            SourceTier::Forums => 0.2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTier::PeerReviewed => "peer_reviewed",
            SourceTier::Government => "government",
            SourceTier::Patents => "patents",
            SourceTier::ProfessionalSites => "professional_sites",
            SourceTier::News => "news",
            SourceTier::Wikipedia => "wikipedia",
            SourceTier::GeneralWeb => "general_web",
            SourceTier::Blogs => "blogs",
            SourceTier::Forums => "forums",
        }
    }
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const ACADEMIC_INDICATORS: &[&str] = &[
    ".edu",
    ".ac.uk",
    "arxiv.org",
    "doi.org",
    "pubmed",
    "ncbi.nlm.nih.gov",
    "scholar.google",
    "ieee.org",
    "acm.org",
    "springer",
    "sciencedirect",
    "nature.com",
    "science.org",
    "wiley.com",
    "jstor.org",
    "researchgate",
    "semanticscholar",
    "plos.org",
    "mdpi.com",
    "frontiersin.org",
    "journal",
    "proceedings",
    "peer-reviewed",
];

const GOVERNMENT_INDICATORS: &[&str] = &[
    ".gov",
    ".mil",
    "europa.eu",
    "who.int",
    "un.org",
    "oecd.org",
    "worldbank.org",
    "government",
    "ministry",
    "federal",
    "parliament",
];

const PATENT_INDICATORS: &[&str] = &[
    "patents.google",
    "uspto.gov/patent",
    "patentscope",
    "espacenet",
    "freepatentsonline",
    "patent",
];

const NEWS_INDICATORS: &[&str] = &[
    "reuters.com",
    "apnews.com",
    "bbc.co.uk",
    "bbc.com",
    "nytimes.com",
    "washingtonpost.com",
    "theguardian.com",
    "wsj.com",
    "ft.com",
    "bloomberg.com",
    "economist.com",
    "cnn.com",
    "cnbc.com",
    "npr.org",
    "forbes.com",
    "techcrunch.com",
    "theverge.com",
    "wired.com",
    "arstechnica.com",
];

const BLOG_INDICATORS: &[&str] = &[
    "medium.com",
    "substack.com",
    "wordpress.com",
    "blogspot.",
    "dev.to",
    "hashnode",
    "/blog",
    "blog.",
];

const FORUM_INDICATORS: &[&str] = &[
    "reddit.com",
    "quora.com",
    "stackexchange.com",
    "stackoverflow.com",
    "news.ycombinator.com",
    "forum",
];

const PROFESSIONAL_INDICATORS: &[&str] = &[
    "mckinsey.com",
    "gartner.com",
    "forrester.com",
    "deloitte.com",
    "pwc.com",
    "accenture.com",
    "bcg.com",
    "iea.org",
    "association",
    "institute",
];

/// Primary-source markers (official data, original reports, filings).
const PRIMARY_INDICATORS: &[&str] = &[
    ".gov",
    "who.int",
    "europa.eu",
    "un.org",
    "sec.gov",
    "data.",
    "statistics",
    "official",
    "annual report",
    "whitepaper",
    "white paper",
    "press release",
    "dataset",
    "patents.google",
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Host equals one of `domains` or is a subdomain of one.
fn host_matches(host: Option<&str>, domains: &[&str]) -> bool {
    host.is_some_and(|h| {
        domains
            .iter()
            .any(|d| h == *d || h.strip_suffix(d).is_some_and(|p| p.ends_with('.')))
    })
}

/// Classify a source into a quality tier. Pure function of its url and title.
pub fn classify_source(url: &str, title: &str) -> SourceTier {
    let url = url.to_lowercase();
    let title = title.to_lowercase();
    let both = format!("{url} {title}");
    let host = host_of(&url);

    if contains_any(&both, ACADEMIC_INDICATORS) {
        SourceTier::PeerReviewed
    } else if contains_any(&both, GOVERNMENT_INDICATORS) {
        SourceTier::Government
    } else if contains_any(&both, PATENT_INDICATORS) {
        SourceTier::Patents
    } else if host_matches(host.as_deref(), NEWS_INDICATORS) {
        SourceTier::News
    } else if url.contains("wikipedia.org") {
        SourceTier::Wikipedia
    } else if contains_any(&url, BLOG_INDICATORS) {
        SourceTier::Blogs
    } else if contains_any(&url, FORUM_INDICATORS) {
        SourceTier::Forums
    } else if contains_any(&both, PROFESSIONAL_INDICATORS)
        || host
            .as_deref()
            .is_some_and(|h| h.ends_with(".org") || h.ends_with(".int"))
    {
        SourceTier::ProfessionalSites
    } else {
        SourceTier::GeneralWeb
    }
}

/// Approximate academic-source check used by citation scoring.
pub fn is_academic(url: &str, title: &str) -> bool {
    let both = format!("{} {}", url.to_lowercase(), title.to_lowercase());
    contains_any(&both, ACADEMIC_INDICATORS)
}

/// Approximate primary-source check used by citation scoring.
pub fn is_primary(url: &str, title: &str) -> bool {
    let both = format!("{} {}", url.to_lowercase(), title.to_lowercase());
    contains_any(&both, PRIMARY_INDICATORS)
}

/// Lowercased host without a leading `www.`.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Normalize a url into its dedup identity.
///
/// Lowercases scheme and host, strips `www.`, the fragment, tracking
/// parameters (`utm_*`, `fbclid`, `gclid`) and a trailing slash. Strings that
/// do not parse as urls are trimmed and lowercased.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut parsed) = url::Url::parse(trimmed) else {
        return trimmed.trim_end_matches('/').to_lowercase();
    };

    parsed.set_fragment(None);
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !k.starts_with("utm_") && k != "fbclid" && k != "gclid")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }

    let host = parsed
        .host_str()
        .map(|h| h.strip_prefix("www.").unwrap_or(h).to_string())
        .unwrap_or_default();
    let port = parsed.port().map(|p| format!(":{p}")).unwrap_or_default();
    let path = parsed.path().trim_end_matches('/');
    let query = parsed.query().map(|q| format!("?{q}")).unwrap_or_default();

    // scheme and host are already lowercase after parsing
    format!("{}://{host}{port}{path}{query}", parsed.scheme())
}

/// A research source. Immutable once created; identity is the normalized url.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    title: String,
    url: String,
    content: String,
    tier: SourceTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    published_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    author: Option<String>,
}

impl SourceRecord {
    /// Create a record, classifying its tier from url and title.
    pub fn new(title: impl Into<String>, url: impl Into<String>, content: impl Into<String>) -> Self {
        let title = title.into();
        let url = url.into();
        let tier = classify_source(&url, &title);
        Self {
            title,
            url,
            content: content.into(),
            tier,
            published_date: None,
            author: None,
        }
    }

    pub fn with_published_date(mut self, date: Option<String>) -> Self {
        self.published_date = date.filter(|d| !d.trim().is_empty());
        self
    }

    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author.filter(|a| !a.trim().is_empty());
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn tier(&self) -> SourceTier {
        self.tier
    }

    pub fn published_date(&self) -> Option<&str> {
        self.published_date.as_deref()
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    /// Dedup identity.
    pub fn key(&self) -> String {
        normalize_url(&self.url)
    }

    pub fn domain(&self) -> Option<String> {
        host_of(&self.url)
    }
}

impl From<SearchHit> for SourceRecord {
    fn from(hit: SearchHit) -> Self {
        let content = if hit.content.trim().is_empty() {
            hit.raw_content.unwrap_or_default()
        } else {
            hit.content
        };
        SourceRecord::new(hit.title, hit.url, content)
            .with_published_date(hit.published_date)
            .with_author(hit.author)
    }
}

/// First-occurrence deduplication keyed on normalized url.
///
/// Can be fed incrementally; `insert` returns the stable 1-based citation number.
/// A limited deduplicator refuses new urls once it holds `limit` sources, so
/// every number it hands out stays within the final source list.
#[derive(Debug, Default)]
pub struct SourceDeduplicator {
    index: HashMap<String, usize>,
    sources: Vec<SourceRecord>,
    limit: Option<usize>,
}

impl SourceDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A deduplicator that accepts at most `limit` distinct sources.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Single left-to-right pass; keeps the first record per normalized url.
    pub fn dedupe(sources: impl IntoIterator<Item = SourceRecord>) -> Vec<SourceRecord> {
        let mut dedup = Self::new();
        for source in sources {
            dedup.insert(source);
        }
        dedup.into_sources()
    }

    /// Insert a source, returning its citation number and whether it was new.
    ///
    /// `None` when the url is new but the limit is already reached.
    pub fn insert(&mut self, source: SourceRecord) -> Option<(usize, bool)> {
        let key = source.key();
        if let Some(&n) = self.index.get(&key) {
            return Some((n, false));
        }
        if self.is_full() {
            return None;
        }
        self.sources.push(source);
        let n = self.sources.len();
        self.index.insert(key, n);
        Some((n, true))
    }

    pub fn is_full(&self) -> bool {
        self.limit.is_some_and(|limit| self.sources.len() >= limit)
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Citation number for a url, if already seen.
    pub fn citation_for(&self, url: &str) -> Option<usize> {
        self.index.get(&normalize_url(url)).copied()
    }

    pub fn sources(&self) -> &[SourceRecord] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn into_sources(self) -> Vec<SourceRecord> {
        self.sources
    }
}

/// Tier histogram and mean quality for a set of sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceQualitySummary {
    pub total: usize,
    pub tier_counts: BTreeMap<String, usize>,
    pub mean_score: f64,
    pub unique_domains: usize,
}

impl SourceQualitySummary {
    pub fn from_sources(sources: &[SourceRecord]) -> Self {
        if sources.is_empty() {
            return Self::default();
        }
        let mut tier_counts = BTreeMap::new();
        for s in sources {
            *tier_counts.entry(s.tier().as_str().to_string()).or_insert(0) += 1;
        }
        let mut domains: Vec<String> = sources.iter().filter_map(|s| s.domain()).collect();
        domains.sort();
        domains.dedup();
        let mean_score =
            sources.iter().map(|s| s.tier().score()).sum::<f64>() / sources.len() as f64;
        Self {
            total: sources.len(),
            tier_counts,
            mean_score,
            unique_domains: domains.len(),
        }
    }
}

/// Render a numbered source list (`[n] Title - url`) for prompts and reports.
pub fn format_source_list(sources: &[SourceRecord]) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, s)| format!("[{}] {} - {}", i + 1, s.title(), s.url()))
        .collect::<Vec<_>>()
        .join("\n")
}
