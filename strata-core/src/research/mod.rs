//! Depth-tiered research pipeline.
//!
//! A run moves through these stages:
//! 1. **Plan**: split the topic into aspects and generate search queries
//! 2. **Synthesize**: search each query and extract cited findings
//! 3. **Deduplicate**: merge sources by normalized url, keeping first occurrence
//! 4. **Gap analysis**: exhaustive runs search for missing coverage
//! 5. **Compose**: writer, editor, and summarizer produce the report
//! 6. **Validate**: six weighted checks score the report
//! 7. **Refine**: failing reports are revised and revalidated

pub mod aspects;
pub mod composer;
pub mod decode;
pub mod depth;
pub mod engine;
pub mod gaps;
pub mod progress;
pub mod refinement;
pub mod sources;
pub mod synthesis;
pub mod validation;

pub use aspects::{AspectPlanner, PlannedAspect, ResearchAspect};
pub use decode::Decoded;
pub use depth::{DepthFeatures, DepthProfile, ResearchDepth, WordRange};
pub use engine::{ResearchEngine, ResearchOutput, ResearchRequest};
pub use progress::{
    ExecutionStatus, NoOpProgressSink, ProgressSink, ProgressStore, ProgressUpdate,
};
pub use refinement::{IterationKind, RefinementIteration};
pub use sources::{SourceDeduplicator, SourceQualitySummary, SourceRecord, SourceTier};
pub use validation::{QualityValidator, ReportValidator, ValidationResult};
