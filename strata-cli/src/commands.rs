//! CLI subcommand handlers.

use crate::progress::TerminalProgressSink;
use crate::{Commands, ConfigAction};
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_core::config::load_config;
use strata_core::research::{
    DepthProfile, QualityValidator, ResearchDepth, ResearchEngine, ResearchOutput,
    ResearchRequest, SourceDeduplicator, SourceRecord, ValidationResult,
};
use strata_core::StrataConfig;
use tracing::{debug, info};

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path, quiet: bool) -> anyhow::Result<()> {
    match command {
        Commands::Research {
            topic,
            depth,
            document,
            model,
            output,
            json,
        } => {
            let args = ResearchArgs {
                topic,
                depth,
                document,
                model,
                output,
                json,
            };
            handle_research(args, workspace, quiet).await
        }
        Commands::Depths => {
            print!("{}", render_depth_table());
            Ok(())
        }
        Commands::Validate {
            report,
            depth,
            sources,
        } => handle_validate(&report, &depth, sources.as_deref()),
        Commands::Config { action } => handle_config(action.unwrap_or(ConfigAction::Show), workspace),
    }
}

struct ResearchArgs {
    topic: String,
    depth: Option<String>,
    document: Option<PathBuf>,
    model: Option<String>,
    output: Option<PathBuf>,
    json: bool,
}

async fn handle_research(args: ResearchArgs, workspace: &Path, quiet: bool) -> anyhow::Result<()> {
    let config = load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let engine = ResearchEngine::from_config(&config)?
        .with_progress_sink(Arc::new(TerminalProgressSink::new(quiet)))
        .with_auto_evict(true);

    let mut request = ResearchRequest::new(args.topic);
    request.depth = args.depth;
    request.model_override = args.model;
    if let Some(path) = &args.document {
        let context = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read document {}", path.display()))?;
        debug!(path = %path.display(), chars = context.len(), "Loaded document context");
        request.document_context = Some(context);
    }
    info!(topic = %request.topic, depth = ?request.depth, "Starting research");

    let output = tokio::select! {
        result = engine.run_with_budget(request) => result?,
        _ = tokio::signal::ctrl_c() => anyhow::bail!("Research cancelled"),
    };
    info!(
        execution_id = %output.execution_id,
        score = output.validation.score,
        passed = output.validation.passed,
        "Research finished"
    );

    let rendered = if args.json {
        serde_json::to_string_pretty(&output)?
    } else {
        output.final_report.clone()
    };
    match &args.output {
        Some(path) => {
            std::fs::write(path, format!("{rendered}\n"))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !quiet {
                eprintln!("Report written to {}", path.display());
            }
        }
        None => println!("{rendered}"),
    }

    if !quiet {
        eprintln!("{}", run_summary(&output));
    }
    Ok(())
}

/// One-line run summary for stderr.
fn run_summary(output: &ResearchOutput) -> String {
    format!(
        "Validation: score {:.2} ({}) | {} sources (mean quality {:.2}) | {} refinement pass(es) | {} gap pass(es)",
        output.validation.score,
        if output.validation.passed { "passed" } else { "failed" },
        output.sources.len(),
        output.source_quality.mean_score,
        output.refinement_log.len(),
        output.gap_analysis_log.len(),
    )
}

/// Render the profile table for every depth.
pub fn render_depth_table() -> String {
    let mut out = format!(
        "{:<14} {:>7} {:>7} {:>7} {:>7} {:>5} {:>13} {:>8}  {}\n",
        "DEPTH", "SOURCES", "ASPECTS", "QUERIES", "RESULTS", "ITERS", "WORDS", "TIMEOUT", "FEATURES"
    );
    for depth in ResearchDepth::ALL {
        let p = DepthProfile::for_depth(depth);
        let mut features = Vec::new();
        if p.features.fact_checking {
            features.push("fact_checking");
        }
        if p.features.multi_perspective {
            features.push("multi_perspective");
        }
        if p.features.refinement {
            features.push("refinement");
        }
        if p.features.gap_analysis {
            features.push("gap_analysis");
        }
        out.push_str(&format!(
            "{:<14} {:>7} {:>7} {:>7} {:>7} {:>5} {:>13} {:>7}s  {}\n",
            depth.as_str(),
            p.max_sources,
            p.aspect_count,
            p.queries_per_aspect,
            p.results_per_query,
            p.synthesis_iterations,
            format!("{}-{}", p.word_count_range.min, p.word_count_range.max),
            p.timeout_seconds,
            if features.is_empty() {
                "-".to_string()
            } else {
                features.join(", ")
            }
        ));
    }
    out
}

/// A source entry in a `--sources` file.
#[derive(Debug, Deserialize)]
struct SourceEntry {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    published_date: Option<String>,
    #[serde(default)]
    author: Option<String>,
}

/// Load and deduplicate a JSON source list.
fn load_sources(path: &Path) -> anyhow::Result<Vec<SourceRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sources {}", path.display()))?;
    let entries: Vec<SourceEntry> = serde_json::from_str(&text)
        .with_context(|| format!("Invalid source list in {}", path.display()))?;
    Ok(SourceDeduplicator::dedupe(entries.into_iter().map(|e| {
        SourceRecord::new(e.title, e.url, e.content)
            .with_published_date(e.published_date)
            .with_author(e.author)
    })))
}

fn validate_file(
    report_path: &Path,
    depth: &str,
    sources_path: Option<&Path>,
) -> anyhow::Result<ValidationResult> {
    let report = std::fs::read_to_string(report_path)
        .with_context(|| format!("Failed to read report {}", report_path.display()))?;
    let sources = match sources_path {
        Some(path) => load_sources(path)?,
        None => Vec::new(),
    };
    let metadata = serde_json::json!({ "report": report_path.display().to_string() });
    Ok(QualityValidator::new().validate_with_metadata(
        &report,
        ResearchDepth::resolve(Some(depth)),
        &sources,
        Some(&metadata),
    ))
}

fn handle_validate(report: &Path, depth: &str, sources: Option<&Path>) -> anyhow::Result<()> {
    let result = validate_file(report, depth, sources)?;
    println!(
        "Score: {:.2} ({})",
        result.score,
        if result.passed { "passed" } else { "failed" }
    );
    for issue in &result.issues {
        println!("  issue: {issue}");
    }
    for warning in &result.warnings {
        println!("  warning: {warning}");
    }
    println!("{}", serde_json::to_string_pretty(&result.metrics)?);
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        ConfigAction::Init => {
            let config_path = init_config(workspace)?;
            println!("Created default configuration at: {}", config_path.display());
            Ok(())
        }
    }
}

/// Write the default configuration to `<workspace>/.strata/config.toml`.
fn init_config(workspace: &Path) -> anyhow::Result<PathBuf> {
    let config_dir = workspace.join(".strata");
    std::fs::create_dir_all(&config_dir)?;
    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        anyhow::bail!(
            "Configuration file already exists at: {}",
            config_path.display()
        );
    }
    std::fs::write(&config_path, toml::to_string_pretty(&StrataConfig::default())?)?;
    Ok(config_path)
}
