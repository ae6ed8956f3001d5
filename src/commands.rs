use anyhow::{Context, Result, bail};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::lancedb::VectorStore;
use crate::database::sqlite::Database;
use crate::embeddings::chunking::FileType;
use crate::embeddings::{Embedder, OllamaClient};
use crate::indexer::{Indexer, SyncOutcome, SyncProgress};
use crate::retriever::{QueryResult, Retriever};

const SNIPPET_CHARS: usize = 240;

fn embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    Ok(Arc::new(client))
}

/// Expand directories into the files beneath them, honouring ignore files and skipping hidden
/// entries and the index's own directory. Explicit file paths are kept as given.
#[inline]
pub fn collect_files(paths: &[PathBuf], index_dir: &Path) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for path in paths {
        if !path.is_dir() {
            if seen.insert(path.clone()) {
                files.push(path.clone());
            }
            continue;
        }

        let walker = ignore::WalkBuilder::new(path)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .build();

        let mut found: Vec<PathBuf> = walker
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", path.display(), e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_some_and(|kind| kind.is_file()))
            .map(ignore::DirEntry::into_path)
            .filter(|file| !file.starts_with(index_dir))
            .collect();
        found.sort();

        debug!("Found {} files under {}", found.len(), path.display());
        for file in found {
            if seen.insert(file.clone()) {
                files.push(file);
            }
        }
    }

    files
}

fn sync_progress_bar(len: usize, visible: bool) -> Result<ProgressBar> {
    if !visible {
        return Ok(ProgressBar::hidden());
    }

    let style = ProgressStyle::with_template("{bar:40} [{pos}/{len}] {msg}")
        .context("Invalid progress bar template")?;
    Ok(ProgressBar::new(len as u64).with_style(style))
}

/// Sync files and directories into the index
#[inline]
pub async fn sync_paths(config: &Config, paths: &[PathBuf], force: bool, json: bool) -> Result<()> {
    let files = collect_files(paths, config.get_base_dir());
    if files.is_empty() {
        bail!("No files found to sync");
    }

    info!("Syncing {} files", files.len());
    let mut indexer = Indexer::new(config, embedder(config)?)
        .await
        .context("Failed to open the index")?;

    let bar = sync_progress_bar(files.len(), !json && console::user_attended_stderr())?;

    let progress = bar.clone();
    indexer.set_progress_callback(Box::new(move |event: SyncProgress<'_>| match event {
        SyncProgress::Processing { path, .. } => {
            progress.set_message(path.display().to_string());
        }
        SyncProgress::Processed { .. } => progress.inc(1),
    }));

    let outcome = indexer.sync(&files, force).await;
    bar.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_sync_outcome(&outcome);
    }

    if outcome.has_errors() {
        bail!("{} of {} files failed to sync", outcome.errors.len(), files.len());
    }
    Ok(())
}

fn print_sync_outcome(outcome: &SyncOutcome) {
    println!("{}", style("Sync complete").bold().green());
    println!("  Files indexed: {}", style(outcome.files_processed).cyan());
    println!("  Files unchanged: {}", style(outcome.skipped_files.len()).cyan());
    println!("  Chunks embedded: {}", style(outcome.chunks_created).cyan());
    println!("  Chunks skipped: {}", style(outcome.chunks_skipped).cyan());

    if outcome.has_errors() {
        println!();
        println!("{}", style(format!("{} errors:", outcome.errors.len())).bold().red());
        for error in &outcome.errors {
            println!("  {}: {}", style(&error.file_path).yellow(), error.message);
        }
    }
}

/// Search the index and print the closest chunks
#[inline]
pub async fn query_index(
    config: &Config,
    text: &str,
    limit: usize,
    file_type: Option<FileType>,
    json: bool,
) -> Result<()> {
    let retriever = Retriever::from_config(config, embedder(config)?)
        .await
        .context("Failed to open the vector store")?;

    let results = retriever
        .try_search(text, limit, file_type)
        .await
        .context("Search failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No matches found.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        print_query_result(rank + 1, result);
    }
    Ok(())
}

fn print_query_result(rank: usize, result: &QueryResult) {
    println!(
        "{} {} {}",
        style(format!("{}.", rank)).bold(),
        style(&result.file_path).cyan(),
        style(format!("(chunk {}, score {:.3})", result.chunk_index, result.score)).dim()
    );
    if let Some(section) = &result.section {
        println!("   {}", style(section).yellow());
    }
    println!("   {}", snippet(&result.content));
    println!();
}

fn snippet(content: &str) -> String {
    let flattened = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= SNIPPET_CHARS {
        flattened
    } else {
        let mut cut: String = flattened.chars().take(SNIPPET_CHARS).collect();
        cut.push('…');
        cut
    }
}

/// Show the state of the index and the embedding service
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("{}", style("semindex status").bold().cyan());
    println!("Index directory: {}", style(config.get_base_dir().display()).dim());
    println!();

    println!("{}", style("Embedding service").bold().yellow());
    match OllamaClient::new(&config.ollama) {
        Ok(client) => {
            println!("  URL: {}", style(client.base_url()).cyan());
            println!("  Model: {}", style(client.model()).cyan());

            let client_handle = client.clone();
            let reachable = tokio::task::spawn_blocking(move || client_handle.is_reachable())
                .await
                .unwrap_or(false);
            if reachable {
                println!("  {}", style("✓ Reachable").green());
                let check = tokio::task::spawn_blocking(move || client.validate_model()).await;
                match check {
                    Ok(Ok(())) => println!("  {}", style("✓ Model available").green()),
                    Ok(Err(e)) => println!("  {} {}", style("⚠").yellow(), e),
                    Err(e) => println!("  {} model check did not complete: {}", style("⚠").yellow(), e),
                }
            } else {
                println!("  {}", style("✗ Not reachable").red());
            }
        }
        Err(e) => println!("  {} {}", style("✗").red(), e),
    }
    println!();

    println!("{}", style("Manifest").bold().yellow());
    let database = Database::from_config(config)
        .await
        .context("Failed to open the manifest database")?;
    let stats = database.get_statistics().await?;
    println!("  Files: {}", style(stats.total_files).cyan());
    println!("  Chunks: {}", style(stats.total_chunks).cyan());
    println!("  Estimated tokens: {}", style(stats.total_tokens).cyan());
    println!(
        "  Chunks per file: {}",
        style(format!("{:.1}", stats.average_chunks_per_file())).cyan()
    );
    if let Some(last_updated) = stats.last_updated {
        println!("  Last write: {}", style(last_updated.format("%Y-%m-%d %H:%M:%S UTC")).cyan());
    }
    for (file_type, count) in database.count_by_file_type().await? {
        println!("    {}: {}", file_type, count);
    }
    println!();

    println!("{}", style("Vector store").bold().yellow());
    let vector_store = VectorStore::from_config(config)
        .await
        .context("Failed to open the vector store")?;
    println!("  Table: {}", style(vector_store.table_name()).cyan());
    println!("  Dimension: {}", style(vector_store.vector_dimension()).cyan());
    println!(
        "  Records: {}",
        style(vector_store.count_embeddings().await?).cyan()
    );
    if !vector_store.validate_integrity().await? {
        println!(
            "  {} table could not be read; run `semindex check` or `semindex reset`",
            style("⚠").yellow()
        );
    }
    if vector_store.vector_dimension() != config.ollama.embedding_dimension as usize {
        println!(
            "  {} table stores {}-dimensional vectors but the configuration asks for {}; run `semindex reset` before syncing",
            style("⚠").yellow(),
            vector_store.vector_dimension(),
            config.ollama.embedding_dimension
        );
    }

    Ok(())
}

/// Cross-check the manifest against the vector store
#[inline]
pub async fn check_index(config: &Config, repair: bool, json: bool) -> Result<()> {
    let mut indexer = Indexer::new(config, embedder(config)?)
        .await
        .context("Failed to open the index")?;
    let (report, summary) = indexer.check_consistency(repair).await?;

    if json {
        let value = serde_json::json!({
            "report": report,
            "repair": summary,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if report.is_consistent {
        println!("{}", style(report.summary()).green());
        return Ok(());
    }

    println!("{}", style(report.summary()).yellow());
    for path in &report.missing_in_lancedb {
        println!("  missing vectors: {}", path);
    }
    for path in &report.orphaned_in_lancedb {
        println!("  orphaned vectors: {}", path);
    }
    for issue in &report.mismatched_files {
        println!(
            "  count mismatch: {} ({} in manifest, {} in vector store)",
            issue.file_path, issue.sqlite_chunks, issue.lancedb_embeddings
        );
    }

    match summary {
        Some(summary) => println!(
            "{}",
            style(format!(
                "Repaired: {} orphaned paths removed, {} files forgotten (sync them again to re-index)",
                summary.orphans_removed, summary.files_forgotten
            ))
            .green()
        ),
        None => println!("Run `semindex check --repair` to fix these issues."),
    }
    Ok(())
}

/// Forget files that no longer exist on disk
#[inline]
pub async fn prune_index(config: &Config) -> Result<()> {
    let mut indexer = Indexer::new(config, embedder(config)?)
        .await
        .context("Failed to open the index")?;
    let removed = indexer.prune_missing().await?;

    if removed.is_empty() {
        println!("Nothing to prune.");
    } else {
        for path in &removed {
            println!("  removed {}", style(path).dim());
        }
        println!("{}", style(format!("Pruned {} files", removed.len())).green());
    }
    Ok(())
}

#[inline]
pub async fn optimize_index(config: &Config) -> Result<()> {
    let indexer = Indexer::new(config, embedder(config)?)
        .await
        .context("Failed to open the index")?;
    indexer.optimize().await?;
    println!("{}", style("Index optimized").green());
    Ok(())
}

/// Drop everything from both stores
#[inline]
pub async fn reset_index(config: &Config) -> Result<()> {
    let mut indexer = Indexer::new(config, embedder(config)?)
        .await
        .context("Failed to open the index")?;
    indexer.reset().await?;
    println!("{}", style("Index reset").green());
    Ok(())
}

/// Print the effective configuration, optionally writing it to disk first
#[inline]
pub fn show_config(config: &Config, init: bool) -> Result<()> {
    let path = config.config_file_path();
    if init {
        config.save()?;
        println!("{} {}", style("✓ Wrote").green(), style(path.display()).cyan());
    }

    println!("{}", toml::to_string_pretty(config).context("Failed to render configuration")?);
    match config.ollama.ollama_url() {
        Ok(url) => println!("# Ollama URL: {}", url),
        Err(e) => println!("# Ollama URL: invalid ({})", e),
    }
    if !path.exists() {
        println!("# {} does not exist, defaults are in effect", path.display());
    }
    Ok(())
}
