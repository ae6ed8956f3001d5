// Database consistency validation module
// Cross-checks the SQLite chunk ledger against the LanceDB table


use anyhow::Result;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, error, info, warn};

use crate::database::lancedb::VectorStore;
use crate::database::sqlite::Database;
use crate::indexer::writer::IndexWriter;

/// Consistency check results between SQLite and LanceDB
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    /// Number of files in the SQLite manifest
    pub sqlite_files: usize,
    /// Number of chunks in the SQLite ledger
    pub sqlite_chunks: usize,
    /// Number of records in LanceDB
    pub lancedb_embeddings: usize,
    /// Files with ledger chunks but no LanceDB records
    pub missing_in_lancedb: Vec<String>,
    /// Paths with LanceDB records but no manifest row
    pub orphaned_in_lancedb: Vec<String>,
    /// Files present in both stores whose chunk counts disagree
    pub mismatched_files: Vec<FileConsistencyIssue>,
    /// Overall consistency status
    pub is_consistent: bool,
}

/// Count disagreement for a single file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileConsistencyIssue {
    pub file_path: String,
    pub sqlite_chunks: usize,
    pub lancedb_embeddings: usize,
}

/// What a repair pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairSummary {
    /// Orphaned paths whose LanceDB records were deleted
    pub orphans_removed: usize,
    /// Drifted files dropped from both stores so the next sync re-indexes them
    pub files_forgotten: usize,
}

/// Performs consistency validation between SQLite and LanceDB
pub struct ConsistencyValidator<'a> {
    database: &'a Database,
    vector_store: &'a mut VectorStore,
}

impl<'a> ConsistencyValidator<'a> {
    #[inline]
    pub fn new(database: &'a Database, vector_store: &'a mut VectorStore) -> Self {
        Self {
            database,
            vector_store,
        }
    }

    /// Compare per-file chunk counts across both stores
    #[inline]
    pub async fn validate_consistency(&self) -> Result<ConsistencyReport> {
        info!("Starting cross-database consistency validation");

        let sqlite_counts: HashMap<String, usize> = self
            .database
            .chunk_counts()
            .await?
            .into_iter()
            .map(|(path, count)| (path, usize::try_from(count).unwrap_or(0)))
            .collect();
        debug!("Found {} files in SQLite", sqlite_counts.len());

        let lancedb_counts = self.vector_store.file_chunk_counts().await?;
        debug!("Found {} files in LanceDB", lancedb_counts.len());

        let report = compare_counts(&sqlite_counts, &lancedb_counts);

        if report.is_consistent {
            info!("Database consistency validation passed");
        } else {
            warn!("Database consistency validation found issues");
            log_consistency_issues(&report);
        }

        Ok(report)
    }

    /// Remove orphaned LanceDB records and forget drifted files
    #[inline]
    pub async fn repair(&mut self, report: &ConsistencyReport) -> Result<RepairSummary> {
        let mut summary = RepairSummary::default();

        let mut writer = IndexWriter::new(self.database, &mut *self.vector_store);

        for file_path in &report.orphaned_in_lancedb {
            match writer.remove_file(file_path).await {
                Ok(_) => {
                    summary.orphans_removed += 1;
                    debug!("Removed orphaned records for {}", file_path);
                }
                Err(e) => error!("Failed to remove orphaned records for {}: {}", file_path, e),
            }
        }

        let drifted = report
            .missing_in_lancedb
            .iter()
            .chain(report.mismatched_files.iter().map(|issue| &issue.file_path));
        for file_path in drifted {
            match writer.remove_file(file_path).await {
                Ok(_) => {
                    summary.files_forgotten += 1;
                    debug!("Forgot drifted file {}", file_path);
                }
                Err(e) => error!("Failed to forget {}: {}", file_path, e),
            }
        }

        info!(
            "Repair removed {} orphaned paths and forgot {} files",
            summary.orphans_removed, summary.files_forgotten
        );
        Ok(summary)
    }
}

fn compare_counts(
    sqlite_counts: &HashMap<String, usize>,
    lancedb_counts: &HashMap<String, usize>,
) -> ConsistencyReport {
    let paths: BTreeSet<&String> = sqlite_counts.keys().chain(lancedb_counts.keys()).collect();

    let mut report = ConsistencyReport {
        sqlite_files: sqlite_counts.len(),
        sqlite_chunks: sqlite_counts.values().sum(),
        lancedb_embeddings: lancedb_counts.values().sum(),
        ..ConsistencyReport::default()
    };

    for path in paths {
        match (sqlite_counts.get(path), lancedb_counts.get(path)) {
            (Some(&ledger), None) if ledger > 0 => report.missing_in_lancedb.push(path.clone()),
            (None, Some(_)) => report.orphaned_in_lancedb.push(path.clone()),
            (Some(&ledger), Some(&stored)) if ledger != stored => {
                report.mismatched_files.push(FileConsistencyIssue {
                    file_path: path.clone(),
                    sqlite_chunks: ledger,
                    lancedb_embeddings: stored,
                });
            }
            _ => {}
        }
    }

    report.is_consistent = report.total_issues() == 0;
    report
}

fn log_consistency_issues(report: &ConsistencyReport) {
    if !report.missing_in_lancedb.is_empty() {
        warn!(
            "Found {} files in SQLite missing from LanceDB",
            report.missing_in_lancedb.len()
        );
    }

    if !report.orphaned_in_lancedb.is_empty() {
        warn!(
            "Found {} orphaned paths in LanceDB",
            report.orphaned_in_lancedb.len()
        );
    }

    for issue in &report.mismatched_files {
        warn!(
            "File {} has {} SQLite chunks but {} LanceDB records",
            issue.file_path, issue.sqlite_chunks, issue.lancedb_embeddings
        );
    }
}

impl ConsistencyReport {
    /// Get a human-readable summary of the consistency report
    #[inline]
    pub fn summary(&self) -> String {
        if self.is_consistent {
            format!(
                "Database is consistent: {} files, {} chunks in SQLite, {} embeddings in LanceDB",
                self.sqlite_files, self.sqlite_chunks, self.lancedb_embeddings
            )
        } else {
            format!(
                "Database inconsistencies found: {} missing in LanceDB, {} orphaned in LanceDB, {} files with mismatched counts",
                self.missing_in_lancedb.len(),
                self.orphaned_in_lancedb.len(),
                self.mismatched_files.len()
            )
        }
    }

    /// Get the total number of consistency issues
    #[inline]
    pub fn total_issues(&self) -> usize {
        self.missing_in_lancedb.len() + self.orphaned_in_lancedb.len() + self.mismatched_files.len()
    }
}
