// src/orchestrator/mod.rs
// Single-file pipeline: read -> request -> extract -> write -> record

use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::DebloatError;
use crate::extract::extract_candidate;
use crate::file_system;
use crate::metrics::{self, MetricsRecord, MetricsStore};
use crate::prompts::ResolvedPrompt;
use crate::provider::{ModelId, ProviderRegistry, RewriteRequest};

pub mod batch;

/// One unit of work, immutable once created.
#[derive(Debug, Clone)]
pub struct Job {
    pub source_path: PathBuf,
    pub model: ModelId,
    pub prompt: ResolvedPrompt,
    pub export_path: Option<PathBuf>,
}

/// Pipeline stage a job failed in. A Read failure leaves no metrics row;
/// every later stage records whatever was computed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Read,
    Request,
    Extract,
    Write,
    Record,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Read => "read",
            Stage::Request => "request",
            Stage::Extract => "extract",
            Stage::Write => "write",
            Stage::Record => "record",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct JobFailure {
    pub stage: Stage,
    pub error: DebloatError,
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed at {} stage: {}", self.stage, self.error)
    }
}

impl std::error::Error for JobFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Result of one successfully completed job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub lines_before: usize,
    pub lines_after: usize,
    pub reduction_percent: f64,
    pub backup_path: PathBuf,
    pub output_path: PathBuf,
}

fn display_name(job: &Job) -> String {
    job.source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| job.source_path.display().to_string())
}

/// Record a post-Read failure, then surface it. A failed append is logged
/// but never masks the original failure.
fn record_failure(
    store: &MetricsStore,
    job: &Job,
    lines_before: usize,
    lines_after: Option<usize>,
    stage: Stage,
    error: DebloatError,
) -> JobFailure {
    let record = MetricsRecord::failure(
        display_name(job),
        job.model.as_str().to_string(),
        job.prompt.id.clone(),
        lines_before,
        lines_after,
        format!("{} stage: {}", stage, error),
    );
    if let Err(append_err) = store.append(&record) {
        warn!("could not record failed job for {}: {}", display_name(job), append_err);
    }
    JobFailure { stage, error }
}

/// Run one job end to end. On success the file has been applied (in place
/// or to the export path), the backup exists, and a success row is in the
/// metrics store.
pub async fn run_job(
    job: &Job,
    registry: &ProviderRegistry,
    store: &MetricsStore,
) -> Result<JobReport, JobFailure> {
    let file_name = display_name(job);
    info!(
        "starting bloat removal for {} using {}",
        job.source_path.display(),
        job.model
    );

    // Read. A job that cannot read its source contributes no metrics row.
    let source_text = match tokio::fs::read_to_string(&job.source_path).await {
        Ok(text) => text,
        Err(e) => {
            return Err(JobFailure {
                stage: Stage::Read,
                error: DebloatError::file_io("read", &job.source_path, e),
            });
        }
    };
    let lines_before = file_system::count_lines(&source_text);
    info!("original code has {} lines", lines_before);

    // Request
    let request = RewriteRequest {
        prompt_text: job.prompt.text.clone(),
        source_text: source_text.clone(),
    };
    let outcome = match registry.invoke(job.model, &request).await {
        Ok(outcome) => outcome,
        Err(e) => return Err(record_failure(store, job, lines_before, None, Stage::Request, e)),
    };
    if let Some(usage) = outcome.usage {
        info!(
            "{} responded in {}ms ({} in / {} out tokens)",
            job.model,
            outcome.latency.as_millis(),
            usage.input_tokens,
            usage.output_tokens
        );
    } else {
        info!("{} responded in {}ms", job.model, outcome.latency.as_millis());
    }

    // Extract
    let candidate = match extract_candidate(&outcome.text) {
        Ok(candidate) => candidate,
        Err(e) => return Err(record_failure(store, job, lines_before, None, Stage::Extract, e)),
    };

    let candidate_lines = file_system::count_lines(&candidate);
    if candidate == source_text {
        warn!("model did not make any changes to the code");
    } else if candidate_lines == lines_before {
        warn!("model made changes but did not reduce the line count");
    }

    // Write. The candidate's line count is already known here, so a failed
    // write still records a complete before/after pair.
    let write_report =
        match file_system::apply(&job.source_path, &candidate, job.export_path.as_deref()).await {
            Ok(report) => report,
            Err(e) => {
                return Err(record_failure(
                    store,
                    job,
                    lines_before,
                    Some(candidate_lines),
                    Stage::Write,
                    e,
                ));
            }
        };

    // Record
    let record = MetricsRecord::success(
        file_name,
        job.model.as_str().to_string(),
        job.prompt.id.clone(),
        write_report.lines_before,
        write_report.lines_after,
    );
    if let Err(e) = store.append(&record) {
        return Err(JobFailure {
            stage: Stage::Record,
            error: e,
        });
    }

    let reduction = metrics::reduction_percent(write_report.lines_before, write_report.lines_after);
    info!(
        "debloated {} -> {} lines ({:.2}% reduction)",
        write_report.lines_before, write_report.lines_after, reduction
    );

    Ok(JobReport {
        lines_before: write_report.lines_before,
        lines_after: write_report.lines_after,
        reduction_percent: reduction,
        backup_path: write_report.backup_path,
        output_path: write_report.target_path,
    })
}
