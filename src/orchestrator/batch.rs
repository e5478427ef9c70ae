// src/orchestrator/batch.rs
// Manifest-driven batch runs with per-job fault isolation

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info};

use super::{Job, JobReport, run_job};
use crate::error::DebloatError;
use crate::metrics::MetricsStore;
use crate::prompts::{self, ResolvedPrompt};
use crate::provider::{ModelId, ProviderRegistry};

pub const MANIFEST_HEADER: &str = "file_path,model,prompt,export_path";

/// One manifest row. Only `file_path` is required; the other columns
/// override the batch-level defaults when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    pub file_path: String,
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub export_path: Option<String>,
}

/// Batch-level defaults applied to rows that do not override them.
#[derive(Debug, Clone)]
pub struct BatchDefaults {
    pub model: Option<ModelId>,
    pub prompt: ResolvedPrompt,
    pub export_dir: Option<PathBuf>,
    pub pause: Duration,
}

impl BatchDefaults {
    pub fn new(model: Option<ModelId>, prompt: ResolvedPrompt) -> Self {
        Self {
            model,
            prompt,
            export_dir: None,
            pause: Duration::from_secs(2),
        }
    }
}

/// Outcome of one manifest row, in manifest order.
#[derive(Debug)]
pub struct JobOutcome {
    pub file_path: String,
    pub result: Result<JobReport, String>,
}

/// Ordered per-job outcomes plus the tally.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub outcomes: Vec<JobOutcome>,
}

impl BatchResult {
    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.len() - self.successes()
    }
}

/// Write the empty manifest template: header row only.
pub fn write_template(path: &Path) -> Result<(), DebloatError> {
    std::fs::write(path, format!("{}\n", MANIFEST_HEADER))
        .map_err(|e| DebloatError::file_io("write manifest template", path, e))?;
    info!("manifest template created at {}", path.display());
    Ok(())
}

/// Parse a manifest. The header must name a `file_path` column; `model`,
/// `prompt`, and `export_path` columns are optional and may appear in any
/// order. Blank lines are skipped.
pub fn parse_manifest(text: &str, origin: &Path) -> Result<Vec<ManifestRow>, DebloatError> {
    let manifest_error = |detail: &str| DebloatError::Manifest {
        path: origin.to_path_buf(),
        detail: detail.to_string(),
    };

    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next().ok_or_else(|| manifest_error("empty manifest"))?;
    let columns: Vec<String> = crate::utils::split_csv_line(header)
        .into_iter()
        .map(|c| c.trim().to_ascii_lowercase())
        .collect();

    let column = |name: &str| columns.iter().position(|c| c == name);
    let file_path_idx = column("file_path")
        .ok_or_else(|| manifest_error("manifest must contain a 'file_path' column"))?;
    let model_idx = column("model");
    let prompt_idx = column("prompt");
    let export_idx = column("export_path");

    let cell = |fields: &[String], idx: Option<usize>| -> Option<String> {
        idx.and_then(|i| fields.get(i))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let mut rows = Vec::new();
    for line in lines {
        let fields = crate::utils::split_csv_line(line);
        rows.push(ManifestRow {
            file_path: cell(&fields, Some(file_path_idx)).unwrap_or_default(),
            model: cell(&fields, model_idx),
            prompt: cell(&fields, prompt_idx),
            export_path: cell(&fields, export_idx),
        });
    }
    Ok(rows)
}

/// Resolve one manifest row into a runnable job, or the reason it cannot
/// run. Bad rows are job-level failures, never batch aborts.
fn job_for_row(row: &ManifestRow, defaults: &BatchDefaults) -> Result<Job, String> {
    if row.file_path.is_empty() {
        return Err("manifest row has no file_path".to_string());
    }

    let model = match &row.model {
        Some(name) => ModelId::from_str(name).map_err(|e| e.to_string())?,
        None => defaults
            .model
            .ok_or_else(|| "no model in manifest row and no --llm-model default".to_string())?,
    };

    let prompt = match &row.prompt {
        Some(value) => prompts::resolve(value),
        None => defaults.prompt.clone(),
    };

    let source_path = PathBuf::from(&row.file_path);
    let export_path = match &row.export_path {
        Some(path) => Some(PathBuf::from(path)),
        None => defaults.export_dir.as_ref().map(|dir| {
            let file_name = source_path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| source_path.as_os_str().to_os_string());
            dir.join(file_name)
        }),
    };

    Ok(Job {
        source_path,
        model,
        prompt,
        export_path,
    })
}

/// Run every manifest row in order. Each row's failure is converted into a
/// `Failed` outcome without aborting the remaining rows; only a manifest
/// that cannot be read or parsed fails the batch itself.
pub async fn run_batch(
    manifest_path: &Path,
    defaults: &BatchDefaults,
    registry: &ProviderRegistry,
    store: &MetricsStore,
) -> Result<BatchResult, DebloatError> {
    let text = std::fs::read_to_string(manifest_path)
        .map_err(|e| DebloatError::file_io("read manifest", manifest_path, e))?;
    let rows = parse_manifest(&text, manifest_path)?;
    let total = rows.len();
    info!("processing {} manifest rows from {}", total, manifest_path.display());

    let mut result = BatchResult::default();
    for (idx, row) in rows.iter().enumerate() {
        let outcome = match job_for_row(row, defaults) {
            Ok(job) => {
                let job_result = run_job(&job, registry, store).await;
                // Pause between provider-backed jobs to stay friendly with
                // rate limits
                if idx + 1 < total && !defaults.pause.is_zero() {
                    tokio::time::sleep(defaults.pause).await;
                }
                job_result.map_err(|failure| failure.to_string())
            }
            Err(reason) => Err(reason),
        };

        match &outcome {
            Ok(report) => info!(
                "[{}/{}] {} ok: {} -> {} lines ({:.2}%)",
                idx + 1,
                total,
                row.file_path,
                report.lines_before,
                report.lines_after,
                report.reduction_percent
            ),
            Err(reason) => error!("[{}/{}] {} failed: {}", idx + 1, total, row.file_path, reason),
        }

        result.outcomes.push(JobOutcome {
            file_path: row.file_path.clone(),
            result: outcome,
        });
    }

    info!(
        "batch complete: {} succeeded, {} failed, {} total",
        result.successes(),
        result.failures(),
        result.outcomes.len()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_manifest() {
        let rows = parse_manifest("file_path\na.py\nb.py\n", Path::new("m.csv")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].file_path, "a.py");
        assert_eq!(rows[0].model, None);
        assert_eq!(rows[1].file_path, "b.py");
    }

    #[test]
    fn test_parse_full_manifest_with_quoting() {
        let text = "file_path,model,prompt,export_path\n\
                    src/big.rs,gpt-4o,minimal,out/big.rs\n\
                    \"with,comma.rs\",deepseek-r1,\"Remove dead code, keep comments\",\n";
        let rows = parse_manifest(text, Path::new("m.csv")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].model.as_deref(), Some("gpt-4o"));
        assert_eq!(rows[0].export_path.as_deref(), Some("out/big.rs"));
        assert_eq!(rows[1].file_path, "with,comma.rs");
        assert_eq!(
            rows[1].prompt.as_deref(),
            Some("Remove dead code, keep comments")
        );
        assert_eq!(rows[1].export_path, None);
    }

    #[test]
    fn test_parse_manifest_ignores_column_order_and_blanks() {
        let text = "model,file_path\n\ngpt-4o,a.py\n\n";
        let rows = parse_manifest(text, Path::new("m.csv")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].file_path, "a.py");
        assert_eq!(rows[0].model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn test_manifest_without_file_path_column_fails() {
        let err = parse_manifest("code,model\na,b\n", Path::new("m.csv")).unwrap_err();
        assert!(matches!(err, DebloatError::Manifest { .. }));
        assert!(err.to_string().contains("file_path"));
    }

    #[test]
    fn test_empty_manifest_fails() {
        assert!(parse_manifest("\n\n", Path::new("m.csv")).is_err());
    }

    #[test]
    fn test_template_is_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.csv");
        write_template(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "file_path,model,prompt,export_path\n"
        );
    }

    #[test]
    fn test_job_for_row_applies_defaults_and_overrides() {
        let defaults = BatchDefaults {
            model: Some(ModelId::Gpt4o),
            prompt: prompts::default_prompt(),
            export_dir: Some(PathBuf::from("slimmed")),
            pause: Duration::ZERO,
        };

        let row = ManifestRow {
            file_path: "src/app.py".into(),
            model: None,
            prompt: None,
            export_path: None,
        };
        let job = job_for_row(&row, &defaults).unwrap();
        assert_eq!(job.model, ModelId::Gpt4o);
        assert_eq!(job.prompt.id, "detailed");
        assert_eq!(job.export_path.as_deref(), Some(Path::new("slimmed/app.py")));

        let row = ManifestRow {
            file_path: "src/app.py".into(),
            model: Some("deepseek-r1".into()),
            prompt: Some("minimal".into()),
            export_path: Some("exact/spot.py".into()),
        };
        let job = job_for_row(&row, &defaults).unwrap();
        assert_eq!(job.model, ModelId::DeepSeekR1);
        assert_eq!(job.prompt.id, "minimal");
        assert_eq!(job.export_path.as_deref(), Some(Path::new("exact/spot.py")));
    }

    #[test]
    fn test_job_for_row_rejects_bad_rows() {
        let defaults = BatchDefaults::new(None, prompts::default_prompt());

        let row = ManifestRow {
            file_path: String::new(),
            model: None,
            prompt: None,
            export_path: None,
        };
        assert!(job_for_row(&row, &defaults).unwrap_err().contains("file_path"));

        let row = ManifestRow {
            file_path: "a.py".into(),
            model: Some("gpt-2".into()),
            prompt: None,
            export_path: None,
        };
        assert!(job_for_row(&row, &defaults).unwrap_err().contains("unsupported model"));

        let row = ManifestRow {
            file_path: "a.py".into(),
            model: None,
            prompt: None,
            export_path: None,
        };
        assert!(job_for_row(&row, &defaults).unwrap_err().contains("no model"));
    }
}
