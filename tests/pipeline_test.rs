// tests/pipeline_test.rs
// End-to-end pipeline tests driven by a scripted in-process provider

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use debloat::DebloatError;
use debloat::metrics::{MetricsStore, RecordStatus};
use debloat::orchestrator::batch::{BatchDefaults, run_batch};
use debloat::orchestrator::{Job, Stage, run_job};
use debloat::prompts;
use debloat::provider::{
    LlmProvider, ModelId, ProviderRegistry, RewriteOutcome, RewriteRequest,
};

enum Behavior {
    Reply(String),
    RateLimit,
}

struct ScriptedProvider {
    model: ModelId,
    behavior: Behavior,
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> ModelId {
        self.model
    }

    async fn rewrite(&self, _request: &RewriteRequest) -> Result<RewriteOutcome, DebloatError> {
        match &self.behavior {
            Behavior::Reply(text) => Ok(RewriteOutcome {
                text: text.clone(),
                usage: None,
                latency: Duration::from_millis(1),
            }),
            Behavior::RateLimit => Err(DebloatError::RateLimited { provider: "scripted" }),
        }
    }
}

fn registry_with(behavior: Behavior) -> ProviderRegistry {
    let mut registry = ProviderRegistry::empty();
    registry.insert(Arc::new(ScriptedProvider {
        model: ModelId::Gpt4o,
        behavior,
    }));
    registry
}

fn numbered_lines(count: usize) -> String {
    (1..=count)
        .map(|i| format!("line {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

fn job_for(source: &Path, export: Option<&Path>) -> Job {
    Job {
        source_path: source.to_path_buf(),
        model: ModelId::Gpt4o,
        prompt: prompts::default_prompt(),
        export_path: export.map(Path::to_path_buf),
    }
}

#[tokio::test]
async fn fenced_reply_replaces_file_and_records_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("bloated.py");
    let original = numbered_lines(100);
    std::fs::write(&source, &original).unwrap();

    let candidate = numbered_lines(40);
    let reply = format!(
        "I removed the redundant half.\n```python\n{}\n```\nAnything else?",
        candidate
    );
    let registry = registry_with(Behavior::Reply(reply));
    let store = MetricsStore::new(dir.path().join("metrics.csv"));

    let report = run_job(&job_for(&source, None), &registry, &store)
        .await
        .unwrap();

    assert_eq!(report.lines_before, 100);
    assert_eq!(report.lines_after, 40);
    assert_eq!(report.reduction_percent, 60.0);

    // File replaced in place, original recoverable from the backup
    assert_eq!(std::fs::read_to_string(&source).unwrap(), candidate);
    assert_eq!(
        std::fs::read_to_string(&report.backup_path).unwrap(),
        original
    );

    let records = store.load().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RecordStatus::Success);
    assert_eq!(records[0].lines_before, 100);
    assert_eq!(records[0].lines_after, Some(40));
    assert_eq!(records[0].reduction_percent, Some(60.0));
    assert_eq!(records[0].model, "gpt-4o");
    assert_eq!(records[0].prompt_id, "detailed");
}

#[tokio::test]
async fn export_path_leaves_original_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("bloated.py");
    let export = dir.path().join("slim/bloated.py");
    let original = numbered_lines(100);
    std::fs::write(&source, &original).unwrap();

    let candidate = numbered_lines(40);
    let reply = format!("```\n{}\n```", candidate);
    let registry = registry_with(Behavior::Reply(reply));
    let store = MetricsStore::new(dir.path().join("metrics.csv"));

    let report = run_job(&job_for(&source, Some(&export)), &registry, &store)
        .await
        .unwrap();

    assert_eq!(report.lines_before, 100);
    assert_eq!(report.lines_after, 40);
    assert_eq!(std::fs::read_to_string(&source).unwrap(), original);
    assert_eq!(std::fs::read_to_string(&export).unwrap(), candidate);
}

#[tokio::test]
async fn unfenced_reply_is_used_whole() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("bloated.py");
    std::fs::write(&source, numbered_lines(100)).unwrap();

    // No fences at all: the trimmed reply is the candidate
    let registry = registry_with(Behavior::Reply(numbered_lines(40)));
    let store = MetricsStore::new(dir.path().join("metrics.csv"));

    let report = run_job(&job_for(&source, None), &registry, &store)
        .await
        .unwrap();

    assert_eq!(report.lines_before, 100);
    assert_eq!(report.lines_after, 40);
    assert_eq!(report.reduction_percent, 60.0);
}

#[tokio::test]
async fn rate_limit_fails_before_any_file_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("bloated.py");
    let original = numbered_lines(10);
    std::fs::write(&source, &original).unwrap();

    let registry = registry_with(Behavior::RateLimit);
    let store = MetricsStore::new(dir.path().join("metrics.csv"));

    let failure = run_job(&job_for(&source, None), &registry, &store)
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Request);
    assert!(matches!(failure.error, DebloatError::RateLimited { .. }));

    // No backup, no mutation: the failure happened before the write stage
    assert_eq!(std::fs::read_to_string(&source).unwrap(), original);
    assert!(!dir.path().join("bloated.py.bak").exists());

    // The job still left a failed metrics row with what was known
    let records = store.load().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RecordStatus::Failed);
    assert_eq!(records[0].lines_before, 10);
    assert_eq!(records[0].lines_after, None);
    assert!(records[0].detail.contains("request stage"));
}

#[tokio::test]
async fn empty_reply_fails_at_extract_with_no_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("bloated.py");
    let original = numbered_lines(10);
    std::fs::write(&source, &original).unwrap();

    let registry = registry_with(Behavior::Reply("   \n".to_string()));
    let store = MetricsStore::new(dir.path().join("metrics.csv"));

    let failure = run_job(&job_for(&source, None), &registry, &store)
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Extract);
    assert!(matches!(failure.error, DebloatError::EmptyCandidate));
    assert_eq!(std::fs::read_to_string(&source).unwrap(), original);
    assert!(!dir.path().join("bloated.py.bak").exists());
}

#[tokio::test]
async fn unreadable_source_leaves_no_metrics_row() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("ghost.py");

    let registry = registry_with(Behavior::Reply("code".to_string()));
    let store = MetricsStore::new(dir.path().join("metrics.csv"));

    let failure = run_job(&job_for(&missing, None), &registry, &store)
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Read);
    assert!(store.load().unwrap().is_empty());
}

#[tokio::test]
async fn batch_isolates_the_engineered_failure() {
    let dir = tempfile::tempdir().unwrap();

    let good_one = dir.path().join("one.py");
    let good_two = dir.path().join("two.py");
    std::fs::write(&good_one, numbered_lines(5)).unwrap();
    std::fs::write(&good_two, numbered_lines(5)).unwrap();
    let missing = dir.path().join("missing.py");

    let manifest = dir.path().join("manifest.csv");
    std::fs::write(
        &manifest,
        format!(
            "file_path\n{}\n{}\n{}\n",
            good_one.display(),
            missing.display(),
            good_two.display()
        ),
    )
    .unwrap();

    let reply = format!("```\n{}\n```", numbered_lines(2));
    let registry = registry_with(Behavior::Reply(reply));
    let store = MetricsStore::new(dir.path().join("metrics.csv"));
    let defaults = BatchDefaults {
        model: Some(ModelId::Gpt4o),
        prompt: prompts::default_prompt(),
        export_dir: None,
        pause: Duration::ZERO,
    };

    let result = run_batch(&manifest, &defaults, &registry, &store)
        .await
        .unwrap();

    // Every row yields an outcome, in manifest order
    assert_eq!(result.outcomes.len(), 3);
    assert_eq!(result.successes(), 2);
    assert_eq!(result.failures(), 1);
    assert!(result.outcomes[0].result.is_ok());
    assert!(result.outcomes[1].result.is_err());
    assert!(result.outcomes[2].result.is_ok());

    // The engineered Read failure contributes no row; the rest succeeded
    let records = store.load().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.status == RecordStatus::Success));
}

#[tokio::test]
async fn batch_fails_only_on_a_broken_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("manifest.csv");
    std::fs::write(&manifest, "not_the_right_column\nx.py\n").unwrap();

    let registry = registry_with(Behavior::Reply("code".to_string()));
    let store = MetricsStore::new(dir.path().join("metrics.csv"));
    let defaults = BatchDefaults {
        model: Some(ModelId::Gpt4o),
        prompt: prompts::default_prompt(),
        export_dir: None,
        pause: Duration::ZERO,
    };

    let err = run_batch(&manifest, &defaults, &registry, &store)
        .await
        .unwrap_err();
    assert!(matches!(err, DebloatError::Manifest { .. }));
}

#[tokio::test]
async fn batch_export_dir_maps_outputs_by_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("app.py");
    let original = numbered_lines(4);
    std::fs::write(&source, &original).unwrap();

    let manifest = dir.path().join("manifest.csv");
    std::fs::write(&manifest, format!("file_path\n{}\n", source.display())).unwrap();

    let reply = format!("```\n{}\n```", numbered_lines(2));
    let registry = registry_with(Behavior::Reply(reply));
    let store = MetricsStore::new(dir.path().join("metrics.csv"));
    let export_dir = dir.path().join("slimmed");
    let defaults = BatchDefaults {
        model: Some(ModelId::Gpt4o),
        prompt: prompts::default_prompt(),
        export_dir: Some(export_dir.clone()),
        pause: Duration::ZERO,
    };

    let result = run_batch(&manifest, &defaults, &registry, &store)
        .await
        .unwrap();

    assert_eq!(result.successes(), 1);
    assert_eq!(std::fs::read_to_string(&source).unwrap(), original);
    assert_eq!(
        std::fs::read_to_string(export_dir.join("app.py")).unwrap(),
        numbered_lines(2)
    );
}
