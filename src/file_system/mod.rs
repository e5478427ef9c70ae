// src/file_system/mod.rs
// Backup-then-apply file transaction for candidate rewrites

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::DebloatError;

/// Outcome of a successful apply.
#[derive(Debug, Clone)]
pub struct WriteReport {
    pub target_path: PathBuf,
    pub backup_path: PathBuf,
    pub lines_before: usize,
    pub lines_after: usize,
    pub replaced_original: bool,
}

/// Deterministic backup name beside the original: `foo.py` -> `foo.py.bak`.
pub fn backup_path_for(original: &Path) -> PathBuf {
    let mut name = original.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// Line count over the full text, comments and blanks included. An empty
/// file counts as zero lines so the reduction math stays defined.
pub fn count_lines(text: &str) -> usize {
    if text.is_empty() {
        0
    } else {
        text.split('\n').count()
    }
}

/// Apply a candidate rewrite with the no-data-loss guarantee sequence:
///
/// 1. Read the original bytes.
/// 2. Write the backup artifact. A failure here aborts before any mutation.
/// 3. Write the candidate to `export_path` (original untouched) or over the
///    original, always temp-file-then-rename so a failed write never leaves
///    a partial file.
pub async fn apply(
    original_path: &Path,
    candidate: &str,
    export_path: Option<&Path>,
) -> Result<WriteReport, DebloatError> {
    let original_bytes = tokio::fs::read(original_path)
        .await
        .map_err(|e| DebloatError::file_io("read", original_path, e))?;
    let original_text = String::from_utf8_lossy(&original_bytes);
    let lines_before = count_lines(&original_text);

    let backup_path = backup_path_for(original_path);
    write_atomic(&backup_path, &original_bytes)
        .await
        .map_err(|e| DebloatError::file_io("write backup", &backup_path, e))?;
    info!("backup written to {}", backup_path.display());

    let (target_path, replaced_original) = match export_path {
        Some(export) => (export.to_path_buf(), false),
        None => (original_path.to_path_buf(), true),
    };

    write_atomic(&target_path, candidate.as_bytes())
        .await
        .map_err(|e| DebloatError::file_io("write", &target_path, e))?;

    let lines_after = count_lines(candidate);
    info!(
        "candidate written to {} ({} -> {} lines)",
        target_path.display(),
        lines_before,
        lines_after
    );

    Ok(WriteReport {
        target_path,
        backup_path,
        lines_before,
        lines_after,
        replaced_original,
    })
}

/// Write bytes ensuring parent directories exist, using a temp-file + rename
/// strategy for best-effort atomic replacement. Mirrors existing permissions
/// on Unix.
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    // Temp path in the same directory so the final rename stays on one
    // filesystem
    let temp_path = {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let pid = std::process::id();
        let mut tmp = path.to_path_buf();
        let suffix = format!("tmp.{}.{}", pid, ts);
        let new_ext = match path.extension().and_then(|e| e.to_str()) {
            Some(orig) => format!("{}.{}", orig, suffix),
            None => suffix,
        };
        tmp.set_extension(new_ext);
        tmp
    };

    // Create temp exclusively to avoid races
    let mut file = tokio::fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await?;

    if let Err(e) = file.write_all(bytes).await {
        drop(file);
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }
    if let Err(e) = file.sync_all().await {
        drop(file);
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }
    drop(file);

    // Mirror existing permissions on Unix if the destination exists
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = tokio::fs::metadata(path).await {
            let mode = meta.permissions().mode();
            let _ = tokio::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(mode)).await;
        }
    }

    // On Windows, rename won't overwrite existing files; remove first
    #[cfg(windows)]
    {
        if path.exists() {
            let _ = tokio::fs::remove_file(path).await;
        }
    }

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    // Fsync the parent directory entry to reduce risk of metadata loss
    if let Some(parent) = path.parent() {
        if let Ok(dir) = std::fs::File::open(parent) {
            if let Err(e) = dir.sync_all() {
                warn!("could not fsync {}: {}", parent.display(), e);
            }
        }
    }

    Ok(())
}
