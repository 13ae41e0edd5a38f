//! Filesystem mirror of generated files.
//!
//! Each job gets its own directory under the base path:
//!
//! ```text
//! <base>/<job-id>/
//! ├── main.tf, variables.tf, ...            # generated files
//! ├── metadata.json                         # file list snapshot
//! ├── static_validator/analysis_results.txt # diagnostics, if any
//! └── deploy-logs/<job-id>.log              # deploy executor output
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{WorkspaceError, WorkspaceResult};
use crate::file::ConfigFile;

const METADATA_FILE: &str = "metadata.json";

/// Snapshot written next to the mirrored files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceMetadata {
    pub job_id: String,
    pub created_at: DateTime<Utc>,
    pub files_count: usize,
    pub files: Vec<ConfigFile>,
}

/// Per-job workspace directories under a common base path.
#[derive(Debug, Clone)]
pub struct Workspace {
    base: PathBuf,
}

impl Workspace {
    /// Open (and create if needed) the workspace base directory.
    pub fn open(base: impl AsRef<Path>) -> WorkspaceResult<Self> {
        let base = base.as_ref().to_path_buf();
        match fs::metadata(&base) {
            Ok(meta) if !meta.is_dir() => return Err(WorkspaceError::NotADirectory(base)),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => fs::create_dir_all(&base)?,
            Err(e) => return Err(e.into()),
        }
        Ok(Self { base })
    }

    /// Base path shared by every job directory.
    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Directory for a single job. Not guaranteed to exist.
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.base.join(job_id)
    }

    /// Write files and the metadata snapshot for a job.
    pub fn save_files(&self, job_id: &str, files: &[ConfigFile]) -> WorkspaceResult<()> {
        check_name(job_id)?;
        for file in files {
            check_name(&file.name)?;
        }

        let dir = self.job_dir(job_id);
        fs::create_dir_all(&dir)?;

        for file in files {
            fs::write(dir.join(&file.name), &file.content)?;
        }

        let metadata = WorkspaceMetadata {
            job_id: job_id.to_string(),
            created_at: Utc::now(),
            files_count: files.len(),
            files: files.to_vec(),
        };
        fs::write(dir.join(METADATA_FILE), serde_json::to_string_pretty(&metadata)?)?;

        debug!(job_id, files = files.len(), "mirrored files to workspace");
        Ok(())
    }

    /// Read back a job's files; content comes from the files on disk.
    pub fn load_files(&self, job_id: &str) -> WorkspaceResult<Vec<ConfigFile>> {
        check_name(job_id)?;
        let dir = self.job_dir(job_id);
        let raw = match fs::read_to_string(dir.join(METADATA_FILE)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WorkspaceError::NotFound(job_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let metadata: WorkspaceMetadata = serde_json::from_str(&raw)?;
        let mut files = metadata.files;
        for file in &mut files {
            file.content = fs::read_to_string(dir.join(&file.name))?;
        }
        Ok(files)
    }

    /// Remove a job's directory and everything in it. Missing is fine.
    pub fn delete(&self, job_id: &str) -> WorkspaceResult<()> {
        check_name(job_id)?;
        match fs::remove_dir_all(self.job_dir(job_id)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Names must stay inside their parent directory.
fn check_name(name: &str) -> WorkspaceResult<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
        || name == METADATA_FILE;
    if bad {
        return Err(WorkspaceError::InvalidFileName(name.to_string()));
    }
    Ok(())
}
