use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::OpsError;
use crate::fs_util::{walk_dir, write_bytes_atomic};

pub const STORE_DIR: &str = ".terra-ops";

/// Envelope written for every finished command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report<T> {
    pub command: String,
    pub finished_at: String,
    pub tool: String,
    pub result: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub command: String,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct ReportStore {
    root: Utf8PathBuf,
}

impl ReportStore {
    pub fn new() -> Result<Self, OpsError> {
        let cwd = std::env::current_dir().map_err(|err| OpsError::Filesystem(err.to_string()))?;
        let root = Utf8PathBuf::from_path_buf(cwd.join(STORE_DIR))
            .map_err(|_| OpsError::Filesystem("invalid report path".to_string()))?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn command_dir(&self, command: &str) -> Utf8PathBuf {
        self.root.join("reports").join(command)
    }

    pub fn save<T: Serialize>(&self, command: &str, result: &T) -> Result<Utf8PathBuf, OpsError> {
        let now = chrono::Utc::now();
        let report = Report {
            command: command.to_string(),
            finished_at: now.to_rfc3339(),
            tool: format!("terra-ops/{}", env!("CARGO_PKG_VERSION")),
            result,
        };
        let content = serde_json::to_vec_pretty(&report)
            .map_err(|err| OpsError::Filesystem(err.to_string()))?;
        let path = self
            .command_dir(command)
            .join(format!("{}.json", now.format("%Y%m%dT%H%M%S%.3fZ")));
        write_bytes_atomic(&path, &content)?;
        Ok(path)
    }

    /// Saved reports, newest first. Timestamped names sort chronologically.
    pub fn list_reports(&self, command: Option<&str>) -> Result<Vec<ReportEntry>, OpsError> {
        let base = match command {
            Some(command) => self.command_dir(command),
            None => self.root.join("reports"),
        };
        if !base.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for path in walk_dir(base.as_std_path())? {
            if !path.is_file() || path.extension().map(|ext| ext != "json").unwrap_or(true) {
                continue;
            }
            let path = Utf8PathBuf::from_path_buf(path)
                .map_err(|_| OpsError::Filesystem("non-utf8 report path".to_string()))?;
            let command = path
                .parent()
                .and_then(Utf8Path::file_name)
                .unwrap_or_default()
                .to_string();
            entries.push(ReportEntry {
                command,
                path: path.to_string(),
            });
        }
        entries.sort_by(|a, b| {
            let a_name = Utf8Path::new(&a.path).file_name().unwrap_or_default();
            let b_name = Utf8Path::new(&b.path).file_name().unwrap_or_default();
            b_name.cmp(a_name)
        });
        Ok(entries)
    }

    pub fn read_report(path: &Utf8Path) -> Result<Report<serde_json::Value>, OpsError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| OpsError::Filesystem(format!("{path}: {err}")))?;
        serde_json::from_str(&content).map_err(|err| OpsError::Filesystem(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = ReportStore::new().unwrap();
        assert!(store.command_dir("ingest").ends_with(".terra-ops/reports/ingest"));
    }
}
