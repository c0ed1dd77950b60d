use std::fs;
use std::path::{Path, PathBuf};

use camino::Utf8Path;

use crate::error::OpsError;

/// Every file and directory below `root`, depth-first, unordered.
pub fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, OpsError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path).map_err(|err| OpsError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| OpsError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), OpsError> {
    let parent = path
        .parent()
        .ok_or_else(|| OpsError::Filesystem(format!("invalid destination path {path}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| OpsError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix("terra-ops")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| OpsError::Filesystem(err.to_string()))?;
    std::io::Write::write_all(&mut temp, content)
        .map_err(|err| OpsError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| OpsError::Filesystem(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn atomic_write_creates_parents() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let target = root.join("a/b/report.json");
        write_bytes_atomic(&target, b"{}").unwrap();
        write_bytes_atomic(&target, b"{\"x\":1}").unwrap();
        assert_eq!(fs::read_to_string(target.as_std_path()).unwrap(), "{\"x\":1}");

        let walked = walk_dir(root.as_std_path()).unwrap();
        assert_eq!(walked.iter().filter(|p| p.is_file()).count(), 1);
    }
}
