use crate::error::{TrainingError, TrainingResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One file of a checkpoint, addressed by its path inside the published repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub path_in_repo: String,
    pub sha256: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub loss: Option<f64>,
    pub files: Vec<ArtifactFile>,
}

pub fn sha256_file(path: &Path) -> TrainingResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Every regular file under `root` as `(absolute path, '/'-separated relative path)`,
/// sorted by relative path.
pub fn list_files(root: &Path) -> TrainingResult<Vec<(PathBuf, String)>> {
    if !root.is_dir() {
        return Err(TrainingError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("not a directory: {}", root.display()),
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| TrainingError::Io(std::io::Error::other(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| TrainingError::Other(e.into()))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((entry.path().to_path_buf(), rel));
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

/// Hash every file under `root`.
pub fn describe_files(root: &Path) -> TrainingResult<Vec<ArtifactFile>> {
    list_files(root)?
        .into_iter()
        .map(|(path, rel)| {
            Ok(ArtifactFile {
                sha256: sha256_file(&path)?,
                size_bytes: std::fs::metadata(&path)?.len(),
                path_in_repo: rel,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_files_is_sorted_and_relative() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("nested/deeper")).unwrap();
        std::fs::write(temp.path().join("b.txt"), "b").unwrap();
        std::fs::write(temp.path().join("a.txt"), "a").unwrap();
        std::fs::write(temp.path().join("nested/deeper/c.json"), "{}").unwrap();

        let rels: Vec<String> = list_files(temp.path()).unwrap().into_iter().map(|(_, r)| r).collect();
        assert_eq!(rels, vec!["a.txt", "b.txt", "nested/deeper/c.json"]);
    }

    #[test]
    fn test_list_files_rejects_missing_dir() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(list_files(&temp.path().join("missing")), Err(TrainingError::Io(_))));
    }

    #[test]
    fn test_describe_files_hashes_contents() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("weights.pt"), "hello").unwrap();

        let files = describe_files(temp.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path_in_repo, "weights.pt");
        assert_eq!(files[0].size_bytes, 5);
        assert_eq!(
            files[0].sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
