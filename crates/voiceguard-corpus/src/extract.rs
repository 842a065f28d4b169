use crate::error::{CorpusError, CorpusResult};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::{info, warn};

/// Top-level folder every LibriSpeech archive unpacks into.
pub const ARCHIVE_ROOT: &str = "LibriSpeech";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Extracted { dest: PathBuf },
    /// The expected folder was already present; nothing was unpacked.
    AlreadyExtracted { folder: PathBuf },
    /// The file name does not end in `.tar.gz` or `.tar`.
    NotAnArchive,
}

/// Archive name without its `.tar.gz` or `.tar` suffix.
fn archive_stem(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(".tar.gz")
        .or_else(|| file_name.strip_suffix(".tar"))
}

/// Unpack `file_path` into `dest_folder` unless `dest_folder/LibriSpeech/<stem>` exists.
///
/// Compression is detected from the file content, not the suffix.
pub fn extract_tarfile(file_path: &Path, dest_folder: &Path) -> CorpusResult<Extraction> {
    let Some(stem) = file_path.file_name().and_then(|n| n.to_str()).and_then(archive_stem) else {
        warn!(path = %file_path.display(), "File is not a tar archive");
        return Ok(Extraction::NotAnArchive);
    };

    let expected = dest_folder.join(ARCHIVE_ROOT).join(stem);
    if expected.exists() {
        info!(archive = %file_path.display(), folder = %expected.display(), "Archive already extracted");
        return Ok(Extraction::AlreadyExtracted { folder: expected });
    }

    let mut reader = BufReader::new(File::open(file_path)?);
    let gzipped = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
    let unpacked = if gzipped {
        Archive::new(GzDecoder::new(reader)).unpack(dest_folder)
    } else {
        Archive::new(reader).unpack(dest_folder)
    };
    unpacked.map_err(|source| CorpusError::Archive { path: file_path.to_path_buf(), source })?;

    info!(archive = %file_path.display(), dest = %dest_folder.display(), "Extracted archive");
    Ok(Extraction::Extracted { dest: dest_folder.to_path_buf() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tar::Builder;
    use tempfile::TempDir;

    fn package(temp: &TempDir, subset: &str) -> PathBuf {
        let dir = temp.path().join("src").join(subset).join("84/121123");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("84-121123-0000.flac"), b"fLaC").unwrap();
        std::fs::write(dir.join("84-121123.trans.txt"), "84-121123-0000 GO DO YOU HEAR\n").unwrap();
        temp.path().join("src").join(subset)
    }

    fn tar_gz(temp: &TempDir, subset: &str) -> PathBuf {
        let source = package(temp, subset);
        let archive_path = temp.path().join(format!("{subset}.tar.gz"));
        let enc = GzEncoder::new(File::create(&archive_path).unwrap(), Compression::default());
        let mut tar = Builder::new(enc);
        tar.append_dir_all(format!("{ARCHIVE_ROOT}/{subset}"), &source).unwrap();
        tar.into_inner().unwrap().finish().unwrap();
        archive_path
    }

    #[test]
    fn test_archive_stem() {
        assert_eq!(archive_stem("dev-clean.tar.gz"), Some("dev-clean"));
        assert_eq!(archive_stem("dev-clean.tar"), Some("dev-clean"));
        assert_eq!(archive_stem("dev-clean.zip"), None);
    }

    #[test]
    fn test_extracts_gzipped_archive_once() {
        let temp = TempDir::new().unwrap();
        let archive = tar_gz(&temp, "dev-clean");
        let dest = temp.path().join("librispeech_dataset");

        let first = extract_tarfile(&archive, &dest).unwrap();
        assert_eq!(first, Extraction::Extracted { dest: dest.clone() });
        let flac = dest.join("LibriSpeech/dev-clean/84/121123/84-121123-0000.flac");
        assert_eq!(std::fs::read(&flac).unwrap(), b"fLaC");

        let second = extract_tarfile(&archive, &dest).unwrap();
        assert_eq!(second, Extraction::AlreadyExtracted { folder: dest.join("LibriSpeech/dev-clean") });
    }

    #[test]
    fn test_extracts_plain_tar() {
        let temp = TempDir::new().unwrap();
        let source = package(&temp, "test-other");
        let archive_path = temp.path().join("test-other.tar");
        let mut tar = Builder::new(File::create(&archive_path).unwrap());
        tar.append_dir_all("LibriSpeech/test-other", &source).unwrap();
        tar.finish().unwrap();
        drop(tar);

        let dest = temp.path().join("out");
        extract_tarfile(&archive_path, &dest).unwrap();
        assert!(dest.join("LibriSpeech/test-other/84/121123/84-121123.trans.txt").is_file());
    }

    #[test]
    fn test_non_archive_is_skipped() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("notes.txt");
        std::fs::write(&file, "hello").unwrap();

        assert_eq!(extract_tarfile(&file, temp.path()).unwrap(), Extraction::NotAnArchive);
    }

    #[test]
    fn test_corrupt_archive_is_an_error() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("broken.tar.gz");
        std::fs::write(&file, [0x1f, 0x8b, 0, 1, 2, 3]).unwrap();

        let result = extract_tarfile(&file, &temp.path().join("out"));
        assert!(matches!(result, Err(CorpusError::Archive { .. })));
    }
}
