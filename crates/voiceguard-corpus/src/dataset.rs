use crate::error::CorpusResult;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioExample {
    pub audio_path: PathBuf,
    pub transcript: String,
}

fn sorted_subdirs(dir: &Path) -> CorpusResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Collect `<dir>/<language>/<clip>/<clip>.wav` with its `<clip>.txt` transcript.
///
/// Clips missing either file are skipped. Results are ordered by language,
/// then clip.
pub fn load_audio_dataset(dir: &Path) -> CorpusResult<Vec<AudioExample>> {
    let mut examples = Vec::new();
    for language in sorted_subdirs(dir)? {
        for clip in sorted_subdirs(&language)? {
            let Some(name) = clip.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let audio_path = clip.join(format!("{name}.wav"));
            let transcript_path = clip.join(format!("{name}.txt"));
            if !(audio_path.is_file() && transcript_path.is_file()) {
                debug!(clip = %clip.display(), "Skipping incomplete clip");
                continue;
            }
            let transcript = std::fs::read_to_string(&transcript_path)?.trim().to_string();
            examples.push(AudioExample { audio_path, transcript });
        }
    }
    debug!(dir = %dir.display(), examples = examples.len(), "Loaded audio dataset");
    Ok(examples)
}
