// Export bundle loader
//
// A bundle is a root directory holding one sub-directory per subject
// (`firms/`, `contacts/`, `proposal_sheets/`, `proposal_lines/`), each with
// one `.xml` file per record. Missing sub-directories are not an error.

use std::fs;
use std::path::{Path, PathBuf};

use crmsync_core::{RecordBatch, Subject};

use crate::error::LoadError;
use crate::xml::parse_record;

pub const RECORD_EXTENSION: &str = "xml";

/// Load every record file directly under `dir`, in file-name order.
///
/// Each record lands in the batch group named by its root element, whatever
/// the directory it was found in.
pub fn load_dir(dir: &Path) -> Result<RecordBatch, LoadError> {
    let mut batch = RecordBatch::default();
    for path in record_files(dir)? {
        let text = fs::read_to_string(&path).map_err(|e| LoadError::Io {
            path: path.clone(),
            message: e.to_string(),
        })?;
        batch.push(parse_record(&text, &path)?);
    }
    Ok(batch)
}

/// Load one subject directory of a bundle. `sub_dir` may be `"."` to load
/// records stored directly under `root`.
pub fn load_subject(root: &Path, sub_dir: &str) -> Result<RecordBatch, LoadError> {
    let dir = root.join(sub_dir);
    if !dir.is_dir() {
        log::debug!("{}: no such directory, skipped", dir.display());
        return Ok(RecordBatch::default());
    }
    let batch = load_dir(&dir)?;
    log::debug!("{}: loaded {} record(s)", dir.display(), batch.len());
    Ok(batch)
}

/// Subjects whose directory exists under `root`, in import order.
pub fn present_subjects(root: &Path) -> Vec<Subject> {
    Subject::ALL
        .into_iter()
        .filter(|s| root.join(s.dir_name()).is_dir())
        .collect()
}

/// Load every known subject directory present under `root`.
pub fn load_bundle(root: &Path) -> Result<RecordBatch, LoadError> {
    if !root.is_dir() {
        return Err(LoadError::Io {
            path: root.to_path_buf(),
            message: "not a directory".into(),
        });
    }

    let mut batch = RecordBatch::default();
    for subject in present_subjects(root) {
        let loaded = load_subject(root, subject.dir_name())?;
        let stray = loaded.len() - loaded.count(subject);
        if stray > 0 {
            log::warn!(
                "{}: {stray} record(s) belong to another subject",
                root.join(subject.dir_name()).display()
            );
        }
        batch.extend(loaded);
    }
    Ok(batch)
}

fn record_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let entries = fs::read_dir(dir).map_err(|e| LoadError::Io {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| LoadError::Io {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == RECORD_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
