use camino::Utf8Path;
use camsync_core::LocalFileSet;
use tracing::{debug, warn};

use crate::sync::SyncError;

/// Names of the regular files directly inside `dir`.
pub fn scan_local_files(dir: &Utf8Path) -> Result<LocalFileSet, SyncError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| SyncError::Local(format!("read {dir} failed: {e}")))?;

    let mut names = LocalFileSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| SyncError::Local(format!("read {dir} failed: {e}")))?;
        let file_type = entry
            .file_type()
            .map_err(|e| SyncError::Local(format!("stat {:?} failed: {e}", entry.path())))?;
        if !file_type.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => {
                names.insert(name);
            }
            Err(raw) => warn!("skipping non UTF-8 file name {raw:?} in {dir}"),
        }
    }

    debug!(count = names.len(), "scanned {dir}");
    Ok(names)
}

/// Creates `dir` (and parents) if needed.
pub fn ensure_dir(dir: &Utf8Path) -> Result<(), SyncError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| SyncError::Local(format!("create {dir} failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn only_top_level_regular_files_are_listed() {
        let tmp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        std::fs::write(root.join("clip1.mp4"), b"a").unwrap();
        std::fs::write(root.join("clip2.insv"), b"b").unwrap();
        std::fs::create_dir(root.join("nested")).unwrap();
        std::fs::write(root.join("nested").join("clip3.mp4"), b"c").unwrap();

        let names = scan_local_files(&root).unwrap();
        assert_eq!(names.len(), 2);
        assert!(names.contains("clip1.mp4"));
        assert!(names.contains("clip2.insv"));
        assert!(!names.contains("nested"));
    }

    #[test]
    fn ensure_dir_creates_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let deep = root.join("a").join("b");

        ensure_dir(&deep).unwrap();
        assert!(scan_local_files(&deep).unwrap().is_empty());
    }

    #[test]
    fn missing_directory_is_a_local_error() {
        let err = scan_local_files(Utf8Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, SyncError::Local(_)));
    }
}
