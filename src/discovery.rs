//! Journal file matching and directory enumeration.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;
use walkdir::WalkDir;

/// A journal file found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalFile {
    pub path: PathBuf,
    pub name: String,
    pub len: u64,
    pub modified: SystemTime,
}

/// Returns `true` if the file name matches `journal*.log` (case-insensitive).
///
/// This picks up both release and beta journals.
pub fn is_journal_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let lower = name.to_ascii_lowercase();
    lower.starts_with("journal") && lower.ends_with(".log") && lower.len() >= "journal.log".len()
}

/// List the journal files under `root`.
///
/// With `recursive` the whole tree is walked; otherwise only direct children
/// are considered. Unreadable entries are skipped. The result is sorted by
/// file name.
pub fn list_journal_files(root: &Path, recursive: bool) -> std::io::Result<Vec<JournalFile>> {
    if !root.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("journal directory not found: {}", root.display()),
        ));
    }

    let mut walker = WalkDir::new(root).min_depth(1);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker.into_iter() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_journal_file(entry.path()) {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                debug!(file = %entry.path().display(), error = %e, "could not stat journal");
                continue;
            }
        };
        files.push(JournalFile {
            path: entry.path().to_path_buf(),
            name: entry.file_name().to_string_lossy().into_owned(),
            len: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Sort journal files oldest-modified first, falling back to name order for
/// equal timestamps so the result is deterministic.
pub fn sort_by_modified(files: &mut [JournalFile]) {
    files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;
    use tempfile::TempDir;

    #[rstest]
    #[case("Journal.171006120001.01.log", true)]
    #[case("JournalBeta.171006120001.01.log", true)]
    #[case("journal01.log", true)]
    #[case("JOURNAL.LOG", true)]
    #[case("/some/dir/journalA.log", true)]
    #[case("Market.json", false)]
    #[case("journal01.txt", false)]
    #[case("netLog.171006.log", false)]
    #[case("journal", false)]
    #[case("journal.log.bak", false)]
    fn test_is_journal_file(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_journal_file(Path::new(name)), expected);
    }

    #[test]
    fn test_list_flat_and_recursive() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("journalB.log"), "abc").unwrap();
        std::fs::write(tmp.path().join("journalA.log"), "").unwrap();
        std::fs::write(tmp.path().join("Market.json"), "{}").unwrap();
        std::fs::create_dir(tmp.path().join("old")).unwrap();
        std::fs::write(tmp.path().join("old").join("journal0.log"), "").unwrap();

        let flat = list_journal_files(tmp.path(), false).unwrap();
        let names: Vec<_> = flat.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["journalA.log", "journalB.log"]);
        assert_eq!(flat[1].len, 3);

        let deep = list_journal_files(tmp.path(), true).unwrap();
        let names: Vec<_> = deep.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["journal0.log", "journalA.log", "journalB.log"]);
    }

    #[test]
    fn test_list_missing_dir_is_error() {
        let err = list_journal_files(Path::new("/nonexistent/journals/12345"), true).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_sort_by_modified() {
        let now = SystemTime::now();
        let file = |name: &str, age: u64| JournalFile {
            path: PathBuf::from(name),
            name: name.to_string(),
            len: 0,
            modified: now - Duration::from_secs(age),
        };
        let mut files = vec![file("b", 10), file("c", 100), file("a", 10)];
        sort_by_modified(&mut files);
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }
}
