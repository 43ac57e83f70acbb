use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Find every regular file under `root` with the given extension.
///
/// The match ignores case and a leading dot in `extension`. `root` is
/// created when it does not exist yet. Entries that cannot be read are
/// logged and skipped; the result is sorted for a stable partition.
pub fn discover_files(root: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(root)?;

    let extension = extension.trim_start_matches('.');
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let matches = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if matches {
            files.push(entry.into_path());
        }
    }

    files.sort();
    log::debug!("Discovered {} .{} files under {}", files.len(), extension, root.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_discovers_recursively() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("one.mp3"), b"").unwrap();
        fs::write(root.join("a/two.MP3"), b"").unwrap();
        fs::write(root.join("a/b/three.mp3"), b"").unwrap();
        fs::write(root.join("a/cover.jpg"), b"").unwrap();
        fs::create_dir_all(root.join("folder.mp3")).unwrap();

        let files = discover_files(root, ".mp3").unwrap();
        assert_eq!(
            files,
            vec![
                root.join("a/b/three.mp3"),
                root.join("a/two.MP3"),
                root.join("one.mp3"),
            ]
        );
    }

    #[test]
    fn test_creates_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("not/yet/there");

        let files = discover_files(&root, "mp3").unwrap();
        assert!(files.is_empty());
        assert!(root.is_dir());
    }
}
