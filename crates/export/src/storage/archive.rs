//! Zip packaging of finished sessions

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::traits::Archiver;

/// Compresses `<root>/<session>/` into `<root>/<session>.zip`
pub struct ZipArchiver {
    root: PathBuf,
}

impl ZipArchiver {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn archive_path(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("{}.zip", session_id))
    }

    fn write_zip(&self, source: &Path, target: &Path) -> Result<usize> {
        let file = File::create(target)
            .with_context(|| format!("Failed to create archive: {}", target.display()))?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut entries = 0;
        for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            let relative = entry.path().strip_prefix(source)?;
            // Zip entry names always use forward slashes
            let name = relative.to_string_lossy().replace('\\', "/");

            if entry.file_type().is_dir() {
                zip.add_directory(name, options)?;
            } else {
                zip.start_file(name, options)?;
                let mut input = File::open(entry.path())
                    .with_context(|| format!("Failed to read {}", entry.path().display()))?;
                io::copy(&mut input, &mut zip)?;
                entries += 1;
            }
        }

        zip.finish().context("Failed to finalize archive")?;
        Ok(entries)
    }
}

impl Archiver for ZipArchiver {
    fn archive(&self, session_id: &str) -> Result<PathBuf> {
        let source = self.root.join(session_id);
        let target = self.archive_path(session_id);

        // Session tree already packed and removed
        if !source.exists() && target.is_file() {
            log::info!("Keeping existing archive {}", target.display());
            return Ok(target);
        }

        fs::create_dir_all(&source)
            .with_context(|| format!("Failed to create session directory: {}", source.display()))?;

        let temp_path = target.with_extension("zip.tmp");
        let files = self.write_zip(&source, &temp_path)?;
        fs::rename(&temp_path, &target)
            .with_context(|| format!("Failed to move archive into place: {}", target.display()))?;

        fs::remove_dir_all(&source)
            .with_context(|| format!("Failed to remove {}", source.display()))?;

        log::info!("Archived {} files to {}", files, target.display());
        Ok(target)
    }

    fn is_archived(&self, session_id: &str) -> bool {
        self.archive_path(session_id).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;
    use zip::ZipArchive;

    fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> String {
        let mut content = String::new();
        archive
            .by_name(name)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        content
    }

    #[test]
    fn test_archive_session_tree() {
        let dir = tempdir().unwrap();
        let session = dir.path().join("20240101_000000");
        fs::create_dir_all(session.join("general/files")).unwrap();
        fs::write(session.join("users.json"), "[]").unwrap();
        fs::write(session.join("general/2024-01-01.json"), "[{}]").unwrap();
        fs::write(session.join("general/files/F1_a.txt"), "hello").unwrap();

        let archiver = ZipArchiver::new(dir.path());
        assert!(!archiver.is_archived("20240101_000000"));

        let path = archiver.archive("20240101_000000").unwrap();

        assert_eq!(path, dir.path().join("20240101_000000.zip"));
        assert!(archiver.is_archived("20240101_000000"));
        assert!(!session.exists());
        assert!(!dir.path().join("20240101_000000.zip.tmp").exists());

        let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
        assert_eq!(read_entry(&mut zip, "users.json"), "[]");
        assert_eq!(read_entry(&mut zip, "general/2024-01-01.json"), "[{}]");
        assert_eq!(read_entry(&mut zip, "general/files/F1_a.txt"), "hello");
    }

    #[test]
    fn test_archive_empty_session() {
        let dir = tempdir().unwrap();
        let archiver = ZipArchiver::new(dir.path());

        let path = archiver.archive("s1").unwrap();

        let zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
        assert_eq!(zip.len(), 0);
    }

    #[test]
    fn test_archive_keeps_existing_zip_without_session_dir() {
        let dir = tempdir().unwrap();
        let session = dir.path().join("s1");
        fs::create_dir_all(&session).unwrap();
        fs::write(session.join("users.json"), "[]").unwrap();
        let archiver = ZipArchiver::new(dir.path());
        archiver.archive("s1").unwrap();

        let path = archiver.archive("s1").unwrap();

        assert!(!session.exists());
        let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
        assert_eq!(zip.len(), 1);
        assert_eq!(read_entry(&mut zip, "users.json"), "[]");
    }
}
