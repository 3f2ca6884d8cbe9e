//! Secrets mounted as a directory tree, one file per value

use super::{decode, Gatherer, SourceKind};
use crate::error::SourceError;
use crate::tree::{insert_at, FieldPath, RawTree};
use encoding_rs::{Encoding, UTF_8};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

const DEFAULT_FILE_SIZE_LIMIT: u64 = 64 * 1024;
const DEFAULT_FILE_COUNT_LIMIT: usize = 256;
const DEFAULT_DEPTH_LIMIT: usize = 8;

/// Reads a directory laid out like a Kubernetes secret volume.
///
/// Each regular file is one value keyed by its name; subdirectories become
/// nested mappings. Hidden entries (leading `.`) are skipped, which also
/// skips the `..data` links Kubernetes maintains. Files over the size limit
/// and files past the count limit are skipped. Symbolic links are followed.
///
/// The aggregator lays these values over every plain source, then rejects
/// any value that did not land on a declared secret field.
#[derive(Debug, Clone)]
pub struct SecretsGatherer {
    root: PathBuf,
    file_size_limit: u64,
    file_count_limit: usize,
    depth_limit: usize,
    encoding: &'static Encoding,
    trim_line_endings: bool,
}

impl SecretsGatherer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            file_size_limit: DEFAULT_FILE_SIZE_LIMIT,
            file_count_limit: DEFAULT_FILE_COUNT_LIMIT,
            depth_limit: DEFAULT_DEPTH_LIMIT,
            encoding: UTF_8,
            trim_line_endings: false,
        }
    }

    /// Largest file read, in bytes.
    pub fn file_size_limit(mut self, bytes: u64) -> Self {
        self.file_size_limit = bytes;
        self
    }

    pub fn file_count_limit(mut self, files: usize) -> Self {
        self.file_count_limit = files;
        self
    }

    /// Directory levels below the root that are visited. Files directly in the
    /// root are at depth 1.
    pub fn depth_limit(mut self, depth: usize) -> Self {
        self.depth_limit = depth;
        self
    }

    /// Encoding of the secret files when they carry no BOM.
    pub fn encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Strip trailing `\n` and `\r` from values, as left by `echo` or editors.
    pub fn trim_line_endings(mut self, trim: bool) -> Self {
        self.trim_line_endings = trim;
        self
    }

    fn relative_path(&self, path: &Path) -> FieldPath {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .fold(FieldPath::root(), |path, name| path.child(name))
    }

    fn read_value(&self, path: &Path) -> Result<String, SourceError> {
        let bytes = std::fs::read(path).map_err(|e| SourceError::io(path, e))?;
        let text = decode(path, &bytes, self.encoding);
        Ok(if self.trim_line_endings {
            text.trim_end_matches(['\n', '\r']).to_string()
        } else {
            text
        })
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|name| name.starts_with('.'))
}

impl Gatherer for SecretsGatherer {
    fn name(&self) -> String {
        format!("Secrets ({})", self.root.display())
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Secrets
    }

    fn gather(&self) -> Result<RawTree, SourceError> {
        match std::fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                let error = std::io::Error::other("secrets root is not a directory");
                return Err(SourceError::io(&self.root, error));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(root = %self.root.display(), "secrets directory absent");
                return Ok(RawTree::empty());
            }
            Err(e) => return Err(SourceError::io(&self.root, e)),
        }

        let walker = WalkDir::new(&self.root)
            .follow_links(true)
            .max_depth(self.depth_limit)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

        let mut tree = RawTree::empty();
        let mut files = 0usize;
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                SourceError::io(path, e.into())
            })?;
            if entry.depth() == 0 {
                continue;
            }
            let path = self.relative_path(entry.path());

            if entry.file_type().is_dir() {
                insert_at(&mut tree, &path, RawTree::empty());
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            let size = entry.metadata().map_err(|e| SourceError::io(entry.path(), e.into()))?.len();
            if size > self.file_size_limit {
                tracing::trace!(path = %entry.path().display(), size, limit = self.file_size_limit, "secret file too large, skipping");
                continue;
            }
            if files >= self.file_count_limit {
                tracing::trace!(path = %entry.path().display(), limit = self.file_count_limit, "secret file count limit reached, skipping");
                continue;
            }
            files += 1;
            insert_at(&mut tree, &path, RawTree::string(self.read_value(entry.path())?));
        }

        tracing::debug!(root = %self.root.display(), files, "gathered secrets");
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn secrets_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("apiKey"), "k-123").expect("write");
        fs::create_dir(dir.path().join("db")).expect("mkdir");
        fs::write(dir.path().join("db").join("password"), "hunter2\n").expect("write");
        fs::write(dir.path().join(".hidden"), "nope").expect("write");
        fs::create_dir(dir.path().join(".git")).expect("mkdir");
        fs::write(dir.path().join(".git").join("config"), "nope").expect("write");
        dir
    }

    #[test]
    fn files_become_values_and_dirs_nest() {
        let dir = secrets_dir();
        let tree = SecretsGatherer::new(dir.path()).gather().expect("gather");
        assert_eq!(tree, RawTree::from(json!({"apiKey": "k-123", "db": {"password": "hunter2\n"}})));
    }

    #[test]
    fn line_endings_can_be_trimmed() {
        let dir = secrets_dir();
        let tree = SecretsGatherer::new(dir.path()).trim_line_endings(true).gather().expect("gather");
        assert_eq!(tree.get(&FieldPath::parse("db.password")), Some(&RawTree::string("hunter2")));
    }

    #[test]
    fn oversized_files_are_skipped() {
        let dir = secrets_dir();
        fs::write(dir.path().join("big"), "x".repeat(100)).expect("write");
        let tree = SecretsGatherer::new(dir.path()).file_size_limit(10).gather().expect("gather");
        assert!(tree.get(&FieldPath::parse("big")).is_none());
        assert!(tree.get(&FieldPath::parse("apiKey")).is_some());
    }

    #[test]
    fn count_limit_stops_reading() {
        let dir = secrets_dir();
        let tree = SecretsGatherer::new(dir.path()).file_count_limit(1).gather().expect("gather");
        assert_eq!(tree, RawTree::from(json!({"apiKey": "k-123", "db": {}})));
    }

    #[test]
    fn depth_limit_cuts_nesting() {
        let dir = secrets_dir();
        let tree = SecretsGatherer::new(dir.path()).depth_limit(1).gather().expect("gather");
        assert_eq!(tree, RawTree::from(json!({"apiKey": "k-123", "db": {}})));
    }

    #[test]
    fn missing_root_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gatherer = SecretsGatherer::new(dir.path().join("absent"));
        assert_eq!(gatherer.kind(), SourceKind::Secrets);
        assert_eq!(gatherer.gather().expect("gather"), RawTree::empty());
    }

    #[test]
    fn configured_encoding_is_used() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("token"), [0x63, 0x61, 0x66, 0xE9]).expect("write");
        let tree = SecretsGatherer::new(dir.path())
            .encoding(encoding_rs::WINDOWS_1252)
            .gather()
            .expect("gather");
        assert_eq!(tree, RawTree::from(json!({"token": "café"})));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_followed() {
        let dir = secrets_dir();
        let target = tempfile::tempdir().expect("tempdir");
        fs::write(target.path().join("token"), "t").expect("write");
        std::os::unix::fs::symlink(target.path(), dir.path().join("linked")).expect("symlink");
        let tree = SecretsGatherer::new(dir.path()).gather().expect("gather");
        assert_eq!(tree.get(&FieldPath::parse("linked.token")), Some(&RawTree::string("t")));
    }
}
