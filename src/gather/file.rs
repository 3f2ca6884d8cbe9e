//! Text sources: embedded resources, single files, and configuration directories

use super::{parse_file, Gatherer};
use crate::error::SourceError;
use crate::mapper::Format;
use crate::tree::{merge, RawTree};
use std::path::{Path, PathBuf};

/// A configuration document shipped with the application.
///
/// The text is either compiled in (`include_str!`) or read from a path next
/// to the binary. A resource file that does not exist contributes nothing.
#[derive(Debug, Clone)]
pub struct ResourceGatherer {
    name: String,
    format: Format,
    origin: Origin,
}

#[derive(Debug, Clone)]
enum Origin {
    Embedded(&'static str),
    Path(PathBuf),
}

impl ResourceGatherer {
    pub fn embedded(name: impl Into<String>, format: Format, text: &'static str) -> Self {
        Self { name: name.into(), format, origin: Origin::Embedded(text) }
    }

    pub fn path(path: impl Into<PathBuf>, format: Format) -> Self {
        let path = path.into();
        Self { name: path.display().to_string(), format, origin: Origin::Path(path) }
    }
}

impl Gatherer for ResourceGatherer {
    fn name(&self) -> String {
        format!("Resource ({})", self.name)
    }

    fn gather(&self) -> Result<RawTree, SourceError> {
        match &self.origin {
            Origin::Embedded(text) => self
                .format
                .parse(text)
                .map_err(|error| SourceError::Parse { origin: self.name.clone(), error }),
            Origin::Path(path) => Ok(parse_file(path, self.format)?.unwrap_or_default()),
        }
    }
}

/// One file on disk, format picked from its extension unless given.
#[derive(Debug, Clone)]
pub struct FileGatherer {
    path: PathBuf,
    format: Option<Format>,
}

impl FileGatherer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), format: None }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    fn format(&self) -> Result<Format, SourceError> {
        self.format.or_else(|| Format::from_path(&self.path)).ok_or_else(|| {
            SourceError::Other(anyhow::anyhow!(
                "cannot tell the format of {} from its extension",
                self.path.display()
            ))
        })
    }
}

impl Gatherer for FileGatherer {
    fn name(&self) -> String {
        format!("File ({})", self.path.display())
    }

    fn gather(&self) -> Result<RawTree, SourceError> {
        let format = self.format()?;
        Ok(parse_file(&self.path, format)?.unwrap_or_default())
    }
}

/// Every top-level file in a directory whose extension matches one of the
/// configured formats.
///
/// Files are merged format by format in the configured order, and by file
/// name within a format, so `10-db.yaml` overrides `00-base.yaml` and both
/// override any `.properties` file when properties come first. The directory
/// is not searched recursively. A missing directory contributes nothing.
#[derive(Debug, Clone)]
pub struct DirGatherer {
    dir: PathBuf,
    formats: Vec<Format>,
}

impl DirGatherer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), formats: Format::ALL.to_vec() }
    }

    pub fn with_formats(mut self, formats: impl IntoIterator<Item = Format>) -> Self {
        self.formats = formats.into_iter().collect();
        self
    }

    fn files(&self) -> Result<Option<Vec<PathBuf>>, SourceError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SourceError::io(&self.dir, e)),
        };
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| SourceError::io(&self.dir, e))?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(Some(files))
    }
}

fn has_extension(path: &Path, format: Format) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| format.extensions().iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

impl Gatherer for DirGatherer {
    fn name(&self) -> String {
        format!("Directory ({})", self.dir.display())
    }

    fn gather(&self) -> Result<RawTree, SourceError> {
        let Some(files) = self.files()? else {
            tracing::debug!(dir = %self.dir.display(), "configuration directory absent");
            return Ok(RawTree::empty());
        };

        let mut tree = RawTree::empty();
        for format in &self.formats {
            for path in files.iter().filter(|path| has_extension(path, *format)) {
                tracing::trace!(path = %path.display(), %format, "reading configuration file");
                if let Some(layer) = parse_file(path, *format)? {
                    tree = merge(tree, layer);
                }
            }
        }
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    #[test]
    fn embedded_resource_parses_text() {
        let gatherer = ResourceGatherer::embedded("app.yaml", Format::Yaml, "db:\n  url: jdbc:x\n");
        assert_eq!(gatherer.name(), "Resource (app.yaml)");
        assert_eq!(gatherer.gather().expect("gather"), RawTree::from(json!({"db": {"url": "jdbc:x"}})));
    }

    #[test]
    fn broken_embedded_resource_names_origin() {
        let err = ResourceGatherer::embedded("app.json", Format::Json, "{").gather().unwrap_err();
        assert!(err.to_string().starts_with("cannot parse app.json"), "{err}");
    }

    #[test]
    fn missing_resource_path_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gatherer = ResourceGatherer::path(dir.path().join("app.yaml"), Format::Yaml);
        assert_eq!(gatherer.gather().expect("gather"), RawTree::empty());
    }

    #[test]
    fn file_format_follows_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("app.toml");
        fs::write(&path, "port = 8080\n").expect("write");
        assert_eq!(FileGatherer::new(&path).gather().expect("gather"), RawTree::from(json!({"port": 8080})));
    }

    #[test]
    fn unknown_extension_needs_explicit_format() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("app.conf");
        fs::write(&path, "port=1\n").expect("write");
        assert!(FileGatherer::new(&path).gather().is_err());
        let tree = FileGatherer::new(&path).with_format(Format::Properties).gather().expect("gather");
        assert_eq!(tree, RawTree::from(json!({"port": "1"})));
    }

    #[test]
    fn dir_merges_by_format_then_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("b.yaml"), "name: from-b\nport: 2\n").expect("write");
        fs::write(dir.path().join("a.yaml"), "name: from-a\nport: 1\nhost: h\n").expect("write");
        fs::write(dir.path().join("z.properties"), "name=from-props\nextra=1\n").expect("write");
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write");
        fs::create_dir(dir.path().join("nested")).expect("mkdir");
        fs::write(dir.path().join("nested").join("c.yaml"), "name: nested\n").expect("write");

        let tree = DirGatherer::new(dir.path())
            .with_formats([Format::Properties, Format::Yaml])
            .gather()
            .expect("gather");
        assert_eq!(
            tree,
            RawTree::from(json!({"name": "from-b", "port": 2, "host": "h", "extra": "1"}))
        );
    }

    #[test]
    fn dir_format_order_decides_precedence() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("app.yaml"), "name: yaml\n").expect("write");
        fs::write(dir.path().join("app.json"), r#"{"name": "json"}"#).expect("write");
        let tree = DirGatherer::new(dir.path())
            .with_formats([Format::Yaml, Format::Json])
            .gather()
            .expect("gather");
        assert_eq!(tree, RawTree::from(json!({"name": "json"})));
    }

    #[test]
    fn missing_dir_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tree = DirGatherer::new(dir.path().join("conf.d")).gather().expect("gather");
        assert_eq!(tree, RawTree::empty());
    }

    #[test]
    fn unparsable_file_fails_the_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("bad.json"), "{").expect("write");
        let err = DirGatherer::new(dir.path()).gather().unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }), "{err}");
    }
}
