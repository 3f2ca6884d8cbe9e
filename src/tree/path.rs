//! Field paths into a parameter tree

use std::fmt;
use std::str::FromStr;

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    /// Returns true when both segments address the same child.
    ///
    /// Flat-key sources produce mapping keys such as `"0"` where the typed
    /// object has a sequence index, so `Key("0")` matches `Index(0)`.
    pub fn matches(&self, other: &Segment) -> bool {
        match (self, other) {
            (Segment::Key(a), Segment::Key(b)) => a == b,
            (Segment::Index(a), Segment::Index(b)) => a == b,
            (Segment::Key(key), Segment::Index(index))
            | (Segment::Index(index), Segment::Key(key)) => key.parse::<usize>() == Ok(*index),
        }
    }

    /// The segment as a mapping key.
    pub fn as_key(&self) -> String {
        match self {
            Segment::Key(key) => key.clone(),
            Segment::Index(index) => index.to_string(),
        }
    }
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Segment::Key(key.to_string())
    }
}

impl From<String> for Segment {
    fn from(key: String) -> Self {
        Segment::Key(key)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

/// A location in a parameter tree or object graph, e.g. `db.replicas[1].password`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Parse a dotted path. `a.b.0`, `a.b[0]` and `a."dotted.key"` are accepted.
    pub fn parse(text: &str) -> Self {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = text.chars().peekable();
        let mut quoted = false;
        let mut pending = false;

        while let Some(ch) = chars.next() {
            match ch {
                '"' => {
                    quoted = !quoted;
                    pending = true;
                }
                '.' if !quoted => {
                    if pending || !current.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut current)));
                    }
                    pending = false;
                }
                '[' if !quoted => {
                    if pending || !current.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut current)));
                    }
                    pending = false;
                    let mut index = String::new();
                    for next in chars.by_ref() {
                        if next == ']' {
                            break;
                        }
                        index.push(next);
                    }
                    match index.trim().parse::<usize>() {
                        Ok(i) => segments.push(Segment::Index(i)),
                        Err(_) => segments.push(Segment::Key(index)),
                    }
                }
                _ => current.push(ch),
            }
        }
        if pending || !current.is_empty() {
            segments.push(Segment::Key(current));
        }
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn push(&mut self, segment: impl Into<Segment>) {
        self.segments.push(segment.into());
    }

    pub fn pop(&mut self) -> Option<Segment> {
        self.segments.pop()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// A new path with `segment` appended.
    pub fn child(&self, segment: impl Into<Segment>) -> Self {
        let mut child = self.clone();
        child.push(segment);
        child
    }

    pub fn parent(&self) -> Option<FieldPath> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self { segments: self.segments[..self.segments.len() - 1].to_vec() })
    }

    /// Returns true if `self` addresses `other` or one of its ancestors.
    pub fn is_prefix_of(&self, other: &FieldPath) -> bool {
        self.segments.len() <= other.segments.len()
            && self.segments.iter().zip(&other.segments).all(|(a, b)| a.matches(b))
    }

    /// Segment-wise equality using [`Segment::matches`].
    pub fn matches(&self, other: &FieldPath) -> bool {
        self.segments.len() == other.segments.len() && self.is_prefix_of(other)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("<root>");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Index(index) => write!(f, "[{index}]")?,
                Segment::Key(key) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    if key.contains('.') || key.contains('[') || key.is_empty() {
                        write!(f, "\"{key}\"")?;
                    } else {
                        f.write_str(key)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(FieldPath::parse(s))
    }
}

impl From<Vec<Segment>> for FieldPath {
    fn from(segments: Vec<Segment>) -> Self {
        Self { segments }
    }
}

impl<'a> FromIterator<&'a str> for FieldPath {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self { segments: iter.into_iter().map(Segment::from).collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dotted_and_indexed_paths() {
        let path = FieldPath::parse("db.replicas[1].password");
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("db".into()),
                Segment::Key("replicas".into()),
                Segment::Index(1),
                Segment::Key("password".into()),
            ]
        );
        assert_eq!(path.to_string(), "db.replicas[1].password");
    }

    #[test]
    fn quoted_segments_keep_dots() {
        let path = FieldPath::parse("labels.\"app.kubernetes.io/name\"");
        assert_eq!(path.len(), 2);
        assert_eq!(path.segments()[1], Segment::Key("app.kubernetes.io/name".into()));
        assert_eq!(path.to_string(), "labels.\"app.kubernetes.io/name\"");
    }

    #[test]
    fn numeric_key_matches_index() {
        let flat = FieldPath::parse("servers.0.token");
        let typed = FieldPath::parse("servers[0].token");
        assert_ne!(flat, typed);
        assert!(flat.matches(&typed));
        assert!(FieldPath::parse("servers").is_prefix_of(&typed));
        assert!(!FieldPath::parse("servers[1]").is_prefix_of(&typed));
    }

    #[test]
    fn root_displays_placeholder() {
        assert_eq!(FieldPath::root().to_string(), "<root>");
        assert!(FieldPath::parse("").is_root());
    }
}
