//! `key = value` properties text
//!
//! Reads the common subset of the Java properties format: `#`/`!` comments,
//! `=`, `:` or whitespace separators, backslash continuations and escapes.
//! Keys are dotted paths and nest on expansion.

use crate::error::MapperError;
use crate::tree::{expand_flat, FieldPath, RawTree, Segment};

pub fn parse(text: &str) -> Result<RawTree, MapperError> {
    let mut pairs = Vec::new();
    let mut lines = text.lines().enumerate();

    while let Some((index, line)) = lines.next() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }

        let mut logical = trimmed.to_string();
        while ends_with_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some((_, next)) => logical.push_str(next.trim_start()),
                None => break,
            }
        }

        let (key, value) = split_entry(&logical);
        let key = unescape(key, index + 1)?;
        let value = unescape(value, index + 1)?;
        pairs.push((key, value));
    }

    Ok(expand_flat(pairs))
}

/// Flatten `tree` into sorted `a.b.c = value` lines.
pub fn write(tree: &RawTree) -> String {
    let mut out = String::new();
    for (path, scalar) in tree.leaves() {
        out.push_str(&escape(&flat_key(&path), true));
        out.push_str(" = ");
        out.push_str(&escape(&scalar.to_text(), false));
        out.push('\n');
    }
    out
}

fn flat_key(path: &FieldPath) -> String {
    path.segments().iter().map(Segment::as_key).collect::<Vec<_>>().join(".")
}

/// An odd number of trailing backslashes continues the line.
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '=' | ':' => return (line[..i].trim_end(), line[i + 1..].trim_start()),
            c if c.is_whitespace() => {
                let rest = line[i..].trim_start();
                let rest = rest.strip_prefix(|c: char| c == '=' || c == ':').unwrap_or(rest);
                return (&line[..i], rest.trim_start());
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(text: &str, line: usize) -> Result<String, MapperError> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let decoded = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32);
                match decoded {
                    Some(c) if hex.len() == 4 => out.push(c),
                    _ => {
                        return Err(MapperError::Properties {
                            line,
                            message: format!("malformed \\u escape `\\u{hex}`"),
                        })
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}

fn escape(text: &str, key: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, ch) in text.chars().enumerate() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '=' | ':' | ' ' if key => {
                out.push('\\');
                out.push(ch);
            }
            ' ' if i == 0 => out.push_str("\\ "),
            '#' | '!' if i == 0 && key => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_separators_comments_and_continuations() {
        let text = "\
# comment
! also a comment
db.url = postgres://localhost/app
db.pool.max: 8
name svc
motd = first \\
       second
empty=
";
        let tree = parse(text).expect("parse");
        assert_eq!(
            tree,
            RawTree::from(json!({
                "db": {"url": "postgres://localhost/app", "pool": {"max": "8"}},
                "name": "svc",
                "motd": "first second",
                "empty": ""
            }))
        );
    }

    #[test]
    fn escapes_decode() {
        let tree = parse("path = C:\\\\temp\\tx\ngreeting = caf\\u00e9\n").expect("parse");
        assert_eq!(tree.get(&FieldPath::parse("path")).and_then(RawTree::as_str), Some("C:\\temp\tx"));
        assert_eq!(tree.get(&FieldPath::parse("greeting")).and_then(RawTree::as_str), Some("café"));
    }

    #[test]
    fn bad_unicode_escape_reports_line() {
        let err = parse("ok = 1\nbad = \\u12\n").unwrap_err();
        assert!(matches!(err, MapperError::Properties { line: 2, .. }), "{err}");
    }

    #[test]
    fn writes_sorted_flat_lines() {
        let tree = RawTree::from(json!({"b": {"x": 1, "y": [true, "two words"]}, "a": "line\nbreak"}));
        assert_eq!(write(&tree), "a = line\\nbreak\nb.x = 1\nb.y.0 = true\nb.y.1 = two words\n");
    }
}
