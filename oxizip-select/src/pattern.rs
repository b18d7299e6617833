//! Wildcard name patterns.
//!
//! Only `*` and `?` are special; every other character (including `[` and
//! `]`) is literal. Matching is case-insensitive. A pattern that contains a
//! path separator is matched against the whole path, otherwise against the
//! final path component.

use glob::{MatchOptions, Pattern};
use oxizip_core::error::{OxiZipError, Result};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// A compiled name pattern.
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    compiled: Pattern,
    whole_path: bool,
}

impl NamePattern {
    /// Compile a wildcard pattern.
    pub fn new(source: &str) -> Result<Self> {
        let unified = source.replace('\\', "/");
        let whole_path = unified.trim_end_matches('/').contains('/');
        let trimmed = unified.trim_end_matches('/');

        let mut escaped = String::with_capacity(trimmed.len());
        for c in trimmed.chars() {
            match c {
                '[' => escaped.push_str("[[]"),
                ']' => escaped.push_str("[]]"),
                _ => escaped.push(c),
            }
        }

        let compiled = Pattern::new(&escaped)
            .map_err(|e| OxiZipError::parse(format!("bad name pattern {source:?}: {e}"), 0))?;

        Ok(Self {
            source: source.to_string(),
            compiled,
            whole_path,
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a forward-slash path (a trailing `/` is ignored).
    pub fn matches(&self, path: &str) -> bool {
        let path = path.trim_end_matches('/');
        if self.whole_path {
            self.compiled.matches_with(path, MATCH_OPTIONS)
        } else {
            let file_name = path.rsplit('/').next().unwrap_or(path);
            self.compiled.matches_with(file_name, MATCH_OPTIONS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension() {
        let p = NamePattern::new("*.txt").unwrap();
        assert!(p.matches("readme.txt"));
        assert!(p.matches("docs/README.TXT"));
        assert!(!p.matches("readme.txt.bak"));
    }

    #[test]
    fn test_question_mark() {
        let p = NamePattern::new("file?.bin").unwrap();
        assert!(p.matches("a/file1.bin"));
        assert!(!p.matches("a/file10.bin"));
    }

    #[test]
    fn test_whole_path() {
        let p = NamePattern::new("docs/*.md").unwrap();
        assert!(p.matches("docs/intro.md"));
        assert!(!p.matches("src/intro.md"));

        let p = NamePattern::new("*\\sub\\*").unwrap();
        assert!(p.matches("root/sub/file"));
    }

    #[test]
    fn test_brackets_are_literal() {
        let p = NamePattern::new("[draft]*.doc").unwrap();
        assert!(p.matches("[draft] notes.doc"));
        assert!(!p.matches("d notes.doc"));
    }

    #[test]
    fn test_directory_names() {
        let p = NamePattern::new("Directory1").unwrap();
        assert!(p.matches("Directory1/"));
        assert!(p.matches("parent/directory1/"));
    }
}
