//! File classification
//!
//! Classification happens in two steps. [`SkipRules`] decides from the path
//! alone whether a file is considered at all; skip-listed files never reach
//! the offset store. [`detect`] then peeks at the file's bytes and returns the
//! first format, in a fixed order, whose structural check accepts them.

use std::path::Path;

use crate::readers::{self, IncrementalReader};

/// Formats the forwarder can classify a file as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    Json,
    Csv,
    PlaintextLog,
    Gzip,
    Unsupported,
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileFormat::Json => write!(f, "json"),
            FileFormat::Csv => write!(f, "csv"),
            FileFormat::PlaintextLog => write!(f, "log"),
            FileFormat::Gzip => write!(f, "gzip"),
            FileFormat::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Case-insensitive file-name suffix and prefix exclusions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipRules {
    extensions: Vec<String>,
    prefixes: Vec<String>,
}

impl SkipRules {
    pub fn new<S: AsRef<str>>(extensions: &[S], prefixes: &[S]) -> Self {
        let normalize = |items: &[S]| {
            items
                .iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };

        Self {
            extensions: normalize(extensions),
            prefixes: normalize(prefixes),
        }
    }

    /// Whether `path` is excluded before any read attempt
    ///
    /// Extensions are matched as plain suffixes of the file name, so `py`
    /// matches `script.py` as well as `happy`.
    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy().to_lowercase();

        self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
            || self.prefixes.iter().any(|prefix| name.starts_with(prefix.as_str()))
    }
}

impl Default for SkipRules {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_SKIP_EXTENSIONS,
            crate::config::DEFAULT_SKIP_PREFIXES,
        )
    }
}

/// Classify file content
///
/// The order is JSON, CSV, plaintext log, gzip. It must not change: a JSON
/// document or a CSV table is also line-oriented text.
pub fn detect(content: &[u8]) -> FileFormat {
    readers::ordered()
        .iter()
        .find(|reader| reader.accepts(content))
        .map_or(FileFormat::Unsupported, |reader| reader.format())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_default_skip_rules() {
        let rules = SkipRules::default();
        assert!(rules.matches(Path::new("/srv/tool.EXE")));
        assert!(rules.matches(Path::new("/srv/module.pyc")));
        assert!(rules.matches(Path::new("/srv/script.py")));
        assert!(rules.matches(Path::new("/srv/__init__")));
        assert!(rules.matches(Path::new("/srv/__private.log")));
        assert!(!rules.matches(Path::new("/srv/__pycache__/app.log")));
        assert!(!rules.matches(Path::new("/srv/app.log")));
    }

    #[test]
    fn test_custom_skip_rules() {
        let rules = SkipRules::new(&["tmp"], &[".", "Draft"]);
        assert!(rules.matches(Path::new("/a/file.TMP")));
        assert!(rules.matches(Path::new("/a/.hidden")));
        assert!(rules.matches(Path::new("/a/draft-notes.log")));
        assert!(!rules.matches(Path::new("/a/file.exe")));
    }

    #[test]
    fn test_detect_order() {
        assert_eq!(detect(br#"[{"a": 1}, {"a": 2}]"#), FileFormat::Json);
        assert_eq!(detect(b"{\"a\":1}\n{\"a\":2}\n"), FileFormat::Json);
        assert_eq!(detect(b"ip,msg\n8.8.8.8,test\n"), FileFormat::Csv);
        assert_eq!(detect(b"started server\nlistening\n"), FileFormat::PlaintextLog);
        assert_eq!(detect(&gzip(b"hello\n")), FileFormat::Gzip);
        assert_eq!(detect(&[0x00, 0xff, 0xfe, 0x00]), FileFormat::Unsupported);
    }

    #[test]
    fn test_empty_file_is_plaintext() {
        assert_eq!(detect(b""), FileFormat::PlaintextLog);
    }
}
