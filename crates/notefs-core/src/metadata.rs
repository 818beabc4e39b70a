//! Filename codec: the canonical on-disk encoding of note metadata.
//!
//! A note file is named
//!
//! ```text
//! IDENTIFIER[==SIGNATURE]--TITLE-SLUG[__TAG1_TAG2...]EXT
//! ```
//!
//! where `IDENTIFIER` is the creation timestamp `YYYYMMDDTHHMMSS`. Parsing
//! never fails: components that are absent come back empty, and a name
//! without an identifier yields a record whose [`NoteMeta::is_note`] is
//! false.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::defaults::{IDENTIFIER_FORMAT, UNTITLED};
use crate::error::{Error, Result};

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}T\d{6}").unwrap());
static IDENTIFIER_EXACT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}T\d{6}$").unwrap());
static SIGNATURE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"==([^.]*?)(?:--|__|\.|$)").unwrap());
static TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"--([^_.]*)").unwrap());
static TAGS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"__([^.]*)").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\p{Ll}\p{Lo}\p{Nd}]+$").unwrap());

static SLUG_SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_]").unwrap());
static SLUG_STRIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9-]").unwrap());
static HYPHEN_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{2,}").unwrap());
static SIG_SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_-]").unwrap());
static SIG_STRIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9=]").unwrap());
static EQUALS_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"=+").unwrap());

/// Metadata record of one note.
///
/// `identifier` is the primary key: unique among live notes and never
/// changed after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteMeta {
    /// Path of the note file, `None` until the file exists on disk.
    pub path: Option<PathBuf>,
    /// Creation timestamp `YYYYMMDDTHHMMSS`; empty when not a note.
    pub identifier: String,
    /// Optional ordering/context token.
    pub signature: Option<String>,
    /// Free-text title.
    pub title: String,
    /// Ordered lowercase keyword tokens.
    pub tags: Vec<String>,
}

impl NoteMeta {
    /// Create a record that has no file on disk yet.
    pub fn new(identifier: impl Into<String>, title: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            path: None,
            identifier: identifier.into(),
            signature: None,
            title: title.into(),
            tags,
        }
    }

    /// Attach a signature.
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        let signature = signature.into();
        self.signature = if signature.is_empty() {
            None
        } else {
            Some(signature)
        };
        self
    }

    /// Attach a file path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Whether the record carries an identifier.
    pub fn is_note(&self) -> bool {
        !self.identifier.is_empty()
    }

    /// Tags in their wire encoding (comma-joined).
    pub fn keywords(&self) -> String {
        self.tags.join(",")
    }

    /// Path rendered as a string, empty when unset.
    pub fn path_string(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Title for listings, `(untitled)` when empty.
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            UNTITLED
        } else {
            &self.title
        }
    }

    /// One `index` line: `<id> | <title> | <tag,tag>` (no newline).
    pub fn index_line(&self) -> String {
        format!(
            "{} | {} | {}",
            self.identifier,
            self.display_title(),
            self.keywords()
        )
    }

    /// Where the file belongs under the current title and tags: same
    /// directory, extension and signature as the current path. `None` when
    /// the note has no file yet.
    pub fn canonical_path(&self) -> Option<PathBuf> {
        let current = self.path.as_deref()?;
        let mut meta = self.clone();
        if meta.signature.is_none() {
            meta.signature = parse_filename(current).signature;
        }
        let ext = current
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let name = build_filename(&meta, &ext);
        Some(match current.parent() {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        })
    }
}

/// Parse a note file name (the final component of `path`) into metadata.
///
/// The returned record's `path` is set to `path`.
pub fn parse_filename(path: impl AsRef<Path>) -> NoteMeta {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let identifier = IDENTIFIER_RE
        .find(&name)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let signature = SIGNATURE_RE
        .captures(&name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty());

    let title = TITLE_RE
        .captures(&name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace('-', " ").trim().to_string())
        .unwrap_or_default();

    let tags = TAGS_RE
        .captures(&name)
        .and_then(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .split('_')
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    NoteMeta {
        path: Some(path.to_path_buf()),
        identifier,
        signature,
        title,
        tags,
    }
}

/// Build the canonical file name for `meta` with extension `ext` (with dot).
///
/// The title segment is omitted when the title slugs to nothing.
pub fn build_filename(meta: &NoteMeta, ext: &str) -> String {
    let mut name = meta.identifier.clone();

    if let Some(signature) = &meta.signature {
        let signature = slugify_signature(signature);
        if !signature.is_empty() {
            name.push_str("==");
            name.push_str(&signature);
        }
    }

    let slug = slugify(&meta.title);
    if !slug.is_empty() {
        name.push_str("--");
        name.push_str(&slug);
    }

    let tags: Vec<&str> = meta
        .tags
        .iter()
        .map(String::as_str)
        .filter(|t| !t.is_empty())
        .collect();
    if !tags.is_empty() {
        name.push_str("__");
        name.push_str(&tags.join("_"));
    }

    name.push_str(ext);
    name
}

/// Filesystem-safe rendering of a title: lowercase, hyphen-separated,
/// restricted to `[a-z0-9-]`.
pub fn slugify(title: &str) -> String {
    let lower = title.to_lowercase();
    let hyphenated = SLUG_SEPARATOR_RE.replace_all(&lower, "-");
    let stripped = SLUG_STRIP_RE.replace_all(&hyphenated, "");
    let collapsed = HYPHEN_RUN_RE.replace_all(&stripped, "-");
    collapsed.trim_matches('-').to_string()
}

/// Normalize a signature: lowercase, separators become `==`, anything
/// outside `[a-z0-9=]` is dropped and leading/trailing separators trimmed.
pub fn slugify_signature(signature: &str) -> String {
    let lower = signature.to_lowercase();
    let separated = SIG_SEPARATOR_RE.replace_all(&lower, "=");
    let stripped = SIG_STRIP_RE.replace_all(&separated, "");
    let normalized = EQUALS_RUN_RE.replace_all(&stripped, "==");
    normalized.trim_matches('=').to_string()
}

/// Whether `s` is exactly one identifier token.
pub fn is_identifier(s: &str) -> bool {
    IDENTIFIER_EXACT_RE.is_match(s)
}

/// Identifier for a note created at `at`.
pub fn identifier_at(at: NaiveDateTime) -> String {
    at.format(IDENTIFIER_FORMAT).to_string()
}

/// Creation time encoded in an identifier.
pub fn identifier_time(identifier: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(identifier, IDENTIFIER_FORMAT).ok()
}

/// Whether `tag` is a single lowercase word.
pub fn is_valid_tag(tag: &str) -> bool {
    TAG_RE.is_match(tag)
}

/// Parse the wire encoding of tags (`a,b,c`). An empty string clears tags.
pub fn parse_keywords(keywords: &str) -> Result<Vec<String>> {
    let keywords = keywords.trim();
    if keywords.is_empty() {
        return Ok(Vec::new());
    }
    keywords
        .split(',')
        .map(|tag| {
            if is_valid_tag(tag) {
                Ok(tag.to_string())
            } else {
                Err(Error::InvalidNote(format!(
                    "tag '{}' must be a single lowercase word",
                    tag
                )))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_canonical_path_follows_title_and_tags() {
        let mut meta = parse_filename("/n/20240102T030405==a1--draft.org");
        meta.title = "Trip Notes".to_string();
        meta.tags = vec!["work".to_string()];
        assert_eq!(
            meta.canonical_path(),
            Some(PathBuf::from("/n/20240102T030405==a1--trip-notes__work.org"))
        );
        assert_eq!(NoteMeta::new("20240102T030405", "x", vec![]).canonical_path(), None);
    }

    #[test]
    fn test_parse_full_filename() {
        let meta =
            parse_filename("/notes/20240102T030405==a1==b--trip-report__work_travel.md");
        assert_eq!(meta.identifier, "20240102T030405");
        assert_eq!(meta.signature.as_deref(), Some("a1==b"));
        assert_eq!(meta.title, "trip report");
        assert_eq!(meta.tags, vec!["work", "travel"]);
        assert_eq!(
            meta.path.as_deref(),
            Some(Path::new("/notes/20240102T030405==a1==b--trip-report__work_travel.md"))
        );
    }

    #[test]
    fn test_parse_without_signature_or_tags() {
        let meta = parse_filename("20240102T030405--plain-title.org");
        assert_eq!(meta.identifier, "20240102T030405");
        assert!(meta.signature.is_none());
        assert_eq!(meta.title, "plain title");
        assert!(meta.tags.is_empty());
    }

    #[test]
    fn test_parse_signature_before_tags() {
        let meta = parse_filename("20240102T030405==x__solo.txt");
        assert_eq!(meta.signature.as_deref(), Some("x"));
        assert_eq!(meta.title, "");
        assert_eq!(meta.tags, vec!["solo"]);
    }

    #[test]
    fn test_parse_non_note_yields_empty_identifier() {
        let meta = parse_filename("README.md");
        assert!(!meta.is_note());
        assert_eq!(meta.identifier, "");
    }

    #[test]
    fn test_parse_ignores_directory_components() {
        let meta = parse_filename("/home/u/a--b__c/20240102T030405--x.md");
        assert_eq!(meta.title, "x");
        assert!(meta.tags.is_empty());
    }

    #[test]
    fn test_build_filename() {
        let meta = NoteMeta::new("20240102T030405", "Trip Report", vec!["work".into(), "travel".into()])
            .with_signature("A b");
        assert_eq!(
            build_filename(&meta, ".md"),
            "20240102T030405==a==b--trip-report__work_travel.md"
        );
    }

    #[test]
    fn test_build_filename_empty_title_omits_segment() {
        let meta = NoteMeta::new("20240102T030405", "!!!", vec!["x".into()]);
        assert_eq!(build_filename(&meta, ".txt"), "20240102T030405__x.txt");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Trip Report"), "trip-report");
        assert_eq!(slugify("snake_case title"), "snake-case-title");
        assert_eq!(slugify("  What? Why!  "), "what-why");
        assert_eq!(slugify("a - b"), "a-b");
        assert_eq!(slugify("Café"), "caf");
    }

    #[test]
    fn test_slugify_signature() {
        assert_eq!(slugify_signature("A b"), "a==b");
        assert_eq!(slugify_signature("1===2"), "1==2");
        assert_eq!(slugify_signature("x_y-z"), "x==y==z");
        assert_eq!(slugify_signature("trail=="), "trail");
        assert_eq!(slugify_signature("a!@#b"), "ab");
    }

    #[test]
    fn test_identifier_round_trip() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 8, 9)
            .unwrap();
        let id = identifier_at(at);
        assert_eq!(id, "20240309T070809");
        assert!(is_identifier(&id));
        assert_eq!(identifier_time(&id), Some(at));
        assert!(!is_identifier("20240309T0708"));
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(parse_keywords("work,travel").unwrap(), vec!["work", "travel"]);
        assert_eq!(parse_keywords("café,日本").unwrap(), vec!["café", "日本"]);
        assert!(parse_keywords("").unwrap().is_empty());
        assert!(parse_keywords("Work").is_err());
        assert!(parse_keywords("two words").is_err());
        assert!(parse_keywords("a,,b").is_err());
    }

    #[test]
    fn test_index_line() {
        let meta = NoteMeta::new("20240102T030405", "", vec!["a".into(), "b".into()]);
        assert_eq!(meta.index_line(), "20240102T030405 | (untitled) | a,b");
    }
}
