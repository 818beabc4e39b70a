//! Front-matter codec: the metadata block at the top of a note's content.
//!
//! Four dialects are supported, each with a fixed five-field template
//! (title, date, tags, identifier, signature):
//!
//! | Dialect | Extension | Block | Tags |
//! |---------|-----------|-------|------|
//! | `org` | `.org` | `#+key:` lines | `:a:b:` |
//! | `md-yaml` | `.md` | `---` fenced | `[a, b]` |
//! | `md-toml` | `.md` | `+++` fenced | `["a", "b"]` |
//! | `txt` | `.txt` | `key:` lines closed by a dash rule | `a b` |
//!
//! Absent fields parse as empty values; an empty tag list is rendered as an
//! empty field rather than omitted.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::metadata::{identifier_time, NoteMeta};

/// Note content dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// Org mode (`#+title:` keywords).
    Org,
    /// Markdown with a YAML block.
    MarkdownYaml,
    /// Markdown with a TOML block.
    MarkdownToml,
    /// Plain text.
    Text,
}

impl FileType {
    /// File extension (with dot) used for this dialect.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Org => ".org",
            Self::MarkdownYaml | Self::MarkdownToml => ".md",
            Self::Text => ".txt",
        }
    }

    /// Dialect for an extension, with or without the leading dot.
    ///
    /// `.md` maps to [`FileType::MarkdownYaml`]; use [`FileType::detect`]
    /// to tell YAML and TOML apart from content.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "org" => Some(Self::Org),
            "md" => Some(Self::MarkdownYaml),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }

    /// Dialect of `content` stored with extension `ext`.
    ///
    /// Markdown is checked for a YAML block first, then a TOML block, and
    /// defaults to YAML when neither is present.
    pub fn detect(content: &str, ext: &str) -> Result<Self> {
        match Self::from_extension(ext) {
            Some(Self::MarkdownYaml) => {
                if YAML.block.is_match(content) {
                    Ok(Self::MarkdownYaml)
                } else if TOML.block.is_match(content) {
                    Ok(Self::MarkdownToml)
                } else {
                    Ok(Self::MarkdownYaml)
                }
            }
            Some(file_type) => Ok(file_type),
            None => Err(Error::UnsupportedFileType(ext.to_string())),
        }
    }

    fn dialect(self) -> &'static Dialect {
        match self {
            Self::Org => &*ORG,
            Self::MarkdownYaml => &*YAML,
            Self::MarkdownToml => &*TOML,
            Self::Text => &*TEXT,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Org => write!(f, "org"),
            Self::MarkdownYaml => write!(f, "md-yaml"),
            Self::MarkdownToml => write!(f, "md-toml"),
            Self::Text => write!(f, "txt"),
        }
    }
}

impl FromStr for FileType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "org" => Ok(Self::Org),
            "md-yaml" => Ok(Self::MarkdownYaml),
            "md-toml" => Ok(Self::MarkdownToml),
            "txt" => Ok(Self::Text),
            other => Err(Error::UnsupportedFileType(other.to_string())),
        }
    }
}

/// Regular expressions recognising one dialect.
struct Dialect {
    /// Whole block at the start of the content, including trailing blank lines.
    block: Regex,
    title: Regex,
    tags: Regex,
    identifier: Regex,
    signature: Regex,
}

impl Dialect {
    fn new(block: &str, key: fn(&str) -> String) -> Self {
        let field = |name: &str| {
            Regex::new(&format!(r"(?m){}[ \t]*(.*?)[ \t]*$", key(name))).unwrap()
        };
        Self {
            block: Regex::new(block).unwrap(),
            title: field("title"),
            tags: field("tags"),
            identifier: field("identifier"),
            signature: field("signature"),
        }
    }

    fn capture<'a>(re: &Regex, block: &'a str) -> &'a str {
        re.captures(block)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or("")
    }
}

static ORG: Lazy<Dialect> = Lazy::new(|| {
    Dialect::new(
        r"(?i)\A(?:#\+(?:title|date|filetags|identifier|signature):[^\n]*(?:\n|\z))+\n*",
        |name| {
            let name = if name == "tags" { "filetags" } else { name };
            format!(r"(?i)^#\+{}:", name)
        },
    )
});

static YAML: Lazy<Dialect> = Lazy::new(|| {
    Dialect::new(r"(?ms)\A---[ \t]*\n.*?^---[ \t]*$\n*", |name| {
        format!("^{}:", name)
    })
});

static TOML: Lazy<Dialect> = Lazy::new(|| {
    Dialect::new(r"(?ms)\A\+\+\+[ \t]*\n.*?^\+\+\+[ \t]*$\n*", |name| {
        format!("^{}[ \t]*=", name)
    })
});

static TEXT: Lazy<Dialect> = Lazy::new(|| {
    Dialect::new(
        r"\Atitle:[^\n]*(?:\n|\z)(?:[A-Za-z_]+:[^\n]*(?:\n|\z))*(?:-{3,}[ \t]*(?:\n|\z))?\n*",
        |name| format!("^{}:", name),
    )
});

/// Rule closing a plain-text block.
const TEXT_RULE: &str = "---------------------------";

/// Structured contents of a front-matter block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontMatter {
    pub title: String,
    pub tags: Vec<String>,
    pub identifier: String,
    pub signature: Option<String>,
    pub file_type: FileType,
}

impl FrontMatter {
    /// Front matter carrying the metadata of `meta` in dialect `file_type`.
    pub fn from_meta(meta: &NoteMeta, file_type: FileType) -> Self {
        Self {
            title: meta.title.clone(),
            tags: meta.tags.clone(),
            identifier: meta.identifier.clone(),
            signature: meta.signature.clone(),
            file_type,
        }
    }

    /// Parse the block at the start of `content`, stored with extension `ext`.
    ///
    /// Content without a block yields empty fields.
    pub fn unmarshal(content: &str, ext: &str) -> Result<Self> {
        let file_type = FileType::detect(content, ext)?;
        let dialect = file_type.dialect();
        let block = dialect
            .block
            .find(content)
            .map(|m| m.as_str())
            .unwrap_or("");

        let title = unquote(Dialect::capture(&dialect.title, block));
        let raw_tags = Dialect::capture(&dialect.tags, block);
        let tags: Vec<String> = match file_type {
            FileType::Org => raw_tags
                .split(':')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            FileType::MarkdownYaml | FileType::MarkdownToml => parse_list(raw_tags),
            FileType::Text => raw_tags.split_whitespace().map(str::to_string).collect(),
        };
        let identifier = unquote(Dialect::capture(&dialect.identifier, block));
        let signature = unquote(Dialect::capture(&dialect.signature, block));

        Ok(Self {
            title,
            tags,
            identifier,
            signature: if signature.is_empty() {
                None
            } else {
                Some(signature)
            },
            file_type,
        })
    }

    /// Render the five-field block, followed by one blank line.
    pub fn marshal(&self) -> String {
        let signature = self.signature.as_deref().unwrap_or("");
        let title = self.title.replace(['\n', '\r'], " ");
        match self.file_type {
            FileType::Org => format!(
                "#+title:      {}\n#+date:       {}\n#+filetags:   {}\n#+identifier: {}\n#+signature:  {}\n\n",
                title,
                self.date("[%Y-%m-%d %a %H:%M]"),
                if self.tags.is_empty() {
                    String::new()
                } else {
                    format!(":{}:", self.tags.join(":"))
                },
                self.identifier,
                signature,
            ),
            FileType::MarkdownYaml => format!(
                "---\ntitle:      {}\ndate:       {}\ntags:       [{}]\nidentifier: {}\nsignature:  {}\n---\n\n",
                quote(&title),
                self.date("%Y-%m-%dT%H:%M:%S"),
                self.tags.join(", "),
                quote(&self.identifier),
                quote(signature),
            ),
            FileType::MarkdownToml => format!(
                "+++\ntitle      = {}\ndate       = {}\ntags       = [{}]\nidentifier = {}\nsignature  = {}\n+++\n\n",
                quote(&title),
                self.date("%Y-%m-%dT%H:%M:%S"),
                self.tags
                    .iter()
                    .map(|t| quote(t))
                    .collect::<Vec<_>>()
                    .join(", "),
                quote(&self.identifier),
                quote(signature),
            ),
            FileType::Text => format!(
                "title:      {}\ndate:       {}\ntags:       {}\nidentifier: {}\nsignature:  {}\n{}\n\n",
                title,
                self.date("%Y-%m-%d"),
                self.tags.join(" "),
                self.identifier,
                signature,
                TEXT_RULE,
            ),
        }
    }

    /// Replace the block at the start of `original` with this front matter,
    /// or prepend one when there is none.
    ///
    /// Everything after the existing block (and its trailing blank lines) is
    /// kept byte for byte. When prepending, leading blank lines of
    /// `original` are dropped so that applying twice equals applying once.
    pub fn apply(&self, original: &str) -> String {
        let block = self.marshal();
        match self.file_type.dialect().block.find(original) {
            Some(existing) => format!("{}{}", block, &original[existing.end()..]),
            None => format!("{}{}", block, original.trim_start_matches(['\n', '\r'])),
        }
    }

    /// Metadata carried by this block, without a path.
    pub fn to_meta(&self) -> NoteMeta {
        NoteMeta {
            path: None,
            identifier: self.identifier.clone(),
            signature: self.signature.clone(),
            title: self.title.clone(),
            tags: self.tags.clone(),
        }
    }

    fn date(&self, format: &str) -> String {
        identifier_time(&self.identifier)
            .map(|at| at.format(format).to_string())
            .unwrap_or_default()
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1]
            .replace("\\\"", "\"")
            .replace("\\\\", "\\")
    } else if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        value[1..value.len() - 1].replace("''", "'")
    } else {
        value.to_string()
    }
}

fn parse_list(value: &str) -> Vec<String> {
    let inner = value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']');
    inner
        .split(',')
        .map(unquote)
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(file_type: FileType) -> FrontMatter {
        FrontMatter {
            title: "Trip Report".to_string(),
            tags: vec!["work".to_string(), "travel".to_string()],
            identifier: "20240102T030405".to_string(),
            signature: Some("a1".to_string()),
            file_type,
        }
    }

    #[test]
    fn test_marshal_org() {
        let text = sample(FileType::Org).marshal();
        assert_eq!(
            text,
            "#+title:      Trip Report\n#+date:       [2024-01-02 Tue 03:04]\n#+filetags:   :work:travel:\n#+identifier: 20240102T030405\n#+signature:  a1\n\n"
        );
    }

    #[test]
    fn test_marshal_yaml() {
        let text = sample(FileType::MarkdownYaml).marshal();
        assert!(text.starts_with("---\ntitle:      \"Trip Report\"\n"));
        assert!(text.contains("date:       2024-01-02T03:04:05\n"));
        assert!(text.contains("tags:       [work, travel]\n"));
        assert!(text.ends_with("signature:  \"a1\"\n---\n\n"));
    }

    #[test]
    fn test_marshal_toml_quotes_tags() {
        let text = sample(FileType::MarkdownToml).marshal();
        assert!(text.starts_with("+++\n"));
        assert!(text.contains("tags       = [\"work\", \"travel\"]\n"));
        assert!(text.ends_with("+++\n\n"));
    }

    #[test]
    fn test_marshal_text() {
        let text = sample(FileType::Text).marshal();
        assert!(text.contains("tags:       work travel\n"));
        assert!(text.contains("date:       2024-01-02\n"));
        assert!(text.contains(&format!("{}\n\n", TEXT_RULE)));
    }

    #[test]
    fn test_empty_tags_render_empty_field() {
        let mut fm = sample(FileType::Org);
        fm.tags.clear();
        assert!(fm.marshal().contains("#+filetags:   \n"));
        fm.file_type = FileType::MarkdownYaml;
        assert!(fm.marshal().contains("tags:       []\n"));
        fm.file_type = FileType::Text;
        assert!(fm.marshal().contains("tags:       \n"));
    }

    #[test]
    fn test_unmarshal_each_dialect() {
        for (file_type, ext) in [
            (FileType::Org, ".org"),
            (FileType::MarkdownYaml, ".md"),
            (FileType::MarkdownToml, ".md"),
            (FileType::Text, ".txt"),
        ] {
            let fm = sample(file_type);
            let content = format!("{}Body text.\n", fm.marshal());
            let parsed = FrontMatter::unmarshal(&content, ext).unwrap();
            assert_eq!(parsed, fm, "dialect {}", file_type);
        }
    }

    #[test]
    fn test_unmarshal_empty_signature_is_none() {
        let mut fm = sample(FileType::Org);
        fm.signature = None;
        let parsed = FrontMatter::unmarshal(&fm.marshal(), ".org").unwrap();
        assert!(parsed.signature.is_none());
        assert_eq!(parsed.identifier, "20240102T030405");
    }

    #[test]
    fn test_unmarshal_uppercase_org_keywords() {
        let content = "#+TITLE: Loud\n#+FILETAGS: :a:b:\n\nbody\n";
        let parsed = FrontMatter::unmarshal(content, "org").unwrap();
        assert_eq!(parsed.title, "Loud");
        assert_eq!(parsed.tags, vec!["a", "b"]);
    }

    #[test]
    fn test_unmarshal_without_block_is_empty() {
        let parsed = FrontMatter::unmarshal("# Heading\n\ntext\n", ".md").unwrap();
        assert_eq!(parsed.file_type, FileType::MarkdownYaml);
        assert!(parsed.title.is_empty());
        assert!(parsed.tags.is_empty());
    }

    #[test]
    fn test_unmarshal_accepts_quoted_yaml_list() {
        let content = "---\ntitle: 'It''s'\ntags: [\"x\", 'y']\n---\n";
        let parsed = FrontMatter::unmarshal(content, ".md").unwrap();
        assert_eq!(parsed.title, "It's");
        assert_eq!(parsed.tags, vec!["x", "y"]);
    }

    #[test]
    fn test_detect_markdown_dialects() {
        assert_eq!(
            FileType::detect("+++\ntitle = \"x\"\n+++\n", ".md").unwrap(),
            FileType::MarkdownToml
        );
        assert_eq!(
            FileType::detect("---\ntitle: x\n---\n", ".md").unwrap(),
            FileType::MarkdownYaml
        );
        assert!(matches!(
            FileType::detect("", ".rst"),
            Err(Error::UnsupportedFileType(_))
        ));
    }

    #[test]
    fn test_apply_replaces_existing_block() {
        let old = sample(FileType::MarkdownYaml);
        let content = format!("{}\n\n# Body\n\nkeep  me\n", old.marshal());
        let mut new = old.clone();
        new.title = "Renamed".to_string();
        let applied = new.apply(&content);
        assert_eq!(applied, format!("{}# Body\n\nkeep  me\n", new.marshal()));
    }

    #[test]
    fn test_apply_prepends_when_missing() {
        let fm = sample(FileType::Text);
        let applied = fm.apply("\n\nplain body");
        assert_eq!(applied, format!("{}plain body", fm.marshal()));
    }

    #[test]
    fn test_apply_does_not_eat_org_body_keywords() {
        let fm = sample(FileType::Org);
        let content = "#+begin_src sh\necho hi\n#+end_src\n";
        let applied = fm.apply(content);
        assert!(applied.ends_with(content));
    }

    #[test]
    fn test_apply_keeps_org_directives_after_header() {
        let fm = sample(FileType::Org);
        let content = "#+title: Draft\n#+begin_src sh\necho hi\n#+end_src\n";
        let applied = fm.apply(content);
        assert_eq!(
            applied,
            format!("{}#+begin_src sh\necho hi\n#+end_src\n", fm.marshal())
        );
        assert_eq!(fm.apply(&applied), applied);
    }

    #[test]
    fn test_apply_text_block_stops_at_blank_line() {
        let fm = sample(FileType::Text);
        let content = "title: Draft\n\nfirst paragraph\n\n---\nlater\n";
        let applied = fm.apply(content);
        assert_eq!(
            applied,
            format!("{}first paragraph\n\n---\nlater\n", fm.marshal())
        );
        assert_eq!(fm.apply(&applied), applied);
    }

    #[test]
    fn test_title_with_quotes_round_trips() {
        let mut fm = sample(FileType::MarkdownToml);
        fm.title = r#"Say "hi" \ bye"#.to_string();
        let parsed = FrontMatter::unmarshal(&fm.marshal(), ".md").unwrap();
        assert_eq!(parsed.title, fm.title);
    }

    #[test]
    fn test_file_type_display_from_str() {
        for file_type in [
            FileType::Org,
            FileType::MarkdownYaml,
            FileType::MarkdownToml,
            FileType::Text,
        ] {
            assert_eq!(file_type.to_string().parse::<FileType>().unwrap(), file_type);
        }
        assert_eq!(FileType::from_extension("TXT"), Some(FileType::Text));
        assert_eq!(FileType::from_extension(".pdf"), None);
    }
}
