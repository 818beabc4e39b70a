//! Query filter language and listing order.
//!
//! A query is a space-separated list of filters, all of which must match:
//!
//! ```text
//! [!][field:]pattern      field ∈ {date, title, tag}, omitted = any field
//! ```
//!
//! `pattern` is either `/regex/`, used verbatim, or a literal (quoted with
//! `'…'` or `"…"` when it contains spaces) matched as a case-insensitive
//! substring.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::metadata::NoteMeta;

static FIELD_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^([A-Za-z]+):(.*)$").unwrap());

/// Metadata field a filter inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    /// The identifier (creation timestamp).
    Date,
    Title,
    /// Any single tag.
    Tag,
    /// Identifier, title or any tag.
    Any,
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date => write!(f, "date"),
            Self::Title => write!(f, "title"),
            Self::Tag => write!(f, "tag"),
            Self::Any => write!(f, "any"),
        }
    }
}

impl FromStr for FilterField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "date" => Ok(Self::Date),
            "title" => Ok(Self::Title),
            "tag" => Ok(Self::Tag),
            other => Err(Error::InvalidFilterSyntax(format!(
                "unknown field '{}' (expected date, title or tag)",
                other
            ))),
        }
    }
}

/// One compiled filter.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: FilterField,
    pub pattern: Regex,
    pub negate: bool,
}

impl Filter {
    /// Parse a single `[!][field:]pattern` token.
    pub fn parse(arg: &str) -> Result<Self> {
        let arg = arg.trim();
        if arg.is_empty() {
            return Err(Error::InvalidFilterSyntax("empty filter".to_string()));
        }

        let (negate, rest) = match arg.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, arg),
        };

        let (field, text) = match FIELD_PREFIX_RE.captures(rest) {
            Some(caps) => {
                let field = caps[1].parse::<FilterField>()?;
                let text = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                (field, text)
            }
            None => (FilterField::Any, rest),
        };

        let pattern = compile_pattern(text)?;
        Ok(Self {
            field,
            pattern,
            negate,
        })
    }

    /// Whether `meta` passes this filter.
    pub fn matches(&self, meta: &NoteMeta) -> bool {
        let hit = match self.field {
            FilterField::Date => self.pattern.is_match(&meta.identifier),
            FilterField::Title => self.pattern.is_match(&meta.title),
            FilterField::Tag => meta.tags.iter().any(|t| self.pattern.is_match(t)),
            FilterField::Any => {
                self.pattern.is_match(&meta.identifier)
                    || self.pattern.is_match(&meta.title)
                    || meta.tags.iter().any(|t| self.pattern.is_match(t))
            }
        };
        hit != self.negate
    }
}

fn compile_pattern(text: &str) -> Result<Regex> {
    if text.is_empty() {
        return Err(Error::InvalidFilterSyntax("empty pattern".to_string()));
    }

    if text.len() >= 2 && text.starts_with('/') && text.ends_with('/') {
        let inner = &text[1..text.len() - 1];
        if inner.is_empty() {
            return Err(Error::InvalidFilterSyntax("empty pattern".to_string()));
        }
        return Ok(Regex::new(inner)?);
    }

    let literal = match text.chars().next() {
        Some(q @ ('\'' | '"')) => {
            if text.len() < 2 || !text.ends_with(q) {
                return Err(Error::InvalidFilterSyntax(format!(
                    "unbalanced quote in {}",
                    text
                )));
            }
            &text[1..text.len() - 1]
        }
        _ => text,
    };
    if literal.is_empty() {
        return Err(Error::InvalidFilterSyntax("empty pattern".to_string()));
    }
    Ok(Regex::new(&format!("(?i){}", regex::escape(literal)))?)
}

/// Split a query into filter tokens on whitespace outside quotes.
///
/// Quotes are kept in the tokens so [`Filter::parse`] can tell a quoted
/// literal from a bare one.
pub fn split_query(query: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in query.chars() {
        match (quote, c) {
            (None, c) if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            (None, '\'' | '"') => {
                quote = Some(c);
                current.push(c);
            }
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (_, c) => current.push(c),
        }
    }

    if quote.is_some() {
        return Err(Error::InvalidFilterSyntax(format!(
            "unbalanced quote in query: {}",
            query
        )));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Parse a full query into AND-combined filters. An empty query yields no
/// filters.
pub fn parse_query(query: &str) -> Result<Vec<Filter>> {
    split_query(query)?
        .iter()
        .map(|token| Filter::parse(token))
        .collect()
}

/// Whether `meta` passes every filter.
pub fn matches_all(filters: &[Filter], meta: &NoteMeta) -> bool {
    filters.iter().all(|f| f.matches(meta))
}

/// Key notes are listed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    /// Identifier order, which is creation order.
    #[default]
    Identifier,
    /// Case-folded title.
    Title,
}

/// Listing order. Defaults to newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub field: SortField,
    pub descending: bool,
}

impl Default for SortOrder {
    fn default() -> Self {
        Self {
            field: SortField::Identifier,
            descending: true,
        }
    }
}

impl SortOrder {
    /// Parse `[id|title] [asc|desc]`; missing words keep their defaults.
    pub fn parse(args: &str) -> Result<Self> {
        let mut order = Self::default();
        let mut words = args.split_whitespace();

        if let Some(field) = words.next() {
            order.field = match field {
                "id" | "identifier" | "date" => SortField::Identifier,
                "title" => SortField::Title,
                other => {
                    return Err(Error::InvalidFilterSyntax(format!(
                        "unknown sort field '{}'",
                        other
                    )))
                }
            };
        }
        if let Some(direction) = words.next() {
            order.descending = match direction {
                "asc" => false,
                "desc" => true,
                other => {
                    return Err(Error::InvalidFilterSyntax(format!(
                        "unknown sort direction '{}'",
                        other
                    )))
                }
            };
        }
        if words.next().is_some() {
            return Err(Error::InvalidFilterSyntax(
                "sort takes at most two arguments".to_string(),
            ));
        }
        Ok(order)
    }

    /// Compare two notes under this order.
    pub fn compare(&self, a: &NoteMeta, b: &NoteMeta) -> Ordering {
        let ord = match self.field {
            SortField::Identifier => a.identifier.cmp(&b.identifier),
            SortField::Title => a
                .title
                .to_lowercase()
                .cmp(&b.title.to_lowercase())
                .then_with(|| a.identifier.cmp(&b.identifier)),
        };
        if self.descending {
            ord.reverse()
        } else {
            ord
        }
    }

    /// Sort a listing in place.
    pub fn sort(&self, notes: &mut [&NoteMeta]) {
        notes.sort_by(|a, b| self.compare(a, b));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str, title: &str, tags: &[&str]) -> NoteMeta {
        NoteMeta::new(id, title, tags.iter().map(|t| t.to_string()).collect())
    }

    #[test]
    fn test_parse_field_prefixes() {
        assert_eq!(Filter::parse("tag:work").unwrap().field, FilterField::Tag);
        assert_eq!(Filter::parse("title:x").unwrap().field, FilterField::Title);
        assert_eq!(Filter::parse("date:2024").unwrap().field, FilterField::Date);
        assert_eq!(Filter::parse("plain").unwrap().field, FilterField::Any);
    }

    #[test]
    fn test_parse_negation() {
        let f = Filter::parse("!tag:journal").unwrap();
        assert!(f.negate);
        assert_eq!(f.field, FilterField::Tag);
    }

    #[test]
    fn test_regex_pattern_is_verbatim() {
        let f = Filter::parse("tag:/^wo/").unwrap();
        assert!(f.matches(&note("20240101T000000", "", &["work", "x"])));
        assert!(!f.matches(&note("20240101T000000", "", &["home"])));
        assert!(!f.matches(&note("20240101T000000", "", &["homework"])));
    }

    #[test]
    fn test_literal_pattern_is_escaped_and_case_insensitive() {
        let f = Filter::parse("title:'a.b (c)'").unwrap();
        assert!(f.matches(&note("20240101T000000", "Notes on A.B (C) today", &[])));
        assert!(!f.matches(&note("20240101T000000", "axb (c)", &[])));
    }

    #[test]
    fn test_any_field_matches_identifier_title_or_tag() {
        let f = Filter::parse("2023").unwrap();
        assert!(f.matches(&note("20230101T000000", "", &[])));
        let f = Filter::parse("rust").unwrap();
        assert!(f.matches(&note("20240101T000000", "Learning Rust", &[])));
        assert!(f.matches(&note("20240101T000000", "", &["rust"])));
        assert!(!f.matches(&note("20240101T000000", "Go", &["go"])));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Filter::parse("colour:red"),
            Err(Error::InvalidFilterSyntax(_))
        ));
        assert!(matches!(
            Filter::parse("tag:/(unclosed/"),
            Err(Error::InvalidPattern(_))
        ));
        assert!(matches!(
            Filter::parse("tag:"),
            Err(Error::InvalidFilterSyntax(_))
        ));
        assert!(matches!(
            Filter::parse("title:'open"),
            Err(Error::InvalidFilterSyntax(_))
        ));
    }

    #[test]
    fn test_split_query_respects_quotes() {
        let tokens = split_query(r#"tag:work  title:"trip report" !'a b'"#).unwrap();
        assert_eq!(tokens, vec!["tag:work", r#"title:"trip report""#, "!'a b'"]);
        assert!(split_query("title:'oops").is_err());
        assert!(split_query("   ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_query_and_combination() {
        let filters = parse_query("tag:work title:report").unwrap();
        assert_eq!(filters.len(), 2);
        assert!(matches_all(&filters, &note("20240101T000000", "Report", &["work"])));
        assert!(!matches_all(&filters, &note("20240101T000000", "Report", &["home"])));
        assert!(matches_all(&[], &note("20240101T000000", "", &[])));
    }

    #[test]
    fn test_sort_order_parse() {
        assert_eq!(SortOrder::parse("").unwrap(), SortOrder::default());
        let order = SortOrder::parse("title asc").unwrap();
        assert_eq!(order.field, SortField::Title);
        assert!(!order.descending);
        assert!(SortOrder::parse("size").is_err());
        assert!(SortOrder::parse("id sideways").is_err());
    }

    #[test]
    fn test_sort_default_newest_first() {
        let a = note("20240101T000000", "b", &[]);
        let b = note("20240301T000000", "a", &[]);
        let c = note("20240201T000000", "C", &[]);
        let mut list = vec![&a, &b, &c];
        SortOrder::default().sort(&mut list);
        let ids: Vec<_> = list.iter().map(|n| n.identifier.as_str()).collect();
        assert_eq!(ids, vec!["20240301T000000", "20240201T000000", "20240101T000000"]);

        SortOrder::parse("title asc").unwrap().sort(&mut list);
        let titles: Vec<_> = list.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "C"]);
    }
}
