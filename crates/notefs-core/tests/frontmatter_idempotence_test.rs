//! Front-matter application across all four dialects.

use notefs_core::{FileType, FrontMatter, NoteMeta};

const BODY: &str = "First paragraph.\n\n---\n\nSecond paragraph after a rule.\n";

fn meta() -> NoteMeta {
    NoteMeta::new(
        "20240102T030405",
        "Trip Report",
        vec!["work".to_string(), "travel".to_string()],
    )
    .with_signature("a1")
}

fn all_types() -> [FileType; 4] {
    [
        FileType::Org,
        FileType::MarkdownYaml,
        FileType::MarkdownToml,
        FileType::Text,
    ]
}

#[test]
fn test_apply_is_idempotent_for_all_dialects() {
    for file_type in all_types() {
        let fm = FrontMatter::from_meta(&meta(), file_type);
        for original in [BODY, "", "\n\n\nbody", "no newline"] {
            let once = fm.apply(original);
            let twice = fm.apply(&once);
            assert_eq!(once, twice, "{file_type} on {original:?}");
        }
    }
}

#[test]
fn test_apply_preserves_body_bytes() {
    for file_type in all_types() {
        let fm = FrontMatter::from_meta(&meta(), file_type);
        let applied = fm.apply(BODY);
        assert!(applied.ends_with(BODY), "{file_type}: {applied:?}");
        assert_eq!(applied, format!("{}{}", fm.marshal(), BODY));
    }
}

#[test]
fn test_apply_replaces_stale_block() {
    for file_type in all_types() {
        let old = FrontMatter::from_meta(
            &NoteMeta::new("20240102T030405", "Old", vec!["x".to_string()]),
            file_type,
        );
        let new = FrontMatter::from_meta(&meta(), file_type);

        let stale = old.apply(BODY);
        let updated = new.apply(&stale);
        assert_eq!(updated, new.apply(BODY), "{file_type}");
    }
}

#[test]
fn test_unmarshal_reads_back_applied_block() {
    for file_type in all_types() {
        let fm = FrontMatter::from_meta(&meta(), file_type);
        let content = fm.apply(BODY);
        let parsed = FrontMatter::unmarshal(&content, file_type.extension()).unwrap();
        assert_eq!(parsed, fm, "{file_type}");
        assert_eq!(parsed.to_meta(), meta());
    }
}

#[test]
fn test_empty_tags_render_as_empty_field() {
    let bare = NoteMeta::new("20240102T030405", "Bare", vec![]);
    for file_type in all_types() {
        let block = FrontMatter::from_meta(&bare, file_type).marshal();
        assert!(block.lines().any(|l| l.contains("tags")), "{file_type}");
        let parsed = FrontMatter::unmarshal(&block, file_type.extension()).unwrap();
        assert!(parsed.tags.is_empty());
    }
}

#[test]
fn test_unsupported_extension() {
    assert!(FrontMatter::unmarshal("hello", ".rst").is_err());
}
