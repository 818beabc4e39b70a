//! Reads and writes of the non-directory files.
//!
//! Every write carries one complete value with trailing newlines already
//! trimmed by the session.

use std::path::PathBuf;

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use notefs_core::metadata::parse_keywords;
use notefs_core::{parse_filename, Error, NoteAction, NoteEvent, NoteHandle, SortOrder};

use crate::context::ServerContext;
use crate::error::{NinepError, Result};
use crate::tree::NoteField;

/// `'Title' tag1,tag2`
static NEW_NOTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^'([^']*)'(?:\s+(\S+))?\s*$").unwrap());

/// Text of the `index` file.
pub async fn read_index(ctx: &ServerContext) -> String {
    ctx.index.read().await.render_index()
}

/// Value of a note field.
pub async fn read_field(ctx: &ServerContext, handle: NoteHandle, field: NoteField) -> Result<String> {
    let index = ctx.index.read().await;
    let meta = index.get(handle).ok_or(NinepError::NotFound)?;
    match field {
        NoteField::Path => Ok(meta.path_string()),
        NoteField::Title => Ok(meta.title.clone()),
        NoteField::Keywords => Ok(meta.keywords()),
        NoteField::Ctl => Err(NinepError::PermissionDenied),
    }
}

/// Root `ctl`: `filter [query]`, `sort [field] [dir]` or `add <path>`.
pub async fn write_root_ctl(ctx: &ServerContext, text: &str) -> Result<()> {
    let text = text.trim();
    let (command, args) = match text.split_once(char::is_whitespace) {
        Some((command, args)) => (command, args.trim()),
        None => (text, ""),
    };

    match command {
        "filter" => {
            ctx.index.write().await.set_filter(args)?;
        }
        "sort" => {
            let order = SortOrder::parse(args)?;
            ctx.index.write().await.set_sort(order);
            debug!(subsystem = "server", op = "sort", order = ?order, "Sort order updated");
        }
        "add" => {
            if args.is_empty() {
                return Err(NinepError::BadControl("add needs a path".to_string()));
            }
            let meta = parse_filename(PathBuf::from(args));
            if !meta.is_note() {
                return Err(Error::InvalidNote(format!("{} is not a note file name", args)).into());
            }
            let identifier = meta.identifier.clone();
            ctx.index.write().await.insert(meta)?;
            info!(
                subsystem = "server",
                op = "add",
                note_id = %identifier,
                path = %args,
                "Note registered"
            );
        }
        "" => return Err(NinepError::BadControl("empty command".to_string())),
        other => {
            return Err(NinepError::BadControl(format!(
                "unknown command '{}'",
                other
            )))
        }
    }
    Ok(())
}

/// `new`: create a note from `'Title' tag1,tag2`. Returns its identifier.
pub async fn write_new(ctx: &ServerContext, text: &str) -> Result<String> {
    let caps = NEW_NOTE_RE.captures(text.trim()).ok_or_else(|| {
        Error::InvalidNote("expected 'Title' followed by optional tag1,tag2".to_string())
    })?;
    let title = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let tags = parse_keywords(caps.get(2).map(|m| m.as_str()).unwrap_or(""))?;

    let identifier = {
        let mut index = ctx.index.write().await;
        let handle = index.create(title, tags, Local::now().naive_local())?;
        index.require(handle)?.identifier.clone()
    };

    // Announced after the lock is released; emit never waits on subscribers.
    ctx.events.emit(NoteEvent::new(identifier.clone(), NoteAction::New));
    info!(subsystem = "server", op = "new", note_id = %identifier, "Note created");
    Ok(identifier)
}

/// Write to a note's `path`, `title` or `keywords`.
///
/// Title and keyword changes move `path` to the canonical name and
/// announce an update followed by a rename before returning.
pub async fn write_field(
    ctx: &ServerContext,
    handle: NoteHandle,
    field: NoteField,
    text: &str,
) -> Result<()> {
    let mut index = ctx.index.write().await;
    if field == NoteField::Ctl {
        return write_note_ctl_locked(ctx, &mut index, handle, text);
    }
    let meta = index.get_mut(handle).ok_or(NinepError::NotFound)?;

    match field {
        NoteField::Path => {
            meta.path = if text.is_empty() {
                None
            } else {
                Some(PathBuf::from(text))
            };
            debug!(
                subsystem = "server",
                op = "write_path",
                note_id = %meta.identifier,
                path = %text,
                "Path updated"
            );
            return Ok(());
        }
        NoteField::Title => {
            if text.contains('\n') {
                return Err(Error::InvalidNote("title must be a single line".to_string()).into());
            }
            meta.title = text.to_string();
        }
        NoteField::Keywords => {
            meta.tags = parse_keywords(text)?;
        }
        NoteField::Ctl => return Err(NinepError::PermissionDenied),
    }
    // Readers of `path` see the new name as soon as the write returns.
    if let Some(path) = meta.canonical_path() {
        meta.path = Some(path);
    }

    let identifier = meta.identifier.clone();
    ctx.events.emit(NoteEvent::new(identifier.clone(), NoteAction::Update));
    ctx.events.emit(NoteEvent::new(identifier, NoteAction::Rename));
    Ok(())
}

/// Note `ctl`: `d` deletes, `r` forces a rename.
pub async fn write_note_ctl(ctx: &ServerContext, handle: NoteHandle, text: &str) -> Result<()> {
    let mut index = ctx.index.write().await;
    write_note_ctl_locked(ctx, &mut index, handle, text)
}

fn write_note_ctl_locked(
    ctx: &ServerContext,
    index: &mut notefs_core::NoteIndex,
    handle: NoteHandle,
    text: &str,
) -> Result<()> {
    let meta = index.get_mut(handle).ok_or(NinepError::NotFound)?;
    match text.trim() {
        "d" => {
            // Listeners get the path before the record disappears.
            let event = NoteEvent::deleted(meta.identifier.clone(), meta.path.clone());
            let identifier = event.identifier.clone();
            ctx.events.emit(event);
            index.remove(handle);
            info!(subsystem = "server", op = "delete", note_id = %identifier, "Note deleted");
            Ok(())
        }
        "r" => {
            if let Some(path) = meta.canonical_path() {
                meta.path = Some(path);
            }
            ctx.events
                .emit(NoteEvent::new(meta.identifier.clone(), NoteAction::Rename));
            Ok(())
        }
        other => Err(NinepError::BadControl(format!(
            "unknown note command '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use notefs_core::{NoteIndex, NoteMeta};
    use std::sync::Arc;

    fn context() -> Arc<ServerContext> {
        let mut index = NoteIndex::new();
        index
            .insert(
                NoteMeta::new("20240101T000000", "Diary", vec!["journal".to_string()])
                    .with_path("/n/20240101T000000--diary__journal.md"),
            )
            .unwrap();
        ServerContext::new(ServerConfig::default(), index)
    }

    async fn handle(ctx: &ServerContext) -> NoteHandle {
        ctx.index.read().await.handle_of("20240101T000000").unwrap()
    }

    #[tokio::test]
    async fn test_new_requires_quoted_title() {
        let ctx = context();
        for bad in ["Trip Report work", "''", "'Trip' Work", "'Trip' a b", "'Trip"] {
            assert!(write_new(&ctx, bad).await.is_err(), "{bad}");
        }
        assert_eq!(ctx.index.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_new_creates_and_announces() {
        let ctx = context();
        let mut sub = ctx.events.subscribe();
        let id = write_new(&ctx, "'Trip Report' work,travel").await.unwrap();

        let index = ctx.index.read().await;
        let meta = index.lookup(&id).unwrap();
        assert_eq!(meta.title, "Trip Report");
        assert_eq!(meta.tags, vec!["work", "travel"]);
        assert!(meta.path.is_none());
        assert_eq!(sub.try_recv().unwrap(), NoteEvent::new(id, NoteAction::New));
    }

    #[tokio::test]
    async fn test_title_write_announces_update_then_rename() {
        let ctx = context();
        let h = handle(&ctx).await;
        let mut sub = ctx.events.subscribe();

        write_field(&ctx, h, NoteField::Title, "Dear Diary").await.unwrap();
        assert_eq!(read_field(&ctx, h, NoteField::Title).await.unwrap(), "Dear Diary");
        assert_eq!(sub.try_recv().unwrap().action, NoteAction::Update);
        assert_eq!(sub.try_recv().unwrap().action, NoteAction::Rename);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_title_and_keyword_writes_move_path() {
        let ctx = context();
        let h = handle(&ctx).await;

        write_field(&ctx, h, NoteField::Title, "Dear Diary").await.unwrap();
        assert_eq!(
            read_field(&ctx, h, NoteField::Path).await.unwrap(),
            "/n/20240101T000000--dear-diary__journal.md"
        );
        write_field(&ctx, h, NoteField::Keywords, "journal,home").await.unwrap();
        assert_eq!(
            read_field(&ctx, h, NoteField::Path).await.unwrap(),
            "/n/20240101T000000--dear-diary__journal_home.md"
        );
    }

    #[tokio::test]
    async fn test_rename_ctl_repairs_hand_written_path() {
        let ctx = context();
        let h = handle(&ctx).await;
        write_field(&ctx, h, NoteField::Path, "/n/20240101T000000--old.md").await.unwrap();

        write_note_ctl(&ctx, h, "r").await.unwrap();
        assert_eq!(
            read_field(&ctx, h, NoteField::Path).await.unwrap(),
            "/n/20240101T000000--diary__journal.md"
        );
    }

    #[tokio::test]
    async fn test_bad_keywords_leave_note_untouched() {
        let ctx = context();
        let h = handle(&ctx).await;
        let mut sub = ctx.events.subscribe();

        assert!(write_field(&ctx, h, NoteField::Keywords, "Not Valid").await.is_err());
        assert_eq!(read_field(&ctx, h, NoteField::Keywords).await.unwrap(), "journal");
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_path_write_is_silent() {
        let ctx = context();
        let h = handle(&ctx).await;
        let mut sub = ctx.events.subscribe();

        write_field(&ctx, h, NoteField::Path, "/n/x.md").await.unwrap();
        assert_eq!(read_field(&ctx, h, NoteField::Path).await.unwrap(), "/n/x.md");
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_delete_announces_path_before_removal() {
        let ctx = context();
        let h = handle(&ctx).await;
        let mut sub = ctx.events.subscribe();

        write_note_ctl(&ctx, h, "d").await.unwrap();
        let event = sub.try_recv().unwrap();
        assert_eq!(event.action, NoteAction::Delete);
        assert_eq!(
            event.path,
            Some(PathBuf::from("/n/20240101T000000--diary__journal.md"))
        );
        assert!(ctx.index.read().await.lookup("20240101T000000").is_none());
        assert!(write_note_ctl(&ctx, h, "r").await.is_err());
    }

    #[tokio::test]
    async fn test_root_ctl_commands() {
        let ctx = context();
        write_root_ctl(&ctx, "filter tag:work").await.unwrap();
        assert_eq!(read_index(&ctx).await, "");
        write_root_ctl(&ctx, "filter").await.unwrap();
        assert!(read_index(&ctx).await.starts_with("20240101T000000 | Diary"));

        write_root_ctl(&ctx, "add /n/20240202T000000--other.org").await.unwrap();
        assert_eq!(ctx.index.read().await.len(), 2);
        assert!(write_root_ctl(&ctx, "add /n/20240202T000000--again.org").await.is_err());
        assert!(write_root_ctl(&ctx, "add /n/README.md").await.is_err());

        write_root_ctl(&ctx, "sort title asc").await.unwrap();
        assert!(read_index(&ctx).await.starts_with("20240101T000000 | Diary"));

        assert!(matches!(
            write_root_ctl(&ctx, "explode").await,
            Err(NinepError::BadControl(_))
        ));
    }
}
