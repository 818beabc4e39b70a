//! Daemon against a live server session: events in, files on disk, paths
//! written back.

use std::fs;
use std::sync::Arc;

use tokio::io::DuplexStream;

use notefs_core::{NoteAction, NoteIndex};
use notefs_proto::Client;
use notefs_server::{serve, ServerConfig, ServerContext};
use notefs_sync::{DiskNotes, Dispatcher, EventReader, NinepRemote, NoteRemote};

async fn client(ctx: &Arc<ServerContext>, conn_id: u64) -> Client<DuplexStream> {
    let (client_side, server_side) = tokio::io::duplex(64 * 1024);
    tokio::spawn(serve(ctx.clone(), server_side, conn_id));
    Client::connect(client_side, "sync", 8192).await.unwrap()
}

#[tokio::test]
async fn test_note_lifecycle_reaches_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    let ctx = ServerContext::new(ServerConfig::default(), NoteIndex::new());

    let mut events = EventReader::open(client(&ctx, 1).await).await.unwrap();
    let remote = NinepRemote::new(client(&ctx, 2).await);
    let disk = DiskNotes::new(dir.path(), ".md").unwrap();
    let mut dispatcher = Dispatcher::new(remote, disk);
    let mut user = client(&ctx, 3).await;

    // Creation: the file appears and its path is written back.
    user.write_file("new", b"'Trip Report' work,travel").await.unwrap();
    let created = events.next_event().await.unwrap().unwrap();
    assert_eq!(created.action, NoteAction::New);
    let id = created.identifier.clone();
    dispatcher.handle_event(&created).await.unwrap();

    let path = user.read_string(&format!("n/{id}/path")).await.unwrap();
    assert!(path.ends_with(&format!("{id}--trip-report__work_travel.md")));
    assert!(fs::read_to_string(&path).unwrap().contains("Trip Report"));

    // Title change: front matter rewritten, then the file renamed.
    user.write_file(&format!("n/{id}/title"), b"Trip Notes")
        .await
        .unwrap();
    let published = user.read_string(&format!("n/{id}/path")).await.unwrap();
    assert!(published.ends_with(&format!("{id}--trip-notes__work_travel.md")));
    assert!(std::path::Path::new(&path).exists());
    for expected in [NoteAction::Update, NoteAction::Rename] {
        let event = events.next_event().await.unwrap().unwrap();
        assert_eq!(event.action, expected);
        dispatcher.handle_event(&event).await.unwrap();
    }
    let renamed = user.read_string(&format!("n/{id}/path")).await.unwrap();
    assert_eq!(renamed, published);
    assert!(std::path::Path::new(&renamed).exists());
    assert!(!std::path::Path::new(&path).exists());
    assert!(fs::read_to_string(&renamed).unwrap().contains("Trip Notes"));

    // Deletion: the wire event carries no path; the file is found by id.
    user.write_file(&format!("n/{id}/ctl"), b"d").await.unwrap();
    let deleted = events.next_event().await.unwrap().unwrap();
    assert_eq!(deleted.action, NoteAction::Delete);
    dispatcher.handle_event(&deleted).await.unwrap();
    assert!(!std::path::Path::new(&renamed).exists());
    assert!(!dispatcher.remote_mut().exists(&id).await.unwrap());
}

#[tokio::test]
async fn test_reconcile_registers_files() {
    let dir = tempfile::TempDir::new().unwrap();
    fs::write(
        dir.path().join("20240105T080000--groceries__home.md"),
        "milk\n",
    )
    .unwrap();
    fs::write(dir.path().join("README.md"), "not a note\n").unwrap();

    let ctx = ServerContext::new(ServerConfig::default(), NoteIndex::new());
    let remote = NinepRemote::new(client(&ctx, 1).await);
    let disk = DiskNotes::new(dir.path(), ".md").unwrap();
    let mut dispatcher = Dispatcher::new(remote, disk);

    let report = dispatcher.reconcile().await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.synced, 1);
    assert_eq!(report.failed, 0);

    let mut user = client(&ctx, 2).await;
    assert_eq!(
        user.read_string("index").await.unwrap(),
        "20240105T080000 | groceries | home\n"
    );
}

#[tokio::test]
async fn test_reconcile_moves_file_to_published_path() {
    let dir = tempfile::TempDir::new().unwrap();
    fs::write(
        dir.path().join("20240105T080000--old-name.md"),
        "---\ntitle: \"Groceries\"\ntags: [home]\n---\nmilk\n",
    )
    .unwrap();

    let ctx = ServerContext::new(ServerConfig::default(), NoteIndex::new());
    let remote = NinepRemote::new(client(&ctx, 1).await);
    let disk = DiskNotes::new(dir.path(), ".md").unwrap();
    let mut dispatcher = Dispatcher::new(remote, disk);

    let report = dispatcher.reconcile().await.unwrap();
    assert_eq!(report.synced, 1);

    let mut user = client(&ctx, 2).await;
    let path = user.read_string("n/20240105T080000/path").await.unwrap();
    assert!(path.ends_with("20240105T080000--groceries__home.md"), "{path}");
    assert!(fs::read_to_string(&path).unwrap().ends_with("milk\n"));
    assert!(!dir.path().join("20240105T080000--old-name.md").exists());
}
