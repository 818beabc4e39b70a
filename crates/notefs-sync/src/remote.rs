//! The daemon's view of the notefs server.

use std::path::Path;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info};

use notefs_core::{NoteEvent, NoteMeta};
use notefs_proto::{Client, ClientError, OpenMode};

use crate::config::SyncConfig;
use crate::daemon::SyncInput;
use crate::error::{Result, SyncError};

/// Reads and writes the daemon performs against the note tree.
#[async_trait]
pub trait NoteRemote: Send {
    /// Value of `n/<identifier>/<field>`.
    async fn read_field(&mut self, identifier: &str, field: &str) -> Result<String>;

    /// Replace `n/<identifier>/<field>` with `value`.
    async fn write_field(&mut self, identifier: &str, field: &str, value: &str) -> Result<()>;

    /// Send a command to `n/<identifier>/ctl`.
    async fn control(&mut self, identifier: &str, command: &str) -> Result<()>;

    /// Register a file the server does not know yet (`add <path>` on `ctl`).
    async fn add(&mut self, path: &Path) -> Result<()>;

    /// Whether `n/<identifier>` resolves.
    async fn exists(&mut self, identifier: &str) -> Result<bool>;

    /// Current record of a note.
    async fn note(&mut self, identifier: &str) -> Result<NoteMeta> {
        let path = self.read_field(identifier, "path").await?;
        let title = self.read_field(identifier, "title").await?;
        let keywords = self.read_field(identifier, "keywords").await?;
        let tags = keywords
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        let meta = NoteMeta::new(identifier, title, tags);
        Ok(if path.is_empty() {
            meta
        } else {
            meta.with_path(path)
        })
    }
}

/// [`NoteRemote`] over a 9P connection.
pub struct NinepRemote<S> {
    client: Client<S>,
}

impl NinepRemote<TcpStream> {
    /// Connect to the server named in `config`.
    pub async fn connect(config: &SyncConfig) -> Result<Self> {
        let stream = TcpStream::connect(&config.addr).await?;
        let client = Client::connect(stream, &config.uname, config.msize).await?;
        info!(subsystem = "sync", component = "remote", addr = %config.addr, "Connected");
        Ok(Self { client })
    }
}

impl<S> NinepRemote<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(client: Client<S>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<S> NoteRemote for NinepRemote<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_field(&mut self, identifier: &str, field: &str) -> Result<String> {
        Ok(self
            .client
            .read_string(&format!("n/{}/{}", identifier, field))
            .await?)
    }

    async fn write_field(&mut self, identifier: &str, field: &str, value: &str) -> Result<()> {
        self.client
            .write_file(&format!("n/{}/{}", identifier, field), value.as_bytes())
            .await?;
        Ok(())
    }

    async fn control(&mut self, identifier: &str, command: &str) -> Result<()> {
        self.write_field(identifier, "ctl", command).await
    }

    async fn add(&mut self, path: &Path) -> Result<()> {
        let command = format!("add {}", path.display());
        self.client.write_file("ctl", command.as_bytes()).await?;
        Ok(())
    }

    async fn exists(&mut self, identifier: &str) -> Result<bool> {
        match self.client.walk(&format!("n/{}", identifier)).await {
            Ok(fid) => {
                self.client.clunk(fid).await?;
                Ok(true)
            }
            Err(ClientError::Remote(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Open `event` file on a dedicated connection.
pub struct EventReader<S> {
    client: Client<S>,
    fid: u32,
    pending: String,
}

impl EventReader<TcpStream> {
    pub async fn connect(config: &SyncConfig) -> Result<Self> {
        let stream = TcpStream::connect(&config.addr).await?;
        Self::open(Client::connect(stream, &config.uname, config.msize).await?).await
    }
}

impl<S> EventReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Open `event` on `client`, which is used for nothing else afterwards.
    pub async fn open(mut client: Client<S>) -> Result<Self> {
        let fid = client.open_path("event", OpenMode::READ).await?;
        Ok(Self {
            client,
            fid,
            pending: String::new(),
        })
    }

    /// Next event, waiting for one. `None` when the server ends the stream.
    pub async fn next_event(&mut self) -> Result<Option<NoteEvent>> {
        loop {
            if let Some(end) = self.pending.find('\n') {
                let line: String = self.pending.drain(..=end).collect();
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                return Ok(Some(line.parse()?));
            }
            let iounit = self.client.iounit();
            let data = match self.client.read(self.fid, 0, iounit).await {
                Ok(data) => data,
                Err(ClientError::Closed) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            if data.is_empty() {
                return Ok(None);
            }
            let text = String::from_utf8(data)
                .map_err(|_| SyncError::Client(ClientError::Codec(notefs_proto::CodecError::InvalidUtf8)))?;
            self.pending.push_str(&text);
        }
    }
}

/// Forward every event from `reader` into `tx` until either side closes.
pub async fn forward_events<S>(mut reader: EventReader<S>, tx: mpsc::Sender<SyncInput>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    while let Some(event) = reader.next_event().await? {
        debug!(
            subsystem = "sync",
            component = "events",
            note_id = %event.identifier,
            action = %event.action,
            "Event received"
        );
        if tx.send(SyncInput::Event(event)).await.is_err() {
            break;
        }
    }
    Ok(())
}
