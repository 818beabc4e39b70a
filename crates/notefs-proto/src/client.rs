//! Minimal sequential 9P client.
//!
//! One request is outstanding at a time. Paths are slash-separated and
//! relative to the attach root.

use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::trace;

use crate::codec::{decode_response, decode_stats, encode_request};
use crate::frame::{read_frame, write_frame};
use crate::types::*;

/// Fid bound to the attach root.
const ROOT_FID: u32 = 0;

/// Bytes of framing overhead in an `Rread`/`Twrite`.
const IOHDRSZ: u32 = 24;

/// Errors returned by [`Client`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The server answered with `Rerror`.
    #[error("Server error: {0}")]
    Remote(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The connection closed while a reply was pending.
    #[error("Connection closed")]
    Closed,
}

impl ClientError {
    /// Message of an `Rerror`, if that is what this is.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Self::Remote(msg) => Some(msg),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// 9P client over any async byte stream.
pub struct Client<S> {
    stream: S,
    msize: u32,
    next_tag: u16,
    next_fid: u32,
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Negotiate the version and attach as `uname`.
    pub async fn connect(stream: S, uname: &str, msize: u32) -> Result<Self> {
        let mut client = Self {
            stream,
            msize,
            next_tag: 0,
            next_fid: ROOT_FID + 1,
        };

        let reply = client
            .call(
                NOTAG,
                RequestBody::Version {
                    msize,
                    version: VERSION.to_string(),
                },
            )
            .await?;
        match reply {
            ResponseBody::Version { msize, version } if version == VERSION => {
                client.msize = client.msize.min(msize);
            }
            ResponseBody::Version { version, .. } => {
                return Err(ClientError::UnexpectedResponse(format!(
                    "server speaks {}",
                    version
                )))
            }
            other => return Err(unexpected("version", other)),
        }

        match client
            .rpc(RequestBody::Attach {
                fid: ROOT_FID,
                afid: NOFID,
                uname: uname.to_string(),
                aname: String::new(),
            })
            .await?
        {
            ResponseBody::Attach { .. } => Ok(client),
            other => Err(unexpected("attach", other)),
        }
    }

    /// Negotiated maximum message size.
    pub fn msize(&self) -> u32 {
        self.msize
    }

    /// Largest data payload of one read or write.
    pub fn iounit(&self) -> u32 {
        self.msize.saturating_sub(IOHDRSZ)
    }

    /// Walk from the root to `path` and return a new fid for it.
    pub async fn walk(&mut self, path: &str) -> Result<u32> {
        let wnames: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let newfid = self.alloc_fid();
        let wanted = wnames.len();
        match self
            .rpc(RequestBody::Walk {
                fid: ROOT_FID,
                newfid,
                wnames,
            })
            .await?
        {
            ResponseBody::Walk { qids } if qids.len() == wanted => Ok(newfid),
            ResponseBody::Walk { .. } => Err(ClientError::Remote(format!(
                "{}: file does not exist",
                path
            ))),
            other => Err(unexpected("walk", other)),
        }
    }

    pub async fn open(&mut self, fid: u32, mode: OpenMode) -> Result<(Qid, u32)> {
        match self.rpc(RequestBody::Open { fid, mode }).await? {
            ResponseBody::Open { qid, iounit } => Ok((qid, iounit)),
            other => Err(unexpected("open", other)),
        }
    }

    pub async fn read(&mut self, fid: u32, offset: u64, count: u32) -> Result<Vec<u8>> {
        match self.rpc(RequestBody::Read { fid, offset, count }).await? {
            ResponseBody::Read { data } => Ok(data),
            other => Err(unexpected("read", other)),
        }
    }

    pub async fn write(&mut self, fid: u32, offset: u64, data: &[u8]) -> Result<u32> {
        match self
            .rpc(RequestBody::Write {
                fid,
                offset,
                data: data.to_vec(),
            })
            .await?
        {
            ResponseBody::Write { count } => Ok(count),
            other => Err(unexpected("write", other)),
        }
    }

    pub async fn clunk(&mut self, fid: u32) -> Result<()> {
        match self.rpc(RequestBody::Clunk { fid }).await? {
            ResponseBody::Clunk => Ok(()),
            other => Err(unexpected("clunk", other)),
        }
    }

    pub async fn stat(&mut self, fid: u32) -> Result<Stat> {
        match self.rpc(RequestBody::Stat { fid }).await? {
            ResponseBody::Stat { stat } => Ok(stat),
            other => Err(unexpected("stat", other)),
        }
    }

    /// Walk to `path` and open it, returning the fid.
    pub async fn open_path(&mut self, path: &str, mode: OpenMode) -> Result<u32> {
        let fid = self.walk(path).await?;
        if let Err(e) = self.open(fid, mode).await {
            let _ = self.clunk(fid).await;
            return Err(e);
        }
        Ok(fid)
    }

    /// Read a whole file.
    pub async fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let fid = self.open_path(path, OpenMode::READ).await?;
        let result = self.read_all(fid).await;
        self.clunk(fid).await?;
        result
    }

    /// Read a whole file as text.
    pub async fn read_string(&mut self, path: &str) -> Result<String> {
        let bytes = self.read_file(path).await?;
        String::from_utf8(bytes)
            .map_err(|_| ClientError::Codec(CodecError::InvalidUtf8))
    }

    /// Replace the contents of a file with `data` in a single write.
    pub async fn write_file(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let fid = self
            .open_path(path, OpenMode::WRITE.truncate())
            .await?;
        let result = self.write(fid, 0, data).await;
        self.clunk(fid).await?;
        result.map(|_| ())
    }

    /// Entries of a directory.
    pub async fn read_dir(&mut self, path: &str) -> Result<Vec<Stat>> {
        let bytes = self.read_file(path).await?;
        Ok(decode_stats(&bytes)?)
    }

    async fn read_all(&mut self, fid: u32) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let chunk = self.read(fid, out.len() as u64, self.iounit()).await?;
            if chunk.is_empty() {
                return Ok(out);
            }
            out.extend_from_slice(&chunk);
        }
    }

    fn alloc_fid(&mut self) -> u32 {
        let fid = self.next_fid;
        self.next_fid = match self.next_fid.wrapping_add(1) {
            NOFID | ROOT_FID => ROOT_FID + 1,
            next => next,
        };
        fid
    }

    fn alloc_tag(&mut self) -> u16 {
        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);
        if self.next_tag == NOTAG {
            self.next_tag = 0;
        }
        tag
    }

    async fn rpc(&mut self, body: RequestBody) -> Result<ResponseBody> {
        let tag = self.alloc_tag();
        self.call(tag, body).await
    }

    async fn call(&mut self, tag: u16, body: RequestBody) -> Result<ResponseBody> {
        let name = body.name();
        let frame = encode_request(&Request { tag, body })?;
        trace!(subsystem = "proto", component = "client", op = name, tag, "Request");
        write_frame(&mut self.stream, &frame).await?;

        let reply = read_frame(&mut self.stream, self.msize.max(HEADER_SIZE as u32))
            .await?
            .ok_or(ClientError::Closed)?;
        let response = decode_response(&reply)?;
        if response.tag != tag {
            return Err(ClientError::UnexpectedResponse(format!(
                "tag {} for request {}",
                response.tag, tag
            )));
        }
        match response.body {
            ResponseBody::Error { ename } => Err(ClientError::Remote(ename)),
            body => Ok(body),
        }
    }
}

fn unexpected(op: &str, body: ResponseBody) -> ClientError {
    ClientError::UnexpectedResponse(format!("{} answered with {:?}", op, body))
}
