//! One client connection: fid table, request dispatch and reply ordering.
//!
//! Frames are decoded and handled strictly in arrival order, and replies go
//! out through a single writer task in the same order. The one exception is
//! a read of `event` with nothing queued: it is parked in its own task and
//! answered when an event arrives, when its fid is clunked ("interrupted"),
//! or never if its tag is flushed.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use notefs_core::Subscription;
use notefs_proto::codec::encode_stat;
use notefs_proto::{
    decode_request, encode_response, peek_tag, read_frame, write_frame, OpenMode, Request,
    RequestBody, Response, ResponseBody, Stat, HEADER_SIZE, NOFID, VERSION,
};

use crate::context::ServerContext;
use crate::error::{NinepError, Result};
use crate::handlers;
use crate::tree::{Node, NoteField};

/// Bytes of framing overhead in an `Rread`/`Twrite`.
const IOHDRSZ: u32 = notefs_core::defaults::IOHDRSZ;

/// Subscription owned by an open `event` fid.
struct EventStream {
    id: u64,
    queue: Arc<Mutex<EventQueue>>,
}

/// Events of one fid plus the unread tail of the line being delivered.
/// A line longer than the read count is handed out over several reads.
struct EventQueue {
    subscription: Subscription,
    partial: Vec<u8>,
}

impl EventQueue {
    fn new(subscription: Subscription) -> Self {
        Self {
            subscription,
            partial: Vec::new(),
        }
    }

    /// Up to `count` bytes if a line is pending or queued.
    fn try_next(&mut self, count: u32) -> Option<Vec<u8>> {
        if self.partial.is_empty() {
            self.partial = self.subscription.try_recv()?.wire_line().into_bytes();
        }
        Some(self.take(count))
    }

    /// Up to `count` bytes, waiting for the next event if nothing is
    /// pending. `None` once the bus is gone.
    async fn next(&mut self, count: u32) -> Option<Vec<u8>> {
        if self.partial.is_empty() {
            self.partial = self.subscription.recv().await?.wire_line().into_bytes();
        }
        Some(self.take(count))
    }

    /// Put back bytes whose reply was never sent.
    fn restore(&mut self, mut data: Vec<u8>) {
        data.append(&mut self.partial);
        self.partial = data;
    }

    fn take(&mut self, count: u32) -> Vec<u8> {
        let n = (count as usize).min(self.partial.len());
        self.partial.drain(..n).collect()
    }
}

struct FidState {
    node: Node,
    mode: Option<OpenMode>,
    events: Option<EventStream>,
}

impl FidState {
    fn new(node: Node) -> Self {
        Self {
            node,
            mode: None,
            events: None,
        }
    }
}

/// Reply to a request answered out of line. Whoever answers first wins.
#[derive(Clone)]
struct DeferredReply {
    tag: u16,
    answered: Arc<StdMutex<bool>>,
    tx: mpsc::UnboundedSender<Response>,
}

impl DeferredReply {
    fn new(tag: u16, tx: mpsc::UnboundedSender<Response>) -> Self {
        Self {
            tag,
            answered: Arc::new(StdMutex::new(false)),
            tx,
        }
    }

    /// Queue `body` as the reply unless one was already given.
    fn send(&self, body: ResponseBody) -> bool {
        let mut answered = self.answered.lock().unwrap_or_else(|e| e.into_inner());
        if *answered {
            return false;
        }
        *answered = true;
        let _ = self.tx.send(Response::new(self.tag, body));
        true
    }

    /// Mark as answered without replying.
    fn cancel(&self) -> bool {
        let mut answered = self.answered.lock().unwrap_or_else(|e| e.into_inner());
        !std::mem::replace(&mut *answered, true)
    }
}

struct PendingRead {
    fid: u32,
    reply: DeferredReply,
    task: JoinHandle<()>,
}

/// Protocol state of one connection.
pub struct Session {
    ctx: Arc<ServerContext>,
    conn_id: u64,
    msize: u32,
    fids: HashMap<u32, FidState>,
    pending: HashMap<u16, PendingRead>,
    replies: mpsc::UnboundedSender<Response>,
}

impl Session {
    pub fn new(
        ctx: Arc<ServerContext>,
        conn_id: u64,
        replies: mpsc::UnboundedSender<Response>,
    ) -> Self {
        let msize = ctx.config.msize;
        Self {
            ctx,
            conn_id,
            msize,
            fids: HashMap::new(),
            pending: HashMap::new(),
            replies,
        }
    }

    /// Current maximum message size.
    pub fn msize(&self) -> u32 {
        self.msize
    }

    fn iounit(&self) -> u32 {
        self.msize.saturating_sub(IOHDRSZ)
    }

    /// Handle one request. `None` means the reply will be sent later.
    pub async fn handle(&mut self, request: Request) -> Option<Response> {
        let tag = request.tag;
        let op = request.body.name();
        let result = match request.body {
            RequestBody::Version { msize, version } => self.version(msize, &version).map(Some),
            RequestBody::Auth { .. } => Err(NinepError::AuthNotRequired),
            RequestBody::Attach { fid, afid, .. } => self.attach(fid, afid).map(Some),
            RequestBody::Flush { oldtag } => {
                self.flush(oldtag);
                Ok(Some(ResponseBody::Flush))
            }
            RequestBody::Walk {
                fid,
                newfid,
                wnames,
            } => self.walk(fid, newfid, &wnames).await.map(Some),
            RequestBody::Open { fid, mode } => self.open(fid, mode).await.map(Some),
            RequestBody::Create { .. } => Err(NinepError::NotSupported),
            RequestBody::Read { fid, offset, count } => self.read(tag, fid, offset, count).await,
            RequestBody::Write { fid, data, .. } => self.write(fid, &data).await.map(Some),
            RequestBody::Clunk { fid } => self.clunk(fid).map(|_| Some(ResponseBody::Clunk)),
            RequestBody::Remove { fid } => self.clunk(fid).and(Err(NinepError::NotSupported)),
            RequestBody::Stat { fid } => self.stat(fid).await.map(Some),
            RequestBody::Wstat { fid, stat } => self.wstat(fid, &stat).await.map(Some),
        };

        match result {
            Ok(Some(body)) => Some(Response::new(tag, body)),
            Ok(None) => None,
            Err(e) => {
                debug!(
                    subsystem = "server",
                    component = "session",
                    conn_id = self.conn_id,
                    op,
                    error = %e,
                    "Request failed"
                );
                Some(Response::error(tag, e.to_string()))
            }
        }
    }

    /// Never answers with more than the client offered. An offer smaller
    /// than a header plus `IOHDRSZ` is refused and leaves the session as it
    /// was.
    fn version(&mut self, msize: u32, version: &str) -> Result<ResponseBody> {
        if msize < HEADER_SIZE as u32 + IOHDRSZ {
            return Err(NinepError::MsizeTooSmall(msize));
        }
        self.reset();
        self.msize = msize.min(self.ctx.config.msize);
        let version = if version.starts_with(VERSION) {
            VERSION
        } else {
            "unknown"
        };
        Ok(ResponseBody::Version {
            msize: self.msize,
            version: version.to_string(),
        })
    }

    fn attach(&mut self, fid: u32, afid: u32) -> Result<ResponseBody> {
        if afid != NOFID {
            return Err(NinepError::AuthNotRequired);
        }
        if self.fids.contains_key(&fid) {
            return Err(NinepError::FidInUse(fid));
        }
        self.fids.insert(fid, FidState::new(Node::Root));
        Ok(ResponseBody::Attach {
            qid: Node::Root.qid(),
        })
    }

    fn flush(&mut self, oldtag: u16) {
        if let Some(pending) = self.pending.remove(&oldtag) {
            pending.task.abort();
            pending.reply.cancel();
        }
    }

    async fn walk(&mut self, fid: u32, newfid: u32, wnames: &[String]) -> Result<ResponseBody> {
        let state = self.fids.get(&fid).ok_or(NinepError::UnknownFid(fid))?;
        if state.mode.is_some() {
            return Err(NinepError::WalkOpenFid);
        }
        if newfid != fid && self.fids.contains_key(&newfid) {
            return Err(NinepError::FidInUse(newfid));
        }
        let start = state.node;

        let mut node = start;
        let mut qids = Vec::with_capacity(wnames.len());
        {
            let index = self.ctx.index.read().await;
            if !start.exists(&index) {
                return Err(NinepError::NotFound);
            }
            for name in wnames {
                if !node.is_dir() {
                    break;
                }
                match node.walk(name, &index) {
                    Some(next) => {
                        node = next;
                        qids.push(next.qid());
                    }
                    None => break,
                }
            }
        }

        if qids.len() < wnames.len() {
            if qids.is_empty() {
                return Err(if start.is_dir() {
                    NinepError::NotFound
                } else {
                    NinepError::NotDirectory
                });
            }
            return Ok(ResponseBody::Walk { qids });
        }

        self.fids.insert(newfid, FidState::new(node));
        Ok(ResponseBody::Walk { qids })
    }

    async fn open(&mut self, fid: u32, mode: OpenMode) -> Result<ResponseBody> {
        let iounit = self.iounit();
        let state = self.fids.get_mut(&fid).ok_or(NinepError::UnknownFid(fid))?;
        if state.mode.is_some() {
            return Err(NinepError::AlreadyOpen);
        }
        if !state.node.exists(&*self.ctx.index.read().await) {
            return Err(NinepError::NotFound);
        }
        if !state.node.allows(mode) {
            return Err(NinepError::PermissionDenied);
        }
        if state.node == Node::Event {
            let subscription = self.ctx.events.subscribe();
            state.events = Some(EventStream {
                id: subscription.id(),
                queue: Arc::new(Mutex::new(EventQueue::new(subscription))),
            });
        }
        state.mode = Some(mode);
        Ok(ResponseBody::Open {
            qid: state.node.qid(),
            iounit,
        })
    }

    async fn read(
        &mut self,
        tag: u16,
        fid: u32,
        offset: u64,
        count: u32,
    ) -> Result<Option<ResponseBody>> {
        let count = count.min(self.iounit());
        let state = self.fids.get(&fid).ok_or(NinepError::UnknownFid(fid))?;
        let mode = state.mode.ok_or(NinepError::NotOpen)?;
        if !mode.can_read() {
            return Err(NinepError::PermissionDenied);
        }
        let node = state.node;

        if node == Node::Event {
            let queue = state
                .events
                .as_ref()
                .map(|s| s.queue.clone())
                .ok_or(NinepError::NotOpen)?;
            return Ok(self.read_event(tag, fid, queue, count));
        }

        let data = if node.is_dir() {
            self.read_dir(node, offset, count).await?
        } else {
            let text = match node {
                Node::Index => handlers::read_index(&self.ctx).await,
                Node::NoteFile(h, field) => handlers::read_field(&self.ctx, h, field).await?,
                _ => return Err(NinepError::PermissionDenied),
            };
            window(text.as_bytes(), offset, count).to_vec()
        };
        Ok(Some(ResponseBody::Read { data }))
    }

    /// Serve an `event` read now if an event is queued, otherwise park it.
    fn read_event(
        &mut self,
        tag: u16,
        fid: u32,
        queue: Arc<Mutex<EventQueue>>,
        count: u32,
    ) -> Option<ResponseBody> {
        if let Ok(mut queue) = queue.try_lock() {
            if let Some(data) = queue.try_next(count) {
                return Some(ResponseBody::Read { data });
            }
        }

        self.pending.retain(|_, p| !p.task.is_finished());
        let reply = DeferredReply::new(tag, self.replies.clone());
        let task_reply = reply.clone();
        let task = tokio::spawn(async move {
            let mut queue = queue.lock().await;
            match queue.next(count).await {
                Some(data) => {
                    // A flushed or interrupted read must not consume the bytes.
                    if !task_reply.send(ResponseBody::Read { data: data.clone() }) {
                        queue.restore(data);
                    }
                }
                None => {
                    task_reply.send(ResponseBody::Error {
                        ename: "event stream closed".to_string(),
                    });
                }
            }
        });
        trace!(
            subsystem = "server",
            component = "session",
            conn_id = self.conn_id,
            fid,
            tag,
            "Event read parked"
        );
        self.pending.insert(tag, PendingRead { fid, reply, task });
        None
    }

    async fn read_dir(&self, node: Node, offset: u64, count: u32) -> Result<Vec<u8>> {
        let index = self.ctx.index.read().await;
        if !node.exists(&index) {
            return Err(NinepError::NotFound);
        }
        let mut out = Vec::new();
        let mut pos = 0u64;
        for child in node.children(&index) {
            let Some(stat) = child.stat(&index, &self.ctx.config.uname) else {
                continue;
            };
            let entry = encode_stat(&stat)?;
            if pos >= offset {
                if out.len() + entry.len() > count as usize {
                    break;
                }
                out.extend_from_slice(&entry);
            }
            pos += entry.len() as u64;
        }
        Ok(out)
    }

    async fn write(&mut self, fid: u32, data: &[u8]) -> Result<ResponseBody> {
        let state = self.fids.get(&fid).ok_or(NinepError::UnknownFid(fid))?;
        let mode = state.mode.ok_or(NinepError::NotOpen)?;
        if !mode.can_write() {
            return Err(NinepError::PermissionDenied);
        }
        let node = state.node;

        let text = std::str::from_utf8(data).map_err(|_| NinepError::InvalidUtf8)?;
        let text = text.trim_end_matches(['\n', '\r']);
        match node {
            Node::Ctl => handlers::write_root_ctl(&self.ctx, text).await?,
            Node::New => {
                handlers::write_new(&self.ctx, text).await?;
            }
            Node::NoteFile(h, NoteField::Ctl) => handlers::write_note_ctl(&self.ctx, h, text).await?,
            Node::NoteFile(h, field) => handlers::write_field(&self.ctx, h, field, text).await?,
            _ => return Err(NinepError::PermissionDenied),
        }
        Ok(ResponseBody::Write {
            count: data.len() as u32,
        })
    }

    fn clunk(&mut self, fid: u32) -> Result<()> {
        let state = self.fids.remove(&fid).ok_or(NinepError::UnknownFid(fid))?;
        self.interrupt_reads(fid);
        if let Some(stream) = state.events {
            self.ctx.events.unsubscribe(stream.id);
        }
        Ok(())
    }

    /// Answer every parked read on `fid` with "interrupted".
    fn interrupt_reads(&mut self, fid: u32) {
        let tags: Vec<u16> = self
            .pending
            .iter()
            .filter(|(_, p)| p.fid == fid)
            .map(|(tag, _)| *tag)
            .collect();
        for tag in tags {
            if let Some(pending) = self.pending.remove(&tag) {
                pending.task.abort();
                pending.reply.send(ResponseBody::Error {
                    ename: NinepError::Interrupted.to_string(),
                });
            }
        }
    }

    async fn stat(&self, fid: u32) -> Result<ResponseBody> {
        let state = self.fids.get(&fid).ok_or(NinepError::UnknownFid(fid))?;
        let index = self.ctx.index.read().await;
        let stat = state
            .node
            .stat(&index, &self.ctx.config.uname)
            .ok_or(NinepError::NotFound)?;
        Ok(ResponseBody::Stat { stat })
    }

    /// Accepted as a no-op unless it tries to rename.
    async fn wstat(&self, fid: u32, stat: &Stat) -> Result<ResponseBody> {
        let state = self.fids.get(&fid).ok_or(NinepError::UnknownFid(fid))?;
        let index = self.ctx.index.read().await;
        let name = state.node.name(&index).ok_or(NinepError::NotFound)?;
        if !stat.name.is_empty() && stat.name != name {
            return Err(NinepError::NotSupported);
        }
        Ok(ResponseBody::Wstat)
    }

    /// Drop every fid and parked read without replying.
    fn reset(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.task.abort();
            pending.reply.cancel();
        }
        for (_, state) in self.fids.drain() {
            if let Some(stream) = state.events {
                self.ctx.events.unsubscribe(stream.id);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reset();
    }
}

fn window(bytes: &[u8], offset: u64, count: u32) -> &[u8] {
    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(bytes.len());
    let end = start.saturating_add(count as usize).min(bytes.len());
    &bytes[start..end]
}

/// Serve one connection until the peer disconnects or sends an unreadable
/// frame.
pub async fn serve<S>(ctx: Arc<ServerContext>, stream: S, conn_id: u64) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, writer) = tokio::io::split(stream);
    let (tx, rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_responses(writer, rx, conn_id));

    let mut session = Session::new(ctx, conn_id, tx.clone());
    let result = loop {
        let frame = match read_frame(&mut reader, session.msize()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };

        let response = match decode_request(&frame) {
            Ok(request) => {
                trace!(
                    subsystem = "server",
                    component = "session",
                    conn_id,
                    op = request.body.name(),
                    tag = request.tag,
                    "Request"
                );
                session.handle(request).await
            }
            Err(e) => match peek_tag(&frame) {
                Some(tag) => Some(Response::error(tag, e.to_string())),
                None => break Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string())),
            },
        };

        if let Some(response) = response {
            if tx.send(response).is_err() {
                break Ok(());
            }
        }
    };

    drop(session);
    drop(tx);
    let _ = writer_task.await;

    match &result {
        Ok(()) => info!(subsystem = "server", component = "session", conn_id, "Connection closed"),
        Err(e) => warn!(
            subsystem = "server",
            component = "session",
            conn_id,
            error = %e,
            "Connection dropped"
        ),
    }
    result
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Response>, conn_id: u64)
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let frame = match encode_response(&response) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    subsystem = "server",
                    component = "writer",
                    conn_id,
                    error = %e,
                    "Reply could not be encoded"
                );
                match encode_response(&Response::error(response.tag, e.to_string())) {
                    Ok(frame) => frame,
                    Err(_) => continue,
                }
            }
        };
        if let Err(e) = write_frame(&mut writer, &frame).await {
            debug!(
                subsystem = "server",
                component = "writer",
                conn_id,
                error = %e,
                "Write failed"
            );
            break;
        }
    }
}
