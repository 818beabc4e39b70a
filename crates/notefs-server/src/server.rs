//! TCP listener: accepts connections and runs one session task per client.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::context::ServerContext;
use crate::session;

/// Listening note server.
pub struct NoteServer {
    ctx: Arc<ServerContext>,
    listener: TcpListener,
    next_conn: AtomicU64,
}

impl NoteServer {
    /// Bind to `ctx.config.addr`.
    pub async fn bind(ctx: Arc<ServerContext>) -> io::Result<Self> {
        let listener = TcpListener::bind(&ctx.config.addr).await?;
        Ok(Self {
            ctx,
            listener,
            next_conn: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Accept connections until `shutdown` resolves, then stop every open
    /// session.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            subsystem = "server",
            component = "listener",
            addr = %self.local_addr()?,
            "Listening"
        );

        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(subsystem = "server", component = "listener", "Shutdown requested");
                    break;
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!(
                                subsystem = "server",
                                component = "listener",
                                error = %e,
                                "Accept failed"
                            );
                            continue;
                        }
                    };
                    let _ = stream.set_nodelay(true);
                    let conn_id = self.next_conn.fetch_add(1, Ordering::Relaxed);
                    info!(
                        subsystem = "server",
                        component = "listener",
                        conn_id,
                        peer = %peer,
                        "Connection accepted"
                    );
                    let ctx = self.ctx.clone();
                    sessions.spawn(async move {
                        let _ = session::serve(ctx, stream, conn_id).await;
                    });
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(subsystem = "server", component = "listener", error = ?e, "Session task panicked");
                        }
                    }
                }
            }
        }

        debug!(
            subsystem = "server",
            component = "listener",
            open = sessions.len(),
            "Stopping sessions"
        );
        sessions.shutdown().await;
        info!(subsystem = "server", component = "listener", "Server stopped");
        Ok(())
    }
}
