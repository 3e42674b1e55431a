//! tierd - Redis-compatible RESP server
//!
//! A small in-memory server speaking the RESP2 subset the networked cache
//! tier relies on: strings with expiry, counters, cursor scans and pub/sub.
//! It is meant for local development and for hermetic tests, e.g.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! let server = tierd::Server::bind("127.0.0.1:0").await?;
//! let url = format!("redis://{}", server.local_addr()?);
//! tokio::spawn(server.serve());
//! # let _ = url;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod glob;
pub mod handler;
pub mod keyspace;
pub mod resp;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::broker::ConnectionId;
use crate::handler::{CommandHandler, Shared};
use crate::resp::RespValue;

/// Listening server
pub struct Server {
    listener: TcpListener,
    shared: Arc<Shared>,
    next_id: AtomicU64,
}

impl Server {
    /// Bind a listener; port `0` picks a free port
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            shared: Arc::new(Shared::default()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is dropped
    pub async fn serve(self) -> Result<()> {
        info!("Server listening on {}", self.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("New connection from {}", addr);
                    let shared = Arc::clone(&self.shared);
                    let conn = self.next_id.fetch_add(1, Ordering::Relaxed);

                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, shared.clone(), conn).await {
                            error!("Error handling client {}: {}", addr, e);
                        }
                        shared.broker.disconnect(conn);
                        debug!("Connection closed: {}", addr);
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}

async fn handle_client(mut stream: TcpStream, shared: Arc<Shared>, conn: ConnectionId) -> Result<()> {
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel();
    let handler = CommandHandler::new(shared, conn, outbox_tx);
    let mut buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            read = stream.read_buf(&mut buffer) => {
                if read? == 0 {
                    return Ok(());
                }

                let mut out = Vec::new();
                loop {
                    match RespValue::parse(&mut buffer) {
                        Ok(Some(cmd)) => {
                            for reply in handler.handle(cmd) {
                                out.extend_from_slice(&reply.serialize());
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!("Parse error: {}", e);
                            out.extend_from_slice(&RespValue::error(format!("ERR {}", e)).serialize());
                            buffer.clear();
                            break;
                        }
                    }
                }
                stream.write_all(&out).await?;
            }
            Some(push) = outbox_rx.recv() => {
                stream.write_all(&push.serialize()).await?;
            }
        }
    }
}
