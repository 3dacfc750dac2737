// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Socket RPC transport.
//
// Requests and replies travel over a plain TCP stream as length-prefixed
// frames: a 4-byte little-endian body length followed by the MessagePack
// body.  A connection may carry any number of request/reply pairs; replies
// come back in request order.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use slipway_core::codec;
use slipway_core::config::SocketConfig;
use slipway_core::error::{Result, SlipwayError};
use slipway_core::protocol::{Envelope, Reply};
use slipway_core::types::ServerStatus;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::client::JobClient;
use crate::dispatcher::JobDispatcher;
use crate::handler;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default listening port.
pub const DEFAULT_PORT: u16 = 9999;

/// Largest frame body either side accepts.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

const LENGTH_PREFIX_BYTES: usize = 4;

const INITIAL_BODY_CAPACITY: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// Write one frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, body: &[u8]) -> Result<()> {
    if body.len() > MAX_FRAME_BYTES {
        return Err(SlipwayError::Framing(format!(
            "frame of {} bytes exceeds limit of {MAX_FRAME_BYTES}",
            body.len()
        )));
    }
    let len = (body.len() as u32).to_le_bytes();
    writer
        .write_all(&len)
        .await
        .map_err(|e| SlipwayError::Transport(format!("write frame header: {e}")))?;
    writer
        .write_all(body)
        .await
        .map_err(|e| SlipwayError::Transport(format!("write frame body: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| SlipwayError::Transport(format!("flush frame: {e}")))
}

/// Read one frame.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly between
/// frames; a stream that ends inside a frame is a framing error.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; LENGTH_PREFIX_BYTES];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_BYTES {
        let n = reader
            .read(&mut header[filled..])
            .await
            .map_err(|e| SlipwayError::Transport(format!("read frame header: {e}")))?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(SlipwayError::Framing(format!(
                "stream ended after {filled} header bytes"
            )));
        }
        filled += n;
    }

    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(SlipwayError::Framing(format!(
            "announced frame of {len} bytes exceeds limit of {MAX_FRAME_BYTES}"
        )));
    }

    // Grow with the bytes that actually arrive, not with the announced length.
    let mut body = Vec::with_capacity(len.min(INITIAL_BODY_CAPACITY));
    (&mut *reader)
        .take(len as u64)
        .read_to_end(&mut body)
        .await
        .map_err(|e| SlipwayError::Transport(format!("read frame body: {e}")))?;
    if body.len() < len {
        return Err(SlipwayError::Framing(format!(
            "stream ended after {} bytes of a {len}-byte frame",
            body.len()
        )));
    }
    Ok(Some(body))
}

// ---------------------------------------------------------------------------
// SocketRpcServer
// ---------------------------------------------------------------------------

/// TCP listener that feeds requests to a [`JobDispatcher`].
pub struct SocketRpcServer {
    bind_addr: SocketAddr,
    local_addr: Option<SocketAddr>,
    status: ServerStatus,
    shutdown_signal: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
    active_connections: Arc<AtomicU32>,
}

impl SocketRpcServer {
    /// Create a server for `bind_addr`, in `Stopped` state.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            local_addr: None,
            status: ServerStatus::Stopped,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
            active_connections: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Create a server from the `socket` config section.
    pub fn from_config(config: &SocketConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let bind_addr = addr
            .parse()
            .map_err(|e| SlipwayError::Config(format!("invalid socket address {addr}: {e}")))?;
        Ok(Self::new(bind_addr))
    }

    /// The bound address once running (resolves port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn status(&self) -> ServerStatus {
        self.status
    }

    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Bind and start accepting connections.
    ///
    /// Returns the bound address.  Starting a running server is a no-op.
    pub async fn start(&mut self, dispatcher: Arc<JobDispatcher>) -> Result<SocketAddr> {
        if let (ServerStatus::Running, Some(addr)) = (self.status, self.local_addr) {
            debug!(%addr, "socket RPC server already running");
            return Ok(addr);
        }

        self.status = ServerStatus::Starting;
        let listener = match TcpListener::bind(self.bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.status = ServerStatus::Error;
                return Err(SlipwayError::Transport(format!(
                    "bind {}: {e}",
                    self.bind_addr
                )));
            }
        };
        let local_addr = listener
            .local_addr()
            .map_err(|e| SlipwayError::Transport(format!("local address: {e}")))?;
        info!(addr = %local_addr, "socket RPC server listening");

        let shutdown = Arc::clone(&self.shutdown_signal);
        let connections = Arc::clone(&self.active_connections);
        let handle = tokio::spawn(async move {
            Self::accept_loop(listener, shutdown, connections, dispatcher).await;
        });

        self.task_handle = Some(handle);
        self.local_addr = Some(local_addr);
        self.status = ServerStatus::Running;
        Ok(local_addr)
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    ///
    /// Connections already open are served until their clients disconnect.
    pub async fn stop(&mut self) -> Result<()> {
        if self.status != ServerStatus::Running {
            return Ok(());
        }
        info!(addr = ?self.local_addr, "stopping socket RPC server");
        self.shutdown_signal.notify_one();

        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| SlipwayError::Transport(format!("task join: {e}")))?;
        }
        self.status = ServerStatus::Stopped;
        info!("socket RPC server stopped");
        Ok(())
    }

    async fn accept_loop(
        listener: TcpListener,
        shutdown: Arc<Notify>,
        connections: Arc<AtomicU32>,
        dispatcher: Arc<JobDispatcher>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("accept loop received shutdown signal");
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            debug!(peer = %peer_addr, "incoming RPC connection");
                            let dispatcher = Arc::clone(&dispatcher);
                            let connections = Arc::clone(&connections);
                            tokio::spawn(async move {
                                connections.fetch_add(1, Ordering::Relaxed);
                                if let Err(e) = Self::handle_connection(stream, peer_addr, dispatcher).await {
                                    warn!(peer = %peer_addr, error = %e, "connection handler error");
                                }
                                connections.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }
    }

    /// Serve request frames on one connection until the client hangs up.
    async fn handle_connection(
        mut stream: TcpStream,
        peer_addr: SocketAddr,
        dispatcher: Arc<JobDispatcher>,
    ) -> Result<()> {
        let mut served = 0u64;
        while let Some(body) = read_frame(&mut stream).await? {
            debug!(peer = %peer_addr, bytes = body.len(), "request frame received");
            let reply = handler::handle_request(Arc::clone(&dispatcher), body).await?;
            write_frame(&mut stream, &reply).await?;
            served += 1;
        }
        debug!(peer = %peer_addr, served, "client disconnected");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SocketRpcClient
// ---------------------------------------------------------------------------

/// Client side of the socket transport.
///
/// Replies carry no correlation id, so a call that is interrupted between
/// writing its request and reading the reply leaves the stream out of step.
/// The client then refuses further calls; reconnect to continue.
pub struct SocketRpcClient {
    stream: TcpStream,
    peer: SocketAddr,
    timeout: Duration,
    broken: bool,
}

impl SocketRpcClient {
    /// Connect to a server.  `timeout` bounds the connect and every call.
    #[instrument(skip(timeout))]
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                SlipwayError::Timeout(format!(
                    "connect to {addr} timed out after {}ms",
                    timeout.as_millis()
                ))
            })?
            .map_err(|e| SlipwayError::Transport(format!("connect to {addr}: {e}")))?;
        let peer = stream
            .peer_addr()
            .map_err(|e| SlipwayError::Transport(format!("peer address: {e}")))?;
        info!(%peer, "connected to socket RPC server");
        Ok(Self {
            stream,
            peer,
            timeout,
            broken: false,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Whether an earlier call was interrupted mid-exchange.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Close the connection.
    pub async fn close(mut self) -> Result<()> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| SlipwayError::Transport(format!("shutdown: {e}")))
    }
}

#[async_trait]
impl JobClient for SocketRpcClient {
    async fn call(&mut self, envelope: &Envelope) -> Result<Reply> {
        if self.broken {
            return Err(SlipwayError::Transport(format!(
                "connection to {} is out of step after an interrupted call, reconnect",
                self.peer
            )));
        }
        let body = codec::encode(envelope)?;

        // Cleared only once a whole reply frame has been read.
        self.broken = true;
        let stream = &mut self.stream;
        let exchange = async move {
            write_frame(&mut *stream, &body).await?;
            read_frame(&mut *stream).await
        };

        let frame = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                SlipwayError::Timeout(format!(
                    "no reply from {} within {}ms",
                    self.peer,
                    self.timeout.as_millis()
                ))
            })??
            .ok_or_else(|| SlipwayError::Transport(format!("{} closed the connection", self.peer)))?;
        self.broken = false;
        codec::decode(&frame)
    }
}
