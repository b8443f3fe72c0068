//! Telemetry server
//!
//! One dedicated thread runs a single-threaded tokio runtime that
//! multiplexes every tap connection. Each connection accumulates bytes,
//! decodes frames into the hub's inbound queues and writes back pending
//! outbound frames for the instance id it most recently read.

use crate::error::TelemetryError;
use crate::frame::FrameDecoder;
use crate::hub::TelemetryHub;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Default number of addressable instance ids.
pub const DEFAULT_MAX_INSTANCES: u32 = 25;

/// Server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Instance ids `1..=max_instances` get queues
    pub max_instances: u32,
    /// Connections beyond this are closed on accept
    pub max_connections: usize,
    /// Per-read buffer size in bytes
    pub buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 61499,
            max_instances: DEFAULT_MAX_INSTANCES,
            max_connections: 25,
            buffer_size: 1024,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn with_bind(mut self, address: impl Into<String>, port: u16) -> Self {
        self.bind_address = address.into();
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_max_instances(mut self, max: u32) -> Self {
        self.max_instances = max;
        self
    }

    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }
}

struct Running {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    thread: JoinHandle<()>,
}

/// Non-blocking multiplexed socket server feeding a [`TelemetryHub`]
pub struct TelemetryServer {
    config: ServerConfig,
    hub: Arc<TelemetryHub>,
    running: Option<Running>,
}

impl TelemetryServer {
    /// Create a stopped server with fresh queues
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let hub = Arc::new(TelemetryHub::new(config.max_instances));
        Self::with_hub(config, hub)
    }

    /// Create a stopped server over existing queues
    #[must_use]
    pub fn with_hub(config: ServerConfig, hub: Arc<TelemetryHub>) -> Self {
        Self {
            config,
            hub,
            running: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn hub(&self) -> Arc<TelemetryHub> {
        Arc::clone(&self.hub)
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Address actually bound, once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Start on the configured address and port.
    ///
    /// # Errors
    /// See [`TelemetryServer::start`].
    pub fn start_configured(&mut self) -> Result<SocketAddr, TelemetryError> {
        let address = self.config.bind_address.clone();
        self.start(&address, self.config.port)
    }

    /// Bind a non-blocking listener and spawn the I/O thread.
    ///
    /// Port 0 picks a free port; the bound address is returned.
    ///
    /// # Errors
    /// `AlreadyRunning`, or a bind/runtime/thread failure.
    pub fn start(&mut self, bind_address: &str, port: u16) -> Result<SocketAddr, TelemetryError> {
        if self.running.is_some() {
            return Err(TelemetryError::AlreadyRunning);
        }

        let bind_err = |source| TelemetryError::Bind {
            address: format!("{bind_address}:{port}"),
            source,
        };
        let listener = std::net::TcpListener::bind((bind_address, port)).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(TelemetryError::Runtime)?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let hub = Arc::clone(&self.hub);
        let limits = ConnectionLimits {
            max_connections: self.config.max_connections,
            buffer_size: self.config.buffer_size.max(1),
        };

        let thread = std::thread::Builder::new()
            .name("telemetry-io".to_string())
            .spawn(move || runtime.block_on(accept_loop(listener, hub, shutdown_rx, limits)))
            .map_err(TelemetryError::Spawn)?;

        info!(%local_addr, max_instances = self.hub.max_instances(), "telemetry server listening");
        self.running = Some(Running {
            local_addr,
            shutdown,
            thread,
        });
        Ok(local_addr)
    }

    /// Stop accepting, close every connection and join the I/O thread.
    pub fn shutdown(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.shutdown.send(true);
        if running.thread.join().is_err() {
            error!("telemetry I/O thread panicked");
        }
        info!(local_addr = %running.local_addr, "telemetry server stopped");
    }
}

impl Drop for TelemetryServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TelemetryServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryServer")
            .field("config", &self.config)
            .field("local_addr", &self.local_addr())
            .field("connections", &self.hub.connection_count())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
struct ConnectionLimits {
    max_connections: usize,
    buffer_size: usize,
}

async fn accept_loop(
    listener: std::net::TcpListener,
    hub: Arc<TelemetryHub>,
    mut shutdown: watch::Receiver<bool>,
    limits: ConnectionLimits,
) {
    let listener = match TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, "failed to register listener");
            return;
        }
    };
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if hub.connection_count() >= limits.max_connections {
                        warn!(%peer, max = limits.max_connections, "connection limit reached, closing");
                        drop(stream);
                        continue;
                    }
                    let live = hub.connection_opened();
                    info!(%peer, connections = live, "tap connected");
                    connections.spawn(serve_connection(
                        stream,
                        peer,
                        Arc::clone(&hub),
                        shutdown.clone(),
                        limits.buffer_size,
                    ));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown.changed() => break,
        }
    }

    while connections.join_next().await.is_some() {}
}

async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    hub: Arc<TelemetryHub>,
    mut shutdown: watch::Receiver<bool>,
    buffer_size: usize,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; buffer_size];
    // Write-back follows the instance id of the last frame read on this socket.
    let mut bound: Option<u32> = None;

    loop {
        let signal = bound.and_then(|id| hub.outbound_signal(id));
        let outbound_ready = async move {
            match signal {
                Some(notify) => notify.notified().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            read = stream.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    decoder.extend(&buf[..n]);
                    while let Some(decoded) = decoder.next_frame() {
                        match decoded {
                            Ok(frame) => {
                                let id = frame.instance_id;
                                debug!(%peer, %frame, "frame received");
                                match hub.push_inbound(frame) {
                                    Ok(()) => bound = Some(id),
                                    Err(e) => warn!(%peer, error = %e, "dropping frame"),
                                }
                            }
                            Err(e) => warn!(%peer, error = %e, "dropping malformed frame"),
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) => {
                    warn!(%peer, error = %e, "read failed");
                    break;
                }
            },
            () = outbound_ready => {}
            _ = shutdown.changed() => break,
        }

        if let Some(id) = bound {
            if let Err(e) = write_pending(&mut stream, &hub, id).await {
                warn!(%peer, error = %e, "write failed");
                break;
            }
        }
    }

    let _ = stream.shutdown().await;
    let live = hub.connection_closed();
    info!(%peer, connections = live, "tap disconnected");
}

async fn write_pending(
    stream: &mut TcpStream,
    hub: &TelemetryHub,
    instance_id: u32,
) -> std::io::Result<()> {
    while let Some(frame) = hub.pop_outbound(instance_id) {
        stream.write_all(frame.encode().as_bytes()).await?;
        debug!(%frame, "frame sent");
    }
    Ok(())
}
