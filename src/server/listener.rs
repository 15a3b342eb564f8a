//! Chat server listener
//!
//! Handles TCP accept loop and spawns connection handlers.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::relay::{Broadcaster, RelayConfig};
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::stats::ServerStats;

#[derive(Debug, Default)]
struct ConnectionCounters {
    total: AtomicU64,
    active: AtomicU64,
    rejected: AtomicU64,
}

/// Chat relay server
pub struct ChatServer {
    config: ServerConfig,
    broadcaster: Arc<Broadcaster>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
    counters: Arc<ConnectionCounters>,
    started_at: Instant,
}

impl ChatServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self::with_relay_config(config, RelayConfig::default())
    }

    /// Create a new server with custom relay configuration
    pub fn with_relay_config(config: ServerConfig, relay_config: RelayConfig) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            broadcaster: Arc::new(Broadcaster::with_config(relay_config)),
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
            counters: Arc::new(ConnectionCounters::default()),
            started_at: Instant::now(),
        }
    }

    /// Get a reference to the broadcaster
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Get server statistics
    pub fn stats(&self) -> ServerStats {
        ServerStats {
            total_connections: self.counters.total.load(Ordering::Relaxed),
            active_connections: self.counters.active.load(Ordering::Relaxed),
            rejected_connections: self.counters.rejected.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already bound listener until `shutdown`
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Chat server listening");

        // Spawn cleanup task for orphaned subscribers
        let cleanup_handle = self.broadcaster.spawn_cleanup_task();

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        };

        // Stop cleanup task on shutdown
        cleanup_handle.abort();

        result
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit; the permit lives as long as the connection
        let permit = match self.connection_semaphore {
            Some(ref sem) => match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            },
            None => None,
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let config = self.config.clone();
        let broadcaster = Arc::clone(&self.broadcaster);
        let counters = Arc::clone(&self.counters);

        counters.total.fetch_add(1, Ordering::Relaxed);
        counters.active.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move {
            let _permit = permit;
            let mut connection = Connection::new(session_id, socket, peer_addr, config, broadcaster);

            if let Err(e) = connection.run().await {
                tracing::debug!(
                    session_id = session_id,
                    error = %e,
                    "Connection error"
                );
            }

            counters.active.fetch_sub(1, Ordering::Relaxed);
            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::BytesMut;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    use super::*;
    use crate::protocol::{Command, LineCodec, Reply};

    struct TcpClient {
        stream: TcpStream,
        buf: BytesMut,
        codec: LineCodec,
    }

    impl TcpClient {
        async fn connect(addr: SocketAddr) -> Self {
            Self {
                stream: TcpStream::connect(addr).await.unwrap(),
                buf: BytesMut::new(),
                codec: LineCodec::new(),
            }
        }

        async fn send(&mut self, command: Command) {
            let mut out = BytesMut::new();
            command.encode(&mut out);
            self.stream.write_all(&out).await.unwrap();
        }

        async fn next(&mut self) -> Option<Reply> {
            let read = async {
                loop {
                    if let Some(reply) = self.codec.decode_reply(&mut self.buf).unwrap() {
                        return Some(reply);
                    }
                    if self.stream.read_buf(&mut self.buf).await.unwrap_or(0) == 0 {
                        return None;
                    }
                }
            };
            tokio::time::timeout(Duration::from_secs(5), read)
                .await
                .expect("reply timed out")
        }
    }

    async fn start(server: Arc<ChatServer>) -> (SocketAddr, oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await
        });

        (addr, tx)
    }

    #[tokio::test]
    async fn test_chat_over_tcp() {
        let server = Arc::new(ChatServer::new(ServerConfig::default()));
        let (addr, shutdown) = start(Arc::clone(&server)).await;

        let mut alice = TcpClient::connect(addr).await;
        alice.send(Command::Join("alice".into())).await;
        assert_eq!(
            alice.next().await,
            Some(Reply::Welcome {
                identity: "alice".into(),
                backlog: 0
            })
        );

        alice.send(Command::Say("first".into())).await;
        assert_eq!(alice.next().await, Some(Reply::Sent { seq: 1 }));
        assert!(matches!(alice.next().await, Some(Reply::Message(_))));

        let mut bob = TcpClient::connect(addr).await;
        bob.send(Command::Join("bob".into())).await;
        assert_eq!(
            bob.next().await,
            Some(Reply::Welcome {
                identity: "bob".into(),
                backlog: 1
            })
        );
        match bob.next().await {
            Some(Reply::Message(line)) => {
                assert_eq!(line.seq, 1);
                assert_eq!(line.sender, "alice");
                assert_eq!(line.body, "first");
            }
            other => panic!("expected MSG, got {:?}", other),
        }

        bob.send(Command::Say("hi alice".into())).await;
        match alice.next().await {
            Some(Reply::Message(line)) => assert_eq!((line.seq, line.body.as_str()), (2, "hi alice")),
            other => panic!("expected MSG, got {:?}", other),
        }

        assert_eq!(server.stats().total_connections, 2);
        shutdown.send(()).unwrap();
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let config = ServerConfig::default().max_connections(1);
        let server = Arc::new(ChatServer::new(config));
        let (addr, shutdown) = start(Arc::clone(&server)).await;

        let mut first = TcpClient::connect(addr).await;
        first.send(Command::Ping).await;
        assert_eq!(first.next().await, Some(Reply::Pong));

        let mut second = TcpClient::connect(addr).await;
        assert_eq!(second.next().await, None);
        assert_eq!(server.stats().rejected_connections, 1);

        drop(first);
        shutdown.send(()).unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_releases_identity() {
        let server = Arc::new(ChatServer::new(ServerConfig::default()));
        let (addr, shutdown) = start(Arc::clone(&server)).await;

        let mut alice = TcpClient::connect(addr).await;
        alice.send(Command::Join("alice".into())).await;
        assert!(matches!(alice.next().await, Some(Reply::Welcome { .. })));
        drop(alice);

        // The server notices the closed socket and unregisters
        let mut joined = true;
        for _ in 0..100 {
            joined = server.broadcaster().is_joined("alice").await;
            if !joined {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!joined);

        let mut again = TcpClient::connect(addr).await;
        again.send(Command::Join("alice".into())).await;
        assert!(matches!(again.next().await, Some(Reply::Welcome { .. })));

        shutdown.send(()).unwrap();
    }
}
