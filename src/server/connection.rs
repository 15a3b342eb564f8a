//! Per-connection driver
//!
//! Reads command lines from the client, feeds them to its `ChatSession`
//! and writes replies plus the live message tail back. Generic over the
//! stream so tests can drive it through an in-memory duplex pipe.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{self, Instant};

use crate::error::{Error, Result};
use crate::protocol::{Command, LineCodec, ProtocolError, Reply};
use crate::relay::{Broadcaster, RelayError};
use crate::server::config::ServerConfig;
use crate::session::{ChatSession, LeaveReason};

type Inbound = Option<std::result::Result<Command, ProtocolError>>;

/// A single client connection
pub struct Connection<S> {
    session: ChatSession,
    stream: S,
    peer_addr: SocketAddr,
    config: ServerConfig,
    codec: LineCodec,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a connection driver for an accepted stream
    pub fn new(
        session_id: u64,
        stream: S,
        peer_addr: SocketAddr,
        config: ServerConfig,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        let codec = LineCodec::with_max_length(config.max_line_length);
        let read_buf = BytesMut::with_capacity(config.read_buffer_size);

        Self {
            session: ChatSession::new(session_id, peer_addr, broadcaster),
            stream,
            peer_addr,
            config,
            codec,
            read_buf,
            write_buf: BytesMut::new(),
        }
    }

    /// Drive the connection until the client leaves or fails
    ///
    /// The session is always left before this returns, whatever the outcome.
    pub async fn run(&mut self) -> Result<()> {
        let outcome = self.drive().await;

        let reason = match &outcome {
            Ok(reason) => *reason,
            Err(Error::Timeout(_)) => LeaveReason::DeliveryFailed,
            Err(_) => LeaveReason::Disconnected,
        };

        self.session.leave(reason).await;

        tracing::debug!(
            session_id = self.session.id(),
            peer = %self.peer_addr,
            reason = %reason,
            "Connection finished"
        );

        outcome.map(|_| ())
    }

    /// Session driven by this connection
    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    async fn drive(&mut self) -> Result<LeaveReason> {
        match self.await_join().await? {
            Some(reason) => Ok(reason),
            None => self.serve().await,
        }
    }

    /// Connecting phase: wait for a successful JOIN
    ///
    /// Returns `None` once joined, or the reason the client went away first.
    async fn await_join(&mut self) -> Result<Option<LeaveReason>> {
        let deadline = Instant::now() + self.config.connection_timeout;

        loop {
            let read = time::timeout_at(
                deadline,
                read_command(&mut self.stream, &mut self.read_buf, self.codec),
            )
            .await;

            let Ok(read) = read else {
                self.send(Reply::error("timeout", "no JOIN received"))
                    .await
                    .ok();
                return Ok(Some(LeaveReason::TimedOut));
            };

            let Some(command) = self.check_read(read).await? else {
                return Ok(Some(LeaveReason::Disconnected));
            };

            match command {
                Ok(Command::Join(identity)) => match self.session.join(&identity).await {
                    Ok(backlog) => {
                        Reply::Welcome {
                            identity,
                            backlog: backlog.len(),
                        }
                        .encode(&mut self.write_buf);
                        for message in &backlog {
                            Reply::from(message).encode(&mut self.write_buf);
                        }
                        self.flush().await?;
                        return Ok(None);
                    }
                    Err(e) => self.send(Reply::error(e.code(), &e)).await?,
                },
                Ok(Command::Ping) => self.send(Reply::Pong).await?,
                Ok(Command::Leave) => {
                    self.send(Reply::Bye).await?;
                    return Ok(Some(LeaveReason::Requested));
                }
                Ok(Command::Say(_)) => {
                    let e = RelayError::NotJoined;
                    self.send(Reply::error(e.code(), &e)).await?;
                }
                Err(e) => self.send(Reply::error(e.code(), &e)).await?,
            }
        }
    }

    /// Joined phase: relay commands and live messages
    async fn serve(&mut self) -> Result<LeaveReason> {
        let idle = self.config.idle_timeout;
        let mut deadline = Instant::now() + idle;

        loop {
            tokio::select! {
                read = read_command(&mut self.stream, &mut self.read_buf, self.codec) => {
                    let Some(command) = self.check_read(read).await? else {
                        return Ok(LeaveReason::Disconnected);
                    };
                    deadline = Instant::now() + idle;

                    match command {
                        Ok(Command::Say(text)) => {
                            let message = self.session.publish(&text).await?;
                            self.send(Reply::Sent { seq: message.seq() }).await?;
                        }
                        Ok(Command::Ping) => self.send(Reply::Pong).await?,
                        Ok(Command::Leave) => {
                            self.send(Reply::Bye).await?;
                            return Ok(LeaveReason::Requested);
                        }
                        Ok(Command::Join(_)) => {
                            let e = RelayError::AlreadyJoined;
                            self.send(Reply::error(e.code(), &e)).await?;
                        }
                        Err(e) => self.send(Reply::error(e.code(), &e)).await?,
                    }
                }
                received = self.session.recv() => match received {
                    Ok(message) => self.send(Reply::from(&message)).await?,
                    Err(RelayError::SlowConsumer { dropped, .. }) => {
                        self.send(Reply::Dropped { count: dropped }).await?;
                    }
                    Err(e) => {
                        self.send(Reply::error(e.code(), &e)).await.ok();
                        return Ok(LeaveReason::Evicted);
                    }
                },
                _ = time::sleep_until(deadline) => {
                    self.send(Reply::error("timeout", "idle timeout")).await.ok();
                    return Ok(LeaveReason::TimedOut);
                }
            }
        }
    }

    /// Report framing errors to the client before giving up on the stream
    async fn check_read(&mut self, read: Result<Inbound>) -> Result<Inbound> {
        match read {
            // Recoverable errors go back to the caller like a parse error
            Err(Error::Protocol(e)) if !e.is_fatal() => Ok(Some(Err(e))),
            Err(Error::Protocol(e)) => {
                tracing::debug!(
                    session_id = self.session.id(),
                    peer = %self.peer_addr,
                    error = %e,
                    "Unframeable input"
                );
                self.send(Reply::error(e.code(), &e)).await.ok();
                Err(Error::Protocol(e))
            }
            other => other,
        }
    }

    async fn send(&mut self, reply: Reply) -> Result<()> {
        tracing::trace!(session_id = self.session.id(), reply = %reply, "Send");
        reply.encode(&mut self.write_buf);
        self.flush().await
    }

    async fn flush(&mut self) -> Result<()> {
        let stream = &mut self.stream;
        let buf = &self.write_buf;

        let write = async move {
            stream.write_all(buf).await?;
            stream.flush().await?;
            Ok::<_, std::io::Error>(())
        };

        let written = time::timeout(self.config.write_timeout, write).await;
        self.write_buf.clear();

        match written {
            Ok(result) => Ok(result?),
            Err(_) => Err(Error::Timeout("write")),
        }
    }
}

/// Read until one full line is buffered
///
/// Cancel safe: bytes read before cancellation stay in `buf`.
async fn read_command<R>(stream: &mut R, buf: &mut BytesMut, codec: LineCodec) -> Result<Inbound>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(command) = codec.decode_command(buf)? {
            return Ok(Some(command));
        }

        if stream.read_buf(buf).await? == 0 {
            return Ok(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::relay::RelayConfig;

    struct TestClient {
        stream: DuplexStream,
        buf: BytesMut,
        codec: LineCodec,
    }

    impl TestClient {
        async fn send(&mut self, command: Command) {
            let mut out = BytesMut::new();
            command.encode(&mut out);
            self.stream.write_all(&out).await.unwrap();
        }

        async fn send_raw(&mut self, bytes: &[u8]) {
            self.stream.write_all(bytes).await.unwrap();
        }

        /// Next reply, or None at EOF
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
            time::timeout(Duration::from_secs(5), read)
                .await
                .expect("reply timed out")
        }

        async fn next_message(&mut self) -> (u64, String, String) {
            match self.next().await {
                Some(Reply::Message(line)) => (line.seq, line.sender, line.body),
                other => panic!("expected MSG, got {:?}", other),
            }
        }
    }

    fn spawn_connection(
        id: u64,
        config: ServerConfig,
        broadcaster: &Arc<Broadcaster>,
        pipe_size: usize,
    ) -> (TestClient, JoinHandle<Result<()>>) {
        let (client, server) = tokio::io::duplex(pipe_size);
        let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000 + id as u16);
        let mut connection = Connection::new(id, server, peer, config, Arc::clone(broadcaster));

        let task = tokio::spawn(async move { connection.run().await });
        let client = TestClient {
            stream: client,
            buf: BytesMut::new(),
            codec: LineCodec::new(),
        };
        (client, task)
    }

    async fn joined(
        id: u64,
        identity: &str,
        broadcaster: &Arc<Broadcaster>,
    ) -> (TestClient, JoinHandle<Result<()>>) {
        let (mut client, task) = spawn_connection(id, ServerConfig::default(), broadcaster, 64 * 1024);
        client.send(Command::Join(identity.into())).await;
        match client.next().await {
            Some(Reply::Welcome { backlog, .. }) => {
                for _ in 0..backlog {
                    client.next_message().await;
                }
            }
            other => panic!("expected WELCOME, got {:?}", other),
        }
        (client, task)
    }

    #[tokio::test]
    async fn test_join_replays_backlog() {
        let broadcaster = Arc::new(Broadcaster::new());
        broadcaster.publish("bob", "hi").await;
        broadcaster.publish("bob", "anyone?").await;

        let (mut client, _task) = spawn_connection(1, ServerConfig::default(), &broadcaster, 4096);
        client.send(Command::Join("alice".into())).await;

        assert_eq!(
            client.next().await,
            Some(Reply::Welcome {
                identity: "alice".into(),
                backlog: 2
            })
        );
        assert_eq!(client.next_message().await, (1, "bob".into(), "hi".into()));
        assert_eq!(client.next_message().await, (2, "bob".into(), "anyone?".into()));
    }

    #[tokio::test]
    async fn test_say_acks_and_fans_out() {
        let broadcaster = Arc::new(Broadcaster::new());
        let (mut alice, _a) = joined(1, "alice", &broadcaster).await;
        let (mut bob, _b) = joined(2, "bob", &broadcaster).await;

        alice.send(Command::Say("hello bob".into())).await;

        assert_eq!(alice.next().await, Some(Reply::Sent { seq: 1 }));
        assert_eq!(alice.next_message().await, (1, "alice".into(), "hello bob".into()));
        assert_eq!(bob.next_message().await, (1, "alice".into(), "hello bob".into()));
    }

    #[tokio::test]
    async fn test_say_before_join() {
        let broadcaster = Arc::new(Broadcaster::new());
        let (mut client, _task) = spawn_connection(1, ServerConfig::default(), &broadcaster, 4096);

        client.send(Command::Say("too early".into())).await;
        match client.next().await {
            Some(Reply::Error { code, .. }) => assert_eq!(code, "not-joined"),
            other => panic!("expected ERR, got {:?}", other),
        }

        client.send(Command::Ping).await;
        assert_eq!(client.next().await, Some(Reply::Pong));
        assert_eq!(broadcaster.stats().await.total_published, 0);
    }

    #[tokio::test]
    async fn test_duplicate_identity_then_retry() {
        let broadcaster = Arc::new(Broadcaster::new());
        let (_alice, _a) = joined(1, "alice", &broadcaster).await;
        let (mut other, _o) = spawn_connection(2, ServerConfig::default(), &broadcaster, 4096);

        other.send(Command::Join("alice".into())).await;
        match other.next().await {
            Some(Reply::Error { code, .. }) => assert_eq!(code, "duplicate-identity"),
            reply => panic!("expected ERR, got {:?}", reply),
        }

        other.send(Command::Join("alice2".into())).await;
        assert!(matches!(other.next().await, Some(Reply::Welcome { .. })));
        assert_eq!(broadcaster.subscriber_count().await, 2);
    }

    #[tokio::test]
    async fn test_unknown_command_keeps_connection() {
        let broadcaster = Arc::new(Broadcaster::new());
        let (mut client, _task) = joined(1, "alice", &broadcaster).await;

        client.send_raw(b"SHOUT hi\r\n").await;
        match client.next().await {
            Some(Reply::Error { code, .. }) => assert_eq!(code, "bad-command"),
            other => panic!("expected ERR, got {:?}", other),
        }

        client.send(Command::Ping).await;
        assert_eq!(client.next().await, Some(Reply::Pong));
    }

    #[tokio::test]
    async fn test_leave_says_bye_and_unregisters() {
        let broadcaster = Arc::new(Broadcaster::new());
        let (mut client, task) = joined(1, "alice", &broadcaster).await;

        client.send(Command::Leave).await;
        assert_eq!(client.next().await, Some(Reply::Bye));

        task.await.unwrap().unwrap();
        assert!(!broadcaster.is_joined("alice").await);
        assert_eq!(client.next().await, None);
    }

    #[tokio::test]
    async fn test_disconnect_unregisters() {
        let broadcaster = Arc::new(Broadcaster::new());
        let (client, task) = joined(1, "alice", &broadcaster).await;

        drop(client);

        task.await.unwrap().unwrap();
        assert!(!broadcaster.is_joined("alice").await);
    }

    #[tokio::test]
    async fn test_join_timeout() {
        let broadcaster = Arc::new(Broadcaster::new());
        let config = ServerConfig::default().connection_timeout(Duration::from_millis(50));
        let (mut client, task) = spawn_connection(1, config, &broadcaster, 4096);

        match client.next().await {
            Some(Reply::Error { code, .. }) => assert_eq!(code, "timeout"),
            other => panic!("expected ERR, got {:?}", other),
        }
        assert_eq!(client.next().await, None);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_idle_timeout_unregisters() {
        let broadcaster = Arc::new(Broadcaster::new());
        let config = ServerConfig::default().idle_timeout(Duration::from_millis(50));
        let (mut client, task) = spawn_connection(1, config, &broadcaster, 4096);

        client.send(Command::Join("alice".into())).await;
        assert!(matches!(client.next().await, Some(Reply::Welcome { .. })));

        match client.next().await {
            Some(Reply::Error { code, .. }) => assert_eq!(code, "timeout"),
            other => panic!("expected ERR, got {:?}", other),
        }
        task.await.unwrap().unwrap();
        assert!(!broadcaster.is_joined("alice").await);
    }

    #[tokio::test]
    async fn test_line_too_long_closes() {
        let broadcaster = Arc::new(Broadcaster::new());
        let config = ServerConfig::default().max_line_length(16);
        let (mut client, task) = spawn_connection(1, config, &broadcaster, 4096);

        client.send_raw(b"SAY this line is far too long\n").await;
        match client.next().await {
            Some(Reply::Error { code, .. }) => assert_eq!(code, "line-too-long"),
            other => panic!("expected ERR, got {:?}", other),
        }

        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::LineTooLong(16)))
        ));
    }

    #[tokio::test]
    async fn test_crlf_line_at_limit_is_accepted() {
        let broadcaster = Arc::new(Broadcaster::new());
        let config = ServerConfig::default().max_line_length(10);
        let (mut client, _task) = spawn_connection(1, config, &broadcaster, 4096);

        client.send_raw(b"JOIN alice\r").await;
        tokio::task::yield_now().await;
        client.send_raw(b"\n").await;

        assert_eq!(
            client.next().await,
            Some(Reply::Welcome {
                identity: "alice".into(),
                backlog: 0
            })
        );
        assert!(broadcaster.is_joined("alice").await);
    }

    #[tokio::test]
    async fn test_evicted_session_closes() {
        let broadcaster = Arc::new(Broadcaster::new());
        let (mut client, task) = joined(1, "alice", &broadcaster).await;

        broadcaster.leave("alice").await;

        match client.next().await {
            Some(Reply::Error { code, .. }) => assert_eq!(code, "subscriber-not-found"),
            other => panic!("expected ERR, got {:?}", other),
        }
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stalled_client_is_dropped() {
        let broadcaster = Arc::new(Broadcaster::with_config(
            RelayConfig::default().subscriber_buffer(8),
        ));
        let config = ServerConfig::default().write_timeout(Duration::from_millis(50));
        let (mut stalled, task) = spawn_connection(1, config, &broadcaster, 256);
        stalled.send(Command::Join("stalled".into())).await;

        let (mut healthy, _h) = joined(2, "healthy", &broadcaster).await;

        // The stalled client never reads; its pipe fills up
        for seq in 1..=200u64 {
            broadcaster.publish("p", &format!("message number {}", seq)).await;
            assert_eq!(healthy.next_message().await.0, seq);
        }

        let result = task.await.unwrap();
        assert!(matches!(result, Err(Error::Timeout("write"))));
        assert!(!broadcaster.is_joined("stalled").await);
        assert!(broadcaster.is_joined("healthy").await);
    }
}
