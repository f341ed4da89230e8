//! WebSocket session server.
//!
//! Accepts WebSocket connections and serves one session over each.
//!
//! # Connection Flow
//!
//! 1. Bind a `TcpListener` (port 0 picks a free port)
//! 2. Accept loop spawns one task per TCP connection
//! 3. The task upgrades to WebSocket and creates a session
//! 4. `o` is sent and the application's open handler runs
//! 5. Text messages feed the session; session frames go back out
//! 6. On disconnect the session is removed from the registry

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::session::{OpenHandler, Session, SessionOptions};

use super::registry::SessionRegistry;
use super::websocket::serve_connection;

// ============================================================================
// Constants
// ============================================================================

/// Default bind address (localhost).
const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// How often the accept loop checks the shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// ServerOptions
// ============================================================================

/// Where to listen and how to configure sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Address to bind to.
    pub ip: IpAddr,
    /// Port to bind to; 0 picks a free one.
    pub port: u16,
    /// Options for every session the server creates.
    pub session: SessionOptions,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            ip: DEFAULT_BIND_IP,
            port: 0,
            session: SessionOptions::default(),
        }
    }
}

impl ServerOptions {
    /// Creates options for `localhost` on a free port.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bind address.
    #[inline]
    #[must_use]
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = ip;
        self
    }

    /// Sets the port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the options for new sessions.
    #[inline]
    #[must_use]
    pub fn with_session_options(mut self, options: SessionOptions) -> Self {
        self.session = options;
        self
    }
}

// ============================================================================
// SessionServer
// ============================================================================

/// WebSocket server carrying one session per connection.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use bytes::Bytes;
/// use sockjs_session::{ServerOptions, SessionServer};
///
/// # async fn example() -> sockjs_session::Result<()> {
/// let server = SessionServer::bind(ServerOptions::new(), |session| {
///     let echo = session.clone();
///     session.data_handler(Some(Arc::new(move |chunk: Bytes| echo.write(chunk))));
/// })
/// .await?;
///
/// println!("listening on {}", server.ws_url());
/// # Ok(())
/// # }
/// ```
pub struct SessionServer {
    /// Address the listener is bound to.
    local_addr: SocketAddr,
    /// Live sessions.
    registry: Arc<SessionRegistry>,
    /// Shutdown flag.
    shutdown: AtomicBool,
}

// ============================================================================
// SessionServer - Constructor
// ============================================================================

impl SessionServer {
    /// Binds the server and starts the accept loop.
    ///
    /// Must be called inside a tokio runtime; session timers run on it.
    ///
    /// # Arguments
    ///
    /// * `options` - Bind address and session options
    /// * `on_open` - Called with each new session once its open frame is sent
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) outside a tokio runtime
    /// - [`Error::Config`](crate::Error::Config) or
    ///   [`Error::InvalidArgument`](crate::Error::InvalidArgument) for
    ///   invalid session options
    /// - [`Error::Io`](crate::Error::Io) if binding fails
    pub async fn bind(
        options: ServerOptions,
        on_open: impl Fn(Session) + Send + Sync + 'static,
    ) -> Result<Arc<Self>> {
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::current()?);
        let registry = SessionRegistry::new(scheduler, options.session)?;

        let listener = TcpListener::bind(SocketAddr::new(options.ip, options.port)).await?;
        let local_addr = listener.local_addr()?;

        debug!(%local_addr, "Session server bound");

        let server = Arc::new(Self {
            local_addr,
            registry,
            shutdown: AtomicBool::new(false),
        });

        let on_open: OpenHandler = Arc::new(on_open);
        let server_clone = Arc::clone(&server);
        tokio::spawn(async move {
            server_clone.accept_loop(listener, on_open).await;
        });

        info!(%local_addr, "Session server started");

        Ok(server)
    }
}

// ============================================================================
// SessionServer - Public API
// ============================================================================

impl SessionServer {
    /// Returns the bound socket address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the WebSocket URL for this server.
    ///
    /// Format: `ws://{ip}:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Returns the number of live sessions.
    #[inline]
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Returns the session registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Stops accepting connections and destroys every session.
    ///
    /// Connected peers receive `c[3000,"Go away!"]` before their socket is
    /// closed.
    pub fn shutdown(&self) {
        info!(local_addr = %self.local_addr, "Session server shutting down");
        self.shutdown.store(true, Ordering::SeqCst);
        self.registry.shutdown();
    }
}

// ============================================================================
// SessionServer - Accept Loop
// ============================================================================

impl SessionServer {
    /// Background task that accepts new connections.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener, on_open: OpenHandler) {
        debug!("Accept loop started");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                debug!("Accept loop shutting down");
                break;
            }

            // Accept with timeout to allow checking shutdown flag
            match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    debug!(?addr, "TCP connection accepted");
                    let registry = Arc::clone(&self.registry);
                    let on_open = Arc::clone(&on_open);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, registry, on_open).await {
                            warn!(error = %e, ?addr, "Connection handling failed");
                        }
                    });
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                }
                Err(_) => continue,
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    type Client = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn echo_server() -> Arc<SessionServer> {
        SessionServer::bind(ServerOptions::new(), |session: Session| {
            let echo = session.clone();
            session.data_handler(Some(Arc::new(move |chunk: Bytes| echo.write(chunk))));
        })
        .await
        .expect("bind should succeed")
    }

    /// Next text frame, skipping heartbeats; `None` once the socket closes.
    async fn next_frame(client: &mut Client) -> Option<String> {
        loop {
            let message = timeout(Duration::from_secs(5), client.next())
                .await
                .expect("frame within timeout");
            match message {
                Some(Ok(Message::Text(text))) if text.as_str() == "h" => continue,
                Some(Ok(Message::Text(text))) => return Some(text.as_str().to_string()),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn wait_for_count(server: &SessionServer, expected: usize) {
        for _ in 0..100 {
            if server.session_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(server.session_count(), expected);
    }

    #[tokio::test]
    async fn test_server_bind_random_port() {
        let server = echo_server().await;

        assert!(server.port() > 0);
        assert_eq!(server.ws_url(), format!("ws://127.0.0.1:{}", server.port()));
        assert_eq!(server.local_addr().ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(server.session_count(), 0);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_session_options() {
        let options = ServerOptions::new()
            .with_session_options(SessionOptions::new().with_max_queue_chars(0));
        let result = SessionServer::bind(options, |_| {}).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_echo_round_trip() -> anyhow::Result<()> {
        let server = echo_server().await;
        let (mut client, _) = connect_async(server.ws_url()).await?;

        assert_eq!(next_frame(&mut client).await.as_deref(), Some("o"));
        wait_for_count(&server, 1).await;

        client
            .send(Message::Text(r#"["hello","wor\"ld"]"#.into()))
            .await?;

        assert_eq!(next_frame(&mut client).await.as_deref(), Some(r#"a["hello"]"#));
        assert_eq!(next_frame(&mut client).await.as_deref(), Some(r#"a["wor\"ld"]"#));

        client.close(None).await?;
        wait_for_count(&server, 0).await;

        server.shutdown();
        Ok(())
    }

    #[tokio::test]
    async fn test_open_handler_writes_first() {
        let server = SessionServer::bind(ServerOptions::new(), |session: Session| {
            session.write("welcome");
        })
        .await
        .expect("bind should succeed");
        let (mut client, _) = connect_async(server.ws_url()).await.expect("connect");

        assert_eq!(next_frame(&mut client).await.as_deref(), Some("o"));
        assert_eq!(next_frame(&mut client).await.as_deref(), Some(r#"a["welcome"]"#));

        server.shutdown();
    }

    #[tokio::test]
    async fn test_malformed_payload_closes_connection() -> anyhow::Result<()> {
        let server = echo_server().await;
        let (mut client, _) = connect_async(server.ws_url()).await?;
        assert_eq!(next_frame(&mut client).await.as_deref(), Some("o"));

        client.send(Message::Text("not a payload".into())).await?;

        assert_eq!(next_frame(&mut client).await, None);
        wait_for_count(&server, 0).await;

        server.shutdown();
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_sends_go_away() {
        let server = echo_server().await;
        let (mut client, _) = connect_async(server.ws_url()).await.expect("connect");
        assert_eq!(next_frame(&mut client).await.as_deref(), Some("o"));
        wait_for_count(&server, 1).await;

        server.shutdown();

        assert_eq!(
            next_frame(&mut client).await.as_deref(),
            Some(r#"c[3000,"Go away!"]"#)
        );
        assert_eq!(server.session_count(), 0);
    }

    #[tokio::test]
    async fn test_application_close_sends_go_away_on_close() {
        let server = SessionServer::bind(ServerOptions::new(), |session: Session| {
            session.close();
        })
        .await
        .expect("bind should succeed");
        let (mut client, _) = connect_async(server.ws_url()).await.expect("connect");

        assert_eq!(next_frame(&mut client).await.as_deref(), Some("o"));
        assert_eq!(
            next_frame(&mut client).await.as_deref(),
            Some(r#"c[3000,"Go away!"]"#)
        );
        assert_eq!(next_frame(&mut client).await, None);

        server.shutdown();
    }
}
