use crate::base::loadstate::LoadStateCell;
use crate::base::neterror::NetError;
use crate::http::request::Request;
use crate::http2::{H2Settings, Http2Connection};
use crate::socket::client::{NegotiatedProtocol, SocketType, StreamSocket};
use crate::socket::connectjob::ConnectJob;
use crate::socket::pool::{ConnectionPool, PoolConfig};
use crate::socket::tls::TlsConfig;
use std::time::Duration;

/// A transport ready to carry a request.
#[derive(Debug)]
pub enum PooledConnection {
    /// Owned exclusively by one exchange at a time.
    Http1(SocketType),
    /// Shared; the pool keeps a clone while streams are open on it.
    Http2(Http2Connection),
}

impl PooledConnection {
    /// Liveness check applied before reusing a pooled handle.
    fn is_reusable(&self) -> bool {
        match self {
            PooledConnection::Http1(socket) => socket.is_connected_and_idle(),
            PooledConnection::Http2(conn) => conn.is_usable(),
        }
    }
}

/// Wraps the underlying protocol stream (H1/H2).
/// Equivalent to net::HttpStream.
#[derive(Debug)]
pub struct HttpStream {
    pub connection: PooledConnection,
    /// Taken from the pool rather than freshly opened.
    pub reused: bool,
}

#[derive(Debug, Clone)]
pub struct StreamFactoryConfig {
    pub connect_timeout: Duration,
    pub tls: TlsConfig,
    pub h2_settings: H2Settings,
    /// Speak HTTP/2 on cleartext connections without negotiation.
    pub http2_prior_knowledge: bool,
}

impl Default for StreamFactoryConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            tls: TlsConfig::default(),
            h2_settings: H2Settings::default(),
            http2_prior_knowledge: false,
        }
    }
}

/// Hands out pooled or newly opened transports.
/// Equivalent to net::HttpStreamFactory.
#[derive(Debug)]
pub struct HttpStreamFactory {
    pool: ConnectionPool<PooledConnection>,
    config: StreamFactoryConfig,
}

impl HttpStreamFactory {
    pub fn new(pool: PoolConfig, config: StreamFactoryConfig) -> Self {
        Self { pool: ConnectionPool::new(pool), config }
    }

    pub fn pool(&self) -> &ConnectionPool<PooledConnection> {
        &self.pool
    }

    /// Get a transport for `request`. With `fresh` set the pool is bypassed.
    pub async fn request_stream(
        &self,
        request: &Request,
        fresh: bool,
        load_state: &LoadStateCell,
    ) -> Result<HttpStream, NetError> {
        let (host, port) = (request.host.as_str(), request.port);
        if !fresh {
            while let Some(connection) = self.pool.acquire(host, port) {
                if !connection.is_reusable() {
                    tracing::debug!(host = %host, port, "discarding dead pooled connection");
                    continue;
                }
                if let PooledConnection::Http2(conn) = &connection {
                    self.pool.release(host, port, PooledConnection::Http2(conn.clone()));
                }
                return Ok(HttpStream { connection, reused: true });
            }
        }

        let (socket, protocol) =
            ConnectJob::new(host, port, request.is_secure(), &self.config.tls, self.config.connect_timeout)
                .with_load_state(load_state)
                .connect()
                .await?;

        let use_h2 = protocol == NegotiatedProtocol::Http2
            || (!socket.is_secure() && self.config.http2_prior_knowledge);
        let connection = if use_h2 {
            let conn = Http2Connection::handshake(socket, host, self.config.h2_settings).await?;
            self.pool.release(host, port, PooledConnection::Http2(conn.clone()));
            PooledConnection::Http2(conn)
        } else {
            PooledConnection::Http1(socket)
        };
        Ok(HttpStream { connection, reused: false })
    }

    /// Return an HTTP/1.1 socket after a keep-alive exchange.
    pub fn release_socket(&self, host: &str, port: u16, socket: SocketType) -> bool {
        self.pool.release(host, port, PooledConnection::Http1(socket))
    }

    /// Close every pooled connection.
    pub fn close_idle_connections(&self) {
        self.pool.clear();
    }
}
