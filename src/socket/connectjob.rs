use crate::base::context::IoResultExt;
use crate::base::loadstate::{LoadState, LoadStateCell};
use crate::base::neterror::NetError;
use crate::socket::client::{NegotiatedProtocol, SocketType};
use crate::socket::tls::TlsConfig;
use boring::ssl::{SslConnector, SslMethod};
use std::time::Duration;
use tokio::net::TcpStream;

/// Manages the connection process: DNS -> TCP -> SSL.
/// Roughly equivalent to net::ConnectJob.
#[derive(Debug, Clone)]
pub struct ConnectJob<'a> {
    host: &'a str,
    port: u16,
    secure: bool,
    tls: &'a TlsConfig,
    timeout: Duration,
    load_state: Option<&'a LoadStateCell>,
}

impl<'a> ConnectJob<'a> {
    pub fn new(host: &'a str, port: u16, secure: bool, tls: &'a TlsConfig, timeout: Duration) -> Self {
        Self { host, port, secure, tls, timeout, load_state: None }
    }

    /// Report progress through `cell` while connecting.
    pub fn with_load_state(mut self, cell: &'a LoadStateCell) -> Self {
        self.load_state = Some(cell);
        self
    }

    fn report(&self, state: LoadState) {
        if let Some(cell) = self.load_state {
            cell.set(state);
        }
    }

    /// Open a transport, bounded by the connect timeout.
    pub async fn connect(&self) -> Result<(SocketType, NegotiatedProtocol), NetError> {
        match tokio::time::timeout(self.timeout, self.connect_inner()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(host = %self.host, port = self.port, "connect timed out");
                Err(NetError::ConnectionTimedOut)
            }
        }
    }

    async fn connect_inner(&self) -> Result<(SocketType, NegotiatedProtocol), NetError> {
        self.report(LoadState::Connecting);
        // Bracketed IPv6 literals resolve without the brackets.
        let bare_host = self.host.trim_start_matches('[').trim_end_matches(']');

        // 1. DNS Resolution
        let addrs: Vec<_> = tokio::net::lookup_host((bare_host, self.port))
            .await
            .dns_context(bare_host)?
            .collect();
        if addrs.is_empty() {
            return Err(NetError::NameNotResolved);
        }

        // 2. TCP Connect, first address that answers wins
        let mut last_err = NetError::ConnectionFailed;
        let mut stream = None;
        for addr in addrs {
            match TcpStream::connect(addr).await.connection_context(self.host, self.port) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_err = e,
            }
        }
        let stream = stream.ok_or(last_err)?;
        let _ = stream.set_nodelay(true);

        if !self.secure {
            tracing::trace!(host = %self.host, port = self.port, "tcp connected");
            return Ok((SocketType::Tcp(stream), NegotiatedProtocol::Http11));
        }

        // 3. SSL Handshake
        self.report(LoadState::SslHandshake);
        let mut builder =
            SslConnector::builder(SslMethod::tls()).map_err(|_| NetError::SslProtocolError)?;
        self.tls.apply_to_builder(&mut builder)?;
        let connector = builder.build();

        let mut config = connector.configure().map_err(|_| NetError::SslProtocolError)?;
        config.set_use_server_name_indication(TlsConfig::should_set_sni(bare_host));
        config.set_verify_hostname(self.tls.verify_peer);

        let tls_stream = tokio_boring::connect(config, bare_host, stream).await.map_err(|e| {
            tracing::debug!(host = %self.host, port = self.port, error = %e, "ssl handshake failed");
            NetError::SslProtocolError
        })?;

        let socket = SocketType::Ssl(tls_stream);
        let protocol = socket.negotiated_protocol();
        tracing::debug!(host = %self.host, port = self.port, ?protocol, "tls connected");
        Ok((socket, protocol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_plain_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _conn = listener.accept().await;
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let tls = TlsConfig::default();
        let (socket, protocol) = ConnectJob::new("127.0.0.1", port, false, &tls, Duration::from_secs(5))
            .connect()
            .await
            .unwrap();
        assert!(!socket.is_secure());
        assert_eq!(protocol, NegotiatedProtocol::Http11);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind then drop to get a port with nothing listening.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let tls = TlsConfig::default();
        let err = ConnectJob::new("127.0.0.1", port, false, &tls, Duration::from_secs(5))
            .connect()
            .await
            .unwrap_err();
        assert_eq!(err, NetError::ConnectionRefused);
    }
}
