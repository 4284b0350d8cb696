use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Application protocol selected for a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiatedProtocol {
    Http11,
    Http2,
}

impl NegotiatedProtocol {
    /// Interpret an ALPN protocol id. Anything other than `h2` means HTTP/1.1.
    pub fn from_alpn(alpn: Option<&[u8]>) -> Self {
        match alpn {
            Some(b"h2") => NegotiatedProtocol::Http2,
            _ => NegotiatedProtocol::Http11,
        }
    }
}

/// Represents a connected socket (TCP or SSL).
/// Mimics net::StreamSocket.
pub trait StreamSocket: AsyncRead + AsyncWrite + Unpin + Send + Sync + fmt::Debug {
    /// Returns true if the socket is still connected.
    /// This is a non-blocking check, not a full liveness check.
    fn is_connected(&self) -> bool;

    /// Returns true if the socket is connected and has no pending data.
    /// Matches Chromium's IsConnectedAndIdle().
    fn is_connected_and_idle(&self) -> bool;
}

#[derive(Debug)]
pub enum SocketType {
    Tcp(TcpStream),
    Ssl(tokio_boring::SslStream<TcpStream>),
}

impl SocketType {
    /// Peek at the TCP socket without consuming data.
    /// Returns (connected, has_pending_data).
    fn peek_tcp(stream: &TcpStream) -> (bool, bool) {
        if stream.peer_addr().is_err() {
            return (false, false);
        }
        let mut byte = [0u8; 1];
        let mut buf = tokio::io::ReadBuf::new(&mut byte);
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        match stream.poll_peek(&mut cx, &mut buf) {
            Poll::Pending => (true, false),
            Poll::Ready(Ok(0)) => (false, false), // EOF - peer closed
            Poll::Ready(Ok(_)) => (true, true),
            Poll::Ready(Err(_)) => (false, false),
        }
    }

    fn tcp(&self) -> &TcpStream {
        match self {
            SocketType::Tcp(s) => s,
            SocketType::Ssl(s) => s.get_ref(),
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, SocketType::Ssl(_))
    }

    /// Protocol chosen during the TLS handshake; plain TCP is HTTP/1.1.
    pub fn negotiated_protocol(&self) -> NegotiatedProtocol {
        match self {
            SocketType::Tcp(_) => NegotiatedProtocol::Http11,
            SocketType::Ssl(s) => NegotiatedProtocol::from_alpn(s.ssl().selected_alpn_protocol()),
        }
    }
}

impl AsyncRead for SocketType {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketType::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            SocketType::Ssl(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SocketType {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            SocketType::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            SocketType::Ssl(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketType::Tcp(s) => Pin::new(s).poll_flush(cx),
            SocketType::Ssl(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketType::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            SocketType::Ssl(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

impl StreamSocket for SocketType {
    fn is_connected(&self) -> bool {
        Self::peek_tcp(self.tcp()).0
    }

    fn is_connected_and_idle(&self) -> bool {
        // Unread bytes on an idle HTTP/1.1 socket mean the server sent
        // something unsolicited; such a socket cannot be reused.
        // TLS sockets may hold post-handshake records (session tickets), so
        // pending bytes only count against plain TCP.
        let (connected, pending) = Self::peek_tcp(self.tcp());
        connected && (!pending || self.is_secure())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_alpn_mapping() {
        assert_eq!(NegotiatedProtocol::from_alpn(Some(b"h2")), NegotiatedProtocol::Http2);
        assert_eq!(NegotiatedProtocol::from_alpn(Some(b"http/1.1")), NegotiatedProtocol::Http11);
        assert_eq!(NegotiatedProtocol::from_alpn(None), NegotiatedProtocol::Http11);
    }

    #[tokio::test]
    async fn test_liveness_check_detects_peer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        let socket = SocketType::Tcp(client);
        assert!(socket.is_connected());
        assert!(socket.is_connected_and_idle());

        server.write_all(b"x").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(socket.is_connected());
        assert!(!socket.is_connected_and_idle());

        drop(server);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        // Pending byte is still readable, so only the idle check fails.
        assert!(!socket.is_connected_and_idle());
    }
}
