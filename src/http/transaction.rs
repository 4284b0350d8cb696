use crate::base::loadstate::{LoadState, LoadStateCell};
use crate::base::neterror::NetError;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::retry::RetryConfig;
use crate::http::stream::HttpStreamParser;
use crate::http::streamfactory::{HttpStream, HttpStreamFactory, PooledConnection};
use std::time::Duration;

/// One request/response hop over the network: no redirects, cookies or
/// policy. Transient failures are retried on a freshly opened connection.
pub struct HttpNetworkTransaction<'a> {
    factory: &'a HttpStreamFactory,
    request: &'a Request,
    read_timeout: Duration,
    retry_config: RetryConfig,
    load_state: LoadStateCell,
}

impl<'a> HttpNetworkTransaction<'a> {
    pub fn new(factory: &'a HttpStreamFactory, request: &'a Request, read_timeout: Duration) -> Self {
        Self {
            factory,
            request,
            read_timeout,
            retry_config: RetryConfig::default(),
            load_state: LoadStateCell::default(),
        }
    }

    /// Set custom retry configuration.
    pub fn set_retry_config(&mut self, config: RetryConfig) {
        self.retry_config = config;
    }

    /// Report progress through `cell` instead of a private one.
    pub fn set_load_state_cell(&mut self, cell: LoadStateCell) {
        self.load_state = cell;
    }

    /// Get the current load state (for progress reporting).
    pub fn get_load_state(&self) -> LoadState {
        self.load_state.get()
    }

    pub async fn start(&self) -> Result<Response, NetError> {
        let mut retries = 0;
        let result = loop {
            match self.do_attempt(retries > 0).await {
                Ok(response) => break Ok(response),
                Err(e) => {
                    let Some(reason) = self.retry_config.should_retry(&e, retries) else {
                        break Err(e);
                    };
                    retries += 1;
                    tracing::debug!(
                        host = %self.request.host,
                        port = self.request.port,
                        error = %e,
                        ?reason,
                        "retrying on a fresh connection"
                    );
                    if !self.retry_config.delay.is_zero() {
                        tokio::time::sleep(self.retry_config.delay).await;
                    }
                }
            }
        };
        self.load_state.set(LoadState::Idle);
        result
    }

    async fn do_attempt(&self, fresh: bool) -> Result<Response, NetError> {
        self.load_state.set(LoadState::Connecting);
        let HttpStream { connection, reused } =
            self.factory.request_stream(self.request, fresh, &self.load_state).await?;
        if reused {
            tracing::trace!(host = %self.request.host, port = self.request.port, "using pooled connection");
        }

        match connection {
            PooledConnection::Http1(mut socket) => {
                let exchange = {
                    let mut parser = HttpStreamParser::new(&mut socket, self.read_timeout)
                        .with_load_state(self.load_state.clone());
                    parser.send_request(self.request).await?;
                    parser.read_response(self.request.method == http::Method::HEAD).await?
                };
                if exchange.reusable {
                    self.factory.release_socket(&self.request.host, self.request.port, socket);
                } else {
                    tracing::trace!(host = %self.request.host, "closing non-reusable connection");
                }
                Ok(exchange.response)
            }
            PooledConnection::Http2(conn) => {
                self.load_state.set(LoadState::WaitingForResponse);
                conn.send_request(self.request, self.read_timeout).await
            }
        }
    }
}
