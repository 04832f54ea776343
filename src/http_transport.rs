//! Connection-per-flush HTTP transport
//!
//! Every batch is one self-contained exchange:
//!
//! ```text
//! connect ─▶ POST <target> HTTP/1.1 (Content-Length = batch size,
//!            Connection: close) ─▶ read response to EOF, discard ─▶ close
//! ```
//!
//! Nothing is retried. The caller resets its buffer whatever the outcome, so
//! a failed exchange loses that batch and tracing moves on.

use crate::endpoint::Endpoint;
use crate::transport::TransportError;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

const USER_AGENT: &str = concat!("cgtrace/", env!("CARGO_PKG_VERSION"));

/// Posts batches to a fixed endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: Endpoint,
    /// Zero disables timeouts
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Full request bytes (head and body) for `body`
    pub fn build_request(&self, body: &[u8]) -> Vec<u8> {
        let head = format!(
            "POST {} HTTP/1.1\r\n\
             Host: {}\r\n\
             User-Agent: {}\r\n\
             Content-Type: text/plain\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n",
            self.endpoint.target,
            self.endpoint.host_header(),
            USER_AGENT,
            body.len()
        );
        let mut request = Vec::with_capacity(head.len() + body.len());
        request.extend_from_slice(head.as_bytes());
        request.extend_from_slice(body);
        request
    }

    /// Send `body` in one POST and drain the response
    pub fn post(&self, body: &[u8]) -> Result<(), TransportError> {
        let mut stream = self.connect()?;

        if !self.timeout.is_zero() {
            stream
                .set_read_timeout(Some(self.timeout))
                .and_then(|_| stream.set_write_timeout(Some(self.timeout)))
                .map_err(TransportError::Socket)?;
        }

        stream
            .write_all(&self.build_request(body))
            .and_then(|_| stream.flush())
            .map_err(TransportError::Send)?;

        // The response is not interpreted; read until the peer closes.
        let mut sink = [0u8; 4096];
        loop {
            match stream.read(&mut sink) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!("response read ended early: {}", e);
                    break;
                }
            }
        }

        tracing::trace!(bytes = body.len(), endpoint = %self.endpoint, "posted trace batch");
        Ok(())
    }

    fn connect(&self) -> Result<TcpStream, TransportError> {
        let host = self.endpoint.host.as_str();
        let addrs = (host, self.endpoint.port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                host: host.to_string(),
                source,
            })?;

        let mut last_error = None;
        for addr in addrs {
            let attempt = if self.timeout.is_zero() {
                TcpStream::connect(addr)
            } else {
                TcpStream::connect_timeout(&addr, self.timeout)
            };
            match attempt {
                Ok(stream) => return Ok(stream),
                Err(source) => last_error = Some(TransportError::Connect { addr, source }),
            }
        }

        Err(last_error.unwrap_or_else(|| TransportError::NoAddress(host.to_string())))
    }
}
