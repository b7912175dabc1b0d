//! The transport port: byte-stream connect and TLS upgrade, consumed by the
//! engine and implemented outside the core (or by [`PlainTransport`] for
//! cleartext use).

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;

/// Opens byte streams and performs TLS handshakes. Send/receive/close are
/// expressed through the stream's `Read`/`Write`/`Drop`.
///
/// Connect and read timeouts belong to the implementation; on timeout the
/// engine marks the connection faulted and never reuses it.
pub trait Transport {
    type Stream: Read + Write;

    /// Open a plain byte stream to `host:port`.
    fn connect(&mut self, host: &str, port: u16) -> io::Result<Self::Stream>;

    /// Upgrade an established stream to TLS for `host` (SNI / certificate
    /// validation). Called for https targets, and for tunneled streams after
    /// a successful CONNECT.
    fn handshake(&mut self, stream: Self::Stream, host: &str) -> io::Result<Self::Stream>;
}

/// Cleartext TCP transport. TLS targets need an external implementation.
#[derive(Debug, Default)]
pub struct PlainTransport {
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

impl PlainTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for PlainTransport {
    type Stream = TcpStream;

    fn connect(&mut self, host: &str, port: u16) -> io::Result<TcpStream> {
        debug!("connecting to {host}:{port}");
        let stream = match self.connect_timeout {
            Some(timeout) => {
                let mut last_err = None;
                let mut connected = None;
                for addr in (host, port).to_socket_addrs()? {
                    match TcpStream::connect_timeout(&addr, timeout) {
                        Ok(s) => {
                            connected = Some(s);
                            break;
                        }
                        Err(e) => last_err = Some(e),
                    }
                }
                match connected {
                    Some(s) => s,
                    None => {
                        return Err(last_err.unwrap_or_else(|| {
                            io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")
                        }))
                    }
                }
            }
            None => TcpStream::connect((host, port))?,
        };
        stream.set_read_timeout(self.read_timeout)?;
        stream.set_write_timeout(self.write_timeout)?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn handshake(&mut self, _stream: TcpStream, host: &str) -> io::Result<TcpStream> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("TLS to {host} requires an external transport implementation"),
        ))
    }
}
