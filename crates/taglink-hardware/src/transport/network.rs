//! TCP transport for network attached readers.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use taglink_core::{Error, Result, TransportKind};
use tracing::debug;

use super::{Transport, millis};

/// Default timeout used to establish the TCP connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// TCP transport addressed by `host:port`.
#[derive(Debug)]
pub struct NetworkTransport {
    address: String,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
}

impl NetworkTransport {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: CONNECT_TIMEOUT,
            stream: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::fatal(format!("Connection to {} is not open", self.address)))
    }
}

impl Transport for NetworkTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Network
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let addr = self
            .address
            .to_socket_addrs()
            .map_err(|e| Error::invalid_argument(format!("{}: {e}", self.address)))?
            .next()
            .ok_or_else(|| Error::invalid_argument(format!("{} did not resolve", self.address)))?;

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map_err(|e| Error::from_io(e, millis(self.connect_timeout)))?;
        stream.set_nodelay(true)?;

        debug!(address = %self.address, "Network reader connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            // The peer may already be gone.
            let _ = stream.shutdown(std::net::Shutdown::Both);
            debug!(address = %self.address, "Network reader disconnected");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.stream()?
            .write_all(data)
            .map_err(|e| Error::from_io(e, 0))
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream()?;
        // A zero read timeout means "block forever" for TcpStream.
        stream.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        match stream.read(buf) {
            Ok(0) => Err(Error::fatal("Connection closed by reader")),
            Ok(n) => Ok(n),
            Err(e) => Err(Error::from_io(e, millis(timeout))),
        }
    }

    fn clear_input(&mut self) -> Result<()> {
        let stream = self.stream()?;
        stream.set_nonblocking(true)?;
        let mut scratch = [0u8; 256];
        let result = loop {
            match stream.read(&mut scratch) {
                Ok(0) => break Err(Error::fatal("Connection closed by reader")),
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(Error::from_io(e, 0)),
            }
        };
        stream.set_nonblocking(false)?;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_roundtrip_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).unwrap();
            socket.write_all(&buf).unwrap();
        });

        let mut transport = NetworkTransport::new(address);
        transport.open().unwrap();
        transport.send(&[1, 2, 3, 4]).unwrap();

        let mut received = Vec::new();
        let mut buf = [0u8; 16];
        while received.len() < 4 {
            let n = transport.receive(&mut buf, Duration::from_secs(2)).unwrap();
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, vec![1, 2, 3, 4]);

        server.join().unwrap();
        transport.close().unwrap();
        transport.close().unwrap();
        assert!(!transport.is_open());
    }

    #[test]
    fn test_receive_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let mut transport = NetworkTransport::new(address);
        transport.open().unwrap();
        let (_socket, _) = listener.accept().unwrap();

        let mut buf = [0u8; 8];
        let error = transport.receive(&mut buf, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(error, Error::Timeout { .. }));
    }

    #[test]
    fn test_unresolvable_address() {
        let mut transport = NetworkTransport::new("not an address");
        assert!(matches!(transport.open(), Err(Error::InvalidArgument(_))));
    }
}
