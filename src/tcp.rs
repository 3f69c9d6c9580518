use crate::transport::{is_timeout, ReceiveMode, ResponseBuffer, Transport};
use crate::{Error, Result};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Silence that ends a raw response once its first bytes arrived.
const FRAME_GAP: Duration = Duration::from_millis(50);

/// Serial-to-Ethernet gateway, or any other raw TCP bridge to the BMS.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let address = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Cannot resolve '{host}'"),
            ))
        })?;
        let stream = TcpStream::connect_timeout(&address, timeout)?;
        stream.set_nodelay(true)?;
        log::debug!("Connected to {address}");
        Ok(Self { stream })
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        log::trace!("send_bytes: {:02X?}", bytes);
        self.stream.write_all(bytes)?;
        Ok(())
    }

    fn receive(&mut self, timeout: Duration, mode: ReceiveMode) -> Result<Option<Vec<u8>>> {
        let mut response = ResponseBuffer::new(mode);
        let mut chunk = [0u8; 1024];
        self.stream.set_read_timeout(Some(timeout))?;
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "Connection closed by peer",
                    )))
                }
                Ok(received) => {
                    if response.push(&chunk[..received]) {
                        break;
                    }
                    if mode == ReceiveMode::Raw {
                        self.stream.set_read_timeout(Some(FRAME_GAP))?;
                    }
                }
                Err(err) if is_timeout(&err) => break,
                Err(err) => return Err(err.into()),
            }
        }
        let response = response.finish();
        log::trace!("receive_bytes: {:02X?}", response);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn line_exchange_test() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut request = [0u8; 4];
            socket.read_exact(&mut request).unwrap();
            socket.write_all(b"~2501\r").unwrap();
            request
        });

        let mut transport =
            TcpTransport::connect("127.0.0.1", port, Duration::from_secs(1)).unwrap();
        transport.send(b"ping").unwrap();
        let response = transport
            .receive(Duration::from_secs(2), ReceiveMode::Line)
            .unwrap();
        assert_eq!(response, Some(b"~2501".to_vec()));
        assert_eq!(&server.join().unwrap(), b"ping");
    }

    #[test]
    fn receive_timeout_test() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(300));
            drop(socket);
        });

        let mut transport =
            TcpTransport::connect("127.0.0.1", port, Duration::from_secs(1)).unwrap();
        let response = transport
            .receive(Duration::from_millis(50), ReceiveMode::Raw)
            .unwrap();
        assert_eq!(response, None);
        server.join().unwrap();
    }
}
