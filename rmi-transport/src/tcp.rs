//! TCP transport.

use crate::stream::LineStream;
use rmi_core::MessageStream;
use std::io;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use tracing::debug;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 4409;

/// A [`MessageStream`] over one TCP connection.
#[derive(Debug)]
pub struct TcpChannel {
    stream: LineStream<TcpStream, TcpStream>,
    socket: TcpStream,
    shut_down: bool,
}

impl TcpChannel {
    /// Connect to a listening peer.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = TcpStream::connect(addr)?;
        debug!(peer = %socket.peer_addr()?, "connected");
        Self::from_stream(socket)
    }

    /// Wrap an already-accepted connection.
    pub fn from_stream(socket: TcpStream) -> io::Result<Self> {
        socket.set_nodelay(true)?;
        let reader = socket.try_clone()?;
        let writer = socket.try_clone()?;
        Ok(Self {
            stream: LineStream::new(reader, writer),
            socket,
            shut_down: false,
        })
    }
}

impl MessageStream for TcpChannel {
    fn send_line(&mut self, frame: &str) -> io::Result<()> {
        self.stream.send_line(frame)
    }

    fn recv_line(&mut self) -> io::Result<Option<String>> {
        self.stream.recv_line()
    }

    fn close(&mut self) -> io::Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        self.stream.close()?;
        match self.socket.shutdown(Shutdown::Both) {
            // the peer may have shut down first
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn frames_cross_a_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            let mut channel = TcpChannel::from_stream(socket).unwrap();
            let frame = channel.recv_line().unwrap().unwrap();
            channel.send_line(&format!("echo:{}", frame)).unwrap();
            channel.close().unwrap();
        });

        let mut client = TcpChannel::connect(addr).unwrap();
        client.send_line("ping").unwrap();
        assert_eq!(client.recv_line().unwrap(), Some("echo:ping".to_owned()));
        assert_eq!(client.recv_line().unwrap(), None);
        client.close().unwrap();
        server.join().unwrap();
    }

    #[test]
    fn close_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let accepter = thread::spawn(move || listener.accept().unwrap());

        let mut client = TcpChannel::connect(addr).unwrap();
        client.close().unwrap();
        client.close().unwrap();
        accepter.join().unwrap();
    }
}
