//! The byte-stream boundary: one newline-terminated frame per logical read
//! or write. Concrete transports (TCP, child-process pipes, arbitrary
//! reader/writer pairs) implement this in `rmi-transport`; the in-memory
//! duplex pair here backs same-process node pairs and tests.

use std::io;
use std::sync::mpsc::{channel, Receiver, Sender};

/// A duplex, ordered, reliable frame stream. `recv_line` blocks; `Ok(None)`
/// means the peer hung up.
pub trait MessageStream: Send {
    fn send_line(&mut self, frame: &str) -> io::Result<()>;
    fn recv_line(&mut self) -> io::Result<Option<String>>;
    fn close(&mut self) -> io::Result<()>;
}

/// One end of an in-memory duplex connection.
#[derive(Debug)]
pub struct MemoryStream {
    tx: Option<Sender<String>>,
    rx: Receiver<String>,
}

/// Build a connected pair of in-memory duplex streams.
pub fn memory_pair() -> (MemoryStream, MemoryStream) {
    let (a_tx, b_rx) = channel();
    let (b_tx, a_rx) = channel();
    (
        MemoryStream {
            tx: Some(a_tx),
            rx: a_rx,
        },
        MemoryStream {
            tx: Some(b_tx),
            rx: b_rx,
        },
    )
}

impl MessageStream for MemoryStream {
    fn send_line(&mut self, frame: &str) -> io::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"))?;
        tx.send(frame.to_owned())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer hung up"))
    }

    fn recv_line(&mut self) -> io::Result<Option<String>> {
        match self.rx.recv() {
            Ok(line) => Ok(Some(line)),
            // sender dropped: end of stream
            Err(_) => Ok(None),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.tx.take();
        Ok(())
    }
}
