//! Line framing over an arbitrary reader/writer pair.

use rmi_core::MessageStream;
use std::io::{self, BufRead, BufReader, Read, Write};
use tracing::trace;

/// A [`MessageStream`] over any blocking reader/writer pair. One frame per
/// newline-terminated line; the serializer guarantees frames contain no raw
/// newlines.
#[derive(Debug)]
pub struct LineStream<R: Read, W: Write> {
    reader: BufReader<R>,
    writer: Option<W>,
}

impl<R: Read, W: Write> LineStream<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: Some(writer),
        }
    }
}

impl<R: Read + Send, W: Write + Send> MessageStream for LineStream<R, W> {
    fn send_line(&mut self, frame: &str) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"))?;
        writer.write_all(frame.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    fn recv_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            trace!("reader reached end of stream");
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}
