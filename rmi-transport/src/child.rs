//! Child-process transport: spawn a peer and speak the protocol over its
//! standard input and output. The child's standard error passes through so
//! its diagnostics stay visible.

use crate::stream::LineStream;
use rmi_core::MessageStream;
use std::io;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tracing::debug;

/// A [`MessageStream`] over a spawned child process's stdio.
#[derive(Debug)]
pub struct ChildChannel {
    stream: LineStream<ChildStdout, ChildStdin>,
    child: Child,
}

impl ChildChannel {
    /// Spawn `command` with piped stdin and stdout and connect to it.
    pub fn spawn(mut command: Command) -> io::Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;
        debug!(pid = child.id(), "spawned peer process");
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("child stdin was not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
        Ok(Self {
            stream: LineStream::new(stdout, stdin),
            child,
        })
    }
}

impl MessageStream for ChildChannel {
    fn send_line(&mut self, frame: &str) -> io::Result<()> {
        self.stream.send_line(frame)
    }

    fn recv_line(&mut self) -> io::Result<Option<String>> {
        self.stream.recv_line()
    }

    fn close(&mut self) -> io::Result<()> {
        // dropping our end of the child's stdin is its end-of-stream signal
        self.stream.close()?;
        let status = self.child.wait()?;
        debug!(%status, "peer process exited");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaks_to_a_child_over_stdio() {
        let mut channel = ChildChannel::spawn(Command::new("cat")).unwrap();
        channel.send_line("through the pipe").unwrap();
        assert_eq!(
            channel.recv_line().unwrap(),
            Some("through the pipe".to_owned())
        );
        channel.close().unwrap();
    }

    #[test]
    fn child_exit_is_end_of_stream() {
        let mut channel = ChildChannel::spawn(Command::new("true")).unwrap();
        assert_eq!(channel.recv_line().unwrap(), None);
        channel.close().unwrap();
    }
}
