//! Socket session client: the process running in a secondary window.
//!
//! Prompts for a line, sends it to the control socket and prints the framed
//! response, until end of input or the server closes the connection.

use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::net::UnixStream;

use crate::cli::{next_line, BANNER};
use crate::input::LineReader;
use crate::protocol;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A connection to a session's control socket.
pub struct Client {
    stream: UnixStream,
    buf: BytesMut,
}

impl Client {
    pub async fn connect(socket_path: &Path) -> io::Result<Self> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, UnixStream::connect(socket_path))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("timed out connecting to {}", socket_path.display()),
                )
            })??;
        Ok(Self {
            stream,
            buf: BytesMut::new(),
        })
    }

    /// Send one command line and wait for its response.
    ///
    /// `Ok(None)` if the server closed the connection first.
    pub async fn request(&mut self, line: &str) -> io::Result<Option<Bytes>> {
        protocol::write_request(&mut self.stream, line).await?;
        protocol::read_response(&mut self.stream, &mut self.buf).await
    }

    /// Interactive loop: prompt, send, print.
    pub async fn run(
        mut self,
        input: &mut LineReader,
        prompt: &str,
        out: &mut (dyn Write + Send),
    ) -> io::Result<()> {
        out.write_all(BANNER.as_bytes())?;
        out.flush()?;
        loop {
            let Some(line) = next_line(input, prompt, out).await? else {
                return Ok(());
            };
            match self.request(&line).await? {
                Some(body) => {
                    out.write_all(&body)?;
                    out.flush()?;
                }
                None => {
                    tracing::debug!("server closed cli connection");
                    return Ok(());
                }
            }
        }
    }
}
