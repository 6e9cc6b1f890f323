//! Control socket server.
//!
//! Listens on a Unix domain socket in a private temporary directory. Each
//! connection is an independent dispatcher client sharing the session's
//! registry and hosts. Per connection the loop is: read a line, dispatch it
//! with interactive commands disallowed, write the output plus the end
//! marker, repeat until the peer closes.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;

use crate::dispatch::{dispatch, DispatchOptions, Flow};
use crate::protocol;
use crate::session::Session;

pub const SOCKET_NAME: &str = "cli.sock";

/// Handle to a running control socket server. Dropping it stops the accept
/// loop and removes the socket directory.
pub struct ControlServer {
    socket_path: PathBuf,
    cancel: CancellationToken,
    _dir: TempDir,
}

impl ControlServer {
    /// Bind the socket and start accepting on the current runtime.
    ///
    /// The accept loop only holds a weak reference to the session, so the
    /// session owning this handle can still be dropped.
    pub fn start(session: &Arc<Session>, background: bool) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("pty-")
            .suffix("-sockdir")
            .tempdir()?;
        let socket_path = dir.path().join(SOCKET_NAME);

        let listener = UnixListener::bind(&socket_path)?;
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let cancel = CancellationToken::new();
        tokio::spawn(serve(
            listener,
            Arc::downgrade(session),
            background,
            cancel.clone(),
        ));
        tracing::info!(path = %socket_path.display(), "control socket server listening");

        Ok(Self {
            socket_path,
            cancel,
            _dir: dir,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn serve(
    listener: UnixListener,
    session: Weak<Session>,
    background: bool,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("control socket server cancelled, stopping accept loop");
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let Some(session) = session.upgrade() else {
                            break;
                        };
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, session, background).await {
                                tracing::debug!(error = %e, "cli connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to accept control socket connection");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }
}

/// Serve one client connection until it closes or sends `quit`.
pub async fn handle_client<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    session: Arc<Session>,
    background: bool,
) -> io::Result<()> {
    tracing::debug!("cli client connected");
    let mut stream = BufReader::new(stream);
    let mut raw = Vec::new();
    loop {
        raw.clear();
        if stream.read_until(b'\n', &mut raw).await? == 0 {
            tracing::debug!("client closed cli connection");
            return Ok(());
        }
        let line = String::from_utf8_lossy(&raw);

        let mut out = Vec::new();
        let flow = dispatch(
            &session,
            line.trim(),
            &mut out,
            DispatchOptions::remote(background),
        )
        .await?;
        if flow == Flow::Stop {
            tracing::debug!("server closing cli connection");
            return Ok(());
        }

        protocol::write_response(stream.get_mut(), &out).await?;
    }
}
