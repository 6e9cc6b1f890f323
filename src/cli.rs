//! Session drivers: the local read-eval loop, and the bootstrap that opens a
//! secondary CLI window talking to this process over the control socket.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::dispatch::{dispatch, DispatchOptions, Flow};
use crate::host::{shell_quote, HostError, WindowOptions};
use crate::input::LineReader;
use crate::session::Session;

pub const DEFAULT_PROMPT: &str = "netcli> ";
pub const BANNER: &str = "\n--- NetCLI Starting ---\n\n";
pub const INTERRUPT_NOTICE: &str = "% Caught interrupt\nUse ^D or 'quit' to exit\n";

#[derive(Error, Debug)]
pub enum WindowError {
    #[error("control socket: {0}")]
    Socket(#[from] io::Error),

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Prompt for the next line, reporting interrupts to `out` and prompting
/// again. `Ok(None)` means end of input.
pub async fn next_line(
    input: &mut LineReader,
    prompt: &str,
    out: &mut (dyn Write + Send),
) -> io::Result<Option<String>> {
    loop {
        tokio::select! {
            line = input.read_line(prompt) => return line,
            interrupted = tokio::signal::ctrl_c() => {
                interrupted?;
                // The pending read is still waiting, so prompt for it again.
                out.write_all(INTERRUPT_NOTICE.as_bytes())?;
                out.write_all(prompt.as_bytes())?;
                out.flush()?;
            }
        }
    }
}

/// Run the terminal-attached session loop until `quit` or end of input.
///
/// Line input happens on the reader's worker thread so the control socket
/// server keeps running on this runtime while we wait.
pub async fn local_cli(
    session: &Arc<Session>,
    input: &mut LineReader,
    out: &mut (dyn Write + Send),
    prompt: &str,
    background: bool,
) -> io::Result<()> {
    out.write_all(BANNER.as_bytes())?;
    out.flush()?;
    loop {
        let Some(line) = next_line(input, prompt, out).await? else {
            tracing::debug!("end of input");
            return Ok(());
        };
        let flow = dispatch(session, &line, out, DispatchOptions::local(background)).await?;
        if flow == Flow::Stop {
            return Ok(());
        }
    }
}

/// Open a new window running a socket client against this session.
///
/// The control socket server is started on first use and reused after.
pub async fn remote_cli(
    session: &Arc<Session>,
    prompt: &str,
    title: &str,
    background: bool,
) -> Result<(), WindowError> {
    let socket = session.control_socket(background)?;
    let exe = client_exe(session).await?;

    let mut cmd = format!("{} client", shell_quote(&exe.to_string_lossy()));
    if let Some(histfile) = session.histfile() {
        cmd.push_str(&format!(
            " --histfile={}",
            shell_quote(&histfile.to_string_lossy())
        ));
    }
    if !prompt.is_empty() {
        cmd.push_str(&format!(" --prompt={}", shell_quote(prompt)));
    }
    cmd.push(' ');
    cmd.push_str(&shell_quote(&socket.to_string_lossy()));

    let opts = WindowOptions {
        title: Some(title.to_string()),
        cwd: None,
        background,
    };
    tracing::info!(socket = %socket.display(), "opening secondary cli window");
    session.root().run_in_window(&cmd, &opts).await?;
    Ok(())
}

async fn client_exe(session: &Session) -> Result<PathBuf, HostError> {
    match std::env::current_exe() {
        Ok(exe) => Ok(exe),
        Err(e) => {
            tracing::debug!(error = %e, "current_exe unavailable, searching PATH");
            session.root().exec_path(&[env!("CARGO_PKG_NAME")]).await
        }
    }
}
