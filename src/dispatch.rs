//! Dispatcher: interpret one input line against the builtins and the
//! registry, writing whatever it produces to an output sink.

use std::io::{self, Write};
use std::sync::Arc;

use crate::cli;
use crate::fanout;
use crate::registry::{CommandKind, RunCommand, WindowCommand};
use crate::session::Session;

pub const SECONDARY_PROMPT: &str = "secondary> ";
pub const SECONDARY_TITLE: &str = "Secondary CLI";

/// Whether the session loop should keep reading lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    /// Passed on to windows opened by `cli`.
    pub background: bool,
    /// False for sessions without a terminal of their own (socket clients).
    pub allow_interactive: bool,
}

impl DispatchOptions {
    pub fn local(background: bool) -> Self {
        Self {
            background,
            allow_interactive: true,
        }
    }

    pub fn remote(background: bool) -> Self {
        Self {
            background,
            allow_interactive: false,
        }
    }
}

/// Execute one line. User errors are written to `out` and never returned;
/// only failures writing to `out` itself come back as `Err`.
pub async fn dispatch(
    session: &Arc<Session>,
    line: &str,
    out: &mut (dyn Write + Send),
    opts: DispatchOptions,
) -> io::Result<Flow> {
    let line = line.trim();
    let Some(cmd) = line.split_whitespace().next() else {
        return Ok(Flow::Continue);
    };
    let rest = line[cmd.len()..].trim_start();

    match cmd {
        "q" | "quit" => return Ok(Flow::Stop),
        "help" => out.write_all(session.registry().help_text().as_bytes())?,
        "h" | "hosts" => writeln!(out, "% Hosts:\t{}", session.host_names().join(" "))?,
        "cli" => {
            if let Err(e) =
                cli::remote_cli(session, SECONDARY_PROMPT, SECONDARY_TITLE, opts.background).await
            {
                tracing::error!(error = %e, "cli server: unexpected error");
                writeln!(out, "% Error: {e}")?;
            }
        }
        _ => match session.registry().lookup(cmd).map(|d| &d.kind) {
            Some(CommandKind::Window(wcmd)) => run_in_windows(session, out, rest, wcmd).await?,
            Some(CommandKind::Run(rcmd)) => run(session, out, rest, rcmd, opts).await?,
            None => match session.registry().default_cmd().map(|d| &d.kind) {
                Some(CommandKind::Run(rcmd)) => run(session, out, line, rcmd, opts).await?,
                _ => writeln!(out, "% Unknown command: {line}")?,
            },
        },
    }
    out.flush()?;
    Ok(Flow::Continue)
}

async fn run(
    session: &Session,
    out: &mut (dyn Write + Send),
    line: &str,
    cmd: &RunCommand,
    opts: DispatchOptions,
) -> io::Result<()> {
    if cmd.interactive && !opts.allow_interactive {
        writeln!(
            out,
            "% Error: interactive command must be run from primary CLI"
        )?;
        return Ok(());
    }
    fanout::run_command(session, out, line, cmd).await
}

async fn run_in_windows(
    session: &Session,
    out: &mut (dyn Write + Send),
    rest: &str,
    cmd: &WindowCommand,
) -> io::Result<()> {
    let mut names: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
    if names.len() == 1 && names[0] == "*" {
        names = session.host_names();
    }

    let unknowns: Vec<&str> = names
        .iter()
        .filter(|n| !session.is_host(n))
        .map(String::as_str)
        .collect();
    if !unknowns.is_empty() {
        writeln!(out, "% Unknown host[s]: {}", unknowns.join(" "))?;
        return Ok(());
    }

    for name in &names {
        let Some(host) = session.host(name) else {
            continue;
        };
        if let Err(e) = host.run_in_window(&cmd.shell, &cmd.options).await {
            tracing::warn!(host = %name, error = %e, "window launch failed");
            writeln!(out, "% Error: {e}")?;
            return Ok(());
        }
    }
    Ok(())
}
