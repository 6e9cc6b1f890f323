//! Fan-out executor: run one command template against a set of hosts.

use std::io::{self, Write};

use futures::future::join_all;

use crate::host::{CmdStatus, HostError};
use crate::pty;
use crate::registry::RunCommand;
use crate::session::Session;

/// Split a command line into target hosts and the remaining command.
///
/// Leading tokens that name known hosts select the targets. If none do, every
/// host is targeted. The final token is never taken as a host, so `r1` on its
/// own runs the command `r1` everywhere.
pub fn host_cmd_split(session: &Session, line: &str) -> (Vec<String>, String) {
    let words: Vec<&str> = line.split_whitespace().collect();
    let prefix = match words.iter().position(|w| !session.is_host(w)) {
        Some(i) => i,
        None => words.len().saturating_sub(1),
    };

    let hosts = if prefix == 0 {
        session.host_names()
    } else {
        words[..prefix].iter().map(|w| w.to_string()).collect()
    };
    (hosts, words[prefix..].join(" "))
}

/// Substitute the user's text and the instance id into `exec`.
/// `%NAME%` is left for per-host substitution.
pub fn expand_template(exec: &str, ucmd: &str, instance: &str) -> String {
    exec.replace("{}", ucmd).replace("%INSTANCE%", instance)
}

fn write_begin(out: &mut dyn Write, host: &str) -> io::Result<()> {
    writeln!(out, "------ Host: {host} ------")
}

fn write_end(out: &mut dyn Write, host: &str) -> io::Result<()> {
    writeln!(out, "------- End: {host} ------")
}

/// Run `cmd` for the hosts named at the start of `line` and write a combined
/// report to `out`.
///
/// Captured commands run concurrently and nothing is written until all have
/// finished. A failure on one host is reported in its block and does not
/// affect the others.
pub async fn run_command(
    session: &Session,
    out: &mut (dyn Write + Send),
    line: &str,
    cmd: &RunCommand,
) -> io::Result<()> {
    let (hosts, ucmd) = host_cmd_split(session, line);

    let unknowns: Vec<&str> = hosts
        .iter()
        .filter(|h| !session.is_host(h))
        .map(String::as_str)
        .collect();
    if !unknowns.is_empty() {
        writeln!(out, "% Unknown host[s]: {}", unknowns.join(", "))?;
        return Ok(());
    }

    let ucmd = expand_template(&cmd.exec, &ucmd, session.instance());
    let bracket = hosts.len() > 1;

    if cmd.interactive {
        for name in &hosts {
            let Some(host) = session.host(name) else {
                continue;
            };
            let shcmd = ucmd.replace("%NAME%", name);
            if bracket {
                write_begin(out, name)?;
            }
            if let Err(e) = pty::bridge(host.as_ref(), &shcmd, cmd.on_host, out) {
                tracing::warn!(host = %name, error = %e, "interactive command failed");
                writeln!(out, "*** error: {e}")?;
            }
            if bracket {
                write_end(out, name)?;
            }
        }
        writeln!(out)?;
        return Ok(());
    }

    let runs = hosts.iter().filter_map(|name| {
        let host = session.host(name)?;
        let shcmd = ucmd.replace("%NAME%", name);
        let on_host = cmd.on_host;
        Some(async move {
            let result = if on_host {
                host.cmd_status_host(&shcmd).await
            } else {
                host.cmd_status(&shcmd).await
            };
            (name.as_str(), result)
        })
    });
    let results: Vec<(&str, Result<CmdStatus, HostError>)> = join_all(runs).await;

    for (name, result) in results {
        if bracket {
            write_begin(out, name)?;
        }
        match result {
            Ok(status) => {
                if !status.success() {
                    writeln!(out, "*** non-zero exit status: {}", status.code)?;
                }
                out.write_all(status.output.as_bytes())?;
            }
            Err(e) => {
                tracing::warn!(host = %name, error = %e, "command failed");
                writeln!(out, "*** error: {e}")?;
            }
        }
        if bracket {
            write_end(out, name)?;
        }
    }
    Ok(())
}
