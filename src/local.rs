//! A `Host` backed by processes on the local machine.
//!
//! In-namespace commands are prefixed with `exec_prefix` (for example
//! `ip netns exec r1`); on-host commands run without it.

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use portable_pty::{Child, CommandBuilder, SlavePty};

use crate::host::{shell_quote, CmdStatus, Host, HostError, WindowOptions};

#[derive(Debug, Clone)]
pub struct LocalHost {
    name: String,
    exec_prefix: Vec<String>,
    shell: String,
    timeout: Option<Duration>,
}

impl LocalHost {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exec_prefix: Vec::new(),
            shell: "/bin/sh".to_string(),
            timeout: None,
        }
    }

    pub fn with_exec_prefix(mut self, prefix: Vec<String>) -> Self {
        self.exec_prefix = prefix;
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn argv(&self, cmd: &str, on_host: bool) -> Vec<String> {
        let mut argv = if on_host {
            Vec::new()
        } else {
            self.exec_prefix.clone()
        };
        argv.push(self.shell.clone());
        argv.push("-c".to_string());
        argv.push(cmd.to_string());
        argv
    }

    async fn capture(&self, cmd: &str, on_host: bool) -> Result<CmdStatus, HostError> {
        // stderr is folded into stdout so the captured text keeps its order.
        let argv = self.argv(&format!("exec 2>&1\n{cmd}"), on_host);
        let mut command = tokio::process::Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        tracing::debug!(host = %self.name, cmd, on_host, "running captured command");
        let output = command.output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, output)
                .await
                .map_err(|_| HostError::Timeout(limit))?,
            None => output.await,
        }
        .map_err(|source| HostError::Spawn {
            cmd: cmd.to_string(),
            source,
        })?;

        let code = match output.status.code() {
            Some(code) => code,
            None => 128 + output.status.signal().unwrap_or(0),
        };
        Ok(CmdStatus::new(
            code,
            String::from_utf8_lossy(&output.stdout).into_owned(),
        ))
    }
}

#[async_trait]
impl Host for LocalHost {
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn_pty(
        &self,
        cmd: &str,
        on_host: bool,
        slave: &dyn SlavePty,
    ) -> Result<Box<dyn Child + Send + Sync>, HostError> {
        let mut builder = CommandBuilder::from_argv(
            self.argv(cmd, on_host).into_iter().map(Into::into).collect(),
        );
        builder.env(
            "TERM",
            std::env::var("TERM").unwrap_or_else(|_| "xterm-256color".to_string()),
        );
        if let Ok(cwd) = std::env::current_dir() {
            builder.cwd(cwd);
        }
        slave
            .spawn_command(builder)
            .map_err(|source| HostError::PtySpawn {
                cmd: cmd.to_string(),
                source,
            })
    }

    async fn cmd_status(&self, cmd: &str) -> Result<CmdStatus, HostError> {
        self.capture(cmd, false).await
    }

    async fn cmd_status_host(&self, cmd: &str) -> Result<CmdStatus, HostError> {
        self.capture(cmd, true).await
    }

    async fn run_in_window(&self, cmd: &str, opts: &WindowOptions) -> Result<(), HostError> {
        let inner = self
            .argv(cmd, false)
            .iter()
            .map(|a| shell_quote(a))
            .collect::<Vec<_>>()
            .join(" ");

        let mut command = if std::env::var_os("TMUX").is_some() {
            let mut c = std::process::Command::new("tmux");
            c.arg("new-window");
            if opts.background {
                c.arg("-d");
            }
            if let Some(title) = &opts.title {
                c.arg("-n").arg(title);
            }
            if let Some(cwd) = &opts.cwd {
                c.arg("-c").arg(cwd);
            }
            c.arg(&inner);
            c
        } else if std::env::var_os("DISPLAY").is_some() {
            let mut c = std::process::Command::new("xterm");
            if let Some(title) = &opts.title {
                c.arg("-T").arg(title);
            }
            if let Some(cwd) = &opts.cwd {
                c.current_dir(cwd);
            }
            c.arg("-e").arg("/bin/sh").arg("-c").arg(&inner);
            c
        } else {
            return Err(HostError::Launch(
                "no window system available (need tmux or X11)".to_string(),
            ));
        };

        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        command.spawn().map_err(|source| HostError::Spawn {
            cmd: inner.clone(),
            source,
        })?;
        tracing::debug!(host = %self.name, title = ?opts.title, "launched window");
        Ok(())
    }

    async fn exec_path(&self, candidates: &[&str]) -> Result<PathBuf, HostError> {
        let path = std::env::var_os("PATH").unwrap_or_default();
        for name in candidates {
            for dir in std::env::split_paths(&path) {
                let full = dir.join(name);
                if is_executable(&full) {
                    return Ok(full);
                }
            }
        }
        Err(HostError::ExecNotFound(
            candidates.iter().map(|c| c.to_string()).collect(),
        ))
    }
}

fn is_executable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
