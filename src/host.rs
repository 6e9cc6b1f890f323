//! Host capability: the operations the control plane needs from a host.
//!
//! How a host is built (namespaces, containers) is not this crate's concern.
//! The dispatcher and fan-out executor only ever talk to `dyn Host`.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use portable_pty::{Child, SlavePty};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("failed to spawn `{cmd}`: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn `{cmd}` in pty: {source}")]
    PtySpawn {
        cmd: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("window launch failed: {0}")]
    Launch(String),

    #[error("no executable found for any of {0:?}")]
    ExecNotFound(Vec<String>),
}

/// Exit status and combined stdout/stderr of a captured command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdStatus {
    pub code: i32,
    pub output: String,
}

impl CmdStatus {
    pub fn new(code: i32, output: impl Into<String>) -> Self {
        Self {
            code,
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Launch options for a new terminal window. Opaque to the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowOptions {
    pub title: Option<String>,
    pub cwd: Option<PathBuf>,
    pub background: bool,
}

#[async_trait]
pub trait Host: Send + Sync {
    fn name(&self) -> &str;

    /// Spawn `cmd` attached to the subordinate side of a pty.
    ///
    /// The child must run in a new session with the pty as its controlling
    /// terminal so job control signals stay inside it. `on_host` selects the
    /// host's root namespace instead of its own.
    fn spawn_pty(
        &self,
        cmd: &str,
        on_host: bool,
        slave: &dyn SlavePty,
    ) -> Result<Box<dyn Child + Send + Sync>, HostError>;

    /// Run `cmd` inside the host's namespace and capture its output.
    async fn cmd_status(&self, cmd: &str) -> Result<CmdStatus, HostError>;

    /// Run `cmd` on the underlying host and capture its output.
    async fn cmd_status_host(&self, cmd: &str) -> Result<CmdStatus, HostError>;

    /// Open a new terminal window running `cmd`.
    async fn run_in_window(&self, cmd: &str, opts: &WindowOptions) -> Result<(), HostError>;

    /// Resolve the first of `candidates` that exists as an executable.
    async fn exec_path(&self, candidates: &[&str]) -> Result<PathBuf, HostError>;
}

/// Quote `s` for safe inclusion in a POSIX shell command line.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_leaves_plain_words_alone() {
        assert_eq!(shell_quote("/usr/bin/netcli"), "/usr/bin/netcli");
        assert_eq!(shell_quote("--prompt=x"), "--prompt=x");
    }

    #[test]
    fn quote_wraps_spaces_and_quotes() {
        assert_eq!(shell_quote("secondary> "), "'secondary> '");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn status_success_is_zero_exit() {
        assert!(CmdStatus::new(0, "ok\n").success());
        assert!(!CmdStatus::new(1, "").success());
    }
}
