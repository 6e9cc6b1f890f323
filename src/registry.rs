//! Command registry: maps command names typed at the prompt to what they do.
//!
//! Populated once before any session loop starts and read-only afterwards,
//! so every dispatcher shares it by reference without locking.

use std::collections::BTreeMap;

use crate::host::WindowOptions;

/// Run a command template on a set of hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCommand {
    /// Template: `{}` takes the user's text, `%NAME%` the target host,
    /// `%INSTANCE%` the session instance id.
    pub exec: String,
    /// Run on the underlying host rather than inside the host's namespace.
    pub on_host: bool,
    /// Run inside an allocated pty.
    pub interactive: bool,
}

impl RunCommand {
    pub fn new(exec: impl Into<String>) -> Self {
        Self {
            exec: exec.into(),
            on_host: false,
            interactive: false,
        }
    }

    pub fn on_host(mut self, on_host: bool) -> Self {
        self.on_host = on_host;
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }
}

/// Open a window per host running `shell`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowCommand {
    pub shell: String,
    pub options: WindowOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Run(RunCommand),
    Window(WindowCommand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// Left column of the help listing.
    pub format: String,
    /// Right column of the help listing.
    pub help: String,
    pub kind: CommandKind,
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    run_cmds: BTreeMap<Option<String>, CommandDescriptor>,
    window_cmds: BTreeMap<String, CommandDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run command. A `None` name registers the default command,
    /// which receives any line that matches no other command.
    pub fn add_run_cmd(
        &mut self,
        name: Option<&str>,
        format: impl Into<String>,
        help: impl Into<String>,
        cmd: RunCommand,
    ) {
        self.run_cmds.insert(
            name.map(str::to_string),
            CommandDescriptor {
                format: format.into(),
                help: help.into(),
                kind: CommandKind::Run(cmd),
            },
        );
    }

    pub fn add_window_cmd(
        &mut self,
        name: &str,
        format: impl Into<String>,
        help: impl Into<String>,
        cmd: WindowCommand,
    ) {
        self.window_cmds.insert(
            name.to_string(),
            CommandDescriptor {
                format: format.into(),
                help: help.into(),
                kind: CommandKind::Window(cmd),
            },
        );
    }

    /// Exact-name lookup. Window commands win over run commands of the
    /// same name.
    pub fn lookup(&self, name: &str) -> Option<&CommandDescriptor> {
        self.window_cmds
            .get(name)
            .or_else(|| self.run_cmds.get(&Some(name.to_string())))
    }

    pub fn default_cmd(&self) -> Option<&CommandDescriptor> {
        self.run_cmds.get(&None)
    }

    /// All registered commands sorted by name, the default command first.
    pub fn entries(&self) -> Vec<(Option<&str>, &CommandDescriptor)> {
        let mut entries: Vec<_> = self
            .run_cmds
            .iter()
            .map(|(k, v)| (k.as_deref(), v))
            .collect();
        for (k, v) in &self.window_cmds {
            if !self.run_cmds.contains_key(&Some(k.clone())) {
                entries.push((Some(k.as_str()), v));
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn help_text(&self) -> String {
        let mut s = String::from(
            "\nBasic Commands:\n  \
             cli   :: open a secondary CLI window\n  \
             help  :: this help\n  \
             hosts :: list hosts\n  \
             quit  :: quit the cli\n\n\
             Commands:\n",
        );
        for (_, desc) in self.entries() {
            s.push_str(&format!("  {}\t:: {}\n", desc.format, desc.help));
        }
        s.push('\n');
        s
    }
}
