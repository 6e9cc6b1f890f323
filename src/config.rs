use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::DEFAULT_PROMPT;
use crate::host::{Host, WindowOptions};
use crate::local::LocalHost;
use crate::registry::{Registry, RunCommand, WindowCommand};
use crate::session::Session;

pub const DEFAULT_HISTFILE: &str = ".netcli-history.txt";

/// Top-level topology config, loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetConfig {
    /// Substituted for `%INSTANCE%` in command templates.
    pub instance: Option<String>,
    pub prompt: Option<String>,
    pub histfile: Option<PathBuf>,
    /// Open secondary CLI windows in the background.
    #[serde(default = "default_true")]
    pub background: bool,
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
    #[serde(default)]
    pub commands: Vec<RunCommandConfig>,
    #[serde(default)]
    pub window_commands: Vec<WindowCommandConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub name: String,
    /// Argv prepended to in-namespace commands, e.g. `["ip", "netns", "exec", "r1"]`.
    #[serde(default)]
    pub exec_prefix: Vec<String>,
    pub shell: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// A run command. Leaving out `name` makes it the default command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCommandConfig {
    pub name: Option<String>,
    pub format: String,
    pub help: String,
    #[serde(default = "default_exec")]
    pub exec: String,
    #[serde(default)]
    pub on_host: bool,
    #[serde(default)]
    pub interactive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowCommandConfig {
    pub name: String,
    pub format: String,
    pub help: String,
    pub shell: String,
    pub title: Option<String>,
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub background: bool,
}

fn default_true() -> bool {
    true
}

fn default_exec() -> String {
    "{}".to_string()
}

impl NetConfig {
    /// Load config from a TOML file path. Returns None if file doesn't exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(Some(config))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for host in &self.hosts {
            if !seen.insert(host.name.as_str()) {
                return Err(ConfigError::DuplicateHost(host.name.clone()));
            }
        }
        for name in self
            .commands
            .iter()
            .filter_map(|c| c.name.as_deref())
            .chain(self.window_commands.iter().map(|c| c.name.as_str()))
        {
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(ConfigError::InvalidCommandName(name.to_string()));
            }
        }
        Ok(())
    }

    pub fn prompt(&self) -> &str {
        self.prompt.as_deref().unwrap_or(DEFAULT_PROMPT)
    }

    /// Configured history file, else `~/.netcli-history.txt`.
    pub fn histfile(&self) -> Option<PathBuf> {
        self.histfile
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(DEFAULT_HISTFILE)))
    }

    pub fn registry(&self) -> Registry {
        let mut registry = Registry::new();
        for c in &self.commands {
            registry.add_run_cmd(
                c.name.as_deref(),
                c.format.clone(),
                c.help.clone(),
                RunCommand::new(c.exec.clone())
                    .on_host(c.on_host)
                    .interactive(c.interactive),
            );
        }
        for c in &self.window_commands {
            registry.add_window_cmd(
                &c.name,
                c.format.clone(),
                c.help.clone(),
                WindowCommand {
                    shell: c.shell.clone(),
                    options: WindowOptions {
                        title: c.title.clone(),
                        cwd: c.cwd.clone(),
                        background: c.background,
                    },
                },
            );
        }
        registry
    }

    /// Build a session whose hosts are local processes.
    pub fn into_session(self) -> Session {
        let instance = self
            .instance
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()[..8].to_string());
        let root: Arc<dyn Host> = Arc::new(LocalHost::new("root"));
        let mut session = Session::new(self.registry(), root, instance)
            .with_histfile(self.histfile());
        for h in self.hosts {
            let mut host = LocalHost::new(h.name).with_exec_prefix(h.exec_prefix);
            if let Some(shell) = h.shell {
                host = host.with_shell(shell);
            }
            if let Some(secs) = h.timeout_secs {
                host = host.with_timeout(Duration::from_secs(secs));
            }
            session = session.with_host(Arc::new(host));
        }
        session
    }
}

/// Errors that can occur when loading config.
#[derive(Debug)]
pub enum ConfigError {
    ReadFailed(PathBuf, std::io::Error),
    ParseFailed(PathBuf, toml::de::Error),
    DuplicateHost(String),
    InvalidCommandName(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadFailed(path, e) => {
                write!(f, "Failed to read config {}: {}", path.display(), e)
            }
            Self::ParseFailed(path, e) => {
                write!(f, "Failed to parse config {}: {}", path.display(), e)
            }
            Self::DuplicateHost(name) => write!(f, "Host '{}' is defined more than once", name),
            Self::InvalidCommandName(name) => {
                write!(f, "Invalid command name '{}': must be one word", name)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CommandKind;

    const TOPOLOGY: &str = r#"
        instance = "7"
        prompt = "lab> "

        [[hosts]]
        name = "r1"
        exec_prefix = ["ip", "netns", "exec", "r1"]

        [[hosts]]
        name = "r2"
        timeout_secs = 30

        [[commands]]
        format = "[hosts] <shell-command>"
        help = "execute a shell command on hosts"

        [[commands]]
        name = "vtysh"
        format = "[hosts] vtysh <command>"
        help = "open a routing shell"
        exec = "vtysh -N %INSTANCE% {}"
        interactive = true

        [[window_commands]]
        name = "term"
        format = "term <hosts>"
        help = "open a shell window"
        shell = "bash"
        title = "term"
    "#;

    #[test]
    fn parse_full_config() {
        let config: NetConfig = toml::from_str(TOPOLOGY).unwrap();
        assert_eq!(config.instance.as_deref(), Some("7"));
        assert_eq!(config.prompt(), "lab> ");
        assert!(config.background);
        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.hosts[0].exec_prefix.len(), 4);
        assert_eq!(config.hosts[1].timeout_secs, Some(30));
        assert_eq!(config.commands[0].exec, "{}");
        assert!(config.commands[0].name.is_none());
        assert!(config.commands[1].interactive);
    }

    #[test]
    fn parse_empty_config() {
        let config: NetConfig = toml::from_str("").unwrap();
        assert!(config.hosts.is_empty());
        assert_eq!(config.prompt(), DEFAULT_PROMPT);
    }

    #[test]
    fn registry_from_config() {
        let config: NetConfig = toml::from_str(TOPOLOGY).unwrap();
        let registry = config.registry();
        assert!(registry.default_cmd().is_some());
        match &registry.lookup("vtysh").unwrap().kind {
            CommandKind::Run(cmd) => assert!(cmd.interactive),
            other => panic!("unexpected kind: {other:?}"),
        }
        match &registry.lookup("term").unwrap().kind {
            CommandKind::Window(cmd) => assert_eq!(cmd.options.title.as_deref(), Some("term")),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn session_from_config() {
        let config: NetConfig = toml::from_str(TOPOLOGY).unwrap();
        let session = config.into_session();
        assert_eq!(session.instance(), "7");
        assert_eq!(session.host_names(), vec!["r1", "r2"]);
    }

    #[test]
    fn generated_instance_is_short() {
        let session = NetConfig::default().into_session();
        assert_eq!(session.instance().len(), 8);
    }

    #[test]
    fn load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(NetConfig::load(&dir.path().join("none.toml")).unwrap().is_none());
    }

    #[test]
    fn load_rejects_duplicate_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup.toml");
        std::fs::write(&path, "[[hosts]]\nname = \"r1\"\n[[hosts]]\nname = \"r1\"\n").unwrap();
        let err = NetConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateHost(ref n) if n == "r1"));
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "hosts = 3").unwrap();
        let err = NetConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }
}
