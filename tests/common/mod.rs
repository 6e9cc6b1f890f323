#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use portable_pty::{Child, SlavePty};

use netcli::host::{CmdStatus, Host, HostError, WindowOptions};
use netcli::registry::{Registry, RunCommand, WindowCommand};
use netcli::session::Session;

/// A host that records what it was asked to do and answers with canned
/// output:
/// - `echo <text>` prints `<text>\n`
/// - `false` exits 1 with no output
/// - `hang` fails with a timeout
/// - `flaky` fails with a timeout on `r2` and prints `ok\n` elsewhere
/// - anything else prints `<host>: <cmd>\n`
pub struct MockHost {
    name: String,
    pub commands: Mutex<Vec<String>>,
    pub host_commands: Mutex<Vec<String>>,
    pub windows: Mutex<Vec<(String, WindowOptions)>>,
    pub spawns: AtomicUsize,
    pub fail_windows: bool,
}

impl MockHost {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self::build(name, false))
    }

    pub fn failing_windows(name: &str) -> Arc<Self> {
        Arc::new(Self::build(name, true))
    }

    fn build(name: &str, fail_windows: bool) -> Self {
        Self {
            name: name.to_string(),
            commands: Mutex::new(Vec::new()),
            host_commands: Mutex::new(Vec::new()),
            windows: Mutex::new(Vec::new()),
            spawns: AtomicUsize::new(0),
            fail_windows,
        }
    }

    pub fn spawn_count(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    fn answer(&self, cmd: &str) -> Result<CmdStatus, HostError> {
        if let Some(text) = cmd.strip_prefix("echo ") {
            return Ok(CmdStatus::new(0, format!("{text}\n")));
        }
        match cmd {
            "false" => Ok(CmdStatus::new(1, "")),
            "hang" => Err(HostError::Timeout(std::time::Duration::from_secs(1))),
            "flaky" if self.name == "r2" => {
                Err(HostError::Timeout(std::time::Duration::from_secs(1)))
            }
            "flaky" => Ok(CmdStatus::new(0, "ok\n")),
            _ => Ok(CmdStatus::new(0, format!("{}: {}\n", self.name, cmd))),
        }
    }
}

#[async_trait]
impl Host for MockHost {
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn_pty(
        &self,
        cmd: &str,
        _on_host: bool,
        _slave: &dyn SlavePty,
    ) -> Result<Box<dyn Child + Send + Sync>, HostError> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        Err(HostError::Launch(format!("mock cannot spawn `{cmd}`")))
    }

    async fn cmd_status(&self, cmd: &str) -> Result<CmdStatus, HostError> {
        self.commands.lock().push(cmd.to_string());
        self.answer(cmd)
    }

    async fn cmd_status_host(&self, cmd: &str) -> Result<CmdStatus, HostError> {
        self.host_commands.lock().push(cmd.to_string());
        self.answer(cmd)
    }

    async fn run_in_window(&self, cmd: &str, opts: &WindowOptions) -> Result<(), HostError> {
        if self.fail_windows {
            return Err(HostError::Launch("no display".to_string()));
        }
        self.windows.lock().push((cmd.to_string(), opts.clone()));
        Ok(())
    }

    async fn exec_path(&self, candidates: &[&str]) -> Result<PathBuf, HostError> {
        candidates
            .first()
            .map(|c| PathBuf::from("/usr/bin").join(c))
            .ok_or_else(|| HostError::ExecNotFound(Vec::new()))
    }
}

/// In-memory sink that can be read while a session loop is still writing.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Poll until `needle` shows up, giving up after two seconds.
    pub async fn wait_for(&self, needle: &str) {
        for _ in 0..200 {
            if self.contents().contains(needle) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {needle:?} in {:?}", self.contents());
    }
}

impl std::io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Registry used across the integration tests.
pub fn test_registry() -> Registry {
    let mut r = Registry::new();
    r.add_run_cmd(
        None,
        "[hosts] <cmd>",
        "run command on hosts",
        RunCommand::new("{}"),
    );
    r.add_run_cmd(
        Some("sh"),
        "[hosts] sh <cmd>",
        "run shell command on hosts",
        RunCommand::new("{}"),
    );
    r.add_run_cmd(
        Some("hostcmd"),
        "[hosts] hostcmd <cmd>",
        "run on the underlying host",
        RunCommand::new("{}").on_host(true),
    );
    r.add_run_cmd(
        Some("whoami"),
        "[hosts] whoami",
        "print instance and host name",
        RunCommand::new("echo %INSTANCE%/%NAME%{}"),
    );
    r.add_run_cmd(
        Some("vtysh"),
        "[hosts] vtysh",
        "routing daemon shell",
        RunCommand::new("vtysh {}").interactive(true),
    );
    r.add_window_cmd(
        "term",
        "term <hosts>",
        "open a shell window",
        WindowCommand {
            shell: "bash".to_string(),
            options: WindowOptions {
                title: Some("term".to_string()),
                ..Default::default()
            },
        },
    );
    r
}

pub struct TestSession {
    pub session: Arc<Session>,
    pub root: Arc<MockHost>,
    pub hosts: Vec<Arc<MockHost>>,
}

impl TestSession {
    pub fn host(&self, name: &str) -> &Arc<MockHost> {
        self.hosts
            .iter()
            .find(|h| h.name() == name)
            .expect("unknown test host")
    }
}

/// Session with mock hosts `r1`, `r2`, `r3` and instance id `42`.
pub fn create_test_session() -> TestSession {
    create_test_session_with(test_registry(), &["r1", "r2", "r3"])
}

pub fn create_test_session_with(registry: Registry, names: &[&str]) -> TestSession {
    let root = MockHost::new("root");
    let hosts: Vec<Arc<MockHost>> = names.iter().map(|n| MockHost::new(n)).collect();
    let mut session = Session::new(registry, root.clone(), "42");
    for h in &hosts {
        session = session.with_host(h.clone());
    }
    TestSession {
        session: Arc::new(session),
        root,
        hosts,
    }
}
