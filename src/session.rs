//! The session: registry, hosts, instance id and the lazily started control
//! socket server. Everything except the control server is fixed at
//! construction time.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::host::Host;
use crate::registry::Registry;
use crate::server::ControlServer;

pub struct Session {
    registry: Registry,
    hosts: BTreeMap<String, Arc<dyn Host>>,
    root: Arc<dyn Host>,
    instance: String,
    histfile: Option<PathBuf>,
    control: Mutex<Option<ControlServer>>,
}

impl Session {
    /// `root` is the capability used for session-level operations such as
    /// opening the secondary CLI window.
    pub fn new(registry: Registry, root: Arc<dyn Host>, instance: impl Into<String>) -> Self {
        Self {
            registry,
            hosts: BTreeMap::new(),
            root,
            instance: instance.into(),
            histfile: None,
            control: Mutex::new(None),
        }
    }

    pub fn with_host(mut self, host: Arc<dyn Host>) -> Self {
        self.hosts.insert(host.name().to_string(), host);
        self
    }

    pub fn with_histfile(mut self, histfile: Option<PathBuf>) -> Self {
        self.histfile = histfile;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn root(&self) -> &Arc<dyn Host> {
        &self.root
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn histfile(&self) -> Option<&Path> {
        self.histfile.as_deref()
    }

    pub fn host(&self, name: &str) -> Option<&Arc<dyn Host>> {
        self.hosts.get(name)
    }

    pub fn is_host(&self, name: &str) -> bool {
        self.hosts.contains_key(name)
    }

    /// Host names in sorted order.
    pub fn host_names(&self) -> Vec<String> {
        self.hosts.keys().cloned().collect()
    }

    /// Path of the control socket, starting the server on first use.
    ///
    /// Must be called from within the tokio runtime.
    pub fn control_socket(self: &Arc<Self>, background: bool) -> io::Result<PathBuf> {
        let mut control = self.control.lock();
        if let Some(server) = control.as_ref() {
            return Ok(server.socket_path().to_path_buf());
        }
        let server = ControlServer::start(self, background)?;
        let path = server.socket_path().to_path_buf();
        *control = Some(server);
        Ok(path)
    }

    /// Path of the control socket if the server has been started.
    pub fn control_socket_path(&self) -> Option<PathBuf> {
        self.control
            .lock()
            .as_ref()
            .map(|s| s.socket_path().to_path_buf())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("instance", &self.instance)
            .field("hosts", &self.hosts.keys().collect::<Vec<_>>())
            .field("histfile", &self.histfile)
            .finish_non_exhaustive()
    }
}
