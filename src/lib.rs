//! netcli - interactive control plane for a set of emulated network hosts.
//!
//! Commands typed once are fanned out to one, several or all hosts, either
//! captured or inside a pty. A secondary window can drive the same session
//! over a Unix control socket.

pub mod cli;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod fanout;
pub mod host;
pub mod input;
pub mod local;
pub mod protocol;
pub mod pty;
pub mod registry;
pub mod server;
pub mod session;
pub mod terminal;
