//! Interactive bridge against real local processes.

use std::sync::Arc;

use netcli::dispatch::{dispatch, DispatchOptions};
use netcli::local::LocalHost;
use netcli::pty::{bridge, PtyError};
use netcli::registry::{Registry, RunCommand};
use netcli::session::Session;

fn run(host: &LocalHost, cmd: &str) -> (Result<(), PtyError>, String) {
    let mut out = Vec::new();
    let result = bridge(host, cmd, false, &mut out);
    (result, String::from_utf8_lossy(&out).into_owned())
}

#[test]
fn test_output_is_relayed() {
    let host = LocalHost::new("r1");
    let (result, out) = run(&host, "printf hello");
    result.unwrap();
    assert!(out.starts_with('\r'), "{out:?}");
    assert!(out.contains("hello"), "{out:?}");
}

#[test]
fn test_nonzero_exit_is_not_an_error() {
    let host = LocalHost::new("r1");
    let (result, _) = run(&host, "exit 3");
    assert!(result.is_ok());
}

#[test]
fn test_output_after_short_delay_is_relayed() {
    let host = LocalHost::new("r1");
    let (result, out) = run(&host, "sleep 0.3; echo late");
    result.unwrap();
    assert!(out.contains("late"), "{out:?}");
}

#[test]
fn test_spawn_failure() {
    let host = LocalHost::new("r1").with_shell("/nonexistent/shell");
    let (result, _) = run(&host, "true");
    assert!(matches!(result, Err(PtyError::Spawn(_))), "{result:?}");
}

#[tokio::test]
async fn test_interactive_fanout_brackets_each_host() {
    let mut registry = Registry::new();
    registry.add_run_cmd(
        Some("it"),
        "[hosts] it <cmd>",
        "interactive",
        RunCommand::new("echo %NAME%-{}").interactive(true),
    );
    let session = Arc::new(
        Session::new(registry, Arc::new(LocalHost::new("root")), "1")
            .with_host(Arc::new(LocalHost::new("r1")))
            .with_host(Arc::new(LocalHost::new("r2"))),
    );

    let mut out = Vec::new();
    dispatch(&session, "it r1 r2 x", &mut out, DispatchOptions::local(false))
        .await
        .unwrap();
    let out = String::from_utf8_lossy(&out);

    let r1 = out.find("------ Host: r1 ------").unwrap();
    let r1_out = out.find("r1-x").unwrap();
    let r2 = out.find("------ Host: r2 ------").unwrap();
    let r2_out = out.find("r2-x").unwrap();
    assert!(r1 < r1_out && r1_out < r2 && r2 < r2_out, "{out}");
    assert!(out.ends_with("------- End: r2 ------\n\n"), "{out}");
}
