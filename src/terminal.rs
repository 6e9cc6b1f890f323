use std::io::IsTerminal;

use crossterm::terminal::{disable_raw_mode, enable_raw_mode, size};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TerminalError {
    #[error("failed to enable raw mode: {0}")]
    EnableRawMode(#[source] std::io::Error),
}

/// RAII guard for terminal raw mode.
///
/// Enabling raw mode saves the current terminal discipline; dropping the
/// guard (including during unwinding) restores exactly that discipline.
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    pub fn new() -> Result<Self, TerminalError> {
        enable_raw_mode().map_err(TerminalError::EnableRawMode)?;
        Ok(Self { _private: () })
    }

    /// Enter raw mode only when stdin is a terminal.
    pub fn if_tty() -> Result<Option<Self>, TerminalError> {
        if stdin_is_tty() {
            Self::new().map(Some)
        } else {
            Ok(None)
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

pub fn stdin_is_tty() -> bool {
    std::io::stdin().is_terminal()
}

/// Get the current terminal size as (rows, cols).
pub fn terminal_size() -> anyhow::Result<(u16, u16)> {
    let (cols, rows) = size()?;
    Ok((rows, cols))
}
