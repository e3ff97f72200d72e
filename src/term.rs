//! Local terminal control: output sink, window-size query, raw mode.
//!
//! [`TermControl`] is the seam the session writes through; tests substitute
//! an in-memory sink. Raw mode is owned by a guard that restores the
//! terminal on drop and from a panic hook, and [`restore`] gives the input
//! relay thread a direct path for its fatal-exit case, where destructors
//! never run.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crossterm::terminal::{disable_raw_mode, enable_raw_mode, size as terminal_size};

/// Window dimensions reported when the size query fails.
pub const FALLBACK_COLUMNS: u16 = 80;
pub const FALLBACK_ROWS: u16 = 25;

/// The session's view of the local terminal.
pub trait TermControl {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
    /// Current (columns, rows). Errors are handled by the caller with the
    /// fixed fallback dimensions.
    fn window_size(&self) -> io::Result<(u16, u16)>;
}

/// The real terminal on stdout.
pub struct Tty {
    out: io::Stdout,
}

impl Tty {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl Default for Tty {
    fn default() -> Self {
        Self::new()
    }
}

impl TermControl for Tty {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.out.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    fn window_size(&self) -> io::Result<(u16, u16)> {
        terminal_size()
    }
}

/// Unconditionally leave raw mode. Safe to call more than once.
pub fn restore() {
    let _ = disable_raw_mode();
}

type Cleanup = Arc<Mutex<Option<Box<dyn FnOnce() + Send + 'static>>>>;

/// Keeps the terminal in raw mode for its lifetime.
///
/// Restoration runs exactly once, from whichever comes first: the guard's
/// drop, or the installed panic hook (contract violations in the session
/// core panic, and the terminal must be sane before the report prints).
pub struct RawModeGuard {
    cleanup: Cleanup,
}

impl RawModeGuard {
    pub fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let cleanup: Cleanup = Arc::new(Mutex::new(Some(
            Box::new(restore) as Box<dyn FnOnce() + Send + 'static>
        )));
        install_panic_hook(Arc::clone(&cleanup));
        Ok(Self { cleanup })
    }

    fn run_cleanup(&self) {
        if let Ok(mut slot) = self.cleanup.lock() {
            if let Some(cleanup) = slot.take() {
                cleanup();
            }
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        self.run_cleanup();
    }
}

fn install_panic_hook(cleanup: Cleanup) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Ok(mut slot) = cleanup.lock() {
            if let Some(cleanup) = slot.take() {
                cleanup();
            }
        }
        default_hook(info);
    }));
}
