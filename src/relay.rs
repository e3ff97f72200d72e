//! Input relay: a dedicated thread that blocks on keyboard reads.
//!
//! Raw-mode terminals deliver bytes as typed, so reads complete with small
//! batches (one keystroke, or a paste of up to [`INPUT_BATCH_CAP`] bytes).
//! Each batch is handed to the event loop through a bounded channel of
//! capacity 1: `blocking_send` parks this thread while the previous batch
//! is still unconsumed, so at most one batch is ever in flight and a
//! stalled network side back-pressures the keyboard instead of buffering
//! it without bound.

use std::io::{self, ErrorKind, Read};
use std::thread;

use tokio::sync::mpsc;
use tracing::error;

/// Largest batch a single terminal read may deliver.
pub const INPUT_BATCH_CAP: usize = 128;

/// One completed keyboard read.
pub type InputBatch = Vec<u8>;

/// Start the relay thread. Called once, when the session connects.
pub fn spawn(mailbox: mpsc::Sender<InputBatch>) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("input-relay".into())
        .spawn(move || read_loop(mailbox))
        .expect("failed to spawn input relay thread")
}

fn read_loop(mailbox: mpsc::Sender<InputBatch>) {
    let mut stdin = io::stdin().lock();
    let mut buf = [0u8; INPUT_BATCH_CAP];
    loop {
        match stdin.read(&mut buf) {
            Ok(0) => fatal("stdin closed"),
            Ok(n) => {
                if mailbox.blocking_send(buf[..n].to_vec()).is_err() {
                    // Event loop is gone; the session already ended.
                    return;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => fatal(&format!("stdin read failed: {e}")),
        }
    }
}

/// An interactive session without a keyboard is useless: restore the
/// terminal and take the whole process down. Destructors do not run past
/// `process::exit`, hence the explicit restore.
fn fatal(reason: &str) -> ! {
    error!(reason, "input stream lost, aborting session");
    crate::term::restore();
    std::process::exit(1);
}
