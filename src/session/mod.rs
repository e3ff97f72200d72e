//! Session core: the connection lifecycle state machine and its event loop.
//!
//! One [`Session`] coordinates three timelines into a single consistent
//! run: link completions from the async adapter, protocol callbacks from
//! the telnet engine, and keyboard batches from the relay thread. All
//! mutable session state lives here, on the event-loop thread; nothing is
//! shared except the depth-1 input mailbox.
//!
//! The state machine is single-shot. A link event arriving in a state with
//! no transition for it is a contract breach with the adapter and panics —
//! the raw-mode guard's panic hook restores the terminal before the report
//! prints.

pub mod state;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::net::{self, ConnectTarget, LinkCommand, LinkEvent};
use crate::relay::{self, InputBatch};
use crate::telnet::{opt, OptionTable, TelnetAction, TelnetEngine};
use crate::term::{RawModeGuard, TermControl, FALLBACK_COLUMNS, FALLBACK_ROWS};

pub use state::{LinkState, WriteLedger};

/// What the event loop should do after a link event was handled.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The connection just came up: the caller should enter raw mode and
    /// start the input relay thread.
    Connected,
    /// The remote closed the connection; leave the loop.
    Finished,
}

/// State for one connection attempt, from resolution to close.
pub struct Session<T: TermControl> {
    state: LinkState,
    /// Local echo, on by default; toggled by remote ECHO negotiation.
    echo: bool,
    engine: Option<TelnetEngine>,
    writes: WriteLedger,
    link: mpsc::UnboundedSender<LinkCommand>,
    term: T,
}

impl<T: TermControl> Session<T> {
    pub fn new(link: mpsc::UnboundedSender<LinkCommand>, term: T) -> Self {
        Self {
            state: LinkState::Start,
            echo: true,
            engine: None,
            writes: WriteLedger::new(),
            link,
            term,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn echo_enabled(&self) -> bool {
        self.echo
    }

    /// Issue the resolution request and leave `Start`.
    ///
    /// # Panics
    /// If called in any state but `Start` (the session is single-shot).
    pub fn start(&mut self, target: ConnectTarget) {
        assert_eq!(
            self.state,
            LinkState::Start,
            "session started twice; re-entry into resolution is not supported"
        );
        self.command(LinkCommand::Resolve(target));
        self.state = LinkState::Resolving;
    }

    /// Advance the lifecycle with one completion from the link adapter.
    pub fn on_link_event(&mut self, event: LinkEvent) -> Result<Step, SessionError> {
        match (self.state, event) {
            (LinkState::Resolving, LinkEvent::Resolved(addr)) => {
                self.command(LinkCommand::Connect(addr));
                self.state = LinkState::Connecting;
                Ok(Step::Continue)
            }
            (LinkState::Resolving, LinkEvent::ResolveFailed(reason)) => {
                Err(SessionError::Resolve(reason))
            }
            (LinkState::Connecting, LinkEvent::Connected) => {
                self.command(LinkCommand::StartRead);
                self.engine = Some(TelnetEngine::new(OptionTable::client_defaults()));
                self.state = LinkState::Connected;
                info!("connected");
                Ok(Step::Connected)
            }
            (LinkState::Connecting, LinkEvent::ConnectFailed(reason)) => {
                Err(SessionError::Connect(reason))
            }
            (LinkState::Connected, LinkEvent::Data(bytes)) => {
                let actions = self.engine_mut().feed(&bytes);
                for action in actions {
                    self.dispatch(action);
                }
                Ok(Step::Continue)
            }
            (LinkState::Connected, LinkEvent::WriteComplete { id }) => {
                self.writes.release(id);
                Ok(Step::Continue)
            }
            (LinkState::Connected, LinkEvent::Closed) => {
                self.state = LinkState::Closed;
                Ok(Step::Finished)
            }
            (LinkState::Connected, LinkEvent::Failed(reason)) => {
                Err(SessionError::Link(reason))
            }
            (state, event) => {
                panic!("link event {event:?} violates lifecycle state {state:?}")
            }
        }
    }

    /// Relay one keyboard batch from the mailbox.
    ///
    /// Line endings are normalized to a canonical `\r\n` pair — in raw
    /// mode the OS does no translation, so it must happen here. Every
    /// other byte goes to the encoder individually, matching what an
    /// interactive remote expects. Echoed output is flushed once per
    /// batch.
    pub fn on_input(&mut self, batch: InputBatch) {
        assert_eq!(
            self.state,
            LinkState::Connected,
            "input batch delivered outside a connected session"
        );
        for &byte in &batch {
            if byte == b'\r' || byte == b'\n' {
                self.echo_out(b"\r\n");
                self.transmit_app(b"\r\n");
            } else {
                self.echo_out(&[byte]);
                self.transmit_app(&[byte]);
            }
        }
        if self.echo {
            if let Err(e) = self.term.flush() {
                warn!(error = %e, "terminal flush failed");
            }
        }
    }

    /// React to one protocol-engine callback.
    fn dispatch(&mut self, action: TelnetAction) {
        match action {
            TelnetAction::Receive(bytes) => {
                // Display-only failures never end the session; report and
                // keep going.
                if let Err(e) = self.term.write_bytes(&bytes) {
                    warn!(error = %e, "terminal write failed");
                }
                if let Err(e) = self.term.flush() {
                    warn!(error = %e, "terminal flush failed");
                }
            }
            TelnetAction::Transmit(payload) => self.submit(payload),
            TelnetAction::RemoteWill(opt::ECHO) => {
                debug!("remote echo on, suppressing local echo");
                self.echo = false;
            }
            TelnetAction::RemoteWont(opt::ECHO) => {
                debug!("remote echo off, restoring local echo");
                self.echo = true;
            }
            TelnetAction::RemoteDo(opt::NAWS) => self.report_window_size(),
            TelnetAction::RemoteDo(option) => {
                if self.engine_ref().local_enabled(option) {
                    // Already confirmed with WILL; nothing more to do here.
                    debug!(option, "option enabled locally");
                } else {
                    // Deliberately no refusal on the wire; see OptionTable.
                    warn!(option, "ignoring DO request for unsupported option");
                }
            }
            TelnetAction::RemoteWill(option) => {
                debug!(option, "remote enabled option");
            }
            TelnetAction::RemoteWont(option) => {
                debug!(option, "remote disabled option");
            }
            TelnetAction::RemoteDont(option) => {
                debug!(option, "remote asked us to disable option");
            }
            TelnetAction::Subnegotiation(option, body) => {
                debug!(option, len = body.len(), "unhandled subnegotiation");
            }
        }
    }

    /// Answer a window-size request with the current dimensions, big-endian
    /// 16-bit width then height. A failed query falls back to fixed
    /// defaults rather than leaving the remote without an answer.
    fn report_window_size(&mut self) {
        let (cols, rows) = match self.term.window_size() {
            Ok(size) => size,
            Err(e) => {
                warn!(error = %e, "window size query failed, using fallback");
                (FALLBACK_COLUMNS, FALLBACK_ROWS)
            }
        };
        debug!(cols, rows, "reporting window size");
        let mut payload = [0u8; 4];
        payload[..2].copy_from_slice(&cols.to_be_bytes());
        payload[2..].copy_from_slice(&rows.to_be_bytes());
        let action = self.engine_ref().subnegotiate(opt::NAWS, &payload);
        if let TelnetAction::Transmit(bytes) = action {
            self.submit(bytes);
        }
    }

    /// Encode application bytes and hand them to the link layer.
    fn transmit_app(&mut self, data: &[u8]) {
        let action = self.engine_ref().send(data);
        if let TelnetAction::Transmit(bytes) = action {
            self.submit(bytes);
        }
    }

    fn echo_out(&mut self, bytes: &[u8]) {
        if self.echo {
            if let Err(e) = self.term.write_bytes(bytes) {
                warn!(error = %e, "terminal echo failed");
            }
        }
    }

    /// Move one owned buffer to the link layer and ledger it until the
    /// write completion comes back.
    fn submit(&mut self, payload: Vec<u8>) {
        let id = self.writes.issue();
        self.command(LinkCommand::Write { id, payload });
    }

    fn command(&mut self, command: LinkCommand) {
        if self.link.send(command).is_err() {
            // The link task is gone; a terminal event is already on its
            // way to the loop (or the loop itself is shutting down).
            warn!("link task unavailable, command dropped");
        }
    }

    fn engine_mut(&mut self) -> &mut TelnetEngine {
        self.engine
            .as_mut()
            .expect("protocol engine exists in the connected state")
    }

    fn engine_ref(&self) -> &TelnetEngine {
        self.engine
            .as_ref()
            .expect("protocol engine exists in the connected state")
    }
}

/// Run one complete session: resolve, connect, relay until the remote
/// closes or a failure ends the loop.
///
/// Raw mode and the input relay thread only start once the connection is
/// up — before that the terminal stays cooked so resolution errors print
/// normally.
pub async fn run<T: TermControl>(target: ConnectTarget, term: T) -> Result<(), SessionError> {
    let (event_tx, mut events) = mpsc::channel(net::EVENT_QUEUE_DEPTH);
    let link = net::spawn_link(event_tx);
    let (input_tx, mut inputs) = mpsc::channel::<InputBatch>(1);

    let mut session = Session::new(link, term);
    session.start(target);

    let mut raw_guard: Option<RawModeGuard> = None;
    loop {
        tokio::select! {
            event = events.recv() => {
                let event = event.ok_or(SessionError::EventStreamClosed)?;
                match session.on_link_event(event)? {
                    Step::Continue => {}
                    Step::Connected => {
                        match RawModeGuard::enter() {
                            Ok(guard) => raw_guard = Some(guard),
                            Err(e) => warn!(error = %e, "could not enter raw mode"),
                        }
                        relay::spawn(input_tx.clone());
                    }
                    Step::Finished => break,
                }
            }
            batch = inputs.recv() => {
                if let Some(batch) = batch {
                    session.on_input(batch);
                }
            }
        }
    }

    drop(raw_guard);
    info!("session closed by remote");
    Ok(())
}
