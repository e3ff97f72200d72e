//! Telnet protocol engine: option negotiation plus data encode/decode.
//!
//! The engine is deliberately I/O-free. [`TelnetEngine::feed`] turns raw
//! socket bytes into a list of [`TelnetAction`]s for the session to act on;
//! [`TelnetEngine::send`] and [`TelnetEngine::subnegotiate`] produce
//! transmit actions for outgoing traffic. All socket and terminal work
//! stays with the caller, which keeps the negotiation rules testable in
//! isolation.
//!
//! Only the option subset an interactive line session needs is modeled:
//! echo suppression, window-size reporting (NAWS) and suppress-go-ahead.

pub mod parser;

use parser::{Parser, WireEvent};

/// Interpret As Command: prefix of every telnet command sequence.
pub const IAC: u8 = 255;
/// Subnegotiation begin.
pub const SB: u8 = 250;
/// Subnegotiation end.
pub const SE: u8 = 240;
pub const WILL: u8 = 251;
pub const WONT: u8 = 252;
pub const DO: u8 = 253;
pub const DONT: u8 = 254;

/// Option numbers this client knows about.
pub mod opt {
    /// Remote echo (RFC 857).
    pub const ECHO: u8 = 1;
    /// Suppress go-ahead (RFC 858).
    pub const SGA: u8 = 3;
    /// Negotiate about window size (RFC 1073).
    pub const NAWS: u8 = 31;
}

/// What the engine asks its host to do after decoding or encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetAction {
    /// Decoded session data, ready for the local terminal.
    Receive(Vec<u8>),
    /// Encoded bytes that must go out on the socket.
    Transmit(Vec<u8>),
    /// The remote announced it will enable an option.
    RemoteWill(u8),
    /// The remote announced it will disable an option.
    RemoteWont(u8),
    /// The remote asked us to enable an option on our side.
    RemoteDo(u8),
    /// The remote asked us to disable an option on our side.
    RemoteDont(u8),
    /// The remote sent a subnegotiation payload.
    Subnegotiation(u8, Vec<u8>),
}

/// Negotiation stance for one option.
#[derive(Debug, Clone, Copy)]
pub struct OptionEntry {
    pub option: u8,
    /// Agree to enable the option on our side when the remote sends DO.
    pub accept_local: bool,
    /// Agree to the remote enabling the option when it sends WILL.
    pub accept_remote: bool,
}

/// The set of options the engine will negotiate.
///
/// Options absent from the table are never enabled: an unknown WILL is
/// refused with DONT, and an unknown DO is surfaced to the host without a
/// wire reply (the host logs and ignores it — a documented simplification,
/// not silent breakage).
#[derive(Debug, Clone)]
pub struct OptionTable {
    entries: Vec<OptionEntry>,
}

impl OptionTable {
    pub fn new(entries: Vec<OptionEntry>) -> Self {
        Self { entries }
    }

    /// The stance an interactive client takes: let the remote echo, offer
    /// window-size reports, suppress go-ahead in both directions.
    pub fn client_defaults() -> Self {
        Self::new(vec![
            OptionEntry { option: opt::ECHO, accept_local: false, accept_remote: true },
            OptionEntry { option: opt::NAWS, accept_local: true, accept_remote: true },
            OptionEntry { option: opt::SGA, accept_local: true, accept_remote: true },
        ])
    }

    fn accept_local(&self, option: u8) -> bool {
        self.entries.iter().any(|e| e.option == option && e.accept_local)
    }

    fn accept_remote(&self, option: u8) -> bool {
        self.entries.iter().any(|e| e.option == option && e.accept_remote)
    }
}

/// Double every IAC so payload bytes are never read as commands.
fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &byte in data {
        if byte == IAC {
            out.push(IAC);
        }
        out.push(byte);
    }
    out
}

/// Stateful protocol engine for one connection.
///
/// Tracks which options are active on each side so duplicate announcements
/// are absorbed instead of producing negotiation loops.
#[derive(Debug)]
pub struct TelnetEngine {
    parser: Parser,
    options: OptionTable,
    local_active: [bool; 256],
    remote_active: [bool; 256],
}

impl TelnetEngine {
    pub fn new(options: OptionTable) -> Self {
        Self {
            parser: Parser::new(),
            options,
            local_active: [false; 256],
            remote_active: [false; 256],
        }
    }

    /// Decode received socket bytes into actions for the session.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<TelnetAction> {
        let mut actions = Vec::new();
        for event in self.parser.feed(bytes) {
            self.negotiate(event, &mut actions);
        }
        actions
    }

    fn negotiate(&mut self, event: WireEvent, actions: &mut Vec<TelnetAction>) {
        match event {
            WireEvent::Data(bytes) => actions.push(TelnetAction::Receive(bytes)),
            WireEvent::Will(option) => {
                let slot = option as usize;
                if self.remote_active[slot] {
                    // Duplicate announcement, already agreed.
                } else if self.options.accept_remote(option) {
                    self.remote_active[slot] = true;
                    actions.push(TelnetAction::Transmit(vec![IAC, DO, option]));
                    actions.push(TelnetAction::RemoteWill(option));
                } else {
                    actions.push(TelnetAction::Transmit(vec![IAC, DONT, option]));
                }
            }
            WireEvent::Wont(option) => {
                let slot = option as usize;
                if self.remote_active[slot] {
                    self.remote_active[slot] = false;
                    actions.push(TelnetAction::Transmit(vec![IAC, DONT, option]));
                    actions.push(TelnetAction::RemoteWont(option));
                }
            }
            WireEvent::Do(option) => {
                let slot = option as usize;
                if self.local_active[slot] {
                    // Already confirmed.
                } else if self.options.accept_local(option) {
                    self.local_active[slot] = true;
                    actions.push(TelnetAction::Transmit(vec![IAC, WILL, option]));
                    actions.push(TelnetAction::RemoteDo(option));
                } else {
                    // No refusal on the wire; the session logs and ignores.
                    actions.push(TelnetAction::RemoteDo(option));
                }
            }
            WireEvent::Dont(option) => {
                let slot = option as usize;
                if self.local_active[slot] {
                    self.local_active[slot] = false;
                    actions.push(TelnetAction::Transmit(vec![IAC, WONT, option]));
                    actions.push(TelnetAction::RemoteDont(option));
                }
            }
            WireEvent::Subnegotiation(option, body) => {
                actions.push(TelnetAction::Subnegotiation(option, body));
            }
        }
    }

    /// Whether an option is currently enabled on our side (a DO for it was
    /// accepted and confirmed with WILL).
    pub fn local_enabled(&self, option: u8) -> bool {
        self.local_active[option as usize]
    }

    /// Encode application data for transmission.
    pub fn send(&self, data: &[u8]) -> TelnetAction {
        TelnetAction::Transmit(escape(data))
    }

    /// Build an `IAC SB <option> <payload> IAC SE` reply.
    pub fn subnegotiate(&self, option: u8, payload: &[u8]) -> TelnetAction {
        let mut out = Vec::with_capacity(payload.len() + 5);
        out.extend_from_slice(&[IAC, SB, option]);
        out.extend_from_slice(&escape(payload));
        out.extend_from_slice(&[IAC, SE]);
        TelnetAction::Transmit(out)
    }
}
