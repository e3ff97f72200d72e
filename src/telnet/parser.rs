//! Byte-stream decoder for the telnet wire protocol.
//!
//! [`Parser::feed`] consumes raw socket bytes and produces [`WireEvent`]s.
//! The parser is a plain synchronous state machine with no I/O handles, so
//! it can sit behind any byte source and is trivially unit-testable. Input
//! may be split at arbitrary boundaries across calls; state carries over.

use super::{DO, DONT, IAC, SB, SE, WILL, WONT};

/// One decoded unit from the remote byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    /// Plain session data (escape sequences already un-doubled).
    Data(Vec<u8>),
    Will(u8),
    Wont(u8),
    Do(u8),
    Dont(u8),
    /// `IAC SB <option> <payload> IAC SE`.
    Subnegotiation(u8, Vec<u8>),
}

#[derive(Debug, Clone, Copy)]
enum ParseState {
    /// Plain data bytes.
    Ground,
    /// Saw IAC, awaiting the command byte.
    Command,
    /// Saw IAC WILL/WONT/DO/DONT, awaiting the option byte.
    Negotiate(u8),
    /// Saw IAC SB, awaiting the option byte.
    SubOption,
    /// Collecting subnegotiation payload.
    SubBody,
    /// Saw IAC inside a subnegotiation payload.
    SubCommand,
}

#[derive(Debug)]
pub struct Parser {
    state: ParseState,
    data: Vec<u8>,
    sub_option: u8,
    sub_body: Vec<u8>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: ParseState::Ground,
            data: Vec::new(),
            sub_option: 0,
            sub_body: Vec::new(),
        }
    }

    /// Decode a chunk of raw bytes into wire events.
    ///
    /// Trailing plain data is flushed at the end of every call so the
    /// session never sits on received output (interactive latency beats
    /// batching here). Partial command sequences stay buffered for the
    /// next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<WireEvent> {
        let mut events = Vec::new();
        for &byte in bytes {
            self.step(byte, &mut events);
        }
        self.flush_data(&mut events);
        events
    }

    fn flush_data(&mut self, events: &mut Vec<WireEvent>) {
        if !self.data.is_empty() {
            events.push(WireEvent::Data(std::mem::take(&mut self.data)));
        }
    }

    fn step(&mut self, byte: u8, events: &mut Vec<WireEvent>) {
        self.state = match self.state {
            ParseState::Ground => {
                if byte == IAC {
                    ParseState::Command
                } else {
                    self.data.push(byte);
                    ParseState::Ground
                }
            }
            // Data is flushed only once a real command is recognized, so
            // an escaped literal IAC never splits the surrounding data.
            ParseState::Command => match byte {
                // IAC IAC: a literal 0xff in the data stream.
                IAC => {
                    self.data.push(IAC);
                    ParseState::Ground
                }
                WILL | WONT | DO | DONT => {
                    self.flush_data(events);
                    ParseState::Negotiate(byte)
                }
                SB => {
                    self.flush_data(events);
                    ParseState::SubOption
                }
                // NOP, GA and friends carry no payload for this client.
                _ => ParseState::Ground,
            },
            ParseState::Negotiate(command) => {
                events.push(match command {
                    WILL => WireEvent::Will(byte),
                    WONT => WireEvent::Wont(byte),
                    DO => WireEvent::Do(byte),
                    _ => WireEvent::Dont(byte),
                });
                ParseState::Ground
            }
            ParseState::SubOption => {
                self.sub_option = byte;
                self.sub_body.clear();
                ParseState::SubBody
            }
            ParseState::SubBody => {
                if byte == IAC {
                    ParseState::SubCommand
                } else {
                    self.sub_body.push(byte);
                    ParseState::SubBody
                }
            }
            ParseState::SubCommand => match byte {
                SE => {
                    let body = std::mem::take(&mut self.sub_body);
                    events.push(WireEvent::Subnegotiation(self.sub_option, body));
                    ParseState::Ground
                }
                // IAC IAC inside the payload: literal 0xff.
                IAC => {
                    self.sub_body.push(IAC);
                    ParseState::SubBody
                }
                // Anything else is a malformed subnegotiation: drop the
                // partial payload and resynchronize on plain data.
                _ => {
                    self.sub_body.clear();
                    ParseState::Ground
                }
            },
        };
    }
}
