//! A small interactive telnet client.
//!
//! The crate is split along the session's collaborators: [`net`] owns the
//! socket and speaks in commands and completions, [`telnet`] encodes and
//! decodes the wire protocol, [`relay`] feeds keyboard batches from a
//! blocking thread, [`term`] controls the local terminal, and [`session`]
//! ties them together in a single-threaded event loop.

pub mod error;
pub mod net;
pub mod relay;
pub mod session;
pub mod telnet;
pub mod term;
