//! Async link adapter: owns the socket, speaks in commands and events.
//!
//! The session core never touches sockets. It sends [`LinkCommand`]s to a
//! spawned link task and consumes tagged [`LinkEvent`]s from a bounded
//! channel — one variant per completion kind, no cursor arithmetic. The
//! task performs resolution, connect, reads and writes inline, so all
//! network I/O stays on the single runtime thread; the bounded event
//! channel is the batch limit on how far the network side can run ahead
//! of the session.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Depth of the link-event channel.
pub const EVENT_QUEUE_DEPTH: usize = 512;

/// Read buffer handed to the socket per read submission.
const READ_BUFFER_SIZE: usize = 4096;

/// Hostname and port of the remote session, consumed once during
/// resolution.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
}

/// Operations the session asks the link task to perform.
#[derive(Debug)]
pub enum LinkCommand {
    /// Resolve the target hostname asynchronously.
    Resolve(ConnectTarget),
    /// Connect the socket to a resolved address.
    Connect(SocketAddr),
    /// Arm continuous reads on the connected socket.
    StartRead,
    /// Submit one owned buffer for writing. Completion is reported with
    /// the same id; the buffer itself moves here and is dropped when the
    /// write finishes.
    Write { id: u64, payload: Vec<u8> },
}

/// Completions delivered back to the session loop.
#[derive(Debug)]
pub enum LinkEvent {
    Resolved(SocketAddr),
    ResolveFailed(String),
    Connected,
    ConnectFailed(String),
    /// Bytes arrived from the remote.
    Data(Vec<u8>),
    /// The buffer submitted under `id` has been fully written.
    WriteComplete { id: u64 },
    /// The remote closed the connection cleanly.
    Closed,
    /// The link died with an I/O error on either direction.
    Failed(String),
}

/// Spawn the link task and return its command handle.
///
/// The task runs until the command channel closes, the event channel
/// closes, or the link reaches a terminal event.
pub fn spawn_link(events: mpsc::Sender<LinkEvent>) -> mpsc::UnboundedSender<LinkCommand> {
    let (commands, command_rx) = mpsc::unbounded_channel();
    tokio::spawn(link_task(command_rx, events));
    commands
}

async fn link_task(
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::Sender<LinkEvent>,
) {
    let mut stream = None;

    // Setup phase: resolve and connect are driven one command at a time.
    while let Some(command) = commands.recv().await {
        match command {
            LinkCommand::Resolve(target) => {
                let event = match lookup_host((target.host.as_str(), target.port)).await {
                    Ok(mut addrs) => match addrs.next() {
                        Some(addr) => {
                            debug!(host = %target.host, %addr, "hostname resolved");
                            LinkEvent::Resolved(addr)
                        }
                        None => LinkEvent::ResolveFailed(format!(
                            "no addresses for {}",
                            target.host
                        )),
                    },
                    Err(e) => LinkEvent::ResolveFailed(e.to_string()),
                };
                if events.send(event).await.is_err() {
                    return;
                }
            }
            LinkCommand::Connect(addr) => {
                let event = match TcpStream::connect(addr).await {
                    Ok(socket) => {
                        stream = Some(socket);
                        LinkEvent::Connected
                    }
                    Err(e) => LinkEvent::ConnectFailed(e.to_string()),
                };
                if events.send(event).await.is_err() {
                    return;
                }
            }
            LinkCommand::StartRead => break,
            LinkCommand::Write { .. } => {
                warn!("write submitted before reads were armed; dropped");
            }
        }
    }

    let Some(stream) = stream else {
        // Command channel closed during setup (session ended early).
        return;
    };

    relay_io(stream, commands, events).await;
}

/// Connected phase: reads stream data and serializes submitted writes,
/// reporting each completion under its buffer id.
async fn relay_io(
    stream: TcpStream,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::Sender<LinkEvent>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => {
                let event = match read {
                    Ok(0) => LinkEvent::Closed,
                    Ok(n) => LinkEvent::Data(buf[..n].to_vec()),
                    Err(e) => LinkEvent::Failed(e.to_string()),
                };
                let terminal = !matches!(event, LinkEvent::Data(_));
                if events.send(event).await.is_err() || terminal {
                    return;
                }
            }
            command = commands.recv() => {
                match command {
                    Some(LinkCommand::Write { id, payload }) => {
                        if let Err(e) = writer.write_all(&payload).await {
                            let _ = events.send(LinkEvent::Failed(e.to_string())).await;
                            return;
                        }
                        if events.send(LinkEvent::WriteComplete { id }).await.is_err() {
                            return;
                        }
                    }
                    Some(other) => {
                        warn!(?other, "unexpected command on a connected link; ignored");
                    }
                    None => return,
                }
            }
        }
    }
}
