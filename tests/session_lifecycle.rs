//! End-to-end session tests against a scripted TCP peer.
//!
//! These run the real link adapter over loopback sockets; only the
//! terminal and keyboard are substituted.

use std::io;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use tinytel::error::SessionError;
use tinytel::net::{self, ConnectTarget, LinkEvent};
use tinytel::session::{Session, Step};
use tinytel::telnet::{opt, DO, IAC, SB, SE, WILL};
use tinytel::term::TermControl;

/// Terminal stand-in that shares its output buffer with the test body.
#[derive(Clone, Default)]
struct CaptureTerm {
    out: Arc<Mutex<Vec<u8>>>,
}

impl CaptureTerm {
    fn taken(&self) -> Vec<u8> {
        self.out.lock().unwrap().clone()
    }
}

impl TermControl for CaptureTerm {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.out.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn window_size(&self) -> io::Result<(u16, u16)> {
        Ok((80, 24))
    }
}

struct Client {
    session: Session<CaptureTerm>,
    events: mpsc::Receiver<LinkEvent>,
    term: CaptureTerm,
}

/// Wire a session to the real link adapter, pointed at `port` on loopback.
fn client(port: u16) -> Client {
    let (event_tx, events) = mpsc::channel(net::EVENT_QUEUE_DEPTH);
    let link = net::spawn_link(event_tx);
    let term = CaptureTerm::default();
    let mut session = Session::new(link, term.clone());
    session.start(ConnectTarget {
        host: "127.0.0.1".into(),
        port,
    });
    Client { session, events, term }
}

/// Drive link events into the session until the connection is up.
async fn until_connected(client: &mut Client) -> Result<(), SessionError> {
    loop {
        let event = client
            .events
            .recv()
            .await
            .ok_or(SessionError::EventStreamClosed)?;
        if client.session.on_link_event(event)? == Step::Connected {
            return Ok(());
        }
    }
}

/// Drive link events into the session until the remote closes.
async fn until_finished(client: &mut Client) -> Result<(), SessionError> {
    loop {
        let event = client
            .events
            .recv()
            .await
            .ok_or(SessionError::EventStreamClosed)?;
        if client.session.on_link_event(event)? == Step::Finished {
            return Ok(());
        }
    }
}

#[tokio::test]
async fn echo_negotiation_and_prompt_display() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut peer, _) = listener.accept().await.unwrap();
        peer.write_all(&[IAC, WILL, opt::ECHO]).await.unwrap();
        peer.write_all(b"login: ").await.unwrap();

        // The client must confirm with DO ECHO.
        let mut reply = [0u8; 3];
        peer.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [IAC, DO, opt::ECHO]);

        // Typed input arrives with the line ending normalized.
        let mut line = [0u8; 6];
        peer.read_exact(&mut line).await.unwrap();
        assert_eq!(&line, b"user\r\n");
    });

    let mut c = client(port);
    until_connected(&mut c).await.unwrap();

    // Pump events until the prompt is on screen and echo is negotiated
    // off; arrival order and batching are up to the socket.
    while c.term.taken() != b"login: " || c.session.echo_enabled() {
        let event = c.events.recv().await.expect("link event stream open");
        c.session.on_link_event(event).unwrap();
    }

    // With remote echo on, typed input is not echoed locally.
    c.session.on_input(b"user\r".to_vec());
    assert_eq!(c.term.taken(), b"login: ");

    until_finished(&mut c).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn naws_request_is_answered() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut peer, _) = listener.accept().await.unwrap();
        peer.write_all(&[IAC, DO, opt::NAWS]).await.unwrap();

        let mut reply = [0u8; 12];
        peer.read_exact(&mut reply).await.unwrap();
        assert_eq!(
            reply,
            [IAC, WILL, opt::NAWS, IAC, SB, opt::NAWS, 0, 80, 0, 24, IAC, SE]
        );
        // Closing ends the session cleanly.
    });

    let mut c = client(port);
    until_connected(&mut c).await.unwrap();
    until_finished(&mut c).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn connect_refused_surfaces_as_error() {
    // Bind and immediately drop to get a port with no listener.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut c = client(port);
    let result = until_connected(&mut c).await;
    assert!(matches!(result, Err(SessionError::Connect(_))));
}
