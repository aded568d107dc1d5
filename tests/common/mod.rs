//! Scripted transport for driving a `LinkManager` from tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::{mpsc, oneshot};

use meshlink::transport::{Acceptor, Transport};
use meshlink::{LinkEvent, LinkManager, LinkSettings, PeerIdentity};

const WAIT: Duration = Duration::from_secs(2);

/// Counters shared by every socket and endpoint the transport hands out.
#[derive(Debug, Default)]
pub struct Probe {
    pub sockets_opened: AtomicUsize,
    pub sockets_closed: AtomicUsize,
    pub listens: AtomicUsize,
    pub listeners_open: AtomicUsize,
    pub connects_in_flight: AtomicUsize,
    pub discovery_pauses: AtomicUsize,
    pub fail_listen: Mutex<Option<io::ErrorKind>>,
}

impl Probe {
    pub fn sockets_open(&self) -> usize {
        self.sockets_opened.load(Ordering::SeqCst) - self.sockets_closed.load(Ordering::SeqCst)
    }

    pub fn listeners_open(&self) -> usize {
        self.listeners_open.load(Ordering::SeqCst)
    }

    pub fn connects_in_flight(&self) -> usize {
        self.connects_in_flight.load(Ordering::SeqCst)
    }

    /// A tracked socket for the manager plus the raw remote end for the test.
    pub fn socket_pair(self: &Arc<Self>) -> (TrackedStream, DuplexStream, Arc<AtomicUsize>) {
        self.tracked(false)
    }

    /// Like [`Probe::socket_pair`], but every write fails with a broken pipe.
    pub fn broken_socket_pair(self: &Arc<Self>) -> (TrackedStream, DuplexStream, Arc<AtomicUsize>) {
        self.tracked(true)
    }

    fn tracked(self: &Arc<Self>, fail_writes: bool) -> (TrackedStream, DuplexStream, Arc<AtomicUsize>) {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let closes = Arc::new(AtomicUsize::new(0));
        self.sockets_opened.fetch_add(1, Ordering::SeqCst);
        let stream = TrackedStream {
            inner: local,
            closes: closes.clone(),
            probe: self.clone(),
            fail_writes,
        };
        (stream, remote, closes)
    }
}

/// A socket that counts how many times it was closed.
#[derive(Debug)]
pub struct TrackedStream {
    inner: DuplexStream,
    closes: Arc<AtomicUsize>,
    probe: Arc<Probe>,
    fail_writes: bool,
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.probe.sockets_closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.fail_writes {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe")));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

pub type Inbound = mpsc::UnboundedSender<io::Result<(TrackedStream, PeerIdentity)>>;

/// One outbound attempt waiting for the test to decide its fate.
#[derive(Debug)]
pub struct ConnectRequest {
    pub peer: PeerIdentity,
    pub reply: oneshot::Sender<io::Result<TrackedStream>>,
}

pub struct ScriptedTransport {
    probe: Arc<Probe>,
    listen_tx: mpsc::UnboundedSender<Inbound>,
    connect_tx: mpsc::UnboundedSender<ConnectRequest>,
}

struct InFlight(Arc<Probe>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.connects_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Transport for ScriptedTransport {
    type Stream = TrackedStream;
    type Acceptor = ScriptedAcceptor;

    async fn listen(&self) -> io::Result<ScriptedAcceptor> {
        self.probe.listens.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = *self.probe.fail_listen.lock() {
            return Err(io::Error::new(kind, "adapter unavailable"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.probe.listeners_open.fetch_add(1, Ordering::SeqCst);
        let _ = self.listen_tx.send(tx);
        Ok(ScriptedAcceptor {
            rx,
            probe: self.probe.clone(),
        })
    }

    async fn connect(&self, peer: &PeerIdentity) -> io::Result<TrackedStream> {
        self.probe.connects_in_flight.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight(self.probe.clone());

        let (reply, answer) = oneshot::channel();
        let _ = self.connect_tx.send(ConnectRequest {
            peer: peer.clone(),
            reply,
        });
        answer
            .await
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::ConnectionAborted, "dropped")))
    }

    fn pause_discovery(&self) {
        self.probe.discovery_pauses.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct ScriptedAcceptor {
    rx: mpsc::UnboundedReceiver<io::Result<(TrackedStream, PeerIdentity)>>,
    probe: Arc<Probe>,
}

impl Drop for ScriptedAcceptor {
    fn drop(&mut self) {
        self.probe.listeners_open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Acceptor for ScriptedAcceptor {
    type Stream = TrackedStream;

    async fn accept(&mut self) -> io::Result<(TrackedStream, PeerIdentity)> {
        self.rx
            .recv()
            .await
            .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::ConnectionAborted, "closed")))
    }
}

/// A manager over a scripted transport plus the test's controls.
pub struct Harness {
    pub manager: LinkManager<ScriptedTransport>,
    pub events: mpsc::UnboundedReceiver<LinkEvent>,
    pub listens: mpsc::UnboundedReceiver<Inbound>,
    pub connects: mpsc::UnboundedReceiver<ConnectRequest>,
    pub probe: Arc<Probe>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(LinkSettings::default())
    }

    pub fn with_settings(settings: LinkSettings) -> Self {
        let probe = Arc::new(Probe::default());
        let (listen_tx, listens) = mpsc::unbounded_channel();
        let (connect_tx, connects) = mpsc::unbounded_channel();
        let transport = ScriptedTransport {
            probe: probe.clone(),
            listen_tx,
            connect_tx,
        };
        let manager = LinkManager::new(transport, settings);
        let events = manager.take_event_receiver().unwrap();
        Self {
            manager,
            events,
            listens,
            connects,
            probe,
        }
    }

    pub async fn next_event(&mut self) -> LinkEvent {
        tokio::time::timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    /// Assert that nothing else is emitted for a little while.
    pub async fn expect_quiet(&mut self) {
        if let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(50), self.events.recv()).await
        {
            panic!("unexpected event: {:?}", event);
        }
    }

    pub async fn next_listen(&mut self) -> Inbound {
        tokio::time::timeout(WAIT, self.listens.recv())
            .await
            .expect("timed out waiting for listen")
            .expect("listen channel closed")
    }

    pub async fn next_connect(&mut self) -> ConnectRequest {
        tokio::time::timeout(WAIT, self.connects.recv())
            .await
            .expect("timed out waiting for connect")
            .expect("connect channel closed")
    }
}

/// Poll `condition` until it holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}
