// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The link manager state machine.

use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::error::{LinkError, Result};
use super::events::LinkEvent;
use super::role::{RoleHandle, RoleId, RoleKind, RoleOutcome};
use super::settings::{LinkSettings, TieBreak};
use super::state::{ConnectionState, PeerIdentity};
use super::stream::{self, StreamHandle};
use super::{accept, connect};
use crate::transport::Transport;

/// Owner of the single link to a peer.
///
/// Commands never block on the transport: each role runs on its own Tokio
/// task, so commands must be issued from within a Tokio runtime. All commands
/// and all role callbacks go through one lock, so every transition is
/// observed in a single total order.
///
/// Dropping the manager shuts it down.
pub struct LinkManager<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> LinkManager<T> {
    /// Create an idle manager over `transport`.
    pub fn new(transport: T, settings: LinkSettings) -> Self {
        let (events, event_rx) = mpsc::unbounded_channel();
        let inner = Inner {
            state: ConnectionState::Idle,
            accept: None,
            connect: None,
            stream: None,
            events,
            event_rx: Some(event_rx),
            shut_down: false,
        };

        Self {
            shared: Arc::new(Shared {
                transport,
                settings,
                inner: Mutex::new(inner),
            }),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<LinkEvent>> {
        self.shared.inner.lock().event_rx.take()
    }

    /// Hand events over to a new subscriber.
    ///
    /// The previous receiver sees its channel close once it has drained what
    /// was already delivered to it.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<LinkEvent> {
        let (events, event_rx) = mpsc::unbounded_channel();
        let mut inner = self.shared.inner.lock();
        inner.events = events;
        inner.event_rx = None;
        event_rx
    }

    /// Wait for inbound connections.
    ///
    /// Cancels any outbound attempt or open stream. Listening again while
    /// already listening keeps the existing endpoint.
    pub fn start_listening(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        if inner.shut_down {
            return Err(LinkError::ShutDown);
        }
        self.shared.listen_locked(&mut inner);
        Ok(())
    }

    /// Dial `peer`, replacing any earlier attempt and any open stream.
    ///
    /// A running accept role keeps running; whichever side establishes a
    /// socket first wins.
    pub fn connect_to(&self, peer: PeerIdentity) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        if inner.shut_down {
            return Err(LinkError::ShutDown);
        }

        if inner.state == ConnectionState::Connecting {
            inner.cancel(RoleKind::Connect);
        }
        inner.cancel(RoleKind::Stream);

        let (handle, cancel) = RoleHandle::new(RoleKind::Connect);
        debug!("Starting connect role {} for {}", handle.id(), peer);
        tokio::spawn(connect::run(self.shared.clone(), handle.id(), peer, cancel));
        inner.connect = Some(handle);
        inner.set_state(ConnectionState::Connecting);
        Ok(())
    }

    /// Queue `data` for the connected peer.
    ///
    /// Returns immediately. Delivery shows up later as
    /// [`LinkEvent::DataSent`], failure as [`LinkEvent::TransientNotice`].
    pub fn send(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        let inner = self.shared.inner.lock();
        if inner.shut_down {
            return Err(LinkError::ShutDown);
        }
        if inner.state != ConnectionState::Connected {
            return Err(LinkError::NotConnected);
        }

        let stream = inner.stream.as_ref().ok_or(LinkError::NotConnected)?;
        stream.try_write(data.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => LinkError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => LinkError::NotConnected,
        })
    }

    pub fn current_state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Peer of the open stream, if any.
    pub fn connected_peer(&self) -> Option<PeerIdentity> {
        self.shared
            .inner
            .lock()
            .stream
            .as_ref()
            .map(|stream| stream.peer.clone())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.inner.lock().shut_down
    }

    /// Cancel every role and go idle for good. Further calls are no-ops.
    pub fn shutdown(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.shut_down {
            return;
        }
        info!("Shutting down link manager");
        inner.shut_down = true;
        inner.cancel(RoleKind::Connect);
        inner.cancel(RoleKind::Stream);
        inner.cancel(RoleKind::Accept);
        inner.set_state(ConnectionState::Idle);
    }

    pub fn transport(&self) -> &T {
        &self.shared.transport
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.shared.settings
    }
}

impl<T: Transport> Drop for LinkManager<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State shared between the manager and its role tasks.
pub(crate) struct Shared<T: Transport> {
    transport: T,
    settings: LinkSettings,
    inner: Mutex<Inner>,
}

/// Everything the lock guards.
struct Inner {
    state: ConnectionState,
    accept: Option<RoleHandle>,
    connect: Option<RoleHandle>,
    stream: Option<StreamHandle>,
    events: mpsc::UnboundedSender<LinkEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<LinkEvent>>,
    shut_down: bool,
}

impl Inner {
    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        info!("Link state: {} -> {}", self.state, state);
        self.state = state;
        self.emit(LinkEvent::StateChanged(state));
    }

    fn emit(&self, event: LinkEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn notice(&self, text: impl Into<String>) {
        let text = text.into();
        warn!("{}", text);
        self.emit(LinkEvent::TransientNotice(text));
    }

    fn current_id(&self, kind: RoleKind) -> Option<RoleId> {
        match kind {
            RoleKind::Accept => self.accept.as_ref().map(RoleHandle::id),
            RoleKind::Connect => self.connect.as_ref().map(RoleHandle::id),
            RoleKind::Stream => self.stream.as_ref().map(|stream| stream.role.id()),
        }
    }

    fn is_current(&self, kind: RoleKind, id: RoleId) -> bool {
        self.current_id(kind) == Some(id)
    }

    /// Cancel the role of `kind`, if one is running, and forget it.
    fn cancel(&mut self, kind: RoleKind) {
        match kind {
            RoleKind::Accept => {
                if let Some(mut handle) = self.accept.take() {
                    handle.cancel();
                }
            }
            RoleKind::Connect => {
                if let Some(mut handle) = self.connect.take() {
                    handle.cancel();
                }
            }
            RoleKind::Stream => {
                if let Some(mut stream) = self.stream.take() {
                    stream.role.cancel();
                }
            }
        }
    }
}

/// State the manager is in while a role of `kind` is the one it waits on.
fn active_state(kind: RoleKind) -> ConnectionState {
    match kind {
        RoleKind::Accept => ConnectionState::Listening,
        RoleKind::Connect => ConnectionState::Connecting,
        RoleKind::Stream => ConnectionState::Connected,
    }
}

impl<T: Transport> Shared<T> {
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    fn listen_locked(self: &Arc<Self>, inner: &mut Inner) {
        inner.cancel(RoleKind::Connect);
        inner.cancel(RoleKind::Stream);

        if inner.accept.is_none() {
            let (handle, cancel) = RoleHandle::new(RoleKind::Accept);
            debug!("Starting accept role {}", handle.id());
            tokio::spawn(accept::run(self.clone(), handle.id(), cancel));
            inner.accept = Some(handle);
        }
        inner.set_state(ConnectionState::Listening);
    }

    /// Replace whatever is running with a stream over `socket`.
    fn promote(self: &Arc<Self>, inner: &mut Inner, socket: T::Stream, peer: PeerIdentity) {
        inner.cancel(RoleKind::Accept);
        inner.cancel(RoleKind::Connect);
        inner.cancel(RoleKind::Stream);

        info!("Link established with {}", peer);
        inner.stream = Some(stream::spawn(self, socket, peer));
        inner.set_state(ConnectionState::Connected);
    }

    /// Drop to idle after a transport failure, then listen again if allowed.
    fn fall_back(self: &Arc<Self>, inner: &mut Inner, notice: String) {
        let relisten = self.settings.relisten_on_failure;
        inner.cancel(RoleKind::Connect);
        inner.cancel(RoleKind::Stream);
        if !relisten {
            inner.cancel(RoleKind::Accept);
        }

        inner.set_state(ConnectionState::Idle);
        inner.notice(notice);

        if relisten {
            self.listen_locked(inner);
        }
    }

    /// An accept role produced `socket`. Returns whether it should keep accepting.
    pub(crate) fn offer_inbound(self: &Arc<Self>, id: RoleId, socket: T::Stream, peer: PeerIdentity) -> bool {
        let mut inner = self.inner.lock();
        if inner.shut_down || !inner.is_current(RoleKind::Accept, id) {
            debug!("Closing connection from {} accepted by stale role {}", peer, id);
            return false;
        }

        match (inner.state, self.settings.tie_break) {
            (ConnectionState::Listening, _) | (ConnectionState::Connecting, TieBreak::PreferInbound) => {
                self.promote(&mut inner, socket, peer);
                false
            }
            (ConnectionState::Connecting, TieBreak::PreferOutbound) => {
                info!("Outbound attempt in flight, closing connection from {}", peer);
                true
            }
            (ConnectionState::Connected, _) | (ConnectionState::Idle, _) => {
                info!("Busy, closing connection from {}", peer);
                true
            }
        }
    }

    /// A role finished. Outcomes from roles that are no longer current are
    /// dropped without a trace, closing any socket they carry.
    pub(crate) fn role_finished(self: &Arc<Self>, kind: RoleKind, id: RoleId, outcome: RoleOutcome<T::Stream>) {
        let mut inner = self.inner.lock();
        if !inner.is_current(kind, id) {
            debug!("Ignoring outcome of stale {} role {}", kind.as_str(), id);
            return;
        }

        match outcome {
            RoleOutcome::Succeeded(socket, peer) => {
                inner.cancel(kind);
                self.promote(&mut inner, socket, peer);
            }
            RoleOutcome::Failed(e) => {
                inner.cancel(kind);
                match kind {
                    RoleKind::Accept => {
                        inner.notice(format!("Unable to listen for connections: {}", e));
                        if inner.state == ConnectionState::Listening {
                            inner.set_state(ConnectionState::Idle);
                        }
                    }
                    RoleKind::Connect => self.fall_back(&mut inner, connect_failed(&e)),
                    RoleKind::Stream => self.fall_back(&mut inner, "Connection lost".to_string()),
                }
            }
            RoleOutcome::Cancelled => {
                inner.cancel(kind);
                if inner.state == active_state(kind) {
                    inner.set_state(ConnectionState::Idle);
                }
            }
        }
    }

    /// Publish bytes read by stream role `id`. Returns false once that role
    /// is no longer the live stream.
    pub(crate) fn deliver(&self, id: RoleId, data: Vec<u8>, peer: &PeerIdentity) -> bool {
        let inner = self.inner.lock();
        if !inner.is_current(RoleKind::Stream, id) || inner.state != ConnectionState::Connected {
            return false;
        }
        inner.emit(LinkEvent::DataReceived {
            data,
            peer: peer.clone(),
        });
        true
    }

    pub(crate) fn data_sent(&self, id: RoleId, data: Vec<u8>) {
        let inner = self.inner.lock();
        if inner.is_current(RoleKind::Stream, id) {
            inner.emit(LinkEvent::DataSent(data));
        }
    }

    /// The writer of stream role `id` hit an error. The link is treated as
    /// lost; the reader's own outcome is stale by the time it arrives.
    pub(crate) fn write_failed(self: &Arc<Self>, id: RoleId, error: io::Error) {
        let mut inner = self.inner.lock();
        if inner.is_current(RoleKind::Stream, id) {
            self.fall_back(&mut inner, format!("Unable to send: {}", error));
        }
    }
}

fn connect_failed(error: &io::Error) -> String {
    match error.kind() {
        io::ErrorKind::TimedOut => "Unable to connect: timed out".to_string(),
        _ => format!("Unable to connect: {}", error),
    }
}
