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

//! Role handles and completion outcomes.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::debug;

use super::state::PeerIdentity;

/// The three mutually exclusive responsibilities the manager can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    Accept,
    Connect,
    Stream,
}

impl RoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Accept => "accept",
            RoleKind::Connect => "connect",
            RoleKind::Stream => "stream",
        }
    }
}

/// Unique id of one role instance. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoleId(u64);

impl RoleId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a role finished.
#[derive(Debug)]
pub enum RoleOutcome<S> {
    /// An established socket, to be promoted into a stream.
    Succeeded(S, PeerIdentity),
    /// The role failed on its own.
    Failed(io::Error),
    /// The role stopped without a fault: it was told to, or its endpoint went away.
    Cancelled,
}

/// Ownership token for a running role.
///
/// Cancelling is idempotent, and dropping the handle cancels the role.
#[derive(Debug)]
pub struct RoleHandle {
    id: RoleId,
    kind: RoleKind,
    cancel_tx: Option<watch::Sender<bool>>,
}

impl RoleHandle {
    /// Create a handle together with the signal the role task listens on.
    pub(crate) fn new(kind: RoleKind) -> (Self, CancelSignal) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = Self {
            id: RoleId::next(),
            kind,
            cancel_tx: Some(cancel_tx),
        };
        (handle, CancelSignal { rx: cancel_rx })
    }

    pub fn id(&self) -> RoleId {
        self.id
    }

    pub fn kind(&self) -> RoleKind {
        self.kind
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_tx.is_none()
    }

    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            debug!("Cancelling {} role {}", self.kind.as_str(), self.id);
            let _ = tx.send(true);
        }
    }
}

impl Drop for RoleHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Receiving side of a [`RoleHandle`]'s cancellation.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Resolves once the owning handle has been cancelled or dropped.
    ///
    /// Cancel safe; may be polled again after being dropped inside `select!`.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }
}
