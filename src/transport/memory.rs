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

//! In-process transport.
//!
//! A [`MemoryNetwork`] is a rendezvous table of listening addresses. Each
//! [`MemoryTransport`] bound to it can listen on its own address and dial any
//! other listening address; a successful dial hands each side one end of a
//! `tokio::io::duplex` pipe.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tracing::debug;

use super::{Acceptor, Transport};
use crate::link::PeerIdentity;

/// Default capacity of each direction of a memory pipe.
const PIPE_CAPACITY: usize = 64 * 1024;

type Inbound = mpsc::UnboundedSender<(DuplexStream, PeerIdentity)>;

/// Shared table of listening endpoints.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    endpoints: Arc<Mutex<HashMap<String, Inbound>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that identifies itself as `local` to the peers it dials.
    pub fn transport(&self, local: PeerIdentity) -> MemoryTransport {
        MemoryTransport {
            network: self.clone(),
            local,
        }
    }

    /// Whether something is currently listening on `address`.
    pub fn is_listening(&self, address: &str) -> bool {
        self.endpoints
            .lock()
            .get(address)
            .is_some_and(|tx| !tx.is_closed())
    }
}

/// One node on a [`MemoryNetwork`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    network: MemoryNetwork,
    local: PeerIdentity,
}

impl MemoryTransport {
    pub fn local(&self) -> &PeerIdentity {
        &self.local
    }
}

impl Transport for MemoryTransport {
    type Stream = DuplexStream;
    type Acceptor = MemoryAcceptor;

    async fn listen(&self) -> io::Result<MemoryAcceptor> {
        let address = self.local.address().to_string();
        let mut endpoints = self.network.endpoints.lock();
        if endpoints.get(&address).is_some_and(|tx| !tx.is_closed()) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{} is already listening", address),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        endpoints.insert(address.clone(), tx.clone());
        debug!("Memory endpoint {} listening", address);

        Ok(MemoryAcceptor {
            network: self.network.clone(),
            address,
            tx,
            rx,
        })
    }

    async fn connect(&self, peer: &PeerIdentity) -> io::Result<DuplexStream> {
        let endpoint = self.network.endpoints.lock().get(peer.address()).cloned();
        let refused = || {
            io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("nothing listening on {}", peer.address()),
            )
        };

        let endpoint = endpoint.ok_or_else(refused)?;
        let (local_end, remote_end) = tokio::io::duplex(PIPE_CAPACITY);
        endpoint
            .send((remote_end, self.local.clone()))
            .map_err(|_| refused())?;
        Ok(local_end)
    }
}

/// Listening endpoint on a [`MemoryNetwork`]. Unregisters itself on drop.
#[derive(Debug)]
pub struct MemoryAcceptor {
    network: MemoryNetwork,
    address: String,
    tx: Inbound,
    rx: mpsc::UnboundedReceiver<(DuplexStream, PeerIdentity)>,
}

impl Acceptor for MemoryAcceptor {
    type Stream = DuplexStream;

    async fn accept(&mut self) -> io::Result<(DuplexStream, PeerIdentity)> {
        self.rx.recv().await.ok_or_else(|| {
            io::Error::new(io::ErrorKind::ConnectionAborted, "memory endpoint closed")
        })
    }
}

impl Drop for MemoryAcceptor {
    fn drop(&mut self) {
        let mut endpoints = self.network.endpoints.lock();
        if endpoints
            .get(&self.address)
            .is_some_and(|tx| tx.same_channel(&self.tx))
        {
            endpoints.remove(&self.address);
            debug!("Memory endpoint {} closed", self.address);
        }
        // Refuse anything that raced in before the endpoint was removed.
        self.rx.close();
    }
}
