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

//! Events delivered to the link's subscriber.

use super::state::{ConnectionState, PeerIdentity};

/// Events emitted by a [`LinkManager`](super::LinkManager).
///
/// Events arrive in the order the underlying conditions occurred. For a given
/// link, `StateChanged(Connected)` precedes its first `DataReceived`, and no
/// `DataReceived` from that link follows the `StateChanged` that ends it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The connection state changed.
    StateChanged(ConnectionState),
    /// Bytes read from the connected peer, in read order.
    DataReceived { data: Vec<u8>, peer: PeerIdentity },
    /// Bytes fully written to the connected peer.
    DataSent(Vec<u8>),
    /// Human-readable notice about a transport failure.
    TransientNotice(String),
}

impl LinkEvent {
    pub fn state(&self) -> Option<ConnectionState> {
        match self {
            LinkEvent::StateChanged(state) => Some(*state),
            _ => None,
        }
    }
}
