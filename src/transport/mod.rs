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

//! Byte-stream transports the link runs over.
//!
//! A [`Transport`] knows how to open a listening endpoint and how to dial a
//! peer. Both ends of a link rendezvous on [`SERVICE_UUID`]; the RFCOMM
//! transport maps it to a fixed channel.

pub mod memory;
pub mod rfcomm;

use std::future::Future;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use crate::link::PeerIdentity;

pub use memory::{MemoryAcceptor, MemoryNetwork, MemoryTransport};
pub use rfcomm::{RfcommAcceptor, RfcommTransport};

/// Service record identifier shared by both ends of a link (Serial Port Profile).
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Service name registered alongside [`SERVICE_UUID`].
pub const SERVICE_NAME: &str = "MeshMessenger";

/// An established, bidirectional byte stream. Dropping it closes it.
pub trait LinkStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<S> LinkStream for S where S: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// A connection-oriented transport.
pub trait Transport: Send + Sync + 'static {
    type Stream: LinkStream;
    type Acceptor: Acceptor<Stream = Self::Stream>;

    /// Open a listening endpoint for [`SERVICE_UUID`].
    fn listen(&self) -> impl Future<Output = io::Result<Self::Acceptor>> + Send;

    /// Dial `peer`. Resolves once the socket is established or has failed.
    fn connect(&self, peer: &PeerIdentity) -> impl Future<Output = io::Result<Self::Stream>> + Send;

    /// Stop any ambient device discovery before dialling.
    fn pause_discovery(&self) {}
}

/// A listening endpoint. Dropping it closes the endpoint.
pub trait Acceptor: Send + 'static {
    type Stream: LinkStream;

    /// Wait for the next inbound connection.
    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, PeerIdentity)>> + Send;
}
