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

//! Stream role: pump bytes over one established socket.
//!
//! The socket is split in two. The reader task owns the read half and the
//! writer task owns the write half; the socket closes when both halves are
//! gone.

use std::io;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::manager::Shared;
use super::role::{CancelSignal, RoleHandle, RoleId, RoleKind, RoleOutcome};
use super::state::PeerIdentity;
use crate::transport::{LinkStream, Transport};

/// The manager's side of a running stream role.
#[derive(Debug)]
pub(crate) struct StreamHandle {
    pub(crate) role: RoleHandle,
    pub(crate) peer: PeerIdentity,
    outbound: mpsc::Sender<Vec<u8>>,
}

impl StreamHandle {
    /// Queue `data` for the writer without blocking.
    pub(crate) fn try_write(&self, data: Vec<u8>) -> Result<(), mpsc::error::TrySendError<Vec<u8>>> {
        self.outbound.try_send(data)
    }
}

/// Start the reader and writer tasks over `stream`.
pub(crate) fn spawn<T: Transport>(
    shared: &Arc<Shared<T>>,
    stream: T::Stream,
    peer: PeerIdentity,
) -> StreamHandle {
    let (role, cancel) = RoleHandle::new(RoleKind::Stream);
    let id = role.id();
    let settings = shared.settings();
    let (outbound_tx, outbound_rx) = mpsc::channel(settings.write_queue_depth.max(1));
    let (reader, writer) = tokio::io::split(stream);

    tokio::spawn(read_loop(
        shared.clone(),
        id,
        reader,
        peer.clone(),
        settings.read_buffer_size.max(1),
        cancel.clone(),
    ));
    tokio::spawn(write_loop(shared.clone(), id, writer, outbound_rx, cancel));

    StreamHandle {
        role,
        peer,
        outbound: outbound_tx,
    }
}

async fn read_loop<T: Transport, S: LinkStream>(
    shared: Arc<Shared<T>>,
    id: RoleId,
    mut reader: ReadHalf<S>,
    peer: PeerIdentity,
    buffer_size: usize,
    mut cancel: CancelSignal,
) {
    info!("Stream role {} started for {}", id, peer);
    let mut buf = vec![0u8; buffer_size];

    let outcome = loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break RoleOutcome::Cancelled,
            read = reader.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                info!("Connection closed by remote");
                break RoleOutcome::Failed(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by remote",
                ));
            }
            Ok(n) => {
                debug!("Received {} bytes from {}", n, peer);
                if !shared.deliver(id, buf[..n].to_vec(), &peer) {
                    break RoleOutcome::Cancelled;
                }
            }
            Err(e) => {
                error!("Read error: {}", e);
                break RoleOutcome::Failed(e);
            }
        }
    };

    shared.role_finished(RoleKind::Stream, id, outcome);
}

async fn write_loop<T: Transport, S: LinkStream>(
    shared: Arc<Shared<T>>,
    id: RoleId,
    mut writer: WriteHalf<S>,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    mut cancel: CancelSignal,
) {
    loop {
        let data = tokio::select! {
            _ = cancel.cancelled() => break,
            data = outbound.recv() => match data {
                Some(data) => data,
                None => break,
            },
        };

        let written = tokio::select! {
            _ = cancel.cancelled() => break,
            written = write_all(&mut writer, &data) => written,
        };

        match written {
            Ok(()) => shared.data_sent(id, data),
            Err(e) => {
                error!("Write error: {}", e);
                shared.write_failed(id, e);
                break;
            }
        }
    }
    debug!("Writer for stream role {} stopped", id);
}

async fn write_all<S: LinkStream>(writer: &mut WriteHalf<S>, data: &[u8]) -> io::Result<()> {
    writer.write_all(data).await?;
    writer.flush().await
}
