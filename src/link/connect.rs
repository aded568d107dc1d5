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

//! Connect role: one outbound attempt to a peer.

use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::manager::Shared;
use super::role::{CancelSignal, RoleId, RoleKind, RoleOutcome};
use super::state::PeerIdentity;
use crate::transport::Transport;

/// Dial `peer` once and report the outcome to the manager.
pub(crate) async fn run<T: Transport>(
    shared: Arc<Shared<T>>,
    id: RoleId,
    peer: PeerIdentity,
    mut cancel: CancelSignal,
) {
    shared.transport().pause_discovery();
    info!("Connecting to {}...", peer);

    let attempt = dial(shared.transport(), &peer, shared.settings().connect_timeout);
    let outcome = tokio::select! {
        _ = cancel.cancelled() => {
            // Dropping the attempt drops any half-open socket with it.
            debug!("Connect role {} to {} cancelled", id, peer);
            RoleOutcome::Cancelled
        }
        result = attempt => match result {
            Ok(stream) => {
                info!("Connected to {}", peer);
                RoleOutcome::Succeeded(stream, peer.clone())
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", peer, e);
                RoleOutcome::Failed(e)
            }
        },
    };

    shared.role_finished(RoleKind::Connect, id, outcome);
}

async fn dial<T: Transport>(
    transport: &T,
    peer: &PeerIdentity,
    timeout: Option<Duration>,
) -> io::Result<T::Stream> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, transport.connect(peer))
            .await
            .unwrap_or_else(|_| {
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no answer within {:?}", limit),
                ))
            }),
        None => transport.connect(peer).await,
    }
}
