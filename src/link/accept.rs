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

//! Accept role: wait for inbound connections on the service endpoint.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::manager::Shared;
use super::role::{CancelSignal, RoleId, RoleKind, RoleOutcome};
use crate::transport::{Acceptor, Transport};

/// Accept loop.
///
/// The listening endpoint is opened on the role's own task, then each accepted
/// socket is offered to the manager. The loop ends when the manager takes a
/// socket, when the role is cancelled, or when `accept` fails.
pub(crate) async fn run<T: Transport>(shared: Arc<Shared<T>>, id: RoleId, mut cancel: CancelSignal) {
    let mut acceptor = tokio::select! {
        _ = cancel.cancelled() => {
            debug!("Accept role {} cancelled before listening", id);
            return;
        }
        result = shared.transport().listen() => match result {
            Ok(acceptor) => acceptor,
            Err(e) => {
                warn!("Unable to open listening endpoint: {}", e);
                shared.role_finished(RoleKind::Accept, id, RoleOutcome::Failed(e));
                return;
            }
        },
    };

    info!("Waiting for connections...");

    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Accept role {} cancelled", id);
                return;
            }
            accepted = acceptor.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                info!("Connection from: {}", peer);
                if !shared.offer_inbound(id, stream, peer) {
                    return;
                }
            }
            Err(e) => {
                // The endpoint went away underneath us. Not a link failure.
                debug!("Accept error on role {}: {}", id, e);
                shared.role_finished(RoleKind::Accept, id, RoleOutcome::Cancelled);
                return;
            }
        }
    }
}
