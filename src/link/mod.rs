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

//! Point-to-point link management.
//!
//! A [`LinkManager`] owns at most one active role at a time: accepting,
//! connecting, or streaming over an established socket. It serializes every
//! transition behind a single lock and reports what happens as [`LinkEvent`]s.

mod accept;
mod connect;
mod error;
mod events;
mod manager;
mod role;
mod settings;
mod state;
mod stream;

pub use error::{LinkError, Result};
pub use events::LinkEvent;
pub use manager::LinkManager;
pub use role::{CancelSignal, RoleHandle, RoleId, RoleKind, RoleOutcome};
pub use settings::{LinkSettings, TieBreak, DEFAULT_READ_BUFFER_SIZE, DEFAULT_WRITE_QUEUE_DEPTH};
pub use state::{ConnectionState, PeerIdentity};
