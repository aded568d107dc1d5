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

//! Link policy knobs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Read buffer size used by the stream role.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Outbound writes that may be queued before `send` is rejected.
pub const DEFAULT_WRITE_QUEUE_DEPTH: usize = 64;

/// Which side wins when an inbound accept lands while an outbound attempt is
/// still in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Promote the inbound socket and cancel the outbound attempt.
    #[default]
    PreferInbound,
    /// Close the inbound socket and keep waiting for the outbound attempt.
    PreferOutbound,
}

/// Behaviour of a [`LinkManager`](super::LinkManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    /// Go back to listening after a failed connect or a lost link.
    pub relisten_on_failure: bool,
    pub tie_break: TieBreak,
    /// Give up on an outbound attempt after this long. `None` waits for the
    /// transport to fail on its own.
    pub connect_timeout: Option<Duration>,
    pub read_buffer_size: usize,
    pub write_queue_depth: usize,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            relisten_on_failure: true,
            tie_break: TieBreak::default(),
            connect_timeout: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_queue_depth: DEFAULT_WRITE_QUEUE_DEPTH,
        }
    }
}
