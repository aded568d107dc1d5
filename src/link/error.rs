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

//! Errors returned synchronously by link commands.

use thiserror::Error;

/// Misuse errors. Transport failures never surface here; they arrive as
/// [`LinkEvent::TransientNotice`](super::LinkEvent::TransientNotice).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("not connected")]
    NotConnected,

    #[error("outbound queue is full")]
    QueueFull,

    #[error("link manager has been shut down")]
    ShutDown,
}

pub type Result<T> = std::result::Result<T, LinkError>;
