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

//! MeshMessenger link library.
//!
//! Maintains a single point-to-point serial link between two devices over
//! Bluetooth RFCOMM and reports what happens on it as events.

pub mod config;
pub mod delivery;
pub mod link;
pub mod transport;

pub use link::{ConnectionState, LinkError, LinkEvent, LinkManager, LinkSettings, PeerIdentity};
