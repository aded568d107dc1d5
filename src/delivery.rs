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

//! Delivery acknowledgment over the raw byte stream.
//!
//! Application messages travel as [`frame`]d lines. Whenever a peer receives
//! a message it writes [`ACK_TOKEN`] back. The sender keeps each outgoing
//! message pending until a token arrives for it. Reads may split or coalesce
//! what the peer wrote, so incoming bytes are buffered until a whole message
//! or token is in. This is purely a consumer of [`LinkEvent`]s; the link
//! itself never looks at the bytes.

use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, warn};

use crate::link::{LinkEvent, PeerIdentity};

/// Sentinel written back for every received message. Starts and ends with the
/// ASCII ACK control byte, which never appears in chat text.
pub const ACK_TOKEN: &[u8] = b"\x06ACK\x06";

/// Ends every application message on the wire.
pub const MESSAGE_DELIMITER: u8 = b'\n';

/// Unterminated bytes kept while waiting for a delimiter. Anything longer is
/// surfaced as a message of its own.
pub const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Wire form of one application message.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(payload.len() + 1);
    framed.extend_from_slice(payload);
    framed.push(MESSAGE_DELIMITER);
    framed
}

/// Id of a tracked outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery status of an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Handed to the link, not yet written.
    Sending,
    /// Written to the socket, waiting for the peer's token.
    Sent,
    /// The peer acknowledged receipt.
    Delivered,
    /// Rejected, or the link dropped before the peer acknowledged.
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sending => "...",
            DeliveryStatus::Sent => "✓",
            DeliveryStatus::Delivered => "✓✓",
            DeliveryStatus::Failed => "!",
        }
    }

    fn is_pending(&self) -> bool {
        matches!(self, DeliveryStatus::Sending | DeliveryStatus::Sent)
    }
}

/// What a [`LinkEvent`] meant at the delivery layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryUpdate {
    /// A tracked message changed status.
    Status(MessageId, DeliveryStatus),
    /// One application message from the peer, delimiter stripped. The caller
    /// should send [`ACK_TOKEN`] back.
    Payload { data: Vec<u8>, peer: PeerIdentity },
}

#[derive(Debug)]
struct Outgoing {
    id: MessageId,
    data: Vec<u8>,
    status: DeliveryStatus,
}

/// Tracks outgoing messages and splits incoming bytes into tokens and
/// messages.
#[derive(Debug, Default)]
pub struct DeliveryTracker {
    next_id: u64,
    outgoing: VecDeque<Outgoing>,
    carry: Vec<u8>,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a payload about to be sent as `frame(payload)`.
    pub fn track(&mut self, payload: impl Into<Vec<u8>>) -> MessageId {
        self.next_id += 1;
        let id = MessageId(self.next_id);
        self.outgoing.push_back(Outgoing {
            id,
            data: payload.into(),
            status: DeliveryStatus::Sending,
        });
        id
    }

    /// The link refused the message outright.
    pub fn reject(&mut self, id: MessageId) -> Option<DeliveryUpdate> {
        let message = self.outgoing.iter_mut().find(|m| m.id == id)?;
        message.status = DeliveryStatus::Failed;
        let update = DeliveryUpdate::Status(id, DeliveryStatus::Failed);
        self.prune();
        Some(update)
    }

    pub fn status(&self, id: MessageId) -> Option<DeliveryStatus> {
        self.outgoing.iter().find(|m| m.id == id).map(|m| m.status)
    }

    /// Number of messages still waiting for an acknowledgment.
    pub fn pending(&self) -> usize {
        self.outgoing.iter().filter(|m| m.status.is_pending()).count()
    }

    /// Interpret one link event.
    pub fn on_event(&mut self, event: &LinkEvent) -> Vec<DeliveryUpdate> {
        let updates = match event {
            LinkEvent::DataSent(data) => self.on_sent(data),
            LinkEvent::DataReceived { data, peer } => self.on_received(data, peer),
            LinkEvent::StateChanged(state) if !state.is_connected() => {
                // Half a message from a dead link never completes.
                self.carry.clear();
                self.fail_pending()
            }
            _ => Vec::new(),
        };
        self.prune();
        updates
    }

    fn on_sent(&mut self, data: &[u8]) -> Vec<DeliveryUpdate> {
        if data == ACK_TOKEN {
            return Vec::new();
        }
        let payload = data.strip_suffix(&[MESSAGE_DELIMITER]).unwrap_or(data);
        match self
            .outgoing
            .iter_mut()
            .find(|m| m.status == DeliveryStatus::Sending && m.data == payload)
        {
            Some(message) => {
                message.status = DeliveryStatus::Sent;
                vec![DeliveryUpdate::Status(message.id, DeliveryStatus::Sent)]
            }
            None => Vec::new(),
        }
    }

    fn on_received(&mut self, data: &[u8], peer: &PeerIdentity) -> Vec<DeliveryUpdate> {
        self.carry.extend_from_slice(data);
        let Decoded {
            acks,
            mut payloads,
            consumed,
        } = decode(&self.carry);
        self.carry.drain(..consumed);

        if self.carry.len() > MAX_PENDING_BYTES {
            warn!(
                "No message delimiter in {} bytes, surfacing them as is",
                self.carry.len()
            );
            payloads.push(std::mem::take(&mut self.carry));
        }

        let mut updates = Vec::new();
        for _ in 0..acks {
            // Prefer the oldest written message; the token may also beat the
            // write confirmation for a message still marked Sending.
            let index = self
                .outgoing
                .iter()
                .position(|m| m.status == DeliveryStatus::Sent)
                .or_else(|| {
                    self.outgoing
                        .iter()
                        .position(|m| m.status == DeliveryStatus::Sending)
                });
            match index.and_then(|i| self.outgoing.get_mut(i)) {
                Some(message) => {
                    message.status = DeliveryStatus::Delivered;
                    updates.push(DeliveryUpdate::Status(message.id, DeliveryStatus::Delivered));
                }
                None => debug!("Acknowledgment with nothing pending"),
            }
        }

        updates.extend(payloads.into_iter().map(|data| DeliveryUpdate::Payload {
            data,
            peer: peer.clone(),
        }));
        updates
    }

    fn fail_pending(&mut self) -> Vec<DeliveryUpdate> {
        self.outgoing
            .iter_mut()
            .filter(|m| m.status.is_pending())
            .map(|m| {
                m.status = DeliveryStatus::Failed;
                DeliveryUpdate::Status(m.id, DeliveryStatus::Failed)
            })
            .collect()
    }

    /// Forget messages that reached a final status.
    fn prune(&mut self) {
        self.outgoing.retain(|m| m.status.is_pending());
    }
}

/// Complete units found at the front of a receive buffer.
#[derive(Debug, Default, PartialEq, Eq)]
struct Decoded {
    acks: usize,
    payloads: Vec<Vec<u8>>,
    consumed: usize,
}

/// Pull every whole token and delimited message off the front of `buf`.
///
/// Bytes right before a token count as a message even without a delimiter.
/// A trailing partial token or unterminated message is left unconsumed.
fn decode(buf: &[u8]) -> Decoded {
    let mut decoded = Decoded::default();

    loop {
        let rest = &buf[decoded.consumed..];
        if rest.starts_with(ACK_TOKEN) {
            decoded.acks += 1;
            decoded.consumed += ACK_TOKEN.len();
            continue;
        }

        let token = find(rest, ACK_TOKEN);
        let delimiter = rest.iter().position(|&b| b == MESSAGE_DELIMITER);
        match (delimiter, token) {
            (Some(end), token) if token.map_or(true, |t| end < t) => {
                if end > 0 {
                    decoded.payloads.push(rest[..end].to_vec());
                }
                decoded.consumed += end + 1;
            }
            (_, Some(start)) => {
                decoded.payloads.push(rest[..start].to_vec());
                decoded.consumed += start;
            }
            (_, None) => break,
        }
    }

    decoded
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
