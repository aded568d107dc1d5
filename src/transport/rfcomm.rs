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

//! Bluetooth RFCOMM transport backed by BlueZ.

use bluer::rfcomm::{Listener, SocketAddr, Stream};
use bluer::{Adapter, AdapterEvent, Address};
use futures::StreamExt;
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{Acceptor, Transport, SERVICE_NAME, SERVICE_UUID};
use crate::link::PeerIdentity;

/// Default RFCOMM channel for [`SERVICE_UUID`].
pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

/// RFCOMM transport. Listens on and dials a fixed channel.
///
/// Opened with [`RfcommTransport::open`] it also drives the local adapter:
/// the alias is advertised whenever listening starts, and a scan started
/// with [`RfcommTransport::start_discovery`] is stopped before every dial.
#[derive(Clone)]
pub struct RfcommTransport {
    channel: u8,
    adapter: Option<Adapter>,
    alias: Option<String>,
    discovery: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl RfcommTransport {
    /// Bare sockets on `channel`. Adapter settings are left alone.
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            adapter: None,
            alias: None,
            discovery: Arc::new(Mutex::new(None)),
        }
    }

    /// Use the default BlueZ adapter, powering it on if needed.
    pub async fn open(channel: u8, alias: impl Into<String>) -> bluer::Result<Self> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        if !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await?;
        }

        Ok(Self {
            adapter: Some(adapter),
            alias: Some(alias.into()),
            ..Self::new(channel)
        })
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn adapter(&self) -> Option<&Adapter> {
        self.adapter.as_ref()
    }

    /// Make the adapter visible under its alias.
    async fn advertise(&self) -> bluer::Result<()> {
        let Some(adapter) = &self.adapter else {
            return Ok(());
        };
        if let Some(alias) = &self.alias {
            adapter.set_alias(alias.clone()).await?;
            info!("Bluetooth name set to: {}", alias);
        }
        adapter.set_discoverable(true).await?;
        adapter.set_pairable(true).await?;
        Ok(())
    }

    /// Scan for nearby devices. Found devices arrive on the returned channel
    /// until the scan is paused or a new one replaces it.
    pub async fn start_discovery(&self) -> io::Result<mpsc::UnboundedReceiver<PeerIdentity>> {
        let adapter = self
            .adapter
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Unsupported, "no Bluetooth adapter"))?;

        let (found_tx, found_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(scan(adapter, ready_tx, stop_rx, found_tx));

        ready_rx
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "discovery task ended"))?
            .map_err(bluez_error)?;

        // Dropping the previous sender ends that scan.
        *self.discovery.lock() = Some(stop_tx);
        info!("Device discovery started");
        Ok(found_rx)
    }
}

impl Default for RfcommTransport {
    fn default() -> Self {
        Self::new(DEFAULT_RFCOMM_CHANNEL)
    }
}

impl fmt::Debug for RfcommTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RfcommTransport")
            .field("channel", &self.channel)
            .field("adapter", &self.adapter.as_ref().map(Adapter::name))
            .field("alias", &self.alias)
            .finish()
    }
}

/// Parse a `XX:XX:XX:XX:XX:XX` Bluetooth address.
pub fn parse_address(peer: &PeerIdentity) -> io::Result<Address> {
    peer.address().parse::<Address>().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid Bluetooth address: {}", peer.address()),
        )
    })
}

fn bluez_error(e: bluer::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

/// Forward discovered devices until stopped. BlueZ ends the scan once the
/// event stream is dropped.
async fn scan(
    adapter: Adapter,
    ready: oneshot::Sender<bluer::Result<()>>,
    mut stop: oneshot::Receiver<()>,
    found: mpsc::UnboundedSender<PeerIdentity>,
) {
    let events = match adapter.discover_devices().await {
        Ok(events) => {
            let _ = ready.send(Ok(()));
            events
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    futures::pin_mut!(events);
    loop {
        let event = tokio::select! {
            _ = &mut stop => break,
            event = events.next() => event,
        };

        match event {
            Some(AdapterEvent::DeviceAdded(address)) => {
                let mut peer = PeerIdentity::new(address.to_string());
                if let Ok(device) = adapter.device(address) {
                    if let Ok(Some(name)) = device.name().await {
                        peer = peer.with_name(name);
                    }
                }
                debug!("Discovered {}", peer);
                if found.send(peer).is_err() {
                    break;
                }
            }
            Some(_) => {}
            None => break,
        }
    }
    info!("Device discovery stopped");
}

impl Transport for RfcommTransport {
    type Stream = Stream;
    type Acceptor = RfcommAcceptor;

    async fn listen(&self) -> io::Result<RfcommAcceptor> {
        if let Err(e) = self.advertise().await {
            warn!("Unable to advertise adapter: {}", e);
        }

        let local_addr = SocketAddr::new(Address::any(), self.channel);
        let listener = Listener::bind(local_addr).await?;
        info!(
            "RFCOMM server listening on channel {} ({} {})",
            self.channel, SERVICE_NAME, SERVICE_UUID
        );
        Ok(RfcommAcceptor { listener })
    }

    async fn connect(&self, peer: &PeerIdentity) -> io::Result<Stream> {
        let address = parse_address(peer)?;
        debug!("Dialling {} on RFCOMM channel {}", peer, self.channel);
        Stream::connect(SocketAddr::new(address, self.channel)).await
    }

    fn pause_discovery(&self) {
        if let Some(stop) = self.discovery.lock().take() {
            info!("Pausing device discovery before dialling");
            let _ = stop.send(());
        }
    }
}

/// Listening RFCOMM socket.
pub struct RfcommAcceptor {
    listener: Listener,
}

impl Acceptor for RfcommAcceptor {
    type Stream = Stream;

    async fn accept(&mut self) -> io::Result<(Stream, PeerIdentity)> {
        let (stream, remote_addr) = self.listener.accept().await?;
        Ok((stream, PeerIdentity::new(remote_addr.addr.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        let peer = PeerIdentity::new("00:1A:7D:DA:71:13");
        let address = parse_address(&peer).unwrap();
        assert_eq!(address.to_string(), "00:1A:7D:DA:71:13");

        let bad = PeerIdentity::new("not-an-address");
        let err = parse_address(&bad).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_default_channel() {
        assert_eq!(RfcommTransport::default().channel(), DEFAULT_RFCOMM_CHANNEL);
        assert!(RfcommTransport::default().adapter().is_none());
    }

    #[test]
    fn test_pause_discovery_stops_scan() {
        let transport = RfcommTransport::new(DEFAULT_RFCOMM_CHANNEL);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        *transport.discovery.lock() = Some(stop_tx);

        transport.pause_discovery();
        assert_eq!(stop_rx.try_recv(), Ok(()));

        // Nothing left to pause.
        transport.pause_discovery();
        assert!(transport.discovery.lock().is_none());
    }

    #[tokio::test]
    async fn test_discovery_needs_adapter() {
        let transport = RfcommTransport::new(DEFAULT_RFCOMM_CHANNEL);
        let err = transport.start_discovery().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}
