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

//! MeshMessenger link: chat with one peer over Bluetooth RFCOMM.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meshlink::config::Config;
use meshlink::delivery::{frame, DeliveryTracker, DeliveryUpdate, ACK_TOKEN};
use meshlink::transport::{MemoryNetwork, RfcommTransport, Transport};
use meshlink::{LinkEvent, LinkManager, PeerIdentity};

#[derive(Debug, Parser)]
#[command(name = "meshlink", version, about = "Chat with one peer over a Bluetooth serial link")]
struct Cli {
    /// Configuration file. Defaults to the user configuration directory.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Wait for a peer to connect (default).
    Listen,

    /// Connect to a peer, listening as a fallback.
    Connect {
        /// Bluetooth address of the peer (example: 00:1A:7D:DA:71:13).
        address: String,

        /// Name to show for the peer.
        #[arg(long)]
        name: Option<String>,
    },

    /// List nearby devices.
    Scan {
        /// How long to scan, in seconds.
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },

    /// Chat with an echoing peer inside this process, no radio needed.
    Loopback,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("meshlink=info".parse()?))
        .init();

    info!("Starting MeshMessenger link v{}...", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!("Configuration loaded");

    let settings = config.link.settings();
    let ack_enabled = config.chat.ack_enabled;

    match cli.mode.unwrap_or(Mode::Listen) {
        Mode::Listen => {
            let manager = LinkManager::new(open_rfcomm(&config).await?, settings);
            manager.start_listening()?;
            chat(manager, ack_enabled).await?;
        }
        Mode::Connect { address, name } => {
            let mut peer = PeerIdentity::new(address);
            if let Some(name) = name {
                peer = peer.with_name(name);
            }
            let manager = LinkManager::new(open_rfcomm(&config).await?, settings);
            manager.start_listening()?;
            manager.connect_to(peer)?;
            chat(manager, ack_enabled).await?;
        }
        Mode::Scan { seconds } => scan(&config, Duration::from_secs(seconds)).await?,
        Mode::Loopback => loopback(&config).await?,
    }

    info!("MeshMessenger link stopped");
    Ok(())
}

async fn open_rfcomm(config: &Config) -> Result<RfcommTransport> {
    RfcommTransport::open(config.link.rfcomm_channel, config.link.device_name.clone())
        .await
        .context("Failed to open Bluetooth adapter")
}

/// Print devices found nearby for `duration`.
async fn scan(config: &Config, duration: Duration) -> Result<()> {
    let transport = open_rfcomm(config).await?;
    let mut found = transport.start_discovery().await?;
    println!("-- Scanning for {}s", duration.as_secs());

    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            peer = found.recv() => match peer {
                Some(peer) => println!("{}", peer),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    transport.pause_discovery();
    Ok(())
}

/// Relay stdin lines to the peer and print what comes back.
async fn chat<T: Transport>(manager: LinkManager<T>, ack_enabled: bool) -> Result<()> {
    let mut events = manager
        .take_event_receiver()
        .context("event receiver already taken")?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tracker = DeliveryTracker::new();

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    let text = line.trim();
                    if !text.is_empty() {
                        send_line(&manager, &mut tracker, text, ack_enabled);
                    }
                }
                None => break,
            },
            Some(event) = events.recv() => {
                handle_event(&manager, &mut tracker, event, ack_enabled);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    manager.shutdown();
    Ok(())
}

fn send_line<T: Transport>(
    manager: &LinkManager<T>,
    tracker: &mut DeliveryTracker,
    text: &str,
    ack_enabled: bool,
) {
    let id = ack_enabled.then(|| tracker.track(text));
    if let Err(e) = manager.send(frame(text.as_bytes())) {
        if let Some(id) = id {
            tracker.reject(id);
        }
        println!("!! Message not sent: {}", e);
    }
}

fn handle_event<T: Transport>(
    manager: &LinkManager<T>,
    tracker: &mut DeliveryTracker,
    event: LinkEvent,
    ack_enabled: bool,
) {
    match &event {
        LinkEvent::StateChanged(state) => println!("-- {}", state),
        LinkEvent::TransientNotice(text) => println!("!! {}", text),
        LinkEvent::DataReceived { data, peer } if !ack_enabled => print_message(peer, data),
        _ => {}
    }

    if !ack_enabled {
        return;
    }
    for update in tracker.on_event(&event) {
        match update {
            DeliveryUpdate::Payload { data, peer } => {
                print_message(&peer, &data);
                if let Err(e) = manager.send(ACK_TOKEN) {
                    debug!("Unable to acknowledge message: {}", e);
                }
            }
            DeliveryUpdate::Status(id, status) => println!("   #{} {}", id, status.as_str()),
        }
    }
}

fn print_message(peer: &PeerIdentity, data: &[u8]) {
    println!(
        "[{}] {}: {}",
        Local::now().format("%H:%M"),
        peer.label(),
        String::from_utf8_lossy(data).trim()
    );
}

/// Chat with an in-process peer that echoes every message.
async fn loopback(config: &Config) -> Result<()> {
    let network = MemoryNetwork::new();
    let settings = config.link.settings();
    let ack_enabled = config.chat.ack_enabled;

    let echo_peer = PeerIdentity::new("loop-echo").with_name("Echo");
    let local_peer = PeerIdentity::new("loop-local").with_name(config.link.device_name.clone());

    let remote = Arc::new(LinkManager::new(network.transport(echo_peer.clone()), settings.clone()));
    let remote_events = remote
        .take_event_receiver()
        .context("event receiver already taken")?;
    remote.start_listening()?;
    tokio::spawn(echo(Arc::downgrade(&remote), remote_events, ack_enabled));

    let local = LinkManager::new(network.transport(local_peer), settings);
    local.connect_to(echo_peer)?;
    chat(local, ack_enabled).await?;

    // Last strong reference; dropping it ends the echo task too.
    remote.shutdown();
    drop(remote);
    Ok(())
}

/// Reply to every message until the manager is gone.
async fn echo<T: Transport>(
    manager: Weak<LinkManager<T>>,
    mut events: mpsc::UnboundedReceiver<LinkEvent>,
    ack_enabled: bool,
) {
    let mut tracker = DeliveryTracker::new();
    while let Some(event) = events.recv().await {
        let Some(manager) = manager.upgrade() else {
            break;
        };
        if manager.is_shut_down() {
            break;
        }
        for update in tracker.on_event(&event) {
            let DeliveryUpdate::Payload { data, .. } = update else {
                continue;
            };
            if ack_enabled {
                if let Err(e) = manager.send(ACK_TOKEN) {
                    debug!("Echo peer unable to acknowledge: {}", e);
                }
            }
            let mut reply = b"echo: ".to_vec();
            reply.extend_from_slice(&data);
            if let Err(e) = manager.send(frame(&reply)) {
                debug!("Echo peer unable to reply: {}", e);
            }
        }
    }
    debug!("Echo peer stopped");
}
