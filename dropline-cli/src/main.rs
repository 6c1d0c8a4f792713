use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dropline::client::{
    Client, ClientConfig, ClientEvent, Direction, OutgoingFile, RtcTransportFactory,
};
use dropline::server::{serve, ServerConfig};
use dropline::PeerId;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:3000";
/// How long a finished sender waits for the receiver to hang up.
const DRAIN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "dropline")]
#[command(about = "Room based peer-to-peer file transfer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the signaling relay.
    Serve {
        #[arg(long, env = "DROPLINE_BIND")]
        bind: Option<SocketAddr>,
    },
    /// Ask a relay for a fresh room code.
    CreateRoom {
        #[arg(long, env = "DROPLINE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
        endpoint: String,
    },
    /// Send a file to the first peer in a room, or to a specific one.
    Send {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long, env = "DROPLINE_ROOM")]
        room: String,

        #[arg(long, value_name = "PEER_ID")]
        to: Option<PeerId>,

        #[arg(long, env = "DROPLINE_NAME")]
        name: Option<String>,

        #[arg(long, env = "DROPLINE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
        endpoint: String,
    },
    /// Wait in a room and save incoming files.
    Receive {
        #[arg(long, env = "DROPLINE_ROOM")]
        room: String,

        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        #[arg(long, env = "DROPLINE_NAME")]
        name: Option<String>,

        #[arg(long, env = "DROPLINE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
        endpoint: String,

        /// Keep receiving after the first file.
        #[arg(long)]
        stay_open: bool,
    },
}

#[derive(Deserialize)]
struct CreatedRoom {
    code: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Serve { bind } => {
            let mut config = ServerConfig::from_env().context("Invalid relay configuration")?;
            if let Some(bind) = bind {
                config.bind = bind;
            }
            println!("{}", "🚀 Starting dropline relay...".green().bold());
            serve(config).await
        }
        Commands::CreateRoom { endpoint } => create_room(&endpoint).await,
        Commands::Send {
            file,
            room,
            to,
            name,
            endpoint,
        } => send(&endpoint, &room, name, to, &file).await,
        Commands::Receive {
            room,
            out,
            name,
            endpoint,
            stay_open,
        } => receive(&endpoint, &room, name, &out, stay_open).await,
    }
}

async fn create_room(endpoint: &str) -> Result<()> {
    let url = format!("{}/rooms", endpoint.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&url)
        .send()
        .await
        .with_context(|| format!("Failed to reach {url}"))?
        .error_for_status()
        .context("Relay refused to create a room")?;
    let created: CreatedRoom = response.json().await.context("Unexpected relay response")?;

    println!("{} {}", "✨ Room created:".green().bold(), created.code.bold());
    Ok(())
}

async fn join(endpoint: &str, room: &str, name: Option<String>) -> Result<(Client, PeerId)> {
    let mut client = Client::connect(
        endpoint,
        ClientConfig::default(),
        Arc::new(RtcTransportFactory),
    )
    .await
    .with_context(|| format!("Failed to connect to relay {endpoint}"))?;

    let local = loop {
        match client.next_event().await {
            Some(ClientEvent::Welcome { peer_id }) => break peer_id,
            Some(_) => continue,
            None => bail!("Relay closed before welcoming us"),
        }
    };

    client.join(room, name).await?;
    loop {
        match client.next_event().await {
            Some(ClientEvent::Joined { room }) => {
                println!("{} {} as {}", "📡 Joined room".cyan(), room, local);
                return Ok((client, local));
            }
            Some(ClientEvent::RelayError { message }) => bail!("Relay rejected join: {message}"),
            Some(_) => continue,
            None => bail!("Relay closed before the join completed"),
        }
    }
}

async fn wait_for_peer(client: &mut Client, local: PeerId) -> Result<PeerId> {
    println!("{}", "⏳ Waiting for a peer to join...".cyan());
    loop {
        match client.next_event().await {
            Some(ClientEvent::Presence { members }) => {
                if let Some(member) = members.into_iter().find(|m| m.peer_id != local) {
                    return Ok(member.peer_id);
                }
            }
            Some(ClientEvent::PeerJoined { peer_id, .. }) => return Ok(peer_id),
            Some(_) => continue,
            None => bail!("Relay closed while waiting for a peer"),
        }
    }
}

async fn send(
    endpoint: &str,
    room: &str,
    name: Option<String>,
    to: Option<PeerId>,
    path: &Path,
) -> Result<()> {
    let file = OutgoingFile::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let total = file.metadata().file_size;

    let (mut client, local) = join(endpoint, room, name).await?;
    let target = match to {
        Some(peer_id) => peer_id,
        None => wait_for_peer(&mut client, local).await?,
    };

    println!(
        "{} {} ({} bytes) to {}",
        "📦 Sending".cyan(),
        file.metadata().file_name,
        total,
        target
    );
    let transfer = client.send_file(target, file).await?;

    loop {
        match client.next_event().await {
            Some(ClientEvent::PeerConnected { peer_id }) if peer_id == target => {
                println!("{}", "🔗 Peer connected".green());
            }
            Some(ClientEvent::TransferProgress {
                transfer_id, bytes, ..
            }) if transfer_id == transfer => {
                println!("   {} / {} bytes", bytes, total);
            }
            Some(ClientEvent::TransferCompleted { transfer_id, .. }) if transfer_id == transfer => {
                println!("{}", "✨ Transfer complete".green().bold());
                break;
            }
            Some(ClientEvent::TransferAborted {
                transfer_id,
                reason,
                ..
            }) if transfer_id == transfer => {
                client.shutdown().await;
                bail!("Transfer aborted: {reason}");
            }
            Some(_) => continue,
            None => bail!("Client stopped before the transfer finished"),
        }
    }

    // Let the channel drain; the receiver hangs up once it has the file.
    let _ = timeout(DRAIN_GRACE, async {
        loop {
            match client.next_event().await {
                Some(ClientEvent::PeerDisconnected { peer_id, .. })
                | Some(ClientEvent::PeerLeft { peer_id })
                    if peer_id == target =>
                {
                    break
                }
                Some(_) => continue,
                None => break,
            }
        }
    })
    .await;

    client.shutdown().await;
    Ok(())
}

async fn receive(
    endpoint: &str,
    room: &str,
    name: Option<String>,
    out: &Path,
    stay_open: bool,
) -> Result<()> {
    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("Failed to create {}", out.display()))?;

    let (mut client, _) = join(endpoint, room, name).await?;
    println!("{}", "⏳ Waiting for files...".cyan());

    loop {
        match client.next_event().await {
            Some(ClientEvent::PeerJoined { peer_id, name }) => {
                let name = name.unwrap_or_else(|| peer_id.to_string());
                println!("   {} {}", "👋 Peer joined:".cyan(), name);
            }
            Some(ClientEvent::TransferStarted {
                direction: Direction::Incoming,
                metadata,
                ..
            }) => {
                println!(
                    "{} {} ({} bytes)",
                    "📥 Receiving".cyan(),
                    metadata.file_name,
                    metadata.file_size
                );
            }
            Some(ClientEvent::TransferAborted {
                direction: Direction::Incoming,
                reason,
                ..
            }) => {
                println!("{} {}", "⚠ Transfer aborted:".yellow(), reason);
            }
            Some(ClientEvent::FileReceived { file, .. }) => {
                let target = unique_path(out, &file.metadata.file_name);
                tokio::fs::write(&target, &file.data)
                    .await
                    .with_context(|| format!("Failed to write {}", target.display()))?;
                println!("{} {}", "✨ Saved".green().bold(), target.display());
                if !stay_open {
                    break;
                }
            }
            Some(_) => continue,
            None => bail!("Relay connection closed"),
        }
    }

    client.shutdown().await;
    Ok(())
}

/// Strips directories from a sender-supplied name and avoids clobbering files.
fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("file");

    let candidate = dir.join(base);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
        _ => (base, String::new()),
    };
    (1..)
        .map(|n| dir.join(format!("{stem} ({n}){ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}
