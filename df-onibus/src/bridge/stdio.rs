//! Transport du pont sur un couple de flux octets (stdin/stdout en mode `serve`)
//!
//! Un message JSON par ligne dans chaque sens. Une ligne illisible est
//! journalisée puis ignorée ; la fin du flux entrant ferme le canal d'événements.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{wire, HostCommand, SurfaceEvent};

/// Canaux typés branchés sur les flux
pub struct BridgeChannels {
    pub commands: mpsc::UnboundedSender<HostCommand>,
    pub events: mpsc::UnboundedReceiver<SurfaceEvent>,
    pub reader: JoinHandle<std::io::Result<()>>,
    pub writer: JoinHandle<std::io::Result<()>>,
}

pub fn spawn<R, W>(reader: R, writer: W) -> BridgeChannels
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    BridgeChannels {
        commands: command_tx,
        events: event_rx,
        reader: tokio::spawn(read_events(reader, event_tx)),
        writer: tokio::spawn(write_commands(writer, command_rx)),
    }
}

async fn read_events<R>(reader: R, events: mpsc::UnboundedSender<SurfaceEvent>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match wire::decode::<SurfaceEvent>(&line) {
            Ok(event) => {
                if events.send(event).is_err() {
                    debug!("Event receiver dropped, stopping reader");
                    break;
                }
            }
            Err(e) => warn!(line = line_no, error = %e, "Skipping unreadable surface message"),
        }
    }
    debug!(lines = line_no, "Surface input closed");
    Ok(())
}

async fn write_commands<W>(
    mut writer: W,
    mut commands: mpsc::UnboundedReceiver<HostCommand>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = commands.recv().await {
        let line = match wire::encode(&command) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Could not encode command");
                continue;
            }
        };
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}
