use crate::core::protocol::{decode_inbound, InboundMessage, OutboundMessage};
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Message(InboundMessage),
    Connected,
    Disconnected,
}

/// How a session ended
enum SessionEnd {
    /// Server closed the stream or it failed
    Disconnected,
    /// Nobody will send commands any more; stop reconnecting
    CommandsClosed,
}

pub struct InputServerConnection;

impl InputServerConnection {
    /// Keep a connection to the Input Server, reconnecting after `reconnect_delay`
    /// until the command channel closes.
    pub async fn run(
        host: String,
        port: u16,
        reconnect_delay: Duration,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
        mut command_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    ) {
        loop {
            match Self::session(&host, port, &server_tx, &mut command_rx).await {
                Ok(SessionEnd::CommandsClosed) => break,
                Ok(SessionEnd::Disconnected) => {}
                Err(e) => debug!("{:#}", e),
            }
            if server_tx.is_closed() {
                break;
            }

            tokio::time::sleep(reconnect_delay).await;

            // Anything queued while offline refers to stale state
            loop {
                match command_rx.try_recv() {
                    Ok(_) => continue,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        info!("Input server connection stopped");
                        return;
                    }
                }
            }
        }
        info!("Input server connection stopped");
    }

    async fn session(
        host: &str,
        port: u16,
        server_tx: &mpsc::UnboundedSender<ServerMessage>,
        command_rx: &mut mpsc::UnboundedReceiver<OutboundMessage>,
    ) -> Result<SessionEnd> {
        debug!("Connecting to input server at {}:{}...", host, port);

        let stream = TcpStream::connect(format!("{}:{}", host, port))
            .await
            .context("Failed to connect to input server")?;

        info!("Connected to input server at {}:{}", host, port);

        let (reader, mut writer) = tokio::io::split(stream);
        let mut lines = BufReader::new(reader).lines();

        let _ = server_tx.send(ServerMessage::Connected);

        let end = match Self::write_message(&mut writer, &OutboundMessage::GetState).await {
            Err(e) => {
                error!("Failed to request state: {:#}", e);
                SessionEnd::Disconnected
            }
            Ok(()) => loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            if let Some(msg) = decode_inbound(&line) {
                                let _ = server_tx.send(ServerMessage::Message(msg));
                            }
                        }
                        Ok(None) => {
                            info!("Connection closed by input server");
                            break SessionEnd::Disconnected;
                        }
                        Err(e) => {
                            error!("Error reading from input server: {}", e);
                            break SessionEnd::Disconnected;
                        }
                    },
                    cmd = command_rx.recv() => match cmd {
                        Some(msg) => {
                            if let Err(e) = Self::write_message(&mut writer, &msg).await {
                                error!("Failed to write message: {:#}", e);
                                break SessionEnd::Disconnected;
                            }
                        }
                        None => break SessionEnd::CommandsClosed,
                    },
                }
            },
        };

        let _ = server_tx.send(ServerMessage::Disconnected);
        Ok(end)
    }

    async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, msg: &OutboundMessage) -> Result<()> {
        let mut line = match msg.encode() {
            Ok(line) => line,
            Err(e) => {
                warn!("Could not encode {:?}: {}", msg, e);
                return Ok(());
            }
        };
        debug!("Sending: {}", line);
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}
