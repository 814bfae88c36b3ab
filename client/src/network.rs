//! WebSocket connection running on its own thread, so the render loop
//! never blocks on the network.

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::protocol::{CLOSE_INVALID_TOKEN, CLOSE_NO_TOKEN, CLOSE_TRY_AGAIN_LATER};
use shared::{ClientMessage, ServerMessage};
use std::sync::mpsc as std_mpsc;
use std::thread;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    Connected,
    Message(ServerMessage),
    Closed { code: Option<u16>, reason: String },
}

pub struct NetworkClient {
    outgoing: mpsc::UnboundedSender<ClientMessage>,
    events: std_mpsc::Receiver<NetworkEvent>,
    connected: bool,
}

impl NetworkClient {
    /// Starts connecting to `url` in the background. Progress arrives
    /// through [`NetworkClient::poll`].
    pub fn connect(url: &str) -> std::io::Result<Self> {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = std_mpsc::channel();
        let url = url.to_string();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        thread::Builder::new()
            .name("network".to_string())
            .spawn(move || {
                runtime.block_on(run_connection(url, outgoing_rx, event_tx));
            })?;

        Ok(NetworkClient {
            outgoing: outgoing_tx,
            events: event_rx,
            connected: false,
        })
    }

    /// Queues a message; false once the connection is gone.
    pub fn send(&self, message: ClientMessage) -> bool {
        self.outgoing.send(message).is_ok()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Drains everything that arrived since the last call
    pub fn poll(&mut self) -> Vec<NetworkEvent> {
        let events: Vec<NetworkEvent> = self.events.try_iter().collect();
        for event in &events {
            match event {
                NetworkEvent::Connected => self.connected = true,
                NetworkEvent::Closed { .. } => self.connected = false,
                NetworkEvent::Message(_) => {}
            }
        }
        events
    }
}

async fn run_connection(
    url: String,
    mut outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    events: std_mpsc::Sender<NetworkEvent>,
) {
    info!("Connecting to {}", redact(&url));

    let ws = match connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            error!("Failed to connect: {}", e);
            let _ = events.send(NetworkEvent::Closed {
                code: None,
                reason: e.to_string(),
            });
            return;
        }
    };

    info!("Connected");
    let _ = events.send(NetworkEvent::Connected);
    let (mut sink, mut source) = ws.split();

    if let Ok(text) = ClientMessage::ListTournaments.to_json() {
        let _ = sink.send(Message::Text(text)).await;
    }

    let (code, reason) = loop {
        tokio::select! {
            message = outgoing.recv() => {
                let Some(message) = message else {
                    let _ = sink.close().await;
                    break (None, "client shut down".to_string());
                };
                match message.to_json() {
                    Ok(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            break (None, e.to_string());
                        }
                    }
                    Err(e) => error!("Failed to encode {:?}: {}", message, e),
                }
            }

            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => match ServerMessage::from_json(&text) {
                    Ok(message) => {
                        if events.send(NetworkEvent::Message(message)).is_err() {
                            break (None, "receiver dropped".to_string());
                        }
                    }
                    Err(e) => debug!("Ignoring malformed message: {}", e),
                },
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                        None => (None, String::new()),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break (None, e.to_string()),
                None => break (None, "connection lost".to_string()),
            },
        }
    };

    match code {
        Some(CLOSE_NO_TOKEN) => error!("Server requires a token (--token)"),
        Some(CLOSE_INVALID_TOKEN) => error!("Server rejected the token"),
        Some(CLOSE_TRY_AGAIN_LATER) => warn!("Server is full, try again later"),
        _ => info!("Disconnected: {}", reason),
    }

    let _ = events.send(NetworkEvent::Closed { code, reason });
}

/// Hides the token in log output
fn redact(url: &str) -> String {
    match url.split_once("token=") {
        Some((head, _)) => format!("{}token=***", head),
        None => url.to_string(),
    }
}
