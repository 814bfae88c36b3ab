//! WebSocket transport: connection upgrade, per-connection reader and
//! writer tasks, and the fan-out task feeding every connection's queue.

use crate::auth::{extract_token, Authenticator};
use crate::client_manager::ConnectionRegistry;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use crate::history::MatchHistory;
use crate::orchestrator::TournamentOrchestrator;
use crate::outbox::{Outbound, Outbox};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::protocol::{CLOSE_INVALID_TOKEN, CLOSE_NO_TOKEN, CLOSE_TRY_AGAIN_LATER};
use shared::ServerMessage;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

/// Main server owning the listener and everything connections talk to
pub struct Server {
    listener: TcpListener,
    registry: Arc<RwLock<ConnectionRegistry>>,
    dispatcher: Arc<Dispatcher>,
    authenticator: Arc<dyn Authenticator>,
    send_buffer: usize,
    fanout_rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Server {
    pub async fn bind(
        config: &Config,
        authenticator: Arc<dyn Authenticator>,
        history: Arc<dyn MatchHistory>,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let listener = TcpListener::bind(config.address()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (outbox, fanout_rx) = Outbox::channel();
        let registry = Arc::new(RwLock::new(ConnectionRegistry::new(config.max_connections)));
        let orchestrator = TournamentOrchestrator::new(
            outbox.clone(),
            history,
            config.match_settings(),
            config.max_tournaments,
        );
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry), orchestrator, outbox));

        Ok(Server {
            listener,
            registry,
            dispatcher,
            authenticator,
            send_buffer: config.send_buffer,
            fanout_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn orchestrator(&self) -> TournamentOrchestrator {
        self.dispatcher.orchestrator().clone()
    }

    /// Accepts connections until the listener fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let Server {
            listener,
            registry,
            dispatcher,
            authenticator,
            send_buffer,
            fanout_rx,
        } = self;

        spawn_fanout(Arc::clone(&registry), fanout_rx);
        info!("Server started successfully");

        loop {
            let (stream, addr) = listener.accept().await?;
            let dispatcher = Arc::clone(&dispatcher);
            let authenticator = Arc::clone(&authenticator);

            tokio::spawn(async move {
                if let Err(e) =
                    handle_connection(stream, addr, dispatcher, authenticator, send_buffer).await
                {
                    warn!("Connection from {} failed: {}", addr, e);
                }
            });
        }
    }
}

/// Spawns the task that resolves audiences and fills connection queues
fn spawn_fanout(
    registry: Arc<RwLock<ConnectionRegistry>>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            deliver(&registry, outbound).await;
        }
        error!("Outbox closed, fan-out stopped");
    })
}

async fn deliver(registry: &RwLock<ConnectionRegistry>, outbound: Outbound) {
    let recipients = registry.read().await.recipients(outbound.audience);

    for (id, sender) in recipients {
        match sender.try_send(outbound.message.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("Connection {} is not keeping up, dropping a message", id)
            }
            // Writer already gone; the reader will unregister it.
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

async fn close_with(
    mut ws: WebSocketStream<TcpStream>,
    code: u16,
    reason: &'static str,
) -> Result<(), ServerError> {
    ws.close(Some(CloseFrame {
        code: CloseCode::from(code),
        reason: reason.into(),
    }))
    .await?;
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    authenticator: Arc<dyn Authenticator>,
    send_buffer: usize,
) -> Result<(), ServerError> {
    let mut query = None;
    let ws = accept_hdr_async(
        stream,
        |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            query = request.uri().query().map(str::to_string);
            Ok(response)
        },
    )
    .await?;

    let identity = match extract_token(query.as_deref()) {
        None => {
            debug!("No token from {}", addr);
            return close_with(ws, CLOSE_NO_TOKEN, "No token provided").await;
        }
        Some(token) => match authenticator.authenticate(&token) {
            Some(identity) => identity,
            None => {
                debug!("Rejected token from {}", addr);
                return close_with(ws, CLOSE_INVALID_TOKEN, "Invalid token").await;
            }
        },
    };

    let (tx, mut rx) = mpsc::channel::<ServerMessage>(send_buffer);
    let Some(id) = dispatcher.connect(identity, tx).await else {
        warn!("Turning away {}: server is full", addr);
        return close_with(ws, CLOSE_TRY_AGAIN_LATER, "Server is full").await;
    };

    let (mut sink, mut source) = ws.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode {:?}: {}", message, e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => dispatcher.handle_text(id, &text).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Connection {} read error: {}", id, e);
                break;
            }
        }
    }

    dispatcher.disconnect(id).await;
    writer.abort();
    Ok(())
}
