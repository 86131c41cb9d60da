use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use log::{error, info, warn};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use uuid::Uuid;

use crate::live::{ClientRegistry, HelloMessage, LivePricesMessage, PriceCache};

pub struct WebSocketHandler {
    registry: Arc<ClientRegistry>,
    cache: Arc<PriceCache>,
    peer_addr: String,
}

impl WebSocketHandler {
    pub fn new(registry: Arc<ClientRegistry>, cache: Arc<PriceCache>, peer_addr: String) -> Self {
        Self {
            registry,
            cache,
            peer_addr,
        }
    }

    pub async fn handle_connection(self, stream: TcpStream) {
        let ws_stream = match accept_hdr_async(stream, |req: &Request, response: Response| {
            self.route_request(req, response)
        })
        .await
        {
            Ok(ws) => ws,
            Err(e) => {
                error!("WebSocket handshake failed for {}: {:?}", self.peer_addr, e);
                return;
            }
        };

        self.stream_prices(ws_stream).await;
    }

    fn route_request(&self, req: &Request, response: Response) -> Result<Response, ErrorResponse> {
        let path = req.uri().path();
        if path == "/ws" {
            Ok(response)
        } else {
            warn!("Unknown WebSocket path '{}' from {}", path, self.peer_addr);
            Err(Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Some("Invalid WebSocket path".to_string()))
                .unwrap())
        }
    }

    /// Creates the client's outbound queue, loads it with the greeting
    /// and the current snapshot, then registers it. Queueing before
    /// registration keeps the catch-up frames ahead of any broadcast,
    /// and the client never waits for the next cycle to see prices.
    fn attach_client(&self) -> Result<(Uuid, mpsc::UnboundedReceiver<String>), String> {
        let (tx, rx) = mpsc::unbounded_channel();

        if let Ok(json) = HelloMessage::new().to_json() {
            let _ = tx.send(json);
        }
        match LivePricesMessage::from_snapshot(&self.cache.snapshot()).to_json() {
            Ok(json) => {
                let _ = tx.send(json);
            }
            Err(e) => {
                error!("Failed to serialize snapshot for {}: {}", self.peer_addr, e);
            }
        }

        let client_id = self.registry.register(tx)?;
        Ok((client_id, rx))
    }

    async fn stream_prices(&self, ws_stream: WebSocketStream<TcpStream>) {
        let (write, read) = ws_stream.split();

        let (client_id, rx) = match self.attach_client() {
            Ok(attached) => attached,
            Err(e) => {
                error!("Failed to register client from {}: {}", self.peer_addr, e);
                return;
            }
        };

        info!(
            "WebSocket connection established - Client: {} from {}",
            client_id, self.peer_addr
        );

        // Create channels for coordination
        let (close_tx, close_rx) = mpsc::channel::<()>(1);

        // Write task - drains the outbound queue onto the socket
        let write_task = self.spawn_write_task(write, rx, close_rx);

        // Read task - watches for close frames and client chatter
        let read_task = self.spawn_read_task(read, close_tx, client_id);

        // Wait for either side to finish
        tokio::select! {
            _ = write_task => {
                info!("Write task completed for client {}", client_id);
            }
            _ = read_task => {
                info!("Read task completed for client {}", client_id);
            }
        }

        self.registry.unregister(&client_id);
        info!(
            "WebSocket connection closed - Client: {} from {}",
            client_id, self.peer_addr
        );
    }

    fn spawn_write_task(
        &self,
        mut write: futures::stream::SplitSink<WebSocketStream<TcpStream>, Message>,
        mut rx: mpsc::UnboundedReceiver<String>,
        mut close_rx: mpsc::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    message = rx.recv() => {
                        match message {
                            Some(text) => {
                                if let Err(e) = write.send(Message::Text(text)).await {
                                    error!("Error sending message: {:?}", e);
                                    break;
                                }
                            }
                            None => {
                                // Registry dropped our queue; nothing more will arrive.
                                break;
                            }
                        }
                    }
                    _ = close_rx.recv() => {
                        info!("Received close signal from read task");
                        break;
                    }
                }
            }
        })
    }

    fn spawn_read_task(
        &self,
        mut read: futures::stream::SplitStream<WebSocketStream<TcpStream>>,
        close_tx: mpsc::Sender<()>,
        client_id: Uuid,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(msg) => match msg {
                        Message::Close(close_frame) => {
                            info!(
                                "Received close frame from client {}: {:?}",
                                client_id, close_frame
                            );
                            break;
                        }
                        Message::Ping(_) => {
                            info!("Received ping from client {}", client_id);
                        }
                        Message::Pong(_) => {}
                        Message::Text(text) => {
                            info!("Received text message from client {}: {}", client_id, text);
                        }
                        _ => {}
                    },
                    Err(e) => {
                        error!("Error reading message from client {}: {:?}", client_id, e);
                        break;
                    }
                }
            }

            let _ = close_tx.send(()).await;
        })
    }
}
