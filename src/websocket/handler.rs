use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use log::{error, info, warn};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use uuid::Uuid;

use crate::auth::AccessPolicy;
use crate::websocket::SubscriberRegistry;

pub struct SubscriberHandler {
    policy: Arc<AccessPolicy>,
    subscribers: SubscriberRegistry,
    peer_addr: String,
}

impl SubscriberHandler {
    pub fn new(policy: Arc<AccessPolicy>, subscribers: SubscriberRegistry, peer_addr: String) -> Self {
        Self {
            policy,
            subscribers,
            peer_addr,
        }
    }

    pub async fn handle_connection(self, stream: TcpStream, rx: broadcast::Receiver<String>) {
        let mut subscriber_id: Option<Uuid> = None;

        let ws_stream = match accept_hdr_async(stream, |req: &Request, response: Response| {
            self.authorize_handshake(req, response, &mut subscriber_id)
        })
        .await
        {
            Ok(ws) => ws,
            Err(e) => {
                warn!("WebSocket handshake failed for {}: {}", self.peer_addr, e);
                if let Some(id) = subscriber_id {
                    self.subscribers.release(&id);
                }
                return;
            }
        };

        let id = match subscriber_id {
            Some(id) => id,
            None => {
                error!("No subscriber slot recorded after successful handshake from {}", self.peer_addr);
                return;
            }
        };

        self.run_connection(ws_stream, rx, id).await;
        self.subscribers.release(&id);
    }

    fn authorize_handshake(
        &self,
        req: &Request,
        response: Response,
        subscriber_id: &mut Option<Uuid>,
    ) -> Result<Response, ErrorResponse> {
        if let Err(rejection) = self.policy.authorize_upgrade(req) {
            warn!("Rejected upgrade from {}: {}", self.peer_addr, rejection.message());
            return Err(error_response(rejection.status(), &rejection.message()));
        }

        match self.subscribers.try_acquire(&self.peer_addr) {
            Some(id) => {
                info!("Subscriber {} authorized from {}", id, self.peer_addr);
                *subscriber_id = Some(id);
                Ok(response)
            }
            None => {
                warn!(
                    "Rejected upgrade from {}: subscriber limit {} reached",
                    self.peer_addr,
                    self.subscribers.max_subscribers()
                );
                Err(error_response(StatusCode::SERVICE_UNAVAILABLE, "Maximum connections reached"))
            }
        }
    }

    async fn run_connection(&self, ws_stream: WebSocketStream<TcpStream>, rx: broadcast::Receiver<String>, id: Uuid) {
        let (write, read) = ws_stream.split();
        let (close_tx, close_rx) = mpsc::channel::<()>(1);

        info!("WebSocket client connected: {} from {}", id, self.peer_addr);

        let write_task = spawn_write_task(write, rx, close_rx, id);
        let read_task = spawn_read_task(read, close_tx, id);

        tokio::select! {
            _ = write_task => {
                info!("Write task completed for subscriber {}", id);
            }
            _ = read_task => {
                info!("Read task completed for subscriber {}", id);
            }
        }

        info!("WebSocket client disconnected: {} from {}", id, self.peer_addr);
    }
}

fn error_response(status: StatusCode, message: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message.to_string()));
    *response.status_mut() = status;
    response
}

type WsSink = futures::stream::SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = futures::stream::SplitStream<WebSocketStream<TcpStream>>;

fn spawn_write_task(
    mut write: WsSink,
    mut rx: broadcast::Receiver<String>,
    mut close_rx: mpsc::Receiver<()>,
    id: Uuid,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                message_result = rx.recv() => {
                    match message_result {
                        Ok(message) => {
                            if let Err(e) = write.send(Message::Text(message)).await {
                                warn!("Error sending to subscriber {}: {}", id, e);
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Subscriber {} lagged, skipped {} messages", id, skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Broadcast channel closed, ending subscriber {}", id);
                            break;
                        }
                    }
                }
                _ = close_rx.recv() => {
                    break;
                }
            }
        }
        let _ = write.close().await;
    })
}

// Subscribers only listen; inbound frames other than close are ignored.
fn spawn_read_task(mut read: WsSource, close_tx: mpsc::Sender<()>, id: Uuid) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Close(frame)) => {
                    info!("Received close frame from subscriber {}: {:?}", id, frame);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Error reading from subscriber {}: {}", id, e);
                    break;
                }
            }
        }
        let _ = close_tx.send(()).await;
    })
}
