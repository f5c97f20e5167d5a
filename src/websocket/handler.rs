use std::sync::Arc;

use futures::stream::SplitSink;
use futures::StreamExt;
use log::{debug, error, info, warn};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

use crate::api::params::{replay, ReplayParams};
use crate::data::{Hub, PriceReading, Subscriber, TtlStore};
use crate::errors::{DeliveryError, ErrorPayload, InvalidParamError};
use crate::websocket::subscriber::WsSubscriber;

pub const WS_PATH: &str = "/ws";

type Session = WsSubscriber<SplitSink<WebSocketStream<TcpStream>, Message>>;

pub struct WebSocketHandler {
    store: Arc<TtlStore<PriceReading>>,
    hub: Arc<Hub>,
    peer_addr: String,
}

impl WebSocketHandler {
    pub fn new(store: Arc<TtlStore<PriceReading>>, hub: Arc<Hub>, peer_addr: String) -> Self {
        Self {
            store,
            hub,
            peer_addr,
        }
    }

    pub async fn handle_connection(self, stream: TcpStream) {
        // Capture the query string during the handshake
        let mut raw_query: Option<String> = None;

        let ws_stream = match accept_hdr_async(stream, |req: &Request, response: Response| {
            let path = req.uri().path();
            if path != WS_PATH {
                warn!("Unknown WebSocket path '{}' from {}", path, self.peer_addr);
                return Err(error_response(StatusCode::NOT_FOUND, "Invalid WebSocket path"));
            }
            raw_query = req.uri().query().map(str::to_string);
            Ok(response)
        })
        .await
        {
            Ok(ws) => ws,
            Err(e) => {
                error!("WebSocket handshake failed for {}: {:?}", self.peer_addr, e);
                return;
            }
        };

        let (write, mut read) = ws_stream.split();
        let session = Arc::new(WsSubscriber::new(write));

        let params = match ReplayParams::from_query(raw_query.as_deref()) {
            Ok(params) => params,
            Err(e) => {
                warn!("Rejected session from {}: {}", self.peer_addr, e);
                self.send_error(&session, &e).await;
                session.close().await;
                return;
            }
        };

        if let Some(since) = params.replay_since() {
            if let Err(e) = self.send_initial_data(&session, since).await {
                error!("Replay to {} failed: {}", self.peer_addr, e);
                session.close().await;
                return;
            }
        }

        let id = session.id();
        self.hub.register(session.clone()).await;
        info!("Session {} connected from {}", id, self.peer_addr);

        loop {
            let msg_result = tokio::select! {
                _ = session.terminated() => {
                    info!("Session {} from {} terminated by the server", id, self.peer_addr);
                    break;
                }
                next = read.next() => match next {
                    Some(msg_result) => msg_result,
                    None => break,
                },
            };

            match msg_result {
                Ok(Message::Close(frame)) => {
                    debug!("Received close frame from {}: {:?}", self.peer_addr, frame);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Error reading from {}: {}", self.peer_addr, e);
                    break;
                }
            }
        }

        self.hub.unregister(&id).await;
        session.close().await;
        info!("Session {} from {} closed", id, self.peer_addr);
    }

    async fn send_initial_data(&self, session: &Session, since: i64) -> Result<(), DeliveryError> {
        let readings = replay(&self.store, Some(since));
        debug!("Replaying {} readings to {}", readings.len(), self.peer_addr);

        for reading in readings {
            match serde_json::to_string(&reading) {
                Ok(json) => session.send_text(json).await?,
                Err(e) => error!("Failed to serialize reading for replay: {}", e),
            }
        }
        Ok(())
    }

    async fn send_error(&self, session: &Session, err: &InvalidParamError) {
        let payload = match ErrorPayload::from(err).to_json() {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize error payload: {}", e);
                return;
            }
        };
        if let Err(e) = session.send_text(payload).await {
            warn!("Failed to send error to {}: {}", self.peer_addr, e);
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message.to_string()));
    *response.status_mut() = status;
    response
}
