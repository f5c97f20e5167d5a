use std::sync::Arc;

use log::{error, info};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::data::{Hub, PriceReading, TtlStore};
use crate::websocket::handler::WebSocketHandler;

pub async fn run_listener(
    listener: TcpListener,
    store: Arc<TtlStore<PriceReading>>,
    hub: Arc<Hub>,
    cancel: CancellationToken,
) {
    loop {
        let (stream, addr) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept WebSocket connection: {}", e);
                    continue;
                }
            },
        };

        let handler = WebSocketHandler::new(store.clone(), hub.clone(), addr.to_string());
        tokio::spawn(handler.handle_connection(stream));
    }

    info!("WebSocket listener stopped");
}
