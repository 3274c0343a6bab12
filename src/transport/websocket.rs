//! WebSocket transport
//!
//! Accepts TCP connections, runs the upgrade while capturing the handshake,
//! and hands the socket to the subscription protocol. Each admitted socket
//! gets an unbounded channel; a writer task forwards whatever the namespace
//! pushes into it. A rejected socket is closed without an in-band error.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::protocol::Message as WsMessage;

use super::handshake;
use crate::client::Client;
use crate::gate::Handshake;
use crate::subscription::SubscriptionService;

/// Binds `addr` and serves until the listener fails to bind.
pub async fn start_websocket_server(
    addr: &str,
    service: Arc<SubscriptionService>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("WebSocket server listening on ws://{addr}");
    serve(listener, service).await;
    Ok(())
}

/// Accept loop over an already bound listener.
pub async fn serve(listener: TcpListener, service: Arc<SubscriptionService>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let service = service.clone();
                tokio::spawn(handle_connection(stream, peer, service));
            }
            Err(e) => warn!(error = %e, "failed to accept connection"),
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    service: Arc<SubscriptionService>,
) {
    let mut captured: Option<Handshake> = None;
    let upgrade = accept_hdr_async(stream, |request: &Request, response: Response| {
        captured = Some(handshake::from_request(request, peer.ip()));
        Ok::<Response, ErrorResponse>(response)
    });

    let ws_stream = match timeout(service.handshake_timeout(), upgrade).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            debug!(peer = %peer, error = %e, "WebSocket handshake error");
            return;
        }
        Err(_) => {
            debug!(peer = %peer, "WebSocket upgrade timed out");
            return;
        }
    };
    let Some(handshake) = captured else {
        return;
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let client = Client::new(tx);

    let connection = match service.connect(&handshake, client).await {
        Ok(connection) => connection,
        Err(_) => {
            // rejection details went to the activity recorder
            let _ = ws_sender.close().await;
            return;
        }
    };
    let client_id = connection.client.id.clone();

    let writer = {
        let client_id = client_id.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    debug!(client_id = %client_id, error = %e, "failed to send frame");
                    break;
                }
            }
            let _ = ws_sender.close().await;
        })
    };

    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(client_id = %client_id, error = %e, "read error");
                break;
            }
        }
    }

    service.disconnect(connection).await;
    writer.abort();
    debug!(client_id = %client_id, "connection closed");
}
