use tokio::sync::mpsc::UnboundedSender;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

pub type ClientId = String;

/// A connected WebSocket client.
///
/// The namespace holds a clone of this handle and pushes frames through
/// `sender`; the transport's writer task forwards them to the socket.
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique identifier for the socket.
    pub id: ClientId,

    /// Channel to send WebSocket messages to the client.
    pub sender: UnboundedSender<WsMessage>,
}

impl Client {
    /// Create a new client with a sender channel and a fresh UUID.
    pub fn new(sender: UnboundedSender<WsMessage>) -> Self {
        Self {
            id: format!("client-{}", Uuid::new_v4()),
            sender,
        }
    }
}
