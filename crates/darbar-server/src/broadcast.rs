use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};

use darbar_core::net::messages::ServerMessage;
use darbar_core::net::protocol::encode_server_message;
use darbar_core::room::UserId;

/// Per-player sender for outbound WebSocket binary messages.
/// Bounded to prevent memory exhaustion from slow clients; `Bytes` makes
/// cloning across players cheap.
pub type PlayerSender = mpsc::Sender<Bytes>;

/// Global lobby feed every connection subscribes to.
pub type LobbySender = broadcast::Sender<Bytes>;

/// Encode a server message for the wire, logging (not propagating) codec
/// failures: a message that cannot encode is a bug, not a caller error.
pub fn encode(msg: &ServerMessage) -> Option<Bytes> {
    match encode_server_message(msg) {
        Ok(data) => Some(Bytes::from(data)),
        Err(e) => {
            tracing::error!(error = %e, msg_type = ?msg.message_type(), "Failed to encode message");
            None
        },
    }
}

/// Deliver to a single connection. This is the only legal path for
/// role-assignment messages: recipients other than the role holder must
/// never see them, so they bypass every room-wide scope.
pub fn unicast(room_code: &str, user_id: &str, sender: &PlayerSender, msg: &ServerMessage) {
    if let Some(bytes) = encode(msg)
        && let Err(e) = sender.try_send(bytes)
    {
        tracing::debug!(
            user = user_id, room = room_code, error = %e,
            "Dropping unicast to slow or disconnected client"
        );
    }
}

/// Fan a message out to every connection currently in the room.
pub fn to_room(room_code: &str, connections: &HashMap<UserId, PlayerSender>, msg: &ServerMessage) {
    let Some(bytes) = encode(msg) else { return };
    for (user_id, sender) in connections {
        if let Err(e) = sender.try_send(bytes.clone()) {
            tracing::debug!(
                user = %user_id, room = room_code, error = %e,
                "Skipping room broadcast to slow client"
            );
        }
    }
}

/// Publish to the global lobby feed. Every connection subscribes to this
/// channel, which is how room-list views stay live.
pub fn to_lobby(lobby: &LobbySender, msg: &ServerMessage) {
    if let Some(bytes) = encode(msg) {
        // Send only fails when nobody is subscribed, which is fine.
        let _ = lobby.send(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use darbar_core::net::messages::ErrorMsg;
    use darbar_core::net::protocol::decode_server_message;

    fn error_msg(text: &str) -> ServerMessage {
        ServerMessage::Error(ErrorMsg {
            message: text.to_string(),
        })
    }

    #[tokio::test]
    async fn room_fanout_reaches_every_connection() {
        let mut connections = HashMap::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        connections.insert("u1".to_string(), tx1);
        connections.insert("u2".to_string(), tx2);

        to_room("AAAAAA", &connections, &error_msg("hello"));

        for rx in [&mut rx1, &mut rx2] {
            let bytes = rx.try_recv().expect("message delivered");
            let decoded = decode_server_message(&bytes).unwrap();
            assert!(matches!(decoded, ServerMessage::Error(m) if m.message == "hello"));
        }
    }

    #[tokio::test]
    async fn slow_client_does_not_block_fanout() {
        let mut connections = HashMap::new();
        let (tx_full, _rx_full) = mpsc::channel(1);
        tx_full.try_send(Bytes::from_static(b"x")).unwrap(); // fill the buffer
        let (tx_ok, mut rx_ok) = mpsc::channel(8);
        connections.insert("slow".to_string(), tx_full);
        connections.insert("ok".to_string(), tx_ok);

        to_room("AAAAAA", &connections, &error_msg("ping"));
        assert!(rx_ok.try_recv().is_ok());
    }

    #[tokio::test]
    async fn lobby_feed_reaches_subscribers() {
        let (lobby, _) = broadcast::channel(8);
        let mut sub = lobby.subscribe();
        to_lobby(&lobby, &error_msg("global"));
        let bytes = sub.try_recv().unwrap();
        assert!(decode_server_message(&bytes).is_ok());
    }
}
