use serde::{Deserialize, Serialize};

use super::messages::{
    AckMsg, ChatBroadcastMsg, ClientMessage, ErrorMsg, GameActionMsg, GameStartedMsg,
    HostChangedMsg, JoinRoomMsg, LeaveRoomMsg, MessageType, PlayerJoinedMsg, PlayerLeftMsg,
    PlayerReadyMsg, PlayerReadyUpdateMsg, RoleAssignedMsg, RoundEndedMsg, ServerMessage,
    SipahiGuessedMsg, StartGameMsg,
};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum message payload size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug)]
pub enum ProtocolError {
    EmptyMessage,
    UnknownMessageType(u8),
    PayloadTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::UnknownMessageType(b) => write!(f, "unknown message type: 0x{b:02x}"),
            Self::PayloadTooLarge(size) => {
                write!(f, "payload too large: {size} bytes (max {MAX_MESSAGE_SIZE})")
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encode a serializable payload with a 1-byte type prefix.
pub fn encode_message<T: Serialize>(
    msg_type: MessageType,
    payload: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let payload_bytes = rmp_serde::to_vec_named(payload)
        .map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    let total = 1 + payload_bytes.len();
    if total > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(total));
    }
    let mut buf = Vec::with_capacity(total);
    buf.push(msg_type as u8);
    buf.extend_from_slice(&payload_bytes);
    Ok(buf)
}

/// Encode a `ClientMessage` to wire format.
pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        ClientMessage::JoinRoom(m) => encode_message(MessageType::JoinRoom, m),
        ClientMessage::LeaveRoom(m) => encode_message(MessageType::LeaveRoom, m),
        ClientMessage::PlayerReady(m) => encode_message(MessageType::PlayerReady, m),
        ClientMessage::StartGame(m) => encode_message(MessageType::StartGame, m),
        ClientMessage::GameAction(m) => encode_message(MessageType::GameAction, m),
    }
}

/// Encode a `ServerMessage` to wire format.
pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        ServerMessage::Ack(m) => encode_message(MessageType::Ack, m),
        ServerMessage::RoomState(m) => encode_message(MessageType::RoomState, m),
        ServerMessage::GameStateUpdate(m) => encode_message(MessageType::GameStateUpdate, m),
        ServerMessage::PlayerJoined(m) => encode_message(MessageType::PlayerJoined, m),
        ServerMessage::PlayerLeft(m) => encode_message(MessageType::PlayerLeft, m),
        ServerMessage::PlayerReadyUpdate(m) => encode_message(MessageType::PlayerReadyUpdate, m),
        ServerMessage::HostChanged(m) => encode_message(MessageType::HostChanged, m),
        ServerMessage::GameStarted(m) => encode_message(MessageType::GameStarted, m),
        ServerMessage::RoleAssigned(m) => encode_message(MessageType::RoleAssigned, m),
        ServerMessage::SipahiGuessed(m) => encode_message(MessageType::SipahiGuessed, m),
        ServerMessage::RoundEnded(m) => encode_message(MessageType::RoundEnded, m),
        ServerMessage::ChatMessage(m) => encode_message(MessageType::ChatMessage, m),
        ServerMessage::Error(m) => encode_message(MessageType::Error, m),
    }
}

/// Extract the message type byte from raw wire data.
pub fn decode_message_type(data: &[u8]) -> Result<MessageType, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    MessageType::from_byte(data[0]).ok_or(ProtocolError::UnknownMessageType(data[0]))
}

/// Decode a MessagePack payload (bytes after the type prefix).
pub fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    rmp_serde::from_slice(&data[1..]).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

/// Decode raw wire data into a `ClientMessage`.
pub fn decode_client_message(data: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::JoinRoom => Ok(ClientMessage::JoinRoom(decode_payload::<JoinRoomMsg>(
            data,
        )?)),
        MessageType::LeaveRoom => Ok(ClientMessage::LeaveRoom(decode_payload::<LeaveRoomMsg>(
            data,
        )?)),
        MessageType::PlayerReady => Ok(ClientMessage::PlayerReady(
            decode_payload::<PlayerReadyMsg>(data)?,
        )),
        MessageType::StartGame => Ok(ClientMessage::StartGame(decode_payload::<StartGameMsg>(
            data,
        )?)),
        MessageType::GameAction => Ok(ClientMessage::GameAction(decode_payload::<GameActionMsg>(
            data,
        )?)),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}

/// Decode raw wire data into a `ServerMessage`.
pub fn decode_server_message(data: &[u8]) -> Result<ServerMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::Ack => Ok(ServerMessage::Ack(decode_payload::<AckMsg>(data)?)),
        MessageType::RoomState => Ok(ServerMessage::RoomState(Box::new(decode_payload(data)?))),
        MessageType::GameStateUpdate => Ok(ServerMessage::GameStateUpdate(Box::new(
            decode_payload(data)?,
        ))),
        MessageType::PlayerJoined => Ok(ServerMessage::PlayerJoined(decode_payload::<
            PlayerJoinedMsg,
        >(data)?)),
        MessageType::PlayerLeft => Ok(ServerMessage::PlayerLeft(decode_payload::<PlayerLeftMsg>(
            data,
        )?)),
        MessageType::PlayerReadyUpdate => Ok(ServerMessage::PlayerReadyUpdate(decode_payload::<
            PlayerReadyUpdateMsg,
        >(data)?)),
        MessageType::HostChanged => Ok(ServerMessage::HostChanged(decode_payload::<
            HostChangedMsg,
        >(data)?)),
        MessageType::GameStarted => Ok(ServerMessage::GameStarted(decode_payload::<
            GameStartedMsg,
        >(data)?)),
        MessageType::RoleAssigned => Ok(ServerMessage::RoleAssigned(decode_payload::<
            RoleAssignedMsg,
        >(data)?)),
        MessageType::SipahiGuessed => Ok(ServerMessage::SipahiGuessed(decode_payload::<
            SipahiGuessedMsg,
        >(data)?)),
        MessageType::RoundEnded => Ok(ServerMessage::RoundEnded(decode_payload::<RoundEndedMsg>(
            data,
        )?)),
        MessageType::ChatMessage => Ok(ServerMessage::ChatMessage(decode_payload::<
            ChatBroadcastMsg,
        >(data)?)),
        MessageType::Error => Ok(ServerMessage::Error(decode_payload::<ErrorMsg>(data)?)),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::messages::GameAction;
    use crate::test_helpers::make_room;

    #[test]
    fn roundtrip_join_room() {
        let msg = ClientMessage::JoinRoom(JoinRoomMsg {
            room_code: "QWERTY".to_string(),
            user_id: "u1".to_string(),
            user_name: "Alice".to_string(),
        });
        let encoded = encode_client_message(&msg).unwrap();
        assert_eq!(encoded[0], MessageType::JoinRoom as u8);
        let decoded = decode_client_message(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn roundtrip_game_action_variants() {
        for action in [
            GameAction::ChatMessage {
                text: "hello".to_string(),
            },
            GameAction::SipahiGuess {
                suspect_id: "u3".to_string(),
            },
            GameAction::EndRound,
        ] {
            let msg = ClientMessage::GameAction(GameActionMsg {
                room_code: "QWERTY".to_string(),
                action,
            });
            let encoded = encode_client_message(&msg).unwrap();
            let decoded = decode_client_message(&encoded).unwrap();
            assert_eq!(msg, decoded);
        }
    }

    #[test]
    fn roundtrip_room_state() {
        let room = make_room("QWERTY", 3);
        let snapshot =
            crate::net::messages::RoomSnapshot::build(&room, [&"u1".to_string()], None);
        let msg = ServerMessage::RoomState(Box::new(snapshot));
        let encoded = encode_server_message(&msg).unwrap();
        let decoded = decode_server_message(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn decode_empty_message_fails() {
        assert!(decode_message_type(&[]).is_err());
    }

    #[test]
    fn decode_unknown_type_fails() {
        assert!(decode_message_type(&[0xFF]).is_err());
    }

    #[test]
    fn client_decoder_rejects_server_types() {
        let msg = ServerMessage::Error(ErrorMsg {
            message: "nope".to_string(),
        });
        let encoded = encode_server_message(&msg).unwrap();
        assert!(decode_client_message(&encoded).is_err());
    }

    #[test]
    fn oversized_payload_rejected() {
        let msg = ClientMessage::GameAction(GameActionMsg {
            room_code: "QWERTY".to_string(),
            action: GameAction::ChatMessage {
                text: "x".repeat(MAX_MESSAGE_SIZE + 1),
            },
        });
        assert!(matches!(
            encode_client_message(&msg),
            Err(ProtocolError::PayloadTooLarge(_))
        ));
    }
}
