//! WebSocket wire protocol
//!
//! Every frame is a JSON [`Envelope`] `{type, roomId?, userId?, data, timestamp}`.
//! Inbound frames are decoded into a typed [`Message`] and validated before
//! they reach the hub; outbound messages are built from typed payloads.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use webmeet_core::{IceCandidate, RoomId, UserId};

/// Message kinds understood by the signaling protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    Offer,
    Answer,
    IceCandidate,
    JoinRoom,
    LeaveRoom,
    RoomJoined,
    RoomLeft,
    UserJoined,
    UserLeft,
    Error,
    Success,
}

impl MessageType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice-candidate",
            Self::JoinRoom => "join-room",
            Self::LeaveRoom => "leave-room",
            Self::RoomJoined => "room-joined",
            Self::RoomLeft => "room-left",
            Self::UserJoined => "user-joined",
            Self::UserLeft => "user-left",
            Self::Error => "error",
            Self::Success => "success",
        }
    }

    /// Parse a wire type name
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let kind = match value {
            "offer" => Self::Offer,
            "answer" => Self::Answer,
            "ice-candidate" => Self::IceCandidate,
            "join-room" => Self::JoinRoom,
            "leave-room" => Self::LeaveRoom,
            "room-joined" => Self::RoomJoined,
            "room-left" => Self::RoomLeft,
            "user-joined" => Self::UserJoined,
            "user-left" => Self::UserLeft,
            "error" => Self::Error,
            "success" => Self::Success,
            _ => return None,
        };
        Some(kind)
    }

    /// Human label used in validation errors
    const fn label(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice candidate",
            Self::JoinRoom => "join room",
            Self::LeaveRoom => "leave room",
            Self::RoomJoined => "room joined",
            Self::RoomLeft => "room left",
            Self::UserJoined => "user joined",
            Self::UserLeft => "user left",
            Self::Error => "error",
            Self::Success => "success",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw JSON frame
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// `join-room`, `leave-room`, `room-left`, `user-joined` and `user-left` data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoomUser {
    pub room_id: RoomId,
    pub user_id: UserId,
}

/// `room-joined` data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoomMembers {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub users: Vec<UserId>,
}

/// `offer` and `answer` data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionDescription {
    pub room_id: RoomId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub sdp: String,
}

/// `ice-candidate` data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IceCandidateData {
    pub room_id: RoomId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub candidate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u32>,
}

impl IceCandidateData {
    #[must_use]
    pub fn to_candidate(&self) -> IceCandidate {
        IceCandidate {
            candidate: self.candidate.clone(),
            sdp_mid: self.sdp_mid.clone(),
            sdp_mline_index: self.sdp_mline_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessData {
    pub message: String,
}

/// Typed message body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    JoinRoom(RoomUser),
    LeaveRoom(RoomUser),
    Offer(SessionDescription),
    Answer(SessionDescription),
    IceCandidate(IceCandidateData),
    RoomJoined(RoomMembers),
    RoomLeft(RoomUser),
    UserJoined(RoomUser),
    UserLeft(RoomUser),
    Error(ErrorData),
    Success(SuccessData),
    /// Operator-defined message, delivered verbatim
    Custom { kind: String, data: Value },
}

impl Payload {
    /// Wire type name
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::JoinRoom(_) => MessageType::JoinRoom.as_str(),
            Self::LeaveRoom(_) => MessageType::LeaveRoom.as_str(),
            Self::Offer(_) => MessageType::Offer.as_str(),
            Self::Answer(_) => MessageType::Answer.as_str(),
            Self::IceCandidate(_) => MessageType::IceCandidate.as_str(),
            Self::RoomJoined(_) => MessageType::RoomJoined.as_str(),
            Self::RoomLeft(_) => MessageType::RoomLeft.as_str(),
            Self::UserJoined(_) => MessageType::UserJoined.as_str(),
            Self::UserLeft(_) => MessageType::UserLeft.as_str(),
            Self::Error(_) => MessageType::Error.as_str(),
            Self::Success(_) => MessageType::Success.as_str(),
            Self::Custom { kind, .. } => kind,
        }
    }

    fn to_data(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::JoinRoom(d)
            | Self::LeaveRoom(d)
            | Self::RoomLeft(d)
            | Self::UserJoined(d)
            | Self::UserLeft(d) => serde_json::to_value(d),
            Self::Offer(d) | Self::Answer(d) => serde_json::to_value(d),
            Self::IceCandidate(d) => serde_json::to_value(d),
            Self::RoomJoined(d) => serde_json::to_value(d),
            Self::Error(d) => serde_json::to_value(d),
            Self::Success(d) => serde_json::to_value(d),
            Self::Custom { data, .. } => Ok(data.clone()),
        }
    }
}

/// Inbound frame rejection, reported back to the sender
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Invalid message format")]
    InvalidFormat,

    #[error("Unknown message type")]
    UnknownType(String),

    #[error("Invalid {} data", .0.label())]
    InvalidData(MessageType),

    #[error("{0}")]
    MissingFields(String),

    #[error("{0}")]
    IdentityMismatch(&'static str),
}

impl ProtocolError {
    /// Code carried in the `error` reply
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::IdentityMismatch(_) => 403,
            _ => 400,
        }
    }

    #[must_use]
    pub fn to_message(&self) -> Message {
        Message::error(self.code(), self.to_string())
    }
}

/// A typed signaling message
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub room_id: Option<RoomId>,
    /// Identity the message is attributed to on the wire (`userId`)
    pub sender: Option<UserId>,
    pub payload: Payload,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    #[must_use]
    pub fn new(payload: Payload) -> Self {
        Self {
            room_id: None,
            sender: None,
            payload,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn in_room(mut self, room_id: RoomId) -> Self {
        self.room_id = Some(room_id);
        self
    }

    #[must_use]
    pub fn from_user(mut self, user_id: UserId) -> Self {
        self.sender = Some(user_id);
        self
    }

    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Payload::Success(SuccessData {
            message: message.into(),
        }))
    }

    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::new(Payload::Error(ErrorData {
            code,
            message: message.into(),
        }))
    }

    #[must_use]
    pub fn room_joined(room_id: RoomId, user_id: UserId, users: Vec<UserId>) -> Self {
        Self::new(Payload::RoomJoined(RoomMembers {
            room_id: room_id.clone(),
            user_id: user_id.clone(),
            users,
        }))
        .in_room(room_id)
        .from_user(user_id)
    }

    #[must_use]
    pub fn room_left(room_id: RoomId, user_id: UserId) -> Self {
        Self::room_user(room_id, user_id, Payload::RoomLeft)
    }

    #[must_use]
    pub fn user_joined(room_id: RoomId, user_id: UserId) -> Self {
        Self::room_user(room_id, user_id, Payload::UserJoined)
    }

    #[must_use]
    pub fn user_left(room_id: RoomId, user_id: UserId) -> Self {
        Self::room_user(room_id, user_id, Payload::UserLeft)
    }

    fn room_user(room_id: RoomId, user_id: UserId, wrap: fn(RoomUser) -> Payload) -> Self {
        Self::new(wrap(RoomUser {
            room_id: room_id.clone(),
            user_id: user_id.clone(),
        }))
        .in_room(room_id)
        .from_user(user_id)
    }

    /// Operator message with an arbitrary type and body
    #[must_use]
    pub fn custom(kind: impl Into<String>, data: Value) -> Self {
        Self::new(Payload::Custom {
            kind: kind.into(),
            data,
        })
    }

    /// The user an `offer`, `answer` or `ice-candidate` is addressed to
    #[must_use]
    pub fn recipient(&self) -> Option<&UserId> {
        match &self.payload {
            Payload::Offer(d) | Payload::Answer(d) => Some(&d.to_user_id),
            Payload::IceCandidate(d) => Some(&d.to_user_id),
            _ => None,
        }
    }

    /// Decode and validate a client frame
    ///
    /// Only `join-room`, `leave-room`, `offer`, `answer` and `ice-candidate`
    /// are accepted from clients. The result carries the room it targets and a
    /// fresh receive timestamp.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|_| ProtocolError::InvalidFormat)?;
        let kind = MessageType::parse(&envelope.kind)
            .ok_or_else(|| ProtocolError::UnknownType(envelope.kind.clone()))?;

        let data = envelope.data;
        let (room_id, payload) = match kind {
            MessageType::JoinRoom | MessageType::LeaveRoom => {
                let d: RoomUser = parse_data(kind, data)?;
                if d.room_id.is_empty() || d.user_id.is_empty() {
                    return Err(ProtocolError::MissingFields(
                        "Room ID and User ID are required".to_string(),
                    ));
                }
                let room_id = d.room_id.clone();
                let payload = if kind == MessageType::JoinRoom {
                    Payload::JoinRoom(d)
                } else {
                    Payload::LeaveRoom(d)
                };
                (room_id, payload)
            }
            MessageType::Offer | MessageType::Answer => {
                let d: SessionDescription = parse_data(kind, data)?;
                if d.room_id.is_empty()
                    || d.from_user_id.is_empty()
                    || d.to_user_id.is_empty()
                    || d.sdp.is_empty()
                {
                    return Err(missing_fields(kind));
                }
                let room_id = d.room_id.clone();
                let payload = if kind == MessageType::Offer {
                    Payload::Offer(d)
                } else {
                    Payload::Answer(d)
                };
                (room_id, payload)
            }
            MessageType::IceCandidate => {
                let d: IceCandidateData = parse_data(kind, data)?;
                if d.room_id.is_empty()
                    || d.from_user_id.is_empty()
                    || d.to_user_id.is_empty()
                    || d.candidate.is_empty()
                {
                    return Err(missing_fields(kind));
                }
                (d.room_id.clone(), Payload::IceCandidate(d))
            }
            _ => return Err(ProtocolError::UnknownType(envelope.kind)),
        };

        Ok(Self::new(payload).in_room(room_id))
    }

    /// Decode a client frame and bind it to the connection's identity
    ///
    /// The identity embedded in the payload must match `user_id`.
    pub fn from_client(text: &str, user_id: &UserId) -> Result<Self, ProtocolError> {
        let message = Self::decode(text)?;
        let claimed = match &message.payload {
            Payload::JoinRoom(d) | Payload::LeaveRoom(d) => Some((&d.user_id, "User ID mismatch")),
            Payload::Offer(d) | Payload::Answer(d) => {
                Some((&d.from_user_id, "From user ID mismatch"))
            }
            Payload::IceCandidate(d) => Some((&d.from_user_id, "From user ID mismatch")),
            _ => None,
        };
        if let Some((claimed, reason)) = claimed {
            if claimed != user_id {
                return Err(ProtocolError::IdentityMismatch(reason));
            }
        }
        Ok(message.from_user(user_id.clone()))
    }

    pub fn to_envelope(&self) -> Result<Envelope, serde_json::Error> {
        Ok(Envelope {
            kind: self.payload.kind().to_string(),
            room_id: self.room_id.clone(),
            user_id: self.sender.clone(),
            data: self.payload.to_data()?,
            timestamp: Some(self.timestamp),
        })
    }

    /// Serialize to a JSON text frame
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_envelope()?)
    }
}

fn parse_data<T: DeserializeOwned>(kind: MessageType, data: Value) -> Result<T, ProtocolError> {
    // A missing body validates as empty fields rather than a shape error
    let data = if data.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        data
    };
    serde_json::from_value(data).map_err(|_| ProtocolError::InvalidData(kind))
}

fn missing_fields(kind: MessageType) -> ProtocolError {
    ProtocolError::MissingFields(format!(
        "Invalid {} data: missing required fields",
        kind.label()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(value: Value) -> String {
        value.to_string()
    }

    #[test]
    fn test_decode_join_room() {
        let text = frame(json!({
            "type": "join-room",
            "data": {"roomId": "r1", "userId": "u1"}
        }));
        let message = Message::from_client(&text, &UserId::from("u1")).unwrap();

        assert_eq!(message.room_id, Some(RoomId::from("r1")));
        assert_eq!(message.sender, Some(UserId::from("u1")));
        assert_eq!(
            message.payload,
            Payload::JoinRoom(RoomUser {
                room_id: RoomId::from("r1"),
                user_id: UserId::from("u1"),
            })
        );
    }

    #[test]
    fn test_decode_ice_candidate() {
        let text = frame(json!({
            "type": "ice-candidate",
            "roomId": "r1",
            "data": {
                "roomId": "r1",
                "fromUserId": "u1",
                "toUserId": "u2",
                "candidate": "candidate:1 1 udp 2122260223 10.0.0.1 54400 typ host",
                "sdpMid": "0",
                "sdpMLineIndex": 0
            }
        }));
        let message = Message::from_client(&text, &UserId::from("u1")).unwrap();

        assert_eq!(message.recipient(), Some(&UserId::from("u2")));
        let Payload::IceCandidate(data) = &message.payload else {
            panic!("expected ice candidate, got {:?}", message.payload);
        };
        let candidate = data.to_candidate();
        assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
        assert_eq!(candidate.sdp_mline_index, Some(0));
    }

    #[test]
    fn test_rejects_malformed_and_unknown() {
        assert_eq!(
            Message::decode("not json").unwrap_err(),
            ProtocolError::InvalidFormat
        );

        let err = Message::decode(&frame(json!({"type": "dance"}))).unwrap_err();
        assert_eq!(err.to_string(), "Unknown message type");

        // Server-to-client kinds are not accepted inbound
        let err = Message::decode(&frame(json!({"type": "room-joined", "data": {}}))).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType(_)));
    }

    #[test]
    fn test_rejects_bad_data_shape() {
        let err = Message::decode(&frame(json!({"type": "offer", "data": "sdp"}))).unwrap_err();
        assert_eq!(err.to_string(), "Invalid offer data");
        assert_eq!(err.code(), 400);
    }

    #[test]
    fn test_rejects_missing_fields() {
        let err = Message::decode(&frame(json!({"type": "join-room"}))).unwrap_err();
        assert_eq!(err.to_string(), "Room ID and User ID are required");

        let err = Message::decode(&frame(json!({
            "type": "answer",
            "data": {"roomId": "r1", "fromUserId": "u1", "toUserId": "u2"}
        })))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid answer data: missing required fields"
        );

        let err = Message::decode(&frame(json!({
            "type": "ice-candidate",
            "data": {"roomId": "r1", "fromUserId": "u1", "toUserId": "u2"}
        })))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid ice candidate data: missing required fields"
        );
    }

    #[test]
    fn test_identity_mismatch() {
        let text = frame(json!({
            "type": "offer",
            "data": {"roomId": "r1", "fromUserId": "mallory", "toUserId": "u2", "sdp": "v=0"}
        }));
        let err = Message::from_client(&text, &UserId::from("u1")).unwrap_err();

        assert_eq!(err, ProtocolError::IdentityMismatch("From user ID mismatch"));
        assert_eq!(err.code(), 403);

        let reply = err.to_message();
        assert_eq!(
            reply.payload,
            Payload::Error(ErrorData {
                code: 403,
                message: "From user ID mismatch".to_string(),
            })
        );
    }

    #[test]
    fn test_encode_room_joined() {
        let message = Message::room_joined(
            RoomId::from("r1"),
            UserId::from("u1"),
            vec![UserId::from("u1")],
        );
        let value: Value = serde_json::from_str(&message.encode().unwrap()).unwrap();

        assert_eq!(value["type"], "room-joined");
        assert_eq!(value["roomId"], "r1");
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["data"]["users"], json!(["u1"]));
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_encode_custom_and_success() {
        let value: Value =
            serde_json::from_str(&Message::custom("notice", json!({"text": "hi"})).encode().unwrap())
                .unwrap();
        assert_eq!(value["type"], "notice");
        assert_eq!(value["data"]["text"], "hi");
        assert!(value.get("roomId").is_none());

        let value: Value =
            serde_json::from_str(&Message::success("Connected to WebSocket server").encode().unwrap())
                .unwrap();
        assert_eq!(value["type"], "success");
        assert_eq!(value["data"]["message"], "Connected to WebSocket server");
    }
}
