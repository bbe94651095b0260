use chrono::{DateTime, Utc};
use conflux_core::types::UserId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Client → Server request.
/// Wire: `{ "type": "req", "id": "abc", "method": "chat.send", "params": {...} }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReqFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub id: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Server → Client response.
/// Wire: `{ "type": "res", "id": "abc", "ok": true, "payload": {...} }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResFrame {
    pub fn ok(id: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            frame_type: "res".to_string(),
            id: id.into(),
            ok: true,
            payload: Some(serde_json::to_value(payload).unwrap_or(Value::Null)),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, code: &str, message: &str) -> Self {
        Self {
            frame_type: "res".to_string(),
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(ErrorShape {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

/// Server → Client unsolicited push event, carried on the per-user WS
/// channel. `seq` is the chat's `seq_num` when the event is message-shaped,
/// absent otherwise.
/// Wire: `{ "type": "event", "event": "message.created", "payload": {...}, "seq": 42 }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            frame_type: "event".to_string(),
            event: event.into(),
            payload: Some(serde_json::to_value(payload).unwrap_or(Value::Null)),
            seq: None,
        }
    }

    pub fn with_seq(mut self, seq: i64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Build the outbound frame directly from a bus envelope.
    pub fn from_envelope(envelope: &EventEnvelope) -> Self {
        let seq = envelope
            .data
            .get("seq_num")
            .and_then(Value::as_i64);
        let mut frame = Self::new(envelope.routing_key.to_string(), envelope.data.clone());
        if let Some(seq) = seq {
            frame = frame.with_seq(seq);
        }
        frame
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
}

/// Raw inbound frame — parse the `type` discriminator first, then extract body.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

impl InboundFrame {
    /// Try to interpret this frame as a client request.
    pub fn as_req(&self) -> Option<ReqFrame> {
        if self.frame_type != "req" {
            return None;
        }
        let mut map = self.rest.clone();
        map.insert("type".to_string(), Value::String("req".to_string()));
        serde_json::from_value(Value::Object(map)).ok()
    }
}

/// Routing keys published onto the topic exchange. Wire form is the dotted
/// name (`chat.created`), not a derived snake_case rendering of the variant,
/// so `Serialize`/`Deserialize` are implemented by hand on top of
/// `Display`/`FromStr` rather than derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingKey {
    ChatCreated,
    ChatUpdated,
    ChatDeleted,
    MessageCreated,
    MessageUpdated,
    MessageDeleted,
    MessageRestored,
    Typing,
    ReactionAdded,
    ReactionRemoved,
    ThreadCreated,
    ThreadArchived,
    ConferenceCreated,
    ConferenceScheduled,
    ConferenceCancelled,
    ConferenceEnded,
    ParticipantAdded,
    ParticipantJoined,
    ParticipantLeft,
    ParticipantMuted,
    ParticipantSpeaking,
    ParticipantRemoved,
    RsvpUpdated,
    RoleChanged,
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoutingKey::ChatCreated => "chat.created",
            RoutingKey::ChatUpdated => "chat.updated",
            RoutingKey::ChatDeleted => "chat.deleted",
            RoutingKey::MessageCreated => "message.created",
            RoutingKey::MessageUpdated => "message.updated",
            RoutingKey::MessageDeleted => "message.deleted",
            RoutingKey::MessageRestored => "message.restored",
            RoutingKey::Typing => "typing",
            RoutingKey::ReactionAdded => "reaction.added",
            RoutingKey::ReactionRemoved => "reaction.removed",
            RoutingKey::ThreadCreated => "thread.created",
            RoutingKey::ThreadArchived => "thread.archived",
            RoutingKey::ConferenceCreated => "conference.created",
            RoutingKey::ConferenceScheduled => "conference.scheduled",
            RoutingKey::ConferenceCancelled => "conference.cancelled",
            RoutingKey::ConferenceEnded => "conference.ended",
            RoutingKey::ParticipantAdded => "participant.added",
            RoutingKey::ParticipantJoined => "participant.joined",
            RoutingKey::ParticipantLeft => "participant.left",
            RoutingKey::ParticipantMuted => "participant.muted",
            RoutingKey::ParticipantSpeaking => "participant.speaking",
            RoutingKey::ParticipantRemoved => "participant.removed",
            RoutingKey::RsvpUpdated => "rsvp.updated",
            RoutingKey::RoleChanged => "role.changed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RoutingKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat.created" => Ok(RoutingKey::ChatCreated),
            "chat.updated" => Ok(RoutingKey::ChatUpdated),
            "chat.deleted" => Ok(RoutingKey::ChatDeleted),
            "message.created" => Ok(RoutingKey::MessageCreated),
            "message.updated" => Ok(RoutingKey::MessageUpdated),
            "message.deleted" => Ok(RoutingKey::MessageDeleted),
            "message.restored" => Ok(RoutingKey::MessageRestored),
            "typing" => Ok(RoutingKey::Typing),
            "reaction.added" => Ok(RoutingKey::ReactionAdded),
            "reaction.removed" => Ok(RoutingKey::ReactionRemoved),
            "thread.created" => Ok(RoutingKey::ThreadCreated),
            "thread.archived" => Ok(RoutingKey::ThreadArchived),
            "conference.created" => Ok(RoutingKey::ConferenceCreated),
            "conference.scheduled" => Ok(RoutingKey::ConferenceScheduled),
            "conference.cancelled" => Ok(RoutingKey::ConferenceCancelled),
            "conference.ended" => Ok(RoutingKey::ConferenceEnded),
            "participant.added" => Ok(RoutingKey::ParticipantAdded),
            "participant.joined" => Ok(RoutingKey::ParticipantJoined),
            "participant.left" => Ok(RoutingKey::ParticipantLeft),
            "participant.muted" => Ok(RoutingKey::ParticipantMuted),
            "participant.speaking" => Ok(RoutingKey::ParticipantSpeaking),
            "participant.removed" => Ok(RoutingKey::ParticipantRemoved),
            "rsvp.updated" => Ok(RoutingKey::RsvpUpdated),
            "role.changed" => Ok(RoutingKey::RoleChanged),
            other => Err(format!("unknown routing key: {other}")),
        }
    }
}

impl Serialize for RoutingKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RoutingKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RoutingKey::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Domain event published by Chat/Files/Voice Core onto the topic exchange
/// and, after bridging, onto each participant's real-time channel.
///
/// `chat_id`/`conference_id` are carried as opaque strings rather than the
/// typed ids from `conflux-core` so the envelope can be serialized once and
/// routed without the bus needing to know which aggregate root it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub routing_key: RoutingKey,
    pub timestamp: DateTime<Utc>,
    pub actor_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conference_id: Option<String>,
    pub participants: Vec<UserId>,
    pub data: Value,
}

impl EventEnvelope {
    pub fn new(
        routing_key: RoutingKey,
        actor_id: UserId,
        participants: Vec<UserId>,
        data: impl Serialize,
    ) -> Self {
        Self {
            routing_key,
            timestamp: Utc::now(),
            actor_id,
            chat_id: None,
            conference_id: None,
            participants,
            data: serde_json::to_value(data).unwrap_or(Value::Null),
        }
    }

    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn with_conference_id(mut self, conference_id: impl Into<String>) -> Self {
        self.conference_id = Some(conference_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_key_roundtrips_through_display_and_fromstr() {
        let keys = [
            RoutingKey::ChatCreated,
            RoutingKey::MessageRestored,
            RoutingKey::Typing,
            RoutingKey::RsvpUpdated,
        ];
        for key in keys {
            let parsed: RoutingKey = key.to_string().parse().expect("parse failed");
            assert_eq!(parsed, key);
        }
    }
}
