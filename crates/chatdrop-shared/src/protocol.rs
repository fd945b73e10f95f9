use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::types::MessageRecord;

/// Events a browser client sends over the realtime channel.
///
/// Frames are JSON text: `{"event": "<name>", "data": {...}}`. A missing or
/// `null` `data` reads as `{}`, so `clear_messages` needs no payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    SendMessage {
        message: String,
        #[serde(rename = "autoCopy", default)]
        auto_copy: bool,
    },
    DeleteMessage {
        #[serde(rename = "messageId")]
        message_id: String,
    },
    ThinkAboutMessage {
        text: String,
    },
    ClearMessages {},
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

impl ClientEvent {
    pub fn from_text(frame: &str) -> Result<Self, ProtocolError> {
        let Envelope { event, data } = serde_json::from_str(frame)?;
        let data = match data {
            Value::Null => Value::Object(Map::new()),
            data => data,
        };

        let mut envelope = Map::new();
        envelope.insert("event".to_string(), Value::String(event));
        envelope.insert("data".to_string(), data);
        Ok(serde_json::from_value(Value::Object(envelope))?)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "send_message",
            Self::DeleteMessage { .. } => "delete_message",
            Self::ThinkAboutMessage { .. } => "think_about_message",
            Self::ClearMessages {} => "clear_messages",
        }
    }
}

/// Events broadcast to every connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ReceiveMessage(MessageRecord),
    ReceiveFile(MessageRecord),
    ReceiveAiResponse(MessageRecord),
    MessageDeleted {
        #[serde(rename = "messageId")]
        message_id: String,
    },
    MessagesCleared,
}

impl ServerEvent {
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ReceiveMessage(_) => "receive_message",
            Self::ReceiveFile(_) => "receive_file",
            Self::ReceiveAiResponse(_) => "receive_ai_response",
            Self::MessageDeleted { .. } => "message_deleted",
            Self::MessagesCleared => "messages_cleared",
        }
    }
}
