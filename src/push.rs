//! Push-channel event vocabulary.
//!
//! Server→client events are JSON objects tagged by `type`; client→server
//! frames use the same encoding. The full message record pushed with
//! `new_message` carries the server-assigned id, status and timestamp so a
//! sender's single device can reconcile its optimistic copy.

use serde::{Deserialize, Serialize};

use crate::status::DeliveryStatus;
use crate::storage::MessageRow;

/// Inlined summary of a reply target, resolved at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyPreview {
    pub message_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image_url: Option<String>,
}

impl ReplyPreview {
    pub fn from_row(row: &MessageRow) -> Self {
        Self {
            message_id: row.message_id.clone(),
            sender_id: row.sender_id.clone(),
            receiver_id: row.receiver_id.clone(),
            text: row.text.clone(),
            image_url: row.image_url.clone(),
        }
    }
}

/// Full message record as sent to clients, with the reply target inlined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub message_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub reply_to: Option<ReplyPreview>,
    pub status: DeliveryStatus,
    pub deleted_for_everyone: bool,
    pub created_at: u64,
}

impl MessageView {
    pub fn new(row: &MessageRow, reply_to: Option<ReplyPreview>) -> Self {
        Self {
            message_id: row.message_id.clone(),
            sender_id: row.sender_id.clone(),
            receiver_id: row.receiver_id.clone(),
            text: row.text.clone(),
            image_url: row.image_url.clone(),
            reply_to,
            status: row.status,
            deleted_for_everyone: row.deleted_for_everyone,
            created_at: row.created_at,
        }
    }
}

/// Events pushed from the server to connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    OnlineUsers {
        user_ids: Vec<String>,
    },
    NewMessage {
        message: MessageView,
    },
    StatusChanged {
        message_id: String,
        status: DeliveryStatus,
    },
    ConversationSeen {
        sender_id: String,
        receiver_id: String,
        message_ids: Vec<String>,
    },
    UserTyping {
        user_id: String,
    },
    UserStopTyping {
        user_id: String,
    },
    MessageDeletedForMe {
        message_id: String,
    },
    MessageDeletedForEveryone {
        message: MessageView,
    },
}

/// Frames a client may send over its socket. Anything that fails to parse
/// is logged and dropped; the socket stays open.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Typing {
        to: String,
    },
    StopTyping {
        to: String,
    },
    /// Explicit delivery acknowledgment, used when the receiver was offline
    /// at send time.
    MessageDelivered {
        message_id: String,
    },
    MarkMessagesAsSeen {
        message_ids: Vec<String>,
    },
}
