//! Delivery relay: the single emission point for push events.
//!
//! Every push event a state change produces goes through this component,
//! so "one event per recipient per state change" holds by construction
//! instead of depending on scattered call sites. Relay is best-effort and
//! has no persistence: a target without a live connection is skipped, and
//! failures never propagate to the request path.

use std::sync::Arc;

use crate::plog;
use crate::presence::PresenceHub;
use crate::push::{MessageView, PushEvent};
use crate::status::DeliveryStatus;

#[derive(Clone)]
pub struct DeliveryRelay {
    hub: Arc<PresenceHub>,
}

impl DeliveryRelay {
    pub fn new(hub: Arc<PresenceHub>) -> Self {
        Self { hub }
    }

    /// Push a freshly created message to whichever participants are live.
    /// The sender receives its own echo so a single device reflects the
    /// server-assigned id, status and timestamp. This is the only path that
    /// emits `new_message`.
    pub fn deliver_new_message(&self, message: &MessageView) {
        let event = PushEvent::NewMessage {
            message: message.clone(),
        };
        let receiver_live = self.hub.send_to(&message.receiver_id, event.clone());
        self.hub.send_to(&message.sender_id, event);
        if !receiver_live {
            plog!(
                "relay: {} offline, {} queued as {}",
                crate::logging::user_id(&message.receiver_id),
                crate::logging::msg_id(&message.message_id),
                message.status
            );
        }
    }

    /// Notify one user (the message's sender) that a status advanced.
    pub fn deliver_status_change(
        &self,
        to_user_id: &str,
        message_id: &str,
        status: DeliveryStatus,
    ) {
        self.hub.send_to(
            to_user_id,
            PushEvent::StatusChanged {
                message_id: message_id.to_string(),
                status,
            },
        );
    }

    /// Batch seen notification for the sender of the affected messages.
    pub fn deliver_conversation_seen(
        &self,
        to_user_id: &str,
        receiver_id: &str,
        message_ids: Vec<String>,
    ) {
        self.hub.send_to(
            to_user_id,
            PushEvent::ConversationSeen {
                sender_id: to_user_id.to_string(),
                receiver_id: receiver_id.to_string(),
                message_ids,
            },
        );
    }

    /// Pure relay of a typing indicator; dropped if the target is offline.
    /// A lost event self-corrects on the sender's next periodic emission.
    pub fn deliver_typing(&self, from_user_id: &str, to_user_id: &str, is_typing: bool) {
        let event = if is_typing {
            PushEvent::UserTyping {
                user_id: from_user_id.to_string(),
            }
        } else {
            PushEvent::UserStopTyping {
                user_id: from_user_id.to_string(),
            }
        };
        self.hub.send_to(to_user_id, event);
    }

    /// Self-sync after a delete-for-me: only the deleting user's own
    /// connection hears about it.
    pub fn deliver_deletion_for_me(&self, user_id: &str, message_id: &str) {
        self.hub.send_to(
            user_id,
            PushEvent::MessageDeletedForMe {
                message_id: message_id.to_string(),
            },
        );
    }

    /// A delete-for-everyone reaches both participants with the redacted
    /// record.
    pub fn deliver_deletion_for_everyone(&self, message: &MessageView) {
        let event = PushEvent::MessageDeletedForEveryone {
            message: message.clone(),
        };
        self.hub.send_to(&message.sender_id, event.clone());
        self.hub.send_to(&message.receiver_id, event);
    }
}
