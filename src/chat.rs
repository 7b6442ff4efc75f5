//! Message lifecycle orchestration: send, acknowledge, delete, list.
//!
//! Sits between the HTTP/WebSocket surface and the collaborators: persists
//! through [`Storage`], resolves images through [`MediaClient`], computes
//! lattice transitions, and hands every resulting push event to the
//! [`DeliveryRelay`]. Relay is invoked only after persistence succeeded and
//! its outcome never affects the caller's result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::media::MediaClient;
use crate::plog;
use crate::presence::PresenceHub;
use crate::push::{MessageView, ReplyPreview};
use crate::relay::DeliveryRelay;
use crate::status::DeliveryStatus;
use crate::storage::{MessageRow, Storage, StorageError};

/// Text a delete-for-everyone leaves behind.
pub const REDACTION_MARKER: &str = "deleted";

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ChatError {
    /// Referenced message or user absent.
    NotFound(String),
    /// The actor is not the participant this operation requires.
    NotAuthorized(String),
    /// Self-messaging, an empty send, or a reply reference from a different
    /// conversation.
    InvalidTarget(String),
    /// Persistence collaborator failed; nothing was relayed.
    Upstream(StorageError),
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatError::NotFound(msg) => write!(f, "not found: {msg}"),
            ChatError::NotAuthorized(msg) => write!(f, "not authorized: {msg}"),
            ChatError::InvalidTarget(msg) => write!(f, "invalid target: {msg}"),
            ChatError::Upstream(e) => write!(f, "upstream unavailable: {e}"),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<StorageError> for ChatError {
    fn from(e: StorageError) -> Self {
        ChatError::Upstream(e)
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Inbound send request after authentication.
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    pub text: Option<String>,
    /// Raw image payload to resolve through the media collaborator.
    pub image: Option<String>,
    pub reply_to: Option<String>,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ChatService {
    hub: Arc<PresenceHub>,
    relay: DeliveryRelay,
    media: MediaClient,
}

impl ChatService {
    pub fn new(hub: Arc<PresenceHub>, media: MediaClient) -> Self {
        let relay = DeliveryRelay::new(Arc::clone(&hub));
        Self { hub, relay, media }
    }

    pub fn hub(&self) -> &Arc<PresenceHub> {
        &self.hub
    }

    // -----------------------------------------------------------------------
    // Send
    // -----------------------------------------------------------------------

    /// Create and deliver a message from `sender_id`.
    ///
    /// Persists with the lattice's initial status, records both directions
    /// of the recent-chat relation, then relays. Returns the resolved view
    /// with the reply target inlined.
    pub fn send_message(
        &self,
        storage: &Storage,
        sender_id: &str,
        receiver_id: &str,
        req: SendRequest,
    ) -> Result<MessageView, ChatError> {
        if receiver_id == sender_id {
            return Err(ChatError::InvalidTarget("cannot message yourself".into()));
        }
        if !storage.user_exists(receiver_id)? {
            return Err(ChatError::NotFound(format!("user {receiver_id}")));
        }

        let text = req
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if text.is_none() && req.image.is_none() {
            return Err(ChatError::InvalidTarget("message has no content".into()));
        }

        // Best-effort media resolution: a failed upload downgrades the send
        // rather than aborting it.
        let image_url = match req.image {
            Some(data) => match self.media.resolve_image(&data) {
                Ok(url) => Some(url),
                Err(e) => {
                    plog!("send: image resolution failed, sending without it: {e}");
                    None
                }
            },
            None => None,
        };
        if text.is_none() && image_url.is_none() {
            return Err(ChatError::InvalidTarget(
                "image could not be resolved and message has no text".into(),
            ));
        }

        let reply_preview = match req.reply_to.as_deref() {
            Some(reply_id) => Some(self.validate_reply(storage, sender_id, receiver_id, reply_id)?),
            None => None,
        };

        let now = now_secs();
        let message_id = new_message_id(sender_id, receiver_id, now);
        let mut row = MessageRow {
            message_id: message_id.clone(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            reply_to: req.reply_to,
            text,
            image_url,
            status: DeliveryStatus::Sent,
            deleted_for_everyone: false,
            created_at: now,
        };
        storage.insert_message(&row)?;

        storage.add_recent_chat(sender_id, receiver_id, now)?;
        storage.add_recent_chat(receiver_id, sender_id, now)?;

        // Receiver already live: the lattice advances to delivered before
        // the send returns.
        let mut advanced = false;
        if DeliveryStatus::initial(self.hub.is_online(receiver_id)) == DeliveryStatus::Delivered {
            advanced = storage
                .advance_message_status(&message_id, DeliveryStatus::Delivered)?
                .advanced();
            if advanced {
                row.status = DeliveryStatus::Delivered;
            }
        }

        let view = MessageView::new(&row, reply_preview);
        self.relay.deliver_new_message(&view);
        if advanced {
            self.relay
                .deliver_status_change(sender_id, &message_id, DeliveryStatus::Delivered);
        }

        plog!(
            "send: {} -> {} ({}, {})",
            crate::logging::user_id(sender_id),
            crate::logging::user_id(receiver_id),
            crate::logging::msg_id(&message_id),
            row.status
        );
        Ok(view)
    }

    fn validate_reply(
        &self,
        storage: &Storage,
        sender_id: &str,
        receiver_id: &str,
        reply_id: &str,
    ) -> Result<ReplyPreview, ChatError> {
        let parent = storage
            .get_message(reply_id)?
            .ok_or_else(|| ChatError::NotFound(format!("reply target {reply_id}")))?;
        let same_pair = (parent.sender_id == sender_id && parent.receiver_id == receiver_id)
            || (parent.sender_id == receiver_id && parent.receiver_id == sender_id);
        if !same_pair {
            return Err(ChatError::InvalidTarget(
                "reply target belongs to a different conversation".into(),
            ));
        }
        Ok(ReplyPreview::from_row(&parent))
    }

    // -----------------------------------------------------------------------
    // Read
    // -----------------------------------------------------------------------

    /// Conversation listing for `requester`, creation order, self-deleted
    /// rows excluded, reply targets inlined.
    pub fn list_messages(
        &self,
        storage: &Storage,
        requester_id: &str,
        peer_id: &str,
    ) -> Result<Vec<MessageView>, ChatError> {
        let rows = storage.list_conversation_messages(requester_id, peer_id)?;
        let mut views = Vec::with_capacity(rows.len());
        for row in &rows {
            views.push(self.resolve_view(storage, row)?);
        }
        Ok(views)
    }

    /// Inline the reply target for display. A dangling reference (possible
    /// if upstream wrote one) renders as no reply rather than failing the
    /// whole listing.
    pub fn resolve_view(
        &self,
        storage: &Storage,
        row: &MessageRow,
    ) -> Result<MessageView, ChatError> {
        let reply_preview = match row.reply_to.as_deref() {
            Some(reply_id) => storage.get_message(reply_id)?.map(|p| ReplyPreview::from_row(&p)),
            None => None,
        };
        Ok(MessageView::new(row, reply_preview))
    }

    // -----------------------------------------------------------------------
    // Status acknowledgments
    // -----------------------------------------------------------------------

    /// Receiver marks a single message as seen. Repeats are no-ops that
    /// return the current status and emit nothing.
    pub fn mark_seen(
        &self,
        storage: &Storage,
        message_id: &str,
        requester_id: &str,
    ) -> Result<DeliveryStatus, ChatError> {
        let message = self.authorized_receiver(storage, message_id, requester_id, "mark seen")?;
        let transition = storage.advance_message_status(message_id, DeliveryStatus::Seen)?;
        if transition.advanced() {
            self.relay
                .deliver_status_change(&message.sender_id, message_id, DeliveryStatus::Seen);
            self.relay.deliver_conversation_seen(
                &message.sender_id,
                requester_id,
                vec![message_id.to_string()],
            );
        }
        Ok(transition.status())
    }

    /// Explicit delivery acknowledgment from a receiver that was offline at
    /// send time.
    pub fn mark_delivered(
        &self,
        storage: &Storage,
        message_id: &str,
        requester_id: &str,
    ) -> Result<DeliveryStatus, ChatError> {
        let message =
            self.authorized_receiver(storage, message_id, requester_id, "acknowledge delivery")?;
        let transition = storage.advance_message_status(message_id, DeliveryStatus::Delivered)?;
        if transition.advanced() {
            self.relay.deliver_status_change(
                &message.sender_id,
                message_id,
                DeliveryStatus::Delivered,
            );
        }
        Ok(transition.status())
    }

    /// Batch seen acknowledgment from the socket path. Messages the
    /// requester cannot mark are skipped, not fatal; each affected sender
    /// receives per-message `status_changed` events plus one
    /// `conversation_seen` batch.
    pub fn mark_messages_seen(
        &self,
        storage: &Storage,
        requester_id: &str,
        message_ids: &[String],
    ) -> Result<(), ChatError> {
        let mut advanced_by_sender: HashMap<String, Vec<String>> = HashMap::new();
        for message_id in message_ids {
            let message = match storage.get_message(message_id)? {
                Some(m) if m.receiver_id == requester_id => m,
                Some(_) | None => {
                    plog!(
                        "seen: skipping {} for {}",
                        crate::logging::msg_id(message_id),
                        crate::logging::user_id(requester_id)
                    );
                    continue;
                }
            };
            if storage
                .advance_message_status(message_id, DeliveryStatus::Seen)?
                .advanced()
            {
                advanced_by_sender
                    .entry(message.sender_id)
                    .or_default()
                    .push(message_id.clone());
            }
        }

        for (sender_id, ids) in advanced_by_sender {
            for message_id in &ids {
                self.relay
                    .deliver_status_change(&sender_id, message_id, DeliveryStatus::Seen);
            }
            self.relay
                .deliver_conversation_seen(&sender_id, requester_id, ids);
        }
        Ok(())
    }

    fn authorized_receiver(
        &self,
        storage: &Storage,
        message_id: &str,
        requester_id: &str,
        action: &str,
    ) -> Result<MessageRow, ChatError> {
        let message = storage
            .get_message(message_id)?
            .ok_or_else(|| ChatError::NotFound(format!("message {message_id}")))?;
        if message.receiver_id != requester_id {
            return Err(ChatError::NotAuthorized(format!(
                "only the receiver may {action}"
            )));
        }
        Ok(message)
    }

    // -----------------------------------------------------------------------
    // Deletion
    // -----------------------------------------------------------------------

    /// Hide a message from the requester's own view. Idempotent.
    pub fn delete_for_me(
        &self,
        storage: &Storage,
        message_id: &str,
        requester_id: &str,
    ) -> Result<(), ChatError> {
        if storage.get_message(message_id)?.is_none() {
            return Err(ChatError::NotFound(format!("message {message_id}")));
        }
        storage.mark_deleted_for(message_id, requester_id, now_secs())?;
        self.relay.deliver_deletion_for_me(requester_id, message_id);
        Ok(())
    }

    /// Sender-initiated redaction visible to both participants.
    pub fn delete_for_everyone(
        &self,
        storage: &Storage,
        message_id: &str,
        requester_id: &str,
    ) -> Result<MessageView, ChatError> {
        let message = storage
            .get_message(message_id)?
            .ok_or_else(|| ChatError::NotFound(format!("message {message_id}")))?;
        if message.sender_id != requester_id {
            return Err(ChatError::NotAuthorized(
                "only the sender may delete for everyone".into(),
            ));
        }

        storage.redact_message(message_id, REDACTION_MARKER)?;
        let redacted = storage
            .get_message(message_id)?
            .ok_or_else(|| ChatError::NotFound(format!("message {message_id}")))?;
        let view = self.resolve_view(storage, &redacted)?;
        self.relay.deliver_deletion_for_everyone(&view);

        plog!(
            "delete: {} redacted by {}",
            crate::logging::msg_id(message_id),
            crate::logging::user_id(requester_id)
        );
        Ok(view)
    }

    /// Clear the whole conversation for the requester only. The peer keeps
    /// their view; no push event is emitted and readers reconcile on the
    /// next fetch.
    pub fn clear_conversation(
        &self,
        storage: &Storage,
        requester_id: &str,
        peer_id: &str,
    ) -> Result<u32, ChatError> {
        let hidden = storage.clear_conversation_for(requester_id, peer_id, now_secs())?;
        plog!(
            "clear: {} hid {} message(s) with {}",
            crate::logging::user_id(requester_id),
            hidden,
            crate::logging::user_id(peer_id)
        );
        Ok(hidden)
    }

    // -----------------------------------------------------------------------
    // Typing
    // -----------------------------------------------------------------------

    /// Pure relay; nothing persisted, nothing retried.
    pub fn typing(&self, from_user_id: &str, to_user_id: &str, is_typing: bool) {
        self.relay.deliver_typing(from_user_id, to_user_id, is_typing);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Current time as seconds since UNIX epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Server-assigned message id: URL-safe base64 of a SHA-256 digest over the
/// participants, the timestamp, and fresh random bytes.
fn new_message_id(sender_id: &str, receiver_id: &str, now: u64) -> String {
    let mut salt = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let mut hasher = Sha256::new();
    hasher.update(sender_id.as_bytes());
    hasher.update(receiver_id.as_bytes());
    hasher.update(now.to_be_bytes());
    hasher.update(salt);
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
