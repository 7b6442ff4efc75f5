//! SQLite storage layer for parley.
//!
//! The persistence collaborator for the chat core: users, contacts,
//! recent-chat partners, messages, and per-user message deletions. Handles
//! schema creation and exposes the rank-guarded status update that keeps the
//! delivery lattice forward-only even under racing acknowledgments.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::status::{DeliveryStatus, Transition};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    NotFound(String),
    AlreadyExists(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StorageError::Io(e) => write!(f, "io error: {e}"),
            StorageError::NotFound(msg) => write!(f, "not found: {msg}"),
            StorageError::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Sqlite(e)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// User profile row. Account credentials live with the external auth
/// service; this table carries only what the chat core reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub created_at: u64,
}

/// Saved contact row. Unique per (owner, peer); only ever created by the
/// explicit add-contact operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRow {
    pub owner_id: String,
    pub peer_id: String,
    /// Custom name the owner chose for this contact.
    pub display_name: Option<String>,
    pub added_at: u64,
}

/// Message row stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub message_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    /// Optional reference to the message this is a reply to.
    pub reply_to: Option<String>,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub status: DeliveryStatus,
    pub deleted_for_everyone: bool,
    pub created_at: u64,
}

const MESSAGE_COLUMNS: &str = "message_id, sender_id, receiver_id, reply_to, text,
                image_url, status, deleted_for_everyone, created_at";

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        message_id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        reply_to: row.get(3)?,
        text: row.get(4)?,
        image_url: row.get(5)?,
        status: DeliveryStatus::parse(&row.get::<_, String>(6)?),
        deleted_for_everyone: row.get::<_, i32>(7)? != 0,
        created_at: row.get::<_, i64>(8)? as u64,
    })
}

// ---------------------------------------------------------------------------
// Storage handle
// ---------------------------------------------------------------------------

/// Main storage handle wrapping a SQLite connection.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create a database at the given path. Creates the parent
    /// directory and schema if needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    /// Create an in-memory database. Used by tests and throwaway servers.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                user_id      TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                avatar_url   TEXT,
                created_at   INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS contacts (
                owner_id     TEXT NOT NULL,
                peer_id      TEXT NOT NULL,
                display_name TEXT,
                added_at     INTEGER NOT NULL,
                PRIMARY KEY (owner_id, peer_id)
            );

            CREATE TABLE IF NOT EXISTS recent_chats (
                owner_id           TEXT NOT NULL,
                peer_id            TEXT NOT NULL,
                first_messaged_at  INTEGER NOT NULL,
                PRIMARY KEY (owner_id, peer_id)
            );

            CREATE TABLE IF NOT EXISTS messages (
                message_id            TEXT PRIMARY KEY,
                sender_id             TEXT NOT NULL,
                receiver_id           TEXT NOT NULL,
                reply_to              TEXT,
                text                  TEXT,
                image_url             TEXT,
                status                TEXT NOT NULL DEFAULT 'sent',
                deleted_for_everyone  INTEGER NOT NULL DEFAULT 0,
                created_at            INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_sender
                ON messages(sender_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_messages_receiver
                ON messages(receiver_id, created_at);

            CREATE TABLE IF NOT EXISTS message_deletions (
                message_id  TEXT NOT NULL REFERENCES messages(message_id),
                user_id     TEXT NOT NULL,
                deleted_at  INTEGER NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );
            ",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    pub fn insert_user(&self, row: &UserRow) -> Result<(), StorageError> {
        let affected = self.conn.execute(
            "INSERT OR IGNORE INTO users (user_id, display_name, avatar_url, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                row.user_id,
                row.display_name,
                row.avatar_url,
                row.created_at as i64,
            ],
        )?;
        if affected == 0 {
            return Err(StorageError::AlreadyExists(format!("user {}", row.user_id)));
        }
        Ok(())
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<UserRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, display_name, avatar_url, created_at
             FROM users WHERE user_id = ?1",
        )?;
        let row = stmt
            .query_row(params![user_id], |row| {
                Ok(UserRow {
                    user_id: row.get(0)?,
                    display_name: row.get(1)?,
                    avatar_url: row.get(2)?,
                    created_at: row.get::<_, i64>(3)? as u64,
                })
            })
            .optional()?;
        Ok(row)
    }

    pub fn user_exists(&self, user_id: &str) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // -----------------------------------------------------------------------
    // Contacts
    // -----------------------------------------------------------------------

    pub fn insert_contact(&self, row: &ContactRow) -> Result<(), StorageError> {
        let affected = self.conn.execute(
            "INSERT OR IGNORE INTO contacts (owner_id, peer_id, display_name, added_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                row.owner_id,
                row.peer_id,
                row.display_name,
                row.added_at as i64,
            ],
        )?;
        if affected == 0 {
            return Err(StorageError::AlreadyExists(format!(
                "contact {} -> {}",
                row.owner_id, row.peer_id
            )));
        }
        Ok(())
    }

    /// List saved contacts in the order they were added.
    pub fn list_contacts(&self, owner_id: &str) -> Result<Vec<ContactRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT owner_id, peer_id, display_name, added_at
             FROM contacts WHERE owner_id = ?1
             ORDER BY added_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![owner_id], |row| {
            Ok(ContactRow {
                owner_id: row.get(0)?,
                peer_id: row.get(1)?,
                display_name: row.get(2)?,
                added_at: row.get::<_, i64>(3)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Recent chats
    // -----------------------------------------------------------------------

    /// Record that `owner` has exchanged messages with `peer`. Idempotent.
    pub fn add_recent_chat(
        &self,
        owner_id: &str,
        peer_id: &str,
        now: u64,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO recent_chats (owner_id, peer_id, first_messaged_at)
             VALUES (?1, ?2, ?3)",
            params![owner_id, peer_id, now as i64],
        )?;
        Ok(())
    }

    /// Recent chat partner ids, oldest conversation first.
    pub fn list_recent_chats(&self, owner_id: &str) -> Result<Vec<String>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT peer_id FROM recent_chats WHERE owner_id = ?1
             ORDER BY first_messaged_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![owner_id], |row| row.get(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    pub fn insert_message(&self, row: &MessageRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO messages
             (message_id, sender_id, receiver_id, reply_to, text,
              image_url, status, deleted_for_everyone, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.message_id,
                row.sender_id,
                row.receiver_id,
                row.reply_to,
                row.text,
                row.image_url,
                row.status.as_str(),
                row.deleted_for_everyone as i32,
                row.created_at as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get_message(&self, message_id: &str) -> Result<Option<MessageRow>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE message_id = ?1"
        ))?;
        let row = stmt
            .query_row(params![message_id], message_from_row)
            .optional()?;
        Ok(row)
    }

    /// List the conversation between `requester` and `peer` in creation
    /// order, excluding messages the requester has deleted for themselves.
    pub fn list_conversation_messages(
        &self,
        requester_id: &str,
        peer_id: &str,
    ) -> Result<Vec<MessageRow>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE ((sender_id = ?1 AND receiver_id = ?2)
                 OR (sender_id = ?2 AND receiver_id = ?1))
               AND message_id NOT IN
                   (SELECT message_id FROM message_deletions WHERE user_id = ?1)
             ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map(params![requester_id, peer_id], message_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Advance a message's delivery status toward `target`, applying the
    /// write only while the stored rank is still below the target's rank.
    /// A backward or repeated move leaves the row untouched and reports the
    /// status that is actually current.
    pub fn advance_message_status(
        &self,
        message_id: &str,
        target: DeliveryStatus,
    ) -> Result<Transition, StorageError> {
        let affected = self.conn.execute(
            "UPDATE messages SET status = ?1
             WHERE message_id = ?2
               AND (CASE status WHEN 'sent' THEN 0 WHEN 'delivered' THEN 1 ELSE 2 END)
                 < (CASE ?1     WHEN 'sent' THEN 0 WHEN 'delivered' THEN 1 ELSE 2 END)",
            params![target.as_str(), message_id],
        )?;
        if affected > 0 {
            return Ok(Transition::Advanced(target));
        }
        let current: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM messages WHERE message_id = ?1",
                params![message_id],
                |row| row.get(0),
            )
            .optional()?;
        match current {
            Some(s) => Ok(Transition::Unchanged(DeliveryStatus::parse(&s))),
            None => Err(StorageError::NotFound(format!("message {message_id}"))),
        }
    }

    // -----------------------------------------------------------------------
    // Deletions
    // -----------------------------------------------------------------------

    /// Hide a message from one user's view. Idempotent; returns whether the
    /// deletion was newly recorded.
    pub fn mark_deleted_for(
        &self,
        message_id: &str,
        user_id: &str,
        now: u64,
    ) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "INSERT OR IGNORE INTO message_deletions (message_id, user_id, deleted_at)
             VALUES (?1, ?2, ?3)",
            params![message_id, user_id, now as i64],
        )?;
        Ok(affected > 0)
    }

    pub fn is_deleted_for(&self, message_id: &str, user_id: &str) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM message_deletions
             WHERE message_id = ?1 AND user_id = ?2",
            params![message_id, user_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Redact a message for everyone: replace the text and set the flag.
    /// The row itself is never removed.
    pub fn redact_message(
        &self,
        message_id: &str,
        redaction_marker: &str,
    ) -> Result<(), StorageError> {
        let affected = self.conn.execute(
            "UPDATE messages
             SET text = ?2, image_url = NULL, deleted_for_everyone = 1
             WHERE message_id = ?1",
            params![message_id, redaction_marker],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!("message {message_id}")));
        }
        Ok(())
    }

    /// Soft-delete every message in the conversation for one participant.
    /// The peer's view is untouched. Returns the number of newly hidden
    /// messages.
    pub fn clear_conversation_for(
        &self,
        requester_id: &str,
        peer_id: &str,
        now: u64,
    ) -> Result<u32, StorageError> {
        let affected = self.conn.execute(
            "INSERT OR IGNORE INTO message_deletions (message_id, user_id, deleted_at)
             SELECT message_id, ?1, ?3 FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)",
            params![requester_id, peer_id, now as i64],
        )?;
        Ok(affected as u32)
    }
}

/// Standard database location inside a data directory.
pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("parley.db")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn test_storage() -> Storage {
        Storage::open_in_memory().unwrap()
    }

    fn test_user(id: &str) -> UserRow {
        UserRow {
            user_id: id.to_string(),
            display_name: format!("User {id}"),
            avatar_url: None,
            created_at: now_secs(),
        }
    }

    fn test_message(id: &str, sender: &str, receiver: &str) -> MessageRow {
        MessageRow {
            message_id: id.to_string(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            reply_to: None,
            text: Some(format!("message {id}")),
            image_url: None,
            status: DeliveryStatus::Sent,
            deleted_for_everyone: false,
            created_at: now_secs(),
        }
    }

    #[test]
    fn test_user_crud() {
        let storage = test_storage();
        assert!(storage.get_user("alice").unwrap().is_none());

        storage.insert_user(&test_user("alice")).unwrap();
        let loaded = storage.get_user("alice").unwrap().unwrap();
        assert_eq!(loaded.display_name, "User alice");
        assert!(storage.user_exists("alice").unwrap());

        // Duplicate insert is rejected
        assert!(matches!(
            storage.insert_user(&test_user("alice")),
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_contact_uniqueness() {
        let storage = test_storage();
        let row = ContactRow {
            owner_id: "alice".to_string(),
            peer_id: "bob".to_string(),
            display_name: Some("Bobby".to_string()),
            added_at: now_secs(),
        };
        storage.insert_contact(&row).unwrap();
        assert!(matches!(
            storage.insert_contact(&row),
            Err(StorageError::AlreadyExists(_))
        ));

        let contacts = storage.list_contacts("alice").unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].display_name.as_deref(), Some("Bobby"));

        // The reverse direction is a distinct contact
        let reverse = ContactRow {
            owner_id: "bob".to_string(),
            peer_id: "alice".to_string(),
            display_name: None,
            added_at: now_secs(),
        };
        storage.insert_contact(&reverse).unwrap();
        assert_eq!(storage.list_contacts("bob").unwrap().len(), 1);
    }

    #[test]
    fn test_recent_chats_idempotent() {
        let storage = test_storage();
        let now = now_secs();
        storage.add_recent_chat("alice", "bob", now).unwrap();
        storage.add_recent_chat("alice", "bob", now + 10).unwrap();
        storage.add_recent_chat("alice", "carol", now + 5).unwrap();

        let recents = storage.list_recent_chats("alice").unwrap();
        assert_eq!(recents, vec!["bob".to_string(), "carol".to_string()]);
        assert!(storage.list_recent_chats("bob").unwrap().is_empty());
    }

    #[test]
    fn test_message_crud() {
        let storage = test_storage();
        let msg = test_message("m1", "alice", "bob");
        storage.insert_message(&msg).unwrap();

        let loaded = storage.get_message("m1").unwrap().unwrap();
        assert_eq!(loaded.sender_id, "alice");
        assert_eq!(loaded.status, DeliveryStatus::Sent);
        assert!(!loaded.deleted_for_everyone);
        assert!(storage.get_message("missing").unwrap().is_none());
    }

    #[test]
    fn test_conversation_listing_excludes_self_deleted() {
        let storage = test_storage();
        storage
            .insert_message(&test_message("m1", "alice", "bob"))
            .unwrap();
        storage
            .insert_message(&test_message("m2", "bob", "alice"))
            .unwrap();
        storage
            .insert_message(&test_message("m3", "alice", "carol"))
            .unwrap();

        let convo = storage.list_conversation_messages("alice", "bob").unwrap();
        assert_eq!(convo.len(), 2);

        storage.mark_deleted_for("m1", "alice", now_secs()).unwrap();
        let convo = storage.list_conversation_messages("alice", "bob").unwrap();
        assert_eq!(convo.len(), 1);
        assert_eq!(convo[0].message_id, "m2");

        // Bob still sees both
        let convo = storage.list_conversation_messages("bob", "alice").unwrap();
        assert_eq!(convo.len(), 2);
    }

    #[test]
    fn test_status_advances_forward_only() {
        let storage = test_storage();
        storage
            .insert_message(&test_message("m1", "alice", "bob"))
            .unwrap();

        let t = storage
            .advance_message_status("m1", DeliveryStatus::Delivered)
            .unwrap();
        assert_eq!(t, Transition::Advanced(DeliveryStatus::Delivered));

        let t = storage
            .advance_message_status("m1", DeliveryStatus::Seen)
            .unwrap();
        assert_eq!(t, Transition::Advanced(DeliveryStatus::Seen));

        // A late delivered ack must not downgrade seen
        let t = storage
            .advance_message_status("m1", DeliveryStatus::Delivered)
            .unwrap();
        assert_eq!(t, Transition::Unchanged(DeliveryStatus::Seen));
        assert_eq!(
            storage.get_message("m1").unwrap().unwrap().status,
            DeliveryStatus::Seen
        );

        // Repeated seen is a no-op, not an error
        let t = storage
            .advance_message_status("m1", DeliveryStatus::Seen)
            .unwrap();
        assert_eq!(t, Transition::Unchanged(DeliveryStatus::Seen));

        assert!(matches!(
            storage.advance_message_status("missing", DeliveryStatus::Seen),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_deletion_idempotent() {
        let storage = test_storage();
        storage
            .insert_message(&test_message("m1", "alice", "bob"))
            .unwrap();

        assert!(storage.mark_deleted_for("m1", "alice", now_secs()).unwrap());
        assert!(!storage.mark_deleted_for("m1", "alice", now_secs()).unwrap());
        assert!(storage.is_deleted_for("m1", "alice").unwrap());
        assert!(!storage.is_deleted_for("m1", "bob").unwrap());
    }

    #[test]
    fn test_redaction_preserves_row() {
        let storage = test_storage();
        let mut msg = test_message("m1", "alice", "bob");
        msg.image_url = Some("https://media.example/abc".to_string());
        storage.insert_message(&msg).unwrap();

        storage.redact_message("m1", "deleted").unwrap();
        let loaded = storage.get_message("m1").unwrap().unwrap();
        assert_eq!(loaded.text.as_deref(), Some("deleted"));
        assert!(loaded.image_url.is_none());
        assert!(loaded.deleted_for_everyone);

        assert!(matches!(
            storage.redact_message("missing", "deleted"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_clear_conversation_is_one_sided() {
        let storage = test_storage();
        storage
            .insert_message(&test_message("m1", "alice", "bob"))
            .unwrap();
        storage
            .insert_message(&test_message("m2", "bob", "alice"))
            .unwrap();
        storage
            .insert_message(&test_message("m3", "alice", "carol"))
            .unwrap();

        let hidden = storage
            .clear_conversation_for("alice", "bob", now_secs())
            .unwrap();
        assert_eq!(hidden, 2);

        assert!(storage
            .list_conversation_messages("alice", "bob")
            .unwrap()
            .is_empty());
        // Bob's view and the other conversation are untouched
        assert_eq!(
            storage
                .list_conversation_messages("bob", "alice")
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            storage
                .list_conversation_messages("alice", "carol")
                .unwrap()
                .len(),
            1
        );

        // Clearing again hides nothing new
        let hidden = storage
            .clear_conversation_for("alice", "bob", now_secs())
            .unwrap();
        assert_eq!(hidden, 0);
    }
}
