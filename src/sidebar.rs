//! Conversation aggregator: the merged sidebar listing.
//!
//! Combines the user's explicit contacts with inferred recent chat partners
//! into one deduplicated list. Saved contacts come first and win on
//! conflict, carrying their display-name override.

use std::collections::HashSet;

use serde::Serialize;

use crate::storage::{Storage, StorageError};

/// One sidebar row. Derived per request, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct SidebarEntry {
    pub peer_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub is_saved: bool,
}

/// Build the sidebar for `user_id`: saved contacts in the order they were
/// added, then recent chat partners not already covered. The user
/// themselves never appears.
pub fn sidebar_for(storage: &Storage, user_id: &str) -> Result<Vec<SidebarEntry>, StorageError> {
    let mut entries = Vec::new();
    let mut listed: HashSet<String> = HashSet::new();

    for contact in storage.list_contacts(user_id)? {
        if contact.peer_id == user_id || !listed.insert(contact.peer_id.clone()) {
            continue;
        }
        let profile = storage.get_user(&contact.peer_id)?;
        let display_name = contact
            .display_name
            .or_else(|| profile.as_ref().map(|p| p.display_name.clone()))
            .unwrap_or_else(|| contact.peer_id.clone());
        entries.push(SidebarEntry {
            peer_id: contact.peer_id,
            display_name,
            avatar_url: profile.and_then(|p| p.avatar_url),
            is_saved: true,
        });
    }

    for peer_id in storage.list_recent_chats(user_id)? {
        if peer_id == user_id || listed.contains(&peer_id) {
            continue;
        }
        // A recent partner with no profile row has been removed upstream;
        // nothing useful to show.
        let Some(profile) = storage.get_user(&peer_id)? else {
            continue;
        };
        listed.insert(peer_id.clone());
        entries.push(SidebarEntry {
            peer_id,
            display_name: profile.display_name,
            avatar_url: profile.avatar_url,
            is_saved: false,
        });
    }

    Ok(entries)
}
