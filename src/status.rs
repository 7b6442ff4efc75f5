//! Delivery status lattice: `sent < delivered < seen`, forward-only.
//!
//! The lattice engine is pure; the atomic persisted write lives in
//! [`crate::storage::Storage::advance_message_status`], which applies a
//! transition only while the stored rank is still below the target. Both
//! sides agree on the rank order defined here.

use serde::{Deserialize, Serialize};

/// Delivery status of a message. Ordering is the lattice order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Seen,
}

impl DeliveryStatus {
    /// Rank within the lattice. Persisted comparisons use the same values.
    pub fn rank(self) -> i64 {
        match self {
            DeliveryStatus::Sent => 0,
            DeliveryStatus::Delivered => 1,
            DeliveryStatus::Seen => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Seen => "seen",
        }
    }

    /// Parse the persisted representation. Unknown strings map to `Sent`
    /// rather than failing: a row written by a newer version still renders.
    pub fn parse(s: &str) -> DeliveryStatus {
        match s {
            "delivered" => DeliveryStatus::Delivered,
            "seen" => DeliveryStatus::Seen,
            _ => DeliveryStatus::Sent,
        }
    }

    /// Initial status assigned at send time: `delivered` when the receiver
    /// already holds a live connection, `sent` otherwise.
    pub fn initial(receiver_online: bool) -> DeliveryStatus {
        if receiver_online {
            DeliveryStatus::Delivered
        } else {
            DeliveryStatus::Sent
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of attempting a lattice transition.
///
/// A backward or repeated move is not an error: the caller receives the
/// status that is actually current and must emit no notification for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The persisted status changed to the contained value.
    Advanced(DeliveryStatus),
    /// The write was not applied; the contained value is the current status.
    Unchanged(DeliveryStatus),
}

impl Transition {
    pub fn status(self) -> DeliveryStatus {
        match self {
            Transition::Advanced(s) | Transition::Unchanged(s) => s,
        }
    }

    pub fn advanced(self) -> bool {
        matches!(self, Transition::Advanced(_))
    }
}

/// Compute the transition from `current` toward `target` without touching
/// storage. Used by tests and by callers that already hold the row.
pub fn advance(current: DeliveryStatus, target: DeliveryStatus) -> Transition {
    if target.rank() > current.rank() {
        Transition::Advanced(target)
    } else {
        Transition::Unchanged(current)
    }
}
